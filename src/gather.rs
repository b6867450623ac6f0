//! Bulk transfer of per-atom data and atom creation.
//!
//! Gather operations allocate the destination buffer from counts queried
//! inside the same call (`natoms` or the ID subset length times the field
//! width), so the engine can never write past what the caller sees. Scatter
//! operations validate the source length against the same product before
//! entering the engine.

use tracing::instrument;

use crate::engine::Lammps;
use crate::error::{Error, Result};
use crate::ffi::api::{GatherOp, TargetOp};
use crate::ffi::{cstring, ImageInt, TagInt};

/// Element type of a transferable per-atom field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// 32-bit integer field (`type`, `tag`, `mask`, ...).
    Int,
    /// Double field (`x`, `v`, `f`, `q`, ...).
    Double,
}

/// Data gathered from the engine, `width` values per atom in atom-ID order
/// (or subset order for the subset operations).
#[derive(Debug, Clone, PartialEq)]
pub enum GatherData {
    /// Values of a 32-bit integer field.
    Int(Vec<i32>),
    /// Values of a double field.
    Double(Vec<f64>),
}

/// Data to scatter into the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScatterData<'a> {
    /// Values for a 32-bit integer field.
    Int(&'a [i32]),
    /// Values for a double field.
    Double(&'a [f64]),
}

impl ScatterData<'_> {
    fn len(self) -> usize {
        match self {
            Self::Int(d) => d.len(),
            Self::Double(d) => d.len(),
        }
    }
}

impl Lammps {
    /// Gather a named per-atom field across all atoms, ordered by atom ID.
    ///
    /// An empty name yields `Ok(None)` without entering the engine.
    pub fn gather_atoms(&self, name: &str, kind: FieldKind, width: i32) -> Result<Option<GatherData>> {
        self.gather_impl(GatherOp::Atoms, name, kind, width)
    }

    /// Gather across all atoms in processor order, without sorting by ID.
    pub fn gather_atoms_concat(&self, name: &str, kind: FieldKind, width: i32) -> Result<Option<GatherData>> {
        self.gather_impl(GatherOp::AtomsConcat, name, kind, width)
    }

    /// Gather a named field for an explicit subset of atom IDs.
    pub fn gather_atoms_subset(
        &self,
        name: &str,
        kind: FieldKind,
        width: i32,
        ids: &[i32],
    ) -> Result<Option<GatherData>> {
        self.gather_subset_impl(TargetOp::Atoms, name, kind, width, ids)
    }

    /// Gather a named property of any kind the engine exposes by name,
    /// including fix and compute outputs.
    pub fn gather(&self, name: &str, kind: FieldKind, width: i32) -> Result<Option<GatherData>> {
        self.gather_impl(GatherOp::General, name, kind, width)
    }

    /// As [`Lammps::gather`], in processor order.
    pub fn gather_concat(&self, name: &str, kind: FieldKind, width: i32) -> Result<Option<GatherData>> {
        self.gather_impl(GatherOp::GeneralConcat, name, kind, width)
    }

    /// As [`Lammps::gather`], for an explicit subset of atom IDs.
    pub fn gather_subset(
        &self,
        name: &str,
        kind: FieldKind,
        width: i32,
        ids: &[i32],
    ) -> Result<Option<GatherData>> {
        self.gather_subset_impl(TargetOp::General, name, kind, width, ids)
    }

    /// Scatter a per-atom field back into the engine, atom-ID order.
    ///
    /// # Errors
    ///
    /// [`Error::Operation`] when the data length is not `width × natoms`.
    pub fn scatter_atoms(&self, name: &str, width: i32, data: ScatterData<'_>) -> Result<()> {
        self.scatter_impl(TargetOp::Atoms, name, width, data)
    }

    /// Scatter values for an explicit subset of atom IDs.
    pub fn scatter_atoms_subset(
        &self,
        name: &str,
        width: i32,
        ids: &[i32],
        data: ScatterData<'_>,
    ) -> Result<()> {
        self.scatter_subset_impl(TargetOp::Atoms, name, width, ids, data)
    }

    /// Scatter a named property of any kind the engine exposes by name.
    pub fn scatter(&self, name: &str, width: i32, data: ScatterData<'_>) -> Result<()> {
        self.scatter_impl(TargetOp::General, name, width, data)
    }

    /// As [`Lammps::scatter`], for an explicit subset of atom IDs.
    pub fn scatter_subset(
        &self,
        name: &str,
        width: i32,
        ids: &[i32],
        data: ScatterData<'_>,
    ) -> Result<()> {
        self.scatter_subset_impl(TargetOp::General, name, width, ids, data)
    }

    fn gather_impl(
        &self,
        op: GatherOp,
        name: &str,
        kind: FieldKind,
        width: i32,
    ) -> Result<Option<GatherData>> {
        if name.is_empty() {
            return Ok(None);
        }
        let width = checked_width(width)?;
        let count = self.natoms()? as usize * width.unsigned_abs() as usize;
        let cname = cstring(name)?;
        let data = self.checked("gather", |api, raw| match kind {
            FieldKind::Int => GatherData::Int(api.gather_i32(raw, op, &cname, width, count)),
            FieldKind::Double => GatherData::Double(api.gather_f64(raw, op, &cname, width, count)),
        })?;
        Ok(Some(data))
    }

    fn gather_subset_impl(
        &self,
        op: TargetOp,
        name: &str,
        kind: FieldKind,
        width: i32,
        ids: &[i32],
    ) -> Result<Option<GatherData>> {
        if name.is_empty() {
            return Ok(None);
        }
        let width = checked_width(width)?;
        let cname = cstring(name)?;
        let data = self.checked("gather_subset", |api, raw| match kind {
            FieldKind::Int => GatherData::Int(api.gather_subset_i32(raw, op, &cname, width, ids)),
            FieldKind::Double => {
                GatherData::Double(api.gather_subset_f64(raw, op, &cname, width, ids))
            }
        })?;
        Ok(Some(data))
    }

    fn scatter_impl(&self, op: TargetOp, name: &str, width: i32, data: ScatterData<'_>) -> Result<()> {
        if name.is_empty() {
            return Ok(());
        }
        let width = checked_width(width)?;
        let expected = self.natoms()? as usize * width.unsigned_abs() as usize;
        if data.len() != expected {
            return Err(Error::operation(format!(
                "scatter of {name:?} needs {expected} values, got {}",
                data.len()
            )));
        }
        let cname = cstring(name)?;
        self.checked("scatter", |api, raw| match data {
            ScatterData::Int(d) => api.scatter_i32(raw, op, &cname, width, d),
            ScatterData::Double(d) => api.scatter_f64(raw, op, &cname, width, d),
        })
    }

    fn scatter_subset_impl(
        &self,
        op: TargetOp,
        name: &str,
        width: i32,
        ids: &[i32],
        data: ScatterData<'_>,
    ) -> Result<()> {
        if name.is_empty() {
            return Ok(());
        }
        let width = checked_width(width)?;
        let expected = ids.len() * width.unsigned_abs() as usize;
        if data.len() != expected {
            return Err(Error::operation(format!(
                "subset scatter of {name:?} needs {expected} values, got {}",
                data.len()
            )));
        }
        let cname = cstring(name)?;
        self.checked("scatter_subset", |api, raw| match data {
            ScatterData::Int(d) => api.scatter_subset_i32(raw, op, &cname, width, ids, d),
            ScatterData::Double(d) => api.scatter_subset_f64(raw, op, &cname, width, ids, d),
        })
    }

    /// Create atoms from explicit positions and types.
    ///
    /// `types` fixes the atom count `n`; `ids`, `v` and `image` are optional
    /// parallel slices. Returns the number of atoms actually created. Fewer
    /// than `3 n` coordinates short-circuits to `Ok(0)` without entering
    /// the engine.
    ///
    /// # Errors
    ///
    /// [`Error::Operation`] when an optional slice is present with the
    /// wrong length.
    #[instrument(skip_all, fields(n = types.len()))]
    pub fn create_atoms(
        &self,
        ids: Option<&[TagInt]>,
        types: &[i32],
        x: &[f64],
        v: Option<&[f64]>,
        image: Option<&[ImageInt]>,
        shrink_exceed: bool,
    ) -> Result<u64> {
        let n = types.len();
        if x.len() < 3 * n {
            return Ok(0);
        }
        check_parallel("ids", ids.map(<[TagInt]>::len), n)?;
        check_parallel("v", v.map(<[f64]>::len), 3 * n)?;
        check_parallel("image", image.map(<[ImageInt]>::len), n)?;
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let n = n as i32;
        let created = self.checked("create_atoms", |api, raw| {
            api.create(raw, n, ids, types, x, v, image, shrink_exceed)
        })?;
        Ok(u64::from(created.unsigned_abs()))
    }

    /// Pack periodic image flags into one image word. Flags must lie in
    /// `[-512, 511]`.
    #[must_use]
    pub fn encode_image_flags(&self, ix: i32, iy: i32, iz: i32) -> ImageInt {
        self.api().encode_image(ix, iy, iz)
    }

    /// Unpack an image word into `[ix, iy, iz]`.
    #[must_use]
    pub fn decode_image_flags(&self, image: ImageInt) -> [i32; 3] {
        self.api().decode_image(image)
    }
}

fn checked_width(width: i32) -> Result<i32> {
    if width >= 1 {
        Ok(width)
    } else {
        Err(Error::operation(format!("per-atom width must be positive, got {width}")))
    }
}

fn check_parallel(what: &str, len: Option<usize>, expected: usize) -> Result<()> {
    match len {
        Some(len) if len != expected => Err(Error::operation(format!(
            "{what} slice needs {expected} entries, got {len}"
        ))),
        _ => Ok(()),
    }
}
