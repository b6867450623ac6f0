//! Typed extraction of engine state.
//!
//! The native extract entry points are datatype-polymorphic: they return
//! `void *` and a separate discriminant describes the shape. Every accessor
//! here queries the discriminant (or the documented size query) first and
//! returns a typed enum, so a caller can never read engine memory with the
//! wrong shape.

use tracing::debug;

use crate::engine::Lammps;
use crate::error::{Error, Result};
use crate::ffi::cstring;
use crate::ffi::view::RowView;

/// Native datatype discriminant reported for global and per-atom properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// 32-bit integer scalar or vector.
    Int,
    /// 2-D table of 32-bit integers.
    Int2d,
    /// Double scalar or vector.
    Double,
    /// 2-D table of doubles.
    Double2d,
    /// 64-bit integer scalar or vector.
    Int64,
    /// 2-D table of 64-bit integers.
    Int642d,
    /// NUL-terminated string.
    Str,
}

impl DataType {
    pub(crate) fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Int),
            1 => Some(Self::Int2d),
            2 => Some(Self::Double),
            3 => Some(Self::Double2d),
            4 => Some(Self::Int64),
            5 => Some(Self::Int642d),
            6 => Some(Self::Str),
            _ => None,
        }
    }
}

/// Which population a compute or fix result describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    /// One value set for the whole system.
    Global,
    /// One entry per local atom.
    PerAtom,
    /// One entry per local pair/bond/... item.
    Local,
}

impl Style {
    pub(crate) const fn raw(self) -> i32 {
        match self {
            Self::Global => 0,
            Self::PerAtom => 1,
            Self::Local => 2,
        }
    }
}

/// Which facet of a compute or fix to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    /// Single value.
    Scalar,
    /// 1-D vector.
    Vector,
    /// 2-D array.
    Array,
    /// Length of the vector facet.
    SizeVector,
    /// Row count of the array facet.
    SizeRows,
    /// Column count of the array facet.
    SizeCols,
}

impl DataKind {
    pub(crate) const fn raw(self) -> i32 {
        match self {
            Self::Scalar => 0,
            Self::Vector => 1,
            Self::Array => 2,
            Self::SizeVector => 3,
            Self::SizeRows => 4,
            Self::SizeCols => 5,
        }
    }
}

/// Evaluation style of an input-script variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarStyle {
    /// Evaluates to one number.
    Equal,
    /// Evaluates to one number per local atom.
    Atom,
}

/// Simulation box geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimBox {
    /// Lower bounds per dimension.
    pub lo: [f64; 3],
    /// Upper bounds per dimension.
    pub hi: [f64; 3],
    /// Tilt factor xy.
    pub xy: f64,
    /// Tilt factor yz.
    pub yz: f64,
    /// Tilt factor xz.
    pub xz: f64,
    /// Periodic boundary flag per dimension.
    pub periodicity: [bool; 3],
    /// Whether a fix is changing the box during a run.
    pub box_change: bool,
}

/// A global property, copied out of the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum GlobalValue {
    /// 32-bit integer scalar.
    Int(i32),
    /// 64-bit integer scalar.
    Int64(i64),
    /// Double scalar.
    Double(f64),
    /// 32-bit integer vector.
    IntVec(Vec<i32>),
    /// 64-bit integer vector.
    Int64Vec(Vec<i64>),
    /// Double vector.
    DoubleVec(Vec<f64>),
    /// String value.
    Str(String),
}

/// A per-atom property, borrowed from engine storage.
///
/// The borrow is tied to the [`Lammps`] handle; any command can reallocate
/// per-atom storage, and the borrow checker refuses a view held across one.
#[derive(Debug)]
pub enum AtomView<'lmp> {
    /// 1-D 32-bit integer field.
    Int(&'lmp [i32]),
    /// 1-D 64-bit integer field.
    Int64(&'lmp [i64]),
    /// 1-D double field.
    Double(&'lmp [f64]),
    /// 2-D 32-bit integer field, 3 columns per row.
    IntRows(RowView<'lmp, i32>),
    /// 2-D 64-bit integer field, 3 columns per row.
    Int64Rows(RowView<'lmp, i64>),
    /// 2-D double field, 3 columns per row.
    DoubleRows(RowView<'lmp, f64>),
}

/// A dense row-major table copied out of the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    nrows: usize,
    ncols: usize,
    data: Vec<f64>,
}

impl Table {
    pub(crate) fn new(nrows: usize, ncols: usize, data: Vec<f64>) -> Self {
        debug_assert_eq!(data.len(), nrows * ncols);
        Self { nrows, ncols, data }
    }

    #[must_use]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    #[must_use]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// One row as a slice, or `None` past the end.
    #[must_use]
    pub fn row(&self, r: usize) -> Option<&[f64]> {
        if r < self.nrows {
            Some(&self.data[r * self.ncols..(r + 1) * self.ncols])
        } else {
            None
        }
    }

    /// One cell, or `None` out of bounds.
    #[must_use]
    pub fn get(&self, r: usize, c: usize) -> Option<f64> {
        if c < self.ncols {
            self.row(r).map(|row| row[c])
        } else {
            None
        }
    }

    /// The flat row-major backing data.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

/// A compute result, copied out of the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum ComputeData {
    /// Global scalar result.
    Scalar(f64),
    /// Vector result, copied out.
    Vector(Vec<f64>),
    /// Array result, copied out row-major.
    Array(Table),
    /// A size query result (vector length, row or column count).
    Size(i32),
}

/// A fix result, copied out of the engine.
///
/// Global fix values are engine-allocated; the copy-then-free happens
/// before this is returned, so no caller ever sees the allocation.
#[derive(Debug, Clone, PartialEq)]
pub enum FixData {
    /// One global value, selected by `nrow`/`ncol`.
    Scalar(f64),
    /// Vector result, copied out.
    Vector(Vec<f64>),
    /// Array result, copied out row-major.
    Array(Table),
    /// A size query result (vector length, row or column count).
    Size(i32),
}

/// A variable evaluation, copied out of the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableData {
    /// Equal-style evaluation: one number.
    Equal(f64),
    /// Atom-style evaluation: one number per local atom.
    Atom(Vec<f64>),
}

// Global keywords that are 3-vectors rather than scalars.
const VEC3_GLOBALS: &[&str] = &[
    "boxlo",
    "boxhi",
    "sublo",
    "subhi",
    "sublo_lambda",
    "subhi_lambda",
    "periodicity",
];

impl Lammps {
    /// Total atom count across the whole system.
    pub fn natoms(&self) -> Result<u64> {
        let n = self.direct("natoms", |api, raw| api.natoms(raw))?;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let n = n as u64;
        Ok(n)
    }

    /// Current box geometry.
    pub fn extract_box(&self) -> Result<SimBox> {
        self.checked("extract_box", |api, raw| {
            let b = api.box_params(raw);
            SimBox {
                lo: b.lo,
                hi: b.hi,
                xy: b.xy,
                yz: b.yz,
                xz: b.xz,
                periodicity: [
                    b.periodicity[0] != 0,
                    b.periodicity[1] != 0,
                    b.periodicity[2] != 0,
                ],
                box_change: b.box_change != 0,
            }
        })
    }

    /// Replace the box geometry. Only valid before atoms exist or between
    /// runs; the engine reports violations through its error state.
    pub fn reset_box(
        &self,
        lo: [f64; 3],
        hi: [f64; 3],
        xy: f64,
        yz: f64,
        xz: f64,
    ) -> Result<()> {
        self.checked("reset_box", |api, raw| api.set_box(raw, lo, hi, xy, yz, xz))
    }

    /// Evaluate a thermo keyword (`temp`, `pe`, `press`, ...).
    ///
    /// An empty name yields `Ok(None)` without entering the engine.
    pub fn get_thermo(&self, name: &str) -> Result<Option<f64>> {
        if name.is_empty() {
            return Ok(None);
        }
        let name = cstring(name)?;
        self.checked("get_thermo", |api, raw| Some(api.thermo(raw, &name)))
    }

    /// Query a named integer setting; `None` when the engine does not know
    /// the name.
    pub fn extract_setting(&self, name: &str) -> Result<Option<i32>> {
        let name = cstring(name)?;
        let value = self.direct("extract_setting", |api, raw| api.setting(raw, &name))?;
        Ok((value >= 0).then_some(value))
    }

    /// Datatype of a global property, `None` for unknown names.
    pub fn extract_global_datatype(&self, name: &str) -> Result<Option<DataType>> {
        let cname = cstring(name)?;
        let raw = self.direct("extract_global_datatype", |api, raw| {
            api.global_datatype(raw, &cname)
        })?;
        Ok(DataType::from_raw(raw))
    }

    /// Copy a global property out as a typed value.
    ///
    /// The shape comes from the engine's own datatype report plus the known
    /// vector keywords, never from the caller.
    pub fn extract_global(&self, name: &str) -> Result<Option<GlobalValue>> {
        let Some(dtype) = self.extract_global_datatype(name)? else {
            debug!(name, "unknown global property");
            return Ok(None);
        };
        let len = self.global_len(name)?;
        let cname = cstring(name)?;
        let raw = self.raw("extract_global")?;
        let api = self.api();
        let value = match dtype {
            DataType::Int | DataType::Int2d => {
                api.global_vec::<i32>(raw, &cname, len).map(|mut v| {
                    if len == 1 {
                        GlobalValue::Int(v.remove(0))
                    } else {
                        GlobalValue::IntVec(v)
                    }
                })
            }
            DataType::Int64 | DataType::Int642d => {
                api.global_vec::<i64>(raw, &cname, len).map(|mut v| {
                    if len == 1 {
                        GlobalValue::Int64(v.remove(0))
                    } else {
                        GlobalValue::Int64Vec(v)
                    }
                })
            }
            DataType::Double | DataType::Double2d => {
                api.global_vec::<f64>(raw, &cname, len).map(|mut v| {
                    if len == 1 {
                        GlobalValue::Double(v.remove(0))
                    } else {
                        GlobalValue::DoubleVec(v)
                    }
                })
            }
            DataType::Str => api.global_str(raw, &cname).map(GlobalValue::Str),
        };
        Ok(value)
    }

    fn global_len(&self, name: &str) -> Result<usize> {
        if VEC3_GLOBALS.contains(&name) {
            return Ok(3);
        }
        if name == "respa_dt" {
            // one entry per rRESPA level
            return match self.extract_global("respa_levels")? {
                Some(GlobalValue::Int(n)) => Ok(n.unsigned_abs() as usize),
                _ => Ok(1),
            };
        }
        Ok(1)
    }

    /// Datatype of a per-atom property, `None` for unknown names.
    pub fn extract_atom_datatype(&self, name: &str) -> Result<Option<DataType>> {
        let cname = cstring(name)?;
        let raw = self.direct("extract_atom_datatype", |api, raw| {
            api.atom_datatype(raw, &cname)
        })?;
        Ok(DataType::from_raw(raw))
    }

    /// Borrow a per-atom property directly from engine storage.
    ///
    /// 1-D views span `nmax` entries, 2-D views `nmax` rows of 3 columns,
    /// matching how the engine dimensions per-atom arrays.
    pub fn extract_atom(&self, name: &str) -> Result<Option<AtomView<'_>>> {
        let Some(dtype) = self.extract_atom_datatype(name)? else {
            return Ok(None);
        };
        let nmax = self
            .extract_setting("nmax")?
            .ok_or_else(|| Error::operation("engine does not report nmax"))?;
        let n = nmax.unsigned_abs() as usize;
        let cname = cstring(name)?;
        let raw = self.raw("extract_atom")?;
        let api = self.api();
        let view = match dtype {
            DataType::Int => api.atom_slice::<i32>(raw, &cname, n).map(AtomView::Int),
            DataType::Int64 => api.atom_slice::<i64>(raw, &cname, n).map(AtomView::Int64),
            DataType::Double => api.atom_slice::<f64>(raw, &cname, n).map(AtomView::Double),
            DataType::Int2d => api.atom_rows::<i32>(raw, &cname, n, 3).map(AtomView::IntRows),
            DataType::Int642d => api
                .atom_rows::<i64>(raw, &cname, n, 3)
                .map(AtomView::Int64Rows),
            DataType::Double2d => api
                .atom_rows::<f64>(raw, &cname, n, 3)
                .map(AtomView::DoubleRows),
            DataType::Str => None,
        };
        Ok(view)
    }

    /// Extract a compute result, sized by the compute's own size queries.
    pub fn extract_compute(
        &self,
        id: &str,
        style: Style,
        kind: DataKind,
    ) -> Result<Option<ComputeData>> {
        let cid = cstring(id)?;
        let raw = self.raw("extract_compute")?;
        let api = self.api();
        let fetch = |kind: DataKind| api.compute_ptr(raw, &cid, style.raw(), kind.raw());
        let value = match (style, kind) {
            (_, DataKind::SizeVector | DataKind::SizeRows | DataKind::SizeCols) => {
                api.deref_i32(fetch(kind)).map(ComputeData::Size)
            }
            (Style::Global, DataKind::Scalar) => {
                api.deref_f64(fetch(DataKind::Scalar)).map(ComputeData::Scalar)
            }
            (Style::Global, DataKind::Vector) => {
                let len = api.deref_i32(fetch(DataKind::SizeVector));
                len.and_then(|len| {
                    api.copy_f64_slice(fetch(DataKind::Vector), len.unsigned_abs() as usize)
                })
                .map(ComputeData::Vector)
            }
            (Style::Global | Style::Local, DataKind::Array) => {
                self.compute_array(fetch, None)?
            }
            (Style::Local, DataKind::Scalar) => {
                // local computes report their row count through the scalar slot
                api.deref_i32(fetch(DataKind::Scalar)).map(ComputeData::Size)
            }
            (Style::Local, DataKind::Vector) => {
                let len = api.deref_i32(fetch(DataKind::SizeRows));
                len.and_then(|len| {
                    api.copy_f64_slice(fetch(DataKind::Vector), len.unsigned_abs() as usize)
                })
                .map(ComputeData::Vector)
            }
            (Style::PerAtom, DataKind::Scalar) => None,
            (Style::PerAtom, DataKind::Vector) => {
                let len = self.nlocal()?;
                api.copy_f64_slice(fetch(DataKind::Vector), len).map(ComputeData::Vector)
            }
            (Style::PerAtom, DataKind::Array) => {
                let rows = self.nlocal()?;
                self.compute_array(fetch, Some(rows))?
            }
        };
        self.translate_error()?;
        Ok(value)
    }

    fn compute_array(
        &self,
        fetch: impl Fn(DataKind) -> *mut std::ffi::c_void,
        rows: Option<usize>,
    ) -> Result<Option<ComputeData>> {
        let api = self.api();
        let nrows = match rows {
            Some(n) => n,
            None => match api.deref_i32(fetch(DataKind::SizeRows)) {
                Some(n) => n.unsigned_abs() as usize,
                None => return Ok(None),
            },
        };
        let Some(ncols) = api.deref_i32(fetch(DataKind::SizeCols)) else {
            return Ok(None);
        };
        let ncols = ncols.unsigned_abs() as usize;
        let data = api.copy_f64_rows(fetch(DataKind::Array), nrows, ncols);
        Ok(data.map(|d| ComputeData::Array(Table::new(nrows, ncols, d))))
    }

    /// Extract a fix result.
    ///
    /// Global fix values are engine-allocated one at a time: `nrow`/`ncol`
    /// index into the fix's vector or array, and the allocation is copied
    /// and released before returning.
    pub fn extract_fix(
        &self,
        id: &str,
        style: Style,
        kind: DataKind,
        nrow: i32,
        ncol: i32,
    ) -> Result<Option<FixData>> {
        let cid = cstring(id)?;
        let raw = self.raw("extract_fix")?;
        let api = self.api();
        let fetch =
            |kind: DataKind, r: i32, c: i32| api.fix_ptr(raw, &cid, style.raw(), kind.raw(), r, c);
        let value = match (style, kind) {
            (_, DataKind::SizeVector | DataKind::SizeRows | DataKind::SizeCols) => {
                api.deref_i32(fetch(kind, 0, 0)).map(FixData::Size)
            }
            (Style::Global, _) => api.take_f64(fetch(kind, nrow, ncol)).map(FixData::Scalar),
            (Style::PerAtom | Style::Local, DataKind::Scalar) => None,
            (Style::PerAtom, DataKind::Vector) => {
                let len = self.nlocal()?;
                api.copy_f64_slice(fetch(kind, 0, 0), len).map(FixData::Vector)
            }
            (Style::Local, DataKind::Vector) => {
                let len = api.deref_i32(fetch(DataKind::SizeRows, 0, 0));
                len.and_then(|len| {
                    api.copy_f64_slice(fetch(kind, 0, 0), len.unsigned_abs() as usize)
                })
                .map(FixData::Vector)
            }
            (Style::PerAtom | Style::Local, DataKind::Array) => {
                let nrows = match style {
                    Style::PerAtom => self.nlocal()?,
                    _ => match api.deref_i32(fetch(DataKind::SizeRows, 0, 0)) {
                        Some(n) => n.unsigned_abs() as usize,
                        None => return Ok(None),
                    },
                };
                let ncols = api.deref_i32(fetch(DataKind::SizeCols, 0, 0));
                ncols
                    .and_then(|c| {
                        let c = c.unsigned_abs() as usize;
                        api.copy_f64_rows(fetch(kind, 0, 0), nrows, c)
                            .map(|d| FixData::Array(Table::new(nrows, c, d)))
                    })
            }
        };
        self.translate_error()?;
        Ok(value)
    }

    /// Evaluate a variable. Atom-style results carry one value per local
    /// atom; both styles copy out of an engine allocation that is released
    /// before returning.
    pub fn extract_variable(
        &self,
        name: &str,
        group: Option<&str>,
        style: VarStyle,
    ) -> Result<Option<VariableData>> {
        let cname = cstring(name)?;
        let cgroup = group.map(cstring).transpose()?;
        let raw = self.raw("extract_variable")?;
        let api = self.api();
        let p = api.variable_ptr(raw, &cname, cgroup.as_deref());
        let value = match style {
            VarStyle::Equal => api.take_f64(p).map(VariableData::Equal),
            VarStyle::Atom => {
                let len = self.nlocal()?;
                api.take_f64_vec(p, len).map(VariableData::Atom)
            }
        };
        self.translate_error()?;
        Ok(value)
    }

    /// Assign a string value to a string-style variable. Returns the
    /// engine's status code: 0 on success, -1 for an unknown variable.
    /// An empty name or value short-circuits to -1 without entering the
    /// engine.
    pub fn set_variable(&self, name: &str, value: &str) -> Result<i32> {
        if name.is_empty() || value.is_empty() {
            return Ok(-1);
        }
        let cname = cstring(name)?;
        let cvalue = cstring(value)?;
        self.checked("set_variable", |api, raw| {
            api.assign_variable(raw, &cname, &cvalue)
        })
    }

    pub(crate) fn nlocal(&self) -> Result<usize> {
        let n = self
            .extract_setting("nlocal")?
            .ok_or_else(|| Error::operation("engine does not report nlocal"))?;
        Ok(n.unsigned_abs() as usize)
    }
}
