//! Read access to the engine's neighbor lists.

use crate::engine::Lammps;
use crate::error::Result;
use crate::ffi::cstring;

/// Opaque index of one neighbor list inside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighListId(i32);

impl Lammps {
    /// Find the neighbor list of a pair style.
    ///
    /// `exact` requires the style name to match exactly instead of as a
    /// prefix; `nsub` selects among multiple sub-style instances and
    /// `request` among multiple lists of one style. `Ok(None)` when no such
    /// list exists.
    pub fn find_pair_neighlist(
        &self,
        style: &str,
        exact: bool,
        nsub: i32,
        request: i32,
    ) -> Result<Option<NeighListId>> {
        let cstyle = cstring(style)?;
        let idx = self.direct("find_pair_neighlist", |api, raw| {
            api.pair_neighlist(raw, &cstyle, exact, nsub, request)
        })?;
        Ok((idx >= 0).then_some(NeighListId(idx)))
    }

    /// Find the neighbor list requested by a fix.
    pub fn find_fix_neighlist(&self, id: &str, request: i32) -> Result<Option<NeighListId>> {
        let cid = cstring(id)?;
        let idx = self.direct("find_fix_neighlist", |api, raw| {
            api.fix_neighlist(raw, &cid, request)
        })?;
        Ok((idx >= 0).then_some(NeighListId(idx)))
    }

    /// Find the neighbor list requested by a compute.
    pub fn find_compute_neighlist(&self, id: &str, request: i32) -> Result<Option<NeighListId>> {
        let cid = cstring(id)?;
        let idx = self.direct("find_compute_neighlist", |api, raw| {
            api.compute_neighlist(raw, &cid, request)
        })?;
        Ok((idx >= 0).then_some(NeighListId(idx)))
    }

    /// Number of entries in a neighbor list.
    pub fn neighlist_size(&self, list: NeighListId) -> Result<usize> {
        let n = self.direct("neighlist_size", |api, raw| api.neighlist_len(raw, list.0))?;
        Ok(n.max(0).unsigned_abs() as usize)
    }

    /// One entry of a neighbor list: the central atom's local index and
    /// its neighbors' local indices, borrowed from engine storage.
    ///
    /// `Ok(None)` for an element index past the end of the list.
    pub fn neighlist_element(
        &self,
        list: NeighListId,
        element: i32,
    ) -> Result<Option<(i32, &[i32])>> {
        let raw = self.raw("neighlist_element")?;
        Ok(self.api().neighlist_entry(raw, list.0, element))
    }
}
