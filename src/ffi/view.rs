//! Borrowed views over engine-owned row-pointer arrays.
//!
//! Several native results are `T **`: an array of row pointers, one row per
//! atom, with a fixed number of columns (3 for geometric fields). The rows
//! are owned by the engine and stay valid only while the handle is open and
//! no engine call reallocates atom storage, so these views borrow from the
//! handle and never outlive the call scope they were produced for.

use std::marker::PhantomData;
use std::slice;

/// Read-only view over a native `T **` table.
pub struct RowView<'a, T> {
    rows: *const *mut T,
    nrows: usize,
    ncols: usize,
    _marker: PhantomData<&'a T>,
}

impl<'a, T> RowView<'a, T> {
    /// Wrap raw row pointers.
    ///
    /// # Safety
    ///
    /// `rows` must point to `nrows` valid row pointers, each addressing at
    /// least `ncols` elements, and all of it must stay valid for `'a`.
    pub(crate) unsafe fn from_raw(rows: *const *mut T, nrows: usize, ncols: usize) -> Self {
        Self {
            rows,
            nrows,
            ncols,
            _marker: PhantomData,
        }
    }

    /// Number of rows.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.nrows
    }

    /// Whether the view has no rows.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.nrows == 0
    }

    /// Number of columns per row.
    #[must_use]
    pub const fn ncols(&self) -> usize {
        self.ncols
    }

    /// Borrow one row, or `None` when `index` is out of range.
    #[must_use]
    pub fn row(&self, index: usize) -> Option<&'a [T]> {
        if index >= self.nrows {
            return None;
        }
        // SAFETY: index is in range and from_raw's contract guarantees the
        // row pointer addresses ncols elements valid for 'a.
        Some(unsafe { slice::from_raw_parts(*self.rows.add(index), self.ncols) })
    }

    /// Iterate over all rows in order.
    pub fn rows(&self) -> impl Iterator<Item = &'a [T]> + '_ {
        (0..self.nrows).filter_map(move |i| self.row(i))
    }
}

impl<T> std::fmt::Debug for RowView<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowView")
            .field("nrows", &self.nrows)
            .field("ncols", &self.ncols)
            .finish_non_exhaustive()
    }
}

/// Mutable view over a native `T **` table.
///
/// Used for engine-owned force buffers handed to external callbacks; the
/// callback writes per-atom contributions and the borrow ends with the
/// callback.
pub struct RowViewMut<'a, T> {
    rows: *const *mut T,
    nrows: usize,
    ncols: usize,
    _marker: PhantomData<&'a mut T>,
}

impl<'a, T> RowViewMut<'a, T> {
    /// Wrap raw row pointers for mutation.
    ///
    /// # Safety
    ///
    /// Same as [`RowView::from_raw`], plus exclusive access: no other alias
    /// of the rows may be used while this view exists.
    pub(crate) unsafe fn from_raw(rows: *const *mut T, nrows: usize, ncols: usize) -> Self {
        Self {
            rows,
            nrows,
            ncols,
            _marker: PhantomData,
        }
    }

    /// Number of rows.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.nrows
    }

    /// Whether the view has no rows.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.nrows == 0
    }

    /// Number of columns per row.
    #[must_use]
    pub const fn ncols(&self) -> usize {
        self.ncols
    }

    /// Borrow one row mutably, or `None` when `index` is out of range.
    pub fn row_mut(&mut self, index: usize) -> Option<&mut [T]> {
        if index >= self.nrows {
            return None;
        }
        // SAFETY: index is in range; &mut self guarantees no overlapping
        // borrow of any row from this view.
        Some(unsafe { slice::from_raw_parts_mut(*self.rows.add(index), self.ncols) })
    }
}

impl<T> std::fmt::Debug for RowViewMut<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowViewMut")
            .field("nrows", &self.nrows)
            .field("ncols", &self.ncols)
            .finish_non_exhaustive()
    }
}
