//! External force callbacks (`fix external`).
//!
//! The engine calls back into the process during a run; the registered hook
//! receives borrowed views of the tags, coordinates, and the force table to
//! fill. The views live only for the duration of one callback, which the
//! borrow checker enforces because they never escape the hook's signature.
//! A panic inside a hook is caught at the language boundary and logged
//! instead of unwinding into the engine.

use tracing::debug;

use crate::engine::Lammps;
use crate::error::Result;
use crate::ffi::api::ExternalSlot;
use crate::ffi::cstring;
use crate::ffi::view::{RowView, RowViewMut};
use crate::ffi::TagInt;

impl Lammps {
    /// Register a force hook for a `fix external` instance.
    ///
    /// The hook receives the current timestep, the local atom tags, the
    /// coordinates, and the force table to fill (one row of 3 per atom).
    /// Registering again for the same fix ID replaces the previous hook;
    /// all hooks are dropped when the instance closes.
    ///
    /// # Errors
    ///
    /// Surfaces the engine's captured error when the fix ID does not name
    /// a `fix external` instance.
    pub fn set_fix_external_callback<F>(&mut self, fix_id: &str, hook: F) -> Result<()>
    where
        F: FnMut(i64, &[TagInt], RowView<'_, f64>, &mut RowViewMut<'_, f64>) + 'static,
    {
        let cid = cstring(fix_id)?;
        let mut slot = Box::new(ExternalSlot {
            hook: Box::new(hook),
        });
        let slot_ptr: *mut ExternalSlot = &mut *slot;
        let raw = self.raw("set_fix_external_callback")?;
        self.api().register_external(raw, &cid, slot_ptr);
        debug!(fix_id, "external force hook registered");
        // the slot box must outlive the registration, so it is stored
        // before the error state is consulted
        self.hooks_mut().insert(fix_id.to_string(), slot);
        self.translate_error()
    }
}
