//! lammps-gate: a safe Rust gateway to the LAMMPS molecular dynamics engine
//!
//! The engine ships as a C library (`liblammps`) driven through opaque
//! instance handles and `void *` results. This crate loads that library at
//! runtime, binds its entry points once, and exposes them behind ordinary
//! Rust types, so a caller never touches a raw pointer.
//!
//! # Quick Start
//!
//! ```no_run
//! use lammps_gate::{Lammps, LammpsBuilder};
//!
//! let mut lmp = LammpsBuilder::new().arg("-log").arg("none").build()?;
//! lmp.command("units lj")?;
//! lmp.command("region box block 0 10 0 10 0 10")?;
//! lmp.command("create_box 1 box")?;
//! println!("atoms: {}", lmp.natoms()?);
//! lmp.close();
//! # Ok::<(), lammps_gate::Error>(())
//! ```
//!
//! # Safety Guarantees
//!
//! This crate denies unsafe code at the library level. All FFI code is
//! quarantined in the internal `ffi` module, which is not exported; every
//! unsafe block there carries a SAFETY comment stating the native contract
//! it relies on.
//!
//! Polymorphic engine results are never interpreted by caller-supplied
//! shape: every extraction queries the engine's own datatype discriminant
//! or size entry points first and returns a typed enum ([`GlobalValue`],
//! [`AtomView`], [`ComputeData`], ...).
//!
//! # Error Handling
//!
//! Fallible operations return [`Result<T, Error>`]. When the engine build
//! supports error capture, every fallible call is followed by an error
//! check, and a pending engine error surfaces as [`Error::Operation`] or
//! [`Error::Abort`] with the engine's own message.
//!
//! # Thread Safety
//!
//! The engine is not reentrant, so [`Lammps`] is `!Send` and `!Sync`: all
//! calls against one instance stay on the thread that created it. Separate
//! instances on separate threads are fine.

// SAFETY: This crate denies unsafe code at the library level.
// All unsafe FFI code is quarantined in src/ffi/, which is not exported.
// We use deny (not forbid) so it can be overridden in the ffi module.
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)] // Allow LAMMPS, rRESPA, etc. without backticks

pub mod command;
pub mod engine;
pub mod error;
pub mod external;
pub mod extract;
pub mod gather;
pub mod introspect;
pub mod neighbor;

// FFI module is internal only - not exported
mod ffi;

// Re-export main types for convenience
pub use engine::{Lammps, LammpsBuilder, MpiComm};
pub use error::{Error, Result};
pub use extract::{
    AtomView, ComputeData, DataKind, DataType, FixData, GlobalValue, SimBox, Style, Table,
    VarStyle, VariableData,
};
pub use ffi::api::CommWidth;
pub use ffi::view::{RowView, RowViewMut};
pub use ffi::{BigInt, ImageInt, TagInt};
pub use gather::{FieldKind, GatherData, ScatterData};
pub use neighbor::NeighListId;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Check whether the engine library can be loaded on this machine.
///
/// Probes the default library name; a `machine`-suffixed build can be
/// probed through [`Lammps::library_available`].
#[must_use]
pub fn is_available() -> bool {
    Lammps::library_available(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_not_empty() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_is_available_does_not_panic() {
        // true only on machines with the engine installed; either way the
        // probe must not panic
        let _ = is_available();
    }
}
