//! FFI quarantine zone - all unsafe code isolated here.
//!
//! # Safety Architecture
//!
//! This module contains ALL unsafe code in the lammps-gate crate. The public
//! API in `src/lib.rs` uses `#![deny(unsafe_code)]`, which is only overridden
//! here.
//!
//! ## Safety Rules
//!
//! - Every `unsafe` block has a `// SAFETY:` comment
//! - No raw pointers escape the FFI module except behind the borrowed-view
//!   types in [`view`], whose lifetimes are tied to the engine handle borrow
//! - All C strings are produced via `CString` and consumed via `CStr`
//! - Every engine-allocated result is released through `lammps_free` by the
//!   [`api::OwnedNative`] guard
//!
//! # Module Structure
//!
//! ```text
//! ffi/
//! ├── mod.rs      # This file - module router, native type aliases
//! ├── loader.rs   # Shared-library location and loading (libloading)
//! ├── api.rs      # Symbol table bound once at load + call wrappers
//! ├── view.rs     # Borrowed row-pointer views over engine memory
//! └── stub.rs     # Test-only in-process fake engine with call spies
//! ```

// Allow unsafe in this module only - quarantine zone
#![allow(unsafe_code)]
#![warn(unsafe_op_in_unsafe_fn)]

use std::ffi::CString;
use std::os::raw::c_void;

use crate::error::{Error, Result};

pub mod api;
pub mod loader;
pub mod view;

#[cfg(test)]
pub mod stub;

/// Opaque handle to one running engine instance.
pub type RawHandle = *mut c_void;

/// The engine's big-integer type (counts, timesteps). Default builds use
/// 64-bit; the builder verifies the width at open time.
pub type BigInt = i64;

/// The engine's per-atom ID type. Default builds use 32-bit.
pub type TagInt = i32;

/// The engine's packed image-flag type. Default builds use 32-bit.
pub type ImageInt = i32;

/// Bounded buffer length for fetching the last error message.
pub const ERROR_BUF_LEN: usize = 100;

/// Bounded buffer length for style/ID/package/plugin name queries.
pub const NAME_BUF_LEN: usize = 100;

/// Bounded buffer length for the OS/compiler info string.
pub const OS_INFO_BUF_LEN: usize = 512;

/// Encode text for a native `char *` argument.
///
/// Interior NUL bytes cannot be represented in a C string; the engine would
/// silently truncate, so reject them here.
pub fn cstring(text: &str) -> Result<CString> {
    CString::new(text)
        .map_err(|_| Error::operation(format!("text argument contains NUL byte: {text:?}")))
}
