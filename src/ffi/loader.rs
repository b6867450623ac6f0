//! Shared-library location and loading.
//!
//! The engine ships as `liblammps.so` (Linux), `liblammps.dylib` (macOS) or
//! `liblammps.dll` (Windows), optionally with a "machine" suffix such as
//! `liblammps_mpi.so`. Resolution tries caller-supplied search paths first
//! and falls back to the bare filename so the system linker search path
//! (`LD_LIBRARY_PATH` and friends) still applies.

use std::path::{Path, PathBuf};

use libloading::Library;
use tracing::debug;

use crate::error::{Error, Result};

/// Base name of the engine shared library, without prefix or extension.
const LIBRARY_STEM: &str = "lammps";

/// Platform-specific shared-library filename for a machine variant.
///
/// `None` yields `liblammps.<ext>`; `Some("mpi")` yields `liblammps_mpi.<ext>`.
#[must_use]
pub fn library_filename(machine: Option<&str>) -> String {
    let stem = match machine {
        Some(m) if !m.is_empty() => format!("{LIBRARY_STEM}_{m}"),
        _ => LIBRARY_STEM.to_string(),
    };
    if cfg!(target_os = "windows") {
        format!("{stem}.dll")
    } else if cfg!(target_os = "macos") {
        format!("lib{stem}.dylib")
    } else {
        format!("lib{stem}.so")
    }
}

/// Resolve the library path: first match in `search_paths`, else the bare
/// filename so the dynamic linker performs its own search.
#[must_use]
pub fn resolve(machine: Option<&str>, search_paths: &[PathBuf]) -> PathBuf {
    let filename = library_filename(machine);
    for dir in search_paths {
        let candidate = dir.join(&filename);
        if candidate.is_file() {
            debug!(path = %candidate.display(), "resolved engine library");
            return candidate;
        }
    }
    PathBuf::from(filename)
}

/// Load the engine shared library from `path`.
///
/// # Errors
///
/// Returns [`Error::Initialization`] if the library cannot be loaded.
pub fn load(path: &Path) -> Result<Library> {
    // SAFETY: loading a shared library runs its initialization code. The
    // engine library is trusted by contract; there is no way to validate it
    // beyond the symbol binding that follows.
    unsafe { Library::new(path) }.map_err(|e| {
        Error::initialization(format!(
            "cannot load engine library {}: {e}",
            path.display()
        ))
    })
}

/// Obtain symbols from the current process image (host-embedded mode).
///
/// Used when an external handle is adopted: the engine executable that
/// embeds us already carries all library symbols, so nothing is loaded.
///
/// # Errors
///
/// Returns [`Error::Initialization`] if the process image cannot be opened.
pub fn load_self() -> Result<Library> {
    #[cfg(unix)]
    {
        Ok(libloading::os::unix::Library::this().into())
    }
    #[cfg(windows)]
    {
        libloading::os::windows::Library::this()
            .map(Into::into)
            .map_err(|e| Error::initialization(format!("cannot open process image: {e}")))
    }
}
