//! Engine handle lifecycle and the error translation shim.
//!
//! [`Lammps`] owns one native engine instance: created through
//! [`LammpsBuilder`], destroyed exactly once on [`Lammps::close`] or drop.
//! Every fallible operation funnels through [`Lammps::checked`], which runs
//! the native call and then consults the engine's captured error state,
//! surfacing it as [`Error::Operation`] or [`Error::Abort`].

use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::PathBuf;

use tracing::{debug, instrument, warn};

use crate::error::{Error, Result};
use crate::ffi::api::{CommWidth, EngineApi, ExternalSlot};
use crate::ffi::{loader, RawHandle};

/// A host MPI communicator handed through to the engine verbatim.
///
/// The value is the native representation reinterpreted as an integer; the
/// declared [`CommWidth`] selects which calling convention carries it. The
/// gateway never interprets the value itself.
#[derive(Debug, Clone, Copy)]
pub struct MpiComm {
    /// Native communicator representation, zero-extended.
    pub value: u64,
    /// Width of the native representation on this host.
    pub width: CommWidth,
}

/// Configures and creates a [`Lammps`] instance.
///
/// # Examples
///
/// ```no_run
/// use lammps_gate::LammpsBuilder;
///
/// let lmp = LammpsBuilder::new()
///     .arg("-log")
///     .arg("none")
///     .build()?;
/// # Ok::<(), lammps_gate::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct LammpsBuilder {
    machine: Option<String>,
    args: Vec<String>,
    comm: Option<MpiComm>,
    expected_version: Option<i32>,
    search_paths: Vec<PathBuf>,
}

impl LammpsBuilder {
    /// Start with defaults: no machine suffix, no arguments, no
    /// communicator (serial instance).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a machine-suffixed library variant (`liblammps_<machine>`).
    #[must_use]
    pub fn machine(mut self, machine: impl Into<String>) -> Self {
        self.machine = Some(machine.into());
        self
    }

    /// Append one command-line argument for the engine instance.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several command-line arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Bind the instance to a caller-supplied MPI communicator.
    #[must_use]
    pub fn comm(mut self, comm: MpiComm) -> Self {
        self.comm = Some(comm);
        self
    }

    /// Require the loaded engine to report exactly this version.
    #[must_use]
    pub fn expected_version(mut self, version: i32) -> Self {
        self.expected_version = Some(version);
        self
    }

    /// Add a directory to probe before falling back to the system loader.
    #[must_use]
    pub fn search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    /// Load the engine library, create an instance, and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Initialization`] when the library cannot be loaded,
    /// a symbol is missing, instance creation fails, a communicator is
    /// supplied to an engine built without MPI support, the reported
    /// version does not match an expectation, or the engine's integer
    /// widths differ from the fixed widths this gateway marshals with.
    #[instrument(skip(self), fields(machine = self.machine.as_deref()))]
    pub fn build(self) -> Result<Lammps> {
        let path = loader::resolve(self.machine.as_deref(), &self.search_paths);
        debug!(path = %path.display(), "loading engine library");
        let api = EngineApi::bind(loader::load(&path)?)?;

        if self.comm.is_some() && api.mpi_support() == 0 {
            return Err(Error::initialization(
                "communicator supplied but the engine was built without MPI support",
            ));
        }

        let raw = match self.comm {
            Some(comm) => api.open_with_comm(&self.args, comm.value, comm.width)?,
            None => api.open_serial(&self.args)?,
        };
        if raw.is_null() {
            return Err(Error::initialization("engine instance creation failed"));
        }

        // From here on the instance is owned; early returns destroy it
        // through Drop.
        let lmp = Lammps::assemble(api, raw, true);
        lmp.validate(self.expected_version)?;
        debug!(version = lmp.version()?, "engine instance ready");
        Ok(lmp)
    }
}

/// A live engine instance behind the safe gateway.
///
/// Deliberately `!Send` and `!Sync`: the engine serializes no internal
/// state, so all calls against one instance stay on the thread that
/// created it.
pub struct Lammps {
    api: EngineApi,
    raw: RawHandle,
    owned: bool,
    exceptions: bool,
    hooks: HashMap<String, Box<ExternalSlot>>,
    _not_send_sync: PhantomData<*const ()>,
}

impl Lammps {
    fn assemble(api: EngineApi, raw: RawHandle, owned: bool) -> Self {
        let exceptions = api.exceptions_enabled();
        Self {
            api,
            raw,
            owned,
            exceptions,
            hooks: HashMap::new(),
            _not_send_sync: PhantomData,
        }
    }

    /// Wrap an engine instance created by the host process.
    ///
    /// The wrapper calls into the instance but never destroys it.
    ///
    /// # Safety
    ///
    /// The engine library must already be loaded into this process and
    /// `instance` must point at a live engine instance. The engine
    /// dereferences the handle on every call, starting with the width
    /// validation here; the null check cannot establish validity of a
    /// non-null pointer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Initialization`] when `instance` is null, the
    /// process image does not carry the engine symbols, or validation of
    /// the instance fails.
    // The one unsafe declaration outside the ffi quarantine: the
    // obligation lies with the caller, not this body.
    #[allow(unsafe_code)]
    pub unsafe fn adopt(instance: RawHandle) -> Result<Self> {
        if instance.is_null() {
            return Err(Error::initialization("cannot adopt a null engine instance"));
        }
        let api = EngineApi::bind(loader::load_self()?)?;
        let lmp = Self::assemble(api, instance, false);
        lmp.validate(None)?;
        Ok(lmp)
    }

    /// Whether the engine library can be loaded and bound on this machine.
    #[must_use]
    pub fn library_available(machine: Option<&str>) -> bool {
        let path = loader::resolve(machine, &[]);
        loader::load(&path).and_then(EngineApi::bind).is_ok()
    }

    fn validate(&self, expected_version: Option<i32>) -> Result<()> {
        let widths = (
            self.setting_or(-1, "bigint"),
            self.setting_or(-1, "tagint"),
            self.setting_or(-1, "imageint"),
        );
        verify_int_widths(widths.0, widths.1, widths.2)?;
        if let Some(expected) = expected_version {
            let actual = self.version()?;
            if actual != expected {
                return Err(Error::initialization(format!(
                    "engine version {actual} does not match required {expected}"
                )));
            }
        }
        Ok(())
    }

    fn setting_or(&self, fallback: i32, name: &str) -> i32 {
        crate::ffi::cstring(name)
            .map(|n| self.api.setting(self.raw, &n))
            .unwrap_or(fallback)
    }

    // ------------------------------------------------------------------
    // plumbing shared with the marshaling modules

    pub(crate) fn api(&self) -> &EngineApi {
        &self.api
    }

    pub(crate) fn raw(&self, operation: &str) -> Result<RawHandle> {
        if self.raw.is_null() {
            Err(Error::invalid_state(operation))
        } else {
            Ok(self.raw)
        }
    }

    pub(crate) fn hooks_mut(&mut self) -> &mut HashMap<String, Box<ExternalSlot>> {
        &mut self.hooks
    }

    /// Run a native call and then surface any error the engine captured.
    pub(crate) fn checked<T>(
        &self,
        operation: &str,
        call: impl FnOnce(&EngineApi, RawHandle) -> T,
    ) -> Result<T> {
        let raw = self.raw(operation)?;
        let value = call(&self.api, raw);
        self.translate_error()?;
        Ok(value)
    }

    /// Run a native call whose entry point reports nothing through the
    /// engine's error state.
    pub(crate) fn direct<T>(
        &self,
        operation: &str,
        call: impl FnOnce(&EngineApi, RawHandle) -> T,
    ) -> Result<T> {
        let raw = self.raw(operation)?;
        Ok(call(&self.api, raw))
    }

    /// The error translation shim: map the engine's captured error state
    /// onto [`Error::Abort`] (discriminant 2) or [`Error::Operation`].
    pub(crate) fn translate_error(&self) -> Result<()> {
        if !self.exceptions || self.raw.is_null() {
            return Ok(());
        }
        if !self.api.error_flag(self.raw) {
            return Ok(());
        }
        let (kind, message) = self.api.last_error(self.raw);
        if kind == 2 {
            warn!(%message, "engine reported an abort");
            Err(Error::abort(message))
        } else {
            Err(Error::operation(message))
        }
    }

    // ------------------------------------------------------------------
    // lifecycle

    /// Destroy the underlying instance. Safe to call more than once;
    /// adopted instances are detached, not destroyed.
    pub fn close(&mut self) {
        if self.raw.is_null() {
            return;
        }
        if self.owned {
            self.api.close_handle(self.raw);
        }
        self.raw = std::ptr::null_mut();
        self.hooks.clear();
    }

    /// Close this instance and shut down the engine's MPI subsystem.
    /// Process-wide and irreversible; no instance may be created after.
    pub fn finalize(&mut self) {
        self.close();
        self.api.finalize_process();
    }

    /// Whether the instance is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.raw.is_null()
    }

    // ------------------------------------------------------------------
    // instance info

    /// Engine version as a date-encoded integer (`YYYYMMDD`).
    pub fn version(&self) -> Result<i32> {
        self.direct("version", |api, raw| api.engine_version(raw))
    }

    /// Host and build description reported by the engine library.
    #[must_use]
    pub fn os_info(&self) -> String {
        self.api.os_info()
    }

    /// Fortran-style integer handle of the instance's communicator.
    pub fn mpi_comm_fortran(&self) -> Result<i32> {
        self.direct("mpi_comm_fortran", |api, raw| api.mpi_comm_f(raw))
    }

    /// Whether the engine is inside a `run` or `minimize` loop.
    pub fn is_running(&self) -> Result<bool> {
        self.direct("is_running", |api, raw| api.running(raw))
    }

    /// Ask a running loop to stop at the next opportunity. Advisory.
    pub fn force_timeout(&self) -> Result<()> {
        self.direct("force_timeout", |api, raw| api.request_timeout(raw))
    }

    #[cfg(test)]
    pub(crate) fn from_stub(api: EngineApi, raw: RawHandle, owned: bool) -> Self {
        Self::assemble(api, raw, owned)
    }
}

impl Drop for Lammps {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Lammps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lammps")
            .field("open", &self.is_open())
            .field("owned", &self.owned)
            .field("exceptions", &self.exceptions)
            .finish_non_exhaustive()
    }
}

/// The gateway marshals with fixed 8-byte step counters and 4-byte atom
/// IDs and image words; an engine built with other widths cannot be used.
fn verify_int_widths(bigint: i32, tagint: i32, imageint: i32) -> Result<()> {
    if (bigint, tagint, imageint) == (8, 4, 4) {
        Ok(())
    } else {
        Err(Error::initialization(format!(
            "unsupported engine integer widths: bigint={bigint}, tagint={tagint}, imageint={imageint} (need 8/4/4)"
        )))
    }
}
