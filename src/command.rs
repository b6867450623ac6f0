//! Script and command execution.

use tracing::{debug, instrument};

use crate::engine::Lammps;
use crate::error::Result;
use crate::ffi::cstring;

impl Lammps {
    /// Read and execute a script file.
    ///
    /// An empty path is a no-op; the engine is never entered.
    ///
    /// # Errors
    ///
    /// Surfaces the engine's captured error, or [`crate::Error::InvalidState`]
    /// on a closed instance.
    #[instrument(skip(self))]
    pub fn file(&self, path: &str) -> Result<()> {
        if path.is_empty() {
            return Ok(());
        }
        let path = cstring(path)?;
        self.checked("file", |api, raw| api.run_file(raw, &path))
    }

    /// Execute a single input-script command.
    ///
    /// Empty text is a no-op; the engine is never entered.
    ///
    /// # Errors
    ///
    /// Surfaces the engine's captured error, or [`crate::Error::InvalidState`]
    /// on a closed instance.
    #[instrument(skip(self))]
    pub fn command(&self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        debug!(%text, "dispatching command");
        let cmd = cstring(text)?;
        self.checked("command", |api, raw| api.run_command(raw, &cmd))
    }

    /// Execute several commands in order, as one native call.
    ///
    /// # Errors
    ///
    /// Surfaces the engine's captured error, or [`crate::Error::InvalidState`]
    /// on a closed instance.
    pub fn commands_list(&self, commands: &[&str]) -> Result<()> {
        let cmds = commands
            .iter()
            .map(|c| cstring(c))
            .collect::<Result<Vec<_>>>()?;
        self.checked("commands_list", |api, raw| api.run_commands_list(raw, &cmds))
    }

    /// Execute a multi-line block of commands, newline separated.
    ///
    /// # Errors
    ///
    /// Surfaces the engine's captured error, or [`crate::Error::InvalidState`]
    /// on a closed instance.
    pub fn commands_string(&self, block: &str) -> Result<()> {
        let block = cstring(block)?;
        self.checked("commands_string", |api, raw| {
            api.run_commands_string(raw, &block);
        })
    }
}
