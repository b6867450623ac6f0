//! Error types for lammps-gate.
//!
//! The taxonomy is deliberately narrow: the engine reports failures through
//! a single internal "last error" slot, and this layer only distinguishes
//! what callers can act on. "Unknown keyword" style outcomes are *not*
//! errors; they are `None` results by the engine's own convention.

use thiserror::Error;

/// Primary error type for lammps-gate operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The shared library could not be located or loaded, a required symbol
    /// is missing, the engine version does not match the expected one, or
    /// the MPI runtime representation does not match the engine build.
    #[error("engine initialization failed: {reason}")]
    Initialization {
        /// Description of what went wrong during setup.
        reason: String,
    },

    /// An operation was attempted on a closed (or never opened) handle.
    #[error("engine handle is closed: cannot {operation}")]
    InvalidState {
        /// The operation that was attempted.
        operation: String,
    },

    /// The engine reported a recoverable error after a call.
    #[error("engine error: {message}")]
    Operation {
        /// Error message fetched from the engine's last-error slot.
        message: String,
    },

    /// The engine reported a collective (MPI) abort.
    ///
    /// Distinguished from [`Error::Operation`] so callers can choose not
    /// to retry.
    #[error("engine aborted: {message}")]
    Abort {
        /// Error message fetched from the engine's last-error slot.
        message: String,
    },
}

/// Result type alias for lammps-gate operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new `Initialization` error.
    #[must_use]
    pub fn initialization(reason: impl Into<String>) -> Self {
        Self::Initialization {
            reason: reason.into(),
        }
    }

    /// Create a new `InvalidState` error.
    #[must_use]
    pub fn invalid_state(operation: impl Into<String>) -> Self {
        Self::InvalidState {
            operation: operation.into(),
        }
    }

    /// Create a new `Operation` error.
    #[must_use]
    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation {
            message: message.into(),
        }
    }

    /// Create a new `Abort` error.
    #[must_use]
    pub fn abort(message: impl Into<String>) -> Self {
        Self::Abort {
            message: message.into(),
        }
    }

    /// Check if this error came from the setup path.
    #[must_use]
    pub const fn is_initialization(&self) -> bool {
        matches!(self, Self::Initialization { .. })
    }

    /// Check if this error is a use-after-close.
    #[must_use]
    pub const fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }

    /// Check if this error is a collective abort.
    #[must_use]
    pub const fn is_abort(&self) -> bool {
        matches!(self, Self::Abort { .. })
    }

    /// Get the engine-reported message, if this error carries one.
    #[must_use]
    pub fn engine_message(&self) -> Option<&str> {
        match self {
            Self::Operation { message } | Self::Abort { message } => Some(message),
            _ => None,
        }
    }
}
