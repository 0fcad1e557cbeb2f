//! Typed failures for a divergence run.
//!
//! Every variant is fatal to the current invocation. None of them leave the
//! store half-written: the record is only replaced after all computation and
//! validation has succeeded. The fracterval overflow flag is deliberately not
//! an error; it travels with the result instead.

use thiserror::Error;

/// Errors that can occur while building masks, computing divergence, or
/// loading and saving the frequency store.
#[derive(Error, Debug)]
pub enum DivergentError {
    #[error("allocation of {what} failed")]
    OutOfMemory { what: &'static str },

    #[error("{0}")]
    CorruptStore(String),

    #[error("{which} distribution holds {total} masks and cannot take {requested} more")]
    CapacityExceeded {
        which: &'static str,
        total: u64,
        requested: u64,
    },

    #[error("{0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DivergentError {
    /// Short, stable label used as the category of a user-visible message.
    pub fn category(&self) -> &'static str {
        match self {
            Self::OutOfMemory { .. } => "out of memory",
            Self::CorruptStore(_) => "corrupt store",
            Self::CapacityExceeded { .. } => "capacity exceeded",
            Self::InvalidInput(_) => "invalid input",
            Self::Io(_) => "i/o",
        }
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptStore(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, DivergentError>;
