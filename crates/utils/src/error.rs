//! Error taxonomy for the forwarding pipeline.
//!
//! Every component returns its own error type, which is folded into
//! [`ForwardError`] by the pipeline. Only the binary decides how a
//! [`ForwardError`] maps to a process exit status, using the
//! `<sysexits.h>` values the mail system understands.

use std::io;

use thiserror::Error;

use crate::{CaptureError, ConfigError, DeliveryError, LookupError};

/// The input data was incorrect in some way (`EX_DATAERR`).
pub const EX_DATAERR: u8 = 65;

/// Temporary failure, the mail system should retry later (`EX_TEMPFAIL`).
pub const EX_TEMPFAIL: u8 = 75;

/// Result type for forwarding operations.
pub type ForwardResult<T> = Result<T, ForwardError>;

/// Broad class of a failure, deciding whether the caller should retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The message itself is at fault, retrying will not help.
    DataError,
    /// Something outside the message failed, retry later.
    TempFailure,
}

impl ErrorKind {
    /// Returns the `<sysexits.h>` status for this kind of failure.
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::DataError => EX_DATAERR,
            ErrorKind::TempFailure => EX_TEMPFAIL,
        }
    }
}

/// Errors that terminate the forwarding of a message.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Parse error: {0}")]
    Parse(#[from] CaptureError),

    #[error("Parse error: Missing return-path header in message")]
    MissingReturnPath,

    #[error("SRS lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("Unexpected error occurred while reading input: {0}")]
    Read(io::Error),

    #[error("Error delivering message to sendmail: {0}")]
    Delivery(#[from] DeliveryError),
}

impl ForwardError {
    /// Classifies the error as a data error or a temporary failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ForwardError::Parse(CaptureError::Io(_)) => ErrorKind::TempFailure,
            ForwardError::Parse(_) | ForwardError::MissingReturnPath => ErrorKind::DataError,
            ForwardError::Config(_)
            | ForwardError::Lookup(_)
            | ForwardError::Read(_)
            | ForwardError::Delivery(_) => ErrorKind::TempFailure,
        }
    }

    /// Shorthand for `self.kind().exit_code()`.
    pub fn exit_code(&self) -> u8 {
        self.kind().exit_code()
    }
}
