use thiserror::Error;

use crate::prober::DesiredState;

/// Errors returned by the wait operation.
///
/// The `Display` strings are relied on by shell scripts, keep them stable.
#[derive(Debug, Error)]
pub enum WaitError {
    #[error("port out of range: port must be greater than zero")]
    PortTooLow,

    #[error("port out of range: port must be <= 65535")]
    PortTooHigh,

    #[error("cannot resolve host {host:?}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown state {0:?}")]
    UnknownState(String),

    #[error("timeout reached before the port went into state \"{0}\"")]
    Timeout(DesiredState),
}

impl WaitError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::Timeout(_))
    }

    /// Bad input detected before any polling took place.
    pub fn is_validation(&self) -> bool {
        !self.is_timeout()
    }
}
