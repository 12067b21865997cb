//! Error types of the protocol engines.
//!
//! Configuration and misuse problems abort immediately (construction errors
//! or panics with a descriptive message); I/O and protocol errors propagate
//! to the driver. There is no in-protocol retry.

use thiserror::Error;

/// Everything that can go wrong inside the engines.
#[derive(Debug, Error)]
pub enum AstraError {
    /// Unsupported configuration, detected before any protocol work.
    #[error("configuration error: {0}")]
    Config(String),

    /// File or stream failure, including prep-file transmission errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A peer or a prep file delivered less (or other) data than the
    /// protocol step requires.
    #[error("{0}")]
    Protocol(String),

    /// Transport-level failure reported by the network layer.
    #[error("network error: {0}")]
    Network(String),
}

impl AstraError {
    pub(crate) fn insufficient_data(what: &str) -> Self {
        AstraError::Protocol(format!("insufficient data in {what}"))
    }

    pub(crate) fn insufficient_preprocessing() -> Self {
        AstraError::Protocol("insufficient preprocessing".to_string())
    }

    pub(crate) fn unused_data(what: &str) -> Self {
        AstraError::Protocol(format!("unused data in {what}"))
    }

    pub(crate) fn prep_read() -> Self {
        AstraError::Protocol("error in preprocessing reading".to_string())
    }

    pub(crate) fn prep_store() -> Self {
        AstraError::Protocol("error in preprocessing storing".to_string())
    }

    pub(crate) fn wrong_format(what: &str) -> Self {
        AstraError::Protocol(format!("wrong format in {what}"))
    }
}

impl From<eyre::Report> for AstraError {
    fn from(report: eyre::Report) -> Self {
        AstraError::Network(report.to_string())
    }
}
