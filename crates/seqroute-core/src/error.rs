//! Error types for the sequencer routing core.

use crate::model::PortAddress;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The session handle is gone (never opened, or already closed).
    #[error("sequencer session not initialized")]
    NotInitialized,

    #[error("sequencer initialization failed: {0}")]
    Initialization(String),

    #[error("{from} is already connected to {to}")]
    AlreadyConnected { from: PortAddress, to: PortAddress },

    #[error("{from} is not connected to {to}")]
    NotConnected { from: PortAddress, to: PortAddress },

    #[error("connect {from} -> {to} failed: {reason}")]
    ConnectFailed {
        from: PortAddress,
        to: PortAddress,
        reason: String,
    },

    #[error("disconnect {from} -> {to} failed: {reason}")]
    UnsubscribeFailed {
        from: PortAddress,
        to: PortAddress,
        reason: String,
    },

    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// The blocking read failed because the session was closed.
    #[error("sequencer session closed")]
    SessionClosed,

    #[error("sequencer error: {0}")]
    Sequencer(String),

    #[error("rule store error: {0}")]
    RuleStore(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// `AlreadyConnected` and `NotConnected` are expected outcomes of racing
    /// with the operator or with hardware removal, never failures.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            Error::AlreadyConnected { .. } | Error::NotConnected { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
