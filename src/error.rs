//! Centralized error type for the seqroute umbrella crate.
//!
//! Wraps the subsystem error so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] seqroute_core::Error),

    #[error("Config: {0}")]
    Config(String),

    #[error("Logging: {0}")]
    Logging(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
