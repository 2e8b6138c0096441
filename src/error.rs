//! Error type for the fallible edges of the GI scene core.
//!
//! Capacity exhaustion is reported through `Option` returns and invariant
//! violations panic; only configuration and persistence go through here.

use crate::core::ViewId;

#[derive(thiserror::Error, Debug)]
pub enum GiError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Unsupported settings file: {0}")]
    BadFormat(String),

    #[error("Unknown view: {0:?}")]
    UnknownView(ViewId),
}

impl GiError {
    pub fn invalid_settings<T: ToString>(msg: T) -> Self {
        GiError::InvalidSettings(msg.to_string())
    }

    pub fn bad_format<T: ToString>(msg: T) -> Self {
        GiError::BadFormat(msg.to_string())
    }
}

pub type GiResult<T> = Result<T, GiError>;
