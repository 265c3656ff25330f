use std::time::Duration;

use thiserror::Error;

/// Failure of a cache or version-store call.
///
/// A cache miss is not an error: lookups return `Ok(None)` for absent keys.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
    #[error("cache operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("cached payload could not be decoded: {0}")]
    Serialization(String),
}

impl CacheError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }

    pub fn serialization(err: impl std::fmt::Display) -> Self {
        Self::Serialization(err.to_string())
    }

    /// True for transport failures the read path treats as a miss.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CacheError::Unavailable(_) | CacheError::Timeout(_))
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
