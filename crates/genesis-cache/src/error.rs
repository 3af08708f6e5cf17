//! Cache error type.

use thiserror::Error;

/// Errors from cache backends.
///
/// The service layer never propagates these to callers of `get`/`put`;
/// they are logged and the operation degrades. They surface only through
/// the backend trait itself.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backing store could not be reached or rejected the operation.
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}
