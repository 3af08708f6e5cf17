//! Namespaced TTL cache for Genesis data.
//!
//! Wraps a pluggable backend with key namespacing, a global enable
//! switch, and a read-through `remember` operation with single-flight
//! population. When the backend is unavailable the service degrades to
//! recomputation instead of failing requests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod error;
pub mod service;

pub use backend::{CacheBackend, MemoryBackend};
pub use error::CacheError;
pub use service::{CacheConfig, CacheService};
