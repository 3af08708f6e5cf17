//! HTTP surface for the Genesis integration.
//!
//! Exposes webhook ingestion behind hashed bearer-token authentication,
//! plus health endpoints, configuration loading, and the router wiring
//! used by the service binary.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod config;
pub mod crypto;
pub mod handlers;
pub mod server;

pub use auth::{AuthContext, AuthError, TokenStore, TokenValidator};
pub use config::Config;
pub use server::{create_router, start_server, AppState};
