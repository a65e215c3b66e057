//! HTTP server for the Git LFS proxy.
//!
//! This crate provides the request plane:
//! - Batch API negotiation with signed proxy URLs
//! - Proxy upload and download streaming
//! - Verify, which marks objects uploaded
//! - GitHub OAuth bootstrap for human users
//! - Health, readiness and Prometheus endpoints

pub mod auth;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod protocol;
pub mod routes;
pub mod signing;
pub mod state;

pub use auth::{LfsContext, Principal, TraceId};
pub use error::ApiError;
pub use routes::create_router;
pub use signing::{ProxyOperation, ProxyUrlSigner};
pub use state::AppState;
