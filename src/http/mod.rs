//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Bound primary socket
//!     → server.rs (axum accept loop, graceful stop)
//!     → request.rs (request ID)
//!     → tracing span, timeout, concurrency limit, in-flight tracking
//!     → api.rs built-in routes + the REST router supplied by the caller
//! ```

pub mod api;
pub mod request;
pub mod server;

pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use server::{build_router, PrimaryListener};
