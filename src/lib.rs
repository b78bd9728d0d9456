//! Catalogue service library: bootstrap and shutdown orchestration.

pub mod config;
pub mod diagnostics;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::schema::ServiceConfig;
pub use http::PrimaryListener;
pub use lifecycle::{Bootstrap, Outcome, ShutdownCoordinator};
pub use observability::TracingProvider;
