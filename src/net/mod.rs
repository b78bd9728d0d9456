//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ServiceConfig bind addresses
//!     → listener.rs (bind, role-tagged errors)
//!     → HTTP layer (axum accept loop)
//!     → connection.rs (in-flight request tracking for drain)
//! ```
//!
//! # Design Decisions
//! - Bind failures surface immediately with the listener role attached
//! - In-flight requests are counted so drain progress can be logged

pub mod connection;
pub mod listener;

pub use connection::{InFlightGuard, InFlightTracker};
pub use listener::{ListenerError, ListenerRole};
