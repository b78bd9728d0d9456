//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Bind primary → Bind diagnostics → Install signals → Launch listener tasks
//!
//! Running (coordinator.rs + fan_in.rs):
//!     primary outcome | diagnostics outcome | signal → first one decides
//!
//! Shutdown (coordinator.rs + shutdown.rs):
//!     Signal received → Stop accepting → Drain until deadline → Flush tracing → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → one notification, then stop watching
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then listeners, then signal handlers
//! - Ordered shutdown: stop accept, drain, flush spans, close
//! - Shutdown has timeout: remaining requests are cancelled after the deadline

pub mod coordinator;
pub mod error;
pub mod fan_in;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use coordinator::{DrainReport, Outcome, Phase, ShutdownCoordinator, Teardown, Termination};
pub use error::{LifecycleError, Severity};
pub use shutdown::Shutdown;
pub use signals::{ShutdownSignal, SignalSource, SignalWatcher};
pub use startup::Bootstrap;
