//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Telemetry → Router → Lifecycle::bind
//!
//! Run (manager.rs):
//!     Serving → interrupt or accept fault → Draining → Stopped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → interrupt future resolves
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain, shut down telemetry
//! - Drain has a deadline; connections still open after it are abandoned
//! - Telemetry is shut down exactly once, on every exit path

pub mod manager;
pub mod shutdown;
pub mod signals;

pub use manager::{Lifecycle, LifecycleState};
pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
