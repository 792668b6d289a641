//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (net/)
//!     → server.rs (hyper connection, HTTP/1.1 + HTTP/2)
//!     → middleware/trace.rs (server span, then route span)
//!     → handlers.rs (hello, dice)
//!     → Send to client
//! ```

pub mod handlers;
pub mod middleware;
pub mod server;

pub use middleware::RequestTrace;
pub use server::{build_app, routes, AppState, HttpServer};
