//! HTTP front door.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, tracing, timeout)
//!     → request.rs (assign / propagate request ID)
//!     → middleware.rs (classify, record decision, 403 or pass)
//!     → server.rs proxy handler (forward to upstream)
//!     → Send to client
//! ```

pub mod middleware;
pub mod request;
pub mod server;

pub use middleware::{gate_middleware, AppIdentity, GateState};
pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{GateServer, ServerError};
