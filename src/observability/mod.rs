//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Gate middleware and server produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (decision counters, classification latency)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID on every gate log line
//! - Metrics are cheap (atomic increments); recording without an installed
//!   exporter is a no-op

pub mod logging;
pub mod metrics;
