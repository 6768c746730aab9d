//! App gate: serve protected content only to a specific mobile app.
//!
//! Requests are classified as a verified app, a trusted app fallback, a
//! browser or an unrecognized client; only the first two reach the upstream.

pub mod config;
pub mod decision;
pub mod gate;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::GateConfig;
pub use gate::{Classification, Classifier, Outcome, Reason, RequestContext};
pub use http::GateServer;
pub use lifecycle::Shutdown;
