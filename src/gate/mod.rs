//! App gate: request classification and signature verification.
//!
//! # Data Flow
//! ```text
//! Incoming request
//!     → context.rs (immutable header/UA/IP snapshot)
//!     → classifier.rs (ordered checks, first match wins)
//!         → signature.rs (HMAC over canonical message, constant-time compare)
//!         → replay.rs (timestamp window)
//!         → heuristics.rs (app markers, browser detection)
//!     → Classification { outcome, reason }
//!     → decision emitter (log sink, 403 + block page)
//! ```
//!
//! # Design Decisions
//! - Pure and synchronous: nothing here awaits or performs I/O
//! - Never fails for malformed input; every path ends in a `Classification`
//! - A present credential set is authoritative: signature failure never falls through

pub mod classifier;
pub mod context;
pub mod heuristics;
pub mod replay;
pub mod signature;

pub use classifier::{Classification, Classifier, Outcome, Reason};
pub use context::{AppCredentialHeaders, CredentialHeaderNames, RequestContext};
pub use heuristics::{AppMarkers, BrowserHeuristic};
pub use replay::ReplayGuard;
pub use signature::SignatureVerifier;

use thiserror::Error;

/// Errors raised while building a classifier from configuration.
#[derive(Debug, Error)]
pub enum GateError {
    /// A desktop browser pattern failed to compile.
    #[error("invalid browser pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A configured header name is not a valid HTTP header name.
    #[error("invalid header name `{0}`")]
    InvalidHeaderName(String),

    /// The replay window must be at least one second.
    #[error("replay window must be greater than zero")]
    ZeroReplayWindow,
}
