//! Access decision emitter collaborators.
//!
//! # Data Flow
//! ```text
//! Classification
//!     → AccessRecord (one per request)
//!     → DecisionSink (access_log.rs: append-only JSON lines)
//!     → blocked? → BlockRenderer (block_page.rs) → 403
//! ```
//!
//! # Design Decisions
//! - Sinks are best-effort: a failed write is logged, never surfaced to the client
//! - The record schema is fixed for compatibility with existing log consumers

pub mod access_log;
pub mod block_page;

pub use access_log::AccessLog;
pub use block_page::{BlockRenderer, DefaultBlockPage};

use serde::{Deserialize, Serialize};

use crate::gate::{Classification, RequestContext};

/// One line of the access log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecord {
    /// UTC, `YYYY-MM-DD HH:MM:SS`.
    pub timestamp: String,
    pub ip: String,
    pub user_agent: String,
    pub device_id: String,
    /// `SUCCESS: <reason>` or `BLOCKED: <reason>`.
    pub status: String,
    pub url: String,
}

impl AccessRecord {
    pub fn new(
        ctx: &RequestContext,
        device_header: &str,
        classification: &Classification,
        url: &str,
    ) -> Self {
        let user_agent = match ctx.user_agent() {
            "" => "unknown".to_string(),
            ua => ua.to_string(),
        };
        let verdict = if classification.is_allowed() { "SUCCESS" } else { "BLOCKED" };

        Self {
            timestamp: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            ip: ctx.remote_addr().to_string(),
            user_agent,
            device_id: ctx
                .header_lossy(device_header)
                .map_or_else(|| "none".to_string(), |v| v.into_owned()),
            status: format!("{verdict}: {}", classification.reason),
            url: url.to_string(),
        }
    }
}

/// Receives every access decision.
pub trait DecisionSink: Send + Sync {
    fn record(&self, record: &AccessRecord);
}
