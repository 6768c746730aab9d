//! Timestamp freshness check.
//!
//! A fixed symmetric window around the server clock. There is no nonce store,
//! so a captured request can be replayed until its timestamp leaves the window.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default window in seconds.
pub const DEFAULT_WINDOW_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayGuard {
    window_secs: u64,
}

impl ReplayGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            window_secs: window.as_secs(),
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Fresh iff `|now - timestamp| < window`. Unparseable timestamps read as 0.
    pub fn is_fresh(&self, timestamp: impl AsRef<[u8]>, now: i64) -> bool {
        now.abs_diff(parse_timestamp(timestamp)) < self.window_secs
    }

    /// [`is_fresh`](Self::is_fresh) against the system clock.
    pub fn is_fresh_now(&self, timestamp: impl AsRef<[u8]>) -> bool {
        self.is_fresh(timestamp, unix_now())
    }
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self {
            window_secs: DEFAULT_WINDOW_SECS,
        }
    }
}

/// Current time in seconds since the epoch.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

/// Read the leading integer of a timestamp header.
///
/// Surrounding whitespace and a single sign are allowed; parsing stops at the
/// first non-digit. No digits gives 0 and out-of-range values saturate.
pub fn parse_timestamp(raw: impl AsRef<[u8]>) -> i64 {
    let raw = raw.as_ref();
    let start = raw.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(raw.len());
    let s = &raw[start..];
    let (negative, digits) = match s.first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let mut value: i64 = 0;
    for &b in digits.iter().take_while(|b| b.is_ascii_digit()) {
        let d = i64::from(b - b'0');
        value = if negative {
            value.saturating_mul(10).saturating_sub(d)
        } else {
            value.saturating_mul(10).saturating_add(d)
        };
    }
    value
}
