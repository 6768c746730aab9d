//! App marker and browser detection.
//!
//! # Design Decisions
//! - Desktop engine patterns are regexes compiled once, case-insensitive
//! - Generic engine markers are plain case-sensitive substrings
//! - App signals always win: a request carrying any of them is never a browser

use axum::http::HeaderName;
use regex::{Regex, RegexBuilder};

use super::context::{AppCredentialHeaders, CredentialHeaderNames, RequestContext};
use super::GateError;

pub const DEFAULT_DESKTOP_PATTERNS: &[&str] = &["Chrome/", "Firefox/", "Safari/", "Edge/", "Opera/"];
pub const DEFAULT_GENERIC_MARKERS: &[&str] = &["Chrome/", "Firefox/", "Safari/"];

/// Non-cryptographic signals that identify the packaged app.
#[derive(Debug, Clone)]
pub struct AppMarkers {
    user_agent_marker: String,
    platform_header: HeaderName,
    package_id: String,
}

impl AppMarkers {
    pub fn new(
        user_agent_marker: impl Into<String>,
        platform_header: HeaderName,
        package_id: impl Into<String>,
    ) -> Self {
        Self {
            user_agent_marker: user_agent_marker.into(),
            platform_header,
            package_id: package_id.into(),
        }
    }

    /// User agent contains the app marker. An empty marker never matches.
    pub fn matches_user_agent(&self, ctx: &RequestContext) -> bool {
        !self.user_agent_marker.is_empty() && ctx.user_agent().contains(&self.user_agent_marker)
    }

    /// Platform marker header equals the app package id exactly.
    pub fn matches_platform_marker(&self, ctx: &RequestContext) -> bool {
        !self.package_id.is_empty() && self.platform_marker(ctx) == Some(self.package_id.as_bytes())
    }

    /// Raw value of the platform marker header, whatever its encoding.
    pub fn platform_marker<'a>(&self, ctx: &'a RequestContext) -> Option<&'a [u8]> {
        ctx.headers()
            .get(&self.platform_header)
            .map(|v| v.as_bytes())
    }
}

/// Decides whether an unidentified request comes from a web browser.
#[derive(Debug, Clone)]
pub struct BrowserHeuristic {
    markers: AppMarkers,
    credentials: CredentialHeaderNames,
    desktop_patterns: Vec<Regex>,
    generic_markers: Vec<String>,
}

impl BrowserHeuristic {
    pub fn new<P, G>(
        markers: AppMarkers,
        credentials: CredentialHeaderNames,
        desktop_patterns: P,
        generic_markers: G,
    ) -> Result<Self, GateError>
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        G: IntoIterator,
        G::Item: Into<String>,
    {
        let desktop_patterns = desktop_patterns
            .into_iter()
            .map(|p| compile_pattern(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            markers,
            credentials,
            desktop_patterns,
            generic_markers: generic_markers.into_iter().map(Into::into).collect(),
        })
    }

    /// Heuristic with the stock pattern and marker lists.
    pub fn with_defaults(markers: AppMarkers, credentials: CredentialHeaderNames) -> Self {
        Self {
            markers,
            credentials,
            desktop_patterns: DEFAULT_DESKTOP_PATTERNS
                .iter()
                .filter_map(|p| compile_pattern(p).ok())
                .collect(),
            generic_markers: DEFAULT_GENERIC_MARKERS.iter().map(|m| m.to_string()).collect(),
        }
    }

    pub fn looks_like_browser(&self, ctx: &RequestContext) -> bool {
        if self.markers.matches_user_agent(ctx)
            || self.markers.matches_platform_marker(ctx)
            || AppCredentialHeaders::extract(ctx, &self.credentials).is_some()
        {
            return false;
        }

        let ua = ctx.user_agent();
        if self.desktop_patterns.iter().any(|re| re.is_match(ua)) {
            return true;
        }

        // Mobile browser: an engine token without the in-app platform marker.
        let no_platform_marker = self.markers.platform_marker(ctx).map_or(true, <[u8]>::is_empty);
        no_platform_marker && self.generic_markers.iter().any(|m| ua.contains(m.as_str()))
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex, GateError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| GateError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}
