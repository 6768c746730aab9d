//! Request classification.
//!
//! Checks run in a fixed order and the first match wins:
//!
//! 1. full credential header set → signature, then timestamp (terminal either way)
//! 2. app marker in the user agent
//! 3. platform marker header equal to the package id
//! 4. browser heuristic
//! 5. anything else is an unrecognized client

use std::fmt;
use std::time::Duration;

use super::context::{AppCredentialHeaders, CredentialHeaderNames, RequestContext};
use super::heuristics::{AppMarkers, BrowserHeuristic};
use super::replay::{unix_now, ReplayGuard};
use super::signature::SignatureVerifier;
use super::GateError;

/// What kind of client sent the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    VerifiedApp,
    FallbackApp,
    Browser,
    Unknown,
}

impl Outcome {
    /// Only app outcomes are let through.
    pub fn is_allowed(self) -> bool {
        matches!(self, Outcome::VerifiedApp | Outcome::FallbackApp)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::VerifiedApp => "verified_app",
            Outcome::FallbackApp => "fallback_app",
            Outcome::Browser => "browser",
            Outcome::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request was classified the way it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reason {
    AuthenticatedViaHeaders,
    DetectedViaUserAgent,
    DetectedViaPlatformMarker,
    SignatureVerificationFailed,
    StaleTimestamp,
    BrowserNotAllowed,
    UnrecognizedClient,
}

impl Reason {
    pub fn as_str(self) -> &'static str {
        match self {
            Reason::AuthenticatedViaHeaders => "authenticated via headers",
            Reason::DetectedViaUserAgent => "detected via user agent",
            Reason::DetectedViaPlatformMarker => "detected via platform marker",
            Reason::SignatureVerificationFailed => "signature verification failed",
            Reason::StaleTimestamp => "stale or invalid timestamp",
            Reason::BrowserNotAllowed => "browser access not allowed",
            Reason::UnrecognizedClient => "unrecognized client",
        }
    }

    /// Short label for metrics.
    pub fn label(self) -> &'static str {
        match self {
            Reason::AuthenticatedViaHeaders => "headers",
            Reason::DetectedViaUserAgent => "user_agent",
            Reason::DetectedViaPlatformMarker => "platform_marker",
            Reason::SignatureVerificationFailed => "bad_signature",
            Reason::StaleTimestamp => "stale_timestamp",
            Reason::BrowserNotAllowed => "browser",
            Reason::UnrecognizedClient => "unrecognized",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub outcome: Outcome,
    pub reason: Reason,
}

impl Classification {
    fn new(outcome: Outcome, reason: Reason) -> Self {
        Self { outcome, reason }
    }

    pub fn is_allowed(&self) -> bool {
        self.outcome.is_allowed()
    }
}

/// Stateless request classifier. Cheap to share behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Classifier {
    credentials: CredentialHeaderNames,
    verifier: SignatureVerifier,
    replay: ReplayGuard,
    markers: AppMarkers,
    heuristic: BrowserHeuristic,
}

impl Classifier {
    pub fn new(
        credentials: CredentialHeaderNames,
        verifier: SignatureVerifier,
        replay: ReplayGuard,
        markers: AppMarkers,
        heuristic: BrowserHeuristic,
    ) -> Self {
        Self {
            credentials,
            verifier,
            replay,
            markers,
            heuristic,
        }
    }

    pub fn builder() -> ClassifierBuilder {
        ClassifierBuilder::default()
    }

    pub fn credential_headers(&self) -> &CredentialHeaderNames {
        &self.credentials
    }

    pub fn verifier(&self) -> &SignatureVerifier {
        &self.verifier
    }

    /// Classify against the system clock.
    pub fn classify(&self, ctx: &RequestContext) -> Classification {
        self.classify_at(ctx, unix_now())
    }

    /// Classify with an explicit current time (seconds since the epoch).
    pub fn classify_at(&self, ctx: &RequestContext, now: i64) -> Classification {
        if let Some(creds) = AppCredentialHeaders::extract(ctx, &self.credentials) {
            if !self.verifier.verify(creds.app_key, creds.device_id, creds.timestamp) {
                return Classification::new(Outcome::Unknown, Reason::SignatureVerificationFailed);
            }
            if !self.replay.is_fresh(creds.timestamp, now) {
                return Classification::new(Outcome::Unknown, Reason::StaleTimestamp);
            }
            return Classification::new(Outcome::VerifiedApp, Reason::AuthenticatedViaHeaders);
        }

        if self.markers.matches_user_agent(ctx) {
            return Classification::new(Outcome::FallbackApp, Reason::DetectedViaUserAgent);
        }

        if self.markers.matches_platform_marker(ctx) {
            return Classification::new(Outcome::FallbackApp, Reason::DetectedViaPlatformMarker);
        }

        if self.heuristic.looks_like_browser(ctx) {
            return Classification::new(Outcome::Browser, Reason::BrowserNotAllowed);
        }

        Classification::new(Outcome::Unknown, Reason::UnrecognizedClient)
    }
}

/// Builder for [`Classifier`]; every field has a default except the secret.
#[derive(Debug, Clone)]
pub struct ClassifierBuilder {
    secret_key: Vec<u8>,
    app_signature: String,
    credentials: CredentialHeaderNames,
    replay_window: Duration,
    user_agent_marker: String,
    platform_header: String,
    package_id: String,
    desktop_patterns: Option<Vec<String>>,
    generic_markers: Option<Vec<String>>,
}

impl Default for ClassifierBuilder {
    fn default() -> Self {
        Self {
            secret_key: Vec::new(),
            app_signature: String::new(),
            credentials: CredentialHeaderNames::default(),
            replay_window: ReplayGuard::default().window(),
            user_agent_marker: String::new(),
            platform_header: "x-requested-with".to_string(),
            package_id: String::new(),
            desktop_patterns: None,
            generic_markers: None,
        }
    }
}

impl ClassifierBuilder {
    pub fn secret_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.secret_key = key.into();
        self
    }

    pub fn app_signature(mut self, signature: impl Into<String>) -> Self {
        self.app_signature = signature.into();
        self
    }

    pub fn credential_headers(mut self, names: CredentialHeaderNames) -> Self {
        self.credentials = names;
        self
    }

    pub fn replay_window(mut self, window: Duration) -> Self {
        self.replay_window = window;
        self
    }

    pub fn user_agent_marker(mut self, marker: impl Into<String>) -> Self {
        self.user_agent_marker = marker.into();
        self
    }

    pub fn platform_marker(mut self, header: impl Into<String>, package_id: impl Into<String>) -> Self {
        self.platform_header = header.into();
        self.package_id = package_id.into();
        self
    }

    pub fn desktop_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.desktop_patterns = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    pub fn generic_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.generic_markers = Some(markers.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> Result<Classifier, GateError> {
        if self.replay_window.as_secs() == 0 {
            return Err(GateError::ZeroReplayWindow);
        }

        let platform_header = super::context::parse_header_name(&self.platform_header)?;
        let markers = AppMarkers::new(self.user_agent_marker, platform_header, self.package_id);

        let heuristic = match (self.desktop_patterns, self.generic_markers) {
            (None, None) => BrowserHeuristic::with_defaults(markers.clone(), self.credentials.clone()),
            (patterns, generic) => BrowserHeuristic::new(
                markers.clone(),
                self.credentials.clone(),
                patterns.unwrap_or_else(|| {
                    super::heuristics::DEFAULT_DESKTOP_PATTERNS.iter().map(|p| p.to_string()).collect()
                }),
                generic.unwrap_or_else(|| {
                    super::heuristics::DEFAULT_GENERIC_MARKERS.iter().map(|m| m.to_string()).collect()
                }),
            )?,
        };

        Ok(Classifier::new(
            self.credentials,
            SignatureVerifier::new(&self.secret_key, self.app_signature),
            ReplayGuard::new(self.replay_window),
            markers,
            heuristic,
        ))
    }
}
