//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML. Every section
//! has defaults so a minimal file only needs the secrets.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::decision::DefaultBlockPage;
use crate::gate::classifier::Classifier;
use crate::gate::heuristics::{DEFAULT_DESKTOP_PATTERNS, DEFAULT_GENERIC_MARKERS};
use crate::gate::{CredentialHeaderNames, GateError};

/// Root configuration for the gate.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GateConfig {
    /// Listener configuration.
    pub listener: ListenerConfig,

    /// Where allowed requests are forwarded.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Classification settings.
    pub gate: GateSettings,

    /// Access log sink.
    pub access_log: AccessLogConfig,

    /// Denial page shown to blocked clients.
    pub block_page: BlockPageConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream serving the protected content.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream address (e.g., "127.0.0.1:3000").
    pub address: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Settings for the request classifier.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GateSettings {
    /// Shared HMAC secret, also compiled into the app.
    pub secret_key: String,

    /// Constant prefix of every signed message.
    pub app_signature: String,

    /// Maximum clock difference accepted for `X-Timestamp`, in seconds.
    pub replay_window_secs: u64,

    /// Substring identifying the app's user agent.
    pub user_agent_marker: String,

    /// Header the platform WebView sets to the embedding package name.
    pub platform_marker_header: String,

    /// The app's package identifier.
    pub package_id: String,

    pub headers: CredentialHeadersConfig,

    pub browser: BrowserDetectionConfig,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            // WARNING: This is a placeholder! Change this in production.
            secret_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            app_signature: "EXAMPLE-ANDROID-APP".to_string(),
            replay_window_secs: crate::gate::replay::DEFAULT_WINDOW_SECS,
            user_agent_marker: "ExampleApp-Android".to_string(),
            platform_marker_header: "X-Requested-With".to_string(),
            package_id: "com.example.app".to_string(),
            headers: CredentialHeadersConfig::default(),
            browser: BrowserDetectionConfig::default(),
        }
    }
}

impl GateSettings {
    /// Build a classifier from these settings.
    pub fn build_classifier(&self) -> Result<Classifier, GateError> {
        Classifier::builder()
            .secret_key(self.secret_key.as_bytes())
            .app_signature(self.app_signature.clone())
            .credential_headers(self.headers.to_names()?)
            .replay_window(Duration::from_secs(self.replay_window_secs))
            .user_agent_marker(self.user_agent_marker.clone())
            .platform_marker(self.platform_marker_header.clone(), self.package_id.clone())
            .desktop_patterns(self.browser.desktop_patterns.iter().cloned())
            .generic_markers(self.browser.generic_markers.iter().cloned())
            .build()
    }
}

/// Names of the app credential headers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialHeadersConfig {
    pub app_key: String,
    pub device_id: String,
    pub app_version: String,
    pub timestamp: String,
}

impl Default for CredentialHeadersConfig {
    fn default() -> Self {
        Self {
            app_key: "X-App-Key".to_string(),
            device_id: "X-Device-ID".to_string(),
            app_version: "X-App-Version".to_string(),
            timestamp: "X-Timestamp".to_string(),
        }
    }
}

impl CredentialHeadersConfig {
    pub fn to_names(&self) -> Result<CredentialHeaderNames, GateError> {
        CredentialHeaderNames::new(&self.app_key, &self.device_id, &self.app_version, &self.timestamp)
    }
}

/// Browser detection tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrowserDetectionConfig {
    /// Case-insensitive regexes matched against the user agent; any hit means desktop browser.
    pub desktop_patterns: Vec<String>,

    /// Engine substrings that mark a mobile browser when the platform marker is missing.
    pub generic_markers: Vec<String>,
}

impl Default for BrowserDetectionConfig {
    fn default() -> Self {
        Self {
            desktop_patterns: DEFAULT_DESKTOP_PATTERNS.iter().map(|p| p.to_string()).collect(),
            generic_markers: DEFAULT_GENERIC_MARKERS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

/// Access log configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AccessLogConfig {
    /// Write one JSON record per request.
    pub enabled: bool,

    /// Log file path; parent directories are created.
    pub path: String,

    /// Records buffered for the background writer; beyond this they are dropped.
    pub queue_capacity: usize,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "logs/app-auth.log".to_string(),
            queue_capacity: crate::decision::access_log::DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Block page configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BlockPageConfig {
    pub title: String,
    pub message: String,

    /// Show the classification reason to the client.
    pub expose_reason: bool,
}

impl Default for BlockPageConfig {
    fn default() -> Self {
        let page = DefaultBlockPage::default();
        Self {
            title: page.title,
            message: page.message,
            expose_reason: page.expose_reason,
        }
    }
}

impl From<&BlockPageConfig> for DefaultBlockPage {
    fn from(config: &BlockPageConfig) -> Self {
        Self {
            title: config.title.clone(),
            message: config.message.clone(),
            expose_reason: config.expose_reason,
        }
    }
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: GateConfig = toml::from_str(
            r#"
            [gate]
            secret_key = "s3cret"
            app_signature = "MY-APP"
            "#,
        )
        .unwrap();

        assert_eq!(config.gate.secret_key, "s3cret");
        assert_eq!(config.gate.replay_window_secs, 300);
        assert_eq!(config.gate.headers.app_key, "X-App-Key");
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert!(config.access_log.enabled);
        assert!(!config.block_page.expose_reason);
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_full_toml() {
        let config: GateConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [upstream]
            address = "127.0.0.1:4000"

            [gate]
            secret_key = "k"
            app_signature = "A"
            replay_window_secs = 60
            user_agent_marker = "MyApp"
            package_id = "org.my.app"

            [gate.headers]
            app_key = "X-Sig"

            [gate.browser]
            desktop_patterns = ["Windows NT"]
            generic_markers = ["Gecko/"]

            [access_log]
            enabled = false

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.upstream.address, "127.0.0.1:4000");
        assert_eq!(config.gate.headers.app_key, "X-Sig");
        assert_eq!(config.gate.headers.timestamp, "X-Timestamp");
        assert_eq!(config.gate.browser.desktop_patterns, vec!["Windows NT"]);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert!(config.gate.build_classifier().is_ok());
    }

    #[test]
    fn test_default_settings_build_classifier() {
        let classifier = GateSettings::default().build_classifier().unwrap();
        assert_eq!(
            classifier.credential_headers().device_id.as_str(),
            "x-device-id"
        );
    }
}
