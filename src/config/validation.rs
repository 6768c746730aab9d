//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, header names and browser patterns
//! - Validate value ranges (window > 0, timeouts > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GateConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::uri::Authority;
use axum::http::HeaderName;
use regex::RegexBuilder;
use thiserror::Error;

use crate::config::schema::GateConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address `{value}`")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: must not be empty")]
    Empty { field: &'static str },

    #[error("{field}: must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field}: invalid header name `{value}`")]
    InvalidHeaderName { field: &'static str, value: String },

    #[error("gate.browser.desktop_patterns: `{pattern}` does not compile: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("observability.log_level: invalid filter `{0}`")]
    InvalidLogLevel(String),
}

pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.upstream.address.parse::<Authority>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "upstream.address",
            value: config.upstream.address.clone(),
        });
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero { field: "timeouts.request_secs" });
    }

    let gate = &config.gate;
    if gate.secret_key.is_empty() {
        errors.push(ValidationError::Empty { field: "gate.secret_key" });
    }
    if gate.app_signature.is_empty() {
        errors.push(ValidationError::Empty { field: "gate.app_signature" });
    }
    if gate.replay_window_secs == 0 {
        errors.push(ValidationError::Zero { field: "gate.replay_window_secs" });
    }

    let header_fields = [
        ("gate.platform_marker_header", &gate.platform_marker_header),
        ("gate.headers.app_key", &gate.headers.app_key),
        ("gate.headers.device_id", &gate.headers.device_id),
        ("gate.headers.app_version", &gate.headers.app_version),
        ("gate.headers.timestamp", &gate.headers.timestamp),
    ];
    for (field, value) in header_fields {
        if HeaderName::from_bytes(value.as_bytes()).is_err() {
            errors.push(ValidationError::InvalidHeaderName {
                field,
                value: value.clone(),
            });
        }
    }

    for pattern in &gate.browser.desktop_patterns {
        if let Err(e) = RegexBuilder::new(pattern).case_insensitive(true).build() {
            errors.push(ValidationError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            });
        }
    }

    if config.access_log.enabled && config.access_log.path.is_empty() {
        errors.push(ValidationError::Empty { field: "access_log.path" });
    }
    if config.access_log.queue_capacity == 0 {
        errors.push(ValidationError::Zero { field: "access_log.queue_capacity" });
    }

    let obs = &config.observability;
    if tracing_subscriber::EnvFilter::try_new(&obs.log_level).is_err() {
        errors.push(ValidationError::InvalidLogLevel(obs.log_level.clone()));
    }
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: obs.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(validate_config(&GateConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = GateConfig::default();
        config.listener.bind_address = "nope".into();
        config.gate.secret_key.clear();
        config.gate.replay_window_secs = 0;
        config.gate.headers.device_id = "X Device".into();
        config.gate.browser.desktop_patterns.push("Chrome/(".into());
        config.access_log.queue_capacity = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 6);
        assert!(errors.contains(&ValidationError::Zero { field: "access_log.queue_capacity" }));
        assert!(errors.contains(&ValidationError::Empty { field: "gate.secret_key" }));
        assert!(errors.contains(&ValidationError::Zero { field: "gate.replay_window_secs" }));
        assert!(errors.contains(&ValidationError::InvalidHeaderName {
            field: "gate.headers.device_id",
            value: "X Device".into(),
        }));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidPattern { pattern, .. } if pattern == "Chrome/(")));
    }

    #[test]
    fn test_upstream_accepts_host_names() {
        let mut config = GateConfig::default();
        config.upstream.address = "content.internal:8000".into();
        assert!(validate_config(&config).is_ok());

        config.upstream.address = "http://bad/".into();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_metrics_address_checked_only_when_enabled() {
        let mut config = GateConfig::default();
        config.observability.metrics_address = "bogus".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
