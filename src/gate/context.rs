//! Per-request snapshot of the metadata the gate inspects.

use std::borrow::Cow;
use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request};

use super::GateError;

/// Immutable view of one request: headers, caller address and user agent.
///
/// Header lookups are case-insensitive. [`header`](Self::header) only returns
/// visible ASCII values; [`header_lossy`](Self::header_lossy) decodes any bytes.
#[derive(Debug, Clone)]
pub struct RequestContext {
    headers: HeaderMap,
    remote_addr: String,
    user_agent: String,
}

impl RequestContext {
    /// Build a context from raw parts.
    pub fn new(headers: HeaderMap, remote_addr: impl Into<String>) -> Self {
        let user_agent = headers
            .get(header::USER_AGENT)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .unwrap_or_default();

        Self {
            headers,
            remote_addr: remote_addr.into(),
            user_agent,
        }
    }

    /// Snapshot an incoming request. The caller address comes from axum's
    /// `ConnectInfo` extension and falls back to `"unknown"`.
    pub fn from_request<B>(req: &Request<B>) -> Self {
        let remote_addr = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        Self::new(req.headers().clone(), remote_addr)
    }

    /// Look up a header value by name.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }

    /// Look up a header value, replacing bytes that are not UTF-8.
    pub fn header_lossy(&self, name: impl AsRef<str>) -> Option<Cow<'_, str>> {
        self.headers
            .get(name.as_ref())
            .map(|v| String::from_utf8_lossy(v.as_bytes()))
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    /// The `User-Agent` value, empty when absent.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

/// Names of the four headers a packaged app sends with every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialHeaderNames {
    pub app_key: HeaderName,
    pub device_id: HeaderName,
    pub app_version: HeaderName,
    pub timestamp: HeaderName,
}

impl CredentialHeaderNames {
    /// Parse configured header names.
    pub fn new(
        app_key: &str,
        device_id: &str,
        app_version: &str,
        timestamp: &str,
    ) -> Result<Self, GateError> {
        Ok(Self {
            app_key: parse_header_name(app_key)?,
            device_id: parse_header_name(device_id)?,
            app_version: parse_header_name(app_version)?,
            timestamp: parse_header_name(timestamp)?,
        })
    }
}

impl Default for CredentialHeaderNames {
    fn default() -> Self {
        Self {
            app_key: HeaderName::from_static("x-app-key"),
            device_id: HeaderName::from_static("x-device-id"),
            app_version: HeaderName::from_static("x-app-version"),
            timestamp: HeaderName::from_static("x-timestamp"),
        }
    }
}

pub(crate) fn parse_header_name(name: &str) -> Result<HeaderName, GateError> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| GateError::InvalidHeaderName(name.to_string()))
}

/// The app's credential header values. Only exists when all four are present.
///
/// Values are the raw header bytes. Presence never depends on how a value
/// decodes, so a mangled signature still reaches verification and fails there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppCredentialHeaders<'a> {
    pub app_key: &'a [u8],
    pub device_id: &'a [u8],
    pub app_version: &'a [u8],
    pub timestamp: &'a [u8],
}

impl<'a> AppCredentialHeaders<'a> {
    /// Extract the credential set, or `None` if any header is missing.
    ///
    /// A header that is present with an empty value still counts as present.
    pub fn extract(ctx: &'a RequestContext, names: &CredentialHeaderNames) -> Option<Self> {
        let get = move |name: &HeaderName| ctx.headers.get(name).map(HeaderValue::as_bytes);

        Some(Self {
            app_key: get(&names.app_key)?,
            device_id: get(&names.device_id)?,
            app_version: get(&names.app_version)?,
            timestamp: get(&names.timestamp)?,
        })
    }
}
