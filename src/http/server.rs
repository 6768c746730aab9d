//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the gate in front of every protected path
//! - Wire up middleware (tracing, timeout, request ID)
//! - Forward allowed requests to the upstream
//! - Apply reloaded configurations without restarting

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{
        uri::{Authority, PathAndQuery, Scheme},
        HeaderName, HeaderValue, Request, StatusCode, Uri, Version,
    },
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::GateConfig;
use crate::decision::{AccessLog, DefaultBlockPage};
use crate::gate::GateError;
use crate::http::middleware::{gate_middleware, AppIdentity, GateState};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::observability::metrics;

pub const X_APP_GATE_OUTCOME: HeaderName = HeaderName::from_static("x-app-gate-outcome");
pub const X_APP_GATE_DEVICE: HeaderName = HeaderName::from_static("x-app-gate-device");

/// Errors raised while assembling the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid gate settings: {0}")]
    Gate(#[from] GateError),

    #[error("cannot open access log: {0}")]
    AccessLog(#[source] std::io::Error),

    #[error("invalid upstream address `{0}`")]
    Upstream(String),
}

/// State for the upstream forwarding handler.
#[derive(Clone)]
struct ProxyState {
    client: Client<HttpConnector, Body>,
    upstream: Authority,
}

/// The gate's HTTP server.
pub struct GateServer {
    router: Router,
    config: GateConfig,
    gate: GateState,
}

impl GateServer {
    /// Build the classifier, access log and router from configuration.
    pub fn new(config: GateConfig) -> Result<Self, ServerError> {
        let classifier = config.gate.build_classifier()?;
        let renderer = DefaultBlockPage::from(&config.block_page);
        let mut gate = GateState::new(classifier).with_renderer(Arc::new(renderer));

        if config.access_log.enabled {
            let log = AccessLog::open(&config.access_log.path, config.access_log.queue_capacity).map_err(ServerError::AccessLog)?;
            gate = gate.with_sink(Arc::new(log));
        }

        Self::with_gate(config, gate)
    }

    /// Build the router around an existing gate state.
    pub fn with_gate(config: GateConfig, gate: GateState) -> Result<Self, ServerError> {
        let upstream: Authority = config
            .upstream
            .address
            .parse()
            .map_err(|_| ServerError::Upstream(config.upstream.address.clone()))?;

        let proxy = ProxyState {
            client: Client::builder(TokioExecutor::new()).build(HttpConnector::new()),
            upstream,
        };

        let router = Self::build_router(&config, gate.clone(), proxy);
        Ok(Self {
            router,
            config,
            gate,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GateConfig, gate: GateState, proxy: ProxyState) -> Router {
        let protected = Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(proxy)
            .layer(middleware::from_fn_with_state(gate, gate_middleware));

        Router::new()
            .route("/healthz", get(health_handler))
            .merge(protected)
            .layer(propagate_request_id_layer())
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(set_request_id_layer())
            .layer(TraceLayer::new_for_http())
    }

    /// A clone of the full router, for embedding or in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn gate(&self) -> &GateState {
        &self.gate
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Serve until `shutdown` fires.
    ///
    /// Configurations arriving on `config_updates` replace the classifier;
    /// ones that fail to build are ignored. Only the `gate` section is applied
    /// live. Changes to any other section are logged as a warning and take
    /// effect on the next restart.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GateConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, upstream = %self.config.upstream.address, "Gate server starting");

        let gate = self.gate.clone();
        let running = self.config.clone();
        tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                let ignored = restart_only_changes(&running, &config);
                if !ignored.is_empty() {
                    tracing::warn!(
                        sections = ?ignored,
                        "Reloaded configuration changes sections that need a restart; ignoring them"
                    );
                }
                match config.gate.build_classifier() {
                    Ok(classifier) => {
                        gate.replace_classifier(classifier);
                        tracing::info!("Classifier replaced from reloaded configuration");
                    }
                    Err(e) => tracing::error!(error = %e, "Reloaded configuration rejected"),
                }
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("Gate server stopped");
        Ok(())
    }
}

/// Sections of `new` that differ from the running config but cannot be applied live.
fn restart_only_changes(running: &GateConfig, new: &GateConfig) -> Vec<&'static str> {
    let sections = [
        ("listener", running.listener != new.listener),
        ("upstream", running.upstream != new.upstream),
        ("timeouts", running.timeouts != new.timeouts),
        ("access_log", running.access_log != new.access_log),
        ("block_page", running.block_page != new.block_page),
        ("observability", running.observability != new.observability),
    ];
    sections
        .into_iter()
        .filter_map(|(name, changed)| changed.then_some(name))
        .collect()
}

async fn health_handler() -> &'static str {
    "ok"
}

/// Forward an allowed request to the upstream.
async fn proxy_handler(State(proxy): State<ProxyState>, request: Request<Body>) -> Response {
    let request_id = request.request_id().to_string();
    let identity = request.extensions().get::<AppIdentity>().cloned();
    let (mut parts, body) = request.into_parts();

    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    uri_parts.authority = Some(proxy.upstream.clone());
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    parts.uri = match Uri::from_parts(uri_parts) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Failed to build upstream URI");
            return (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response();
        }
    };
    parts.version = Version::HTTP_11;

    if let Some(identity) = identity {
        parts
            .headers
            .insert(X_APP_GATE_OUTCOME, HeaderValue::from_static(identity.outcome.as_str()));
        if let Ok(device) = HeaderValue::from_bytes(identity.device_id.as_bytes()) {
            parts.headers.insert(X_APP_GATE_DEVICE, device);
        }
    }

    tracing::debug!(request_id = %request_id, uri = %parts.uri, "Forwarding to upstream");

    match proxy.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            metrics::record_upstream(response.status().as_u16());
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Upstream error");
            metrics::record_upstream(StatusCode::BAD_GATEWAY.as_u16());
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_only_reload_needs_no_restart() {
        let running = GateConfig::default();
        let mut new = running.clone();
        new.gate.secret_key = "rotated".into();
        new.gate.replay_window_secs = 60;
        assert!(restart_only_changes(&running, &new).is_empty());
    }

    #[test]
    fn test_restart_only_sections_reported() {
        let running = GateConfig::default();
        let mut new = running.clone();
        new.upstream.address = "127.0.0.1:4000".into();
        new.block_page.expose_reason = true;
        new.access_log.path = "elsewhere.log".into();
        new.timeouts.request_secs = 5;
        assert_eq!(
            restart_only_changes(&running, &new),
            vec!["upstream", "timeouts", "access_log", "block_page"]
        );
    }
}
