//! Gate middleware.
//!
//! Classifies every request, reports the decision to the configured sink and
//! either passes the request on with an [`AppIdentity`] attached or answers
//! with 403 and the block page.

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::decision::{AccessRecord, BlockRenderer, DecisionSink, DefaultBlockPage};
use crate::gate::{Classification, Classifier, Outcome, RequestContext};
use crate::http::request::RequestIdExt;
use crate::observability::metrics;

/// Who the gate let through. Inserted as a request extension on allowed requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    pub outcome: Outcome,
    pub device_id: String,
    pub app_version: String,
    pub ip: String,
}

/// Shared state for [`gate_middleware`].
#[derive(Clone)]
pub struct GateState {
    classifier: Arc<ArcSwap<Classifier>>,
    sink: Option<Arc<dyn DecisionSink>>,
    renderer: Arc<dyn BlockRenderer>,
}

impl GateState {
    /// State with no decision sink and the default block page.
    pub fn new(classifier: Classifier) -> Self {
        Self {
            classifier: Arc::new(ArcSwap::from_pointee(classifier)),
            sink: None,
            renderer: Arc::new(DefaultBlockPage::default()),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn DecisionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn BlockRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// The classifier currently in effect.
    pub fn classifier(&self) -> Arc<Classifier> {
        self.classifier.load_full()
    }

    /// Atomically switch to a new classifier. In-flight requests finish with the old one.
    pub fn replace_classifier(&self, classifier: Classifier) {
        self.classifier.store(Arc::new(classifier));
    }

    /// Classify and record one request.
    fn evaluate(&self, req: &Request<Body>) -> (Classification, Option<AppIdentity>) {
        let started = Instant::now();
        let classifier = self.classifier.load();
        let ctx = RequestContext::from_request(req);
        let request_id = req.request_id();

        tracing::trace!(
            request_id = %request_id,
            headers = ?ctx.headers().keys().map(|k| k.as_str()).collect::<Vec<_>>(),
            "Classifying request"
        );

        let classification = classifier.classify(&ctx);
        metrics::record_decision(&classification, started);

        let names = classifier.credential_headers();
        if let Some(sink) = &self.sink {
            let url = req.uri().path_and_query().map_or("/", |pq| pq.as_str());
            sink.record(&AccessRecord::new(&ctx, names.device_id.as_str(), &classification, url));
        }

        if !classification.is_allowed() {
            return (classification, None);
        }

        tracing::debug!(
            request_id = %request_id,
            ip = %ctx.remote_addr(),
            outcome = %classification.outcome,
            reason = %classification.reason,
            "Request allowed"
        );

        let identity = AppIdentity {
            outcome: classification.outcome,
            device_id: ctx
                .header_lossy(names.device_id.as_str())
                .map_or_else(|| "unknown".to_string(), |v| v.into_owned()),
            app_version: ctx
                .header_lossy(names.app_version.as_str())
                .map_or_else(|| "unknown".to_string(), |v| v.into_owned()),
            ip: ctx.remote_addr().to_string(),
        };
        (classification, Some(identity))
    }
}

pub async fn gate_middleware(
    State(gate): State<GateState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let (classification, identity) = gate.evaluate(&req);

    if let Some(identity) = identity {
        req.extensions_mut().insert(classification);
        req.extensions_mut().insert(identity);
        return next.run(req).await;
    }

    let incident_id = Uuid::new_v4();
    tracing::warn!(
        request_id = %req.request_id(),
        incident_id = %incident_id,
        outcome = %classification.outcome,
        reason = %classification.reason,
        path = %req.uri().path(),
        "Request blocked"
    );

    let body = gate.renderer.render(&classification, incident_id);
    (
        StatusCode::FORBIDDEN,
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use axum::{middleware, routing::get, Extension, Router};
    use tower::ServiceExt;

    use crate::gate::Reason;
    use crate::gate::replay::unix_now;

    #[derive(Default)]
    struct MemorySink(Mutex<Vec<AccessRecord>>);

    impl DecisionSink for MemorySink {
        fn record(&self, record: &AccessRecord) {
            self.0.lock().unwrap().push(record.clone());
        }
    }

    fn classifier(secret: &str) -> Classifier {
        Classifier::builder()
            .secret_key(secret)
            .app_signature("TEST-APP")
            .user_agent_marker("ExampleApp-Android")
            .platform_marker("X-Requested-With", "com.example.app")
            .build()
            .unwrap()
    }

    fn app(state: GateState) -> Router {
        Router::new()
            .route(
                "/content",
                get(|Extension(identity): Extension<AppIdentity>| async move {
                    format!("{}:{}", identity.outcome, identity.device_id)
                }),
            )
            .layer(middleware::from_fn_with_state(state, gate_middleware))
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_signed_request_reaches_handler() {
        let state = GateState::new(classifier("s1"));
        let ts = unix_now().to_string();
        let sig = state.classifier().verifier().sign("dev-7", &ts);

        let response = app(state)
            .oneshot(
                Request::get("/content")
                    .header("X-App-Key", sig)
                    .header("X-Device-ID", "dev-7")
                    .header("X-App-Version", "2.0")
                    .header("X-Timestamp", ts)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "verified_app:dev-7");
    }

    #[tokio::test]
    async fn test_browser_gets_block_page_and_is_recorded() {
        let sink = Arc::new(MemorySink::default());
        let state = GateState::new(classifier("s1")).with_sink(sink.clone());

        let response = app(state)
            .oneshot(
                Request::get("/content?page=2")
                    .header("User-Agent", "Mozilla/5.0 (Macintosh) Firefox/121.0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html"));
        assert!(body_string(response).await.contains("Incident ID"));

        let records = sink.0.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, "BLOCKED: browser access not allowed");
        assert_eq!(records[0].url, "/content?page=2");
        assert_eq!(records[0].device_id, "none");
        assert_eq!(records[0].ip, "unknown");
    }

    #[tokio::test]
    async fn test_allowed_request_is_recorded() {
        let sink = Arc::new(MemorySink::default());
        let state = GateState::new(classifier("s1")).with_sink(sink.clone());

        let response = app(state)
            .oneshot(
                Request::get("/content")
                    .header("X-Requested-With", "com.example.app")
                    .header("X-Device-ID", "dev-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "fallback_app:dev-1");
        let records = sink.0.lock().unwrap();
        assert_eq!(records[0].status, "SUCCESS: detected via platform marker");
        assert_eq!(records[0].device_id, "dev-1");
    }

    #[tokio::test]
    async fn test_replaced_classifier_takes_effect() {
        let state = GateState::new(classifier("old-secret"));
        let ts = unix_now().to_string();
        let sig = state.classifier().verifier().sign("dev", &ts);

        let request = || {
            Request::get("/content")
                .header("X-App-Key", sig.clone())
                .header("X-Device-ID", "dev")
                .header("X-App-Version", "1")
                .header("X-Timestamp", ts.clone())
                .body(Body::empty())
                .unwrap()
        };

        let router = app(state.clone());
        assert_eq!(router.clone().oneshot(request()).await.unwrap().status(), StatusCode::OK);

        state.replace_classifier(classifier("new-secret"));
        assert_eq!(router.oneshot(request()).await.unwrap().status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_stalled_access_log_does_not_delay_responses() {
        use crate::decision::access_log::tests::StalledWriter;
        use crate::decision::AccessLog;
        use std::time::Duration;

        let (writer, release, out) = StalledWriter::new();
        let log = Arc::new(AccessLog::with_writer("stalled", writer, 2).unwrap());
        let router = app(GateState::new(classifier("s1")).with_sink(log.clone()));

        for _ in 0..10 {
            let request = Request::get("/content")
                .header("X-Requested-With", "com.example.app")
                .body(Body::empty())
                .unwrap();
            let response = tokio::time::timeout(Duration::from_secs(1), router.clone().oneshot(request))
                .await
                .expect("response held up by the access log")
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        release.send(()).unwrap();
        assert!(log.dropped() >= 7);
        drop(router);
        let log = Arc::try_unwrap(log).unwrap();
        let dropped = log.dropped();
        drop(log);
        let written = out.lock().unwrap().iter().filter(|b| **b == b'\n').count() as u64;
        assert_eq!(written, 10 - dropped);
    }

    #[test]
    fn test_evaluate_reports_reason() {
        let state = GateState::new(classifier("s1"));
        let req = Request::get("/").body(Body::empty()).unwrap();
        let (classification, identity) = state.evaluate(&req);
        assert_eq!(classification.reason, Reason::UnrecognizedClient);
        assert!(identity.is_none());
    }
}
