use std::future::ready;
use std::sync::Arc;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;

use crate::cookies::AttributionStore;
use crate::payload::PayloadBuilder;
use crate::prometheus::track_metrics;
use crate::proxy;
use crate::upstream::UpstreamClient;

#[derive(Clone)]
pub struct State {
    pub attribution: Arc<AttributionStore>,
    pub payloads: Arc<PayloadBuilder>,
    pub upstream: UpstreamClient,
}

async fn index() -> &'static str {
    "hello friend"
}

pub fn router(state: State, metrics: Option<PrometheusHandle>) -> Router {
    let router = Router::new()
        .route("/", get(index))
        .route("/track", get(proxy::track_get).post(proxy::track_post))
        .route("/track/", get(proxy::track_get).post(proxy::track_post))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Don't install metrics unless asked to
    // Installing a global recorder when used as a library (during tests etc)
    // does not work well.
    match metrics {
        Some(recorder_handle) => {
            router.route("/metrics", get(move || ready(recorder_handle.render())))
        }
        None => router,
    }
}
