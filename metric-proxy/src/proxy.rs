//! `/track` handlers.
//!
//! Each request goes through `RECEIVED -> COOKIE_PERSISTED -> PAYLOAD_BUILT ->
//! UPSTREAM_CALLED` and ends `RELAYED` or `FAILED`. Attribution parameters are
//! persisted before anything is validated, so a click carrying new campaign
//! parameters is remembered even if its own event gets rejected.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::CookieJar;
use bytes::Bytes;
use tracing::{instrument, Level};

use crate::api::ProxyError;
use crate::event::EventFormData;
use crate::prometheus::{report_dropped_request, report_received};
use crate::router;
use crate::upstream::relay;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    CookiePersisted,
    PayloadBuilt,
    UpstreamCalled,
    Relayed,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::CookiePersisted => "cookie_persisted",
            Stage::PayloadBuilt => "payload_built",
            Stage::UpstreamCalled => "upstream_called",
            Stage::Relayed => "relayed",
            Stage::Failed => "failed",
        }
    }

    fn enter(self) {
        tracing::Span::current().record("stage", self.as_str());
    }
}

#[instrument(skip_all, fields(method = "GET", stage, user_agent))]
pub async fn track_get(
    state: State<router::State>,
    query: Option<Query<HashMap<String, String>>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> (CookieJar, Response) {
    let query = query.map(|Query(query)| query).unwrap_or_default();
    received(&headers, &jar, &query);

    let inbound = jar.clone();
    let (jar, _) = state.attribution.persist(&query, jar);
    Stage::CookiePersisted.enter();

    let payload = match state.payloads.build_query_payload(&query, &inbound) {
        Ok(payload) => payload,
        Err(err) => return (jar, failed(err)),
    };
    report_received("GET", 1);
    Stage::PayloadBuilt.enter();

    Stage::UpstreamCalled.enter();
    match state.upstream.track_get(&payload).await {
        Ok(response) => (jar, relayed(response)),
        Err(err) => (jar, failed(err)),
    }
}

#[instrument(skip_all, fields(method = "POST", stage, user_agent, content_type))]
pub async fn track_post(
    state: State<router::State>,
    query: Option<Query<HashMap<String, String>>>,
    headers: HeaderMap,
    jar: CookieJar,
    body: Bytes,
) -> (CookieJar, Response) {
    let query = query.map(|Query(query)| query).unwrap_or_default();
    received(&headers, &jar, &query);
    tracing::Span::current().record(
        "content_type",
        headers
            .get(header::CONTENT_TYPE)
            .map_or("", |v| v.to_str().unwrap_or("")),
    );

    let inbound = jar.clone();
    let (jar, _) = state.attribution.persist(&query, jar);
    Stage::CookiePersisted.enter();

    let form = match serde_urlencoded::from_bytes::<EventFormData>(&body) {
        Ok(form) => form,
        Err(e) => {
            return (
                jar,
                failed(ProxyError::InvalidEncoding(format!("invalid form body: {}", e))),
            )
        }
    };
    tracing::debug!(data = ?form.data, verbose = ?form.verbose, "-> body");

    let payload = match state.payloads.build_body_payload(&form, &inbound) {
        Ok(payload) => payload,
        Err(err) => return (jar, failed(err)),
    };
    report_received("POST", payload.events);
    Stage::PayloadBuilt.enter();

    Stage::UpstreamCalled.enter();
    match state.upstream.track_post(&payload).await {
        Ok(response) => (jar, relayed(response)),
        Err(err) => (jar, failed(err)),
    }
}

/// Debug-level request logging. Never enable this on production traffic,
/// it logs user data.
fn received(headers: &HeaderMap, jar: &CookieJar, query: &HashMap<String, String>) {
    Stage::Received.enter();
    tracing::Span::current().record(
        "user_agent",
        headers
            .get(header::USER_AGENT)
            .map_or("unknown", |v| v.to_str().unwrap_or("unknown")),
    );
    tracing::info!("-> /track");

    if tracing::enabled!(Level::DEBUG) {
        tracing::debug!(headers = ?headers, "-> headers");
        for cookie in jar.iter() {
            tracing::debug!(name = cookie.name(), value = cookie.value(), "-> cookie");
        }
        tracing::debug!(query = ?query, "-> query");
    }
}

fn relayed(response: reqwest::Response) -> Response {
    Stage::Relayed.enter();
    relay(response)
}

fn failed(err: ProxyError) -> Response {
    Stage::Failed.enter();
    report_dropped_request(err.kind());
    tracing::warn!(kind = err.kind().as_str(), "rejected request: {}", err);
    err.into_response()
}
