use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap};
use axum::response::Response;
use metrics::counter;
use reqwest::header::HeaderValue;
use tracing::instrument;

use crate::api::ProxyError;
use crate::payload::{TrackBody, TrackQuery};

/// Client for the mixpanel `/track` endpoint.
///
/// Requests are plain futures: dropping one (as axum does when the caller
/// goes away) aborts the upstream call and discards its outcome.
#[derive(Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    track_url: String,
}

impl UpstreamClient {
    pub fn new(
        track_url: String,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        Ok(UpstreamClient { client, track_url })
    }

    pub fn track_url(&self) -> &str {
        &self.track_url
    }

    #[instrument(skip_all)]
    pub async fn track_get(&self, query: &TrackQuery) -> Result<reqwest::Response, ProxyError> {
        tracing::debug!(url = %self.track_url, query = ?query, "API > GET");
        let response = self
            .client
            .get(&self.track_url)
            .query(query)
            .send()
            .await?;
        Ok(observe(response))
    }

    #[instrument(skip_all)]
    pub async fn track_post(&self, body: &TrackBody) -> Result<reqwest::Response, ProxyError> {
        tracing::debug!(url = %self.track_url, body = ?body, "API > POST");
        let response = self
            .client
            .post(&self.track_url)
            .form(body)
            .send()
            .await?;
        Ok(observe(response))
    }
}

fn observe(response: reqwest::Response) -> reqwest::Response {
    let status = response.status();
    counter!("metric_proxy_upstream_responses_total", "status" => status.as_u16().to_string())
        .increment(1);
    tracing::debug!(status = status.as_u16(), "<< upstream status");
    tracing::debug!(headers = ?response.headers(), "<< upstream headers");
    response
}

/// Turn an upstream response into ours: same status, same end-to-end
/// headers, body streamed through as it arrives.
pub fn relay(response: reqwest::Response) -> Response {
    let status = response.status();
    let headers = end_to_end_headers(response.headers());

    let mut relayed = Response::new(Body::from_stream(response.bytes_stream()));
    *relayed.status_mut() = status;
    *relayed.headers_mut() = headers;
    relayed
}

fn end_to_end_headers(headers: &HeaderMap<HeaderValue>) -> HeaderMap {
    let mut relayed = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) {
            continue;
        }
        relayed.append(name.clone(), value.clone());
    }
    relayed
}

/// Headers describing the upstream connection rather than the response.
fn is_hop_by_hop(name: &header::HeaderName) -> bool {
    [
        header::CONNECTION,
        header::TRANSFER_ENCODING,
        header::CONTENT_LENGTH,
        header::UPGRADE,
        header::TRAILER,
        header::TE,
        header::PROXY_AUTHENTICATE,
        header::PROXY_AUTHORIZATION,
    ]
    .contains(name)
}

#[cfg(test)]
mod tests {
    use axum::http::{header, HeaderMap, HeaderValue};

    use super::end_to_end_headers;

    #[test]
    fn strips_hop_by_hop_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("1"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.append(header::SET_COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::SET_COOKIE, HeaderValue::from_static("b=2"));

        let relayed = end_to_end_headers(&headers);

        assert_eq!(relayed.len(), 3);
        assert_eq!(relayed[header::CONTENT_TYPE], "text/plain");
        assert_eq!(relayed.get_all(header::SET_COOKIE).iter().count(), 2);
        assert!(relayed.get(header::CONNECTION).is_none());
    }
}
