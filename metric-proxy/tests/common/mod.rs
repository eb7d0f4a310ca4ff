#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum_extra::extract::cookie::Cookie;
use httpmock::MockServer;
use once_cell::sync::Lazy;
use reqwest::header::COOKIE;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use metric_proxy::codec;
use metric_proxy::config::{CommaSeparated, Config, DeployEnv, EnvMsDuration};
use metric_proxy::cookies::PERSISTED_COOKIE_NAME;
use metric_proxy::server::serve;

pub static DEFAULT_CONFIG: Lazy<Config> = Lazy::new(|| Config {
    host: "127.0.0.1".to_string(),
    port: 0,
    mixpanel_api_host: "http://127.0.0.1:1".to_string(),
    mixpanel_token_whitelist: "validtoken".parse().unwrap(),
    cookie_persisted_params: CommaSeparated::default(),
    cookie_domain: None,
    cookie_signing_secret: None,
    deploy_env: DeployEnv::Test,
    filter_properties: true,
    upstream_timeout: EnvMsDuration(Duration::from_secs(5)),
    user_agent_vendor: "brave.com".to_string(),
    log_level: "info".to_string(),
    export_prometheus: false,
});

pub fn user_agent() -> String {
    format!("metric-proxy/{} (brave.com)", env!("CARGO_PKG_VERSION"))
}

pub fn encode(value: &Value) -> String {
    codec::encode(value).unwrap()
}

/// `Cookie` request header carrying `value` as the persisted attribution cookie.
pub fn attribution_cookie(value: &Value) -> String {
    Cookie::new(PERSISTED_COOKIE_NAME, value.to_string())
        .encoded()
        .to_string()
}

pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
    client: reqwest::Client,
}

impl ServerHandle {
    pub async fn for_config(config: Config) -> ServerHandle {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let notify = Arc::new(Notify::new());
        let shutdown = notify.clone();

        tokio::spawn(async move {
            serve(config, listener, async move { notify.notified().await }).await
        });
        ServerHandle {
            addr,
            shutdown,
            client: reqwest::Client::new(),
        }
    }

    pub async fn for_upstream(upstream: &MockServer) -> ServerHandle {
        let mut config = DEFAULT_CONFIG.clone();
        config.mixpanel_api_host = upstream.base_url();
        Self::for_config(config).await
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("http://{:?}{}", self.addr, path))
            .send()
            .await
            .expect("failed to send request")
    }

    pub async fn get_track(&self, query: &[(&str, &str)], cookie: Option<&str>) -> reqwest::Response {
        let mut request = self
            .client
            .get(format!("http://{:?}/track", self.addr))
            .query(query);
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }
        request.send().await.expect("failed to send request")
    }

    pub async fn post_track(&self, form: &[(&str, &str)], cookie: Option<&str>) -> reqwest::Response {
        let mut request = self
            .client
            .post(format!("http://{:?}/track", self.addr))
            .form(form);
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }
        request.send().await.expect("failed to send request")
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown.notify_one()
    }
}
