use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::cookies::{AttributionStore, CookieCodec};
use crate::event::EventValidator;
use crate::payload::PayloadBuilder;
use crate::prometheus::setup_metrics_recorder;
use crate::properties::PropertyWhitelist;
use crate::router;
use crate::time::{SystemTime, TimeSource};
use crate::upstream::UpstreamClient;

/// Turn the process configuration into the immutable components shared by
/// every request.
pub fn build_state<T: TimeSource + Send + Sync + 'static>(
    config: &Config,
    timesource: T,
) -> anyhow::Result<router::State> {
    let keys = config.cookie_persisted_params.0.clone();

    let codec = CookieCodec::new(
        config.deploy_env.is_production(),
        config.cookie_domain(),
        config.cookie_signing_secret(),
    )
    .map_err(|e| anyhow::anyhow!("invalid cookie signing secret: {}", e))?;
    if !codec.is_signed() {
        tracing::warn!("COOKIE_SIGNING_SECRET is unset, attribution cookies are not signed");
    }

    let whitelist = config
        .filter_properties
        .then(|| PropertyWhitelist::default().with(keys.iter().cloned()));
    let attribution = Arc::new(AttributionStore::new(keys, codec, timesource));

    let payloads = PayloadBuilder::new(
        EventValidator::new(config.mixpanel_token_whitelist.clone()),
        whitelist,
        attribution.clone(),
    );

    let upstream = UpstreamClient::new(
        config.track_url(),
        &config.user_agent(),
        config.upstream_timeout.0,
    )
    .context("failed to build upstream client")?;

    Ok(router::State {
        attribution,
        payloads: Arc::new(payloads),
        upstream,
    })
}

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if config.mixpanel_token_whitelist.is_empty() {
        tracing::warn!("MIXPANEL_TOKEN_WHITELIST is empty, every event will be rejected");
    }

    let state = build_state(&config, SystemTime {})?;
    let metrics = if config.export_prometheus {
        Some(setup_metrics_recorder().context("failed to install metrics recorder")?)
    } else {
        None
    };
    let app = router::router(state, metrics);

    tracing::info!(upstream = %config.mixpanel_api_host, env = ?config.deploy_env, "proxying to upstream");
    tracing::info!("metric-proxy listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
