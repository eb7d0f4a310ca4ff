//! Attribution parameters (campaign, utm_* ...) persisted across requests
//! through the `metricProxy` cookie.
//!
//! This plays the part the mixpanel JS library's super properties play in a
//! browser, for clients where JS is unavailable: tracking pixels and click
//! redirects.
//!
//! Concurrent requests from one client each compute their own cookie from
//! what they received; the last response to land wins, values are not merged.

use std::collections::HashMap;
use std::sync::Arc;

use axum_extra::extract::cookie::{Cookie, CookieJar};
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use indexmap::IndexMap;
use sha2::Sha256;
use time::{Duration, OffsetDateTime};

use crate::time::TimeSource;

pub const PERSISTED_COOKIE_NAME: &str = "metricProxy";
pub const COOKIE_TTL: Duration = Duration::days(14);
pub const DEFAULT_PERSISTED_PARAMS: &[&str] = &[
    "campaign",
    "creative",
    "placement",
    "referer",
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_content",
    "utm_term",
];

const SIGNED_PREFIX: &str = "s:";
/// Marks a JSON-serialized cookie value, as express' `res.cookie` writes it.
const JSON_PREFIX: &str = "j:";

pub type AttributionParams = IndexMap<String, String>;

type HmacSha256 = Hmac<Sha256>;

/// Writes and reads cookie values: signing, and the attributes that depend on
/// the deployment (`Secure`, `Domain`).
#[derive(Clone)]
pub struct CookieCodec {
    secure: bool,
    domain: Option<String>,
    signer: Option<HmacSha256>,
}

impl CookieCodec {
    pub fn new(
        secure: bool,
        domain: Option<String>,
        signing_secret: Option<&str>,
    ) -> Result<Self, hmac::digest::InvalidLength> {
        let signer = signing_secret
            .map(|secret| HmacSha256::new_from_slice(secret.as_bytes()))
            .transpose()?;

        Ok(CookieCodec {
            secure,
            domain,
            signer,
        })
    }

    pub fn is_signed(&self) -> bool {
        self.signer.is_some()
    }

    /// `s:<value>.<signature>` when signing, the plain value otherwise.
    pub fn seal(&self, value: &str) -> String {
        match &self.signer {
            Some(signer) => {
                let mut mac = signer.clone();
                mac.update(value.as_bytes());
                let signature = STANDARD_NO_PAD.encode(mac.finalize().into_bytes());
                format!("{}{}.{}", SIGNED_PREFIX, value, signature)
            }
            None => value.to_string(),
        }
    }

    /// The original value of a sealed cookie, or `None` if its signature
    /// does not check out.
    pub fn open<'a>(&self, raw: &'a str) -> Option<&'a str> {
        let Some(signer) = &self.signer else {
            return Some(raw);
        };

        let (value, signature) = raw.strip_prefix(SIGNED_PREFIX)?.rsplit_once('.')?;
        let signature = STANDARD_NO_PAD.decode(signature).ok()?;

        let mut mac = signer.clone();
        mac.update(value.as_bytes());
        mac.verify_slice(&signature).ok()?;
        Some(value)
    }

    pub fn build(&self, name: &'static str, value: &str, now: OffsetDateTime) -> Cookie<'static> {
        let mut cookie = Cookie::build((name, self.seal(value)))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .max_age(COOKIE_TTL)
            .expires(now + COOKIE_TTL);

        if let Some(domain) = &self.domain {
            cookie = cookie.domain(domain.clone());
        }

        cookie.build()
    }
}

pub struct AttributionStore {
    keys: Vec<String>,
    codec: CookieCodec,
    timesource: Arc<dyn TimeSource + Send + Sync>,
}

impl AttributionStore {
    pub fn new<T: TimeSource + Send + Sync + 'static>(
        keys: Vec<String>,
        codec: CookieCodec,
        timesource: T,
    ) -> Self {
        AttributionStore {
            keys,
            codec,
            timesource: Arc::new(timesource),
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Configured attribution keys carried by the query string, in
    /// configuration order. Empty values are ignored.
    pub fn select(&self, query: &HashMap<String, String>) -> AttributionParams {
        self.keys
            .iter()
            .filter_map(|key| {
                query
                    .get(key)
                    .filter(|value| !value.is_empty())
                    .map(|value| (key.clone(), value.clone()))
            })
            .collect()
    }

    /// Remember the attribution parameters of the current request for later
    /// ones. The jar is left untouched when the query has none.
    pub fn persist(
        &self,
        query: &HashMap<String, String>,
        jar: CookieJar,
    ) -> (CookieJar, AttributionParams) {
        let params = self.select(query);
        if params.is_empty() {
            return (jar, params);
        }

        let value = match serde_json::to_string(&params) {
            Ok(json) => format!("{}{}", JSON_PREFIX, json),
            Err(e) => {
                tracing::error!("failed to serialize attribution cookie: {}", e);
                return (jar, AttributionParams::new());
            }
        };

        tracing::debug!(cookie = PERSISTED_COOKIE_NAME, value = %value, "<< persisting cookie");
        let cookie = self
            .codec
            .build(PERSISTED_COOKIE_NAME, &value, self.timesource.now());
        (jar.add(cookie), params)
    }

    /// Attribution parameters persisted by an earlier request. Unsigned,
    /// tampered or unparseable cookies restore nothing. The `j:` prefix is
    /// optional on read.
    pub fn restore(&self, jar: &CookieJar) -> AttributionParams {
        let Some(cookie) = jar.get(PERSISTED_COOKIE_NAME) else {
            return AttributionParams::new();
        };

        let Some(value) = self.codec.open(cookie.value()) else {
            tracing::warn!("ignoring {} cookie with a bad signature", PERSISTED_COOKIE_NAME);
            return AttributionParams::new();
        };

        let value = value.strip_prefix(JSON_PREFIX).unwrap_or(value);
        match serde_json::from_str::<AttributionParams>(value) {
            Ok(params) => params,
            Err(e) => {
                tracing::warn!("ignoring malformed {} cookie: {}", PERSISTED_COOKIE_NAME, e);
                AttributionParams::new()
            }
        }
    }
}
