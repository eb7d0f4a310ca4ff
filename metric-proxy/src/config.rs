use std::str::FromStr;
use std::time;

use envconfig::Envconfig;

use crate::cookies::DEFAULT_PERSISTED_PARAMS;
use crate::token::TokenWhitelist;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "8000")]
    pub port: u16,

    #[envconfig(from = "MIXPANEL_API_HOST", default = "https://api.mixpanel.com")]
    pub mixpanel_api_host: String,

    #[envconfig(from = "MIXPANEL_TOKEN_WHITELIST")]
    pub mixpanel_token_whitelist: TokenWhitelist,

    #[envconfig(
        from = "COOKIE_PERSISTED_PARAMS",
        default = "campaign,creative,placement,referer,utm_source,utm_medium,utm_campaign,utm_content,utm_term"
    )]
    pub cookie_persisted_params: CommaSeparated,

    #[envconfig(from = "COOKIE_DOMAIN")]
    pub cookie_domain: Option<String>,

    #[envconfig(from = "COOKIE_SIGNING_SECRET")]
    pub cookie_signing_secret: Option<String>,

    #[envconfig(from = "DEPLOY_ENV", default = "development")]
    pub deploy_env: DeployEnv,

    #[envconfig(from = "FILTER_PROPERTIES", default = "true")]
    pub filter_properties: bool,

    #[envconfig(from = "UPSTREAM_TIMEOUT_MS", default = "10000")]
    pub upstream_timeout: EnvMsDuration,

    #[envconfig(from = "USER_AGENT_VENDOR", default = "brave.com")]
    pub user_agent_vendor: String,

    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,

    #[envconfig(from = "EXPORT_PROMETHEUS", default = "false")]
    pub export_prometheus: bool,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `User-Agent` sent upstream, e.g. `metric-proxy/0.1.0 (brave.com)`.
    pub fn user_agent(&self) -> String {
        format!(
            "metric-proxy/{} ({})",
            env!("CARGO_PKG_VERSION"),
            self.user_agent_vendor
        )
    }

    pub fn track_url(&self) -> String {
        format!("{}/track", self.mixpanel_api_host.trim_end_matches('/'))
    }

    /// Blank values count as unset.
    pub fn cookie_domain(&self) -> Option<String> {
        self.cookie_domain.clone().filter(|domain| !domain.is_empty())
    }

    pub fn cookie_signing_secret(&self) -> Option<&str> {
        self.cookie_signing_secret
            .as_deref()
            .filter(|secret| !secret.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployEnv {
    Development,
    Test,
    Production,
}

impl DeployEnv {
    pub fn is_production(&self) -> bool {
        matches!(self, DeployEnv::Production)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseDeployEnvError(String);

impl std::fmt::Display for ParseDeployEnvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown deployment environment: {}", self.0)
    }
}

impl FromStr for DeployEnv {
    type Err = ParseDeployEnvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(DeployEnv::Development),
            "test" => Ok(DeployEnv::Test),
            "production" | "prod" => Ok(DeployEnv::Production),
            _ => Err(ParseDeployEnvError(s.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl std::fmt::Display for ParseEnvMsDurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "expected a duration in milliseconds")
    }
}

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommaSeparated(pub Vec<String>);

impl Default for CommaSeparated {
    fn default() -> Self {
        CommaSeparated(
            DEFAULT_PERSISTED_PARAMS
                .iter()
                .map(|key| key.to_string())
                .collect(),
        )
    }
}

impl FromStr for CommaSeparated {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(CommaSeparated(
            s.split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(String::from)
                .collect(),
        ))
    }
}
