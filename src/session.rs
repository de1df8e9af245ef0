use std::time::Duration;

use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder};
use url::Url;

use crate::error::Result;

pub const DEFAULT_API_BASE: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Wrapper around the HTTP client used to reach the inference provider.
///
/// Holds no credential: each call supplies the caller's own key.
#[derive(Debug, Clone)]
pub struct HttpSession {
    client: Client,
    base: Url,
}

/// Minimal data required to build an HTTP session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub api_base: String,
    pub timeout: Duration,
}

impl SessionConfig {
    pub fn new(api_base: String, timeout: Duration) -> Self {
        Self { api_base, timeout }
    }
}

impl HttpSession {
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(api_version_header(), HeaderValue::from_static(API_VERSION));

        let client = ClientBuilder::new()
            .default_headers(default_headers)
            .timeout(config.timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .context("building provider HTTP client")?;

        let base = Url::parse(&config.api_base)
            .with_context(|| format!("parsing provider base url `{}`", config.api_base))?;

        Ok(Self { client, base })
    }

    /// Returns reference to the inner `reqwest::Client`.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Provider base URL.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Endpoint accepting multimodal chat messages.
    pub fn messages_url(&self) -> Result<Url> {
        self.base
            .join("v1/messages")
            .context("invalid messages url")
    }
}

fn api_version_header() -> HeaderName {
    HeaderName::from_static("anthropic-version")
}
