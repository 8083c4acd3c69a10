//! `reqwest` implementation of the `PartnerGateway` trait.

use std::time::Duration;

use async_trait::async_trait;
use orderhook_core::error::PartnerError;
use orderhook_core::order::PartnerEnvironment;
use orderhook_core::partner::{OrderDecision, PartnerGateway, SyncStatus};
use orderhook_core::retry::{RetryPolicy, retry_transient};
use orderhook_core::secret::Secret;
use reqwest::header::ACCEPT;
use reqwest::{Client, Method, Response, Url};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::token::TokenCache;

/// Orders API base URL for the partner's live platform.
pub const PRODUCTION_API_BASE_URL: &str = "https://api.developers.deliveroo.com/order/v1/orders";
/// Orders API base URL for the partner's sandbox.
pub const SANDBOX_API_BASE_URL: &str =
    "https://api-sandbox.developers.deliveroo.com/order/v1/orders";
/// OAuth token endpoint for the partner's live platform.
pub const PRODUCTION_AUTH_URL: &str = "https://auth.developers.deliveroo.com/oauth2/token";
/// OAuth token endpoint for the partner's sandbox.
pub const SANDBOX_AUTH_URL: &str = "https://auth-sandbox.developers.deliveroo.com/oauth2/token";

/// Token lifetime assumed when the partner omits `expires_in`.
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(300);

/// Connection settings for one partner environment.
#[derive(Debug, Clone)]
pub struct PartnerClientConfig {
    /// Orders collection URL; order ids are appended as path segments.
    pub api_base_url: String,
    /// OAuth2 token endpoint.
    pub auth_url: String,
    /// OAuth2 client id (the partner id).
    pub client_id: String,
    /// OAuth2 client secret.
    pub client_secret: Secret,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Backoff for transient failures.
    pub retry: RetryPolicy,
}

impl PartnerClientConfig {
    /// Settings pointing at the partner's published URLs for `environment`.
    #[must_use]
    pub fn for_environment(
        environment: PartnerEnvironment,
        client_id: String,
        client_secret: Secret,
    ) -> Self {
        let (api_base_url, auth_url) = match environment {
            PartnerEnvironment::Sandbox => (SANDBOX_API_BASE_URL, SANDBOX_AUTH_URL),
            PartnerEnvironment::Production => (PRODUCTION_API_BASE_URL, PRODUCTION_AUTH_URL),
        };
        Self {
            api_base_url: api_base_url.to_owned(),
            auth_url: auth_url.to_owned(),
            client_id,
            client_secret,
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Partner Orders API client.
#[derive(Debug)]
pub struct HttpPartnerClient {
    http: Client,
    api_base_url: Url,
    auth_url: Url,
    config: PartnerClientConfig,
    token: TokenCache,
}

impl HttpPartnerClient {
    /// Builds a client from `config`.
    ///
    /// # Errors
    ///
    /// Returns `PartnerError::NotConfigured` if either URL is invalid, or
    /// `PartnerError::Transport` if the HTTP client cannot be built.
    pub fn new(config: PartnerClientConfig) -> Result<Self, PartnerError> {
        let api_base_url = parse_base_url(&config.api_base_url)?;
        let auth_url = Url::parse(&config.auth_url).map_err(|e| {
            PartnerError::NotConfigured(format!("invalid auth URL {}: {e}", config.auth_url))
        })?;
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PartnerError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_base_url,
            auth_url,
            config,
            token: TokenCache::default(),
        })
    }

    fn order_url(&self, order_id: &str, suffix: Option<&str>) -> Url {
        let mut url = self.api_base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(order_id);
            if let Some(suffix) = suffix {
                segments.push(suffix);
            }
        }
        url
    }

    async fn bearer_token(&self) -> Result<Secret, PartnerError> {
        self.token.get_or_fetch(|| self.fetch_token()).await
    }

    async fn fetch_token(&self) -> Result<(Secret, Duration), PartnerError> {
        debug!(client_id = %self.config.client_id, "requesting partner access token");

        let response = self
            .http
            .post(self.auth_url.clone())
            .basic_auth(&self.config.client_id, Some(self.config.client_secret.expose()))
            .header(ACCEPT, "application/json")
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(transport_error)?;

        // A refused client secret will not improve on retry.
        let response = check_status(response).await.map_err(|err| match err {
            PartnerError::Unauthorized(body) => PartnerError::Rejected { status: 401, body },
            other => other,
        })?;

        let token: TokenResponse = response.json().await.map_err(|e| {
            PartnerError::InvalidResponse(format!("unreadable token response: {e}"))
        })?;
        let ttl = token
            .expires_in
            .map_or(DEFAULT_TOKEN_TTL, Duration::from_secs);
        Ok((Secret::new(token.access_token), ttl))
    }

    async fn send_once(
        &self,
        method: Method,
        url: &Url,
        body: &serde_json::Value,
    ) -> Result<(), PartnerError> {
        let token = self.bearer_token().await?;
        let response = self
            .http
            .request(method, url.clone())
            .bearer_auth(token.expose())
            .header(ACCEPT, "application/json")
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        match check_status(response).await {
            Ok(_) => Ok(()),
            Err(PartnerError::Unauthorized(body)) => {
                self.token.invalidate().await;
                Err(PartnerError::Unauthorized(body))
            }
            Err(err) => Err(err),
        }
    }

    async fn send(
        &self,
        operation: &str,
        method: Method,
        url: Url,
        body: serde_json::Value,
    ) -> Result<(), PartnerError> {
        let (url, body, method) = (&url, &body, &method);
        retry_transient(&self.config.retry, operation, |_attempt| {
            self.send_once(method.clone(), url, body)
        })
        .await
    }
}

#[async_trait]
impl PartnerGateway for HttpPartnerClient {
    #[instrument(skip(self, status), fields(status = ?status.status))]
    async fn sync_status(&self, order_id: &str, status: &SyncStatus) -> Result<(), PartnerError> {
        let body = serde_json::to_value(status)
            .map_err(|e| PartnerError::InvalidResponse(format!("unencodable sync status: {e}")))?;
        let url = self.order_url(order_id, Some("sync_status"));
        self.send("sync_status", Method::POST, url, body).await
    }

    #[instrument(skip(self))]
    async fn update_order_status(
        &self,
        order_id: &str,
        decision: OrderDecision,
    ) -> Result<(), PartnerError> {
        let body = serde_json::json!({ "status": decision });
        let url = self.order_url(order_id, None);
        self.send("update_order_status", Method::PATCH, url, body)
            .await
    }
}

fn parse_base_url(raw: &str) -> Result<Url, PartnerError> {
    let url = Url::parse(raw)
        .map_err(|e| PartnerError::NotConfigured(format!("invalid API base URL {raw}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(PartnerError::NotConfigured(format!(
            "API base URL cannot take path segments: {raw}"
        )));
    }
    Ok(url)
}

fn transport_error(err: reqwest::Error) -> PartnerError {
    if err.is_decode() {
        PartnerError::InvalidResponse(err.to_string())
    } else {
        PartnerError::Transport(err.to_string())
    }
}

/// Maps non-success statuses onto `PartnerError`, reading the body for
/// diagnostics.
async fn check_status(response: Response) -> Result<Response, PartnerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let code = status.as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(match code {
        401 => PartnerError::Unauthorized(body),
        408 | 429 | 500..=599 => PartnerError::Unavailable { status: code, body },
        _ => PartnerError::Rejected { status: code, body },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(base: &str) -> HttpPartnerClient {
        let mut config = PartnerClientConfig::for_environment(
            PartnerEnvironment::Sandbox,
            "client".into(),
            Secret::new("secret"),
        );
        config.api_base_url = base.to_owned();
        HttpPartnerClient::new(config).unwrap()
    }

    #[test]
    fn test_order_url_appends_order_id_and_suffix() {
        let client = client_for("https://partner.test/order/v1/orders");

        let url = client.order_url("gb:1234", Some("sync_status"));

        assert_eq!(
            url.as_str(),
            "https://partner.test/order/v1/orders/gb:1234/sync_status"
        );
    }

    #[test]
    fn test_order_url_tolerates_trailing_slash() {
        let client = client_for("https://partner.test/orders/");

        let url = client.order_url("A1", None);

        assert_eq!(url.as_str(), "https://partner.test/orders/A1");
    }

    #[test]
    fn test_order_url_escapes_path_separators_in_ids() {
        let client = client_for("https://partner.test/orders");

        let url = client.order_url("a/b", None);

        assert_eq!(url.as_str(), "https://partner.test/orders/a%2Fb");
    }

    #[test]
    fn test_invalid_base_url_is_reported_as_not_configured() {
        let mut config = PartnerClientConfig::for_environment(
            PartnerEnvironment::Production,
            "client".into(),
            Secret::new("secret"),
        );
        config.api_base_url = "not a url".into();

        let result = HttpPartnerClient::new(config);

        assert!(matches!(result, Err(PartnerError::NotConfigured(_))));
    }

    #[test]
    fn test_environment_defaults_use_published_urls() {
        let config = PartnerClientConfig::for_environment(
            PartnerEnvironment::Sandbox,
            "client".into(),
            Secret::new("secret"),
        );

        assert_eq!(config.api_base_url, SANDBOX_API_BASE_URL);
        assert_eq!(config.auth_url, SANDBOX_AUTH_URL);
    }
}
