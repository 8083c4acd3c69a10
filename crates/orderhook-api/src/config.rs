//! Server configuration loaded from environment variables.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use orderhook_core::order::PartnerEnvironment;
use orderhook_core::retry::RetryPolicy;
use orderhook_core::secret::Secret;
use orderhook_partner::PartnerClientConfig;

use crate::error::AppError;

/// Credentials and endpoints for one partner environment.
#[derive(Debug, Clone)]
pub struct PartnerCredential {
    /// Environment these credentials belong to.
    pub environment: PartnerEnvironment,
    /// OAuth client id issued by the partner.
    pub partner_id: String,
    /// OAuth client secret.
    pub client_secret: Secret,
    /// Key used to sign webhook deliveries.
    pub webhook_secret: Secret,
    /// Orders API base URL.
    pub api_base_url: String,
    /// OAuth token endpoint.
    pub auth_url: String,
}

impl PartnerCredential {
    /// Client settings for these credentials.
    #[must_use]
    pub fn client_config(&self, timeout: Duration, max_attempts: u32) -> PartnerClientConfig {
        PartnerClientConfig {
            api_base_url: self.api_base_url.clone(),
            auth_url: self.auth_url.clone(),
            client_id: self.partner_id.clone(),
            client_secret: self.client_secret.clone(),
            timeout,
            retry: RetryPolicy::default().with_max_attempts(max_attempts),
        }
    }
}

/// Application configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// `PostgreSQL` connection string; `None` selects the in-memory store.
    pub database_url: Option<String>,
    /// Sandbox credentials, if the sandbox webhook is enabled.
    pub sandbox: Option<PartnerCredential>,
    /// Production credentials, if the production webhook is enabled.
    pub production: Option<PartnerCredential>,
    /// Timeout for each partner request.
    pub partner_timeout: Duration,
    /// Attempts per partner call, the first included.
    pub partner_max_attempts: u32,
    /// Attempts per order write, the first included.
    pub persist_max_attempts: u32,
    /// How long processed delivery keys are kept for duplicate detection.
    pub delivery_retention: Duration,
    /// OTLP collector endpoint; `None` disables span export.
    pub otlp_endpoint: Option<String>,
}

impl AppConfig {
    /// Reads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable is malformed or a partner
    /// environment is only partly configured.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`. Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Same as [`AppConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let sandbox = partner_credential(&get, PartnerEnvironment::Sandbox)?;
        let production = partner_credential(&get, PartnerEnvironment::Production)?;

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            port: parse_or(&get, "PORT", 3000)?,
            database_url: get("DATABASE_URL").or_else(|| get("DB_URL")),
            sandbox,
            production,
            partner_timeout: Duration::from_secs(parse_or(&get, "PARTNER_TIMEOUT_SECS", 10)?),
            partner_max_attempts: attempts(&get, "PARTNER_MAX_ATTEMPTS")?,
            persist_max_attempts: attempts(&get, "PERSIST_MAX_ATTEMPTS")?,
            delivery_retention: delivery_retention(&get)?,
            otlp_endpoint: get("OTEL_EXPORTER_OTLP_ENDPOINT"),
        })
    }

    /// The socket address to listen on.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `HOST:PORT` is not a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }

    /// The configured partner environments.
    pub fn partner_credentials(&self) -> impl Iterator<Item = &PartnerCredential> {
        self.sandbox.iter().chain(self.production.iter())
    }
}

fn partner_credential<G>(
    get: &G,
    environment: PartnerEnvironment,
) -> Result<Option<PartnerCredential>, AppError>
where
    G: Fn(&str) -> Option<String>,
{
    let prefix = match environment {
        PartnerEnvironment::Sandbox => "DEV",
        PartnerEnvironment::Production => "PROD",
    };
    let client_id = get(&format!("{prefix}_CLIENT_ID"));
    let secret = get(&format!("{prefix}_SECRET"));
    let webhook_secret = get(&format!("{prefix}_WEBHOOK_SECRET"));

    let (partner_id, client_secret, webhook_secret) = match (client_id, secret, webhook_secret) {
        (None, None, None) => return Ok(None),
        (Some(id), Some(secret), Some(webhook)) => (id, secret, webhook),
        _ => {
            return Err(AppError::Config(format!(
                "{prefix}_CLIENT_ID, {prefix}_SECRET and {prefix}_WEBHOOK_SECRET must be set together"
            )));
        }
    };

    let defaults =
        PartnerClientConfig::for_environment(environment, String::new(), Secret::new(""));

    Ok(Some(PartnerCredential {
        environment,
        partner_id,
        client_secret: Secret::new(client_secret),
        webhook_secret: Secret::new(webhook_secret),
        api_base_url: get(&format!("{prefix}_API_BASE_URL")).unwrap_or(defaults.api_base_url),
        auth_url: get(&format!("{prefix}_AUTH_URL")).unwrap_or(defaults.auth_url),
    }))
}

fn parse_or<G, T>(get: &G, key: &str, default: T) -> Result<T, AppError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} is invalid: {e}"))),
        None => Ok(default),
    }
}

fn attempts<G>(get: &G, key: &str) -> Result<u32, AppError>
where
    G: Fn(&str) -> Option<String>,
{
    let value: u32 = parse_or(get, key, 3)?;
    if value == 0 {
        return Err(AppError::Config(format!("{key} must be at least 1")));
    }
    Ok(value)
}

fn delivery_retention<G>(get: &G) -> Result<Duration, AppError>
where
    G: Fn(&str) -> Option<String>,
{
    let hours: u64 = parse_or(get, "DELIVERY_RETENTION_HOURS", 72)?;
    if hours == 0 {
        return Err(AppError::Config(
            "DELIVERY_RETENTION_HOURS must be at least 1".into(),
        ));
    }
    Ok(Duration::from_secs(hours.saturating_mul(3600)))
}
