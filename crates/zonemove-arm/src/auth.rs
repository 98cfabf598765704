//! Bearer tokens for Resource Manager.
//!
//! Two credential sources are supported:
//!
//! | Variables | Credential |
//! |-----------|------------|
//! | `AZURE_ACCESS_TOKEN` | [`Credential::StaticToken`] |
//! | `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET` | [`Credential::ClientSecret`] |
//!
//! Client-secret tokens are cached and refreshed five minutes before expiry.

use std::fmt;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use zonemove_common::{MigrateError, MigrateResult};

pub const ACCESS_TOKEN_ENV: &str = "AZURE_ACCESS_TOKEN";
pub const TENANT_ID_ENV: &str = "AZURE_TENANT_ID";
pub const CLIENT_ID_ENV: &str = "AZURE_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "AZURE_CLIENT_SECRET";

/// Tokens are refreshed this long before they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Where bearer tokens come from.
#[derive(Clone)]
pub enum Credential {
    /// Pre-acquired token, used as is.
    StaticToken(String),
    /// Service principal, OAuth2 client-credentials grant.
    ClientSecret {
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::StaticToken(_) => f.write_str("StaticToken(..)"),
            Credential::ClientSecret {
                tenant_id,
                client_id,
                ..
            } => f
                .debug_struct("ClientSecret")
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .finish_non_exhaustive(),
        }
    }
}

impl Credential {
    /// Reads the credential from the process environment.
    pub fn from_env() -> MigrateResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves the credential through `lookup`; a static token wins over a
    /// service principal.
    pub fn from_lookup<F>(lookup: F) -> MigrateResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty(ACCESS_TOKEN_ENV) {
            return Ok(Credential::StaticToken(token));
        }

        match (
            non_empty(TENANT_ID_ENV),
            non_empty(CLIENT_ID_ENV),
            non_empty(CLIENT_SECRET_ENV),
        ) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => {
                Ok(Credential::ClientSecret {
                    tenant_id,
                    client_id,
                    client_secret,
                })
            }
            _ => Err(MigrateError::auth(format!(
                "no credential found: set {} or {}, {} and {}",
                ACCESS_TOKEN_ENV, TENANT_ID_ENV, CLIENT_ID_ENV, CLIENT_SECRET_ENV
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Hands out bearer tokens for one credential, caching between calls.
pub struct TokenProvider {
    credential: Credential,
    authority: String,
    scope: String,
    cache: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(credential: Credential, authority: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            credential,
            authority: authority.into(),
            scope: scope.into(),
            cache: Mutex::new(None),
        }
    }

    /// Returns a valid bearer token, fetching a new one when needed.
    pub async fn token(&self, http: &Client) -> MigrateResult<String> {
        let (tenant_id, client_id, client_secret) = match &self.credential {
            Credential::StaticToken(token) => return Ok(token.clone()),
            Credential::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
            } => (tenant_id, client_id, client_secret),
        };

        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if Instant::now() < cached.refresh_at {
                return Ok(cached.value.clone());
            }
        }

        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority.trim_end_matches('/'),
            tenant_id
        );
        debug!(%url, client_id = %client_id, "Requesting access token");

        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ];
        let response = http
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| MigrateError::auth(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MigrateError::auth(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| MigrateError::auth(format!("invalid token response: {}", e)))?;

        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3600));
        let refresh_at = Instant::now() + lifetime.saturating_sub(REFRESH_MARGIN);
        *cache = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at,
        });

        Ok(token.access_token)
    }
}
