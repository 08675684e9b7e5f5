use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::{Credentials, TokenGrant};
use crate::error::{AuthReason, Result, SignBoxError};
use crate::retry::RetryPolicy;

/// Tokens are treated as expired this many seconds before their actual
/// expiry, to absorb clock skew and network latency.
pub const EXPIRY_SKEW_SECS: i64 = 30;

/// A bearer token issued by the identity provider.
///
/// The raw access token is private and the type is deliberately not
/// serializable: token material must never end up in persisted session state,
/// logs or a browser-reachable payload. Protected calls render it through
/// [`Token::authorization_header`] only.
#[derive(Clone)]
pub struct Token {
    access_token: String,
    token_type: String,
    expires_at: DateTime<Utc>,
}

impl Token {
    /// Whether the token is still usable at `now`, applying [`EXPIRY_SKEW_SECS`].
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now + chrono::Duration::seconds(EXPIRY_SKEW_SECS) < self.expires_at
    }

    /// Value for the `Authorization` header of a protected call.
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default = "default_token_type")]
    token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// OIDC error body, e.g. `{"error":"invalid_client","error_description":"..."}`.
#[derive(Deserialize)]
struct OidcErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Obtains and caches OIDC bearer tokens, minimizing redundant requests.
///
/// The cache lives behind an async mutex and the refresh runs while the lock
/// is held, so concurrent [`get_token`](TokenProvider::get_token) calls during
/// an expired-token window collapse into exactly one in-flight token request;
/// the other callers simply await the lock and reuse the fresh token.
pub struct TokenProvider {
    credentials: Credentials,
    grant: TokenGrant,
    http_client: reqwest::Client,
    retry: RetryPolicy,
    cache: Mutex<Option<Token>>,
}

impl TokenProvider {
    pub fn new(credentials: Credentials, grant: TokenGrant) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            credentials,
            grant,
            http_client,
            retry: RetryPolicy::default(),
            cache: Mutex::new(None),
        }
    }

    /// Override the retry policy (used by tests to drop backoff delays).
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Return a currently-valid bearer token, refreshing the cache if needed.
    pub async fn get_token(&self) -> Result<Token> {
        let mut cache = self.cache.lock().await;

        if let Some(token) = cache.as_ref() {
            if token.is_valid(Utc::now()) {
                return Ok(token.clone());
            }
        }

        debug!(
            endpoint = %self.credentials.token_endpoint,
            grant = self.grant.grant_type(),
            "token cache empty or expired, requesting new token"
        );
        let token = self.retry.run(|| self.request()).await?;
        *cache = Some(token.clone());
        Ok(token)
    }

    /// Discard the cached token and fetch a fresh one. Used after a protected
    /// call was rejected with an auth error despite a seemingly valid token.
    pub async fn force_refresh(&self) -> Result<Token> {
        let mut cache = self.cache.lock().await;
        *cache = None;

        let token = self.retry.run(|| self.request()).await?;
        *cache = Some(token.clone());
        Ok(token)
    }

    /// Issue one token request, classifying the outcome. Transport failures
    /// and 5xx responses are retryable; credential rejections are not.
    async fn request(&self) -> Result<Token> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", self.grant.grant_type()),
            ("client_id", &self.credentials.client_id),
            ("client_secret", &self.credentials.client_secret),
        ];
        if let TokenGrant::Password {
            username,
            password,
            scope,
        } = &self.grant
        {
            form.push(("username", username));
            form.push(("password", password));
            if let Some(scope) = scope {
                form.push(("scope", scope));
            }
        }

        let response = self
            .http_client
            .post(&self.credentials.token_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(SignBoxError::transport)?;

        let status = response.status();
        if status.is_success() {
            let body: TokenResponse =
                response
                    .json()
                    .await
                    .map_err(|e| SignBoxError::Validation {
                        status: status.as_u16(),
                        message: format!("invalid token response: {}", e),
                    })?;

            let expires_at = Utc::now() + chrono::Duration::seconds(body.expires_in);
            debug!(%expires_at, "obtained access token");

            Ok(Token {
                access_token: body.access_token,
                token_type: body.token_type,
                expires_at,
            })
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(classify_token_failure(status, body))
        }
    }
}

fn classify_token_failure(status: StatusCode, body: String) -> SignBoxError {
    if status.is_server_error() {
        return SignBoxError::Server {
            status: status.as_u16(),
            message: body,
        };
    }

    if let Ok(oidc) = serde_json::from_str::<OidcErrorBody>(&body) {
        let reason = match oidc.error.as_str() {
            "invalid_client" => Some(AuthReason::InvalidClient),
            "invalid_grant" => Some(AuthReason::InvalidGrant),
            "unauthorized_client" => Some(AuthReason::Unauthorized),
            _ => None,
        };
        if let Some(reason) = reason {
            return SignBoxError::Auth {
                reason,
                status: Some(status.as_u16()),
            };
        }
        if let Some(description) = oidc.error_description {
            return SignBoxError::Validation {
                status: status.as_u16(),
                message: description,
            };
        }
    }

    match status.as_u16() {
        401 | 403 => SignBoxError::Auth {
            reason: AuthReason::Unauthorized,
            status: Some(status.as_u16()),
        },
        s => SignBoxError::Validation {
            status: s,
            message: body,
        },
    }
}
