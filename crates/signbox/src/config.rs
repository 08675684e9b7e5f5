use std::fmt;
use std::time::Duration;

/// OIDC client credentials, supplied once at construction.
///
/// The secret is held in memory only; `Debug` redacts it so it cannot leak
/// through logs or error messages.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    /// Full token endpoint URL, e.g.
    /// `https://id.example.com/realms/signbox/protocol/openid-connect/token`.
    pub token_endpoint: String,
}

impl Credentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_endpoint: token_endpoint.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("token_endpoint", &self.token_endpoint)
            .finish()
    }
}

/// Which OIDC grant the token provider uses.
#[derive(Clone)]
pub enum TokenGrant {
    /// `client_credentials` grant: the backend authenticates as itself.
    ClientCredentials,
    /// `password` grant: the backend authenticates on behalf of a service
    /// user. Some SignBox installations are provisioned this way.
    Password {
        username: String,
        password: String,
        scope: Option<String>,
    },
}

impl TokenGrant {
    pub(crate) fn grant_type(&self) -> &'static str {
        match self {
            TokenGrant::ClientCredentials => "client_credentials",
            TokenGrant::Password { .. } => "password",
        }
    }
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenGrant::ClientCredentials => write!(f, "ClientCredentials"),
            TokenGrant::Password { username, scope, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"<redacted>")
                .field("scope", scope)
                .finish(),
        }
    }
}

/// Configuration for the archive service client.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Base URL of the archive service, without trailing slash.
    pub base_url: String,
    /// Per-request deadline. Exceeding it is classified as a network error.
    pub timeout: Duration,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Configuration for the signing gateway client.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the gateway service, without trailing slash.
    pub base_url: String,
    /// Per-request deadline. Exceeding it is classified as a network error.
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}
