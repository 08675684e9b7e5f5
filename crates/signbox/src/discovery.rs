use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::config::Credentials;
use crate::error::{Result, SignBoxError};

/// Subset of the OIDC provider metadata this crate cares about.
///
/// Discovery is a read-only configuration source consulted at startup; it is
/// not part of the runtime data path.
#[derive(Debug, Clone, Deserialize)]
pub struct OidcConfiguration {
    pub issuer: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
    #[serde(default)]
    pub jwks_uri: Option<String>,
    #[serde(default)]
    pub grant_types_supported: Vec<String>,
}

impl OidcConfiguration {
    /// Build [`Credentials`] against the discovered token endpoint.
    pub fn credentials(
        &self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Credentials {
        Credentials::new(client_id, client_secret, self.token_endpoint.clone())
    }
}

/// Fetch `{issuer}/.well-known/openid-configuration` and return the provider
/// metadata, so the token endpoint does not have to be hardcoded per
/// environment.
pub async fn fetch_oidc_configuration(issuer: &str) -> Result<OidcConfiguration> {
    let url = format!(
        "{}/.well-known/openid-configuration",
        issuer.trim_end_matches('/')
    );
    debug!(%url, "fetching OIDC discovery document");

    let client = reqwest::Client::new();
    let response = tokio::time::timeout(Duration::from_secs(10), client.get(&url).send())
        .await
        .map_err(|_| SignBoxError::Network(format!("discovery request to {} timed out", url)))?
        .map_err(SignBoxError::transport)?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SignBoxError::from_response(status, body, issuer));
    }

    let configuration: OidcConfiguration =
        response
            .json()
            .await
            .map_err(|e| SignBoxError::Validation {
                status: status.as_u16(),
                message: format!("invalid discovery document: {}", e),
            })?;

    if configuration.token_endpoint.is_empty() {
        return Err(SignBoxError::Validation {
            status: status.as_u16(),
            message: "discovery document has no token_endpoint".to_string(),
        });
    }

    debug!(token_endpoint = %configuration.token_endpoint, "discovered OIDC configuration");
    Ok(configuration)
}
