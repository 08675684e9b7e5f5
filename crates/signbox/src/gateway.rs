use reqwest::header::AUTHORIZATION;
use serde_json::Value;
use tracing::debug;

use crate::config::GatewayConfig;
use crate::error::{Result, SignBoxError};
use crate::retry::RetryPolicy;
use crate::token::Token;

/// Client for the signing gateway: exchanges an archived document id for a
/// one-time, browser-navigable signing redirect URL.
///
/// This endpoint is reachable from trusted (server-side) execution contexts
/// only: the call requires a held [`Token`], which can only be minted through
/// a [`TokenProvider`](crate::TokenProvider) holding the client secret, and
/// `Token` is neither serializable nor printable. A browser-equivalent caller
/// has no way to obtain or forward the credential this call depends on.
pub struct GatewayClient {
    config: GatewayConfig,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            config,
            client,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry policy (used by tests to drop backoff delays).
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Request a one-time signing redirect URL for an archived document.
    ///
    /// Transient failures are retried with backoff; an unknown document id
    /// (404) or a rejected token (401/403) surfaces immediately.
    pub async fn create_redirect(&self, document_id: &str, token: &Token) -> Result<String> {
        let url = format!(
            "{}/api/auth/session/redirecturl?id={}",
            self.config.base_url,
            urlencoding::encode(document_id)
        );

        debug!(document_id = %document_id, "requesting signing redirect URL");

        let response = self
            .retry
            .run(|| async {
                let response = self
                    .client
                    .post(&url)
                    .header(AUTHORIZATION, token.authorization_header())
                    .json(&serde_json::json!({}))
                    .send()
                    .await
                    .map_err(SignBoxError::transport)?;

                let status = response.status();
                if status.is_success() {
                    Ok(response)
                } else {
                    let body = response.text().await.unwrap_or_default();
                    Err(SignBoxError::from_response(status, body, document_id))
                }
            })
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(SignBoxError::transport)?;
        let redirect_url = parse_redirect_payload(&body).ok_or_else(|| SignBoxError::Validation {
            status,
            message: format!("no redirect URL in gateway response: {:?}", body),
        })?;

        debug!(document_id = %document_id, "redirect URL issued");
        Ok(redirect_url)
    }
}

/// The redirect payload is opaque and environment-specific: some gateways
/// answer with a bare URL string, others wrap it in a JSON object. Accept
/// both shapes and resolve to an absolute URL string.
fn parse_redirect_payload(body: &str) -> Option<String> {
    let as_url = |s: &str| {
        url::Url::parse(s)
            .ok()
            .filter(|u| u.scheme() == "http" || u.scheme() == "https")
            .map(|u| u.to_string())
    };

    if let Ok(value) = serde_json::from_str::<Value>(body) {
        match value {
            Value::String(s) => return as_url(&s),
            Value::Object(map) => {
                for key in ["redirectUrl", "redirecturl", "url"] {
                    if let Some(Value::String(s)) = map.get(key) {
                        if let Some(url) = as_url(s) {
                            return Some(url);
                        }
                    }
                }
            }
            _ => {}
        }
        return None;
    }

    as_url(body.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Credentials, TokenGrant};
    use crate::token::TokenProvider;
    use mockito::{Matcher, Server, ServerGuard};
    use std::time::Duration;

    async fn test_token(server: &mut ServerGuard) -> Token {
        server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"tok-1","expires_in":300,"token_type":"Bearer"}"#)
            .create_async()
            .await;
        let credentials = Credentials::new("backend", "s3cr3t", format!("{}/token", server.url()));
        TokenProvider::new(credentials, TokenGrant::ClientCredentials)
            .get_token()
            .await
            .unwrap()
    }

    fn client_for(server: &Server) -> GatewayClient {
        GatewayClient::new(GatewayConfig {
            base_url: server.url(),
            timeout: Duration::from_secs(5),
        })
        .with_retry_policy(RetryPolicy::immediate(2))
    }

    #[tokio::test]
    async fn test_create_redirect_returns_url_from_json_payload() {
        let mut server = Server::new_async().await;
        let token = test_token(&mut server).await;

        let mock = server
            .mock("POST", "/api/auth/session/redirecturl")
            .match_query(Matcher::UrlEncoded("id".into(), "abc-123".into()))
            .match_header("authorization", "Bearer tok-1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"redirectUrl":"https://sign.example.com/s/one-time-42"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let url = client.create_redirect("abc-123", &token).await.unwrap();

        assert_eq!(url, "https://sign.example.com/s/one-time-42");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_redirect_accepts_bare_string_payload() {
        let mut server = Server::new_async().await;
        let token = test_token(&mut server).await;

        server
            .mock("POST", "/api/auth/session/redirecturl")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("https://sign.example.com/s/plain")
            .create_async()
            .await;

        let client = client_for(&server);
        let url = client.create_redirect("abc-123", &token).await.unwrap();
        assert_eq!(url, "https://sign.example.com/s/plain");
    }

    #[tokio::test]
    async fn test_unknown_document_is_not_found_and_not_retried() {
        let mut server = Server::new_async().await;
        let token = test_token(&mut server).await;

        let mock = server
            .mock("POST", "/api/auth/session/redirecturl")
            .match_query(Matcher::Any)
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client
            .create_redirect("unknown-id", &token)
            .await
            .unwrap_err();

        assert!(matches!(err, SignBoxError::NotFound(id) if id == "unknown-id"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_service_unavailable_retries_twice_then_surfaces() {
        let mut server = Server::new_async().await;
        let token = test_token(&mut server).await;

        let mock = server
            .mock("POST", "/api/auth/session/redirecturl")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("unavailable")
            .expect(3)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.create_redirect("abc-123", &token).await.unwrap_err();

        assert!(matches!(err, SignBoxError::Server { status: 503, .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_token_is_auth_error_never_a_url() {
        let mut server = Server::new_async().await;
        let token = test_token(&mut server).await;

        let mock = server
            .mock("POST", "/api/auth/session/redirecturl")
            .match_query(Matcher::Any)
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.create_redirect("abc-123", &token).await.unwrap_err();

        assert!(matches!(err, SignBoxError::Auth { status: Some(401), .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_payload_is_validation_error() {
        let mut server = Server::new_async().await;
        let token = test_token(&mut server).await;

        server
            .mock("POST", "/api/auth/session/redirecturl")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"redirectUrl":""}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.create_redirect("abc-123", &token).await.unwrap_err();
        assert!(matches!(err, SignBoxError::Validation { .. }));
    }

    #[test]
    fn test_parse_redirect_payload_shapes() {
        assert_eq!(
            parse_redirect_payload(r#""https://sign.example.com/s/1""#).as_deref(),
            Some("https://sign.example.com/s/1")
        );
        assert_eq!(
            parse_redirect_payload(r#"{"url":"https://sign.example.com/s/2"}"#).as_deref(),
            Some("https://sign.example.com/s/2")
        );
        assert_eq!(
            parse_redirect_payload("https://sign.example.com/s/3\n").as_deref(),
            Some("https://sign.example.com/s/3")
        );
        assert_eq!(parse_redirect_payload("{}"), None);
        assert_eq!(parse_redirect_payload("not a url"), None);
    }
}
