use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::archive::{ArchiveClient, ArchivedDocument, DocumentMetadata, DownloadStream};
use crate::error::{Result, SignBoxError};
use crate::gateway::GatewayClient;
use crate::token::TokenProvider;

/// Lifecycle of a signing session.
///
/// `Created -> RedirectIssued -> UserReturned -> Downloaded`, with `Failed`
/// reachable from any state on an unrecoverable error.
///
/// The orchestrator records transitions but does not enforce ordering: the
/// caller, who persists and reloads sessions, owns the sequencing. In
/// particular [`complete_session`](SigningSessionOrchestrator::complete_session)
/// is valid in any state, which is what permits fetching the original bytes
/// before signing or re-downloading after `Downloaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    RedirectIssued,
    UserReturned,
    Downloaded,
    Failed,
}

/// A signing session as handed back to the caller.
///
/// The user signs the document out-of-band in a browser, which may take
/// arbitrarily long and outlive this process; the session is therefore
/// serializable so the caller can persist it and reload it before
/// [`complete_session`](SigningSessionOrchestrator::complete_session).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningSession {
    /// Durable archive id of the uploaded document.
    pub document_id: String,
    /// One-time browser-navigable URL to the signing UI.
    pub redirect_url: String,
    pub created_at: DateTime<Utc>,
    pub status: SessionStatus,
}

/// Sequences the token provider, archive and gateway clients into the
/// documented signing flow.
///
/// Holds no per-session state: every session lives in the returned
/// [`SigningSession`] value, and concurrent sessions share the token cache
/// through the `Arc<TokenProvider>`. The orchestrator never re-classifies
/// errors; it only decides whether a step gets the one forced-refresh retry
/// an auth rejection warrants.
pub struct SigningSessionOrchestrator {
    tokens: Arc<TokenProvider>,
    archive: ArchiveClient,
    gateway: GatewayClient,
}

impl SigningSessionOrchestrator {
    pub fn new(tokens: Arc<TokenProvider>, archive: ArchiveClient, gateway: GatewayClient) -> Self {
        Self {
            tokens,
            archive,
            gateway,
        }
    }

    /// Upload a document and obtain its signing redirect URL.
    ///
    /// On success the returned session is in `RedirectIssued`. Any step's
    /// non-retryable failure is surfaced unchanged; an auth rejection from a
    /// protected call triggers one forced token refresh and a single retry of
    /// that step before giving up.
    pub async fn start_session(
        &self,
        file: &[u8],
        metadata: &DocumentMetadata,
    ) -> Result<SigningSession> {
        let token = self.tokens.get_token().await?;

        info!(filename = %metadata.filename, size = file.len(), "starting signing session");
        let document = match self.archive.upload(file, metadata, &token).await {
            Ok(document) => document,
            Err(SignBoxError::Auth { reason, status }) => {
                warn!(%reason, ?status, "upload rejected, refreshing token for one retry");
                let token = self.tokens.force_refresh().await?;
                self.archive.upload(file, metadata, &token).await?
            }
            Err(err) => return Err(err),
        };
        debug!(document_id = %document.id, "document archived, requesting redirect");

        let redirect_url = self.issue_redirect(&document).await?;

        info!(document_id = %document.id, "signing session ready");
        Ok(SigningSession {
            document_id: document.id,
            redirect_url,
            created_at: Utc::now(),
            status: SessionStatus::RedirectIssued,
        })
    }

    async fn issue_redirect(&self, document: &ArchivedDocument) -> Result<String> {
        // Upload may have outlived the token; reuse the cache, which refreshes
        // itself when within the expiry skew.
        let token = self.tokens.get_token().await?;
        match self.gateway.create_redirect(&document.id, &token).await {
            Ok(url) => Ok(url),
            Err(SignBoxError::Auth { reason, status }) => {
                warn!(%reason, ?status, "redirect rejected, refreshing token for one retry");
                let token = self.tokens.force_refresh().await?;
                self.gateway.create_redirect(&document.id, &token).await
            }
            Err(err) => Err(err),
        }
    }

    /// Record that the user came back from the signing UI. Purely a state
    /// transition; the signed artifact is fetched by `complete_session`.
    /// No ordering is enforced (see [`SessionStatus`]).
    pub fn mark_user_returned(&self, session: &mut SigningSession) {
        debug!(document_id = %session.document_id, "user returned from signing UI");
        session.status = SessionStatus::UserReturned;
    }

    /// Download the signed artifact for a session, transitioning it to
    /// `Downloaded` on success and `Failed` on an unrecoverable error.
    pub async fn complete_session(
        &self,
        session: &mut SigningSession,
        version: Option<&str>,
    ) -> Result<DownloadStream> {
        let token = self.tokens.get_token().await?;

        let result = match self
            .archive
            .download(&session.document_id, version, &token)
            .await
        {
            Err(SignBoxError::Auth { reason, status }) => {
                warn!(%reason, ?status, "download rejected, refreshing token for one retry");
                let token = self.tokens.force_refresh().await?;
                self.archive
                    .download(&session.document_id, version, &token)
                    .await
            }
            other => other,
        };

        match result {
            Ok(stream) => {
                info!(document_id = %session.document_id, "signed artifact downloaded");
                session.status = SessionStatus::Downloaded;
                Ok(stream)
            }
            Err(err) => {
                warn!(document_id = %session.document_id, "session failed: {}", err);
                session.status = SessionStatus::Failed;
                Err(err)
            }
        }
    }
}
