//! SignBox Client
//!
//! Backend client library for the SignBox document-signing platform.
//!
//! # Features
//! - OIDC bearer token acquisition with in-memory caching and refresh dedup
//! - Archive upload/download with multipart metadata and streamed bodies
//! - One-time signing redirect URL issuance (server-side contexts only)
//! - Signing session orchestration with a persistable session state machine
//! - Uniform error taxonomy and retry-with-backoff policy across clients
//!
//! The typical flow: upload a document to the archive, exchange its id for a
//! one-time redirect URL, hand that URL to the user's browser, and download
//! the signed artifact after the user returns.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use signbox::{
//!     ArchiveClient, ArchiveConfig, Credentials, DocumentMetadata, GatewayClient,
//!     GatewayConfig, SigningSessionOrchestrator, TokenGrant, TokenProvider,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let tokens = Arc::new(TokenProvider::new(
//!     Credentials::new("backend", "secret", "https://id.example.com/token"),
//!     TokenGrant::ClientCredentials,
//! ));
//! let orchestrator = SigningSessionOrchestrator::new(
//!     tokens,
//!     ArchiveClient::new(ArchiveConfig {
//!         base_url: "https://archive.example.com".into(),
//!         ..Default::default()
//!     }),
//!     GatewayClient::new(GatewayConfig {
//!         base_url: "https://gateway.example.com".into(),
//!         ..Default::default()
//!     }),
//! );
//!
//! let metadata = DocumentMetadata::new("contract.pdf", "Contract", "application/pdf");
//! let session = orchestrator.start_session(b"%PDF-1.7", &metadata).await?;
//! // persist `session`, send session.redirect_url to the user's browser ...
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod config;
pub mod discovery;
pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod retry;
pub mod token;

pub use archive::{ArchiveClient, ArchivedDocument, DocumentMetadata, DownloadStream};
pub use config::{ArchiveConfig, Credentials, GatewayConfig, TokenGrant};
pub use discovery::{fetch_oidc_configuration, OidcConfiguration};
pub use error::{AuthReason, Result, SignBoxError};
pub use gateway::GatewayClient;
pub use orchestrator::{SessionStatus, SigningSession, SigningSessionOrchestrator};
pub use retry::RetryPolicy;
pub use token::{Token, TokenProvider, EXPIRY_SKEW_SECS};
