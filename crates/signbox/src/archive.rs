use std::collections::HashMap;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::AUTHORIZATION;
use reqwest::multipart;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ArchiveConfig;
use crate::error::{Result, SignBoxError};
use crate::retry::RetryPolicy;
use crate::token::Token;

/// Descriptive metadata attached to an uploaded document.
///
/// Serialized to JSON and URL-encoded into the `documentData` query parameter
/// of the create call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub filename: String,
    #[serde(rename = "objectName")]
    pub object_name: String,
    #[serde(rename = "documentType")]
    pub document_type: String,
    #[serde(rename = "contentType")]
    pub content_type: String,
    #[serde(rename = "customFields", default, skip_serializing_if = "HashMap::is_empty")]
    pub custom_fields: HashMap<String, String>,
}

impl DocumentMetadata {
    pub fn new(
        filename: impl Into<String>,
        document_type: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        let filename = filename.into();
        Self {
            object_name: filename.clone(),
            filename,
            document_type: document_type.into(),
            content_type: content_type.into(),
            custom_fields: HashMap::new(),
        }
    }

    pub fn with_custom_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_fields.insert(key.into(), value.into());
        self
    }
}

/// Archive entry created by an upload. `id` is the durable correlation key
/// every subsequent call (redirect, download) addresses the document by.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedDocument {
    pub id: String,
    #[serde(rename = "externalid", default)]
    pub external_id: Option<String>,
    #[serde(rename = "archiveName", default)]
    pub archive_name: Option<String>,
}

/// Lazy, single-pass handle over a document download.
///
/// Wraps the live HTTP response body, so it is finite but not restartable;
/// the caller either drains it ([`into_bytes`](DownloadStream::into_bytes)),
/// consumes it chunk-wise, or drops it to abort the connection.
#[derive(Debug)]
pub struct DownloadStream {
    response: reqwest::Response,
}

impl DownloadStream {
    fn new(response: reqwest::Response) -> Self {
        Self { response }
    }

    pub fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    /// Next chunk of the body, or `None` once the stream is exhausted.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>> {
        self.response.chunk().await.map_err(SignBoxError::transport)
    }

    /// The body as a `futures` stream of chunks.
    pub fn bytes_stream(self) -> impl Stream<Item = Result<Bytes>> {
        self.response
            .bytes_stream()
            .map(|chunk| chunk.map_err(SignBoxError::transport))
    }

    /// Drain the whole body into memory.
    pub async fn into_bytes(self) -> Result<Vec<u8>> {
        let bytes = self
            .response
            .bytes()
            .await
            .map_err(SignBoxError::transport)?;
        Ok(bytes.to_vec())
    }
}

/// Client for the SignBox archive service: moves document bytes and metadata
/// to and from the archive.
pub struct ArchiveClient {
    config: ArchiveConfig,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl ArchiveClient {
    pub fn new(config: ArchiveConfig) -> Self {
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

    /// Upload a document with its metadata, returning the archive entry.
    ///
    /// Transient failures where the archive never acted on the request are
    /// retried with backoff: a 5xx response and a connect-phase failure both
    /// leave no entry behind. A transport failure after the request was
    /// dispatched is classified as [`SignBoxError::AmbiguousOutcome`] and
    /// never retried, since the bytes may already have landed; the caller
    /// should query-by-reference before re-uploading.
    pub async fn upload(
        &self,
        file: &[u8],
        metadata: &DocumentMetadata,
        token: &Token,
    ) -> Result<ArchivedDocument> {
        let document_data =
            serde_json::to_string(metadata).map_err(|e| SignBoxError::Validation {
                status: 400,
                message: format!("metadata serialization failed: {}", e),
            })?;

        let url = format!(
            "{}/api/document/create?documentData={}",
            self.config.base_url,
            urlencoding::encode(&document_data)
        );

        debug!(
            filename = %metadata.filename,
            document_type = %metadata.document_type,
            size = file.len(),
            "uploading document"
        );

        self.retry
            .run(|| self.try_upload(&url, file, metadata, token))
            .await
    }

    async fn try_upload(
        &self,
        url: &str,
        file: &[u8],
        metadata: &DocumentMetadata,
        token: &Token,
    ) -> Result<ArchivedDocument> {
        // The multipart form is consumed by the request, so it is rebuilt
        // per attempt.
        let part = multipart::Part::bytes(file.to_vec())
            .file_name(metadata.filename.clone())
            .mime_str(&metadata.content_type)
            .map_err(|e| SignBoxError::Validation {
                status: 400,
                message: format!("invalid content type {:?}: {}", metadata.content_type, e),
            })?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, token.authorization_header())
            .multipart(form)
            .send()
            .await
            .map_err(upload_transport_error)?;

        let status = response.status();
        if status.is_success() {
            // A body failure here is still ambiguous: the entry exists but
            // its id never arrived.
            let document: ArchivedDocument = response.json().await.map_err(|e| {
                if e.is_decode() {
                    SignBoxError::Validation {
                        status: status.as_u16(),
                        message: format!("invalid create response: {}", e),
                    }
                } else {
                    upload_transport_error(e)
                }
            })?;
            debug!(document_id = %document.id, "document archived");
            Ok(document)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(SignBoxError::from_response(status, body, &metadata.object_name))
        }
    }

    /// Download a document (or a specific version of it) as a byte stream.
    /// Transient failures are retried with backoff before the stream starts.
    pub async fn download(
        &self,
        id: &str,
        version: Option<&str>,
        token: &Token,
    ) -> Result<DownloadStream> {
        let mut url = format!(
            "{}/api/document/{}/download",
            self.config.base_url,
            urlencoding::encode(id)
        );
        if let Some(version) = version {
            url.push_str("?version=");
            url.push_str(&urlencoding::encode(version));
        }

        debug!(document_id = %id, version = ?version, "downloading document");

        let response = self
            .retry
            .run(|| async {
                let response = self
                    .client
                    .get(&url)
                    .header(AUTHORIZATION, token.authorization_header())
                    .send()
                    .await
                    .map_err(SignBoxError::transport)?;

                let status = response.status();
                if status.is_success() {
                    Ok(response)
                } else {
                    let body = response.text().await.unwrap_or_default();
                    Err(SignBoxError::from_response(status, body, id))
                }
            })
            .await?;

        Ok(DownloadStream::new(response))
    }
}

/// A connect failure means the request never left: clean, retryable. Anything
/// that failed after dispatch (timeout, broken body) leaves the archive state
/// unknown and must surface as an ambiguous outcome.
fn upload_transport_error(err: reqwest::Error) -> SignBoxError {
    if err.is_connect() {
        SignBoxError::Network(err.to_string())
    } else {
        SignBoxError::AmbiguousOutcome(format!("upload outcome unknown: {}", err))
    }
}
