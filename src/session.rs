//! Remote extraction session: upload page images, request one extraction,
//! delete the uploads.
//!
//! [`ExtractionBackend`] is the seam between the pipeline and the network.
//! The production implementation, [`GeminiSession`], talks to the Gemini
//! File API over `reqwest`; tests substitute a scripted mock. One session is
//! created per run from the stored credential and must be recreated if the
//! credential changes.
//!
//! ## Error classification
//!
//! Every response is classified once, here, into the tagged
//! [`RemoteError`] contract: HTTP 429 (or a quota marker in the body, as a
//! fallback for proxies that rewrite status codes) becomes
//! [`RemoteError::RateLimited`]; everything else — auth failures, malformed
//! requests, transport errors — is [`RemoteError::Fatal`]. The retry
//! governor acts on the tag alone.

use crate::config::BatchConfig;
use crate::error::{BatchError, RemoteError};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// A remote-side handle to one uploaded page image.
///
/// Valid for the duration of a single extraction request; the pipeline
/// deletes every artifact before the document's task ends, success or
/// failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedArtifact {
    /// Server-side resource name, e.g. "files/abc123". Used for deletion.
    pub name: String,
    /// Absolute URI referenced by the extraction request.
    pub uri: String,
    /// MIME type of the uploaded image.
    pub mime_type: String,
}

/// The three remote operations the pipeline needs, behind one object-safe
/// trait so tests can run the full batch without a network.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Upload one page image, returning its remote handle.
    async fn upload(&self, path: &Path) -> Result<UploadedArtifact, RemoteError>;

    /// Issue the extraction request for one document: the instructional
    /// prompt plus references to every uploaded page. Returns the raw
    /// response text.
    async fn generate(
        &self,
        prompt: &str,
        artifacts: &[UploadedArtifact],
    ) -> Result<String, RemoteError>;

    /// Delete one uploaded artifact from remote storage.
    async fn delete(&self, artifact: &UploadedArtifact) -> Result<(), RemoteError>;
}

/// Authenticated handle to the Gemini File API, configured once per run.
pub struct GeminiSession {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl GeminiSession {
    /// Build a session from the run's credential and config.
    pub fn new(api_key: &str, config: &BatchConfig) -> Result<Self, BatchError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BatchError::ClientInit {
                detail: e.to_string(),
            })?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl ExtractionBackend for GeminiSession {
    async fn upload(&self, path: &Path) -> Result<UploadedArtifact, RemoteError> {
        // A local read failure is not the service's fault; never retried.
        let bytes = tokio::fs::read(path).await.map_err(|e| RemoteError::Fatal {
            reason: format!("could not read '{}': {e}", path.display()),
        })?;

        let url = format!("{}/upload/v1beta/files?key={}", self.api_base, self.api_key);
        let response = self
            .http
            .post(&url)
            .header("X-Goog-Upload-Protocol", "raw")
            .header("Content-Type", "image/jpeg")
            .body(bytes)
            .send()
            .await
            .map_err(transport_error)?;

        let body: UploadResponse = read_json(response).await?;
        debug!(
            "uploaded {} as {}",
            path.display(),
            body.file.name
        );

        Ok(UploadedArtifact {
            name: body.file.name,
            uri: body.file.uri,
            mime_type: "image/jpeg".to_string(),
        })
    }

    async fn generate(
        &self,
        prompt: &str,
        artifacts: &[UploadedArtifact],
    ) -> Result<String, RemoteError> {
        let mut parts = Vec::with_capacity(artifacts.len() + 1);
        parts.push(Part::text(prompt));
        parts.extend(artifacts.iter().map(Part::file));

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.api_base, self.model, self.api_key
        );
        let request = GenerateRequest {
            contents: vec![Content { parts }],
        };

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let body: GenerateResponse = read_json(response).await?;
        let text = body.text();
        if text.is_empty() {
            return Err(RemoteError::Fatal {
                reason: "response contained no text".to_string(),
            });
        }
        Ok(text)
    }

    async fn delete(&self, artifact: &UploadedArtifact) -> Result<(), RemoteError> {
        let url = format!("{}/v1beta/{}?key={}", self.api_base, artifact.name, self.api_key);
        let response = self
            .http
            .delete(&url)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            debug!("deleted {}", artifact.name);
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(classify(status, &body))
        }
    }
}

/// Decide once whether a failed response is worth retrying.
///
/// 429 is the canonical quota signal. The body markers are a fallback for
/// gateways that collapse everything into 400/500 but preserve the upstream
/// error string.
fn classify(status: StatusCode, body: &str) -> RemoteError {
    let rate_limited = status == StatusCode::TOO_MANY_REQUESTS
        || body.contains("RATE_LIMIT_EXCEEDED")
        || body.contains("RESOURCE_EXHAUSTED");

    if rate_limited {
        RemoteError::RateLimited {
            reason: format!("HTTP {status}"),
        }
    } else {
        RemoteError::Fatal {
            reason: format!("HTTP {status}: {}", truncate(body, 200)),
        }
    }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    RemoteError::Fatal {
        reason: e.to_string(),
    }
}

/// Check the status, then deserialise the body.
async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, RemoteError> {
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;

    if !status.is_success() {
        return Err(classify(status, &body));
    }

    serde_json::from_str(&body).map_err(|e| RemoteError::Fatal {
        reason: format!("malformed response: {e}"),
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

/// One request part: either prompt text or a reference to an uploaded file.
#[derive(Serialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "fileData", skip_serializing_if = "Option::is_none")]
    file_data: Option<FileData>,
}

impl Part {
    fn text(s: &str) -> Self {
        Self {
            text: Some(s.to_string()),
            file_data: None,
        }
    }

    fn file(artifact: &UploadedArtifact) -> Self {
        Self {
            text: None,
            file_data: Some(FileData {
                mime_type: artifact.mime_type.clone(),
                file_uri: artifact.uri.clone(),
            }),
        }
    }
}

#[derive(Serialize)]
struct FileData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    #[serde(rename = "fileUri")]
    file_uri: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    file: FileHandle,
}

#[derive(Deserialize)]
struct FileHandle {
    name: String,
    #[serde(default)]
    uri: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateResponse {
    /// Concatenate the text of every part of the first candidate.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Deserialize)]
struct TextPart {
    #[serde(default)]
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_429_is_rate_limited() {
        let e = classify(StatusCode::TOO_MANY_REQUESTS, "");
        assert!(e.is_rate_limited());
    }

    #[test]
    fn quota_marker_in_body_is_rate_limited() {
        let e = classify(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#,
        );
        assert!(e.is_rate_limited());

        let e = classify(StatusCode::INTERNAL_SERVER_ERROR, "RATE_LIMIT_EXCEEDED");
        assert!(e.is_rate_limited());
    }

    #[test]
    fn auth_failure_is_fatal() {
        let e = classify(StatusCode::FORBIDDEN, r#"{"error":"API key invalid"}"#);
        assert!(!e.is_rate_limited());
        assert!(e.to_string().contains("403"));
    }

    #[test]
    fn generate_request_serialises_camel_case_file_data() {
        let artifact = UploadedArtifact {
            name: "files/abc".into(),
            uri: "https://example.invalid/v1beta/files/abc".into(),
            mime_type: "image/jpeg".into(),
        };
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part::text("extract"), Part::file(&artifact)],
            }],
        };

        let json = serde_json::to_value(&request).unwrap();
        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "extract");
        assert_eq!(parts[1]["fileData"]["mimeType"], "image/jpeg");
        assert_eq!(
            parts[1]["fileData"]["fileUri"],
            "https://example.invalid/v1beta/files/abc"
        );
        assert!(parts[0].get("fileData").is_none());
    }

    #[test]
    fn generate_response_joins_candidate_parts() {
        let body = r#"{
            "candidates": [{
                "content": { "parts": [{ "text": "a,b\n" }, { "text": "1,2\n" }] }
            }]
        }"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.text(), "a,b\n1,2\n");
    }

    #[test]
    fn empty_candidates_yield_empty_text() {
        let parsed: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.text(), "");
    }

    #[test]
    fn session_builds_from_config() {
        let config = BatchConfig::builder().output_dir("/tmp/x").build().unwrap();
        let session = GeminiSession::new("test-key", &config).unwrap();
        assert_eq!(session.api_base, crate::config::DEFAULT_API_BASE);
        assert_eq!(session.model, "gemini-1.5-pro");
    }
}
