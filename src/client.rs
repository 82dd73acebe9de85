//! Model client: the seam between the pipeline and the hosted document API.
//!
//! [`DocumentModel`] is the only thing the pipeline knows about the remote
//! side. [`AnthropicClient`] implements it over `reqwest` against the
//! Anthropic Files and Messages APIs; tests and embedding applications can
//! inject their own implementation through
//! [`crate::config::ExtractionConfigBuilder::provider`].
//!
//! Timeouts and retries are not handled here. Each method makes exactly one
//! HTTP call and classifies the outcome; [`crate::pipeline::llm`] decides
//! whether to try again.

use crate::error::ExtractError;
use crate::pipeline::encode::DocumentSource;
use crate::pipeline::input::{PdfDocument, PDF_MEDIA_TYPE};
use futures::future::{BoxFuture, FutureExt};
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// `anthropic-version` header value.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Beta flag enabling the Files API and `file` document sources.
pub const FILES_API_BETA: &str = "files-api-2025-04-14";

const PROVIDER: &str = "anthropic";

/// A document uploaded to the Files API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

/// One question about one document.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub model: String,
    pub prompt: String,
    pub source: DocumentSource,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

/// The model's answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    /// All text content blocks, concatenated.
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub stop_reason: Option<String>,
}

/// A hosted model that can read a PDF and answer a question about it.
pub trait DocumentModel: Send + Sync {
    /// Provider name used in error messages.
    fn name(&self) -> &str;

    /// Upload `doc` so it can be referenced by id.
    fn upload<'a>(&'a self, doc: &'a PdfDocument) -> BoxFuture<'a, Result<UploadedFile, ExtractError>>;

    /// Ask the model `request.prompt` about `request.source`.
    fn ask<'a>(&'a self, request: &'a ModelRequest) -> BoxFuture<'a, Result<ModelReply, ExtractError>>;
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: [UserMessage<'a>; 1],
}

#[derive(Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: [InputBlock<'a>; 2],
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InputBlock<'a> {
    Text { text: &'a str },
    Document { source: &'a DocumentSource },
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<OutputBlock>,
    #[serde(default)]
    usage: Usage,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum OutputBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

// ── Client ───────────────────────────────────────────────────────────────

/// [`DocumentModel`] backed by the Anthropic HTTP API.
#[derive(Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl AnthropicClient {
    /// Create a client for `base_url` (e.g. `https://api.anthropic.com`).
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, ExtractError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ExtractError::ProviderNotConfigured {
                provider: PROVIDER.to_string(),
                hint: "The API key is empty.".to_string(),
            });
        }
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ExtractError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn headers(&self, files_beta: bool) -> Result<HeaderMap, ExtractError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|_| ExtractError::InvalidConfig("API key contains invalid characters".into()))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        if files_beta {
            headers.insert("anthropic-beta", HeaderValue::from_static(FILES_API_BETA));
        }
        Ok(headers)
    }

    async fn upload_impl(&self, doc: &PdfDocument) -> Result<UploadedFile, ExtractError> {
        let part = Part::bytes(doc.bytes.clone())
            .file_name(doc.filename.clone())
            .mime_str(PDF_MEDIA_TYPE)
            .map_err(|e| ExtractError::Internal(format!("multipart: {e}")))?;
        let form = Form::new().part("file", part);

        let response = self
            .http
            .post(self.url("/v1/files"))
            .headers(self.headers(true)?)
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        let body = read_success(response).await?;
        let file: UploadedFile = serde_json::from_str(&body).map_err(|e| ExtractError::ApiError {
            status: None,
            message: format!("unexpected upload response: {e}"),
            retryable: false,
        })?;
        debug!("Uploaded '{}' as {}", doc.filename, file.id);
        Ok(file)
    }

    async fn ask_impl(&self, request: &ModelRequest) -> Result<ModelReply, ExtractError> {
        let body = MessagesBody {
            model: &request.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages: [UserMessage {
                role: "user",
                content: [
                    InputBlock::Text {
                        text: &request.prompt,
                    },
                    InputBlock::Document {
                        source: &request.source,
                    },
                ],
            }],
        };

        let response = self
            .http
            .post(self.url("/v1/messages"))
            .headers(self.headers(request.source.needs_files_beta())?)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let body = read_success(response).await?;
        let parsed: MessagesResponse =
            serde_json::from_str(&body).map_err(|e| ExtractError::ApiError {
                status: None,
                message: format!("unexpected messages response: {e}"),
                retryable: false,
            })?;

        let text: String = parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                OutputBlock::Text { text } => Some(text),
                OutputBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");

        Ok(ModelReply {
            text,
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
            stop_reason: parsed.stop_reason,
        })
    }
}

impl DocumentModel for AnthropicClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn upload<'a>(&'a self, doc: &'a PdfDocument) -> BoxFuture<'a, Result<UploadedFile, ExtractError>> {
        self.upload_impl(doc).boxed()
    }

    fn ask<'a>(&'a self, request: &'a ModelRequest) -> BoxFuture<'a, Result<ModelReply, ExtractError>> {
        self.ask_impl(request).boxed()
    }
}

// ── Response classification ──────────────────────────────────────────────

/// Return the body of a 2xx response, or the classified error.
async fn read_success(response: reqwest::Response) -> Result<String, ExtractError> {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok());
    let body = response.text().await.map_err(transport_error)?;

    if (200..300).contains(&status) {
        Ok(body)
    } else {
        Err(classify_status(status, retry_after, &body))
    }
}

/// Map a non-2xx response to an [`ExtractError`].
///
/// | Status | Error | Retried |
/// |--------|-------|---------|
/// | 401, 403 | `AuthError` | no |
/// | 429 | `RateLimitExceeded` | yes |
/// | 408, 5xx (incl. 529 overloaded) | `ApiError` | yes |
/// | other | `ApiError` | no |
pub fn classify_status(status: u16, retry_after_secs: Option<u64>, body: &str) -> ExtractError {
    let message = error_message(body);
    match status {
        401 | 403 => ExtractError::AuthError {
            provider: PROVIDER.to_string(),
            detail: message,
        },
        429 => ExtractError::RateLimitExceeded {
            provider: PROVIDER.to_string(),
            retry_after_secs,
        },
        408 | 500..=599 => ExtractError::ApiError {
            status: Some(status),
            message,
            retryable: true,
        },
        _ => ExtractError::ApiError {
            status: Some(status),
            message,
            retryable: false,
        },
    }
}

/// Pull `error.type: error.message` out of an API error body, falling back to
/// the raw body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) if !env.error.kind.is_empty() => format!("{}: {}", env.error.kind, env.error.message),
        Ok(env) => env.error.message,
        Err(_) => body.trim().chars().take(500).collect(),
    }
}

fn transport_error(e: reqwest::Error) -> ExtractError {
    ExtractError::ApiError {
        status: e.status().map(|s| s.as_u16()),
        message: e.to_string(),
        retryable: true,
    }
}
