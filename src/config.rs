//! Configuration types for PDF record extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. Credentials and endpoint live here
//! too, so nothing in the pipeline reads process-wide state: two configs with
//! different keys can run side by side in one process.

use crate::client::DocumentModel;
use crate::error::ExtractError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default Anthropic API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Default model used when none is configured.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Environment variable overriding the API endpoint.
pub const BASE_URL_ENV: &str = "ANTHROPIC_BASE_URL";

/// Configuration for one document extraction.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf2records::{DocumentMode, ExtractionConfig};
///
/// let config = ExtractionConfig::builder()
///     .api_key("sk-ant-test")
///     .model("claude-sonnet-4-20250514")
///     .document_mode(DocumentMode::Inline)
///     .max_retries(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_retries, 2);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Anthropic API key. If None, [`crate::extract`] fails with
    /// [`ExtractError::ProviderNotConfigured`] unless `provider` is set.
    pub api_key: Option<String>,

    /// API endpoint, without a trailing `/v1`. Default: [`DEFAULT_BASE_URL`].
    pub base_url: String,

    /// Model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Maximum tokens the model may generate. Default: 20000.
    ///
    /// Long tables (hundreds of purchase-order lines) produce large JSON
    /// arrays; a low cap truncates the array mid-object and the reply no
    /// longer parses.
    pub max_tokens: u32,

    /// Sampling temperature. If None, the API default is used.
    pub temperature: Option<f32>,

    /// Maximum retry attempts on a transient API failure. Default: 3.
    ///
    /// Permanent errors (bad API key, 400) are never retried.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds. Default: 500.
    ///
    /// Doubles after each attempt: 500 ms → 1 s → 2 s, capped at
    /// `max_backoff_ms`.
    pub retry_backoff_ms: u64,

    /// Upper bound on a single retry delay in milliseconds. Default: 8000.
    pub max_backoff_ms: u64,

    /// Per-API-call timeout in seconds. Default: 120.
    ///
    /// Whole-document extraction is slower than a chat turn; two minutes
    /// covers a 50-page document comfortably.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// How the PDF reaches the model. Default: [`DocumentMode::FilesApi`].
    pub document_mode: DocumentMode,

    /// Custom prompt template containing `{question}`. If None, uses
    /// [`crate::prompts::DEFAULT_PROMPT_TEMPLATE`].
    pub prompt_template: Option<String>,

    /// Fail with [`ExtractError::NoRecords`] when the model returns `[]`.
    /// Default: false.
    pub require_records: bool,

    /// Pre-constructed model client. Takes precedence over `api_key`.
    pub provider: Option<Arc<dyn DocumentModel>>,

    /// Stage/retry event sink.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 20_000,
            temperature: None,
            max_retries: 3,
            retry_backoff_ms: 500,
            max_backoff_ms: 8_000,
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            document_mode: DocumentMode::default(),
            prompt_template: None,
            require_records: false,
            provider: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("max_backoff_ms", &self.max_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("document_mode", &self.document_mode)
            .field("prompt_template", &self.prompt_template)
            .field("require_records", &self.require_records)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn DocumentModel>"))
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Default configuration with credentials taken from the environment.
    ///
    /// Reads [`API_KEY_ENV`] and, when set, [`BASE_URL_ENV`].
    pub fn from_env() -> Self {
        Self::builder().api_key_from_env().config
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    /// Fill `api_key` and `base_url` from the environment when present.
    pub fn api_key_from_env(mut self) -> Self {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.config.api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.config.base_url = url;
            }
        }
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = n.max(1);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 1.0));
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn max_backoff_ms(mut self, ms: u64) -> Self {
        self.config.max_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn document_mode(mut self, mode: DocumentMode) -> Self {
        self.config.document_mode = mode;
        self
    }

    pub fn prompt_template(mut self, template: impl Into<String>) -> Self {
        self.config.prompt_template = Some(template.into());
        self
    }

    pub fn require_records(mut self, v: bool) -> Self {
        self.config.require_records = v;
        self
    }

    pub fn provider(mut self, provider: Arc<dyn DocumentModel>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(ExtractError::InvalidConfig("Model must not be empty".into()));
        }
        if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
            return Err(ExtractError::InvalidConfig(format!(
                "Base URL must start with http:// or https://, got '{}'",
                c.base_url
            )));
        }
        if c.api_timeout_secs == 0 {
            return Err(ExtractError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_backoff_ms < c.retry_backoff_ms {
            return Err(ExtractError::InvalidConfig(format!(
                "max_backoff_ms ({}) must be ≥ retry_backoff_ms ({})",
                c.max_backoff_ms, c.retry_backoff_ms
            )));
        }
        if let Some(ref t) = c.prompt_template {
            if !t.contains(crate::prompts::QUESTION_PLACEHOLDER) {
                return Err(ExtractError::InvalidConfig(format!(
                    "Prompt template must contain {}",
                    crate::prompts::QUESTION_PLACEHOLDER
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the PDF is handed to the model.
///
/// | Mode | Calls | Use case |
/// |------|-------|----------|
/// | `FilesApi` | upload + message | Large documents; the file can be reused |
/// | `Inline`   | message only | Small documents, endpoints without the Files API beta |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DocumentMode {
    /// Upload to the Files API, then reference the returned file id. (default)
    #[default]
    FilesApi,
    /// Embed the PDF as a base64 document block in the message body.
    Inline,
}
