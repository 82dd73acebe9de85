//! Extraction entry points.
//!
//! One call is one request: resolve the PDF, deliver it to the model, ask
//! the question, parse the answer. Nothing is cached between calls and no
//! partial result is returned on failure.

use crate::client::{AnthropicClient, DocumentModel};
use crate::config::{ExtractionConfig, API_KEY_ENV};
use crate::error::ExtractError;
use crate::output::{DocumentInfo, ExtractionOutput, ExtractionStats};
use crate::pipeline::{input, llm, parse};
use crate::progress::Stage;
use crate::prompts::build_prompt;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Longest prefix of the raw reply quoted in a parse error.
const RAW_EXCERPT_CHARS: usize = 200;

/// Extract records from a PDF file or URL.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `input`    — Local file path or HTTP/HTTPS URL to a PDF
/// * `question` — What to extract, in plain language
/// * `config`   — Extraction configuration
///
/// # Errors
/// The input and then the question are validated before any API call: an
/// input error for a missing, unreadable or non-PDF file, then
/// [`ExtractError::MissingQuestion`] for a blank question. After that, API failures
/// (once retries are spent) and unparseable replies are returned as-is.
///
/// # Example
/// ```rust,no_run
/// use pdf2records::{extract, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExtractionConfig::from_env();
/// let output = extract("purchase_order.pdf", "List every line item with style, colour and quantity", &config).await?;
/// for record in output.records.iter() {
///     println!("{:?}", record.get("style"));
/// }
/// # Ok(())
/// # }
/// ```
pub async fn extract(
    input_str: impl AsRef<str>,
    question: &str,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let total_start = Instant::now();
    let input_str = input_str.as_ref();
    info!("Starting extraction: {}", input_str);

    let run = async {
        stage(config, Stage::ResolvingInput);
        let doc = input::resolve_input(input_str, config.download_timeout_secs).await?;
        validate_question(question)?;

        run_pipeline(doc, question, config, total_start).await
    };
    report(config, run.await)
}

/// Extract records from PDF bytes already in memory.
///
/// `filename` is sent with the upload; the bytes must start with `%PDF`.
pub async fn extract_from_bytes(
    filename: &str,
    bytes: Vec<u8>,
    question: &str,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let total_start = Instant::now();

    let run = async {
        stage(config, Stage::ResolvingInput);
        let doc = input::PdfDocument::from_bytes(filename, bytes)?;
        validate_question(question)?;

        run_pipeline(doc, question, config, total_start).await
    };
    report(config, run.await)
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    input_str: impl AsRef<str>,
    question: &str,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(input_str, question, config))
}

/// Extract records and write them to `output_path` as a pretty JSON array.
///
/// The file is written to a temporary sibling and renamed into place, so a
/// failed run never leaves a half-written file behind.
pub async fn extract_to_file(
    input_str: impl AsRef<str>,
    question: &str,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let output = extract(input_str, question, config).await?;
    write_records_json(&output, output_path.as_ref())?;
    Ok(output)
}

/// Atomically write `output.records` as pretty JSON.
pub fn write_records_json(output: &ExtractionOutput, path: &Path) -> Result<(), ExtractError> {
    let write_err = |source: std::io::Error| ExtractError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(write_err)?;

    let json = serde_json::to_vec_pretty(&output.records)
        .map_err(|e| ExtractError::Internal(format!("serialise records: {e}")))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
    tmp.write_all(&json).map_err(write_err)?;
    tmp.write_all(b"\n").map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    info!("Wrote {} records to {}", output.records.len(), path.display());
    Ok(())
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn run_pipeline(
    doc: input::PdfDocument,
    question: &str,
    config: &ExtractionConfig,
    total_start: Instant,
) -> Result<ExtractionOutput, ExtractError> {
    let provider = resolve_provider(config)?;
    debug!("Using provider '{}' with model {}", provider.name(), config.model);

    // ── Step 1: Deliver document ─────────────────────────────────────────
    if matches!(config.document_mode, crate::config::DocumentMode::FilesApi) {
        stage(config, Stage::Uploading);
    }
    let delivery = llm::deliver_document(&provider, &doc, config).await?;

    // ── Step 2: Ask ──────────────────────────────────────────────────────
    stage(config, Stage::Querying);
    let prompt = build_prompt(question, config.prompt_template.as_deref());
    let answer = llm::ask(&provider, delivery.source, prompt, config).await?;

    // ── Step 3: Parse ────────────────────────────────────────────────────
    stage(config, Stage::Parsing);
    let raw_text = answer.reply.text;
    let records = parse::parse_records(&raw_text).map_err(|source| ExtractError::Parse {
        source,
        raw_excerpt: raw_text.chars().take(RAW_EXCERPT_CHARS).collect(),
    })?;
    if config.require_records {
        records.require_rows()?;
    }

    let stats = ExtractionStats {
        input_tokens: answer.reply.input_tokens,
        output_tokens: answer.reply.output_tokens,
        attempts: answer.attempts,
        upload_duration_ms: delivery.duration_ms,
        llm_duration_ms: answer.duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        stop_reason: answer.reply.stop_reason,
    };

    info!(
        "Extraction complete: {} records, {} columns, {}ms total",
        records.len(),
        records.columns().len(),
        stats.total_duration_ms
    );

    Ok(ExtractionOutput {
        document: DocumentInfo {
            filename: doc.filename,
            size_bytes: doc.bytes.len(),
            file_id: delivery.file_id,
        },
        records,
        question: question.trim().to_string(),
        raw_text,
        stats,
    })
}

fn validate_question(question: &str) -> Result<(), ExtractError> {
    if question.trim().is_empty() {
        return Err(ExtractError::MissingQuestion);
    }
    Ok(())
}

/// Pick the model client: an injected provider first, else an
/// [`AnthropicClient`] built from the configured key.
fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn DocumentModel>, ExtractError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let key = config
        .api_key
        .as_deref()
        .ok_or_else(|| ExtractError::ProviderNotConfigured {
            provider: "anthropic".to_string(),
            hint: format!("Set {API_KEY_ENV} or pass --api-key."),
        })?;

    Ok(Arc::new(AnthropicClient::new(key, config.base_url.as_str())?))
}

fn stage(config: &ExtractionConfig, stage: Stage) {
    debug!("Stage: {}", stage);
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage(stage);
    }
}

fn report(
    config: &ExtractionConfig,
    result: Result<ExtractionOutput, ExtractError>,
) -> Result<ExtractionOutput, ExtractError> {
    if let Some(ref cb) = config.progress_callback {
        match &result {
            Ok(output) => cb.on_complete(output.records.len()),
            Err(e) => cb.on_error(&e.to_string()),
        }
    }
    result
}
