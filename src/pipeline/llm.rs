//! Model interaction: deliver the document and ask the question, with a
//! per-call timeout and bounded retries.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 5xx / 529 (overloaded) errors and transport failures are
//! transient. Each call gets `max_retries` further attempts with exponential
//! backoff (`retry_backoff_ms * 2^(attempt-1)`, capped at `max_backoff_ms`):
//! with the defaults the waits are 500 ms → 1 s → 2 s. A server-sent
//! `retry-after` replaces the computed delay, still subject to the cap.
//! Auth errors and other 4xx responses fail immediately.
//!
//! Every attempt runs under `tokio::time::timeout(api_timeout_secs)`, so a
//! stalled connection becomes a retryable [`ExtractError::ApiTimeout`]
//! rather than a hang.

use crate::client::{DocumentModel, ModelReply, ModelRequest};
use crate::config::{DocumentMode, ExtractionConfig};
use crate::error::ExtractError;
use crate::pipeline::encode::{encode_inline, DocumentSource};
use crate::pipeline::input::PdfDocument;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// The delivered document and how long delivery took.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub source: DocumentSource,
    pub file_id: Option<String>,
    pub duration_ms: u64,
}

/// The model's reply plus accounting.
#[derive(Debug, Clone)]
pub struct Answer {
    pub reply: ModelReply,
    pub attempts: u32,
    pub duration_ms: u64,
}

/// Make `doc` referenceable in a message according to `config.document_mode`.
pub async fn deliver_document(
    provider: &Arc<dyn DocumentModel>,
    doc: &PdfDocument,
    config: &ExtractionConfig,
) -> Result<Delivery, ExtractError> {
    let start = Instant::now();
    match config.document_mode {
        DocumentMode::Inline => Ok(Delivery {
            source: encode_inline(doc),
            file_id: None,
            duration_ms: start.elapsed().as_millis() as u64,
        }),
        DocumentMode::FilesApi => {
            let (file, _) = call_with_retry("upload", config, || provider.upload(doc)).await?;
            info!("Uploaded '{}' → {}", doc.filename, file.id);
            Ok(Delivery {
                source: DocumentSource::File {
                    file_id: file.id.clone(),
                },
                file_id: Some(file.id),
                duration_ms: start.elapsed().as_millis() as u64,
            })
        }
    }
}

/// Ask `prompt` about the delivered document.
pub async fn ask(
    provider: &Arc<dyn DocumentModel>,
    source: DocumentSource,
    prompt: String,
    config: &ExtractionConfig,
) -> Result<Answer, ExtractError> {
    let start = Instant::now();
    let request = ModelRequest {
        model: config.model.clone(),
        prompt,
        source,
        max_tokens: config.max_tokens,
        temperature: config.temperature,
    };

    let (reply, attempts) = call_with_retry("messages", config, || provider.ask(&request)).await?;
    let duration = start.elapsed();
    debug!(
        "{} input tokens, {} output tokens, stop_reason={:?}, {:?}",
        reply.input_tokens, reply.output_tokens, reply.stop_reason, duration
    );

    if reply.stop_reason.as_deref() == Some("max_tokens") {
        warn!(
            "Reply hit max_tokens ({}); the JSON array may be truncated",
            config.max_tokens
        );
    }
    if reply.text.trim().is_empty() {
        return Err(ExtractError::EmptyResponse);
    }

    Ok(Answer {
        reply,
        attempts,
        duration_ms: duration.as_millis() as u64,
    })
}

/// Run `call` under the configured timeout, retrying transient failures.
///
/// Returns the value and the number of attempts made (≥ 1). When retries
/// run out the last error is wrapped in
/// [`ExtractError::RetriesExhausted`]; a permanent error on the first
/// attempt is returned as-is.
pub async fn call_with_retry<T, F, Fut>(
    operation: &str,
    config: &ExtractionConfig,
    mut call: F,
) -> Result<(T, u32), ExtractError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExtractError>>,
{
    let limit = Duration::from_secs(config.api_timeout_secs);
    let mut attempt: u32 = 0;

    loop {
        let outcome = match timeout(limit, call()).await {
            Ok(result) => result,
            Err(_) => Err(ExtractError::ApiTimeout {
                operation: operation.to_string(),
                secs: config.api_timeout_secs,
            }),
        };

        let err = match outcome {
            Ok(value) => {
                if attempt > 0 {
                    info!("{}: succeeded after {} retries", operation, attempt);
                }
                return Ok((value, attempt + 1));
            }
            Err(e) => e,
        };

        if !err.is_retryable() {
            return Err(err);
        }
        if attempt >= config.max_retries {
            if attempt == 0 {
                return Err(err);
            }
            warn!("{}: giving up after {} attempts — {}", operation, attempt + 1, err);
            return Err(ExtractError::RetriesExhausted {
                operation: operation.to_string(),
                attempts: attempt + 1,
                last_error: Box::new(err),
            });
        }

        attempt += 1;
        let delay = backoff_delay(config, attempt, err.retry_after_secs());
        warn!(
            "{}: retry {}/{} after {}ms — {}",
            operation,
            attempt,
            config.max_retries,
            delay.as_millis(),
            err
        );
        if let Some(ref cb) = config.progress_callback {
            cb.on_retry(operation, attempt, config.max_retries, &err.to_string());
        }
        sleep(delay).await;
    }
}

/// Delay before retry `attempt` (1-indexed).
pub fn backoff_delay(config: &ExtractionConfig, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
    let ms = match retry_after_secs {
        Some(secs) => secs.saturating_mul(1000),
        None => {
            let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
            config.retry_backoff_ms.saturating_mul(factor)
        }
    };
    Duration::from_millis(ms.min(config.max_backoff_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_retries: u32) -> ExtractionConfig {
        ExtractionConfig::builder()
            .max_retries(max_retries)
            .retry_backoff_ms(1)
            .max_backoff_ms(5)
            .api_timeout_secs(1)
            .build()
            .unwrap()
    }

    fn overloaded() -> ExtractError {
        ExtractError::ApiError {
            status: Some(529),
            message: "overloaded".into(),
            retryable: true,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = ExtractionConfig::default();
        assert_eq!(backoff_delay(&config, 1, None), Duration::from_millis(500));
        assert_eq!(backoff_delay(&config, 2, None), Duration::from_millis(1000));
        assert_eq!(backoff_delay(&config, 3, None), Duration::from_millis(2000));
        assert_eq!(backoff_delay(&config, 10, None), Duration::from_millis(8000));
    }

    #[test]
    fn retry_after_overrides_backoff_within_cap() {
        let config = ExtractionConfig::default();
        assert_eq!(backoff_delay(&config, 1, Some(3)), Duration::from_secs(3));
        assert_eq!(backoff_delay(&config, 1, Some(600)), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let config = fast_config(3);
        let calls = AtomicU32::new(0);
        let (value, attempts) = call_with_retry("messages", &config, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(overloaded())
                } else {
                    Ok("done")
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(value, "done");
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let config = fast_config(3);
        let calls = AtomicU32::new(0);
        let err = call_with_retry("messages", &config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<(), _>(ExtractError::AuthError {
                    provider: "anthropic".into(),
                    detail: "invalid x-api-key".into(),
                })
            }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ExtractError::AuthError { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_wrap_last_error() {
        let config = fast_config(2);
        let calls = AtomicU32::new(0);
        let err = call_with_retry("upload", &config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(overloaded()) }
        })
        .await
        .unwrap_err();
        match err {
            ExtractError::RetriesExhausted {
                operation,
                attempts,
                last_error,
            } => {
                assert_eq!(operation, "upload");
                assert_eq!(attempts, 3);
                assert!(matches!(*last_error, ExtractError::ApiError { .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_retries_returns_error_unwrapped() {
        let config = fast_config(0);
        let err = call_with_retry("messages", &config, || async { Err::<(), _>(overloaded()) })
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::ApiError { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_call_times_out() {
        let config = fast_config(0);
        let err = call_with_retry("messages", &config, || async {
            sleep(Duration::from_secs(3600)).await;
            Ok::<_, ExtractError>(())
        })
        .await
        .unwrap_err();
        assert!(
            matches!(err, ExtractError::ApiTimeout { ref operation, secs: 1 } if operation == "messages"),
            "got: {err:?}"
        );
    }
}
