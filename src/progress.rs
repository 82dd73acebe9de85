//! Progress-callback trait for extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves through its stages. The CLI drives a spinner
//! from these; a server could forward them to a websocket instead.
//!
//! # Example
//!
//! ```rust
//! use pdf2records::{ExtractionConfig, ExtractionProgressCallback, Stage};
//! use std::sync::{Arc, Mutex};
//!
//! #[derive(Default)]
//! struct StageLog {
//!     seen: Mutex<Vec<Stage>>,
//! }
//!
//! impl ExtractionProgressCallback for StageLog {
//!     fn on_stage(&self, stage: Stage) {
//!         self.seen.lock().unwrap().push(stage);
//!     }
//! }
//!
//! let log = Arc::new(StageLog::default());
//! let config = ExtractionConfig::builder()
//!     .progress_callback(log as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::sync::Arc;

/// Pipeline stage, reported in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Reading the local file or downloading the URL.
    ResolvingInput,
    /// Sending the PDF to the Files API.
    Uploading,
    /// Waiting for the model's answer.
    Querying,
    /// Turning the reply text into records.
    Parsing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::ResolvingInput => "Reading PDF",
            Stage::Uploading => "Uploading document",
            Stage::Querying => "Extracting data",
            Stage::Parsing => "Parsing answer",
        };
        f.write_str(s)
    }
}

/// Called by the extraction pipeline as it runs.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must be `Send + Sync` because the
/// config holding them is shared across tasks.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called when the pipeline enters `stage`.
    fn on_stage(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called before sleeping ahead of retry `attempt` (1-indexed).
    ///
    /// # Arguments
    /// * `operation` — `"upload"` or `"messages"`
    /// * `attempt`   — the retry about to be made
    /// * `max`       — configured maximum retries
    /// * `error`     — the error that triggered the retry
    fn on_retry(&self, operation: &str, attempt: u32, max: u32, error: &str) {
        let _ = (operation, attempt, max, error);
    }

    /// Called once the reply has been parsed into `records` records.
    fn on_complete(&self, records: usize) {
        let _ = records;
    }

    /// Called when the extraction fails.
    fn on_error(&self, error: &str) {
        let _ = error;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        stages: Mutex<Vec<Stage>>,
        retries: AtomicUsize,
        completed: AtomicUsize,
        errors: AtomicUsize,
    }

    impl ExtractionProgressCallback for TrackingCallback {
        fn on_stage(&self, stage: Stage) {
            self.stages.lock().unwrap().push(stage);
        }

        fn on_retry(&self, _operation: &str, _attempt: u32, _max: u32, _error: &str) {
            self.retries.fetch_add(1, Ordering::SeqCst);
        }

        fn on_complete(&self, records: usize) {
            self.completed.store(records, Ordering::SeqCst);
        }

        fn on_error(&self, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage(Stage::Uploading);
        cb.on_retry("messages", 1, 3, "HTTP 529");
        cb.on_complete(4);
        cb.on_error("boom");
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_stage(Stage::ResolvingInput);
        tracker.on_stage(Stage::Querying);
        tracker.on_retry("messages", 1, 3, "overloaded");
        tracker.on_stage(Stage::Parsing);
        tracker.on_complete(12);

        assert_eq!(
            *tracker.stages.lock().unwrap(),
            vec![Stage::ResolvingInput, Stage::Querying, Stage::Parsing]
        );
        assert_eq!(tracker.retries.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.completed.load(Ordering::SeqCst), 12);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stage_display_is_human_readable() {
        assert_eq!(Stage::Querying.to_string(), "Extracting data");
    }
}
