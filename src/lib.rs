//! # pdf2records
//!
//! Ask a hosted LLM a question about a PDF and get the answer back as a
//! list of records.
//!
//! ## Why this crate?
//!
//! Purchase orders, invoices and packing lists carry the data you want in
//! tables whose layout changes from one sender to the next. Rather than
//! writing a template per layout, this crate hands the whole PDF to a
//! document-capable model together with a plain-language question and asks
//! for a JSON array of objects. The reply is cleaned up, the array is
//! located by a bracket-balance scan, and every key is lowercased so the
//! records can go straight into a table or a database.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF + question
//!  │
//!  ├─ 1. Input    read local file or download from URL, check %PDF magic
//!  ├─ 2. Deliver  upload via the Files API (or inline as base64)
//!  ├─ 3. Ask      Messages API call with timeout + bounded retry
//!  ├─ 4. Parse    strip fences, balance-scan the array, lowercase keys
//!  └─ 5. Present  table text, JSON file or SQLite rows
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2records::{extract, render_table, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Key read from ANTHROPIC_API_KEY
//!     let config = ExtractionConfig::from_env();
//!     let output = extract(
//!         "purchase_order.pdf",
//!         "List every line item with style number, colour and quantity",
//!         &config,
//!     )
//!     .await?;
//!     println!("{}", render_table(&output.records)?);
//!     eprintln!("tokens: {} in / {} out",
//!         output.stats.input_tokens,
//!         output.stats.output_tokens);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2records` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! pdf2records = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod store;
pub mod table;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use client::{AnthropicClient, DocumentModel, ModelReply, ModelRequest, UploadedFile};
pub use config::{DocumentMode, ExtractionConfig, ExtractionConfigBuilder};
pub use error::{ExtractError, ParseError};
pub use extract::{extract, extract_from_bytes, extract_sync, extract_to_file, write_records_json};
pub use output::{DocumentInfo, ExtractionOutput, ExtractionRecord, ExtractionResult, ExtractionStats};
pub use pipeline::encode::DocumentSource;
pub use pipeline::input::PdfDocument;
pub use pipeline::parse::{normalize_keys, parse_records};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
pub use table::{render_table, TableLayout};
