//! Pipeline stages for question-driven PDF extraction.
//!
//! Each submodule implements exactly one step and is tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ encode ──▶ llm ──▶ parse
//! (path/URL) (file_id | base64) (Messages API) (JSON array → records)
//! ```
//!
//! 1. [`input`]  — read the local file or download the URL, reject non-PDFs
//! 2. [`encode`] — describe how the document is referenced in the request
//! 3. [`llm`]    — upload and ask with timeout and retry/backoff; the only
//!    stage with network I/O
//! 4. [`parse`]  — strip noise from the reply, balance-scan the JSON array
//!    and lowercase every key

pub mod encode;
pub mod input;
pub mod llm;
pub mod parse;
