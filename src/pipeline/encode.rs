//! Document encoding: how the PDF is referenced inside the message body.
//!
//! The Messages API accepts a `document` content block whose `source` is
//! either a Files API id or the whole PDF as base64. Uploading first keeps
//! the message body small and lets the API cache the parsed file; inlining
//! saves a round-trip and works on endpoints without the Files API beta.

use crate::pipeline::input::{PdfDocument, PDF_MEDIA_TYPE};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The `source` of a `document` content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentSource {
    /// A file previously uploaded to the Files API.
    File { file_id: String },
    /// The PDF embedded as base64.
    Base64 { media_type: String, data: String },
}

impl DocumentSource {
    /// Whether the request needs the Files API beta header.
    pub fn needs_files_beta(&self) -> bool {
        matches!(self, DocumentSource::File { .. })
    }
}

/// Encode a PDF as an inline base64 document source.
pub fn encode_inline(doc: &PdfDocument) -> DocumentSource {
    let data = STANDARD.encode(&doc.bytes);
    debug!("Encoded '{}' → {} bytes base64", doc.filename, data.len());
    DocumentSource::Base64 {
        media_type: PDF_MEDIA_TYPE.to_string(),
        data,
    }
}
