//! Input resolution: turn a user-supplied path, URL or byte buffer into a
//! validated in-memory PDF.
//!
//! The whole document is sent to the model in one request, so there is no
//! point streaming it: every input ends up as a [`PdfDocument`] holding the
//! bytes and a filename for the upload. The `%PDF` magic is checked up front
//! so a mistyped path fails locally instead of after a paid API round-trip.

use crate::error::ExtractError;
use std::path::Path;
use tracing::{debug, info};

/// MIME type sent with every upload.
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// A PDF held in memory, ready to be uploaded or inlined.
#[derive(Clone)]
pub struct PdfDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("filename", &self.filename)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

impl PdfDocument {
    /// Wrap caller-supplied bytes, validating the PDF magic.
    pub fn from_bytes(filename: impl Into<String>, bytes: Vec<u8>) -> Result<Self, ExtractError> {
        let filename = filename.into();
        check_magic(&filename, &bytes)?;
        Ok(Self { filename, bytes })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to an in-memory PDF.
///
/// URLs are downloaded with `timeout_secs`; anything else is read as a local
/// path.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<PdfDocument, ExtractError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

/// Read a local file, mapping I/O failures to input errors.
async fn read_local(path: &Path) -> Result<PdfDocument, ExtractError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => ExtractError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => ExtractError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string());

    let doc = PdfDocument::from_bytes(filename, bytes)?;
    debug!("Resolved local PDF: {} ({} bytes)", path.display(), doc.len());
    Ok(doc)
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<PdfDocument, ExtractError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ExtractError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ExtractError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let doc = PdfDocument::from_bytes(filename_from_url(url), bytes.to_vec())?;
    info!("Downloaded {} bytes as '{}'", doc.len(), doc.filename);
    Ok(doc)
}

/// Last path segment of the URL when it looks like a filename.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

fn check_magic(name: &str, bytes: &[u8]) -> Result<(), ExtractError> {
    if bytes.starts_with(b"%PDF") {
        return Ok(());
    }
    Err(ExtractError::NotAPdf {
        name: name.to_string(),
        magic: bytes.iter().take(4).copied().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_url_uses_last_segment() {
        assert_eq!(filename_from_url("https://x.org/files/po-42.pdf"), "po-42.pdf");
        assert_eq!(filename_from_url("https://x.org/download"), "downloaded.pdf");
        assert_eq!(filename_from_url("https://x.org/"), "downloaded.pdf");
    }

    #[test]
    fn from_bytes_rejects_non_pdf() {
        let err = PdfDocument::from_bytes("notes.txt", b"hello".to_vec()).unwrap_err();
        match err {
            ExtractError::NotAPdf { name, magic } => {
                assert_eq!(name, "notes.txt");
                assert_eq!(magic, b"hell".to_vec());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn from_bytes_rejects_empty() {
        assert!(matches!(
            PdfDocument::from_bytes("empty.pdf", Vec::new()),
            Err(ExtractError::NotAPdf { .. })
        ));
    }

    #[tokio::test]
    async fn resolve_missing_file() {
        let err = resolve_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, ExtractError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn resolve_local_pdf() {
        let mut tmp = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        tmp.write_all(b"%PDF-1.7\n%fake\n").unwrap();
        let path = tmp.path().to_string_lossy().to_string();

        let doc = resolve_input(&path, 5).await.unwrap();
        assert!(doc.filename.ends_with(".pdf"));
        assert_eq!(doc.len(), 15);
    }

    #[test]
    fn debug_hides_bytes() {
        let doc = PdfDocument::from_bytes("a.pdf", b"%PDF-1.4".to_vec()).unwrap();
        let dbg = format!("{doc:?}");
        assert!(dbg.contains("<8 bytes>"), "got: {dbg}");
    }
}
