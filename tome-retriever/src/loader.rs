//! Upload decoding: turns named byte streams into raw text documents.
//!
//! Files are dispatched purely by extension (`.pdf`, `.txt`); anything else
//! is unsupported. A file that cannot be decoded is skipped, never fatal:
//! the batch continues with the remaining files and every skip is reported
//! back as a `(name, reason)` pair.
//!
//! PDF decoding runs on a blocking thread; a decoder that errors out (or
//! panics on malformed input) produces a skip for that file only. This is
//! the only component that touches transient file storage: when a spool
//! directory is configured, raw uploads are written there before extraction
//! so the original bytes survive until the clear operation removes them.

use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// An uploaded file: a name used for type dispatch plus its raw bytes.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Reads a file from disk, using its file name for dispatch.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, bytes })
    }
}

/// Document type detected from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
    Unsupported,
}

impl DocumentKind {
    pub fn from_name(name: &str) -> Self {
        match Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("pdf") => DocumentKind::Pdf,
            Some("txt") => DocumentKind::Text,
            _ => DocumentKind::Unsupported,
        }
    }
}

/// A successfully decoded document, ready for chunking.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub source_name: String,
    pub content: String,
    pub kind: DocumentKind,
}

/// Why a file was skipped during loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The extension is neither `.pdf` nor `.txt`.
    Unsupported,
    /// The bytes could not be decoded (corrupt PDF, invalid UTF-8).
    Corrupt(String),
    /// Decoding succeeded but produced no usable text.
    Empty,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unsupported => write!(f, "unsupported file type"),
            SkipReason::Corrupt(detail) => write!(f, "corrupt or unreadable: {detail}"),
            SkipReason::Empty => write!(f, "no extractable text"),
        }
    }
}

/// A skipped file and the reason it was skipped.
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub name: String,
    pub reason: SkipReason,
}

/// Decodes uploaded files into [`RawDocument`]s, collecting skips.
#[derive(Debug, Default)]
pub struct Loader {
    spool_dir: Option<PathBuf>,
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also write each upload's raw bytes under `dir` before extraction.
    pub fn with_spool_dir(mut self, dir: PathBuf) -> Self {
        self.spool_dir = Some(dir);
        self
    }

    /// Decodes every file in the batch. Per-file failures never abort the
    /// batch; they are returned as the skip report.
    pub async fn load_all(&self, files: &[UploadedFile]) -> (Vec<RawDocument>, Vec<SkippedFile>) {
        let mut documents = Vec::new();
        let mut skipped = Vec::new();

        for file in files {
            match self.load_one(file).await {
                Ok(document) => {
                    debug!(file = %file.name, bytes = file.bytes.len(), "loaded document");
                    documents.push(document);
                }
                Err(reason) => {
                    warn!(file = %file.name, %reason, "skipping file");
                    skipped.push(SkippedFile {
                        name: file.name.clone(),
                        reason,
                    });
                }
            }
        }

        (documents, skipped)
    }

    async fn load_one(&self, file: &UploadedFile) -> std::result::Result<RawDocument, SkipReason> {
        let kind = DocumentKind::from_name(&file.name);
        if kind == DocumentKind::Unsupported {
            return Err(SkipReason::Unsupported);
        }

        self.spool(file).await;

        let content = match kind {
            DocumentKind::Pdf => extract_pdf_text(file.bytes.clone()).await?,
            DocumentKind::Text => String::from_utf8(file.bytes.clone())
                .map_err(|e| SkipReason::Corrupt(format!("invalid UTF-8: {e}")))?,
            DocumentKind::Unsupported => unreachable!(),
        };

        if content.trim().is_empty() {
            return Err(SkipReason::Empty);
        }

        Ok(RawDocument {
            source_name: file.name.clone(),
            content,
            kind,
        })
    }

    // Best effort: a spool failure is logged, never fatal.
    async fn spool(&self, file: &UploadedFile) {
        let Some(dir) = &self.spool_dir else {
            return;
        };
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!(dir = %dir.display(), error = %e, "failed to create spool directory");
            return;
        }
        let file_name = Path::new(&file.name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        if let Err(e) = tokio::fs::write(dir.join(&file_name), &file.bytes).await {
            warn!(file = %file.name, error = %e, "failed to spool upload");
        }
    }
}

async fn extract_pdf_text(bytes: Vec<u8>) -> std::result::Result<String, SkipReason> {
    let decoded =
        tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes)).await;

    match decoded {
        // A panicking decoder only loses this one file.
        Err(join) => Err(SkipReason::Corrupt(format!("PDF decoder crashed: {join}"))),
        Ok(Err(e)) => Err(SkipReason::Corrupt(format!("PDF decode failed: {e}"))),
        Ok(Ok(text)) if text.trim().is_empty() => Err(SkipReason::Empty),
        Ok(Ok(text)) => Ok(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_dispatch_is_extension_only_and_case_insensitive() {
        assert_eq!(DocumentKind::from_name("report.pdf"), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_name("REPORT.PDF"), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_name("notes.txt"), DocumentKind::Text);
        assert_eq!(
            DocumentKind::from_name("image.png"),
            DocumentKind::Unsupported
        );
        assert_eq!(DocumentKind::from_name("no_extension"), DocumentKind::Unsupported);
    }

    #[tokio::test]
    async fn text_files_decode_and_invalid_utf8_is_skipped() {
        let loader = Loader::new();
        let files = vec![
            UploadedFile::new("good.txt", b"plain text content".to_vec()),
            UploadedFile::new("bad.txt", vec![0xff, 0xfe, 0x00, 0x80]),
        ];

        let (documents, skipped) = loader.load_all(&files).await;

        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].source_name, "good.txt");
        assert_eq!(documents[0].content, "plain text content");
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].name, "bad.txt");
        assert!(matches!(skipped[0].reason, SkipReason::Corrupt(_)));
    }

    #[tokio::test]
    async fn unsupported_and_blank_files_are_skipped_not_fatal() {
        let loader = Loader::new();
        let files = vec![
            UploadedFile::new("image.png", vec![0x89, 0x50, 0x4e, 0x47]),
            UploadedFile::new("blank.txt", b"   \n\t  ".to_vec()),
            UploadedFile::new("kept.txt", b"still here".to_vec()),
        ];

        let (documents, skipped) = loader.load_all(&files).await;

        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].source_name, "kept.txt");
        assert_eq!(skipped.len(), 2);
        assert_eq!(skipped[0].reason, SkipReason::Unsupported);
        assert_eq!(skipped[1].reason, SkipReason::Empty);
    }

    #[tokio::test]
    async fn corrupt_pdf_bytes_are_skipped() {
        let loader = Loader::new();
        let files = vec![UploadedFile::new(
            "broken.pdf",
            b"this is not a pdf at all".to_vec(),
        )];

        let (documents, skipped) = loader.load_all(&files).await;

        assert!(documents.is_empty());
        assert_eq!(skipped.len(), 1);
        assert!(matches!(
            skipped[0].reason,
            SkipReason::Corrupt(_) | SkipReason::Empty
        ));
    }

    #[tokio::test]
    async fn spool_dir_receives_raw_uploads() {
        let temp = tempfile::tempdir().unwrap();
        let spool = temp.path().join("spool");
        let loader = Loader::new().with_spool_dir(spool.clone());

        let files = vec![UploadedFile::new("kept.txt", b"content".to_vec())];
        let (documents, _) = loader.load_all(&files).await;

        assert_eq!(documents.len(), 1);
        assert_eq!(std::fs::read(spool.join("kept.txt")).unwrap(), b"content");
    }
}
