mod docx;
mod encoding;

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

pub use encoding::decode_text;

const PDF_MAGIC: &[u8] = b"%PDF-";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Bytes scanned for an OOXML part name when the zip directory is unreadable.
const ZIP_SCAN_WINDOW: usize = 4096;

const DOCX_MAIN_PART: &str = "word/document.xml";

/// Content type decided from a file's bytes, never from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Docx,
    #[serde(rename = "txt")]
    Text,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Docx => "docx",
            FileType::Text => "txt",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text pulled out of an uploaded file, produced once per upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub source_path: PathBuf,
    pub display_name: String,
    pub file_type: FileType,
    /// UTF-8, `\n` line endings.
    pub text: String,
    pub byte_size: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum DocError {
    #[error("cannot read {}: {message}", .path.display())]
    FileAccess { path: PathBuf, message: String },
    #[error("failed to parse {file_type} file {}: {message}", .path.display())]
    Parse {
        path: PathBuf,
        file_type: FileType,
        message: String,
    },
}

impl DocError {
    pub fn path(&self) -> &Path {
        match self {
            DocError::FileAccess { path, .. } | DocError::Parse { path, .. } => path,
        }
    }
}

/// Extract the text of a PDF, DOCX or plain-text file.
///
/// The format is sniffed from the content. Reads the file and nothing else:
/// no writes, no deletes, no shared state, so concurrent callers are fine.
pub fn extract(path: impl AsRef<Path>) -> Result<ExtractedDocument, DocError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| DocError::FileAccess {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let file_type = sniff(&bytes);
    tracing::debug!(
        path = %path.display(),
        file_type = %file_type,
        byte_size = bytes.len(),
        "extracting document"
    );

    let parse_error = |message: String| DocError::Parse {
        path: path.to_path_buf(),
        file_type,
        message,
    };

    let text = match file_type {
        FileType::Pdf => extract_pdf(&bytes).map_err(parse_error)?,
        FileType::Docx => docx::extract_paragraphs(&bytes).map_err(parse_error)?,
        FileType::Text => decode_text(&bytes).map_err(parse_error)?,
    };

    Ok(ExtractedDocument {
        source_path: path.to_path_buf(),
        display_name: display_name(path),
        file_type,
        text: normalize_newlines(&text),
        byte_size: bytes.len() as u64,
    })
}

/// Decide the real content type of `bytes` by magic number.
///
/// `%PDF-` must open the file, after at most a UTF-8 BOM and leading
/// whitespace. A text file that merely mentions the header stays text.
pub fn sniff(bytes: &[u8]) -> FileType {
    let start = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes).trim_ascii_start();
    if start.starts_with(PDF_MAGIC) {
        return FileType::Pdf;
    }

    if bytes.starts_with(b"PK\x03\x04") && looks_like_docx(bytes) {
        return FileType::Docx;
    }

    FileType::Text
}

fn looks_like_docx(bytes: &[u8]) -> bool {
    match zip::ZipArchive::new(Cursor::new(bytes)) {
        Ok(archive) => archive.file_names().any(|name| name == DOCX_MAIN_PART),
        // A damaged package still names its parts in the local headers.
        Err(_) => {
            let head = &bytes[..bytes.len().min(ZIP_SCAN_WINDOW)];
            find(head, b"word/").is_some()
        }
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, String> {
    // pdf-extract panics on some malformed inputs instead of returning an error.
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| "PDF parser aborted on malformed input".to_string())?
        .map_err(|e| e.to_string())?;

    tracing::debug!(page_count = pages.len(), "PDF text extraction complete");
    // Each page carries its own layout newlines at both ends.
    let pages: Vec<&str> = pages
        .iter()
        .map(|page| page.trim_matches(|c: char| c == '\n' || c == '\r'))
        .collect();
    Ok(pages.join("\n"))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}

fn normalize_newlines(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
