//! Document intake: turns an uploaded file into plain text and normalizes it.

use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::LazyLock;

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use thiserror::Error;
use tracing::info;

/// File extensions the intake accepts at upload time.
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "docx", "txt"];

/// Main body part of a WordprocessingML package.
const DOCX_BODY_PART: &str = "word/document.xml";

/// Ceiling on the decompressed body part.
const MAX_DOCX_XML_BYTES: u64 = 16 * 1024 * 1024;

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Anything other than word characters, whitespace and basic punctuation.
static DISALLOWED_CHARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s\-.,():/]").unwrap());

/// Fatal for the document: the pipeline run is aborted and the caller sees it.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to read document: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to extract PDF text: {0}")]
    Pdf(String),

    #[error("Failed to extract DOCX text: {0}")]
    Docx(String),

    #[error("Document contains no extractable text")]
    Empty,
}

/// Lowercased extension of `filename`, without the dot.
pub fn file_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub fn is_supported(filename: &str) -> bool {
    file_extension(filename)
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Extracts raw text from an in-memory document, dispatching on extension.
pub fn parse_document(filename: &str, bytes: &[u8]) -> Result<String, ExtractionError> {
    let ext = file_extension(filename).unwrap_or_default();
    let text = match ext.as_str() {
        "pdf" => pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| ExtractionError::Pdf(e.to_string()))?,
        "docx" => docx_text(bytes)?,
        "txt" => String::from_utf8_lossy(bytes).into_owned(),
        _ => return Err(ExtractionError::UnsupportedFormat(format!(".{ext}"))),
    };

    let text = ensure_text(text)?;
    info!(
        "Parsed {} ({} characters extracted)",
        filename,
        text.chars().count()
    );
    Ok(text)
}

/// Text runs of the document body, one line per paragraph.
fn docx_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let docx_err = |e: &dyn std::fmt::Display| ExtractionError::Docx(e.to_string());

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| docx_err(&e))?;
    let part = archive.by_name(DOCX_BODY_PART).map_err(|e| docx_err(&e))?;
    let mut xml = String::new();
    part.take(MAX_DOCX_XML_BYTES).read_to_string(&mut xml)?;

    let mut reader = Reader::from_str(&xml);
    let mut text = String::new();
    let mut in_run_text = false;
    loop {
        match reader.read_event().map_err(|e| docx_err(&e))? {
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_run_text = true,
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_run_text = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:tab" => text.push('\t'),
                b"w:br" | b"w:cr" => text.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_run_text => {
                text.push_str(&t.unescape().map_err(|e| docx_err(&e))?);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(text)
}

/// Rejects documents that produced only whitespace.
pub fn ensure_text(text: String) -> Result<String, ExtractionError> {
    if text.trim().is_empty() {
        return Err(ExtractionError::Empty);
    }
    Ok(text)
}

/// Collapses whitespace and prunes characters outside basic punctuation.
pub fn clean_text(text: &str) -> String {
    let collapsed = WHITESPACE_RE.replace_all(text, " ");
    DISALLOWED_CHARS_RE
        .replace_all(&collapsed, "")
        .trim()
        .to_string()
}
