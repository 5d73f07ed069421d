//! Upload, document and chunk types with source tracking

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};

/// String metadata attached to documents and chunks (sorted for stable digests)
pub type Metadata = BTreeMap<String, String>;

/// Well-known metadata keys
pub mod meta {
    /// Original filename
    pub const SOURCE: &str = "source";
    /// File kind of the source upload
    pub const FILE_TYPE: &str = "file_type";
    /// 1-indexed page number for paginated documents
    pub const PAGE: &str = "page";
    /// Total pages of the source document
    pub const PAGE_COUNT: &str = "page_count";
    /// Position of a chunk within its document
    pub const CHUNK_INDEX: &str = "chunk_index";
    /// Character offset of the chunk span in the document content
    pub const START_INDEX: &str = "start_index";
    /// RFC 3339 timestamp of the ingestion call
    pub const INGESTED_AT: &str = "ingested_at";
}

/// Supported upload kinds (the allow-list)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Plain text file
    PlainText,
    /// Markdown file
    Markdown,
    /// PDF document, one document per page
    Pdf,
}

impl FileKind {
    /// Resolve a declared type tag: an extension (`txt`, `.md`) or a MIME type (`application/pdf`)
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim().trim_start_matches('.').to_lowercase();
        if tag.is_empty() {
            return None;
        }

        let essence = if tag.contains('/') {
            tag.split(';').next().unwrap_or("").trim().to_string()
        } else {
            match tag.as_str() {
                // mime_guess maps these to text/x-markdown or nothing depending on version
                "md" | "markdown" => return Some(Self::Markdown),
                _ => mime_guess::from_ext(&tag).first()?.essence_str().to_string(),
            }
        };

        match essence.as_str() {
            "text/plain" => Some(Self::PlainText),
            "text/markdown" | "text/x-markdown" => Some(Self::Markdown),
            "application/pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    /// Canonical extension, used for temp file suffixes
    pub fn extension(&self) -> &'static str {
        match self {
            Self::PlainText => "txt",
            Self::Markdown => "md",
            Self::Pdf => "pdf",
        }
    }

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PlainText => "Text File",
            Self::Markdown => "Markdown",
            Self::Pdf => "PDF",
        }
    }
}

/// A file handed to the ingestion pipeline
#[derive(Debug, Clone)]
pub struct Upload {
    /// Original filename
    pub filename: String,
    /// Declared type tag (extension or MIME type)
    pub declared_type: String,
    /// Raw file bytes
    pub data: Bytes,
}

impl Upload {
    /// Create an upload whose declared type is the filename extension
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let filename = filename.into();
        let declared_type = Path::new(&filename)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        Self {
            filename,
            declared_type,
            data: data.into(),
        }
    }

    /// Create an upload with an explicit type tag
    pub fn with_type(
        filename: impl Into<String>,
        declared_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            filename: filename.into(),
            declared_type: declared_type.into(),
            data: data.into(),
        }
    }

    /// Read an upload from disk, keeping only the file name
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|e| Error::file_load(path.display().to_string(), e.to_string()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(filename, data))
    }

    /// Resolved kind, `None` when outside the allow-list
    pub fn kind(&self) -> Option<FileKind> {
        FileKind::from_tag(&self.declared_type)
    }
}

/// A loaded unit of source text (a whole file, or one page)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Extracted text
    pub content: String,
    /// Source metadata (filename, page number)
    pub metadata: Metadata,
}

impl Document {
    /// Create a document for a whole file
    pub fn new(content: String, filename: &str, kind: FileKind) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(meta::SOURCE.to_string(), filename.to_string());
        metadata.insert(meta::FILE_TYPE.to_string(), kind.extension().to_string());
        Self { content, metadata }
    }

    /// Create a document for one page of a paginated file
    pub fn page(content: String, filename: &str, kind: FileKind, page: u32, page_count: u32) -> Self {
        let mut doc = Self::new(content, filename, kind);
        doc.metadata.insert(meta::PAGE.to_string(), page.to_string());
        doc.metadata.insert(meta::PAGE_COUNT.to_string(), page_count.to_string());
        doc
    }

    /// Original filename
    pub fn source(&self) -> &str {
        self.metadata.get(meta::SOURCE).map(String::as_str).unwrap_or("unknown")
    }

    /// Whether the content is empty after trimming
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// The atomic unit persisted and retrieved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic content id (hex SHA-256)
    pub id: String,
    /// Text content, non-empty after trimming
    pub text: String,
    /// Inherited document metadata plus chunk position
    pub metadata: Metadata,
    /// Embedding vector, empty until embedded
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub embedding: Vec<f32>,
}

impl Chunk {
    /// Create a new chunk; the id is derived from source, page, index and text
    pub fn new(text: String, metadata: Metadata) -> Self {
        let id = content_id(&text, &metadata);
        Self {
            id,
            text,
            metadata,
            embedding: Vec::new(),
        }
    }

    /// Attach an embedding
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    /// Original filename
    pub fn source(&self) -> &str {
        self.metadata.get(meta::SOURCE).map(String::as_str).unwrap_or("unknown")
    }

    /// Page number, if the source was paginated
    pub fn page(&self) -> Option<u32> {
        self.metadata.get(meta::PAGE).and_then(|p| p.parse().ok())
    }

    /// Position within the source document
    pub fn chunk_index(&self) -> Option<usize> {
        self.metadata.get(meta::CHUNK_INDEX).and_then(|i| i.parse().ok())
    }

    /// Format source for display
    pub fn format_citation(&self) -> String {
        match self.page() {
            Some(page) => format!("{}, Page {}", self.source(), page),
            None => self.source().to_string(),
        }
    }
}

fn content_id(text: &str, metadata: &Metadata) -> String {
    let mut hasher = Sha256::new();
    for key in [meta::SOURCE, meta::PAGE, meta::CHUNK_INDEX] {
        hasher.update(metadata.get(key).map(String::as_str).unwrap_or("").as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Digest over an ordered chunk set, equal for identical re-ingestions
pub fn chunk_set_digest(chunks: &[Chunk]) -> String {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk.id.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_kind_from_tag() {
        assert_eq!(FileKind::from_tag("txt"), Some(FileKind::PlainText));
        assert_eq!(FileKind::from_tag(".TXT"), Some(FileKind::PlainText));
        assert_eq!(FileKind::from_tag("md"), Some(FileKind::Markdown));
        assert_eq!(FileKind::from_tag("pdf"), Some(FileKind::Pdf));
        assert_eq!(FileKind::from_tag("application/pdf"), Some(FileKind::Pdf));
        assert_eq!(FileKind::from_tag("text/plain; charset=utf-8"), Some(FileKind::PlainText));
        assert_eq!(FileKind::from_tag("text/markdown"), Some(FileKind::Markdown));
        assert_eq!(FileKind::from_tag("docx"), None);
        assert_eq!(FileKind::from_tag(".docx"), None);
        assert_eq!(FileKind::from_tag(""), None);
    }

    #[test]
    fn test_upload_tag_from_extension() {
        let upload = Upload::new("Notes.MD", "hello");
        assert_eq!(upload.declared_type, "md");
        assert_eq!(upload.kind(), Some(FileKind::Markdown));

        let upload = Upload::new("README", "hello");
        assert_eq!(upload.kind(), None);
    }

    #[test]
    fn test_chunk_id_is_deterministic() {
        let mut metadata = Metadata::new();
        metadata.insert(meta::SOURCE.into(), "a.txt".into());
        metadata.insert(meta::CHUNK_INDEX.into(), "0".into());

        let a = Chunk::new("same text".into(), metadata.clone());
        let b = Chunk::new("same text".into(), metadata.clone());
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), 64);

        metadata.insert(meta::CHUNK_INDEX.into(), "1".into());
        let c = Chunk::new("same text".into(), metadata);
        assert_ne!(a.id, c.id);
        assert_ne!(chunk_set_digest(&[a.clone()]), chunk_set_digest(&[a, c]));
    }

    #[test]
    fn test_page_metadata() {
        let doc = Document::page("text".into(), "report.pdf", FileKind::Pdf, 3, 10);
        assert_eq!(doc.source(), "report.pdf");
        assert_eq!(doc.metadata.get(meta::PAGE).map(String::as_str), Some("3"));

        let chunk = Chunk::new("text".into(), doc.metadata.clone());
        assert_eq!(chunk.page(), Some(3));
        assert_eq!(chunk.format_citation(), "report.pdf, Page 3");
    }
}
