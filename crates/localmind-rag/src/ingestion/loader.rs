//! Document loading for the upload allow-list (plain text, markdown, PDF)

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::types::{Document, FileKind, LoadWarning, Upload};

/// Documents produced from one upload
#[derive(Debug, Clone)]
pub struct LoadedFile {
    /// Original filename
    pub filename: String,
    /// Resolved kind
    pub kind: FileKind,
    /// One document for text files, one per page for PDFs
    pub documents: Vec<Document>,
    /// Advisory warnings (not errors)
    pub warnings: Vec<LoadWarning>,
}

/// Converts uploads into documents
///
/// Every supported upload is staged in a scratch file that is removed when
/// loading returns, whether it succeeded or failed.
#[derive(Debug, Clone, Default)]
pub struct DocumentLoader {
    /// Scratch directory (system temp dir when `None`)
    temp_dir: Option<PathBuf>,
}

impl DocumentLoader {
    /// Create a loader using the given scratch directory
    pub fn new(temp_dir: Option<PathBuf>) -> Self {
        Self { temp_dir }
    }

    /// Load an upload into documents
    pub fn load(&self, upload: &Upload) -> Result<LoadedFile> {
        let kind = upload.kind().ok_or_else(|| {
            let tag = if upload.declared_type.is_empty() {
                "(none)".to_string()
            } else {
                upload.declared_type.clone()
            };
            Error::UnsupportedFileType(tag)
        })?;

        let scratch = self.stage(upload, kind)?;

        let documents = match kind {
            FileKind::PlainText | FileKind::Markdown => {
                vec![load_text(scratch.path(), &upload.filename, kind)?]
            }
            FileKind::Pdf => load_pdf(scratch.path(), &upload.filename)?,
        };

        if let Err(e) = scratch.close() {
            tracing::warn!("Failed to remove scratch file for {}: {}", upload.filename, e);
        }

        let mut warnings = Vec::new();
        if documents.iter().all(Document::is_blank) {
            tracing::warn!("No text content detected in {}", upload.filename);
            warnings.push(LoadWarning::EmptyContent {
                filename: upload.filename.clone(),
            });
        }

        tracing::debug!(
            "Loaded {} as {} ({} document(s))",
            upload.filename,
            kind.display_name(),
            documents.len()
        );

        Ok(LoadedFile {
            filename: upload.filename.clone(),
            kind,
            documents,
            warnings,
        })
    }

    /// Write the upload bytes to a scratch file, deleted on drop
    fn stage(&self, upload: &Upload, kind: FileKind) -> Result<NamedTempFile> {
        let suffix = format!(".{}", kind.extension());
        let mut builder = tempfile::Builder::new();
        builder.prefix("localmind-upload-").suffix(&suffix);

        let mut file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| Error::file_load(&upload.filename, format!("cannot create temp file: {}", e)))?;

        file.write_all(&upload.data)
            .and_then(|_| file.flush())
            .map_err(|e| Error::file_load(&upload.filename, format!("cannot write temp file: {}", e)))?;

        Ok(file)
    }
}

/// Read a UTF-8 text file as a single document
fn load_text(path: &Path, filename: &str, kind: FileKind) -> Result<Document> {
    let bytes = std::fs::read(path).map_err(|e| Error::file_load(filename, e.to_string()))?;
    let content = String::from_utf8(bytes)
        .map_err(|e| Error::file_load(filename, format!("not valid UTF-8: {}", e)))?;
    let content = content
        .strip_prefix('\u{feff}')
        .map(str::to_string)
        .unwrap_or(content);

    Ok(Document::new(content, filename, kind))
}

/// Load a PDF page by page
fn load_pdf(path: &Path, filename: &str) -> Result<Vec<Document>> {
    let pdf = lopdf::Document::load(path)
        .map_err(|e| Error::file_load(filename, format!("Failed to load PDF: {}", e)))?;

    let pages = pdf.get_pages();
    let page_count = pages.len() as u32;
    let mut documents = Vec::with_capacity(pages.len());

    for page_number in pages.keys().copied() {
        let text = match pdf.extract_text(&[page_number]) {
            Ok(text) => text.replace('\0', ""),
            Err(e) => {
                // Image-only pages have nothing to extract
                tracing::debug!("No text on page {} of {}: {}", page_number, filename, e);
                String::new()
            }
        };
        documents.push(Document::page(text, filename, FileKind::Pdf, page_number, page_count));
    }

    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::meta;
    use tempfile::TempDir;

    fn loader_in(dir: &TempDir) -> DocumentLoader {
        DocumentLoader::new(Some(dir.path().to_path_buf()))
    }

    fn scratch_is_empty(dir: &TempDir) -> bool {
        std::fs::read_dir(dir.path()).unwrap().next().is_none()
    }

    /// Build a small PDF with one line of text per page
    fn sample_pdf(lines: &[&str]) -> Vec<u8> {
        use lopdf::content::{Content, Operation};
        use lopdf::{dictionary, Object, Stream};

        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for line in lines {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![72.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*line)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_load_plain_text() {
        let dir = TempDir::new().unwrap();
        let upload = Upload::new("notes.txt", "\u{feff}Hello knowledge base");
        let loaded = loader_in(&dir).load(&upload).unwrap();

        assert_eq!(loaded.kind, FileKind::PlainText);
        assert_eq!(loaded.documents.len(), 1);
        assert_eq!(loaded.documents[0].content, "Hello knowledge base");
        assert_eq!(loaded.documents[0].source(), "notes.txt");
        assert!(loaded.warnings.is_empty());
        assert!(scratch_is_empty(&dir));
    }

    #[test]
    fn test_load_markdown_keeps_markup() {
        let dir = TempDir::new().unwrap();
        let upload = Upload::new("guide.md", "# Title\n\nSome *text*.");
        let loaded = loader_in(&dir).load(&upload).unwrap();

        assert_eq!(loaded.kind, FileKind::Markdown);
        assert_eq!(loaded.documents[0].content, "# Title\n\nSome *text*.");
        assert_eq!(
            loaded.documents[0].metadata.get(meta::FILE_TYPE).map(String::as_str),
            Some("md")
        );
    }

    #[test]
    fn test_unsupported_type() {
        let dir = TempDir::new().unwrap();
        let upload = Upload::new("report.docx", vec![0u8; 16]);
        let err = loader_in(&dir).load(&upload).unwrap_err();

        assert!(matches!(err, Error::UnsupportedFileType(ref tag) if tag == "docx"));
        assert!(scratch_is_empty(&dir));
    }

    #[test]
    fn test_invalid_utf8_cleans_up() {
        let dir = TempDir::new().unwrap();
        let upload = Upload::new("broken.txt", vec![0xff, 0xfe, 0x00, 0xc3]);
        let err = loader_in(&dir).load(&upload).unwrap_err();

        assert!(matches!(err, Error::FileLoadFailed { ref filename, .. } if filename == "broken.txt"));
        assert!(scratch_is_empty(&dir));
    }

    #[test]
    fn test_corrupt_pdf_cleans_up() {
        let dir = TempDir::new().unwrap();
        let upload = Upload::new("scan.pdf", b"not a pdf at all".to_vec());
        let err = loader_in(&dir).load(&upload).unwrap_err();

        assert!(matches!(err, Error::FileLoadFailed { .. }));
        assert!(scratch_is_empty(&dir));
    }

    #[test]
    fn test_whitespace_only_is_a_warning() {
        let dir = TempDir::new().unwrap();
        let upload = Upload::new("blank.txt", "  \n\t \n");
        let loaded = loader_in(&dir).load(&upload).unwrap();

        assert_eq!(loaded.documents.len(), 1);
        assert_eq!(
            loaded.warnings,
            vec![LoadWarning::EmptyContent {
                filename: "blank.txt".into()
            }]
        );
    }

    #[test]
    fn test_pdf_one_document_per_page() {
        let dir = TempDir::new().unwrap();
        let upload = Upload::with_type(
            "manual",
            "application/pdf",
            sample_pdf(&["First page text", "Second page text"]),
        );
        let loaded = loader_in(&dir).load(&upload).unwrap();

        assert_eq!(loaded.kind, FileKind::Pdf);
        assert_eq!(loaded.documents.len(), 2);
        for (i, doc) in loaded.documents.iter().enumerate() {
            assert_eq!(doc.source(), "manual");
            assert_eq!(doc.metadata.get(meta::PAGE), Some(&(i + 1).to_string()));
            assert_eq!(doc.metadata.get(meta::PAGE_COUNT).map(String::as_str), Some("2"));
        }
        assert!(scratch_is_empty(&dir));
    }
}
