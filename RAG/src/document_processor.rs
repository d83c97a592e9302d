use crate::error::{RagError, Result};
use crate::models::{Document, Page};
use rayon::prelude::*;
use regex::Regex;
use std::fs::File;
use std::panic;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Turns PDF files into per-page text.
#[derive(Debug, Clone, Default)]
pub struct DocumentProcessor;

impl DocumentProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Extracts every path independently and in parallel. The result keeps
    /// the order of `paths`.
    pub fn process_documents(&self, paths: &[PathBuf]) -> Result<Vec<Document>> {
        let documents = paths
            .par_iter()
            .map(|path| self.process_pdf(path))
            .collect::<Result<Vec<_>>>()?;

        log::info!("Processed {} documents", documents.len());
        Ok(documents)
    }

    pub fn process_pdf(&self, file_path: &Path) -> Result<Document> {
        let filename = file_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| file_path.display().to_string());

        log::info!("Processing PDF: {}", filename);

        let pages = self.extract_pages(file_path)?;
        let document = Document { filename, pages };

        let blank = document.pages.iter().filter(|p| p.text.is_empty()).count();
        if document.is_blank() {
            log::warn!(
                "{}: no extractable text on any of its {} pages",
                document.filename,
                document.page_count()
            );
        } else if blank > 0 {
            log::warn!(
                "{}: {} of {} pages have no extractable text",
                document.filename,
                blank,
                document.page_count()
            );
        }
        Ok(document)
    }

    /// One entry per page, in page order. Image-only pages come back empty.
    pub fn extract_pages(&self, file_path: &Path) -> Result<Vec<Page>> {
        let display = file_path.display().to_string();

        File::open(file_path).map_err(|e| RagError::extraction(&display, e.to_string()))?;

        // The PDF parser panics on some malformed inputs.
        let raw_pages = panic::catch_unwind(|| pdf_extract::extract_text_by_pages(file_path))
            .map_err(|payload| {
                RagError::extraction(&display, format!("parser panicked: {}", panic_message(&payload)))
            })?
            .map_err(|e| RagError::extraction(&display, e.to_string()))?;

        Ok(raw_pages
            .iter()
            .enumerate()
            .map(|(idx, text)| Page {
                number: idx + 1,
                text: self.clean_text(text),
            })
            .collect())
    }

    /// Collapses horizontal whitespace and runs of blank lines while keeping
    /// paragraph breaks for the splitter.
    pub fn clean_text(&self, text: &str) -> String {
        static HORIZONTAL: OnceLock<Regex> = OnceLock::new();
        static TRAILING: OnceLock<Regex> = OnceLock::new();
        static BLANK_LINES: OnceLock<Regex> = OnceLock::new();

        let horizontal = HORIZONTAL.get_or_init(|| Regex::new(r"[ \t\u{00A0}\f]+").unwrap());
        let trailing = TRAILING.get_or_init(|| Regex::new(r" *\r?\n *").unwrap());
        let blank_lines = BLANK_LINES.get_or_init(|| Regex::new(r"\n{3,}").unwrap());

        let cleaned = horizontal.replace_all(text, " ");
        let cleaned = trailing.replace_all(&cleaned, "\n");
        let cleaned = blank_lines.replace_all(&cleaned, "\n\n");

        cleaned.trim().to_string()
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn clean_text_keeps_paragraph_breaks() {
        let processor = DocumentProcessor::new();
        let raw = "  Title\t\tline   \n\n\n\nBody   text  here.  \r\nNext line ";
        assert_eq!(
            processor.clean_text(raw),
            "Title line\n\nBody text here.\nNext line"
        );
    }

    #[test]
    fn clean_text_of_whitespace_is_empty() {
        let processor = DocumentProcessor::new();
        assert_eq!(processor.clean_text(" \n\t \n "), "");
    }

    #[test]
    fn missing_file_is_an_extraction_error() {
        let processor = DocumentProcessor::new();
        let err = processor
            .process_pdf(Path::new("/nonexistent/report.pdf"))
            .unwrap_err();
        assert!(matches!(err, RagError::Extraction { .. }));
    }

    #[test]
    fn garbage_bytes_are_an_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.pdf");
        let mut file = File::create(&path).unwrap();
        file.write_all(b"this is not a pdf at all").unwrap();

        let err = DocumentProcessor::new().process_pdf(&path).unwrap_err();
        assert!(matches!(err, RagError::Extraction { .. }));
    }
}
