//! Document loader: file on disk → raw text units.
//!
//! The loading strategy is chosen by [`DocumentFormat`], keyed by the
//! lower-cased file extension. Each strategy returns one or more
//! [`TextUnit`]s carrying the source metadata:
//!
//! | Format | Units |
//! |--------|-------|
//! | `.txt`, `.md` | whole file |
//! | `.docx` | whole document, one line per paragraph |
//! | `.pdf` | whole document |
//! | `.pptx` | one per slide |
//! | `.csv` | one per data row, rendered as `header: value` lines |
//!
//! Anything else is a [`LoadError::UnsupportedFormat`].

use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{FileAccessError, LoadError};
use crate::extract;
use crate::models::{ChunkMetadata, TextUnit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Text,
    Markdown,
    Docx,
    Pdf,
    Pptx,
    Csv,
}

impl DocumentFormat {
    pub const ALL: [DocumentFormat; 6] = [
        DocumentFormat::Text,
        DocumentFormat::Markdown,
        DocumentFormat::Docx,
        DocumentFormat::Pdf,
        DocumentFormat::Pptx,
        DocumentFormat::Csv,
    ];

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" => Some(DocumentFormat::Text),
            "md" => Some(DocumentFormat::Markdown),
            "docx" => Some(DocumentFormat::Docx),
            "pdf" => Some(DocumentFormat::Pdf),
            "pptx" => Some(DocumentFormat::Pptx),
            "csv" => Some(DocumentFormat::Csv),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let ext = normalized_extension(path);
        Self::from_extension(&ext).ok_or_else(|| LoadError::UnsupportedFormat {
            path: path.to_path_buf(),
            extension: ext,
        })
    }

    pub fn extension(self) -> &'static str {
        match self {
            DocumentFormat::Text => "txt",
            DocumentFormat::Markdown => "md",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Pptx => "pptx",
            DocumentFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Lower-cased extension without the dot; empty when there is none.
pub fn normalized_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn is_supported(path: &Path) -> bool {
    DocumentFormat::from_extension(&normalized_extension(path)).is_some()
}

/// Load `path` into text units.
///
/// `source` supplies `doc_id`, `filename`, `filetype` and `upload_time`;
/// `unit` is assigned per returned unit and `start_offset` is left for the
/// chunker.
pub fn load(path: &Path, source: &ChunkMetadata) -> Result<Vec<TextUnit>, LoadError> {
    let format = DocumentFormat::from_path(path)?;
    let bytes = fs::read(path).map_err(|e| FileAccessError::new(path, e))?;
    let extract_err = |e: extract::ExtractError| LoadError::Extract {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let texts = match format {
        DocumentFormat::Text | DocumentFormat::Markdown => {
            vec![String::from_utf8_lossy(&bytes).into_owned()]
        }
        DocumentFormat::Docx => vec![extract::extract_docx(&bytes).map_err(extract_err)?],
        DocumentFormat::Pdf => vec![extract::extract_pdf(&bytes).map_err(extract_err)?],
        DocumentFormat::Pptx => extract::extract_pptx(&bytes).map_err(extract_err)?,
        DocumentFormat::Csv => {
            csv_units(&String::from_utf8_lossy(&bytes)).map_err(|e| LoadError::Extract {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        }
    };

    Ok(texts
        .into_iter()
        .enumerate()
        .map(|(unit, text)| {
            let mut metadata = source.clone();
            metadata.unit = unit;
            metadata.start_offset = 0;
            TextUnit { text, metadata }
        })
        .collect())
}

/// One text per data row: `header: value` lines. Blank rows are dropped.
/// Rows may be ragged; fields past the header row are named `columnN`.
fn csv_units(content: &str) -> Result<Vec<String>, csv::Error> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());
    let mut records = reader.records();
    let headers = match records.next() {
        Some(record) => record?,
        None => return Ok(Vec::new()),
    };

    let mut units = Vec::new();
    for record in records {
        let record = record?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        let lines: Vec<String> = record
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let header = headers
                    .get(i)
                    .map(|h| h.trim().to_string())
                    .unwrap_or_else(|| format!("column{}", i + 1));
                format!("{header}: {}", value.trim())
            })
            .collect();
        units.push(lines.join("\n"));
    }
    Ok(units)
}
