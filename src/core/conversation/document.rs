//! Document attachments

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use super::image::base64_bytes;
use crate::utils::error::{LlmError, Result};

/// Document formats accepted by the vendors we dispatch to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Csv,
    Doc,
    Docx,
    Xls,
    Xlsx,
    Html,
    Txt,
    Md,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Csv => "csv",
            DocumentFormat::Doc => "doc",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Xls => "xls",
            DocumentFormat::Xlsx => "xlsx",
            DocumentFormat::Html => "html",
            DocumentFormat::Txt => "txt",
            DocumentFormat::Md => "md",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentFormat::Pdf),
            "csv" => Some(DocumentFormat::Csv),
            "doc" => Some(DocumentFormat::Doc),
            "docx" => Some(DocumentFormat::Docx),
            "xls" => Some(DocumentFormat::Xls),
            "xlsx" => Some(DocumentFormat::Xlsx),
            "html" | "htm" => Some(DocumentFormat::Html),
            "txt" => Some(DocumentFormat::Txt),
            "md" | "markdown" => Some(DocumentFormat::Md),
            _ => None,
        }
    }
}

/// A document attachment on a user message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Raw bytes, base64 on the wire
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
    pub format: DocumentFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Document {
    pub fn from_bytes(bytes: Vec<u8>, format: DocumentFormat) -> Result<Self> {
        if bytes.is_empty() {
            return Err(LlmError::conversion("empty document bytes"));
        }
        Ok(Self {
            content: bytes,
            format,
            name: None,
        })
    }

    pub fn from_base64(data: &str, format: DocumentFormat) -> Result<Self> {
        let bytes = BASE64
            .decode(data.trim())
            .map_err(|e| LlmError::conversion(format!("invalid base64 document data: {e}")))?;
        Self::from_bytes(bytes, format)
    }

    /// Load from disk; the format comes from the file extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = path
            .extension()
            .and_then(|e| DocumentFormat::from_extension(&e.to_string_lossy()))
            .ok_or_else(|| {
                LlmError::conversion(format!(
                    "unsupported document extension: {}",
                    path.display()
                ))
            })?;
        let bytes = std::fs::read(path).map_err(|e| {
            LlmError::conversion(format!("failed to read document {}: {e}", path.display()))
        })?;
        let mut document = Self::from_bytes(bytes, format)?;
        document.name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned());
        Ok(document)
    }

    pub fn as_base64(&self) -> String {
        BASE64.encode(&self.content)
    }

    pub fn size_bytes(&self) -> usize {
        self.content.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_mapping_covers_aliases() {
        assert_eq!(DocumentFormat::from_extension("PDF"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_extension("htm"), Some(DocumentFormat::Html));
        assert_eq!(DocumentFormat::from_extension("markdown"), Some(DocumentFormat::Md));
        assert_eq!(DocumentFormat::from_extension("exe"), None);
    }

    #[test]
    fn base64_round_trip() {
        let doc = Document::from_bytes(b"hello,world\n1,2\n".to_vec(), DocumentFormat::Csv).unwrap();
        let restored = Document::from_base64(&doc.as_base64(), DocumentFormat::Csv).unwrap();
        assert_eq!(restored, doc);
    }

    #[test]
    fn empty_documents_rejected() {
        assert!(Document::from_bytes(Vec::new(), DocumentFormat::Txt).is_err());
    }
}
