use std::io::Read as _;

use crate::error::{IngestError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Docx,
    Txt,
}

/// Detect file type by magic bytes rather than trusting the filename
/// extension (§4.3 stage "extract": "detect type by magic bytes").
pub fn detect_file_kind(filename: &str, bytes: &[u8]) -> Result<FileKind> {
    if bytes.starts_with(b"%PDF-") {
        return Ok(FileKind::Pdf);
    }
    // DOCX is a ZIP container; ZIP's local-file-header magic is "PK\x03\x04".
    if bytes.starts_with(b"PK\x03\x04") {
        return Ok(FileKind::Docx);
    }
    if std::str::from_utf8(bytes).is_ok() {
        return Ok(FileKind::Txt);
    }
    Err(IngestError::UnknownFileType {
        filename: filename.to_string(),
    })
}

/// A single page (or page-like unit) of extracted text, preserving
/// boundaries so chunking can respect them (§4.3 "preserving page and
/// heading boundaries").
pub struct ExtractedPage {
    pub page: Option<i64>,
    pub text: String,
}

pub fn extract_text(filename: &str, kind: FileKind, bytes: &[u8]) -> Result<Vec<ExtractedPage>> {
    let pages = match kind {
        FileKind::Pdf => extract_pdf(filename, bytes)?,
        FileKind::Docx => extract_docx(filename, bytes)?,
        FileKind::Txt => extract_txt(filename, bytes)?,
    };

    if pages.iter().all(|p| p.text.trim().is_empty()) {
        return Err(IngestError::EmptyDocument {
            filename: filename.to_string(),
        });
    }

    Ok(pages)
}

fn extract_pdf(filename: &str, bytes: &[u8]) -> Result<Vec<ExtractedPage>> {
    let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| IngestError::ExtractFailed {
        filename: filename.to_string(),
        reason: e.to_string(),
    })?;

    // pdf-extract separates pages with form-feed characters.
    let pages = text
        .split('\u{c}')
        .enumerate()
        .map(|(i, page_text)| ExtractedPage {
            page: Some((i as i64) + 1),
            text: page_text.to_string(),
        })
        .collect();

    Ok(pages)
}

fn extract_docx(filename: &str, bytes: &[u8]) -> Result<Vec<ExtractedPage>> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(cursor).map_err(|e| IngestError::ExtractFailed {
        filename: filename.to_string(),
        reason: e.to_string(),
    })?;

    let mut document_xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| IngestError::ExtractFailed {
            filename: filename.to_string(),
            reason: format!("missing word/document.xml: {e}"),
        })?
        .read_to_string(&mut document_xml)
        .map_err(|e| IngestError::ExtractFailed {
            filename: filename.to_string(),
            reason: e.to_string(),
        })?;

    let text = strip_docx_xml(&document_xml);
    Ok(vec![ExtractedPage { page: None, text }])
}

/// Minimal WordprocessingML text extraction: keep text inside `<w:t>` runs,
/// insert a newline on paragraph (`<w:p>`) boundaries. Not a general XML
/// parser — docx paragraph/run tags are well-known and this avoids pulling
/// in a full XML stack for one element type.
fn strip_docx_xml(xml: &str) -> String {
    let mut out = String::with_capacity(xml.len() / 4);
    let mut in_text_run = false;
    let mut chars = xml.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c != '<' {
            if in_text_run {
                out.push(c);
            }
            continue;
        }
        let rest = &xml[i..];
        if rest.starts_with("<w:t") {
            in_text_run = true;
            if let Some(tag_end) = rest.find('>') {
                for _ in 0..tag_end {
                    chars.next();
                }
            }
        } else if rest.starts_with("</w:t>") {
            in_text_run = false;
            for _ in 0.."</w:t>".len() - 1 {
                chars.next();
            }
        } else if rest.starts_with("<w:p ") || rest.starts_with("<w:p>") || rest.starts_with("</w:p>") {
            out.push('\n');
        }
    }

    out
}

fn extract_txt(filename: &str, bytes: &[u8]) -> Result<Vec<ExtractedPage>> {
    let text = String::from_utf8(bytes.to_vec()).map_err(|e| IngestError::ExtractFailed {
        filename: filename.to_string(),
        reason: e.to_string(),
    })?;
    Ok(vec![ExtractedPage { page: None, text }])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_pdf_by_magic_bytes() {
        let bytes = b"%PDF-1.7 rest of file";
        assert_eq!(detect_file_kind("doc.pdf", bytes).unwrap(), FileKind::Pdf);
    }

    #[test]
    fn detects_docx_by_zip_magic_bytes() {
        let bytes = b"PK\x03\x04 rest of zip";
        assert_eq!(detect_file_kind("doc.docx", bytes).unwrap(), FileKind::Docx);
    }

    #[test]
    fn falls_back_to_txt_for_plain_utf8() {
        let bytes = "hello world".as_bytes();
        assert_eq!(detect_file_kind("notes.txt", bytes).unwrap(), FileKind::Txt);
    }

    #[test]
    fn rejects_unrecognised_binary() {
        let bytes: &[u8] = &[0xff, 0xfe, 0x00, 0x01, 0x02];
        assert!(detect_file_kind("mystery.bin", bytes).is_err());
    }

    #[test]
    fn strip_docx_xml_keeps_run_text_and_breaks_paragraphs() {
        let xml = r#"<w:p><w:r><w:t>Hello</w:t></w:r></w:p><w:p><w:r><w:t>World</w:t></w:r></w:p>"#;
        let text = strip_docx_xml(xml);
        assert!(text.contains("Hello"));
        assert!(text.contains("World"));
        assert!(text.trim().lines().count() >= 2);
    }

    #[test]
    fn extract_txt_rejects_empty_document() {
        let err = extract_text("empty.txt", FileKind::Txt, b"   \n\t  ").unwrap_err();
        assert!(matches!(err, IngestError::EmptyDocument { .. }));
    }
}
