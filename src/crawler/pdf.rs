//! PDF text extraction
//!
//! Text comes out page by page in page order with no attempt at keeping
//! layout. Encrypted, unreadable and page-less documents are extraction
//! failures for the crawl to record.

use lopdf::Document;
use tracing::{debug, warn};

use crate::crawler::content_extraction::tidy_whitespace;
use crate::crawler::error::CrawlError;

/// Extract plain text from PDF bytes
pub fn extract_text(bytes: &[u8]) -> Result<String, CrawlError> {
    let doc = Document::load_mem(bytes)
        .map_err(|e| CrawlError::Extraction(format!("unreadable PDF: {}", e)))?;

    if doc.is_encrypted() {
        return Err(CrawlError::Extraction("PDF is encrypted".to_string()));
    }

    // BTreeMap keys, so already in page order
    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    if pages.is_empty() {
        return Err(CrawlError::Extraction("PDF has no pages".to_string()));
    }

    let mut page_texts = Vec::with_capacity(pages.len());
    for page in &pages {
        match doc.extract_text(&[*page]) {
            Ok(text) => {
                let text = tidy_whitespace(&text);
                if !text.is_empty() {
                    page_texts.push(text);
                }
            }
            Err(e) => warn!(page, error = %e, "Skipping unreadable PDF page"),
        }
    }

    if page_texts.is_empty() {
        return Err(CrawlError::Extraction(
            "PDF contains no extractable text".to_string(),
        ));
    }

    let text = page_texts.join("\n\n");
    debug!(pages = pages.len(), chars = text.len(), "Extracted PDF text");
    Ok(text)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::{Object, Stream, dictionary};

    fn escape(text: &str) -> String {
        text.replace('\\', "\\\\")
            .replace('(', "\\(")
            .replace(')', "\\)")
    }

    /// Build a PDF with one page per entry of `page_texts`
    pub(crate) fn build_pdf(page_texts: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.4");

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut page_ids = Vec::new();
        for text in page_texts {
            let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", escape(text));
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => resources_id,
                "Contents" => content_id,
            });
            page_ids.push(page_id);
        }

        let kids: Vec<Object> = page_ids.iter().map(|&id| id.into()).collect();
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(page_texts.len() as i64),
        });
        for page_id in &page_ids {
            if let Ok(Object::Dictionary(dict)) = doc.get_object_mut(*page_id) {
                dict.set("Parent", pages_id);
            }
        }

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn test_single_page() {
        let bytes = build_pdf(&["Hello World"]);
        let text = extract_text(&bytes).unwrap();
        assert!(text.contains("Hello"), "got: {:?}", text);
    }

    #[test]
    fn test_pages_in_order() {
        let bytes = build_pdf(&["Alpha page", "Bravo page", "Charlie page"]);
        let text = extract_text(&bytes).unwrap();

        let alpha = text.find("Alpha").unwrap();
        let bravo = text.find("Bravo").unwrap();
        let charlie = text.find("Charlie").unwrap();
        assert!(alpha < bravo && bravo < charlie, "got: {:?}", text);
    }

    #[test]
    fn test_zero_pages() {
        let bytes = build_pdf(&[]);
        let err = extract_text(&bytes).unwrap_err();
        assert!(err.to_string().contains("no pages"), "got: {}", err);
    }

    #[test]
    fn test_corrupted() {
        let err = extract_text(b"this is not a pdf").unwrap_err();
        assert!(matches!(err, CrawlError::Extraction(_)));

        let err = extract_text(&[]).unwrap_err();
        assert!(matches!(err, CrawlError::Extraction(_)));
    }

    #[test]
    fn test_blank_page_has_no_text() {
        let bytes = build_pdf(&[""]);
        let err = extract_text(&bytes).unwrap_err();
        assert!(matches!(err, CrawlError::Extraction(_)));
    }
}
