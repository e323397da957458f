//! Combined-document composition.
//!
//! Every unit in the archive gets a combined PDF: a metadata page, the email
//! body rendered as text, and — for image and PDF attachments — a preview
//! page. Preview failures degrade the document instead of failing it; only
//! a failure to produce any PDF at all bubbles up.

pub mod document;
pub mod record;
pub mod splice;
pub mod text;

use humansize::{format_size, BINARY};
use thiserror::Error;

use crate::model::{ResolvedAttachment, SelectedItem};

use self::document::{Line, PdfBuilder, WRAP_COLS};
use self::splice::PdfSplicer;
use self::text::{html_to_text, wrap_text};

/// Errors that abort composition of one combined document.
#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("pdf build error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("image decode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("pdf serialization error: {0}")]
    Io(#[from] std::io::Error),
}

/// What happened to the preview page of a combined document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewOutcome {
    /// No attachment, or an attachment type that never gets a preview.
    NotApplicable,
    /// Image rendered onto its own page.
    ImageEmbedded,
    /// Image failed to decode; a notice page took its place.
    ImageFallback,
    /// First page of the source PDF copied in.
    PdfSpliced,
    /// Source PDF could not be spliced; the document went out without it.
    PdfSkipped,
}

/// A finished combined document.
pub struct ComposedPdf {
    pub bytes: Vec<u8>,
    pub preview: PreviewOutcome,
}

/// Compose the combined PDF for one unit.
///
/// `target` is the attachment this unit is about (`None` for the
/// no-attachment unit). Image decode and PDF splice failures are logged and
/// degrade the output; they never fail the call.
pub fn compose_combined_pdf(
    item: &SelectedItem,
    entity_name: &str,
    target: Option<&ResolvedAttachment>,
    splicer: &dyn PdfSplicer,
) -> Result<ComposedPdf, ComposeError> {
    let mut builder = PdfBuilder::new();
    builder.add_text_pages(&metadata_lines(item, entity_name, target))?;
    builder.add_text_pages(&body_lines(item))?;

    let mut preview = PreviewOutcome::NotApplicable;
    if let Some(att) = target {
        if att.is_image {
            let caption = format!("Image: {}", att.meta.filename);
            match builder.add_image_page(&att.bytes, &caption) {
                Ok(()) => preview = PreviewOutcome::ImageEmbedded,
                Err(err) => {
                    tracing::warn!(
                        filename = %att.meta.filename,
                        error = %err,
                        "Failed to render image preview, adding notice page"
                    );
                    builder.add_text_pages(&preview_notice_lines(&att.meta.filename, &err))?;
                    preview = PreviewOutcome::ImageFallback;
                }
            }
        } else if att.is_pdf {
            match builder.append_pdf_preview(splicer, &att.bytes, &att.meta.filename) {
                Ok(_) => preview = PreviewOutcome::PdfSpliced,
                Err(err) => {
                    tracing::warn!(
                        filename = %att.meta.filename,
                        error = %err,
                        "Skipping PDF preview page"
                    );
                    preview = PreviewOutcome::PdfSkipped;
                }
            }
        }
    }

    Ok(ComposedPdf {
        bytes: builder.finish()?,
        preview,
    })
}

/// Plain-text body of an item: `bodyText` when non-empty, otherwise the HTML
/// body with markup stripped, otherwise empty.
pub fn effective_body_text(item: &SelectedItem) -> String {
    if let Some(text) = item.body_text.as_deref() {
        if !text.trim().is_empty() {
            return text.to_string();
        }
    }
    match item.body_html.as_deref() {
        Some(html) if !html.trim().is_empty() => html_to_text(html),
        _ => String::new(),
    }
}

/// The metadata page: headers, entity, and the attachment manifest with the
/// unit's own attachment marked.
fn metadata_lines(
    item: &SelectedItem,
    entity_name: &str,
    target: Option<&ResolvedAttachment>,
) -> Vec<Line> {
    let subject = if item.subject.trim().is_empty() {
        "(no subject)"
    } else {
        item.subject.trim()
    };

    let mut lines = vec![Line::Heading(subject.to_string()), Line::Blank];
    push_field(&mut lines, "From", &item.from);
    push_field(&mut lines, "To", &item.to);
    push_field(&mut lines, "Cc", &item.cc);
    push_field(&mut lines, "Date", &item.date);
    push_field(&mut lines, "Entity", entity_name);
    push_field(&mut lines, "Message-Id", &item.message_id);

    if !item.attachments.is_empty() {
        lines.push(Line::Blank);
        lines.push(Line::Heading("Attachments".to_string()));
        for att in &item.attachments {
            let marker = match target {
                Some(t) if t.meta.id == att.id => "[this file]",
                _ => "[separate file]",
            };
            let entry = format!(
                "- {} ({}, {}) {}",
                att.filename,
                att.mime_type,
                format_size(att.size, BINARY),
                marker
            );
            for wrapped in wrap_text(&entry, WRAP_COLS) {
                lines.push(Line::Text(wrapped));
            }
        }
    }
    lines
}

fn push_field(lines: &mut Vec<Line>, label: &str, value: &str) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }
    for wrapped in wrap_text(&format!("{label}: {value}"), WRAP_COLS) {
        lines.push(Line::Text(wrapped));
    }
}

/// The body pages. Always at least one line so the body section is visible.
fn body_lines(item: &SelectedItem) -> Vec<Line> {
    let body = effective_body_text(item);
    let mut lines = vec![Line::Heading("Body".to_string()), Line::Blank];
    if body.trim().is_empty() {
        lines.push(Line::Text("(no body content)".to_string()));
        return lines;
    }
    for wrapped in wrap_text(&body, WRAP_COLS) {
        lines.push(Line::Text(wrapped));
    }
    lines
}

fn preview_notice_lines(filename: &str, err: &ComposeError) -> Vec<Line> {
    vec![
        Line::Heading("Attachment preview unavailable".to_string()),
        Line::Blank,
        Line::Text(format!("File: {filename}")),
        Line::Text(format!("Reason: {err}")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttachmentRef;
    use super::splice::{LopdfSplicer, SpliceError};

    struct FailingSplicer;

    impl PdfSplicer for FailingSplicer {
        fn load_first_page(&self, _: &[u8]) -> Result<splice::PdfPreview, SpliceError> {
            Err(SpliceError::NoPages)
        }

        fn append_page(
            &self,
            _: &mut lopdf::Document,
            _: lopdf::ObjectId,
            _: splice::PdfPreview,
            _: &str,
        ) -> Result<lopdf::ObjectId, SpliceError> {
            Err(SpliceError::NoPages)
        }
    }

    fn item() -> SelectedItem {
        SelectedItem {
            message_id: "m1".into(),
            account_ref: "acct".into(),
            subject: "Invoice March".into(),
            from: "Acme Billing <billing@acme.com>".into(),
            to: "me@corp.com".into(),
            cc: String::new(),
            date: "Fri, 15 Mar 2024 09:30:00 +0100".into(),
            body_text: Some("Please find the invoice attached.".into()),
            body_html: None,
            entity_name: None,
            attachments: vec![AttachmentRef {
                id: "a1".into(),
                filename: "invoice.pdf".into(),
                mime_type: "application/pdf".into(),
                size: 1234,
            }],
        }
    }

    #[test]
    fn test_effective_body_prefers_text() {
        let mut it = item();
        it.body_html = Some("<p>html body</p>".into());
        assert_eq!(effective_body_text(&it), "Please find the invoice attached.");
    }

    #[test]
    fn test_effective_body_falls_back_to_html() {
        let mut it = item();
        it.body_text = Some("   ".into());
        it.body_html = Some("<p>html body</p>".into());
        assert_eq!(effective_body_text(&it), "html body");
    }

    #[test]
    fn test_compose_without_attachment() {
        let composed =
            compose_combined_pdf(&item(), "Acme Corp", None, &LopdfSplicer).unwrap();
        assert_eq!(composed.preview, PreviewOutcome::NotApplicable);

        let doc = lopdf::Document::load_mem(&composed.bytes).unwrap();
        let pages = doc.get_pages().len() as u32;
        let all: Vec<u32> = (1..=pages).collect();
        let text = doc.extract_text(&all).unwrap();
        assert!(text.contains("Invoice March"));
        assert!(text.contains("Acme Corp"));
        assert!(text.contains("invoice attached"));
        // Manifest lists the attachment even though none is linked.
        assert!(text.contains("invoice.pdf"));
    }

    #[test]
    fn test_compose_error_wraps_io() {
        let err: ComposeError = std::io::Error::other("sink gone").into();
        assert!(matches!(err, ComposeError::Io(_)));
    }

    #[test]
    fn test_manifest_marks_target_and_sibling_attachments() {
        let mut it = item();
        it.attachments.push(AttachmentRef {
            id: "a2".into(),
            filename: "data.xlsx".into(),
            mime_type: "application/vnd.ms-excel".into(),
            size: 99,
        });
        let att = ResolvedAttachment::new(it.attachments[0].clone(), b"broken".to_vec());
        let composed = compose_combined_pdf(&it, "Acme Corp", Some(&att), &LopdfSplicer).unwrap();

        let doc = lopdf::Document::load_mem(&composed.bytes).unwrap();
        let pages: Vec<u32> = (1..=doc.get_pages().len() as u32).collect();
        let text = doc.extract_text(&pages).unwrap();
        let invoice_row = text
            .lines()
            .find(|line| line.contains("invoice.pdf"))
            .expect("manifest row for invoice.pdf");
        assert!(invoice_row.contains("[this file]"));
        let xlsx_row = text
            .lines()
            .find(|line| line.contains("data.xlsx"))
            .expect("manifest row for data.xlsx");
        assert!(xlsx_row.contains("[separate file]"));
    }

    #[test]
    fn test_compose_with_broken_pdf_attachment_degrades() {
        let it = item();
        let att = ResolvedAttachment::new(it.attachments[0].clone(), b"broken".to_vec());
        let composed = compose_combined_pdf(&it, "Acme Corp", Some(&att), &LopdfSplicer).unwrap();
        assert_eq!(composed.preview, PreviewOutcome::PdfSkipped);
        assert!(lopdf::Document::load_mem(&composed.bytes).is_ok());
    }

    #[test]
    fn test_compose_with_failing_splicer() {
        let it = item();
        let att = ResolvedAttachment::new(it.attachments[0].clone(), b"whatever".to_vec());
        let composed =
            compose_combined_pdf(&it, "Acme Corp", Some(&att), &FailingSplicer).unwrap();
        assert_eq!(composed.preview, PreviewOutcome::PdfSkipped);
    }

    #[test]
    fn test_compose_with_broken_image_adds_notice() {
        let mut it = item();
        it.attachments[0].filename = "photo.png".into();
        it.attachments[0].mime_type = "image/png".into();
        let att = ResolvedAttachment::new(it.attachments[0].clone(), b"not a png".to_vec());
        let composed = compose_combined_pdf(&it, "Acme Corp", Some(&att), &LopdfSplicer).unwrap();
        assert_eq!(composed.preview, PreviewOutcome::ImageFallback);

        let doc = lopdf::Document::load_mem(&composed.bytes).unwrap();
        let pages = doc.get_pages().len() as u32;
        let all: Vec<u32> = (1..=pages).collect();
        let text = doc.extract_text(&all).unwrap();
        assert!(text.contains("preview unavailable"));
    }
}
