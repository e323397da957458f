//! PDF document construction for combined documents.
//!
//! [`PdfBuilder`] produces an A4 document from text pages, image pages and
//! spliced-in source pages. Text is rendered with the base-14 Helvetica
//! fonts so no font files need embedding.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use super::splice::{PdfSplicer, SpliceError};
use super::ComposeError;

/// A4 portrait, in points.
pub const PAGE_WIDTH: f32 = 595.0;
pub const PAGE_HEIGHT: f32 = 842.0;

const MARGIN: f32 = 54.0;
const LEADING: f32 = 14.0;
const HEADING_SIZE: f32 = 13.0;
const BODY_SIZE: f32 = 10.0;

/// Lines of body text that fit between the margins at [`LEADING`].
pub const LINES_PER_PAGE: usize = 50;
/// Column width used when wrapping body text for these pages.
pub const WRAP_COLS: usize = 94;

/// One rendered line on a text page.
#[derive(Debug, Clone)]
pub enum Line {
    /// Bold, slightly larger.
    Heading(String),
    /// Regular body text.
    Text(String),
    Blank,
}

/// Incrementally builds the combined PDF, page by page.
pub struct PdfBuilder {
    doc: Document,
    pages_id: ObjectId,
    text_resources: Object,
    font_regular: ObjectId,
    page_ids: Vec<ObjectId>,
}

impl PdfBuilder {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_regular = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let font_bold = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_regular,
                "F2" => font_bold,
            },
        });
        Self {
            doc,
            pages_id,
            text_resources: Object::Reference(resources_id),
            font_regular,
            page_ids: Vec::new(),
        }
    }

    /// Render `lines` across as many pages as needed. Each call starts on a
    /// fresh page.
    pub fn add_text_pages(&mut self, lines: &[Line]) -> Result<(), ComposeError> {
        if lines.is_empty() {
            return Ok(());
        }
        for chunk in lines.chunks(LINES_PER_PAGE) {
            self.add_text_page(chunk)?;
        }
        Ok(())
    }

    fn add_text_page(&mut self, lines: &[Line]) -> Result<(), ComposeError> {
        let mut operations = Vec::with_capacity(lines.len() * 2 + 4);
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new(
            "Tf",
            vec!["F1".into(), BODY_SIZE.into()],
        ));
        operations.push(Operation::new(
            "Td",
            vec![MARGIN.into(), (PAGE_HEIGHT - MARGIN).into()],
        ));

        // Track the active font so Tf is only emitted on changes.
        let mut active = ("F1", BODY_SIZE);
        for line in lines {
            let (font, size, text) = match line {
                Line::Heading(text) => ("F2", HEADING_SIZE, text.as_str()),
                Line::Text(text) => ("F1", BODY_SIZE, text.as_str()),
                Line::Blank => {
                    operations.push(Operation::new("Td", vec![0.into(), (-LEADING).into()]));
                    continue;
                }
            };
            if active != (font, size) {
                operations.push(Operation::new("Tf", vec![font.into(), size.into()]));
                active = (font, size);
            }
            operations.push(Operation::new(
                "Tj",
                vec![Object::string_literal(encode_winansi(text))],
            ));
            operations.push(Operation::new("Td", vec![0.into(), (-LEADING).into()]));
        }
        operations.push(Operation::new("ET", vec![]));

        let resources = self.text_resources.clone();
        self.push_page(Content { operations }, resources)
    }

    /// Render an image attachment on its own page, scaled to fit inside the
    /// margins and centered, with a caption along the bottom margin.
    pub fn add_image_page(&mut self, bytes: &[u8], caption: &str) -> Result<(), ComposeError> {
        let (xobject, px_width, px_height) = image_xobject(bytes)?;
        let xobject_id = self.doc.add_object(xobject);

        let max_width = PAGE_WIDTH - 2.0 * MARGIN;
        let max_height = PAGE_HEIGHT - 2.0 * MARGIN - 30.0;
        let scale = (max_width / px_width)
            .min(max_height / px_height)
            .min(1.0);
        let draw_width = px_width * scale;
        let draw_height = px_height * scale;
        let x = (PAGE_WIDTH - draw_width) / 2.0;
        let y = (PAGE_HEIGHT - draw_height) / 2.0;

        let operations = vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    draw_width.into(),
                    0.into(),
                    0.into(),
                    draw_height.into(),
                    x.into(),
                    y.into(),
                ],
            ),
            Operation::new("Do", vec!["Im0".into()]),
            Operation::new("Q", vec![]),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 9.into()]),
            Operation::new("Td", vec![MARGIN.into(), 30.into()]),
            Operation::new("Tj", vec![Object::string_literal(encode_winansi(caption))]),
            Operation::new("ET", vec![]),
        ];

        let resources = Object::Dictionary(dictionary! {
            "Font" => dictionary! { "F1" => self.font_regular },
            "XObject" => dictionary! { "Im0" => xobject_id },
        });
        self.push_page(Content { operations }, resources)
    }

    /// Splice the first page of a source PDF into this document. Returns the
    /// source's total page count.
    pub fn append_pdf_preview(
        &mut self,
        splicer: &dyn PdfSplicer,
        bytes: &[u8],
        filename: &str,
    ) -> Result<usize, SpliceError> {
        let preview = splicer.load_first_page(bytes)?;
        let total = preview.page_count;
        let caption = format!("Preview: {filename} (page 1 of {total})");
        let page_id = splicer.append_page(&mut self.doc, self.pages_id, preview, &caption)?;
        self.page_ids.push(page_id);
        Ok(total)
    }

    fn push_page(&mut self, content: Content, resources: Object) -> Result<(), ComposeError> {
        let data = content.encode()?;
        let content_id = self.doc.add_object(Stream::new(Dictionary::new(), data));
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Contents" => content_id,
            "Resources" => resources,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        });
        self.page_ids.push(page_id);
        Ok(())
    }

    /// Close the page tree and serialize the document.
    pub fn finish(mut self) -> Result<Vec<u8>, ComposeError> {
        if self.page_ids.is_empty() {
            self.add_text_page(&[Line::Text("(empty document)".to_string())])?;
        }
        let kids: Vec<Object> = self
            .page_ids
            .iter()
            .map(|id| Object::Reference(*id))
            .collect();
        let count = self.page_ids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.compress();

        let mut out = Vec::new();
        self.doc.save_to(&mut out)?;
        Ok(out)
    }
}

impl Default for PdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Build an image XObject from attachment bytes.
///
/// RGB JPEGs pass through as DCTDecode streams; everything else is decoded
/// and re-encoded as raw RGB (flate-compressed when the document is saved).
fn image_xobject(bytes: &[u8]) -> Result<(Stream, f32, f32), ComposeError> {
    let img = image::load_from_memory(bytes)?;
    let (width, height) = (img.width(), img.height());

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "BitsPerComponent" => 8,
        "ColorSpace" => "DeviceRGB",
    };

    let jpeg_passthrough = matches!(
        image::guess_format(bytes),
        Ok(image::ImageFormat::Jpeg)
    ) && img.color() == image::ColorType::Rgb8;

    let stream = if jpeg_passthrough {
        dict.set("Filter", "DCTDecode");
        let mut stream = Stream::new(dict, bytes.to_vec());
        stream.allows_compression = false;
        stream
    } else {
        Stream::new(dict, img.to_rgb8().into_raw())
    };
    Ok((stream, width as f32, height as f32))
}

/// Map text to WinAnsi bytes; characters WinAnsi cannot represent degrade
/// to `?`. The C1 range U+0080–U+009F is excluded — CP1252 assigns those
/// byte values to different glyphs.
pub(crate) fn encode_winansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|ch| {
            let cp = ch as u32;
            if (0x20..=0x7E).contains(&cp) || (0xA0..=0xFF).contains(&cp) {
                cp as u8
            } else if ch == '\t' {
                b' '
            } else {
                b'?'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::Document;

    #[test]
    fn test_encode_winansi() {
        assert_eq!(encode_winansi("abc"), b"abc");
        assert_eq!(encode_winansi("caf\u{e9}"), b"caf\xe9");
        assert_eq!(encode_winansi("\u{4e16}x"), b"?x");
        // C1 controls do not map to the same CP1252 byte values.
        assert_eq!(encode_winansi("\u{80}\u{9f}"), b"??");
        assert_eq!(encode_winansi("\u{7f}"), b"?");
    }

    #[test]
    fn test_text_pages_paginate() {
        let mut builder = PdfBuilder::new();
        let lines: Vec<Line> = (0..LINES_PER_PAGE + 1)
            .map(|i| Line::Text(format!("line {i}")))
            .collect();
        builder.add_text_pages(&lines).unwrap();
        let bytes = builder.finish().unwrap();

        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
    }

    #[test]
    fn test_finished_document_has_extractable_text() {
        let mut builder = PdfBuilder::new();
        builder
            .add_text_pages(&[
                Line::Heading("Invoice March".to_string()),
                Line::Blank,
                Line::Text("From: billing@acme.com".to_string()),
            ])
            .unwrap();
        let bytes = builder.finish().unwrap();

        let doc = Document::load_mem(&bytes).unwrap();
        let text = doc.extract_text(&[1]).unwrap();
        assert!(text.contains("Invoice March"));
        assert!(text.contains("billing@acme.com"));
    }

    #[test]
    fn test_image_page_from_png() {
        let mut png = Vec::new();
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([200, 10, 10]));
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let mut builder = PdfBuilder::new();
        builder.add_image_page(&png, "Image: photo.png").unwrap();
        let bytes = builder.finish().unwrap();

        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_image_page_rejects_garbage() {
        let mut builder = PdfBuilder::new();
        let err = builder.add_image_page(b"not an image", "x").unwrap_err();
        assert!(matches!(err, ComposeError::Image(_)));
    }

    #[test]
    fn test_empty_document_still_valid() {
        let bytes = PdfBuilder::new().finish().unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }
}
