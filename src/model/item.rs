//! Selected-item and attachment types.
//!
//! A [`SelectedItem`] is one email the caller picked for export, already
//! resolved by the upstream search layer (headers, bodies, attachment
//! metadata). Attachment bytes are NOT part of the input — they are fetched
//! lazily, once per attachment, during archive assembly.

use serde::{Deserialize, Serialize};

/// MIME types embeddable as a raster-image preview page.
pub const IMAGE_MIME_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/bmp",
    "image/webp",
];

/// One email selected for export. Immutable for the duration of a build.
///
/// Field names follow the upstream search layer's JSON (camelCase).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedItem {
    /// Provider message id (opaque).
    pub message_id: String,
    /// Opaque reference to the mailbox/account the message lives in.
    pub account_ref: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub cc: String,
    /// Original `Date:` header value, unparsed.
    #[serde(default)]
    pub date: String,
    /// Plain-text body, if the message had one.
    #[serde(default)]
    pub body_text: Option<String>,
    /// HTML body, if the message had one.
    #[serde(default)]
    pub body_html: Option<String>,
    /// Entity name resolved upstream, if any. `None` means "run the matcher".
    #[serde(default)]
    pub entity_name: Option<String>,
    /// Attachment pointers, in the order the message carries them.
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
}

/// Pointer to one attachment. Raw bytes are fetched on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRef {
    /// Provider attachment id (opaque).
    pub id: String,
    pub filename: String,
    pub mime_type: String,
    /// Size in bytes as reported by the provider.
    pub size: u64,
}

impl AttachmentRef {
    /// Whether this attachment gets a preview page in its combined PDF.
    pub fn is_previewable(&self) -> bool {
        is_image_mime(&self.mime_type) || is_pdf_mime(&self.mime_type)
    }
}

/// An attachment with its bytes fetched, owned by one item's processing.
#[derive(Debug, Clone)]
pub struct ResolvedAttachment {
    pub meta: AttachmentRef,
    pub bytes: Vec<u8>,
    pub is_image: bool,
    pub is_pdf: bool,
}

impl ResolvedAttachment {
    /// Classify an attachment from its MIME type and fetched bytes.
    pub fn new(meta: AttachmentRef, bytes: Vec<u8>) -> Self {
        let is_image = is_image_mime(&meta.mime_type);
        let is_pdf = is_pdf_mime(&meta.mime_type);
        Self {
            meta,
            bytes,
            is_image,
            is_pdf,
        }
    }
}

/// True for MIME types on the raster-image allow-list.
pub fn is_image_mime(mime: &str) -> bool {
    let mime = mime
        .split(';')
        .next()
        .unwrap_or(mime)
        .trim()
        .to_ascii_lowercase();
    IMAGE_MIME_TYPES.contains(&mime.as_str())
}

/// True for `application/pdf` (parameters ignored).
pub fn is_pdf_mime(mime: &str) -> bool {
    mime.split(';')
        .next()
        .unwrap_or(mime)
        .trim()
        .eq_ignore_ascii_case("application/pdf")
}
