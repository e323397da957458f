//! First-page splicing from source PDF attachments.
//!
//! The combined document for a PDF attachment carries the source's first
//! page verbatim, with a caption bar overlaid at the bottom. The page-copy
//! primitive is kept behind the narrow [`PdfSplicer`] trait so the
//! composition algorithm stays library-agnostic and the failure path can be
//! exercised with a fake.

use std::collections::BTreeMap;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use thiserror::Error;

use super::document::encode_winansi;

/// Height of the caption bar drawn over the copied page, in points.
const CAPTION_BAR_HEIGHT: f32 = 24.0;
const CAPTION_FONT_SIZE: f32 = 9.0;

/// Guard against pathological object graphs during the deep copy.
const MAX_IMPORT_DEPTH: usize = 128;

/// Errors raised while loading or copying a source PDF page.
///
/// All of these are tolerated by the composer: the combined document is
/// produced without the preview page and the failure is logged.
#[derive(Error, Debug)]
pub enum SpliceError {
    #[error("source pdf is encrypted")]
    Encrypted,

    #[error("source pdf has no pages")]
    NoPages,

    #[error("pdf parse error: {0}")]
    Parse(#[from] lopdf::Error),

    #[error("malformed page tree: {0}")]
    Malformed(String),
}

/// A parsed source PDF positioned on its first page.
#[derive(Debug)]
pub struct PdfPreview {
    source: Document,
    first_page: ObjectId,
    /// Total page count of the source, for the caption text.
    pub page_count: usize,
}

/// Capability interface for copying one source page into a target document.
pub trait PdfSplicer: Send + Sync {
    /// Parse source bytes and locate the first page.
    fn load_first_page(&self, bytes: &[u8]) -> Result<PdfPreview, SpliceError>;

    /// Deep-copy the preview's page into `target` under the `parent` pages
    /// node, overlay `caption` at the bottom, and return the new page id.
    /// The caller is responsible for adding the id to the page tree's kids.
    fn append_page(
        &self,
        target: &mut Document,
        parent: ObjectId,
        preview: PdfPreview,
        caption: &str,
    ) -> Result<ObjectId, SpliceError>;
}

/// The lopdf-backed splicer used in production.
pub struct LopdfSplicer;

impl PdfSplicer for LopdfSplicer {
    fn load_first_page(&self, bytes: &[u8]) -> Result<PdfPreview, SpliceError> {
        let source = Document::load_mem(bytes)?;
        if source.trailer.has(b"Encrypt") {
            return Err(SpliceError::Encrypted);
        }
        let pages = source.get_pages();
        let page_count = pages.len();
        let first_page = pages.values().next().copied().ok_or(SpliceError::NoPages)?;
        Ok(PdfPreview {
            source,
            first_page,
            page_count,
        })
    }

    fn append_page(
        &self,
        target: &mut Document,
        parent: ObjectId,
        preview: PdfPreview,
        caption: &str,
    ) -> Result<ObjectId, SpliceError> {
        let PdfPreview {
            source, first_page, ..
        } = preview;

        // Resolve inheritable attributes before detaching the page from its
        // tree — they may live on an ancestor Pages node.
        let media_box = inherited_attr(&source, first_page, b"MediaBox").unwrap_or_else(|| {
            Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()])
        });
        let resources = inherited_attr(&source, first_page, b"Resources")
            .unwrap_or_else(|| Object::Dictionary(Dictionary::new()));
        let rotate = inherited_attr(&source, first_page, b"Rotate");

        let mut page_dict = source
            .get_object(first_page)
            .and_then(Object::as_dict)
            .map_err(SpliceError::Parse)?
            .clone();

        // Parent would drag the entire source page tree along; annotations
        // may reference destinations outside the copied page.
        for key in [&b"Parent"[..], b"Annots", b"StructParents", b"B", b"Tabs"] {
            page_dict.remove(key);
        }
        page_dict.set("MediaBox", media_box.clone());
        page_dict.set("Resources", resources);
        if let Some(rotate) = rotate {
            page_dict.set("Rotate", rotate);
        }

        let mut id_map = BTreeMap::new();
        let imported = import_value(target, &source, Object::Dictionary(page_dict), &mut id_map, 0)?;
        let Object::Dictionary(mut new_page) = imported else {
            return Err(SpliceError::Malformed("page is not a dictionary".into()));
        };
        new_page.set("Type", "Page");
        new_page.set("Parent", parent);

        overlay_caption(target, &mut new_page, &media_box, caption)?;

        Ok(target.add_object(Object::Dictionary(new_page)))
    }
}

/// Walk the Parent chain for an inheritable page attribute, resolving one
/// level of indirection.
fn inherited_attr(doc: &Document, page: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = page;
    for _ in 0..MAX_IMPORT_DEPTH {
        let dict = doc.get_object(current).ok()?.as_dict().ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(match value {
                Object::Reference(id) => doc.get_object(*id).ok()?.clone(),
                other => other.clone(),
            });
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(id)) => current = *id,
            _ => return None,
        }
    }
    None
}

/// Copy an object id from `source` into `target`, remapping every reference
/// it carries. The map doubles as the cycle breaker.
fn import_object(
    target: &mut Document,
    source: &Document,
    id: ObjectId,
    id_map: &mut BTreeMap<ObjectId, ObjectId>,
    depth: usize,
) -> Result<ObjectId, SpliceError> {
    if let Some(&mapped) = id_map.get(&id) {
        return Ok(mapped);
    }
    let new_id = target.new_object_id();
    id_map.insert(id, new_id);

    // Dangling references degrade to Null rather than failing the splice.
    let object = match source.get_object(id) {
        Ok(object) => object.clone(),
        Err(_) => Object::Null,
    };
    let rewritten = import_value(target, source, object, id_map, depth + 1)?;
    target.objects.insert(new_id, rewritten);
    Ok(new_id)
}

fn import_value(
    target: &mut Document,
    source: &Document,
    object: Object,
    id_map: &mut BTreeMap<ObjectId, ObjectId>,
    depth: usize,
) -> Result<Object, SpliceError> {
    if depth > MAX_IMPORT_DEPTH {
        return Err(SpliceError::Malformed("object graph too deep".into()));
    }
    Ok(match object {
        Object::Reference(id) => {
            Object::Reference(import_object(target, source, id, id_map, depth + 1)?)
        }
        Object::Array(items) => Object::Array(
            items
                .into_iter()
                .map(|item| import_value(target, source, item, id_map, depth + 1))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Object::Dictionary(dict) => {
            Object::Dictionary(import_dict(target, source, dict, id_map, depth)?)
        }
        Object::Stream(mut stream) => {
            stream.dict = import_dict(target, source, stream.dict.clone(), id_map, depth)?;
            Object::Stream(stream)
        }
        other => other,
    })
}

fn import_dict(
    target: &mut Document,
    source: &Document,
    dict: Dictionary,
    id_map: &mut BTreeMap<ObjectId, ObjectId>,
    depth: usize,
) -> Result<Dictionary, SpliceError> {
    let mut out = Dictionary::new();
    for (key, value) in dict.iter() {
        out.set(
            key.clone(),
            import_value(target, source, value.clone(), id_map, depth + 1)?,
        );
    }
    Ok(out)
}

/// Draw the caption bar over the copied page.
///
/// The page's original content is wrapped in `q`/`Q` so leaked graphics
/// state cannot affect the caption, then a filled bar and the caption text
/// are appended as a trailing content stream.
fn overlay_caption(
    target: &mut Document,
    page: &mut Dictionary,
    media_box: &Object,
    caption: &str,
) -> Result<(), SpliceError> {
    let [x0, y0, x1, _y1] = rect_values(media_box);
    let width = x1 - x0;

    let font_id = target.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let font_name = inject_caption_font(target, page, font_id)?;

    let operations = vec![
        Operation::new("Q", vec![]),
        Operation::new("q", vec![]),
        Operation::new("g", vec![0.92f32.into()]),
        Operation::new(
            "re",
            vec![x0.into(), y0.into(), width.into(), CAPTION_BAR_HEIGHT.into()],
        ),
        Operation::new("f", vec![]),
        Operation::new("g", vec![0.0f32.into()]),
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![font_name.as_str().into(), CAPTION_FONT_SIZE.into()],
        ),
        Operation::new("Td", vec![(x0 + 8.0).into(), (y0 + 8.0).into()]),
        Operation::new("Tj", vec![Object::string_literal(encode_winansi(caption))]),
        Operation::new("ET", vec![]),
        Operation::new("Q", vec![]),
    ];
    let caption_bytes = Content { operations }.encode()?;

    let prefix_id = target.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let caption_id = target.add_object(Stream::new(Dictionary::new(), caption_bytes));

    let mut contents: Vec<Object> = match page.remove(b"Contents") {
        Some(Object::Reference(id)) => vec![Object::Reference(id)],
        Some(Object::Array(items)) => items,
        Some(other) => {
            let id = target.add_object(other);
            vec![Object::Reference(id)]
        }
        None => Vec::new(),
    };
    contents.insert(0, prefix_id.into());
    contents.push(caption_id.into());
    page.set("Contents", Object::Array(contents));
    Ok(())
}

/// Add the caption font to the page's Font resources under a name that does
/// not collide with the copied resources.
fn inject_caption_font(
    target: &mut Document,
    page: &mut Dictionary,
    font_id: ObjectId,
) -> Result<String, SpliceError> {
    let mut resources = match page.remove(b"Resources") {
        Some(Object::Dictionary(dict)) => dict,
        Some(Object::Reference(id)) => target
            .get_object(id)
            .and_then(Object::as_dict)
            .map_err(SpliceError::Parse)?
            .clone(),
        _ => Dictionary::new(),
    };
    let mut fonts = match resources.remove(b"Font") {
        Some(Object::Dictionary(dict)) => dict,
        Some(Object::Reference(id)) => target
            .get_object(id)
            .and_then(Object::as_dict)
            .map_err(SpliceError::Parse)?
            .clone(),
        _ => Dictionary::new(),
    };

    let mut name = "FCap".to_string();
    let mut n = 0u32;
    while fonts.has(name.as_bytes()) {
        n += 1;
        name = format!("FCap{n}");
    }
    fonts.set(name.clone(), font_id);
    resources.set("Font", Object::Dictionary(fonts));
    page.set("Resources", Object::Dictionary(resources));
    Ok(name)
}

/// Extract `[x0, y0, x1, y1]` from a MediaBox-style array, defaulting to
/// US Letter when values are missing or non-numeric.
fn rect_values(media_box: &Object) -> [f32; 4] {
    let mut rect = [0.0, 0.0, 612.0, 792.0];
    if let Object::Array(items) = media_box {
        for (i, item) in items.iter().take(4).enumerate() {
            match item {
                Object::Integer(v) => rect[i] = *v as f32,
                Object::Real(v) => rect[i] = *v,
                _ => {}
            }
        }
    }
    rect
}
