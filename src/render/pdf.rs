use anyhow::{anyhow, bail, Context, Result};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::{
    to_render_rect, AnnotatedDocument, AnnotationStyle, RenderOutcome, RenderRect, StyleKind,
};
use crate::error::PipelineError;
use crate::layout::PageNumber;
use crate::locator::MatchResult;

const MAX_TREE_DEPTH: usize = 32;
const LABEL_GAP: f32 = 3.0;
const LABEL_MIN_X: f32 = 2.0;
// Helvetica digit advance, in text space units per point of font size
const LABEL_DIGIT_WIDTH: f32 = 0.556;

/// Draws every located result onto a copy of `input`.
///
/// Results without boxes draw nothing. Located results pointing at a page
/// the document does not have, or whose boxes all have zero area, are
/// listed in `fragments_skipped`. Any failure to
/// read or write the document aborts the whole render.
pub fn annotate_pdf(
    input: &[u8],
    results: &[MatchResult],
    style: &AnnotationStyle,
) -> Result<AnnotatedDocument, PipelineError> {
    annotate_document(input, results, style).map_err(PipelineError::render)
}

fn annotate_document(
    input: &[u8],
    results: &[MatchResult],
    style: &AnnotationStyle,
) -> Result<AnnotatedDocument> {
    let detected = infer::get(input).map(|kind| kind.mime_type());
    if detected != Some("application/pdf") {
        bail!("input is not a pdf (detected {})", detected.unwrap_or("unknown"));
    }
    let mut doc = Document::load_mem(input).with_context(|| "failed to parse input pdf")?;
    let pages = doc.get_pages();

    let mut outcome = RenderOutcome::default();
    let mut by_page: BTreeMap<PageNumber, Vec<&MatchResult>> = BTreeMap::new();
    for result in results.iter().filter(|result| result.is_located()) {
        if pages.contains_key(&result.page) {
            by_page.entry(result.page).or_default().push(result);
        } else {
            warn!(
                "fragment {} points at page {} but the document has {} pages",
                result.fragment_index,
                result.page,
                pages.len()
            );
            outcome.fragments_skipped.insert(result.fragment_index);
        }
    }

    for (page, page_results) in by_page {
        let Some(&page_id) = pages.get(&page) else {
            continue;
        };
        let geometry = page_geometry(&doc, page_id)
            .with_context(|| format!("unsupported page {}", page))?;
        let names = register_resources(&mut doc, page_id, style)
            .with_context(|| format!("failed to update resources of page {}", page))?;

        let mut operations = vec![Operation::new("Q", vec![])];
        for result in page_results {
            let rects: Vec<RenderRect> = result
                .boxes
                .iter()
                .filter(|rect| !rect.is_degenerate())
                .map(|rect| geometry.place(to_render_rect(rect, geometry.height)))
                .collect();
            let Some(first) = rects.first().copied() else {
                warn!("fragment {} has no drawable box", result.fragment_index);
                outcome.fragments_skipped.insert(result.fragment_index);
                continue;
            };
            operations.extend(shape_operations(&rects, style, &names));
            if style.show_label {
                operations.extend(label_operations(
                    result.fragment_index,
                    first,
                    &geometry,
                    style,
                    &names,
                ));
            }
            outcome.rectangles_drawn += rects.len();
            outcome.fragments_rendered.insert(result.fragment_index);
        }
        debug!("page {}: {} draw operations", page, operations.len());

        let mut body = b"\n".to_vec();
        body.extend(
            Content { operations }
                .encode()
                .with_context(|| "failed to encode overlay content")?,
        );
        append_overlay(&mut doc, page_id, body)
            .with_context(|| format!("failed to write page {}", page))?;
    }

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).with_context(|| "failed to write annotated pdf")?;
    Ok(AnnotatedDocument { bytes, outcome })
}

struct PageGeometry {
    origin_x: f32,
    origin_y: f32,
    height: f32,
}

impl PageGeometry {
    fn place(&self, rect: RenderRect) -> RenderRect {
        RenderRect {
            x: rect.x + self.origin_x,
            y: rect.y + self.origin_y,
            ..rect
        }
    }
}

struct ResourceNames {
    graphics_state: Option<String>,
    font: Option<String>,
}

fn shape_operations(
    rects: &[RenderRect],
    style: &AnnotationStyle,
    names: &ResourceNames,
) -> Vec<Operation> {
    let [r, g, b] = style.color.unit();
    let mut ops = vec![Operation::new("q", vec![])];
    match style.kind {
        StyleKind::Highlight => {
            if let Some(name) = &names.graphics_state {
                ops.push(Operation::new("gs", vec![Object::Name(name.as_bytes().to_vec())]));
            }
            ops.push(Operation::new("rg", vec![r.into(), g.into(), b.into()]));
        }
        StyleKind::Border => {
            ops.push(Operation::new("RG", vec![r.into(), g.into(), b.into()]));
            ops.push(Operation::new("w", vec![style.border_width.into()]));
        }
    }
    for rect in rects {
        ops.push(Operation::new(
            "re",
            vec![rect.x.into(), rect.y.into(), rect.width.into(), rect.height.into()],
        ));
    }
    let paint = match style.kind {
        StyleKind::Highlight => "f",
        StyleKind::Border => "S",
    };
    ops.push(Operation::new(paint, vec![]));
    ops.push(Operation::new("Q", vec![]));
    ops
}

/// Index marker next to the first region: left of it when the margin has
/// room, otherwise above it, otherwise right of it.
fn label_operations(
    index: u32,
    anchor: RenderRect,
    geometry: &PageGeometry,
    style: &AnnotationStyle,
    names: &ResourceNames,
) -> Vec<Operation> {
    let Some(font) = &names.font else {
        return Vec::new();
    };
    let text = index.to_string();
    let size = style.label_font_size;
    let width = text.len() as f32 * size * LABEL_DIGIT_WIDTH;
    let (x, y) = label_position(anchor, width, size, geometry);
    let [r, g, b] = style.label_color.unit();
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![Object::Name(font.as_bytes().to_vec()), size.into()]),
        Operation::new("rg", vec![r.into(), g.into(), b.into()]),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new("Tj", vec![Object::string_literal(text)]),
        Operation::new("ET", vec![]),
    ]
}

fn label_position(
    anchor: RenderRect,
    width: f32,
    size: f32,
    geometry: &PageGeometry,
) -> (f32, f32) {
    let left = anchor.x - LABEL_GAP - width;
    if left >= geometry.origin_x + LABEL_MIN_X {
        return (left, anchor.y + anchor.height - size);
    }
    let above = anchor.y + anchor.height + LABEL_GAP;
    if above + size <= geometry.origin_y + geometry.height {
        return (anchor.x, above);
    }
    (anchor.x + anchor.width + LABEL_GAP, anchor.y + anchor.height - size)
}

fn page_geometry(doc: &Document, page_id: ObjectId) -> Result<PageGeometry> {
    let media_box =
        inherited_entry(doc, page_id, b"MediaBox").ok_or_else(|| anyhow!("page has no MediaBox"))?;
    let media_box = resolve(doc, media_box);
    let values = media_box
        .as_array()
        .with_context(|| "MediaBox is not an array")?
        .iter()
        .map(number)
        .collect::<Option<Vec<f32>>>()
        .ok_or_else(|| anyhow!("MediaBox contains non-numeric entries"))?;
    let [x0, y0, x1, y1] = values[..] else {
        bail!("MediaBox must have four entries, found {}", values.len());
    };
    let height = (y1 - y0).abs();
    if height <= 0.0 {
        bail!("page has zero height");
    }
    Ok(PageGeometry {
        origin_x: x0.min(x1),
        origin_y: y0.min(y1),
        height,
    })
}

fn register_resources(
    doc: &mut Document,
    page_id: ObjectId,
    style: &AnnotationStyle,
) -> Result<ResourceNames> {
    let mut resources = resolve_dict(doc, inherited_entry(doc, page_id, b"Resources"));
    let mut names = ResourceNames {
        graphics_state: None,
        font: None,
    };

    if style.kind == StyleKind::Highlight {
        let state_id = doc.add_object(dictionary! {
            "Type" => "ExtGState",
            "ca" => style.opacity.clamp(0.0, 1.0),
            "CA" => style.opacity.clamp(0.0, 1.0),
        });
        let name = insert_resource(doc, &mut resources, b"ExtGState", "CiteGs", state_id);
        names.graphics_state = Some(name);
    }
    if style.show_label {
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        names.font = Some(insert_resource(doc, &mut resources, b"Font", "CiteF", font_id));
    }

    page_dict_mut(doc, page_id)?.set("Resources", resources);
    Ok(names)
}

/// Adds `id` under a fresh name in the `category` sub-dictionary and
/// returns that name.
fn insert_resource(
    doc: &Document,
    resources: &mut Dictionary,
    category: &[u8],
    base: &str,
    id: ObjectId,
) -> String {
    let mut entries = resolve_dict(doc, resources.get(category).ok().cloned());
    let mut name = base.to_string();
    let mut suffix = 1;
    while entries.has(name.as_bytes()) {
        suffix += 1;
        name = format!("{}{}", base, suffix);
    }
    entries.set(name.clone(), Object::Reference(id));
    resources.set(category.to_vec(), entries);
    name
}

/// Wraps the existing content in `q`/`Q` so its graphics state cannot leak
/// into the overlay, then appends the overlay stream.
fn append_overlay(doc: &mut Document, page_id: ObjectId, body: Vec<u8>) -> Result<()> {
    let existing = doc
        .get_object(page_id)
        .and_then(Object::as_dict)?
        .get(b"Contents")
        .ok()
        .cloned();
    let mut contents = match existing.map(|obj| (obj.clone(), resolve(doc, obj))) {
        Some((_, Object::Array(items))) => items,
        Some((reference @ Object::Reference(_), _)) => vec![reference],
        _ => Vec::new(),
    };

    let prefix = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let overlay = doc.add_object(Stream::new(Dictionary::new(), body));
    contents.insert(0, Object::Reference(prefix));
    contents.push(Object::Reference(overlay));

    page_dict_mut(doc, page_id)?.set("Contents", Object::Array(contents));
    Ok(())
}

fn page_dict_mut(doc: &mut Document, page_id: ObjectId) -> Result<&mut Dictionary> {
    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .with_context(|| "page object is not a dictionary")
}

/// Looks `key` up on the page, then on its ancestors in the page tree.
fn inherited_entry(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut node = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let dict = doc.get_object(node).and_then(Object::as_dict).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        node = dict.get(b"Parent").and_then(Object::as_reference).ok()?;
    }
    None
}

fn resolve(doc: &Document, obj: Object) -> Object {
    match obj {
        Object::Reference(id) => doc.get_object(id).cloned().unwrap_or(Object::Null),
        other => other,
    }
}

fn resolve_dict(doc: &Document, obj: Option<Object>) -> Dictionary {
    match obj.map(|obj| resolve(doc, obj)) {
        Some(Object::Dictionary(dict)) => dict,
        _ => Dictionary::new(),
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}
