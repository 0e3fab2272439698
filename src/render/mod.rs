mod pdf;
pub mod snapshot;
mod style;

use serde::Serialize;
use std::collections::BTreeSet;

use crate::layout::Rect;

pub use pdf::annotate_pdf;
pub use style::{AnnotationStyle, Rgb, StyleKind};

/// Rectangle in rendering space: origin bottom-left, `y` grows upward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Flips a top-left-origin layout rect onto a bottom-left-origin page of
/// height `page_height`.
pub fn to_render_rect(rect: &Rect, page_height: f32) -> RenderRect {
    RenderRect {
        x: rect.left,
        y: page_height - rect.bottom,
        width: rect.width(),
        height: rect.height(),
    }
}

pub fn to_layout_rect(rect: &RenderRect, page_height: f32) -> Rect {
    Rect {
        left: rect.x,
        top: page_height - (rect.y + rect.height),
        right: rect.x + rect.width,
        bottom: page_height - rect.y,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOutcome {
    pub rectangles_drawn: usize,
    pub fragments_rendered: BTreeSet<u32>,
    /// Located fragments that were not drawn: their page does not exist in
    /// the document or none of their boxes has a positive area.
    pub fragments_skipped: BTreeSet<u32>,
}

#[derive(Debug, Clone)]
pub struct AnnotatedDocument {
    pub bytes: Vec<u8>,
    pub outcome: RenderOutcome,
}
