use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::{DynamicImage, ImageFormat, RgbaImage};
use serde::Serialize;
use std::io::Cursor;
use tiny_skia::{ColorU8, Paint, Pixmap, Transform};

use super::Rgb;
use crate::layout::{PageNumber, Rect};
use crate::locator::MatchResult;

const POINTS_PER_INCH: f32 = 72.0;
const HIGHLIGHT_BLEED_PX: f32 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotConfig {
    /// Resolution the page raster was rendered at.
    pub dpi: f32,
    /// Pixels added around the matched region before cropping.
    pub padding: f32,
    /// Multiple of `padding` kept as surrounding context.
    pub context_factor: f32,
    pub color: Rgb,
    pub alpha: u8,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            dpi: 200.0,
            padding: 15.0,
            context_factor: 3.0,
            color: Rgb::new(0xff, 0xff, 0x00),
            alpha: 100,
        }
    }
}

impl SnapshotConfig {
    fn scale(&self) -> f32 {
        self.dpi / POINTS_PER_INCH
    }
}

/// Cropped PNG of a page region with the matched text highlighted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub fragment_index: u32,
    pub page: PageNumber,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing)]
    pub png: Vec<u8>,
}

impl Snapshot {
    pub fn data_uri(&self) -> String {
        format!("data:image/png;base64,{}", BASE64.encode(&self.png))
    }
}

/// Highlights `result`'s boxes on a raster of its page and crops the
/// surrounding context. Returns `None` for results without boxes.
pub fn capture_snapshot(
    page_image: &[u8],
    result: &MatchResult,
    config: &SnapshotConfig,
) -> Result<Option<Snapshot>> {
    let Some(region) = result.boxes.iter().copied().reduce(|acc, rect| acc.union(&rect)) else {
        return Ok(None);
    };
    let image = image::load_from_memory(page_image)
        .with_context(|| "failed to decode page image for snapshot")?
        .to_rgba8();
    let (width, height) = image.dimensions();
    let scale = config.scale();

    let mut pixmap = to_pixmap(&image)?;
    let mut paint = Paint::default();
    paint.set_color_rgba8(config.color.r, config.color.g, config.color.b, config.alpha);
    paint.anti_alias = false;
    for rect in &result.boxes {
        let Some(area) = scaled(rect, scale, HIGHLIGHT_BLEED_PX, width, height) else {
            continue;
        };
        pixmap.fill_rect(area, &paint, Transform::identity(), None);
    }

    let context = config.padding * (1.0 + config.context_factor);
    let crop = scaled(&region, scale, context, width, height)
        .ok_or_else(|| anyhow!("matched region lies outside the page image"))?;
    let x = crop.left().floor() as u32;
    let y = crop.top().floor() as u32;
    let crop_w = (crop.right().ceil() as u32).min(width) - x;
    let crop_h = (crop.bottom().ceil() as u32).min(height) - y;

    let highlighted = from_pixmap(&pixmap, width, height)?;
    let cropped = image::imageops::crop_imm(&highlighted, x, y, crop_w, crop_h).to_image();
    let mut png = Vec::new();
    DynamicImage::ImageRgba8(cropped)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .with_context(|| "failed to encode snapshot")?;

    Ok(Some(Snapshot {
        fragment_index: result.fragment_index,
        page: result.page,
        width: crop_w,
        height: crop_h,
        png,
    }))
}

/// Layout rect in points to a pixel rect grown by `grow`, clipped to the
/// image.
fn scaled(rect: &Rect, scale: f32, grow: f32, width: u32, height: u32) -> Option<tiny_skia::Rect> {
    let left = (rect.left * scale - grow).max(0.0);
    let top = (rect.top * scale - grow).max(0.0);
    let right = (rect.right * scale + grow).min(width as f32);
    let bottom = (rect.bottom * scale + grow).min(height as f32);
    tiny_skia::Rect::from_ltrb(left, top, right, bottom)
}

fn to_pixmap(image: &RgbaImage) -> Result<Pixmap> {
    let (width, height) = image.dimensions();
    let mut pixmap = Pixmap::new(width, height).ok_or_else(|| anyhow!("empty page image"))?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(image.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Ok(pixmap)
}

fn from_pixmap(pixmap: &Pixmap, width: u32, height: u32) -> Result<RgbaImage> {
    let data = pixmap
        .pixels()
        .iter()
        .flat_map(|pixel| {
            let color = pixel.demultiply();
            [color.red(), color.green(), color.blue(), color.alpha()]
        })
        .collect::<Vec<u8>>();
    RgbaImage::from_raw(width, height, data)
        .ok_or_else(|| anyhow!("failed to rebuild snapshot image"))
}
