use anyhow::{Context, Result};
use serde::Deserialize;

use super::{DocumentLayout, PageNumber, PageSize, Rect, TextOffset, Word};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionsResponse {
    #[serde(default)]
    positions: Vec<Position>,
    #[serde(default)]
    pages: Vec<PageEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Position {
    text: String,
    start_char: Option<usize>,
    end_char: Option<usize>,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    page: PageNumber,
}

#[derive(Debug, Deserialize)]
struct PageEntry {
    page: PageNumber,
    width: f32,
    height: f32,
}

/// Parses the layout service's word-positions response into a layout.
///
/// Blank words are dropped. Character offsets are kept when both ends are
/// present.
pub fn parse_positions(json: &str) -> Result<DocumentLayout> {
    let response: PositionsResponse =
        serde_json::from_str(json).with_context(|| "failed to parse positions response")?;

    let words = response
        .positions
        .into_iter()
        .filter(|pos| !pos.text.trim().is_empty())
        .map(|pos| {
            let offset = pos
                .start_char
                .zip(pos.end_char)
                .map(|(start, end)| TextOffset { start, end });
            Word {
                text: pos.text,
                rect: Rect::from_origin_size(pos.x, pos.y, pos.width, pos.height),
                page: pos.page,
                offset,
            }
        })
        .collect::<Vec<_>>();

    let sizes = response.pages.into_iter().map(|entry| {
        (
            entry.page,
            PageSize {
                width: entry.width,
                height: entry.height,
            },
        )
    });

    Ok(DocumentLayout::new(words)?.with_page_sizes(sizes))
}
