pub mod positions;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;

use crate::error::PipelineError;

/// 1-based page number as reported by the layout service.
pub type PageNumber = u32;

/// Axis-aligned rectangle in points, origin top-left, `top` grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left: left.min(right),
            top: top.min(bottom),
            right: left.max(right),
            bottom: top.max(bottom),
        }
    }

    pub fn from_origin_size(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }

    pub fn contains(&self, other: &Rect) -> bool {
        self.left <= other.left
            && self.top <= other.top
            && self.right >= other.right
            && self.bottom >= other.bottom
    }
}

/// Half-open character range of a word inside the extracted document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextOffset {
    pub start: usize,
    pub end: usize,
}

impl TextOffset {
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start < end && start < self.end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    #[serde(rename = "box")]
    pub rect: Rect,
    pub page: PageNumber,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<TextOffset>,
}

impl Word {
    pub fn new(text: impl Into<String>, rect: Rect, page: PageNumber) -> Self {
        Self {
            text: text.into(),
            rect,
            page,
            offset: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

/// A cited text fragment claimed to appear on `expected_page`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetFragment {
    pub index: u32,
    pub expected_page: PageNumber,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_label: Option<String>,
}

impl TargetFragment {
    pub fn new(index: u32, expected_page: PageNumber, text: impl Into<String>) -> Self {
        Self {
            index,
            expected_page,
            text: text.into(),
            source_label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.source_label = Some(label.into());
        self
    }
}

/// Words of one document grouped by page.
///
/// Words are assumed to arrive in reading order within a page. Only the
/// page grouping is enforced: pages are stably sorted so every page owns a
/// contiguous slice, and the order of words inside a page is left as the
/// layout service produced it.
#[derive(Debug, Clone)]
pub struct DocumentLayout {
    words: Vec<Word>,
    pages: BTreeMap<PageNumber, Range<usize>>,
    sizes: BTreeMap<PageNumber, PageSize>,
}

impl DocumentLayout {
    pub fn new(mut words: Vec<Word>) -> Result<Self, PipelineError> {
        if words.is_empty() {
            return Err(PipelineError::MalformedInput(
                "document has no words".to_string(),
            ));
        }
        if words.windows(2).any(|pair| pair[0].page > pair[1].page) {
            tracing::debug!("words are not grouped by page; regrouping");
            words.sort_by_key(|word| word.page);
        }

        let mut pages = BTreeMap::new();
        let mut start = 0;
        for idx in 1..=words.len() {
            if idx == words.len() || words[idx].page != words[start].page {
                pages.insert(words[start].page, start..idx);
                start = idx;
            }
        }

        Ok(Self {
            words,
            pages,
            sizes: BTreeMap::new(),
        })
    }

    pub fn with_page_sizes(
        mut self,
        sizes: impl IntoIterator<Item = (PageNumber, PageSize)>,
    ) -> Self {
        self.sizes.extend(sizes);
        self
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    /// Words of `page` in reading order; empty when the page has no text.
    pub fn page_words(&self, page: PageNumber) -> &[Word] {
        self.pages
            .get(&page)
            .map(|range| &self.words[range.clone()])
            .unwrap_or(&[])
    }

    /// Highest page number seen in either the words or the page sizes.
    pub fn page_count(&self) -> u32 {
        let from_words = self.pages.keys().next_back().copied().unwrap_or(0);
        let from_sizes = self.sizes.keys().next_back().copied().unwrap_or(0);
        from_words.max(from_sizes)
    }

    pub fn page_size(&self, page: PageNumber) -> Option<PageSize> {
        self.sizes.get(&page).copied()
    }
}
