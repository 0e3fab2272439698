use serde::Serialize;
use std::ops::Range;
use tracing::debug;

use crate::layout::{DocumentLayout, PageNumber, Rect, TargetFragment, Word};
use crate::merge::{merge_boxes, MergeConfig};
use crate::text;

pub const DEFAULT_THRESHOLD: f32 = 0.70;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocatorConfig {
    /// Minimum match ratio a window needs to be accepted.
    pub threshold: f32,
    /// How many pages on each side of the expected page to retry.
    pub page_window: u32,
    /// Drop window words at either end that share nothing with the fragment.
    /// Off by default: the whole winning window supplies the boxes.
    pub trim_edges: bool,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            page_window: 0,
            trim_edges: false,
        }
    }
}

impl LocatorConfig {
    pub fn with_threshold(threshold: f32) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchStatus {
    Located,
    NotFound,
    Rejected { reason: String },
}

/// Outcome of searching one fragment. An empty `boxes` with zero
/// confidence is a normal result, not a failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub fragment_index: u32,
    pub boxes: Vec<Rect>,
    pub confidence: f32,
    pub page: PageNumber,
    pub status: MatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_text: Option<String>,
}

impl MatchResult {
    pub fn not_found(fragment_index: u32, page: PageNumber) -> Self {
        Self {
            fragment_index,
            boxes: Vec::new(),
            confidence: 0.0,
            page,
            status: MatchStatus::NotFound,
            matched_text: None,
        }
    }

    pub fn rejected(fragment_index: u32, page: PageNumber, reason: impl Into<String>) -> Self {
        Self {
            status: MatchStatus::Rejected {
                reason: reason.into(),
            },
            ..Self::not_found(fragment_index, page)
        }
    }

    pub fn is_located(&self) -> bool {
        !self.boxes.is_empty()
    }

    /// Same result with its per-word boxes coalesced into line regions.
    /// Zero-area boxes are dropped; a located result left without boxes
    /// becomes not found.
    pub fn into_merged(self, config: &MergeConfig) -> Self {
        let drawable: Vec<Rect> = self
            .boxes
            .iter()
            .copied()
            .filter(|rect| !rect.is_degenerate())
            .collect();
        if drawable.is_empty() && self.status == MatchStatus::Located {
            return Self::not_found(self.fragment_index, self.page);
        }
        let boxes = merge_boxes(&drawable, config);
        Self { boxes, ..self }
    }
}

/// Searches the fragment's expected page, then neighbouring pages when
/// `page_window` allows it. The first page yielding a match wins.
pub fn locate(
    layout: &DocumentLayout,
    fragment: &TargetFragment,
    config: &LocatorConfig,
) -> MatchResult {
    for page in candidate_pages(fragment.expected_page, config.page_window) {
        let result = locate_on_page(layout.page_words(page), page, fragment, config);
        if result.is_located() {
            if page != fragment.expected_page {
                debug!(
                    "fragment {} found on page {} instead of {}",
                    fragment.index, page, fragment.expected_page
                );
            }
            return result;
        }
    }
    MatchResult::not_found(fragment.index, fragment.expected_page)
}

/// First-match search over one page's words.
///
/// Each start position opens a window of as many words as the fragment has
/// tokens. The window's ratio is the share of fragment tokens found as
/// substrings of the window's normalized text. The earliest window reaching
/// the threshold wins, even if a later one scores higher.
pub fn locate_on_page(
    words: &[Word],
    page: PageNumber,
    fragment: &TargetFragment,
    config: &LocatorConfig,
) -> MatchResult {
    let targets = text::tokens(&fragment.text);
    if words.is_empty() || targets.is_empty() {
        return MatchResult::not_found(fragment.index, page);
    }

    let Some((mut span, ratio)) = first_window(words, &targets, config.threshold) else {
        return MatchResult::not_found(fragment.index, page);
    };
    if config.trim_edges {
        span = trim_span(words, span, &targets);
    }

    let selected = &words[span];
    let boxes = drawable_boxes(selected);
    if boxes.is_empty() {
        debug!("fragment {} matched only zero-area words", fragment.index);
        return MatchResult::not_found(fragment.index, page);
    }
    MatchResult {
        fragment_index: fragment.index,
        boxes,
        confidence: ratio,
        page,
        status: MatchStatus::Located,
        matched_text: Some(
            selected
                .iter()
                .map(|word| word.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        ),
    }
}

/// Maps a character range of the extracted text straight to word boxes.
///
/// Only words carrying offsets take part. All boxes come from the page of
/// the first overlapping word.
pub fn locate_offsets(
    layout: &DocumentLayout,
    fragment_index: u32,
    start: usize,
    end: usize,
) -> MatchResult {
    let overlapping = |word: &&Word| word.offset.is_some_and(|offset| offset.overlaps(start, end));
    let Some(page) = layout.words().iter().find(overlapping).map(|word| word.page) else {
        return MatchResult::not_found(fragment_index, 0);
    };

    let selected: Vec<&Word> = layout.page_words(page).iter().filter(overlapping).collect();
    let boxes = drawable_boxes(selected.iter().copied());
    if boxes.is_empty() {
        return MatchResult::not_found(fragment_index, page);
    }
    MatchResult {
        fragment_index,
        boxes,
        confidence: 1.0,
        page,
        status: MatchStatus::Located,
        matched_text: Some(
            selected
                .iter()
                .map(|word| word.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        ),
    }
}

/// Share of `targets` found as substrings of the normalized window text.
///
/// Targets are counted per occurrence: a token repeated in the fragment
/// counts once for every repetition, both in the hits and in the total.
pub fn match_ratio(window_text: &str, targets: &[String]) -> f32 {
    if targets.is_empty() {
        return 0.0;
    }
    let hits = targets
        .iter()
        .filter(|target| window_text.contains(target.as_str()))
        .count();
    hits as f32 / targets.len() as f32
}

/// Word boxes with positive area; zero-area boxes are never emitted.
fn drawable_boxes<'a>(words: impl IntoIterator<Item = &'a Word>) -> Vec<Rect> {
    words
        .into_iter()
        .map(|word| word.rect)
        .filter(|rect| !rect.is_degenerate())
        .collect()
}

fn first_window(words: &[Word], targets: &[String], threshold: f32) -> Option<(Range<usize>, f32)> {
    let span_len = targets.len();
    (0..words.len()).find_map(|start| {
        let end = (start + span_len).min(words.len());
        let window = text::join_normalized(words[start..end].iter().map(|word| word.text.as_str()));
        let ratio = match_ratio(&window, targets);
        (ratio >= threshold).then_some((start..end, ratio))
    })
}

fn trim_span(words: &[Word], span: Range<usize>, targets: &[String]) -> Range<usize> {
    let relevant = |word: &Word| {
        let norm = text::normalize(&word.text);
        !norm.is_empty()
            && targets
                .iter()
                .any(|target| norm.contains(target.as_str()) || target.contains(norm.as_str()))
    };
    let Some(first) = span.clone().find(|&idx| relevant(&words[idx])) else {
        return span;
    };
    let last = span
        .clone()
        .rev()
        .find(|&idx| relevant(&words[idx]))
        .unwrap_or(first);
    first..last + 1
}

fn candidate_pages(expected: PageNumber, window: u32) -> Vec<PageNumber> {
    let mut pages = vec![expected];
    for distance in 1..=window {
        if let Some(before) = expected.checked_sub(distance).filter(|page| *page > 0) {
            pages.push(before);
        }
        if let Some(after) = expected.checked_add(distance) {
            pages.push(after);
        }
    }
    pages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::TextOffset;

    fn word(text: &str, left: f32, right: f32, page: PageNumber) -> Word {
        Word::new(text, Rect::new(left, 0.0, right, 10.0), page)
    }

    fn mortality_layout() -> DocumentLayout {
        DocumentLayout::new(vec![
            word("Overall", 0.0, 50.0, 3),
            word("mortality", 52.0, 110.0, 3),
            word("was", 112.0, 140.0, 3),
            word("28%", 142.0, 170.0, 3),
        ])
        .unwrap()
    }

    fn sentence_page(page: PageNumber, sentence: &str) -> Vec<Word> {
        sentence
            .split_whitespace()
            .enumerate()
            .map(|(idx, text)| {
                let left = idx as f32 * 40.0;
                word(text, left, left + 35.0, page)
            })
            .collect()
    }

    #[test]
    fn locates_verbatim_fragment() {
        let layout = mortality_layout();
        let fragment = TargetFragment::new(1, 3, "mortality was 28%");
        let result = locate(&layout, &fragment, &LocatorConfig::default());
        assert_eq!(result.status, MatchStatus::Located);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.page, 3);
        assert_eq!(result.boxes.len(), 3);
        assert_eq!(result.boxes[0].left, 52.0);
        assert_eq!(result.boxes[2].right, 170.0);
        assert_eq!(result.matched_text.as_deref(), Some("mortality was 28%"));
    }

    #[test]
    fn wrong_page_is_not_found() {
        let layout = mortality_layout();
        let fragment = TargetFragment::new(1, 2, "mortality was 28%");
        let result = locate(&layout, &fragment, &LocatorConfig::default());
        assert_eq!(result.status, MatchStatus::NotFound);
        assert!(result.boxes.is_empty());
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.page, 2);
    }

    #[test]
    fn page_window_retries_neighbouring_pages() {
        let layout = mortality_layout();
        let fragment = TargetFragment::new(1, 2, "mortality was 28%");
        let config = LocatorConfig {
            page_window: 1,
            ..LocatorConfig::default()
        };
        let result = locate(&layout, &fragment, &config);
        assert!(result.is_located());
        assert_eq!(result.page, 3);
    }

    #[test]
    fn candidate_pages_alternate_and_skip_zero() {
        assert_eq!(candidate_pages(1, 2), vec![1, 2, 3]);
        assert_eq!(candidate_pages(5, 2), vec![5, 4, 6, 3, 7]);
        assert_eq!(candidate_pages(5, 0), vec![5]);
    }

    #[test]
    fn empty_page_returns_immediately() {
        let fragment = TargetFragment::new(4, 1, "anything");
        let result = locate_on_page(&[], 1, &fragment, &LocatorConfig::default());
        assert_eq!(result.status, MatchStatus::NotFound);
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        // seven of the ten fragment tokens appear on the page
        let words = sentence_page(1, "alpha beta gamma delta epsilon zeta eta x1 x2 x3");
        let fragment = TargetFragment::new(
            1,
            1,
            "alpha beta gamma delta epsilon zeta eta omega kappa sigma",
        );
        let located = locate_on_page(&words, 1, &fragment, &LocatorConfig::with_threshold(0.70));
        assert!(located.is_located());
        assert!((located.confidence - 0.7).abs() < f32::EPSILON);

        let strict = locate_on_page(&words, 1, &fragment, &LocatorConfig::with_threshold(0.71));
        assert!(!strict.is_located());
    }

    #[test]
    fn first_match_wins_over_better_later_window() {
        let words = sentence_page(1, "mortality was high ... mortality was 28");
        let fragment = TargetFragment::new(1, 1, "mortality was 28");
        let config = LocatorConfig {
            threshold: 0.6,
            trim_edges: false,
            ..LocatorConfig::default()
        };
        let result = locate_on_page(&words, 1, &fragment, &config);
        assert!(result.is_located());
        assert_eq!(result.boxes[0], words[0].rect);
        assert!(result.confidence < 1.0);
    }

    #[test]
    fn tolerates_merged_tokens() {
        let words = sentence_page(1, "the cerebellarinfarction cohort");
        let fragment = TargetFragment::new(1, 1, "cerebellar infarction");
        let config = LocatorConfig {
            trim_edges: true,
            ..LocatorConfig::default()
        };
        let result = locate_on_page(&words, 1, &fragment, &config);
        assert!(result.is_located());
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.boxes, vec![words[1].rect]);
    }

    #[test]
    fn trims_unrelated_edge_words() {
        let words = sentence_page(1, "Overall mortality was 28% today");
        let fragment = TargetFragment::new(1, 1, "overall mortality, was: 28% at follow up");
        let config = LocatorConfig {
            trim_edges: true,
            ..LocatorConfig::with_threshold(0.5)
        };
        let result = locate_on_page(&words, 1, &fragment, &config);
        assert!(result.is_located());
        assert_eq!(result.boxes.len(), 4);
        assert_eq!(result.matched_text.as_deref(), Some("Overall mortality was 28%"));

        let untrimmed = locate_on_page(
            &words,
            1,
            &fragment,
            &LocatorConfig {
                trim_edges: false,
                ..config
            },
        );
        assert_eq!(untrimmed.boxes.len(), 5);
        assert_eq!(untrimmed.confidence, result.confidence);
    }

    #[test]
    fn verbatim_runs_always_locate() {
        let sentence = "patients with cerebellar stroke underwent suboccipital decompressive craniectomy within 48 hours";
        let words = sentence_page(7, sentence);
        let tokens: Vec<&str> = sentence.split_whitespace().collect();
        for start in 0..tokens.len() {
            for end in start + 1..=tokens.len() {
                let fragment = TargetFragment::new(1, 7, tokens[start..end].join(" "));
                let result = locate_on_page(&words, 7, &fragment, &LocatorConfig::default());
                assert!(result.confidence >= DEFAULT_THRESHOLD, "{:?}", fragment.text);
                assert!(!result.boxes.is_empty());
            }
        }
    }

    #[test]
    fn offsets_map_to_overlapping_words() {
        let mut words = vec![
            word("Overall", 0.0, 50.0, 1),
            word("mortality", 52.0, 110.0, 1),
            word("was", 0.0, 28.0, 2),
        ];
        words[0].offset = Some(TextOffset { start: 0, end: 7 });
        words[1].offset = Some(TextOffset { start: 8, end: 17 });
        words[2].offset = Some(TextOffset { start: 20, end: 23 });
        let layout = DocumentLayout::new(words).unwrap();

        let result = locate_offsets(&layout, 9, 5, 12);
        assert_eq!(result.fragment_index, 9);
        assert_eq!(result.page, 1);
        assert_eq!(result.boxes.len(), 2);

        let missing = locate_offsets(&layout, 9, 17, 20);
        assert!(!missing.is_located());
    }

    #[test]
    fn into_merged_coalesces_line() {
        let layout = mortality_layout();
        let fragment = TargetFragment::new(1, 3, "mortality was 28%");
        let merged = locate(&layout, &fragment, &LocatorConfig::default())
            .into_merged(&MergeConfig::default());
        assert_eq!(merged.boxes, vec![Rect::new(52.0, 0.0, 170.0, 10.0)]);
        assert_eq!(merged.confidence, 1.0);
    }

    #[test]
    fn default_keeps_whole_winning_window() {
        let words = sentence_page(1, "alpha bravo mortality was 28%");
        let fragment = TargetFragment::new(1, 1, "xray mortality was 28%");
        let result = locate_on_page(&words, 1, &fragment, &LocatorConfig::default());
        assert!((result.confidence - 0.75).abs() < f32::EPSILON);
        assert_eq!(result.boxes.len(), 4);
        assert_eq!(result.boxes[0], words[1].rect);
        assert_eq!(result.matched_text.as_deref(), Some("bravo mortality was 28%"));
    }

    #[test]
    fn zero_area_words_never_become_boxes() {
        let flat = DocumentLayout::new(vec![Word::new(
            "mortality",
            Rect::new(10.0, 5.0, 10.0, 15.0),
            1,
        )])
        .unwrap();
        let fragment = TargetFragment::new(1, 1, "mortality");
        let result = locate(&flat, &fragment, &LocatorConfig::default());
        assert_eq!(result.status, MatchStatus::NotFound);
        assert!(result.boxes.is_empty());
        assert_eq!(result.confidence, 0.0);

        let words = vec![
            Word::new("mortality", Rect::new(10.0, 5.0, 10.0, 15.0), 1),
            word("was", 20.0, 40.0, 1),
        ];
        let fragment = TargetFragment::new(2, 1, "mortality was");
        let result = locate_on_page(&words, 1, &fragment, &LocatorConfig::default());
        assert_eq!(result.boxes, vec![words[1].rect]);
    }

    #[test]
    fn into_merged_drops_zero_area_boxes() {
        let result = MatchResult {
            fragment_index: 3,
            boxes: vec![Rect::new(10.0, 5.0, 10.0, 15.0)],
            confidence: 1.0,
            page: 2,
            status: MatchStatus::Located,
            matched_text: Some("mortality".to_string()),
        };
        let merged = result.into_merged(&MergeConfig::default());
        assert_eq!(merged.status, MatchStatus::NotFound);
        assert!(merged.boxes.is_empty());
        assert_eq!(merged.confidence, 0.0);
        assert_eq!(merged.page, 2);

        let rejected = MatchResult::rejected(4, 1, "empty").into_merged(&MergeConfig::default());
        assert!(matches!(rejected.status, MatchStatus::Rejected { .. }));
    }

    #[test]
    fn repeated_tokens_count_per_occurrence() {
        let targets = text::tokens("was was high");
        assert!((match_ratio("mortality was 28", &targets) - 2.0 / 3.0).abs() < f32::EPSILON);
    }
}
