use rayon::prelude::*;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::layout::{DocumentLayout, TargetFragment, Word};
use crate::locator::{self, LocatorConfig, MatchResult};
use crate::merge::MergeConfig;
use crate::render::{self, AnnotationStyle, RenderOutcome};
use crate::report::BatchSummary;
use crate::text;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    pub locator: LocatorConfig,
    pub merge: MergeConfig,
    /// Search fragments on the rayon pool instead of one after another.
    pub parallel: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            locator: LocatorConfig::default(),
            merge: MergeConfig::default(),
            parallel: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchResult {
    /// One result per fragment, ordered by fragment index.
    pub results: Vec<MatchResult>,
    pub summary: BatchSummary,
}

#[derive(Debug, Clone)]
pub struct Annotation {
    pub results: Vec<MatchResult>,
    pub summary: BatchSummary,
    pub outcome: RenderOutcome,
    /// The annotated copy; the input bytes are left untouched.
    pub document: Vec<u8>,
}

/// Locates and merges every fragment. Never fails: fragments that cannot be
/// searched come back as rejected results with zero confidence.
pub fn locate_all(
    layout: &DocumentLayout,
    fragments: &[TargetFragment],
    config: &PipelineConfig,
) -> BatchResult {
    let rejections = screen_fragments(fragments);
    let process = |(fragment, rejection): (&TargetFragment, &Option<String>)| match rejection {
        Some(reason) => {
            debug!("fragment {} rejected: {}", fragment.index, reason);
            MatchResult::rejected(fragment.index, fragment.expected_page, reason.clone())
        }
        None => locator::locate(layout, fragment, &config.locator).into_merged(&config.merge),
    };

    let mut results: Vec<MatchResult> = if config.parallel {
        fragments.par_iter().zip(rejections.par_iter()).map(process).collect()
    } else {
        fragments.iter().zip(rejections.iter()).map(process).collect()
    };
    results.sort_by_key(|result| result.fragment_index);

    let summary = BatchSummary::from_results(&results, config.locator.threshold);
    info!("{}", summary.one_line());
    BatchResult { results, summary }
}

/// Full run: build the layout, locate every fragment, then draw all located
/// fragments onto a copy of `document` in one render pass.
pub fn locate_and_annotate(
    words: Vec<Word>,
    fragments: &[TargetFragment],
    document: &[u8],
    style: &AnnotationStyle,
    config: &PipelineConfig,
) -> Result<Annotation, PipelineError> {
    let layout = DocumentLayout::new(words)?;
    let BatchResult { results, summary } = locate_all(&layout, fragments, config);
    let annotated = render::annotate_pdf(document, &results, style)?;
    info!(
        "rendered {} rectangles for {} fragments ({} skipped)",
        annotated.outcome.rectangles_drawn,
        annotated.outcome.fragments_rendered.len(),
        annotated.outcome.fragments_skipped.len()
    );
    Ok(Annotation {
        results,
        summary,
        outcome: annotated.outcome,
        document: annotated.bytes,
    })
}

/// Rejection reason per fragment, in input order. Later duplicates of an
/// index are rejected so each index keeps a single searched result.
fn screen_fragments(fragments: &[TargetFragment]) -> Vec<Option<String>> {
    let mut seen = HashSet::new();
    fragments
        .iter()
        .map(|fragment| {
            if fragment.index == 0 {
                return Some("fragment index must be at least 1".to_string());
            }
            if !seen.insert(fragment.index) {
                return Some(format!("duplicate fragment index {}", fragment.index));
            }
            if text::tokens(&fragment.text).is_empty() {
                return Some("fragment text is empty after normalization".to_string());
            }
            None
        })
        .collect()
}
