use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use time::{format_description, OffsetDateTime};

use crate::error::PipelineError;
use crate::layout::TargetFragment;
use crate::locator::{MatchResult, MatchStatus};
use crate::pipeline::Annotation;
use crate::render::snapshot::Snapshot;

const EVIDENCE_TEMPLATE: &str = include_str!("templates/evidence_report.html.tera");

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: usize,
    pub located: usize,
    pub not_found: usize,
    pub rejected: usize,
    /// Mean over located fragments only; `None` when nothing was located.
    pub mean_confidence: Option<f32>,
    pub threshold: f32,
}

impl BatchSummary {
    pub fn from_results(results: &[MatchResult], threshold: f32) -> Self {
        let mut summary = BatchSummary {
            total: results.len(),
            located: 0,
            not_found: 0,
            rejected: 0,
            mean_confidence: None,
            threshold,
        };
        let mut confidence_sum = 0.0;
        for result in results {
            match result.status {
                MatchStatus::Located if result.is_located() => {
                    summary.located += 1;
                    confidence_sum += result.confidence;
                }
                MatchStatus::Rejected { .. } => summary.rejected += 1,
                _ => summary.not_found += 1,
            }
        }
        if summary.located > 0 {
            summary.mean_confidence = Some(confidence_sum / summary.located as f32);
        }
        summary
    }

    pub fn one_line(&self) -> String {
        format!(
            "located {}/{} fragments (not locatable {}, rejected {}), mean confidence {}, threshold {:.2}",
            self.located,
            self.total,
            self.not_found,
            self.rejected,
            format_confidence(self.mean_confidence),
            self.threshold
        )
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "fragments: {}", self.total)?;
        writeln!(f, "located: {}", self.located)?;
        writeln!(f, "not locatable: {}", self.not_found)?;
        writeln!(f, "rejected: {}", self.rejected)?;
        writeln!(f, "mean confidence: {}", format_confidence(self.mean_confidence))?;
        write!(f, "threshold: {:.2}", self.threshold)
    }
}

/// Operator-facing status of a run. Misses are routine and reported as
/// counts; a pipeline error is flagged as needing intervention.
pub fn describe_run(run: &Result<Annotation, PipelineError>) -> String {
    match run {
        Ok(annotation) => {
            let mut text = annotation.summary.to_string();
            if !annotation.outcome.fragments_skipped.is_empty() {
                let skipped = annotation
                    .outcome
                    .fragments_skipped
                    .iter()
                    .map(|index| index.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                text.push_str(&format!("\nskipped (not drawn): {}", skipped));
            }
            text
        }
        Err(err) => format!("pipeline failed, operator action required: {}", err),
    }
}

fn format_confidence(value: Option<f32>) -> String {
    value
        .map(|value| format!("{:.2}", value))
        .unwrap_or_else(|| "n/a".to_string())
}

/// Inputs of the self-contained HTML evidence page.
pub struct EvidenceReport<'a> {
    pub title: &'a str,
    pub document: &'a [u8],
    pub fragments: &'a [TargetFragment],
    pub results: &'a [MatchResult],
    pub summary: &'a BatchSummary,
    pub snapshots: &'a [Snapshot],
    /// Fixed timestamp; the current UTC time is used when absent.
    pub generated_at: Option<String>,
}

#[derive(Debug, Serialize)]
struct ReportView {
    title: String,
    generated_at: String,
    document_md5: String,
    summary: String,
    threshold: String,
    rows: Vec<EvidenceRow>,
}

#[derive(Debug, Serialize)]
struct EvidenceRow {
    index: u32,
    label: String,
    text: String,
    expected_page: u32,
    page: u32,
    status: String,
    status_class: &'static str,
    confidence: String,
    image: Option<String>,
}

pub fn render_html_report(report: &EvidenceReport<'_>) -> Result<String> {
    let fragments: HashMap<u32, &TargetFragment> = report
        .fragments
        .iter()
        .map(|fragment| (fragment.index, fragment))
        .collect();
    let snapshots: HashMap<u32, &Snapshot> = report
        .snapshots
        .iter()
        .map(|snapshot| (snapshot.fragment_index, snapshot))
        .collect();

    let rows = report
        .results
        .iter()
        .map(|result| {
            let fragment = fragments.get(&result.fragment_index);
            let (status, status_class) = match &result.status {
                MatchStatus::Located => ("located".to_string(), "located"),
                MatchStatus::NotFound => ("not locatable".to_string(), "missing"),
                MatchStatus::Rejected { reason } => (format!("rejected: {}", reason), "rejected"),
            };
            EvidenceRow {
                index: result.fragment_index,
                label: fragment
                    .and_then(|fragment| fragment.source_label.clone())
                    .unwrap_or_default(),
                text: fragment.map(|fragment| fragment.text.clone()).unwrap_or_default(),
                expected_page: fragment
                    .map(|fragment| fragment.expected_page)
                    .unwrap_or(result.page),
                page: result.page,
                status,
                status_class,
                confidence: format!("{:.2}", result.confidence),
                image: snapshots
                    .get(&result.fragment_index)
                    .map(|snapshot| snapshot.data_uri()),
            }
        })
        .collect();

    let view = ReportView {
        title: report.title.to_string(),
        generated_at: report.generated_at.clone().unwrap_or_else(now_utc),
        document_md5: format!("{:x}", md5::compute(report.document)),
        summary: report.summary.one_line(),
        threshold: format!("{:.2}", report.summary.threshold),
        rows,
    };

    let mut context = tera::Context::new();
    context.insert("report", &view);
    tera::Tera::one_off(EVIDENCE_TEMPLATE, &context, true)
        .with_context(|| "failed to render evidence report template")
}

fn now_utc() -> String {
    let format = format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second] UTC");
    match format {
        Ok(format) => OffsetDateTime::now_utc()
            .format(&format)
            .unwrap_or_else(|_| "unknown".to_string()),
        Err(_) => "unknown".to_string(),
    }
}
