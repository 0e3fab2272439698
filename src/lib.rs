//! Locates quoted text fragments in a PDF's word layout and draws their
//! bounding boxes back onto a copy of the document.

pub mod error;
pub mod layout;
pub mod locator;
pub mod logging;
pub mod merge;
pub mod pipeline;
pub mod render;
pub mod report;
pub mod settings;
pub mod text;

pub use error::PipelineError;
pub use layout::{DocumentLayout, PageNumber, Rect, TargetFragment, Word};
pub use locator::{LocatorConfig, MatchResult, MatchStatus};
pub use merge::MergeConfig;
pub use pipeline::{locate_all, locate_and_annotate, Annotation, BatchResult, PipelineConfig};
pub use render::{annotate_pdf, AnnotationStyle, RenderOutcome};
pub use report::BatchSummary;
pub use settings::Settings;
