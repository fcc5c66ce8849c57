//! Core domain types, line-file codec and errors for round-tripping
//! presentation slide text through external editors.

pub mod error;
pub mod linefile;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    AlignmentMethod, AlignmentResult, BulletSpec, ExtractedSlide, ExtractionReport, MediaReport,
    Paragraph, ReintegrationReport, Segment, Separator, SlideFailure, SlideLines, SlideOutcome,
    TextSegment,
};
