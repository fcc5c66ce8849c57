//! Domain types for slide paragraphs, alignment outcomes and operation reports.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Characters that already separate a bullet from the paragraph body.
///
/// When the body starts with one of these, no space is inserted after the bullet.
pub const BULLET_NO_SPACE_BEFORE: &[char] = &[':', ';', '.', ',', ')', '-', '—', '·', ' '];

/// Separator that follows a [`TextSegment`] inside one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Separator {
    /// Last segment of the line.
    None,
    /// Paragraph-internal line break (`a:br`).
    LineBreak,
    /// Tab stop (`a:tab`).
    Tab,
}

impl Separator {
    /// The two-character literal used for this separator in a line file.
    pub fn literal(self) -> &'static str {
        match self {
            Separator::None => "",
            Separator::LineBreak => "\\n",
            Separator::Tab => "\\t",
        }
    }
}

/// A run of text followed by a separator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSegment {
    pub text: String,
    pub separator: Separator,
}

impl TextSegment {
    pub fn new(text: impl Into<String>, separator: Separator) -> Self {
        Self {
            text: text.into(),
            separator,
        }
    }
}

/// One piece of paragraph content, in reading order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Segment {
    /// Literal text from a run or field.
    Text(String),
    /// A tab stop.
    Tab,
    /// A line break inside the paragraph.
    LineBreak,
    /// Formula text carried inside a run or directly under the paragraph.
    Math(String),
}

/// Bullet resolved for one paragraph.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BulletSpec {
    /// No bullet character applies.
    #[default]
    None,
    /// `a:buChar` set on the paragraph itself.
    Explicit(String),
    /// `a:buChar` inherited from the text body's list style.
    Inherited(String),
}

impl BulletSpec {
    /// The bullet character, if any.
    pub fn character(&self) -> Option<&str> {
        match self {
            BulletSpec::None => None,
            BulletSpec::Explicit(c) | BulletSpec::Inherited(c) => Some(c.as_str()),
        }
    }

    /// Prefix `body` with the bullet.
    ///
    /// Empty bodies are returned unchanged, and the separating space is
    /// suppressed when the body already starts with punctuation or a space.
    pub fn prefix(&self, body: &str) -> String {
        match self.character() {
            Some(bullet) if !body.is_empty() => format!("{}{}{}", bullet, glue(body), body),
            _ => body.to_string(),
        }
    }

    /// Remove a bullet prefix previously added by [`BulletSpec::prefix`].
    ///
    /// `original` is the body the line was extracted from. The space after
    /// the bullet is only removed when `prefix` would have inserted it for
    /// that body, so a body that itself starts with a space keeps it.
    /// Lines that do not start with the bullet are returned unchanged.
    pub fn strip<'a>(&self, line: &'a str, original: &str) -> &'a str {
        let Some(rest) = self.character().and_then(|bullet| line.strip_prefix(bullet)) else {
            return line;
        };
        if glue(original).is_empty() {
            rest
        } else {
            rest.strip_prefix(' ').unwrap_or(rest)
        }
    }
}

fn glue(body: &str) -> &'static str {
    if body.starts_with(BULLET_NO_SPACE_BEFORE) {
        ""
    } else {
        " "
    }
}

/// One line-equivalent text unit of a slide.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Paragraph {
    /// Content in reading order.
    pub segments: Vec<Segment>,

    /// Resolved bullet.
    pub bullet: BulletSpec,

    /// Whether the paragraph holds any visible text outside formulas.
    pub has_visible_text: bool,
}

impl Paragraph {
    /// Plain text of the paragraph with real `\n` and `\t` characters.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(t) | Segment::Math(t) => out.push_str(t),
                Segment::Tab => out.push('\t'),
                Segment::LineBreak => out.push('\n'),
            }
        }
        out
    }

    /// Plain text with the bullet prefix applied.
    pub fn text(&self) -> String {
        self.bullet.prefix(&self.plain_text())
    }

    /// The paragraph encoded as a single line-file line.
    pub fn to_line(&self) -> String {
        crate::linefile::encode_line(&self.text())
    }
}

/// Paragraphs extracted from a single slide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedSlide {
    /// 1-based slide number.
    pub number: usize,

    /// Paragraphs in reading order.
    pub paragraphs: Vec<Paragraph>,
}

impl ExtractedSlide {
    /// Create a new slide with the given number.
    pub fn new(number: usize) -> Self {
        Self {
            number,
            paragraphs: Vec::new(),
        }
    }

    /// Line-file lines, one per paragraph.
    pub fn lines(&self) -> Vec<String> {
        self.paragraphs.iter().map(Paragraph::to_line).collect()
    }
}

/// Patch strategy used to write lines back into a slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlignmentMethod {
    /// One line per text unit, raw document order.
    RunLevel,
    /// One line per paragraph, formula-safe.
    ParagraphLevel,
}

impl AlignmentMethod {
    /// Pick a patch strategy from the slide's run count and the supplied line count.
    ///
    /// Run-level is only chosen for near-exact matches: `0.90 <= runs/lines <= 1.15`
    /// and at most two units apart.
    pub fn choose(n_runs: usize, n_lines: usize) -> Self {
        if n_lines == 0 {
            return AlignmentMethod::ParagraphLevel;
        }
        let ratio = n_runs as f64 / n_lines as f64;
        let diff = n_runs.abs_diff(n_lines);
        if (0.90..=1.15).contains(&ratio) && diff <= 2 {
            AlignmentMethod::RunLevel
        } else {
            AlignmentMethod::ParagraphLevel
        }
    }
}

impl fmt::Display for AlignmentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlignmentMethod::RunLevel => f.write_str("runs"),
            AlignmentMethod::ParagraphLevel => f.write_str("paragraphs"),
        }
    }
}

/// Outcome of applying a line file to one slide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentResult {
    /// Strategy that was used.
    pub method: AlignmentMethod,

    /// Text units (`a:t`) found on the slide.
    pub run_count: usize,

    /// Structural units targeted by the chosen method.
    pub source_count: usize,

    /// Units whose content was actually rewritten.
    pub applied_count: usize,

    /// Lines supplied by the line file.
    pub line_count: usize,

    /// Empty lines appended because the file was short.
    pub padded: usize,

    /// Lines dropped because the file was long.
    pub dropped: usize,
}

/// A slide that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideFailure {
    pub slide: usize,
    pub reason: String,
}

/// Per-slide paragraph count written during extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideLines {
    pub slide: usize,
    pub path: PathBuf,
    pub paragraphs: usize,
}

/// Result of extracting every slide of a container to line files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub slides: Vec<SlideLines>,
    pub failed: Vec<SlideFailure>,
}

impl ExtractionReport {
    /// Paths of the line files that were written.
    pub fn files(&self) -> Vec<&PathBuf> {
        self.slides.iter().map(|s| &s.path).collect()
    }
}

/// Alignment outcome for one slide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideOutcome {
    pub slide: usize,
    #[serde(flatten)]
    pub result: AlignmentResult,
}

/// Result of writing line files back into a container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReintegrationReport {
    /// Slides that had structural units and were patched.
    pub patched: usize,

    /// Per-slide alignment outcomes, ascending slide order.
    pub outcomes: Vec<SlideOutcome>,

    /// Slides whose line file was missing or empty.
    pub skipped: Vec<usize>,

    /// Slides whose XML could not be parsed.
    pub failed: Vec<SlideFailure>,
}

/// Result of replacing embedded audio parts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaReport {
    /// Basenames of media parts that were overwritten.
    pub replaced: Vec<String>,

    /// Supplied files with no matching part in the container.
    pub missing: Vec<String>,

    /// Manifest declarations that could not be added.
    pub manifest_failures: Vec<String>,
}
