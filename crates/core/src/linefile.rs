//! Line-file codec.
//!
//! A line file holds one line per paragraph. Paragraph-internal line breaks and
//! tabs are written as the two-character literals `\n` and `\t` so that every
//! paragraph stays on exactly one physical line.

use crate::error::Result;
use crate::types::{Separator, TextSegment};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const UTF8_BOM: char = '\u{feff}';

/// File name of the line file for a 1-based slide number.
pub fn file_name(slide: usize) -> String {
    format!("slide{}.txt", slide)
}

/// Path of the line file for a slide inside `dir`.
pub fn path_for(dir: &Path, slide: usize) -> PathBuf {
    dir.join(file_name(slide))
}

/// Encode paragraph text as a single line.
pub fn encode_line(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Split a line into segments at literal `\n`/`\t` sequences and at real
/// newline or tab characters.
///
/// The result always has at least one segment; the last one carries
/// [`Separator::None`].
pub fn split_segments(line: &str) -> Vec<TextSegment> {
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        let separator = match c {
            '\\' => match chars.peek() {
                Some('n') => Some(Separator::LineBreak),
                Some('t') => Some(Separator::Tab),
                _ => None,
            },
            '\n' => Some(Separator::LineBreak),
            '\t' => Some(Separator::Tab),
            _ => None,
        };

        match separator {
            Some(sep) => {
                if c == '\\' {
                    chars.next();
                }
                out.push(TextSegment::new(std::mem::take(&mut buf), sep));
            }
            None => buf.push(c),
        }
    }

    out.push(TextSegment::new(buf, Separator::None));
    out
}

/// Separators of a line in order, excluding the trailing [`Separator::None`].
pub fn separators(segments: &[TextSegment]) -> Vec<Separator> {
    segments
        .iter()
        .map(|s| s.separator)
        .filter(|s| *s != Separator::None)
        .collect()
}

/// Lines of a line file after padding or truncation to a unit count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FittedLines {
    pub lines: Vec<String>,
    pub padded: usize,
    pub dropped: usize,
}

/// Pad `lines` with empty strings or truncate them to exactly `count` entries.
pub fn fit(lines: &[String], count: usize) -> FittedLines {
    let mut fitted: Vec<String> = lines.iter().take(count).cloned().collect();
    let padded = count.saturating_sub(lines.len());
    let dropped = lines.len().saturating_sub(count);
    fitted.resize(count, String::new());
    FittedLines {
        lines: fitted,
        padded,
        dropped,
    }
}

/// Read a line file.
///
/// A missing file reads as no lines. A leading byte-order mark is ignored and
/// both `\n` and `\r\n` line endings are accepted.
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let content = content.strip_prefix(UTF8_BOM).unwrap_or(&content);
    Ok(content.lines().map(str::to_string).collect())
}

/// Write lines joined by `\n`, without a trailing newline.
pub fn write_lines(path: &Path, lines: &[String]) -> Result<()> {
    fs::write(path, lines.join("\n"))?;
    log::debug!("wrote {} line(s) to {}", lines.len(), path.display());
    Ok(())
}
