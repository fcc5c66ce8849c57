//! Alignment writer.
//!
//! Applies an edited line file back onto one slide. Near-exact line counts are
//! written one line per `a:t`; everything else goes through the paragraph-level
//! patch, which never touches formula markup.

use crate::slide::{anchors, read_paragraph, visible_text, Anchor, SlideDocument};
use crate::xml::{Element, Node};
use slidetext_core::linefile::{self, FittedLines};
use slidetext_core::{AlignmentMethod, AlignmentResult, BulletSpec, Result, Separator};

/// Writes line files into slide parts.
#[derive(Debug, Clone, Default)]
pub struct SlideWriter {
    indent: bool,
}

impl SlideWriter {
    /// Create a writer that serializes slides compactly, as PowerPoint does.
    pub fn new() -> Self {
        Self { indent: false }
    }

    /// Pretty-print element-only content when serializing.
    pub fn with_indent(mut self, indent: bool) -> Self {
        self.indent = indent;
        self
    }

    /// Parse a slide part, apply `lines` and serialize it again.
    pub fn patch_part(
        &self,
        part: &str,
        bytes: &[u8],
        lines: &[String],
    ) -> Result<(Vec<u8>, AlignmentResult)> {
        let mut slide = SlideDocument::parse(part, bytes)?;
        let result = self.apply(&mut slide, lines);
        let bytes = slide.to_bytes(self.indent)?;
        Ok((bytes, result))
    }

    /// Apply `lines` to a parsed slide using the method picked for its run count.
    pub fn apply(&self, slide: &mut SlideDocument, lines: &[String]) -> AlignmentResult {
        let run_count = slide.run_count();
        match AlignmentMethod::choose(run_count, lines.len()) {
            AlignmentMethod::RunLevel => patch_runs(slide, lines, run_count),
            AlignmentMethod::ParagraphLevel => patch_paragraphs(slide, lines, run_count),
        }
    }
}

fn fit_with_warning(part: &str, lines: &[String], count: usize, unit: &str) -> FittedLines {
    let fitted = linefile::fit(lines, count);
    if fitted.dropped > 0 {
        log::warn!(
            "{}: {} line(s) supplied for {} {}(s), dropped {}",
            part,
            lines.len(),
            count,
            unit,
            fitted.dropped
        );
    }
    fitted
}

/// One line per `a:t`, in raw document order.
fn patch_runs(slide: &mut SlideDocument, lines: &[String], run_count: usize) -> AlignmentResult {
    let sites = slide.run_sites();
    let fitted = fit_with_warning(slide.part_name(), lines, sites.len(), "text unit");

    let mut applied = 0;
    // Back to front: a replacement only shifts siblings that come after it.
    for (site, line) in sites.iter().zip(&fitted.lines).rev() {
        let original = slide
            .root()
            .at(&site.path)
            .map(Element::text)
            .unwrap_or_default();
        let body = site.bullet.strip(line, &original);
        if replace_unit(slide.root_mut(), &site.path, body) {
            applied += 1;
        }
    }

    AlignmentResult {
        method: AlignmentMethod::RunLevel,
        run_count,
        source_count: sites.len(),
        applied_count: applied,
        line_count: lines.len(),
        padded: fitted.padded,
        dropped: fitted.dropped,
    }
}

/// Swap the `a:t` at `path` for the element sequence encoding `line`.
fn replace_unit(root: &mut Element, path: &[usize], line: &str) -> bool {
    let Some((&index, parent_path)) = path.split_last() else {
        return false;
    };
    let Some(parent) = root.at_mut(parent_path) else {
        return false;
    };
    let template = match parent.children.get(index) {
        Some(Node::Element(unit)) => {
            let mut template = unit.clone();
            template.children.clear();
            template
        }
        _ => return false,
    };

    let mut nodes = Vec::new();
    for segment in linefile::split_segments(line) {
        let mut unit = template.clone();
        unit.set_text(&segment.text);
        unit.set_attr("xml:space", "preserve");
        nodes.push(Node::Element(unit));

        match segment.separator {
            Separator::LineBreak => nodes.push(Node::Element(template.sibling("br"))),
            Separator::Tab => nodes.push(Node::Element(template.sibling("tab"))),
            Separator::None => {}
        }
    }

    parent.children.splice(index..=index, nodes);
    true
}

/// One line per retained paragraph; formula-only paragraphs stay untouched.
fn patch_paragraphs(
    slide: &mut SlideDocument,
    lines: &[String],
    run_count: usize,
) -> AlignmentResult {
    let sites = slide.paragraph_sites();
    let mut result = AlignmentResult {
        method: AlignmentMethod::ParagraphLevel,
        run_count,
        source_count: sites.len(),
        applied_count: 0,
        line_count: lines.len(),
        padded: 0,
        dropped: 0,
    };

    if sites.is_empty() {
        log::info!("{}: no paragraphs to patch", slide.part_name());
        return result;
    }

    let fitted = fit_with_warning(slide.part_name(), lines, sites.len(), "paragraph");
    result.padded = fitted.padded;
    result.dropped = fitted.dropped;

    for (site, line) in sites.iter().zip(&fitted.lines) {
        let Some(paragraph) = slide.root_mut().at_mut(&site.path) else {
            continue;
        };
        let original = read_paragraph(paragraph, BulletSpec::None).plain_text();
        if write_paragraph(paragraph, site.bullet.strip(line, &original)) {
            result.applied_count += 1;
        }
    }
    result
}

/// Write `line` into the text units of one paragraph.
///
/// Field values and inline formula text stay where they are; the line is cut
/// around them so the units only receive the text in between.
/// Returns `false` when the paragraph has no visible text outside formulas.
pub(crate) fn write_paragraph(paragraph: &mut Element, line: &str) -> bool {
    if visible_text(paragraph).trim().is_empty() {
        return false;
    }

    let anchors = anchors(paragraph);
    let mut slots: Vec<Vec<&Anchor>> = vec![Vec::new()];
    let mut separators = Vec::new();
    for anchor in &anchors {
        match anchor {
            Anchor::Separator(separator) => {
                separators.push(*separator);
                slots.push(Vec::new());
            }
            other => {
                if let Some(slot) = slots.last_mut() {
                    slot.push(other);
                }
            }
        }
    }

    let segments = linefile::split_segments(line);
    let mut writes: Vec<(&[usize], &str)> = Vec::new();
    let distributed = linefile::separators(&segments) == separators
        && segments
            .iter()
            .zip(&slots)
            .all(|(segment, slot)| place(&segment.text, slot, &mut writes));

    if !distributed {
        writes.clear();
        let flat: Vec<&Anchor> = slots.iter().flatten().copied().collect();
        if !place(line, &flat, &mut writes) {
            // Whole line into the first unit.
            writes.clear();
            let units = flat.iter().filter_map(|anchor| match *anchor {
                Anchor::Unit(path) => Some(path.as_slice()),
                _ => None,
            });
            for (i, unit) in units.enumerate() {
                writes.push((unit, if i == 0 { line } else { "" }));
            }
        }
    }

    for (path, text) in writes {
        if let Some(unit) = paragraph.at_mut(path) {
            unit.set_text(text);
            unit.set_attr("xml:space", "preserve");
        }
    }
    true
}

/// Spread `text` over the units in `items`, cutting it at each fixed text in
/// order. Fails when a fixed text is missing or text falls between two fixed
/// texts with no unit to hold it.
fn place<'a>(
    text: &'a str,
    items: &[&'a Anchor],
    writes: &mut Vec<(&'a [usize], &'a str)>,
) -> bool {
    let mut rest = text;
    let mut group: Vec<&'a [usize]> = Vec::new();
    for item in items {
        match *item {
            Anchor::Unit(path) => group.push(path.as_slice()),
            Anchor::Fixed(fixed) => {
                let Some(at) = rest.find(fixed.as_str()) else {
                    return false;
                };
                if !fill(&group, &rest[..at], writes) {
                    return false;
                }
                group.clear();
                rest = &rest[at + fixed.len()..];
            }
            Anchor::Separator(_) => {}
        }
    }
    fill(&group, rest, writes)
}

/// First unit of the group takes `text`, the others are blanked.
fn fill<'a>(
    group: &[&'a [usize]],
    text: &'a str,
    writes: &mut Vec<(&'a [usize], &'a str)>,
) -> bool {
    if group.is_empty() {
        return text.is_empty();
    }
    for (i, path) in group.iter().enumerate() {
        writes.push((*path, if i == 0 { text } else { "" }));
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slide::tests::{shape, slide_xml};
    use crate::xml::{XmlDocument, NS_A};

    const PART: &str = "ppt/slides/slide1.xml";

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn patch(tree: &str, new_lines: &[&str]) -> (SlideDocument, AlignmentResult) {
        let xml = slide_xml(tree);
        let (bytes, result) = SlideWriter::new()
            .patch_part(PART, xml.as_bytes(), &lines(new_lines))
            .unwrap();
        (SlideDocument::parse(PART, &bytes).unwrap(), result)
    }

    fn paragraphs(count: usize) -> String {
        let body: String = (1..=count)
            .map(|i| format!("<a:p><a:r><a:t>P{}</a:t></a:r><a:r><a:t>x</a:t></a:r></a:p>", i))
            .collect();
        shape(None, &body)
    }

    #[test]
    fn test_run_level_one_line_per_unit() {
        let tree = shape(
            None,
            "<a:p><a:r><a:t>One</a:t></a:r></a:p><a:p><a:r><a:t>Two</a:t></a:r></a:p>",
        );
        let (slide, result) = patch(&tree, &["Uno", "Dos"]);
        assert_eq!(result.method, AlignmentMethod::RunLevel);
        assert_eq!(result.applied_count, 2);
        assert_eq!(slide.lines(), vec!["Uno", "Dos"]);
    }

    #[test]
    fn test_run_level_expands_breaks_and_tabs() {
        let tree = shape(None, "<a:p><a:r><a:t>One</a:t></a:r></a:p>");
        let (slide, result) = patch(&tree, &["a\\nb\\tc"]);
        assert_eq!(result.method, AlignmentMethod::RunLevel);
        assert_eq!(slide.lines(), vec!["a\\nb\\tc"]);
        assert_eq!(slide.run_count(), 3);

        let root = slide.root();
        let preserved = root
            .descendants()
            .into_iter()
            .filter(|e| e.local_name() == "t")
            .all(|t| t.attr("xml:space").as_deref() == Some("preserve"));
        assert!(preserved);
    }

    #[test]
    fn test_run_level_ignores_placeholder_filter() {
        // Footer text is never extracted, yet the raw run scan still writes it.
        let tree = format!(
            "{}{}",
            shape(None, "<a:p><a:r><a:t>Body</a:t></a:r></a:p>"),
            shape(Some("ftr"), "<a:p><a:r><a:t>Footer</a:t></a:r></a:p>"),
        );
        let (slide, result) = patch(&tree, &["Cuerpo", "Pie"]);
        assert_eq!(result.method, AlignmentMethod::RunLevel);
        assert_eq!(result.source_count, 2);
        let texts: Vec<String> = slide
            .root()
            .descendants()
            .into_iter()
            .filter(|e| e.local_name() == "t")
            .map(Element::text)
            .collect();
        assert_eq!(texts, vec!["Cuerpo", "Pie"]);
    }

    #[test]
    fn test_run_level_strips_bullet_prefix() {
        let tree = shape(
            None,
            r#"<a:p><a:pPr><a:buChar char="•"/></a:pPr><a:r><a:t>Item</a:t></a:r></a:p>"#,
        );
        let (slide, _) = patch(&tree, &["• Punto"]);
        assert_eq!(slide.lines(), vec!["• Punto"]);
    }

    #[test]
    fn test_paragraph_level_first_unit_gets_line() {
        let (slide, result) = patch(&paragraphs(1), &["New text", "spare", "extra", "more"]);
        assert_eq!(result.method, AlignmentMethod::ParagraphLevel);
        assert_eq!(result.source_count, 1);
        assert_eq!(result.dropped, 3);
        assert_eq!(slide.lines(), vec!["New text"]);

        let texts: Vec<String> = slide
            .root()
            .descendants()
            .into_iter()
            .filter(|e| e.local_name() == "t")
            .map(Element::text)
            .collect();
        assert_eq!(texts, vec!["New text", ""]);
    }

    #[test]
    fn test_paragraph_level_pads_short_files() {
        let (slide, result) = patch(&paragraphs(5), &["A", "B"]);
        assert_eq!(result.method, AlignmentMethod::ParagraphLevel);
        assert_eq!(result.padded, 3);
        assert_eq!(result.dropped, 0);
        assert_eq!(result.applied_count, 5);
        assert_eq!(slide.lines(), vec!["A", "B", "", "", ""]);
    }

    #[test]
    fn test_paragraph_level_truncates_long_files() {
        let (slide, result) = patch(&paragraphs(5), &["1", "2", "3", "4", "5", "6", "7"]);
        assert_eq!(result.method, AlignmentMethod::ParagraphLevel);
        assert_eq!(result.dropped, 2);
        assert_eq!(slide.lines(), vec!["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn test_paragraph_level_keeps_formula_markup() {
        let formula = r#"<a14:m><m:oMathPara><m:oMath><m:sSup><m:e><m:r><m:t>x</m:t></m:r></m:e><m:sup><m:r><m:t>2</m:t></m:r></m:sup></m:sSup></m:oMath></m:oMathPara></a14:m>"#;
        let tree = shape(
            None,
            &format!(
                "<a:p><a:r><a:t>Area is</a:t></a:r>{}</a:p><a:p><a:r><a:t>a</a:t></a:r></a:p><a:p><a:r><a:t>b</a:t></a:r></a:p><a:p><a:r><a:t>c</a:t></a:r></a:p>",
                formula
            ),
        );
        let before = XmlDocument::parse(&slide_xml(&tree)).unwrap();
        let (slide, result) = patch(&tree, &["El área es"]);
        assert_eq!(result.method, AlignmentMethod::ParagraphLevel);

        let find_math = |root: &Element| -> Element {
            root.descendants()
                .into_iter()
                .find(|e| e.local_name() == "oMathPara")
                .cloned()
                .unwrap()
        };
        assert_eq!(find_math(&before.root), find_math(slide.root()));
        assert_eq!(slide.paragraphs()[0].plain_text(), "El área es");
    }

    #[test]
    fn test_paragraph_level_skips_formula_only_paragraph() {
        let tree = shape(
            None,
            r#"<a:p><a14:m><m:oMathPara><m:oMath><m:r><m:t>y</m:t></m:r></m:oMath></m:oMathPara></a14:m></a:p><a:p><a:r><a:t>old</a:t></a:r></a:p>"#,
        );
        let (slide, result) = patch(&tree, &["injected", "new"]);
        assert_eq!(result.method, AlignmentMethod::ParagraphLevel);
        assert_eq!(result.applied_count, 1);
        assert_eq!(slide.lines(), vec!["", "new"]);
        assert!(!slide
            .root()
            .descendants()
            .into_iter()
            .any(|e| e.text().contains("injected")));
    }

    #[test]
    fn test_paragraph_level_distributes_over_breaks() {
        let tree = shape(
            None,
            "<a:p><a:r><a:t>Top</a:t></a:r><a:br/><a:r><a:t>Bottom</a:t></a:r></a:p><a:p/><a:p/><a:p/>",
        );
        let (slide, result) = patch(&tree, &["Arriba\\nAbajo"]);
        assert_eq!(result.method, AlignmentMethod::ParagraphLevel);
        assert_eq!(slide.lines()[0], "Arriba\\nAbajo");
    }

    #[test]
    fn test_paragraph_level_mismatched_breaks_use_first_unit() {
        let mut doc = XmlDocument::parse(
            r#"<a:p xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"><a:r><a:t>Top</a:t></a:r><a:br/><a:r><a:t>Bottom</a:t></a:r></a:p>"#,
        )
        .unwrap();
        assert!(write_paragraph(&mut doc.root, "All on one"));
        let texts: Vec<String> = doc
            .root
            .descendants()
            .into_iter()
            .filter(|e| e.local_name() == "t")
            .map(Element::text)
            .collect();
        assert_eq!(texts, vec!["All on one", ""]);
        assert!(doc.root.descendants().iter().any(|e| e.local_name() == "br"));
    }

    fn unit_texts(slide: &SlideDocument) -> Vec<String> {
        slide
            .root()
            .descendants()
            .into_iter()
            .filter(|e| e.is(NS_A, "t"))
            .map(Element::text)
            .collect()
    }

    #[test]
    fn test_paragraph_level_leaves_field_text_in_place() {
        let tree = shape(
            None,
            r#"<a:p><a:r><a:t>Slide </a:t></a:r><a:fld id="{5}" type="slidenum"><a:t>3</a:t></a:fld><a:r><a:t> of 9</a:t></a:r></a:p>"#,
        );
        let (slide, result) = patch(&tree, &["Slide 3 of 9"]);
        assert_eq!(result.method, AlignmentMethod::ParagraphLevel);
        assert_eq!(slide.lines(), vec!["Slide 3 of 9"]);
        assert_eq!(unit_texts(&slide), vec!["Slide ", "3", " of 9"]);

        let (slide, _) = patch(&tree, &["Diapositiva 3 de 9"]);
        assert_eq!(slide.lines(), vec!["Diapositiva 3 de 9"]);
        assert_eq!(unit_texts(&slide), vec!["Diapositiva ", "3", " de 9"]);
    }

    #[test]
    fn test_paragraph_level_leaves_loose_math_text_in_place() {
        let tree = shape(
            None,
            "<a:p><a:r><a:t>x</a:t></a:r><m:t>=1</m:t><a:r><a:t> ok</a:t></a:r></a:p>",
        );
        let (slide, result) = patch(&tree, &["x=1 ok"]);
        assert_eq!(result.method, AlignmentMethod::ParagraphLevel);
        assert_eq!(slide.lines(), vec!["x=1 ok"]);

        let (slide, _) = patch(&tree, &["y=1 bien"]);
        assert_eq!(slide.lines(), vec!["y=1 bien"]);
        assert_eq!(unit_texts(&slide), vec!["y", " bien"]);
    }

    #[test]
    fn test_paragraph_level_keeps_body_leading_space_under_bullet() {
        let tree = shape(
            None,
            r#"<a:p><a:pPr><a:buChar char="•"/></a:pPr><a:r><a:t> lead</a:t></a:r><a:r><a:t>ing</a:t></a:r></a:p>"#,
        );
        let xml = slide_xml(&tree);
        let before = SlideDocument::parse(PART, xml.as_bytes()).unwrap();
        assert_eq!(before.lines(), vec!["• leading"]);

        let (slide, result) = patch(&tree, &["• leading"]);
        assert_eq!(result.method, AlignmentMethod::ParagraphLevel);
        assert_eq!(slide.paragraphs()[0].plain_text(), " leading");
        assert_eq!(slide.lines(), vec!["• leading"]);
    }

    #[test]
    fn test_zero_paragraphs_is_noop() {
        let (slide, result) = patch("", &["orphan"]);
        assert_eq!(result.method, AlignmentMethod::ParagraphLevel);
        assert_eq!(result.source_count, 0);
        assert_eq!(result.applied_count, 0);
        assert!(slide.lines().is_empty());
    }

    #[test]
    fn test_patch_part_reports_malformed_xml() {
        let err = SlideWriter::new()
            .patch_part(PART, b"<p:sld>", &lines(&["x"]))
            .unwrap_err();
        assert!(err.is_part_scoped());
    }

    #[test]
    fn test_serialization_declares_utf8() {
        let xml = slide_xml(&paragraphs(1));
        let (bytes, _) = SlideWriter::new()
            .with_indent(true)
            .patch_part(PART, xml.as_bytes(), &lines(&["Hola"]))
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#));
        assert!(text.contains(">Hola<"));
    }
}
