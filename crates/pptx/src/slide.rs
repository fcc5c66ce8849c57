//! Slide model reader.
//!
//! Walks a slide part in reading order and turns every retained `a:p` into a
//! [`Paragraph`]. The same walk yields the paragraph locations that the
//! alignment writer patches, so extraction and reintegration always agree on
//! paragraph order.

use crate::package::Package;
use crate::xml::{Element, XmlDocument, NS_A, NS_M, NS_P};
use slidetext_core::{BulletSpec, ExtractedSlide, Paragraph, Result, Segment, Separator};

/// Placeholder types whose text never reaches a line file.
pub const SKIPPED_PLACEHOLDERS: &[&str] = &["dt", "sldNum", "ftr", "hdr"];

/// Location of a paragraph in the slide tree plus its resolved bullet.
#[derive(Debug, Clone, PartialEq)]
pub struct ParagraphSite {
    /// Child-index path from the root element to the `a:p`.
    pub path: Vec<usize>,
    pub bullet: BulletSpec,
}

/// Location of one `a:t` text unit found by the raw document scan.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSite {
    pub path: Vec<usize>,
    /// Bullet of the owning paragraph when this is its first text unit.
    pub bullet: BulletSpec,
}

/// Writable content of a paragraph outside formulas, in order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Anchor {
    /// An `a:t` directly inside an `a:r`, path relative to the paragraph.
    Unit(Vec<usize>),
    /// Field or formula text that reaches the line but is never rewritten.
    Fixed(String),
    /// A break or tab marker.
    Separator(Separator),
}

/// Node kinds that steer the reading-order walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShapeKind {
    Shape,
    Group,
    GraphicFrame,
    TextBody,
    Other,
}

impl ShapeKind {
    fn of(el: &Element) -> Self {
        if el.is(NS_P, "sp") {
            ShapeKind::Shape
        } else if el.is(NS_P, "grpSp") {
            ShapeKind::Group
        } else if el.is(NS_P, "graphicFrame") {
            ShapeKind::GraphicFrame
        } else if is_text_body(el) {
            ShapeKind::TextBody
        } else {
            ShapeKind::Other
        }
    }
}

/// A parsed slide part.
#[derive(Debug, Clone)]
pub struct SlideDocument {
    part: String,
    doc: XmlDocument,
}

impl SlideDocument {
    /// Parse a slide part; parse failures become [`slidetext_core::Error::MalformedPart`].
    pub fn parse(part: &str, bytes: &[u8]) -> Result<Self> {
        let doc = XmlDocument::from_bytes(bytes).map_err(|e| e.in_part(part))?;
        Ok(Self {
            part: part.to_string(),
            doc,
        })
    }

    pub fn part_name(&self) -> &str {
        &self.part
    }

    pub fn root(&self) -> &Element {
        &self.doc.root
    }

    pub(crate) fn root_mut(&mut self) -> &mut Element {
        &mut self.doc.root
    }

    /// Retained paragraphs in reading order.
    pub fn paragraph_sites(&self) -> Vec<ParagraphSite> {
        collect_sites(&self.doc.root)
    }

    /// Every `a:t` in document order, placeholders included.
    pub fn run_sites(&self) -> Vec<RunSite> {
        let mut out = Vec::new();
        scan_runs(&self.doc.root, &mut Vec::new(), None, &mut None, &mut out);
        out
    }

    /// Number of minimal text-bearing units on the slide.
    pub fn run_count(&self) -> usize {
        self.doc
            .root
            .descendants()
            .into_iter()
            .filter(|e| e.is(NS_A, "t"))
            .count()
    }

    /// Paragraph models in reading order.
    pub fn paragraphs(&self) -> Vec<Paragraph> {
        self.paragraph_sites()
            .into_iter()
            .filter_map(|site| {
                self.doc
                    .root
                    .at(&site.path)
                    .map(|p| read_paragraph(p, site.bullet))
            })
            .collect()
    }

    /// Line-file lines, one per paragraph.
    pub fn lines(&self) -> Vec<String> {
        self.paragraphs().iter().map(Paragraph::to_line).collect()
    }

    /// Serialize the slide with an explicit UTF-8 declaration.
    pub fn to_bytes(&self, indent: bool) -> Result<Vec<u8>> {
        self.doc.to_bytes(indent).map_err(|e| e.in_part(&self.part))
    }
}

/// Reads slide text out of a package.
#[derive(Debug, Clone)]
pub struct SlideReader;

impl SlideReader {
    /// Create a new slide reader.
    pub fn new() -> Self {
        Self
    }

    /// Read one slide by number. Returns `Ok(None)` when the part does not exist.
    pub fn read_slide(&self, package: &Package, number: usize) -> Result<Option<ExtractedSlide>> {
        let part = Package::slide_part_name(number);
        let Some(bytes) = package.part(&part) else {
            return Ok(None);
        };

        let slide = SlideDocument::parse(&part, bytes)?;
        let mut extracted = ExtractedSlide::new(number);
        extracted.paragraphs = slide.paragraphs();
        Ok(Some(extracted))
    }
}

impl Default for SlideReader {
    fn default() -> Self {
        Self::new()
    }
}

fn is_text_body(el: &Element) -> bool {
    el.local_name() == "txBody"
        && matches!(el.namespace.as_deref(), Some(NS_A) | Some(NS_P))
}

fn is_formula_block(el: &Element) -> bool {
    el.is(NS_M, "oMath") || el.is(NS_M, "oMathPara")
}

/// Whether a `p:sp` is a date, slide-number, footer or header placeholder.
fn is_skipped_placeholder(shape: &Element) -> bool {
    shape
        .child_path(&[(NS_P, "nvSpPr"), (NS_P, "nvPr"), (NS_P, "ph")])
        .and_then(|ph| ph.attr("type"))
        .is_some_and(|t| SKIPPED_PLACEHOLDERS.contains(&t.as_str()))
}

fn collect_sites(root: &Element) -> Vec<ParagraphSite> {
    let mut out = Vec::new();
    let mut path = Vec::new();

    let tree = root.indexed_elements().find(|(_, e)| e.is(NS_P, "cSld")).and_then(
        |(i, c_sld)| {
            c_sld
                .indexed_elements()
                .find(|(_, e)| e.is(NS_P, "spTree"))
                .map(|(j, tree)| (vec![i, j], tree))
        },
    );

    match tree {
        Some((tree_path, tree)) => {
            path.extend(tree_path);
            visit_children(tree, &mut path, &mut out);
        }
        None => scan_frame(root, &mut path, &mut out),
    }
    out
}

fn visit_children(el: &Element, path: &mut Vec<usize>, out: &mut Vec<ParagraphSite>) {
    for (i, child) in el.indexed_elements() {
        path.push(i);
        visit(child, path, out);
        path.pop();
    }
}

fn visit(el: &Element, path: &mut Vec<usize>, out: &mut Vec<ParagraphSite>) {
    match ShapeKind::of(el) {
        ShapeKind::Shape => {
            if is_skipped_placeholder(el) {
                return;
            }
            for (i, child) in el.indexed_elements() {
                if is_text_body(child) {
                    path.push(i);
                    collect_text_body(child, path, out);
                    path.pop();
                }
            }
        }
        ShapeKind::Group | ShapeKind::Other => visit_children(el, path, out),
        ShapeKind::GraphicFrame => scan_frame(el, path, out),
        ShapeKind::TextBody => collect_text_body(el, path, out),
    }
}

/// Collect paragraphs anywhere below `el`, without placeholder semantics.
fn scan_frame(el: &Element, path: &mut Vec<usize>, out: &mut Vec<ParagraphSite>) {
    for (i, child) in el.indexed_elements() {
        path.push(i);
        if is_text_body(child) {
            collect_text_body(child, path, out);
        } else if child.is(NS_A, "p") {
            out.push(ParagraphSite {
                path: path.clone(),
                bullet: resolve_bullet(child, None),
            });
        } else {
            scan_frame(child, path, out);
        }
        path.pop();
    }
}

fn collect_text_body(body: &Element, path: &mut Vec<usize>, out: &mut Vec<ParagraphSite>) {
    let list_style = body.child(NS_A, "lstStyle");
    for (i, child) in body.indexed_elements() {
        if child.is(NS_A, "p") {
            path.push(i);
            out.push(ParagraphSite {
                path: path.clone(),
                bullet: resolve_bullet(child, list_style),
            });
            path.pop();
        }
    }
}

fn scan_runs<'a>(
    el: &'a Element,
    path: &mut Vec<usize>,
    list_style: Option<&'a Element>,
    paragraph: &mut Option<(BulletSpec, bool)>,
    out: &mut Vec<RunSite>,
) {
    let list_style = if is_text_body(el) {
        el.child(NS_A, "lstStyle")
    } else {
        list_style
    };

    for (i, child) in el.indexed_elements() {
        path.push(i);
        if child.is(NS_A, "t") {
            let bullet = match paragraph.as_mut() {
                Some((bullet, first)) if *first => {
                    *first = false;
                    bullet.clone()
                }
                _ => BulletSpec::None,
            };
            out.push(RunSite {
                path: path.clone(),
                bullet,
            });
        } else if child.is(NS_A, "p") {
            let mut state = Some((resolve_bullet(child, list_style), true));
            scan_runs(child, path, list_style, &mut state, out);
        } else {
            scan_runs(child, path, list_style, paragraph, out);
        }
        path.pop();
    }
}

/// Resolve a paragraph's bullet from its own properties or the list style.
///
/// The list style is indexed by `lvl + 1`, clamped to `lvl1pPr..lvl9pPr`.
pub fn resolve_bullet(paragraph: &Element, list_style: Option<&Element>) -> BulletSpec {
    let properties = paragraph.child(NS_A, "pPr");

    if let Some(ppr) = properties {
        if let Some(c) = bullet_char(ppr) {
            return BulletSpec::Explicit(c);
        }
        if ppr.child(NS_A, "buNone").is_some() {
            return BulletSpec::None;
        }
    }

    let level = properties
        .and_then(|p| p.attr("lvl"))
        .and_then(|l| l.trim().parse::<i64>().ok())
        .unwrap_or(0);
    let index = (level + 1).clamp(1, 9);

    list_style
        .and_then(|style| style.child(NS_A, &format!("lvl{}pPr", index)))
        .and_then(bullet_char)
        .map(BulletSpec::Inherited)
        .unwrap_or_default()
}

fn bullet_char(properties: &Element) -> Option<String> {
    properties
        .child(NS_A, "buChar")
        .and_then(|b| b.attr("char"))
        .filter(|c| !c.is_empty())
}

/// Build the paragraph model for one `a:p`.
pub fn read_paragraph(paragraph: &Element, bullet: BulletSpec) -> Paragraph {
    let mut segments = Vec::new();

    for child in paragraph.elements() {
        if child.is(NS_A, "r") || child.is(NS_A, "fld") {
            read_run(child, &mut segments);
        } else if child.is(NS_A, "br") {
            segments.push(Segment::LineBreak);
        } else if child.is(NS_A, "tab") {
            segments.push(Segment::Tab);
        } else if child.is(NS_M, "t") {
            push_math(child.text(), &mut segments);
        }
    }

    Paragraph {
        segments,
        bullet,
        has_visible_text: !visible_text(paragraph).trim().is_empty(),
    }
}

fn read_run(run: &Element, segments: &mut Vec<Segment>) {
    for child in run.elements() {
        if child.is(NS_A, "t") {
            let text = child.text();
            if !text.is_empty() {
                segments.push(Segment::Text(text));
            }
        } else if child.is(NS_A, "tab") {
            segments.push(Segment::Tab);
        } else if child.is(NS_A, "br") {
            segments.push(Segment::LineBreak);
        }
    }

    for math in run.descendants().into_iter().filter(|e| e.is(NS_M, "t")) {
        push_math(math.text(), segments);
    }
}

fn push_math(text: String, segments: &mut Vec<Segment>) {
    if !text.is_empty() {
        segments.push(Segment::Math(text));
    }
}

/// Text of the run-level `a:t` units of a paragraph that sit outside formulas.
pub fn visible_text(paragraph: &Element) -> String {
    anchors(paragraph)
        .into_iter()
        .filter_map(|anchor| match anchor {
            Anchor::Unit(path) => paragraph.at(&path).map(Element::text),
            Anchor::Fixed(_) | Anchor::Separator(_) => None,
        })
        .collect()
}

/// Writable units, fixed text and separators of a paragraph in line order,
/// skipping formula subtrees and property elements.
pub(crate) fn anchors(paragraph: &Element) -> Vec<Anchor> {
    let mut out = Vec::new();
    collect_anchors(paragraph, &mut Vec::new(), &mut out);
    out
}

fn collect_anchors(el: &Element, path: &mut Vec<usize>, out: &mut Vec<Anchor>) {
    let paragraph = el.is(NS_A, "p");
    let inline_parent = paragraph || el.is(NS_A, "r") || el.is(NS_A, "fld");

    for (i, child) in el.indexed_elements() {
        if is_formula_block(child) {
            continue;
        }
        path.push(i);
        if child.is(NS_A, "t") {
            if el.is(NS_A, "r") {
                out.push(Anchor::Unit(path.clone()));
            }
        } else if inline_parent && child.is(NS_A, "br") {
            out.push(Anchor::Separator(Separator::LineBreak));
        } else if inline_parent && child.is(NS_A, "tab") {
            out.push(Anchor::Separator(Separator::Tab));
        } else if paragraph && child.is(NS_M, "t") {
            push_fixed(child.text(), out);
        } else if paragraph && child.is(NS_A, "fld") {
            for part in child.elements() {
                if part.is(NS_A, "t") {
                    push_fixed(part.text(), out);
                } else if part.is(NS_A, "br") {
                    out.push(Anchor::Separator(Separator::LineBreak));
                } else if part.is(NS_A, "tab") {
                    out.push(Anchor::Separator(Separator::Tab));
                }
            }
            push_run_math(child, out);
        } else if !is_property_element(child) {
            collect_anchors(child, path, out);
            if paragraph && child.is(NS_A, "r") {
                push_run_math(child, out);
            }
        }
        path.pop();
    }
}

// Mirrors `read_run`: formula text of a run follows its own text.
fn push_run_math(run: &Element, out: &mut Vec<Anchor>) {
    for math in run.descendants().into_iter().filter(|e| e.is(NS_M, "t")) {
        push_fixed(math.text(), out);
    }
}

fn push_fixed(text: String, out: &mut Vec<Anchor>) {
    if !text.is_empty() {
        out.push(Anchor::Fixed(text));
    }
}

fn is_property_element(el: &Element) -> bool {
    el.namespace.as_deref() == Some(NS_A)
        && matches!(el.local_name(), "pPr" | "rPr" | "endParaRPr")
}
