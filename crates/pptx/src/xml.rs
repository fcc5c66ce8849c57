//! Owned XML tree built on quick-xml events.
//!
//! Slide parts need to be edited in place and written back, so the event stream
//! is folded into a small tree. Text and attribute values are kept in their
//! escaped source form, which lets untouched content serialize back verbatim.

use quick_xml::escape::{escape, unescape};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};
use slidetext_core::{Error, Result};
use std::borrow::Cow;

/// DrawingML main namespace (`a:`).
pub const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
/// PresentationML main namespace (`p:`).
pub const NS_P: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
/// Office Math namespace (`m:`).
pub const NS_M: &str = "http://schemas.openxmlformats.org/officeDocument/2006/math";
/// Office 2010 drawing extensions (`a14:`), which wrap formula blocks.
pub const NS_A14: &str = "http://schemas.microsoft.com/office/drawing/2010/main";
/// OPC content types namespace.
pub const NS_CT: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
/// The reserved `xml:` namespace.
pub const NS_XML: &str = "http://www.w3.org/XML/1998/namespace";

/// A node of the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    /// Character data, escaped as in the source.
    Text(String),
    CData(String),
    Comment(String),
    Pi(String),
    DocType(String),
}

/// An element with its resolved namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Qualified name as written, e.g. `a:t`.
    pub name: String,
    /// Namespace URI bound to the element's prefix.
    pub namespace: Option<String>,
    /// Attributes in source order; values are escaped.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    /// Create an empty element.
    pub fn new(name: impl Into<String>, namespace: Option<String>) -> Self {
        Self {
            name: name.into(),
            namespace,
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Create an element in the same namespace and with the same prefix as `self`.
    pub fn sibling(&self, local: &str) -> Element {
        let name = match self.prefix() {
            Some(prefix) => format!("{}:{}", prefix, local),
            None => local.to_string(),
        };
        Element::new(name, self.namespace.clone())
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(p, _)| p)
    }

    pub fn local_name(&self) -> &str {
        self.name
            .split_once(':')
            .map(|(_, l)| l)
            .unwrap_or(&self.name)
    }

    /// Whether this element is `{ns}local`.
    pub fn is(&self, ns: &str, local: &str) -> bool {
        self.local_name() == local && self.namespace.as_deref() == Some(ns)
    }

    /// Unescaped value of an attribute by qualified name.
    pub fn attr(&self, name: &str) -> Option<String> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| unescape_lossy(v).into_owned())
    }

    /// Set an attribute, escaping the value.
    pub fn set_attr(&mut self, name: &str, value: &str) {
        let escaped = escape(value).into_owned();
        match self.attributes.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = escaped,
            None => self.attributes.push((name.to_string(), escaped)),
        }
    }

    /// Child elements in order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Child elements paired with their index in `children`.
    pub fn indexed_elements(&self) -> impl Iterator<Item = (usize, &Element)> {
        self.children
            .iter()
            .enumerate()
            .filter_map(|(i, n)| match n {
                Node::Element(e) => Some((i, e)),
                _ => None,
            })
    }

    /// First child element named `{ns}local`.
    pub fn child(&self, ns: &str, local: &str) -> Option<&Element> {
        self.elements().find(|e| e.is(ns, local))
    }

    /// Follow a chain of child elements.
    pub fn child_path(&self, steps: &[(&str, &str)]) -> Option<&Element> {
        steps
            .iter()
            .try_fold(self, |el, (ns, local)| el.child(ns, local))
    }

    /// All descendant elements in document order (excluding `self`).
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        collect_descendants(self, &mut out);
        out
    }

    /// Concatenated, unescaped text of the direct text children.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            match node {
                Node::Text(raw) => out.push_str(&unescape_lossy(raw)),
                Node::CData(raw) => out.push_str(raw),
                _ => {}
            }
        }
        out
    }

    /// Replace all children with a single text node.
    pub fn set_text(&mut self, text: &str) {
        self.children.clear();
        if !text.is_empty() {
            self.children.push(Node::Text(escape(text).into_owned()));
        }
    }

    /// Element at a child-index path below `self`.
    pub fn at(&self, path: &[usize]) -> Option<&Element> {
        path.iter().try_fold(self, |el, &i| match el.children.get(i) {
            Some(Node::Element(child)) => Some(child),
            _ => None,
        })
    }

    /// Mutable element at a child-index path below `self`.
    pub fn at_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        let mut el = self;
        for &i in path {
            el = match el.children.get_mut(i) {
                Some(Node::Element(child)) => child,
                _ => return None,
            };
        }
        Some(el)
    }

    /// Drop whitespace-only text between child elements.
    fn drop_blank_text(&mut self) {
        if self.elements().next().is_some() {
            self.children.retain(|n| match n {
                Node::Text(t) => !t.trim().is_empty(),
                _ => true,
            });
        }
    }
}

fn collect_descendants<'a>(el: &'a Element, out: &mut Vec<&'a Element>) {
    for child in el.elements() {
        out.push(child);
        collect_descendants(child, out);
    }
}

fn unescape_lossy(raw: &str) -> Cow<'_, str> {
    unescape(raw).unwrap_or(Cow::Borrowed(raw))
}

/// XML declaration fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub version: String,
    pub standalone: Option<String>,
}

impl Default for Declaration {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            standalone: Some("yes".to_string()),
        }
    }
}

/// A parsed XML part.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    pub declaration: Option<Declaration>,
    /// Comments and processing instructions before the root.
    pub prolog: Vec<Node>,
    pub root: Element,
}

impl XmlDocument {
    /// Parse a document, resolving namespace prefixes.
    ///
    /// Whitespace-only text between elements is discarded so the tree can be
    /// re-indented on output.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(false);
        reader.check_end_names(true);

        let mut declaration = None;
        let mut prolog = Vec::new();
        let mut root: Option<Element> = None;
        let mut stack: Vec<Element> = Vec::new();
        let mut scopes = NamespaceScopes::default();

        loop {
            let event = reader
                .read_event()
                .map_err(|e| xml_error(&reader, e.to_string()))?;

            let node = match event {
                Event::Decl(ref d) => {
                    declaration = Some(read_declaration(d));
                    continue;
                }
                Event::Start(ref e) => {
                    let el = scopes.open(e)?;
                    stack.push(el);
                    continue;
                }
                Event::Empty(ref e) => {
                    let el = scopes.open(e)?;
                    scopes.close();
                    Node::Element(el)
                }
                Event::End(_) => {
                    let mut el = stack
                        .pop()
                        .ok_or_else(|| xml_error(&reader, "unexpected closing tag".to_string()))?;
                    scopes.close();
                    el.drop_blank_text();
                    Node::Element(el)
                }
                Event::Text(ref t) => Node::Text(String::from_utf8_lossy(t).into_owned()),
                Event::CData(ref c) => Node::CData(String::from_utf8_lossy(c).into_owned()),
                Event::Comment(ref c) => Node::Comment(String::from_utf8_lossy(c).into_owned()),
                Event::PI(ref p) => Node::Pi(String::from_utf8_lossy(p).into_owned()),
                Event::DocType(ref d) => Node::DocType(String::from_utf8_lossy(d).into_owned()),
                Event::Eof => break,
            };

            match stack.last_mut() {
                Some(parent) => parent.children.push(node),
                None => match node {
                    Node::Element(el) if root.is_none() => root = Some(el),
                    Node::Element(_) => {
                        return Err(xml_error(&reader, "multiple root elements".to_string()))
                    }
                    Node::Text(t) if t.trim().is_empty() => {}
                    Node::Text(_) | Node::CData(_) => {
                        return Err(xml_error(&reader, "text outside root element".to_string()))
                    }
                    other if root.is_none() => prolog.push(other),
                    _ => {}
                },
            }
        }

        if let Some(open) = stack.last() {
            return Err(Error::XmlError(format!(
                "unexpected end of document inside <{}>",
                open.name
            )));
        }
        let root = root.ok_or_else(|| Error::XmlError("document has no root element".to_string()))?;

        Ok(Self {
            declaration,
            prolog,
            root,
        })
    }

    /// Parse raw part bytes, accepting an optional UTF-8 byte-order mark.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        let xml = std::str::from_utf8(bytes)
            .map_err(|e| Error::XmlError(format!("part is not valid UTF-8: {}", e)))?;
        Self::parse(xml)
    }

    /// Serialize with an explicit UTF-8 declaration.
    ///
    /// With `indent`, element-only content is pretty-printed two spaces deep;
    /// text content is never re-flowed.
    pub fn to_bytes(&self, indent: bool) -> Result<Vec<u8>> {
        let mut writer = if indent {
            Writer::new_with_indent(Vec::new(), b' ', 2)
        } else {
            Writer::new(Vec::new())
        };

        let decl = self.declaration.clone().unwrap_or_default();
        write(
            &mut writer,
            Event::Decl(BytesDecl::new(
                &decl.version,
                Some("UTF-8"),
                decl.standalone.as_deref(),
            )),
        )?;
        if !indent {
            writer
                .get_mut()
                .extend_from_slice(b"\r\n");
        }
        for node in &self.prolog {
            write_node(&mut writer, node)?;
        }
        write_element(&mut writer, &self.root)?;

        Ok(writer.into_inner())
    }
}

fn xml_error(reader: &Reader<&[u8]>, message: String) -> Error {
    Error::XmlError(format!("{} (at byte {})", message, reader.buffer_position()))
}

fn read_declaration(d: &BytesDecl<'_>) -> Declaration {
    let version = d
        .version()
        .map(|v| String::from_utf8_lossy(&v).into_owned())
        .unwrap_or_else(|_| "1.0".to_string());
    let standalone = d
        .standalone()
        .and_then(|r| r.ok())
        .map(|v| String::from_utf8_lossy(&v).into_owned());
    Declaration {
        version,
        standalone,
    }
}

/// Prefix-to-namespace bindings of the currently open elements.
#[derive(Default)]
struct NamespaceScopes {
    frames: Vec<Vec<(String, String)>>,
}

impl NamespaceScopes {
    /// Turn a start tag into an element and push its bindings.
    fn open(&mut self, start: &BytesStart<'_>) -> Result<Element> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        let mut frame = Vec::new();

        for attr in start.attributes() {
            let attr = attr.map_err(|e| Error::XmlError(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = String::from_utf8_lossy(&attr.value).into_owned();
            if key == "xmlns" {
                frame.push((String::new(), unescape_lossy(&value).into_owned()));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                frame.push((prefix.to_string(), unescape_lossy(&value).into_owned()));
            }
            attributes.push((key, value));
        }
        self.frames.push(frame);

        let prefix = name.split_once(':').map(|(p, _)| p).unwrap_or("");
        let namespace = self.resolve(prefix);
        Ok(Element {
            name,
            namespace,
            attributes,
            children: Vec::new(),
        })
    }

    fn close(&mut self) {
        self.frames.pop();
    }

    fn resolve(&self, prefix: &str) -> Option<String> {
        if prefix == "xml" {
            return Some(NS_XML.to_string());
        }
        self.frames
            .iter()
            .rev()
            .flat_map(|frame| frame.iter())
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.clone())
    }
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| Error::XmlError(e.to_string()))
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &Node) -> Result<()> {
    match node {
        Node::Element(el) => write_element(writer, el),
        Node::Text(raw) if raw.is_empty() => Ok(()),
        Node::Text(raw) => write(writer, Event::Text(BytesText::from_escaped(raw.as_str()))),
        Node::CData(raw) => write(writer, Event::CData(BytesCData::new(raw.as_str()))),
        Node::Comment(raw) => write(writer, Event::Comment(BytesText::from_escaped(raw.as_str()))),
        Node::Pi(raw) => write(writer, Event::PI(BytesText::from_escaped(raw.as_str()))),
        Node::DocType(raw) => write(writer, Event::DocType(BytesText::from_escaped(raw.as_str()))),
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, el: &Element) -> Result<()> {
    let mut start = BytesStart::new(el.name.as_str());
    for (key, value) in &el.attributes {
        start.push_attribute(Attribute {
            key: QName(key.as_bytes()),
            value: Cow::Borrowed(value.as_bytes()),
        });
    }

    if el.children.is_empty() {
        return write(writer, Event::Empty(start));
    }

    write(writer, Event::Start(start))?;
    for child in &el.children {
        write_node(writer, child)?;
    }
    write(writer, Event::End(BytesEnd::new(el.name.as_str())))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main">
  <p:cSld>
    <p:spTree>
      <p:sp>
        <p:txBody>
          <a:p><a:r><a:t> Fish &amp; chips </a:t></a:r></a:p>
        </p:txBody>
      </p:sp>
    </p:spTree>
  </p:cSld>
</p:sld>"#;

    #[test]
    fn test_parse_resolves_namespaces() {
        let doc = XmlDocument::parse(SAMPLE).unwrap();
        assert!(doc.root.is(NS_P, "sld"));
        let tree = doc
            .root
            .child_path(&[(NS_P, "cSld"), (NS_P, "spTree")])
            .unwrap();
        let t = tree
            .descendants()
            .into_iter()
            .find(|e| e.is(NS_A, "t"))
            .unwrap();
        assert_eq!(t.text(), " Fish & chips ");
        assert_eq!(
            doc.declaration.as_ref().unwrap().standalone.as_deref(),
            Some("yes")
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(XmlDocument::parse("<a><b></a>").is_err());
        assert!(XmlDocument::parse("<a><b>").is_err());
        assert!(XmlDocument::parse("").is_err());
    }

    #[test]
    fn test_serialize_keeps_text_and_escapes() {
        let doc = XmlDocument::parse(SAMPLE).unwrap();
        let out = String::from_utf8(doc.to_bytes(true).unwrap()).unwrap();
        assert!(out.starts_with(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#));
        assert!(out.contains("<a:t> Fish &amp; chips </a:t>"));

        let reparsed = XmlDocument::parse(&out).unwrap();
        assert_eq!(reparsed.root, doc.root);
    }

    #[test]
    fn test_compact_serialization_is_stable() {
        let doc = XmlDocument::parse(SAMPLE).unwrap();
        let once = doc.to_bytes(false).unwrap();
        let twice = XmlDocument::from_bytes(&once).unwrap().to_bytes(false).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_set_text_and_attr() {
        let mut el = Element::new("a:t", Some(NS_A.to_string()));
        el.set_text("a < b");
        el.set_attr("xml:space", "preserve");
        assert_eq!(el.text(), "a < b");
        assert_eq!(el.attr("xml:space").as_deref(), Some("preserve"));
        assert_eq!(el.children, vec![Node::Text("a &lt; b".to_string())]);

        let br = el.sibling("br");
        assert_eq!(br.name, "a:br");
        assert!(br.is(NS_A, "br"));
    }

    #[test]
    fn test_path_access() {
        let mut doc = XmlDocument::parse(SAMPLE).unwrap();
        // p:cSld / p:spTree / p:sp / p:txBody / a:p
        let path = [0, 0, 0, 0, 0];
        assert!(doc.root.at(&path).unwrap().is(NS_A, "p"));
        doc.root.at_mut(&path).unwrap().set_attr("marker", "1");
        assert_eq!(doc.root.at(&path).unwrap().attr("marker").as_deref(), Some("1"));
        assert!(doc.root.at(&[9]).is_none());
    }
}
