//! Owned, mutable XML element tree used for every IDML part.
//!
//! Parsing walks a `quick_xml::Reader` event stream. Serialization does not
//! go through `quick_xml::Writer`, instead hand-formatting XML with `write!`
//! plus a small local escape helper, which keeps attribute and text escaping
//! explicit and auditable at the one place it happens.

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::ArchiveError;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// A single XML element: tag name (kept verbatim, including any namespace
/// prefix such as `idPkg:Story`), its attributes in document order, and its
/// children.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(entry) = self.attrs.iter_mut().find(|(k, _)| k == name) {
            entry.1 = value;
        } else {
            self.attrs.push((name.to_string(), value));
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let idx = self.attrs.iter().position(|(k, _)| k == name)?;
        Some(self.attrs.remove(idx).1)
    }

    pub fn self_id(&self) -> Option<&str> {
        self.attr("Self")
    }

    pub fn xml_content(&self) -> Option<&str> {
        self.attr("XMLContent")
    }

    pub fn children_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn children_elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// First child with the given tag name, optionally at the given 1-based
    /// index among same-tag siblings (defaults to 1).
    pub fn child(&self, tag: &str, index: usize) -> Option<&Element> {
        self.children_elements()
            .filter(|e| e.tag == tag)
            .nth(index.saturating_sub(1))
    }

    /// Depth-first search for a descendant (including self) with a matching `Self` id.
    pub fn find_by_self<'a>(&'a self, id: &str) -> Option<&'a Element> {
        if self.self_id() == Some(id) {
            return Some(self);
        }
        self.children_elements().find_map(|c| c.find_by_self(id))
    }

    pub fn find_by_self_mut<'a>(&'a mut self, id: &str) -> Option<&'a mut Element> {
        if self.self_id() == Some(id) {
            return Some(self);
        }
        for child in self.children_elements_mut() {
            if let Some(found) = child.find_by_self_mut(id) {
                return Some(found);
            }
        }
        None
    }

    /// Concatenation of every text node in document order, depth-first.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => e.collect_text(out),
            }
        }
    }

    fn write(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.tag);
        for (k, v) in &self.attrs {
            out.push(' ');
            out.push_str(k);
            out.push_str("=\"");
            out.push_str(&escape_xml(v));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                Node::Element(e) => e.write(out),
                Node::Text(t) => out.push_str(&escape_xml(t)),
            }
        }
        out.push_str("</");
        out.push_str(&self.tag);
        out.push('>');
    }
}

/// Escape XML special characters.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// A parsed IDML part: the optional leading processing instruction (e.g. the
/// `<?aid ... ?>` InDesign hint, preserved verbatim but only re-emitted by
/// designmap.xml) and the root element.
#[derive(Debug, Clone)]
pub struct XmlDoc {
    pub pi: Option<String>,
    pub root: Element,
}

impl From<Element> for XmlDoc {
    fn from(root: Element) -> Self {
        XmlDoc { pi: None, root }
    }
}

impl XmlDoc {
    pub fn parse(bytes: &[u8], path: &str) -> Result<Self, ArchiveError> {
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(true);

        let mut pi: Option<String> = None;
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;
        let mut buf = Vec::new();

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|source| ArchiveError::Xml {
                    path: path.to_string(),
                    source,
                })?;
            match event {
                Event::Decl(_) => {}
                Event::PI(e) => {
                    if pi.is_none() {
                        pi = Some(String::from_utf8_lossy(e.as_ref()).into_owned());
                    }
                }
                Event::Comment(_) | Event::DocType(_) => {}
                Event::Start(e) => {
                    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    let attrs = read_attrs(&e, path)?;
                    stack.push(Element {
                        tag,
                        attrs,
                        children: Vec::new(),
                    });
                }
                Event::Empty(e) => {
                    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    let attrs = read_attrs(&e, path)?;
                    let element = Element {
                        tag,
                        attrs,
                        children: Vec::new(),
                    };
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Element(element)),
                        None => root = Some(element),
                    }
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| ArchiveError::UnbalancedTags(path.to_string()))?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Element(element)),
                        None => root = Some(element),
                    }
                }
                Event::Text(e) | Event::CData(e) => {
                    let text = e.unescape().map_err(|source| ArchiveError::Xml {
                        path: path.to_string(),
                        source,
                    })?;
                    if !text.trim().is_empty() {
                        if let Some(parent) = stack.last_mut() {
                            parent.children.push(Node::Text(text.into_owned()));
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        let root = root.ok_or_else(|| ArchiveError::UnbalancedTags(path.to_string()))?;
        Ok(Self { pi, root })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        out.push_str("<?xml version='1.0' encoding='UTF-8' standalone='yes'?>\n");
        if let Some(pi) = &self.pi {
            out.push_str("<?");
            out.push_str(pi);
            out.push_str("?>\n");
        }
        self.root.write(&mut out);
        out.push('\n');
        out.into_bytes()
    }
}

fn read_attrs(
    e: &quick_xml::events::BytesStart<'_>,
    path: &str,
) -> Result<Vec<(String, String)>, ArchiveError> {
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|source| ArchiveError::Attr {
            path: path.to_string(),
            source,
        })?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|source| ArchiveError::Xml {
                path: path.to_string(),
                source,
            })?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(attrs)
}
