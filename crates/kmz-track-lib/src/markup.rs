//! Markup tree model for KML documents
//!
//! Documents are parsed into an owned tree of [`Element`]s. Children are always kept as
//! an ordered sequence, so a tag that appears once and a tag that appears many times
//! look the same to every consumer. Whitespace-only text between elements is dropped
//! and text content is trimmed during [`Element::normalize`], which runs on every
//! parsed document before anything can mutate it.
//!
//! Serialization writes an XML declaration followed by the tree indented by two spaces.
//! Elements without attributes or content are written as self-closing tags. Comments,
//! processing instructions and doctype declarations are not preserved.

use crate::{KmzError, Result};
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesCData, BytesDecl, BytesStart, BytesText, Event};
use std::fmt::Display;

/// KML 2.2 namespace used for newly created documents
pub const KML_NAMESPACE: &str = "http://www.opengis.net/kml/2.2";

/// A node in the markup tree
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An element with a tag name, ordered attributes and ordered children
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

/// A parsed KML document, owning its whole tree
#[derive(Clone, Debug, PartialEq)]
pub struct KmlDocument {
    pub root: Element,
}

fn xml_err(e: impl Display) -> KmzError {
    KmzError::Xml(e.to_string())
}

/// Tag name without its namespace prefix (`kml:Placemark` -> `Placemark`)
#[inline]
pub fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder: add an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Builder: add a child element
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// Builder: add a text child
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    /// Whether this element's local tag name is `name`
    #[inline]
    pub fn is(&self, name: &str) -> bool {
        local_name(&self.name) == name
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Child elements in document order
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Child elements with the given local name, in document order
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.elements().filter(move |e| e.is(name))
    }

    /// First child element with the given local name
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.is(name))
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.elements_mut().find(|e| e.is(name))
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Concatenated direct text content
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            if let Node::Text(t) = node {
                out.push_str(t);
            }
        }
        out
    }

    /// Replace all text children with a single text node, keeping child elements
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children.retain(|node| matches!(node, Node::Element(_)));
        self.children.insert(0, Node::Text(text.into()));
    }

    /// Trimmed text of the first child element named `name`, if it's non-empty
    pub fn child_text(&self, name: &str) -> Option<String> {
        let text = self.child(name)?.text();
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }

    /// Whether the element holds a child element or non-empty text
    ///
    /// Elements without content are written self-closing.
    pub fn has_content(&self) -> bool {
        self.children.iter().any(|node| match node {
            Node::Text(t) => !t.is_empty(),
            Node::Element(_) => true,
        })
    }

    /// Trim text, drop empty text nodes and merge adjacent text nodes, recursively
    pub fn normalize(&mut self) {
        let mut normalized: Vec<Node> = Vec::with_capacity(self.children.len());
        for node in self.children.drain(..) {
            match node {
                Node::Element(mut e) => {
                    e.normalize();
                    normalized.push(Node::Element(e));
                }
                Node::Text(t) => {
                    let trimmed = t.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match normalized.last_mut() {
                        Some(Node::Text(prev)) => {
                            prev.push(' ');
                            prev.push_str(trimmed);
                        }
                        _ => normalized.push(Node::Text(trimmed.to_string())),
                    }
                }
            }
        }
        self.children = normalized;
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Self> {
        let name = std::str::from_utf8(start.name().as_ref())
            .map_err(xml_err)?
            .to_string();
        let mut element = Element::new(name);
        for attr in start.attributes() {
            let attr = attr.map_err(xml_err)?;
            let key = std::str::from_utf8(attr.key.as_ref())
                .map_err(xml_err)?
                .to_string();
            let value = attr.unescape_value().map_err(xml_err)?.into_owned();
            element.attributes.push((key, value));
        }
        Ok(element)
    }

    fn write_to<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if !self.has_content() {
            writer.write_event(Event::Empty(start)).map_err(xml_err)?;
            return Ok(());
        }

        writer
            .write_event(Event::Start(start.borrow()))
            .map_err(xml_err)?;
        for node in &self.children {
            match node {
                Node::Element(child) => child.write_to(writer)?,
                Node::Text(text) => writer
                    .write_event(Event::Text(BytesText::new(text)))
                    .map_err(xml_err)?,
            }
        }
        writer
            .write_event(Event::End(start.to_end()))
            .map_err(xml_err)?;
        Ok(())
    }
}

/// Append a finished element to its parent, or make it the root
fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.push_child(element);
        return Ok(());
    }
    if root.is_some() {
        return Err(KmzError::Xml("multiple root elements".to_string()));
    }
    *root = Some(element);
    Ok(())
}

fn cdata_text(cdata: BytesCData<'_>) -> String {
    String::from_utf8_lossy(&cdata.into_inner()).into_owned()
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl KmlDocument {
    /// An empty `<kml>` document in the KML 2.2 namespace
    pub fn new_kml() -> Self {
        Self {
            root: Element::new("kml").with_attribute("xmlns", KML_NAMESPACE),
        }
    }

    /// Parse a markup payload into a normalized tree
    pub fn parse(text: &str) -> Result<Self> {
        #[cfg(feature = "profiling")]
        profiling::scope!("markup::parse");

        let text = text.trim_start_matches('\u{feff}');
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event().map_err(xml_err)? {
                Event::Start(e) => stack.push(Element::from_start(&e)?),
                Event::Empty(e) => {
                    let element = Element::from_start(&e)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| KmzError::Xml("unexpected closing tag".to_string()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(t) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = t.unescape().map_err(xml_err)?;
                        parent.children.push(Node::Text(text.into_owned()));
                    }
                }
                Event::CData(c) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Text(cdata_text(c)));
                    }
                }
                Event::Eof => break,
                // Declarations, comments, processing instructions and doctypes are dropped
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(KmzError::Xml(format!("unclosed element <{}>", open.name)));
        }
        let mut root =
            root.ok_or_else(|| KmzError::Xml("document has no root element".to_string()))?;
        root.normalize();
        Ok(Self { root })
    }

    /// Serialize the tree as an indented XML document
    pub fn to_xml(&self) -> Result<String> {
        #[cfg(feature = "profiling")]
        profiling::scope!("markup::to_xml");

        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_err)?;
        self.root.write_to(&mut writer)?;
        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        String::from_utf8(bytes).map_err(xml_err)
    }

    /// The element holding top-level features: `<Document>` if present, else the root
    pub fn feature_container(&self) -> &Element {
        self.root.child("Document").unwrap_or(&self.root)
    }

    /// Run `f` on the mutable feature container (see [`Self::feature_container`])
    pub fn with_feature_container<R>(&mut self, f: impl FnOnce(&mut Element) -> R) -> R {
        let position = self
            .root
            .children
            .iter()
            .position(|node| matches!(node, Node::Element(e) if e.is("Document")));
        if let Some(Node::Element(document)) = position.and_then(|i| self.root.children.get_mut(i))
        {
            return f(document);
        }
        f(&mut self.root)
    }
}
