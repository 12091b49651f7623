//! Minimal editable XML tree built on quick-xml events.
//!
//! OOXML parts are small enough to hold in memory. Parsing keeps every event
//! (declarations, comments, processing instructions, whitespace) so that a
//! part written back without edits is equivalent to the original.

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum XmlError {
    #[error("XML syntax error: {0}")]
    Syntax(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("XML write error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unbalanced XML: unexpected closing tag </{0}>")]
    Unbalanced(String),

    #[error("Unbalanced XML: {0} element(s) left open")]
    Unclosed(usize),
}

/// One node of the tree.
#[derive(Debug, Clone)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    /// Anything kept verbatim: declaration, comment, CDATA, PI, doctype.
    Other(Event<'static>),
}

#[derive(Debug, Clone)]
pub struct XmlElement {
    start: BytesStart<'static>,
    pub children: Vec<XmlNode>,
    /// Parsed from `<x/>`; written back the same way while it stays childless.
    self_closing: bool,
}

impl XmlElement {
    /// New element with a qualified name such as `w:r`.
    pub fn new(name: &str) -> Self {
        Self {
            start: BytesStart::new(name.to_string()),
            children: Vec::new(),
            self_closing: false,
        }
    }

    /// New childless element written as `<name/>`.
    pub fn empty(name: &str) -> Self {
        Self {
            self_closing: true,
            ..Self::new(name)
        }
    }

    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.start.push_attribute((key, value));
        self
    }

    pub fn with_child(mut self, child: XmlNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_text(self, text: &str) -> Self {
        self.with_child(XmlNode::Text(text.to_string()))
    }

    /// Qualified name, e.g. `w:p`.
    pub fn name(&self) -> String {
        String::from_utf8_lossy(self.start.name().as_ref()).into_owned()
    }

    /// Name without the namespace prefix, e.g. `p` for `w:p`.
    pub fn local_name(&self) -> String {
        String::from_utf8_lossy(self.start.local_name().as_ref()).into_owned()
    }

    pub fn is(&self, local: &str) -> bool {
        self.start.local_name().as_ref() == local.as_bytes()
    }

    /// Namespace prefix of this element, if any (`w` for `w:p`).
    pub fn prefix(&self) -> Option<String> {
        self.start
            .name()
            .prefix()
            .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned())
    }

    /// Value of an attribute by qualified key (`r`, `t`, `r:id`).
    pub fn attribute(&self, key: &str) -> Result<Option<String>, XmlError> {
        match self.start.try_get_attribute(key)? {
            Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
            None => Ok(None),
        }
    }

    /// Value of the first attribute whose local name matches, whatever its prefix.
    pub fn attribute_local(&self, local: &str) -> Result<Option<String>, XmlError> {
        for attr in self.start.attributes() {
            let attr = attr?;
            if attr.key.local_name().as_ref() == local.as_bytes() {
                return Ok(Some(attr.unescape_value()?.into_owned()));
            }
        }
        Ok(None)
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    /// First direct child element with the given local name.
    pub fn child(&self, local: &str) -> Option<&XmlElement> {
        self.child_elements().find(|el| el.is(local))
    }

    pub fn child_mut(&mut self, local: &str) -> Option<&mut XmlElement> {
        self.child_elements_mut().find(|el| el.is(local))
    }

    /// Concatenated character data of this element's direct text children.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            if let XmlNode::Text(text) = node {
                out.push_str(text);
            }
        }
        out
    }

    /// Replace all children with a single text node.
    pub fn set_text(&mut self, text: &str) {
        self.children = vec![XmlNode::Text(text.to_string())];
    }

    fn write<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<(), XmlError> {
        if self.children.is_empty() && self.self_closing {
            writer.write_event(Event::Empty(self.start.borrow()))?;
            return Ok(());
        }

        writer.write_event(Event::Start(self.start.borrow()))?;
        for child in &self.children {
            write_node(child, writer)?;
        }
        writer.write_event(Event::End(self.start.to_end()))?;
        Ok(())
    }
}

/// A parsed XML part: prolog nodes plus the root element and any trailing nodes.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    nodes: Vec<XmlNode>,
}

impl XmlDocument {
    pub fn parse(bytes: &[u8]) -> Result<Self, XmlError> {
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(false);

        // Stack of open elements; index 0 is a synthetic container for top-level nodes.
        let mut stack: Vec<XmlElement> = vec![XmlElement::new("#document")];
        let mut buf = Vec::new();

        loop {
            let event = reader.read_event_into(&mut buf)?;
            match event {
                Event::Start(e) => stack.push(XmlElement {
                    start: e.into_owned(),
                    children: Vec::new(),
                    self_closing: false,
                }),
                Event::Empty(e) => {
                    let el = XmlElement {
                        start: e.into_owned(),
                        children: Vec::new(),
                        self_closing: true,
                    };
                    push_child(&mut stack, XmlNode::Element(el));
                }
                Event::End(e) => {
                    if stack.len() < 2 {
                        return Err(XmlError::Unbalanced(
                            String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                        ));
                    }
                    if let Some(el) = stack.pop() {
                        push_child(&mut stack, XmlNode::Element(el));
                    }
                }
                Event::Text(e) => {
                    let text = e.unescape()?.into_owned();
                    push_child(&mut stack, XmlNode::Text(text));
                }
                Event::Eof => break,
                other => push_child(&mut stack, XmlNode::Other(other.into_owned())),
            }
            buf.clear();
        }

        if stack.len() != 1 {
            return Err(XmlError::Unclosed(stack.len() - 1));
        }

        let nodes = stack.pop().map(|root| root.children).unwrap_or_default();
        Ok(Self { nodes })
    }

    pub fn root(&self) -> Option<&XmlElement> {
        self.nodes.iter().find_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn root_mut(&mut self) -> Option<&mut XmlElement> {
        self.nodes.iter_mut().find_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, XmlError> {
        let mut writer = Writer::new(Vec::new());
        for node in &self.nodes {
            write_node(node, &mut writer)?;
        }
        Ok(writer.into_inner())
    }
}

fn push_child(stack: &mut [XmlElement], node: XmlNode) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    }
}

fn write_node<W: std::io::Write>(node: &XmlNode, writer: &mut Writer<W>) -> Result<(), XmlError> {
    match node {
        XmlNode::Element(el) => el.write(writer)?,
        XmlNode::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
        XmlNode::Other(event) => writer.write_event(event.borrow())?,
    }
    Ok(())
}
