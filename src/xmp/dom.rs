//! A small namespace-aware XML tree for XMP packets.
//!
//! The parser keeps everything outside the root element (processing
//! instructions, comments, padding whitespace) so a packet serializes back
//! with its `xpacket` envelope intact. Namespaces are resolved once, at
//! parse time, and stored on each element.

use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::ParseError;

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    Element(Element),
    Text(String),
    /// Comments, processing instructions and declarations, kept verbatim.
    Markup(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Element {
    /// Qualified name as written, e.g. `rdf:li`.
    pub name: String,
    pub namespace: Option<String>,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Document {
    pub prolog: Vec<Node>,
    pub root: Element,
    pub epilog: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>, namespace: &str) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.to_string()),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    pub fn local_name(&self) -> &str {
        self.name.split_once(':').map_or(self.name.as_str(), |(_, local)| local)
    }

    pub fn is(&self, namespace: &str, local: &str) -> bool {
        self.namespace.as_deref() == Some(namespace) && self.local_name() == local
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|child| match child {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// First match in document order, this element included.
    pub fn find(&self, namespace: &str, local: &str) -> Option<&Element> {
        if self.is(namespace, local) {
            return Some(self);
        }
        self.child_elements().find_map(|child| child.find(namespace, local))
    }

    pub fn find_mut(&mut self, namespace: &str, local: &str) -> Option<&mut Element> {
        if self.is(namespace, local) {
            return Some(self);
        }
        self.children.iter_mut().find_map(|child| match child {
            Node::Element(element) => element.find_mut(namespace, local),
            _ => None,
        })
    }

    /// All matching descendants in document order, this element excluded.
    pub fn descendants(&self, namespace: &str, local: &str) -> Vec<&Element> {
        let mut found = Vec::new();
        self.collect_descendants(namespace, local, &mut found);
        found
    }

    fn collect_descendants<'a>(
        &'a self,
        namespace: &str,
        local: &str,
        found: &mut Vec<&'a Element>,
    ) {
        for child in self.child_elements() {
            if child.is(namespace, local) {
                found.push(child);
            }
            child.collect_descendants(namespace, local, found);
        }
    }

    /// The `index`-th element [`descendants`](Self::descendants) would return.
    pub fn descendant_mut(
        &mut self,
        namespace: &str,
        local: &str,
        index: usize,
    ) -> Option<&mut Element> {
        let mut remaining = index;
        self.nth_descendant_mut(namespace, local, &mut remaining)
    }

    fn nth_descendant_mut(
        &mut self,
        namespace: &str,
        local: &str,
        remaining: &mut usize,
    ) -> Option<&mut Element> {
        for child in &mut self.children {
            let Node::Element(element) = child else {
                continue;
            };
            if element.is(namespace, local) {
                if *remaining == 0 {
                    return Some(element);
                }
                *remaining -= 1;
            }
            if let Some(found) = element.nth_descendant_mut(namespace, local, remaining) {
                return Some(found);
            }
        }
        None
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Node::Text(text) => out.push_str(text),
                Node::Element(element) => element.collect_text(out),
                Node::Markup(_) => {}
            }
        }
    }

    /// Replace all children with a single text node.
    pub fn set_text(&mut self, text: &str) {
        self.children = vec![Node::Text(text.to_string())];
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape(value.as_str()));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            write_node(child, out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

fn write_node(node: &Node, out: &mut String) {
    match node {
        Node::Element(element) => element.write_to(out),
        // Markup characters only; control characters are written as-is.
        Node::Text(text) => out.push_str(&partial_escape(text.as_str())),
        Node::Markup(markup) => out.push_str(markup),
    }
}

impl Document {
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        for node in &self.prolog {
            write_node(node, &mut out);
        }
        self.root.write_to(&mut out);
        for node in &self.epilog {
            write_node(node, &mut out);
        }
        out
    }

    /// Whether the nodes outside the root carry both `xpacket` instructions.
    pub fn has_packet_wrapper(&self) -> bool {
        let is_pi = |node: &Node, prefix: &str| {
            matches!(node, Node::Markup(markup) if markup.starts_with(prefix))
        };
        self.prolog.iter().any(|node| is_pi(node, "<?xpacket begin"))
            && self.epilog.iter().any(|node| is_pi(node, "<?xpacket end"))
    }
}

fn malformed(err: impl std::fmt::Display) -> ParseError {
    ParseError::Xml(err.to_string())
}

fn utf8(bytes: &[u8]) -> Result<&str, ParseError> {
    std::str::from_utf8(bytes).map_err(malformed)
}

/// In-scope `xmlns` bindings, innermost last.
#[derive(Default)]
struct Scopes {
    bindings: Vec<(String, String)>,
}

impl Scopes {
    fn resolve(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NS);
        }
        self.bindings
            .iter()
            .rev()
            .find(|(bound, _)| bound == prefix)
            .map(|(_, uri)| uri.as_str())
            .filter(|uri| !uri.is_empty())
    }
}

/// Build an element from a start tag, pushing its namespace declarations.
fn open_element(start: &BytesStart<'_>, scopes: &mut Scopes) -> Result<Element, ParseError> {
    let name = utf8(start.name().as_ref())?.to_string();

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(malformed)?;
        let key = utf8(attr.key.as_ref())?.to_string();
        let value = attr.unescape_value().map_err(malformed)?.into_owned();
        if key == "xmlns" {
            scopes.bindings.push((String::new(), value.clone()));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            scopes.bindings.push((prefix.to_string(), value.clone()));
        }
        attributes.push((key, value));
    }

    let prefix = name.split_once(':').map_or("", |(prefix, _)| prefix);
    let namespace = scopes.resolve(prefix).map(str::to_string);
    if namespace.is_none() && !prefix.is_empty() {
        return Err(ParseError::Xml(format!(
            "namespace prefix `{prefix}` on <{name}> is not bound"
        )));
    }

    Ok(Element {
        name,
        namespace,
        attributes,
        children: Vec::new(),
    })
}

/// Where finished nodes go while parsing.
struct Builder {
    open: Vec<(Element, usize)>,
    prolog: Vec<Node>,
    root: Option<Element>,
    epilog: Vec<Node>,
}

impl Builder {
    fn push(&mut self, node: Node) -> Result<(), ParseError> {
        if let Some((parent, _)) = self.open.last_mut() {
            parent.children.push(node);
            return Ok(());
        }
        match node {
            Node::Element(element) if self.root.is_none() => self.root = Some(element),
            Node::Element(element) => {
                return Err(ParseError::Xml(format!("second root element <{}>", element.name)));
            }
            Node::Text(text) if !text.trim().is_empty() => {
                return Err(ParseError::Xml("text outside the root element".to_string()));
            }
            other if self.root.is_none() => self.prolog.push(other),
            other => self.epilog.push(other),
        }
        Ok(())
    }

    fn push_text(&mut self, text: String) -> Result<(), ParseError> {
        if let Some((parent, _)) = self.open.last_mut() {
            if let Some(Node::Text(previous)) = parent.children.last_mut() {
                previous.push_str(&text);
                return Ok(());
            }
        }
        self.push(Node::Text(text))
    }
}

/// Parse a packet into a [`Document`], rejecting anything not well-formed.
pub(crate) fn parse(text: &str) -> Result<Document, ParseError> {
    let text = text.trim_start_matches('\u{feff}');
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(false);
    reader.config_mut().check_end_names = true;

    let mut scopes = Scopes::default();
    let mut builder = Builder {
        open: Vec::new(),
        prolog: Vec::new(),
        root: None,
        epilog: Vec::new(),
    };

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(start) => {
                let mark = scopes.bindings.len();
                let element = open_element(&start, &mut scopes)?;
                builder.open.push((element, mark));
            }
            Event::Empty(start) => {
                let mark = scopes.bindings.len();
                let element = open_element(&start, &mut scopes)?;
                scopes.bindings.truncate(mark);
                builder.push(Node::Element(element))?;
            }
            Event::End(_) => {
                let (element, mark) = builder
                    .open
                    .pop()
                    .ok_or_else(|| ParseError::Xml("unexpected closing tag".to_string()))?;
                scopes.bindings.truncate(mark);
                builder.push(Node::Element(element))?;
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(malformed)?.into_owned();
                builder.push_text(text)?;
            }
            Event::CData(data) => {
                let text = utf8(&data)?.to_string();
                builder.push_text(text)?;
            }
            Event::Comment(comment) => {
                builder.push(Node::Markup(format!("<!--{}-->", utf8(&comment)?)))?;
            }
            Event::PI(pi) => {
                builder.push(Node::Markup(format!("<?{}?>", utf8(&pi)?)))?;
            }
            Event::Decl(decl) => {
                builder.push(Node::Markup(format!("<?{}?>", utf8(&decl)?)))?;
            }
            Event::DocType(doctype) => {
                builder.push(Node::Markup(format!("<!DOCTYPE {}>", utf8(&doctype)?.trim())))?;
            }
            Event::Eof => break,
        }
    }

    if let Some((element, _)) = builder.open.last() {
        return Err(ParseError::Xml(format!("<{}> is never closed", element.name)));
    }
    let root = builder
        .root
        .ok_or_else(|| ParseError::Xml("no root element".to_string()))?;

    Ok(Document {
        prolog: builder.prolog,
        root,
        epilog: builder.epilog,
    })
}
