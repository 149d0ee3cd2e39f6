//! Parsing documents into [`Element`] trees.

use crate::element::{Attribute, Element, Node};
use crate::error::XmlError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::Path;

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// In-scope prefix bindings, innermost last. `None` is the default namespace.
#[derive(Default)]
struct Scopes {
    frames: Vec<Vec<(Option<String>, String)>>,
}

impl Scopes {
    fn lookup(&self, prefix: Option<&str>) -> Option<&str> {
        if prefix == Some("xml") {
            return Some(XML_NS);
        }
        self.frames
            .iter()
            .rev()
            .flat_map(|frame| frame.iter().rev())
            .find(|(p, _)| p.as_deref() == prefix)
            .map(|(_, uri)| uri.as_str())
            .filter(|uri| !uri.is_empty())
    }
}

fn split_qname(raw: &[u8]) -> (Option<String>, String) {
    let text = String::from_utf8_lossy(raw);
    match text.split_once(':') {
        Some((p, local)) => (Some(p.to_string()), local.to_string()),
        None => (None, text.into_owned()),
    }
}

fn malformed(reader: &Reader<&[u8]>, reason: impl Into<String>) -> XmlError {
    XmlError::Malformed {
        position: reader.buffer_position() as u64,
        reason: reason.into(),
    }
}

fn open_element(
    reader: &Reader<&[u8]>,
    start: &BytesStart<'_>,
    scopes: &mut Scopes,
) -> Result<Element, XmlError> {
    let mut frame = Vec::new();
    let mut raw_attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| malformed(reader, e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| malformed(reader, e.to_string()))?
            .into_owned();
        let (prefix, local) = split_qname(attr.key.as_ref());
        match (prefix.as_deref(), local.as_str()) {
            (None, "xmlns") => frame.push((None, value)),
            (Some("xmlns"), _) => frame.push((Some(local), value)),
            _ => raw_attrs.push((prefix, local, value)),
        }
    }
    scopes.frames.push(frame);

    let (prefix, name) = split_qname(start.name().as_ref());
    let namespace = match scopes.lookup(prefix.as_deref()) {
        Some(uri) => Some(uri.to_string()),
        None if prefix.is_some() => {
            return Err(malformed(
                reader,
                format!("undeclared prefix in <{}>", start_name(start)),
            ))
        }
        None => None,
    };

    let mut attributes = Vec::with_capacity(raw_attrs.len());
    for (prefix, local, value) in raw_attrs {
        let namespace = match &prefix {
            Some(p) => Some(
                scopes
                    .lookup(Some(p))
                    .ok_or_else(|| malformed(reader, format!("undeclared prefix '{p}'")))?
                    .to_string(),
            ),
            None => None,
        };
        attributes.push(Attribute {
            prefix,
            name: local,
            namespace,
            value,
            schema: None,
        });
    }

    Ok(Element {
        prefix,
        name,
        namespace,
        attributes,
        children: Vec::new(),
        schema: None,
    })
}

fn start_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

fn close_element(stack: &mut Vec<Element>, root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn push_text(stack: &mut [Element], text: String) {
    if text.trim().is_empty() {
        return;
    }
    if let Some(parent) = stack.last_mut() {
        match parent.children.last_mut() {
            Some(Node::Text(existing)) => existing.push_str(&text),
            _ => parent.children.push(Node::Text(text)),
        }
    }
}

/// Parses a whole document and returns its root element.
///
/// Whitespace-only text is dropped and CDATA sections become plain text.
pub fn parse_document(text: &str) -> Result<Element, XmlError> {
    let mut reader = Reader::from_str(text);
    let mut scopes = Scopes::default();
    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| malformed(&reader, e.to_string()))?;
        match event {
            Event::Start(start) => {
                let element = open_element(&reader, &start, &mut scopes)?;
                stack.push(element);
            }
            Event::Empty(start) => {
                let element = open_element(&reader, &start, &mut scopes)?;
                scopes.frames.pop();
                close_element(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                scopes.frames.pop();
                let element = stack
                    .pop()
                    .ok_or_else(|| malformed(&reader, "unbalanced end tag"))?;
                close_element(&mut stack, &mut root, element);
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| malformed(&reader, e.to_string()))?
                    .into_owned();
                push_text(&mut stack, text);
            }
            Event::CData(c) => {
                push_text(&mut stack, String::from_utf8_lossy(&c).into_owned());
            }
            Event::Comment(c) => {
                if let Some(parent) = stack.last_mut() {
                    let text = String::from_utf8_lossy(&c).into_owned();
                    parent.children.push(Node::Comment(text));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(malformed(&reader, "unexpected end of document"));
    }
    root.ok_or(XmlError::NoRoot)
}

/// Reads and parses the document at `path`.
pub fn parse_file(path: &Path) -> Result<Element, XmlError> {
    let text = std::fs::read_to_string(path).map_err(|source| XmlError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_document(&text)
}
