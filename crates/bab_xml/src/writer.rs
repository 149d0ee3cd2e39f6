//! Canonical serialization of [`Element`] trees.

use crate::element::{Element, Node};
use crate::error::XmlError;
use quick_xml::escape::escape;
use std::path::Path;

/// Prefix bindings emitted so far, innermost last.
#[derive(Default)]
struct Bindings {
    frames: Vec<Vec<(Option<String>, Option<String>)>>,
}

impl Bindings {
    fn bound(&self, prefix: Option<&str>) -> Option<Option<&str>> {
        self.frames
            .iter()
            .rev()
            .flat_map(|f| f.iter().rev())
            .find(|(p, _)| p.as_deref() == prefix)
            .map(|(_, ns)| ns.as_deref())
    }
}

fn write_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&escape(value));
    out.push('"');
}

fn write_element(out: &mut String, element: &Element, bindings: &mut Bindings) {
    let mut frame: Vec<(Option<String>, Option<String>)> = Vec::new();
    let mut decls = String::new();

    let wanted = element.namespace.as_deref();
    let current = bindings.bound(element.prefix.as_deref()).flatten();
    if current != wanted && (wanted.is_some() || current.is_some()) {
        let decl = match &element.prefix {
            Some(p) => format!("xmlns:{p}"),
            None => "xmlns".to_string(),
        };
        write_attr(&mut decls, &decl, wanted.unwrap_or(""));
        frame.push((element.prefix.clone(), element.namespace.clone()));
    }

    let mut attrs = String::new();
    for (i, attr) in element.attributes.iter().enumerate() {
        let qname = match (&attr.namespace, &attr.prefix) {
            (Some(ns), prefix) => {
                let prefix = prefix.clone().unwrap_or_else(|| format!("ns{i}"));
                let in_frame = frame
                    .iter()
                    .any(|(p, n)| p.as_deref() == Some(prefix.as_str()) && n.as_deref() == Some(ns));
                if !in_frame && bindings.bound(Some(&prefix)).flatten() != Some(ns.as_str()) {
                    write_attr(&mut decls, &format!("xmlns:{prefix}"), ns);
                    frame.push((Some(prefix.clone()), Some(ns.clone())));
                }
                format!("{prefix}:{}", attr.name)
            }
            (None, _) => attr.name.clone(),
        };
        write_attr(&mut attrs, &qname, &attr.value);
    }

    let name = element.qualified_name();
    out.push('<');
    out.push_str(&name);
    out.push_str(&decls);
    out.push_str(&attrs);
    if element.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    bindings.frames.push(frame);
    for child in &element.children {
        match child {
            Node::Element(e) => write_element(out, e, bindings),
            Node::Text(t) => out.push_str(&escape(t.as_str())),
            Node::Comment(c) => {
                out.push_str("<!--");
                out.push_str(c);
                out.push_str("-->");
            }
        }
    }
    bindings.frames.pop();
    out.push_str("</");
    out.push_str(&name);
    out.push('>');
}

/// Serializes `element` and its subtree without an XML declaration.
///
/// Output is deterministic: the same tree always yields the same string.
pub fn to_xml_string(element: &Element) -> String {
    let mut out = String::new();
    write_element(&mut out, element, &mut Bindings::default());
    out
}

impl std::fmt::Display for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&to_xml_string(self))
    }
}

/// Writes `element` as a standalone document, creating parent directories.
pub fn write_file(path: &Path, element: &Element) -> Result<(), XmlError> {
    let io = |source| XmlError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io)?;
    }
    let mut text = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    text.push_str(&to_xml_string(element));
    text.push('\n');
    std::fs::write(path, text).map_err(io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::parse_document;

    #[test]
    fn roundtrip_preserves_structure() {
        let src = r#"<AssetDeclaration xmlns="uri:ea.com:eala:asset" xmlns:xai="uri:ea.com:eala:asset:instance"><Weapon id="Gun" xai:joinAction="Replace"><Damage>1 &lt; 2</Damage></Weapon></AssetDeclaration>"#;
        let doc = parse_document(src).unwrap();
        let written = to_xml_string(&doc);
        let again = parse_document(&written).unwrap();
        assert_eq!(doc, again);
    }

    #[test]
    fn namespace_declared_once() {
        let doc = parse_document(r#"<a xmlns="urn:x"><b/><c><d/></c></a>"#).unwrap();
        let written = to_xml_string(&doc);
        assert_eq!(written, r#"<a xmlns="urn:x"><b/><c><d/></c></a>"#);
    }

    #[test]
    fn subtree_carries_its_namespace() {
        let doc = parse_document(r#"<a xmlns="urn:x"><b k="v"/></a>"#).unwrap();
        let b = doc.child("b").unwrap();
        assert_eq!(to_xml_string(b), r#"<b xmlns="urn:x" k="v"/>"#);
    }

    #[test]
    fn escapes_attribute_values() {
        let mut e = Element::new("a");
        e.set_attr("k", "x\"<y");
        let written = to_xml_string(&e);
        let back = parse_document(&written).unwrap();
        assert_eq!(back.attr("k"), Some("x\"<y"));
    }

    #[test]
    fn write_file_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.xml");
        write_file(&path, &Element::new("root")).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("<?xml"));
        assert!(text.contains("<root/>"));
    }
}
