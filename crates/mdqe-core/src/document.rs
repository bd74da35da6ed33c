//! XML document model for check and metadata documents.
//!
//! Documents are parsed once with `quick-xml` into an id-indexed arena.
//! The two document forms selectors can be written against (namespace-aware
//! and namespace-oblivious) are exposed as [`DocView`]s over the same arena
//! rather than as two parsed copies. Elements and attributes in the
//! XML Schema-instance namespace keep their prefixed names in both views,
//! since selectors use `xsi:` markers for type discrimination.

use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{EngineError, Result};

/// The XML Schema-instance namespace, exempt from namespace stripping.
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Index of an element within a [`Document`] arena.
pub type NodeId = usize;

/// An attribute on an element.
#[derive(Debug, Clone)]
pub struct Attribute {
    /// Name as written, prefix included (e.g. `xsi:type`).
    pub name: String,
    /// Local part of the name.
    pub local_name: String,
    /// Resolved namespace URI, if the name carries a prefix.
    pub ns_uri: Option<String>,
    pub value: String,
}

/// One element node in the arena.
#[derive(Debug, Clone)]
pub struct Element {
    /// Tag name as written, prefix included.
    pub name: String,
    /// Local part of the tag name.
    pub local_name: String,
    /// Resolved namespace URI (default namespace included).
    pub ns_uri: Option<String>,
    pub attributes: Vec<Attribute>,
    /// Direct text content, concatenated across text/CDATA runs.
    pub text: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// A parsed XML document.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Element>,
    root: NodeId,
}

fn split_qname(raw: &str) -> (Option<&str>, &str) {
    match raw.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, raw),
    }
}

fn resolve_prefix(scopes: &[Vec<(String, String)>], prefix: Option<&str>) -> Option<String> {
    let wanted = prefix.unwrap_or("");
    for scope in scopes.iter().rev() {
        for (p, uri) in scope.iter().rev() {
            if p == wanted {
                if uri.is_empty() {
                    return None;
                }
                return Some(uri.clone());
            }
        }
    }
    None
}

impl Document {
    /// Parse a document from a string. `path` labels parse errors.
    pub fn parse_str(xml: &str, path: &str) -> Result<Document> {
        let mut reader = Reader::from_str(xml);
        let mut nodes: Vec<Element> = Vec::new();
        let mut stack: Vec<NodeId> = Vec::new();
        // One (prefix, uri) declaration scope per open element.
        let mut ns_scopes: Vec<Vec<(String, String)>> = Vec::new();
        let mut root: Option<NodeId> = None;

        let parse_err = |message: String| EngineError::XmlParse {
            path: path.to_string(),
            message,
        };

        loop {
            let event = reader.read_event().map_err(|e| parse_err(e.to_string()))?;
            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let raw_name = String::from_utf8_lossy(e.name().as_ref()).into_owned();

                    // Collect attributes; xmlns declarations open a new scope
                    // before names are resolved.
                    let mut scope: Vec<(String, String)> = Vec::new();
                    let mut raw_attrs: Vec<(String, String)> = Vec::new();
                    for attr in e.attributes() {
                        let attr = attr.map_err(|e| parse_err(e.to_string()))?;
                        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                        let raw_value = String::from_utf8_lossy(&attr.value).into_owned();
                        let value = quick_xml::escape::unescape(&raw_value)
                            .map(|v| v.into_owned())
                            .unwrap_or(raw_value);
                        if key == "xmlns" {
                            scope.push((String::new(), value));
                        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                            scope.push((prefix.to_string(), value));
                        } else {
                            raw_attrs.push((key, value));
                        }
                    }
                    ns_scopes.push(scope);

                    let (prefix, local) = split_qname(&raw_name);
                    let ns_uri = resolve_prefix(&ns_scopes, prefix);

                    let attributes = raw_attrs
                        .into_iter()
                        .map(|(key, value)| {
                            let (a_prefix, a_local) = split_qname(&key);
                            // Unprefixed attributes carry no namespace.
                            let a_ns = a_prefix.and_then(|p| {
                                resolve_prefix(&ns_scopes, Some(p))
                            });
                            Attribute {
                                local_name: a_local.to_string(),
                                name: key,
                                ns_uri: a_ns,
                                value,
                            }
                        })
                        .collect();

                    let id = nodes.len();
                    nodes.push(Element {
                        local_name: local.to_string(),
                        name: raw_name,
                        ns_uri,
                        attributes,
                        text: String::new(),
                        parent: stack.last().copied(),
                        children: Vec::new(),
                    });
                    if let Some(&parent) = stack.last() {
                        nodes[parent].children.push(id);
                    } else if root.is_none() {
                        root = Some(id);
                    }

                    if matches!(event, Event::Start(_)) {
                        stack.push(id);
                    } else {
                        ns_scopes.pop();
                    }
                }
                Event::End(ref e) => {
                    let closing = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    match stack.pop() {
                        Some(open) if nodes[open].name == closing => {}
                        Some(open) => {
                            return Err(parse_err(format!(
                                "mismatched end tag </{closing}>, expected </{}>",
                                nodes[open].name
                            )))
                        }
                        None => {
                            return Err(parse_err(format!("unexpected end tag </{closing}>")))
                        }
                    }
                    ns_scopes.pop();
                }
                Event::Text(ref t) => {
                    if let Some(&current) = stack.last() {
                        let text = t.unescape().map_err(|e| parse_err(e.to_string()))?;
                        nodes[current].text.push_str(&text);
                    }
                }
                Event::CData(ref c) => {
                    if let Some(&current) = stack.last() {
                        let bytes: &[u8] = c;
                        nodes[current].text.push_str(&String::from_utf8_lossy(bytes));
                    }
                }
                Event::Eof => {
                    if let Some(&open) = stack.last() {
                        return Err(parse_err(format!(
                            "document ended with <{}> still open",
                            nodes[open].name
                        )));
                    }
                    break;
                }
                _ => {}
            }
        }

        match root {
            Some(root) => Ok(Document { nodes, root }),
            None => Err(parse_err("document has no root element".to_string())),
        }
    }

    /// Parse a document from a file path.
    pub fn parse_file(path: &Path) -> Result<Document> {
        if !path.is_file() {
            return Err(EngineError::FileNotFound(path.to_path_buf()));
        }
        let xml = std::fs::read_to_string(path)?;
        Document::parse_str(&xml, &path.to_string_lossy())
    }

    /// Root element of the document.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Access an element by id.
    pub fn node(&self, id: NodeId) -> &Element {
        &self.nodes[id]
    }

    /// All element ids in document order.
    pub fn all_nodes(&self) -> impl Iterator<Item = NodeId> {
        0..self.nodes.len()
    }

    /// Descendants of `id` in document order, not including `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut pending: Vec<NodeId> = self.nodes[id].children.clone();
        pending.reverse();
        while let Some(next) = pending.pop() {
            out.push(next);
            for &child in self.nodes[next].children.iter().rev() {
                pending.push(child);
            }
        }
        out
    }

    /// Concatenated text of an element and all its descendants,
    /// whitespace-normalized. This is the "string value" selectors extract,
    /// so mixed-content and whitespace-padded nodes resolve consistently.
    pub fn string_value(&self, id: NodeId) -> String {
        let mut raw = String::new();
        self.collect_text(id, &mut raw);
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id];
        out.push_str(&node.text);
        for &child in &node.children {
            out.push(' ');
            self.collect_text(child, out);
        }
    }

    /// Direct children of `id` with the given local name.
    pub fn children_local(&self, id: NodeId, local: &str) -> Vec<NodeId> {
        self.nodes[id]
            .children
            .iter()
            .copied()
            .filter(|&c| self.nodes[c].local_name == local)
            .collect()
    }

    /// First direct child of `id` with the given local name.
    pub fn child_local(&self, id: NodeId, local: &str) -> Option<NodeId> {
        self.nodes[id]
            .children
            .iter()
            .copied()
            .find(|&c| self.nodes[c].local_name == local)
    }

    /// First descendant of `id` (any depth) with the given local name.
    pub fn descendant_local(&self, id: NodeId, local: &str) -> Option<NodeId> {
        self.descendants(id)
            .into_iter()
            .find(|&d| self.nodes[d].local_name == local)
    }

    /// Attribute value by name as written.
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes[id]
            .attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }
}

/// A name-resolution view over a document: namespace-aware or stripped.
///
/// In the namespace-aware view names match exactly as written in the source
/// document (prefixes included). In the stripped view names match by local
/// part — except names in the schema-instance namespace, which keep their
/// prefixed form in both views.
#[derive(Debug, Clone, Copy)]
pub struct DocView<'a> {
    doc: &'a Document,
    ns_aware: bool,
}

impl<'a> DocView<'a> {
    pub fn doc(&self) -> &'a Document {
        self.doc
    }

    pub fn root(&self) -> NodeId {
        self.doc.root()
    }

    /// Whether an element answers to `test` under this view's naming rules.
    pub fn element_matches(&self, id: NodeId, test: &str) -> bool {
        let node = self.doc.node(id);
        if self.ns_aware || node.ns_uri.as_deref() == Some(XSI_NS) {
            node.name == test
        } else {
            node.local_name == test
        }
    }

    /// Look up an attribute under this view's naming rules.
    pub fn attr_value(&self, id: NodeId, test: &str) -> Option<&'a str> {
        self.doc.node(id).attributes.iter().find_map(|a| {
            let matched = if self.ns_aware || a.ns_uri.as_deref() == Some(XSI_NS) {
                a.name == test
            } else {
                a.local_name == test
            };
            matched.then_some(a.value.as_str())
        })
    }
}

/// A metadata document prepared for selector evaluation in both its
/// namespace-aware and namespace-stripped forms.
#[derive(Debug, Clone)]
pub struct MetadataDocument {
    doc: Document,
}

impl MetadataDocument {
    /// Load and parse the document at `path`.
    pub fn prepare(path: &Path) -> Result<MetadataDocument> {
        Ok(MetadataDocument {
            doc: Document::parse_file(path)?,
        })
    }

    /// Prepare from an in-memory string. `path` labels parse errors.
    pub fn from_str(xml: &str, path: &str) -> Result<MetadataDocument> {
        Ok(MetadataDocument {
            doc: Document::parse_str(xml, path)?,
        })
    }

    /// Namespace-aware form: names match as written in the source.
    pub fn namespaced(&self) -> DocView<'_> {
        DocView {
            doc: &self.doc,
            ns_aware: true,
        }
    }

    /// Namespace-stripped form: names match by local part (xsi excepted).
    pub fn stripped(&self) -> DocView<'_> {
        DocView {
            doc: &self.doc,
            ns_aware: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<eml:eml xmlns:eml="https://eml.ecoinformatics.org/eml-2.2.0"
         xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <dataset id="d1">
    <title>  Soil  cores,  2019 </title>
    <otherEntity xsi:type="OtherEntityType">
      <entityName>cores.csv</entityName>
    </otherEntity>
  </dataset>
</eml:eml>"#;

    fn parse(xml: &str) -> Document {
        Document::parse_str(xml, "test.xml").expect("parse failed")
    }

    #[test]
    fn test_parse_builds_tree() {
        let doc = parse(EML);
        let root = doc.node(doc.root());
        assert_eq!(root.name, "eml:eml");
        assert_eq!(root.local_name, "eml");
        assert_eq!(
            root.ns_uri.as_deref(),
            Some("https://eml.ecoinformatics.org/eml-2.2.0")
        );
        assert_eq!(root.children.len(), 1);
    }

    #[test]
    fn test_parse_error_is_structural() {
        let err = Document::parse_str("<a><b></a>", "bad.xml").unwrap_err();
        match err {
            EngineError::XmlParse { path, .. } => assert_eq!(path, "bad.xml"),
            other => panic!("expected XmlParse, got {other:?}"),
        }
    }

    #[test]
    fn test_string_value_normalizes_whitespace() {
        let doc = parse(EML);
        let title = doc.descendant_local(doc.root(), "title").unwrap();
        assert_eq!(doc.string_value(title), "Soil cores, 2019");
    }

    #[test]
    fn test_stripped_view_matches_local_names() {
        let md = MetadataDocument::from_str(EML, "test.xml").unwrap();
        let stripped = md.stripped();
        assert!(stripped.element_matches(md.doc.root(), "eml"));
        let namespaced = md.namespaced();
        assert!(!namespaced.element_matches(md.doc.root(), "eml"));
        assert!(namespaced.element_matches(md.doc.root(), "eml:eml"));
    }

    #[test]
    fn test_xsi_attributes_keep_prefix_in_stripped_view() {
        let md = MetadataDocument::from_str(EML, "test.xml").unwrap();
        let doc = md.stripped().doc();
        let entity = doc.descendant_local(doc.root(), "otherEntity").unwrap();
        // Stripped view still requires the xsi: prefix.
        assert_eq!(
            md.stripped().attr_value(entity, "xsi:type"),
            Some("OtherEntityType")
        );
        assert_eq!(md.stripped().attr_value(entity, "type"), None);
    }

    #[test]
    fn test_descendants_in_document_order() {
        let doc = parse(EML);
        let names: Vec<_> = doc
            .descendants(doc.root())
            .into_iter()
            .map(|id| doc.node(id).local_name.clone())
            .collect();
        assert_eq!(
            names,
            vec!["dataset", "title", "otherEntity", "entityName"]
        );
    }

    #[test]
    fn test_empty_element_and_attr_lookup() {
        let doc = parse(r#"<r><e a="1"/><e a="2">x</e></r>"#);
        let es = doc.children_local(doc.root(), "e");
        assert_eq!(es.len(), 2);
        assert_eq!(doc.attr(es[0], "a"), Some("1"));
        assert_eq!(doc.string_value(es[0]), "");
        assert_eq!(doc.string_value(es[1]), "x");
    }
}
