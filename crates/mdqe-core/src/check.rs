//! Check definition parsing and the dialect validity gate.

use std::path::Path;

use crate::document::{DocView, Document, NodeId};
use crate::error::{EngineError, Result};
use crate::query;
use crate::selector::Selector;

/// A check's declared applicability condition: the check applies when the
/// dialect's query matches the target document's namespaced form.
#[derive(Debug, Clone, PartialEq)]
pub struct Dialect {
    pub name: String,
    pub xpath: String,
}

/// An immutable check definition, parsed fresh per execution.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckDefinition {
    pub id: String,
    /// Execution environment the check's routine targets (e.g. `rust`).
    pub environment: Option<String>,
    pub dialects: Vec<Dialect>,
    pub selectors: Vec<Selector>,
    /// Validation-logic reference; resolved through the routine registry.
    pub code: Option<String>,
}

impl CheckDefinition {
    /// Load a check definition from a file.
    pub fn from_path(path: &Path) -> Result<CheckDefinition> {
        let doc = Document::parse_file(path)?;
        Self::from_document(&doc, &path.to_string_lossy())
    }

    /// Parse a check definition from an already-parsed document.
    /// `source` labels structural errors.
    pub fn from_document(doc: &Document, source: &str) -> Result<CheckDefinition> {
        let structural = |message: String| EngineError::XmlParse {
            path: source.to_string(),
            message,
        };

        let root = doc.root();
        let id = doc
            .descendant_local(root, "id")
            .map(|n| doc.string_value(n))
            .filter(|s| !s.is_empty())
            .ok_or_else(|| EngineError::MissingElement {
                element: "id".to_string(),
            })?;

        let environment = doc
            .child_local(root, "environment")
            .map(|n| doc.string_value(n))
            .filter(|s| !s.is_empty());

        // A dialect entry only counts when it carries both a name and a
        // query expression.
        let mut dialects = Vec::new();
        for node in doc.children_local(root, "dialect") {
            let name = doc.child_local(node, "name").map(|n| doc.string_value(n));
            let xpath = doc.child_local(node, "xpath").map(|n| doc.string_value(n));
            if let (Some(name), Some(xpath)) = (name, xpath) {
                if !xpath.is_empty() {
                    dialects.push(Dialect { name, xpath });
                }
            }
        }

        let mut selectors = Vec::new();
        for node in doc.children_local(root, "selector") {
            selectors.push(parse_selector(doc, node, &structural)?);
        }

        let code = doc
            .child_local(root, "code")
            .map(|n| doc.node(n).text.clone())
            .filter(|s| !s.trim().is_empty());

        Ok(CheckDefinition {
            id,
            environment,
            dialects,
            selectors,
            code,
        })
    }

    /// Whether this check applies to the target document: universally valid
    /// with no dialects, otherwise valid iff any dialect's query is truthy
    /// against the document root.
    pub fn is_valid_for(&self, view: DocView<'_>) -> Result<bool> {
        if self.dialects.is_empty() {
            return Ok(true);
        }
        for dialect in &self.dialects {
            let value = query::evaluate(view, view.root(), &dialect.xpath)?;
            if value.truthy() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn parse_selector(
    doc: &Document,
    node: NodeId,
    structural: &dyn Fn(String) -> EngineError,
) -> Result<Selector> {
    let name = doc
        .child_local(node, "name")
        .map(|n| doc.string_value(n))
        .filter(|s| !s.is_empty())
        .ok_or_else(|| structural("selector is missing <name>".to_string()))?;
    let xpath = doc
        .child_local(node, "xpath")
        .map(|n| doc.string_value(n))
        .filter(|s| !s.is_empty())
        .ok_or_else(|| structural(format!("selector {name:?} is missing <xpath>")))?;

    let namespace_aware = doc
        .attr(node, "namespaceAware")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));

    let sub_selector = match doc.child_local(node, "subSelector") {
        Some(sub) => Some(Box::new(parse_sub_selector(doc, sub, &name, structural)?)),
        None => None,
    };

    Ok(Selector {
        name,
        xpath,
        namespace_aware,
        sub_selector,
    })
}

/// A subSelector needs only an xpath; its name is informational.
fn parse_sub_selector(
    doc: &Document,
    node: NodeId,
    parent_name: &str,
    structural: &dyn Fn(String) -> EngineError,
) -> Result<Selector> {
    let name = doc
        .child_local(node, "name")
        .map(|n| doc.string_value(n))
        .unwrap_or_else(|| parent_name.to_string());
    let xpath = doc
        .child_local(node, "xpath")
        .map(|n| doc.string_value(n))
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            structural(format!("subSelector of {parent_name:?} is missing <xpath>"))
        })?;

    let sub_selector = match doc.child_local(node, "subSelector") {
        Some(sub) => Some(Box::new(parse_sub_selector(doc, sub, &name, structural)?)),
        None => None,
    };

    Ok(Selector {
        name,
        xpath,
        namespace_aware: doc
            .attr(node, "namespaceAware")
            .is_some_and(|v| v.eq_ignore_ascii_case("true")),
        sub_selector,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MetadataDocument;

    const CHECK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<mdq:check xmlns:mdq="https://nceas.ucsb.edu/mdqe/v1">
  <id>entity.attributeName.present-1.0.0</id>
  <name>Entity attribute names present</name>
  <environment>rust</environment>
  <dialect>
    <name>Ecological Metadata Language</name>
    <xpath>boolean(/eml:eml)</xpath>
  </dialect>
  <selector namespaceAware="true">
    <name>attributeNames</name>
    <xpath>//attributeList</xpath>
    <subSelector>
      <name>attributeName</name>
      <xpath>attribute/attributeName</xpath>
    </subSelector>
  </selector>
  <selector>
    <name>count</name>
    <xpath>count(//attribute)</xpath>
  </selector>
  <code>values_present</code>
</mdq:check>"#;

    fn parse(xml: &str) -> Result<CheckDefinition> {
        let doc = Document::parse_str(xml, "check.xml").unwrap();
        CheckDefinition::from_document(&doc, "check.xml")
    }

    #[test]
    fn test_parse_full_check() {
        let check = parse(CHECK).unwrap();
        assert_eq!(check.id, "entity.attributeName.present-1.0.0");
        assert_eq!(check.environment.as_deref(), Some("rust"));
        assert_eq!(check.dialects.len(), 1);
        assert_eq!(check.selectors.len(), 2);
        assert_eq!(check.code.as_deref().map(str::trim), Some("values_present"));

        let first = &check.selectors[0];
        assert!(first.namespace_aware);
        assert!(first.sub_selector.is_some());
        assert_eq!(
            first.sub_selector.as_ref().unwrap().xpath,
            "attribute/attributeName"
        );
        assert!(!check.selectors[1].namespace_aware);
    }

    #[test]
    fn test_check_without_id_is_structural_error() {
        let err = parse("<check><selector><name>x</name><xpath>y</xpath></selector></check>")
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingElement { .. }));
    }

    #[test]
    fn test_selector_without_xpath_is_structural_error() {
        let err = parse(
            "<check><id>c</id><selector><name>x</name></selector><code>r</code></check>",
        )
        .unwrap_err();
        match err {
            EngineError::XmlParse { message, .. } => assert!(message.contains("xpath")),
            other => panic!("expected XmlParse, got {other:?}"),
        }
    }

    #[test]
    fn test_dialect_gate() {
        let check = parse(CHECK).unwrap();
        let eml = MetadataDocument::from_str(
            r#"<eml:eml xmlns:eml="https://eml.ecoinformatics.org/eml-2.2.0"><dataset/></eml:eml>"#,
            "doc.xml",
        )
        .unwrap();
        assert!(check.is_valid_for(eml.namespaced()).unwrap());

        let iso = MetadataDocument::from_str("<gmi><fileIdentifier/></gmi>", "doc.xml").unwrap();
        assert!(!check.is_valid_for(iso.namespaced()).unwrap());
    }

    #[test]
    fn test_zero_dialects_means_universally_valid() {
        let check = parse(
            "<check><id>c</id><selector><name>x</name><xpath>y</xpath></selector><code>r</code></check>",
        )
        .unwrap();
        let doc = MetadataDocument::from_str("<anything/>", "doc.xml").unwrap();
        assert!(check.is_valid_for(doc.namespaced()).unwrap());
    }

    #[test]
    fn test_dialect_without_xpath_is_ignored() {
        let check = parse(
            "<check><id>c</id><dialect><name>partial</name></dialect><selector><name>x</name><xpath>y</xpath></selector><code>r</code></check>",
        )
        .unwrap();
        assert!(check.dialects.is_empty());
    }
}
