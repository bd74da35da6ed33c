//! Selector evaluation: named, typed extraction rules over a document view.
//!
//! A selector is a path query plus a name. A leaf selector coerces each
//! matched node's string value to a typed scalar; a selector with a
//! `subSelector` recurses into each matched node and flattens the nested
//! results one level, so check logic always sees a flat list.

use serde::Serialize;

use crate::document::{DocView, NodeId};
use crate::error::Result;
use crate::query::{self, Item, QueryValue};

/// A typed scalar extracted by a selector.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SelectorValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl SelectorValue {
    /// Coerce a node's text: numeric parse first, then the literal
    /// `"True"`/`"False"` forms, then the raw text.
    pub fn coerce(text: &str) -> SelectorValue {
        if let Ok(n) = text.trim().parse::<f64>() {
            return SelectorValue::Number(n);
        }
        match text {
            "True" => SelectorValue::Bool(true),
            "False" => SelectorValue::Bool(false),
            _ => SelectorValue::Text(text.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            SelectorValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SelectorValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// A selector specification parsed from a check definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    /// Variable name the extracted values are stored under.
    pub name: String,
    /// Path-query expression applied to the context node.
    pub xpath: String,
    /// Evaluate against the namespace-aware document form.
    pub namespace_aware: bool,
    /// Optional nested extraction applied to every matched node.
    pub sub_selector: Option<Box<Selector>>,
}

/// Apply `selector` to `context`, producing a flat list of typed values.
///
/// A query that evaluates to a boolean yields that boolean as a
/// single-element list — deliberately distinct from a query that matches
/// zero nodes, which yields an empty list. Downstream truthiness checks
/// depend on `[false]` and `[]` staying distinguishable.
pub fn select(view: DocView<'_>, context: NodeId, selector: &Selector) -> Result<Vec<SelectorValue>> {
    let result = query::evaluate(view, context, &selector.xpath)?;

    let items = match result {
        QueryValue::Bool(b) => return Ok(vec![SelectorValue::Bool(b)]),
        QueryValue::Number(n) => return Ok(vec![SelectorValue::Number(n)]),
        QueryValue::Text(s) => return Ok(vec![SelectorValue::coerce(&s)]),
        QueryValue::Nodes(items) => items,
    };

    let mut values = Vec::new();
    for item in items {
        match (&selector.sub_selector, item) {
            (Some(sub), Item::Element(node)) => {
                // Flatten one level: the recursion's list contributes its
                // elements, never itself.
                values.extend(select(view, node, sub)?);
            }
            (Some(_), _) => {}
            (None, Item::Element(node)) => {
                values.push(SelectorValue::coerce(&view.doc().string_value(node)));
            }
            (None, Item::Attribute(value)) | (None, Item::Text(value)) => {
                values.push(SelectorValue::coerce(&value));
            }
        }
    }
    Ok(values)
}

/// Whether an extracted value list is blank: empty, or every element is
/// whitespace-only text. Numbers and booleans are never blank.
pub fn is_blank(values: &[SelectorValue]) -> bool {
    values.iter().all(|v| match v {
        SelectorValue::Text(s) => s.trim().is_empty(),
        SelectorValue::Number(_) | SelectorValue::Bool(_) => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MetadataDocument;

    const DOC: &str = r#"<dataset>
  <title>Krill density transects</title>
  <keywordSet>
    <keyword>krill</keyword>
    <keyword>acoustics</keyword>
  </keywordSet>
  <keywordSet>
    <keyword>Southern Ocean</keyword>
  </keywordSet>
  <coverage><depth>120.5</depth><verified>True</verified></coverage>
</dataset>"#;

    fn md() -> MetadataDocument {
        MetadataDocument::from_str(DOC, "sel.xml").unwrap()
    }

    fn leaf(name: &str, xpath: &str) -> Selector {
        Selector {
            name: name.to_string(),
            xpath: xpath.to_string(),
            namespace_aware: false,
            sub_selector: None,
        }
    }

    #[test]
    fn test_leaf_selector_extracts_text() {
        let md = md();
        let view = md.stripped();
        let values = select(view, view.root(), &leaf("title", "//title")).unwrap();
        assert_eq!(
            values,
            vec![SelectorValue::Text("Krill density transects".into())]
        );
    }

    #[test]
    fn test_numeric_and_boolean_coercion() {
        let md = md();
        let view = md.stripped();
        let depth = select(view, view.root(), &leaf("depth", "//depth")).unwrap();
        assert_eq!(depth, vec![SelectorValue::Number(120.5)]);
        let verified = select(view, view.root(), &leaf("verified", "//verified")).unwrap();
        assert_eq!(verified, vec![SelectorValue::Bool(true)]);
    }

    #[test]
    fn test_boolean_query_early_exit_vs_empty_match() {
        let md = md();
        let view = md.stripped();
        // A query evaluating to false yields [false]...
        let f = select(view, view.root(), &leaf("has", "count(//missing) > 0")).unwrap();
        assert_eq!(f, vec![SelectorValue::Bool(false)]);
        // ...while a query matching nothing yields [].
        let empty = select(view, view.root(), &leaf("none", "//missing")).unwrap();
        assert!(empty.is_empty());
        assert_ne!(f.len(), empty.len());
    }

    #[test]
    fn test_sub_selector_flattens_one_level() {
        let md = md();
        let view = md.stripped();
        let selector = Selector {
            name: "keywords".into(),
            xpath: "//keywordSet".into(),
            namespace_aware: false,
            sub_selector: Some(Box::new(leaf("kw", "keyword"))),
        };
        let values = select(view, view.root(), &selector).unwrap();
        // Two keyword sets, three keywords, one flat list.
        assert_eq!(
            values,
            vec![
                SelectorValue::Text("krill".into()),
                SelectorValue::Text("acoustics".into()),
                SelectorValue::Text("Southern Ocean".into()),
            ]
        );
    }

    #[test]
    fn test_count_query_yields_number() {
        let md = md();
        let view = md.stripped();
        let values = select(view, view.root(), &leaf("count", "count(//keyword)")).unwrap();
        assert_eq!(values, vec![SelectorValue::Number(3.0)]);
    }

    #[test]
    fn test_coercion_idempotence() {
        // Re-coercing an already-coerced rendering yields the same value.
        assert_eq!(SelectorValue::coerce("1.5"), SelectorValue::Number(1.5));
        match SelectorValue::coerce("1.5") {
            SelectorValue::Number(n) => {
                assert_eq!(SelectorValue::coerce(&n.to_string()), SelectorValue::Number(1.5))
            }
            _ => unreachable!(),
        }
        assert_eq!(SelectorValue::coerce("True"), SelectorValue::Bool(true));
        assert_eq!(SelectorValue::coerce("False"), SelectorValue::Bool(false));
        assert_eq!(
            SelectorValue::coerce("plain"),
            SelectorValue::Text("plain".into())
        );
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(&[]));
        assert!(is_blank(&[SelectorValue::Text("   ".into())]));
        assert!(!is_blank(&[SelectorValue::Text("x".into())]));
        assert!(!is_blank(&[SelectorValue::Number(0.0)]));
        assert!(!is_blank(&[
            SelectorValue::Text(" ".into()),
            SelectorValue::Bool(false)
        ]));
    }
}
