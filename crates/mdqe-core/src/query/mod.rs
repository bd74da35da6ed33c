//! Path-query language for selectors and dialects.
//!
//! A small expression language evaluated against a [`DocView`]: location
//! paths (`/eml/dataset`, `.//entityName`, `@packageId`), positional and
//! comparison predicates, and a handful of functions (`count`, `boolean`,
//! `not`, `string`, `normalize-space`, `true`, `false`). Queries return a
//! typed [`QueryValue`]: a node-set, boolean, number, or string. The
//! distinction matters downstream: a query that evaluates to `false` is not
//! the same as a query that matches nothing.
//!
//! # Grammar
//!
//! ```text
//! expr     := and-expr ("or" and-expr)*
//! and-expr := cmp-expr ("and" cmp-expr)*
//! cmp-expr := value (("=" | "!=" | "<" | "<=" | ">" | ">=") value)?
//! value    := number | 'literal' | fn "(" args ")" | path | "(" expr ")"
//! path     := ("/" | "//")? step (("/" | "//") step)*
//! step     := "." | ".." | "@"? (name | "*" | "text()") ("[" expr "]")*
//! ```

mod eval;
mod parse;

pub use parse::{parse, Axis, BinaryOp, Expr, NameTest, PathExpr, Step};

use crate::document::{DocView, NodeId};
use crate::error::Result;

/// A member of a result node-set.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// An element node.
    Element(NodeId),
    /// An attribute value.
    Attribute(String),
    /// A text node's content.
    Text(String),
}

/// The typed result of evaluating a query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Nodes(Vec<Item>),
    Bool(bool),
    Number(f64),
    Text(String),
}

impl QueryValue {
    /// Effective boolean value: non-empty node-set, non-zero number,
    /// non-empty string, or the boolean itself.
    pub fn truthy(&self) -> bool {
        match self {
            QueryValue::Nodes(items) => !items.is_empty(),
            QueryValue::Bool(b) => *b,
            QueryValue::Number(n) => *n != 0.0 && !n.is_nan(),
            QueryValue::Text(s) => !s.is_empty(),
        }
    }
}

/// Parse and evaluate `expression` with `context` as the context node.
pub fn evaluate(view: DocView<'_>, context: NodeId, expression: &str) -> Result<QueryValue> {
    let expr = parse(expression)?;
    eval::eval_expr(&expr, view, eval::Ctx::Node(context), 1, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MetadataDocument;

    const DOC: &str = r#"<catalog>
  <item kind="a">alpha</item>
  <item kind="b">beta</item>
  <item kind="b">gamma</item>
  <meta><depth>4.5</depth><public>True</public></meta>
</catalog>"#;

    fn md() -> MetadataDocument {
        MetadataDocument::from_str(DOC, "q.xml").unwrap()
    }

    fn eval(expr: &str) -> QueryValue {
        let md = md();
        let view = md.stripped();
        evaluate(view, view.root(), expr).expect("query failed")
    }

    #[test]
    fn test_relative_child_path() {
        match eval("item") {
            QueryValue::Nodes(items) => assert_eq!(items.len(), 3),
            other => panic!("expected nodes, got {other:?}"),
        }
    }

    #[test]
    fn test_descendant_path_and_count() {
        assert_eq!(eval("count(//item)"), QueryValue::Number(3.0));
        assert_eq!(eval("count(.//depth)"), QueryValue::Number(1.0));
    }

    #[test]
    fn test_attribute_step() {
        match eval("item/@kind") {
            QueryValue::Nodes(items) => {
                assert_eq!(items.len(), 3);
                assert_eq!(items[0], Item::Attribute("a".into()));
            }
            other => panic!("expected nodes, got {other:?}"),
        }
    }

    #[test]
    fn test_positional_predicate() {
        match eval("item[2]") {
            QueryValue::Nodes(items) => assert_eq!(items.len(), 1),
            other => panic!("expected nodes, got {other:?}"),
        }
    }

    #[test]
    fn test_attribute_value_predicate() {
        match eval("item[@kind='b']") {
            QueryValue::Nodes(items) => assert_eq!(items.len(), 2),
            other => panic!("expected nodes, got {other:?}"),
        }
    }

    #[test]
    fn test_boolean_result_is_not_a_nodeset() {
        assert_eq!(eval("count(//item) > 2"), QueryValue::Bool(true));
        assert_eq!(eval("boolean(//missing)"), QueryValue::Bool(false));
        assert_eq!(eval("not(//missing)"), QueryValue::Bool(true));
    }

    #[test]
    fn test_empty_match_is_empty_nodeset() {
        assert_eq!(eval("//missing"), QueryValue::Nodes(vec![]));
    }

    #[test]
    fn test_string_function() {
        assert_eq!(eval("string(//depth)"), QueryValue::Text("4.5".into()));
        assert_eq!(eval("string(count(//item))"), QueryValue::Text("3".into()));
    }

    #[test]
    fn test_comparison_against_node_text() {
        assert_eq!(eval("//depth = 4.5"), QueryValue::Bool(true));
        assert_eq!(eval("//depth < 4"), QueryValue::Bool(false));
        assert_eq!(eval("//item = 'beta'"), QueryValue::Bool(true));
    }

    #[test]
    fn test_and_or() {
        assert_eq!(
            eval("count(//item) = 3 and //public = 'True'"),
            QueryValue::Bool(true)
        );
        assert_eq!(
            eval("count(//item) = 0 or //depth > 4"),
            QueryValue::Bool(true)
        );
    }

    #[test]
    fn test_text_step() {
        match eval("//item[1]/text()") {
            QueryValue::Nodes(items) => {
                assert_eq!(items, vec![Item::Text("alpha".into())]);
            }
            other => panic!("expected nodes, got {other:?}"),
        }
    }

    #[test]
    fn test_truthiness() {
        assert!(QueryValue::Number(1.0).truthy());
        assert!(!QueryValue::Number(0.0).truthy());
        assert!(!QueryValue::Nodes(vec![]).truthy());
        assert!(QueryValue::Text("x".into()).truthy());
        assert!(!QueryValue::Text(String::new()).truthy());
    }
}
