//! Evaluator for parsed path-query expressions.

use crate::document::{DocView, NodeId};
use crate::error::{EngineError, Result};

use super::parse::{Axis, BinaryOp, Expr, NameTest, PathExpr, Step};
use super::{Item, QueryValue};

/// Evaluation context: an element node, or the document node itself
/// (the starting point of absolute paths).
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) enum Ctx {
    Doc,
    Node(NodeId),
}

fn query_err(message: impl Into<String>) -> EngineError {
    EngineError::InvalidQuery {
        expression: String::new(),
        message: message.into(),
    }
}

/// Format a number the way `string()` does: integers lose the fraction.
fn format_number(n: f64) -> String {
    if n.is_finite() && n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// String value of a single node-set item.
fn item_string(view: DocView<'_>, item: &Item) -> String {
    match item {
        Item::Element(id) => view.doc().string_value(*id),
        Item::Attribute(value) => value.clone(),
        Item::Text(text) => text.clone(),
    }
}

/// String value of a query result (first item for node-sets).
fn value_string(view: DocView<'_>, value: &QueryValue) -> String {
    match value {
        QueryValue::Nodes(items) => items
            .first()
            .map(|i| item_string(view, i))
            .unwrap_or_default(),
        QueryValue::Bool(b) => b.to_string(),
        QueryValue::Number(n) => format_number(*n),
        QueryValue::Text(s) => s.clone(),
    }
}

pub(super) fn eval_expr(
    expr: &Expr,
    view: DocView<'_>,
    ctx: Ctx,
    position: usize,
    size: usize,
) -> Result<QueryValue> {
    match expr {
        Expr::Number(n) => Ok(QueryValue::Number(*n)),
        Expr::Literal(s) => Ok(QueryValue::Text(s.clone())),
        Expr::Path(path) => Ok(QueryValue::Nodes(eval_path(path, view, ctx)?)),
        Expr::Call { name, args } => eval_call(name, args, view, ctx, position, size),
        Expr::Binary { op, lhs, rhs } => match op {
            BinaryOp::Or => {
                let l = eval_expr(lhs, view, ctx, position, size)?;
                if l.truthy() {
                    return Ok(QueryValue::Bool(true));
                }
                let r = eval_expr(rhs, view, ctx, position, size)?;
                Ok(QueryValue::Bool(r.truthy()))
            }
            BinaryOp::And => {
                let l = eval_expr(lhs, view, ctx, position, size)?;
                if !l.truthy() {
                    return Ok(QueryValue::Bool(false));
                }
                let r = eval_expr(rhs, view, ctx, position, size)?;
                Ok(QueryValue::Bool(r.truthy()))
            }
            _ => {
                let l = eval_expr(lhs, view, ctx, position, size)?;
                let r = eval_expr(rhs, view, ctx, position, size)?;
                Ok(QueryValue::Bool(compare(*op, &l, &r, view)))
            }
        },
    }
}

fn eval_call(
    name: &str,
    args: &[Expr],
    view: DocView<'_>,
    ctx: Ctx,
    position: usize,
    size: usize,
) -> Result<QueryValue> {
    let arity = |expected: usize| -> Result<()> {
        if args.len() == expected {
            Ok(())
        } else {
            Err(query_err(format!(
                "{name}() takes {expected} argument(s), got {}",
                args.len()
            )))
        }
    };

    match name {
        "count" => {
            arity(1)?;
            match eval_expr(&args[0], view, ctx, position, size)? {
                QueryValue::Nodes(items) => Ok(QueryValue::Number(items.len() as f64)),
                _ => Err(query_err("count() expects a node-set")),
            }
        }
        "boolean" => {
            arity(1)?;
            let v = eval_expr(&args[0], view, ctx, position, size)?;
            Ok(QueryValue::Bool(v.truthy()))
        }
        "not" => {
            arity(1)?;
            let v = eval_expr(&args[0], view, ctx, position, size)?;
            Ok(QueryValue::Bool(!v.truthy()))
        }
        "true" => {
            arity(0)?;
            Ok(QueryValue::Bool(true))
        }
        "false" => {
            arity(0)?;
            Ok(QueryValue::Bool(false))
        }
        "string" | "normalize-space" => {
            if args.len() > 1 {
                return Err(query_err(format!("{name}() takes at most one argument")));
            }
            let value = match args.first() {
                Some(arg) => eval_expr(arg, view, ctx, position, size)?,
                None => match ctx {
                    Ctx::Node(id) => QueryValue::Nodes(vec![Item::Element(id)]),
                    Ctx::Doc => QueryValue::Nodes(vec![Item::Element(view.root())]),
                },
            };
            let s = value_string(view, &value);
            // Element string values are already whitespace-normalized; text
            // nodes and literals may not be.
            let s = if name == "normalize-space" {
                s.split_whitespace().collect::<Vec<_>>().join(" ")
            } else {
                s
            };
            Ok(QueryValue::Text(s))
        }
        _ => Err(query_err(format!("unknown function {name}()"))),
    }
}

fn eval_path(path: &PathExpr, view: DocView<'_>, ctx: Ctx) -> Result<Vec<Item>> {
    let mut cursors: Vec<Ctx> = if path.absolute { vec![Ctx::Doc] } else { vec![ctx] };

    for (i, step) in path.steps.iter().enumerate() {
        let is_last = i + 1 == path.steps.len();
        match (&step.axis, &step.test) {
            (Axis::Attribute, test) => {
                let items = collect_attr_items(view, &cursors, test, &step.predicates)?;
                // Nothing can follow an attribute step.
                return Ok(if is_last { items } else { vec![] });
            }
            (_, NameTest::Text) => {
                let items = collect_text_items(view, &cursors, step, &step.predicates)?;
                return Ok(if is_last { items } else { vec![] });
            }
            _ => {
                cursors = advance(view, &cursors, step)?;
            }
        }
    }

    let mut seen = std::collections::HashSet::new();
    let mut items = Vec::new();
    for cursor in cursors {
        if let Ctx::Node(id) = cursor {
            if seen.insert(id) {
                items.push(Item::Element(id));
            }
        }
    }
    Ok(items)
}

/// Apply one element-axis step to every cursor, predicates included.
fn advance(view: DocView<'_>, cursors: &[Ctx], step: &Step) -> Result<Vec<Ctx>> {
    let doc = view.doc();
    let mut out = Vec::new();
    for &cursor in cursors {
        let candidates: Vec<NodeId> = match (step.axis, cursor) {
            (Axis::Child, Ctx::Doc) => vec![doc.root()],
            (Axis::Child, Ctx::Node(id)) => doc.node(id).children.clone(),
            (Axis::Descendant, Ctx::Doc) => {
                let mut all = vec![doc.root()];
                all.extend(doc.descendants(doc.root()));
                all
            }
            (Axis::Descendant, Ctx::Node(id)) => doc.descendants(id),
            (Axis::SelfNode, Ctx::Node(id)) => vec![id],
            (Axis::SelfNode, Ctx::Doc) => {
                out.push(Ctx::Doc);
                continue;
            }
            (Axis::Parent, Ctx::Node(id)) => match doc.node(id).parent {
                Some(parent) => vec![parent],
                None => {
                    out.push(Ctx::Doc);
                    continue;
                }
            },
            (Axis::Parent, Ctx::Doc) => continue,
            (Axis::Attribute, _) => unreachable!("attribute steps handled by caller"),
        };

        let matched: Vec<NodeId> = candidates
            .into_iter()
            .filter(|&id| match &step.test {
                NameTest::Name(name) => view.element_matches(id, name),
                NameTest::Wildcard => true,
                NameTest::Text => false,
            })
            .collect();

        let filtered = apply_predicates(view, matched, &step.predicates)?;
        out.extend(filtered.into_iter().map(Ctx::Node));
    }

    // Node-sets never contain duplicates.
    let mut seen = std::collections::HashSet::new();
    out.retain(|c| match c {
        Ctx::Node(id) => seen.insert(*id),
        Ctx::Doc => true,
    });
    Ok(out)
}

/// Filter a candidate list through a step's predicates in order. A numeric
/// predicate selects by 1-based position; anything else keeps candidates
/// whose evaluation is truthy.
fn apply_predicates(
    view: DocView<'_>,
    mut candidates: Vec<NodeId>,
    predicates: &[Expr],
) -> Result<Vec<NodeId>> {
    for pred in predicates {
        let size = candidates.len();
        let mut kept = Vec::new();
        for (idx, &id) in candidates.iter().enumerate() {
            let position = idx + 1;
            let value = eval_expr(pred, view, Ctx::Node(id), position, size)?;
            let keep = match value {
                QueryValue::Number(n) => (position as f64) == n,
                other => other.truthy(),
            };
            if keep {
                kept.push(id);
            }
        }
        candidates = kept;
    }
    Ok(candidates)
}

fn collect_attr_items(
    view: DocView<'_>,
    cursors: &[Ctx],
    test: &NameTest,
    predicates: &[Expr],
) -> Result<Vec<Item>> {
    let doc = view.doc();
    let mut owners: Vec<(NodeId, String)> = Vec::new();
    for &cursor in cursors {
        let Ctx::Node(id) = cursor else { continue };
        match test {
            NameTest::Name(name) => {
                if let Some(value) = view.attr_value(id, name) {
                    owners.push((id, value.to_string()));
                }
            }
            NameTest::Wildcard => {
                for attr in &doc.node(id).attributes {
                    owners.push((id, attr.value.clone()));
                }
            }
            NameTest::Text => {}
        }
    }
    let kept = apply_item_predicates(view, owners, predicates)?;
    Ok(kept.into_iter().map(Item::Attribute).collect())
}

fn collect_text_items(
    view: DocView<'_>,
    cursors: &[Ctx],
    step: &Step,
    predicates: &[Expr],
) -> Result<Vec<Item>> {
    let doc = view.doc();
    let mut owners: Vec<(NodeId, String)> = Vec::new();
    for &cursor in cursors {
        let Ctx::Node(id) = cursor else { continue };
        let candidates: Vec<NodeId> = match step.axis {
            Axis::Descendant => {
                let mut all = vec![id];
                all.extend(doc.descendants(id));
                all
            }
            _ => vec![id],
        };
        for node in candidates {
            let text = doc.node(node).text.trim().to_string();
            if !text.is_empty() {
                owners.push((node, text));
            }
        }
    }
    let kept = apply_item_predicates(view, owners, predicates)?;
    Ok(kept.into_iter().map(Item::Text).collect())
}

/// Predicates over attribute/text items: positional predicates index the
/// item list; other predicates are evaluated with the owning element as the
/// context node.
fn apply_item_predicates(
    view: DocView<'_>,
    mut items: Vec<(NodeId, String)>,
    predicates: &[Expr],
) -> Result<Vec<String>> {
    for pred in predicates {
        let size = items.len();
        let mut kept = Vec::new();
        for (idx, (owner, value)) in items.iter().enumerate() {
            let position = idx + 1;
            let result = eval_expr(pred, view, Ctx::Node(*owner), position, size)?;
            let keep = match result {
                QueryValue::Number(n) => (position as f64) == n,
                other => other.truthy(),
            };
            if keep {
                kept.push((*owner, value.clone()));
            }
        }
        items = kept;
    }
    Ok(items.into_iter().map(|(_, v)| v).collect())
}

fn as_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok()
}

fn numeric_cmp(op: BinaryOp, a: f64, b: f64) -> bool {
    match op {
        BinaryOp::Eq => a == b,
        BinaryOp::Ne => a != b,
        BinaryOp::Lt => a < b,
        BinaryOp::Le => a <= b,
        BinaryOp::Gt => a > b,
        BinaryOp::Ge => a >= b,
        BinaryOp::And | BinaryOp::Or => unreachable!(),
    }
}

fn string_cmp(op: BinaryOp, a: &str, b: &str) -> bool {
    // Numeric comparison when both sides parse; string comparison is only
    // meaningful for equality.
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => numeric_cmp(op, x, y),
        _ => match op {
            BinaryOp::Eq => a == b,
            BinaryOp::Ne => a != b,
            _ => false,
        },
    }
}

fn compare(op: BinaryOp, lhs: &QueryValue, rhs: &QueryValue, view: DocView<'_>) -> bool {
    use QueryValue::*;
    match (lhs, rhs) {
        // Booleans compare by effective boolean value.
        (Bool(_), _) | (_, Bool(_)) => {
            numeric_cmp(op, lhs.truthy() as i64 as f64, rhs.truthy() as i64 as f64)
        }
        // Node-sets use existential semantics: true when any member matches.
        (Nodes(items), other) => items
            .iter()
            .any(|i| string_cmp(op, &item_string(view, i), &value_string(view, other))),
        (other, Nodes(items)) => items
            .iter()
            .any(|i| string_cmp(op, &value_string(view, other), &item_string(view, i))),
        (Number(a), Number(b)) => numeric_cmp(op, *a, *b),
        (Number(a), Text(b)) => as_number(b).map(|b| numeric_cmp(op, *a, b)).unwrap_or(false),
        (Text(a), Number(b)) => as_number(a).map(|a| numeric_cmp(op, a, *b)).unwrap_or(false),
        (Text(a), Text(b)) => string_cmp(op, a, b),
    }
}
