//! Check routine registry.
//!
//! Check documents are data; the validation logic they reference is a
//! statically compiled routine registered here. A routine is looked up by
//! the check's id first, then by the trimmed text of its `code` element, so
//! one generic routine can serve a whole family of check documents.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context as _};

use crate::context::{ExecutionContext, Scope};
use crate::report::{CheckOutcome, CheckStatus};
use crate::selector::is_blank;

/// A compiled validation routine. Reads the execution context, leaves its
/// result in the scope, and returns `Err` only for conditions that should
/// surface as an ERROR outcome.
pub type CheckRoutine =
    Arc<dyn Fn(&ExecutionContext, &mut Scope) -> anyhow::Result<()> + Send + Sync>;

/// Maps routine names (and check ids) to validation routines.
#[derive(Clone, Default)]
pub struct Registry {
    routines: HashMap<String, CheckRoutine>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Registry {
        Registry::default()
    }

    /// A registry with the generic built-in routines registered.
    pub fn with_builtins() -> Registry {
        let mut registry = Registry::new();
        registry.register("values_present", Arc::new(values_present));
        registry.register("count_positive", Arc::new(count_positive));
        registry
    }

    /// Register a routine under `name`, replacing any previous binding.
    pub fn register(&mut self, name: impl Into<String>, routine: CheckRoutine) {
        self.routines.insert(name.into(), routine);
    }

    /// Resolve the routine for a check: the check id wins, the `code`
    /// element's trimmed text is the shared-routine fallback.
    pub fn resolve(&self, check_id: &str, code: Option<&str>) -> Option<&CheckRoutine> {
        self.routines
            .get(check_id)
            .or_else(|| code.and_then(|c| self.routines.get(c.trim())))
    }

    pub fn len(&self) -> usize {
        self.routines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }
}

/// Every declared selector variable must have at least one non-blank value.
fn values_present(ctx: &ExecutionContext, scope: &mut Scope) -> anyhow::Result<()> {
    let missing: Vec<&str> = ctx
        .variables
        .iter()
        .filter(|(_, values)| is_blank(values))
        .map(|(name, _)| name.as_str())
        .collect();

    let outcome = if missing.is_empty() {
        CheckOutcome {
            identifiers: ctx.data_pids.clone(),
            output: vec![format!(
                "All {} extracted value(s) are present",
                ctx.variables.len()
            )],
            status: CheckStatus::Success,
        }
    } else {
        CheckOutcome {
            identifiers: ctx.data_pids.clone(),
            output: vec![format!("Missing or blank value(s): {}", missing.join(", "))],
            status: CheckStatus::Failure,
        }
    };
    scope.set_result(&outcome);
    Ok(())
}

/// The `count` variable's first value must be a number greater than zero.
fn count_positive(ctx: &ExecutionContext, scope: &mut Scope) -> anyhow::Result<()> {
    let values = ctx
        .variable("count")
        .context("no selector named 'count' is declared")?;
    let Some(first) = values.first() else {
        bail!("selector 'count' extracted no values");
    };
    let Some(count) = first.as_number() else {
        bail!("selector 'count' did not extract a number");
    };

    let outcome = if count > 0.0 {
        CheckOutcome {
            identifiers: ctx.data_pids.clone(),
            output: vec![format!("Found {count} matching item(s)")],
            status: CheckStatus::Success,
        }
    } else {
        CheckOutcome {
            identifiers: ctx.data_pids.clone(),
            output: vec!["Expected at least one matching item, found none".to_string()],
            status: CheckStatus::Failure,
        }
    };
    scope.set_result(&outcome);
    Ok(())
}
