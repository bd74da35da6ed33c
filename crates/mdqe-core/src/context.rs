//! Execution context and routine scope.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;

use crate::report::CheckOutcome;
use crate::selector::SelectorValue;
use crate::store::StoreConfig;

/// Scope key for the designated structured result.
pub const RESULT_VAR: &str = "result";
/// Fallback scope key for loose output messages.
pub const OUTPUT_VAR: &str = "output";
/// Fallback scope key for a loose status string.
pub const STATUS_VAR: &str = "status";

/// The full variable environment assembled for one check run.
///
/// Created fresh per invocation and discarded after the check returns;
/// nothing in here is shared between concurrent executions.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionContext {
    /// Selector outputs keyed by selector name.
    pub variables: BTreeMap<String, Vec<SelectorValue>>,
    /// Associated data object identifiers resolved from the catalog index.
    pub data_pids: Vec<String>,
    /// Store configuration passed through to routines, uninterpreted.
    pub store_config: Option<StoreConfig>,
    /// Raw text of the metadata document under check.
    pub document: String,
    /// Raw text of the object's system metadata.
    pub sysmeta: String,
    /// Directory hint for routines that read bundled resources.
    pub resources_dir: Option<PathBuf>,
}

impl ExecutionContext {
    /// Values extracted by the selector named `name`.
    pub fn variable(&self, name: &str) -> Option<&[SelectorValue]> {
        self.variables.get(name).map(|v| v.as_slice())
    }
}

/// The writable variable surface a check routine leaves its results in.
///
/// A routine either sets the designated structured result or, on the legacy
/// path, loose `output` / `status` entries the classifier reads afterwards.
#[derive(Debug, Default)]
pub struct Scope {
    values: BTreeMap<String, Value>,
}

impl Scope {
    pub fn new() -> Scope {
        Scope::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Store the structured result the classifier serializes directly.
    pub fn set_result(&mut self, outcome: &CheckOutcome) {
        if let Ok(value) = serde_json::to_value(outcome) {
            self.set(RESULT_VAR, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::CheckStatus;

    #[test]
    fn test_variable_lookup() {
        let mut variables = BTreeMap::new();
        variables.insert("count".to_string(), vec![SelectorValue::Number(3.0)]);
        let ctx = ExecutionContext {
            variables,
            data_pids: vec![],
            store_config: None,
            document: String::new(),
            sysmeta: String::new(),
            resources_dir: None,
        };
        assert_eq!(ctx.variable("count").unwrap().len(), 1);
        assert!(ctx.variable("missing").is_none());
    }

    #[test]
    fn test_scope_set_result() {
        let mut scope = Scope::new();
        scope.set_result(&CheckOutcome {
            identifiers: vec!["pid:1".into()],
            output: vec!["ok".into()],
            status: CheckStatus::Success,
        });
        let value = scope.get(RESULT_VAR).unwrap();
        assert_eq!(value["status"], "SUCCESS");
        assert_eq!(value["identifiers"][0], "pid:1");
    }
}
