//! Single-check execution.
//!
//! One run moves through LOAD → VALIDATE → SELECT → RESOLVE_CONTEXT →
//! EXECUTE → CLASSIFY. Everything up to and including context resolution is
//! fatal and propagates to the caller; once the check's routine is invoked,
//! failures are caught and converted into ERROR outcomes so a broken check
//! reports instead of crashing its worker.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::catalog::{resolve_associated_pids, CatalogClient};
use crate::check::CheckDefinition;
use crate::context::{ExecutionContext, Scope, OUTPUT_VAR, RESULT_VAR, STATUS_VAR};
use crate::document::{Document, MetadataDocument};
use crate::error::{EngineError, Result};
use crate::registry::Registry;
use crate::report::{CheckOutcome, CheckStatus};
use crate::selector;
use crate::store::StoreConfig;
use crate::sysmeta::SystemMetadata;

/// Options governing a single-check run.
#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    /// Skip catalog resolution and seed an empty data-pid list.
    pub offline: bool,
    /// Directory hint forwarded to routines that read bundled resources.
    pub resources_dir: Option<PathBuf>,
}

/// How a single-check run ended: with an outcome, or not applicable at all.
///
/// A skipped check produces no outcome entry — callers must keep "check not
/// applicable" distinct from "check ran and produced a result".
#[derive(Debug, Clone, PartialEq)]
pub enum RunDisposition {
    Completed(CheckOutcome),
    Skipped { check_id: String, reason: String },
}

/// Runs one check against one metadata document.
pub struct CheckExecutor {
    registry: Arc<Registry>,
    catalog: Arc<dyn CatalogClient>,
    options: ExecutorOptions,
}

impl CheckExecutor {
    pub fn new(registry: Arc<Registry>, catalog: Arc<dyn CatalogClient>) -> CheckExecutor {
        Self::with_options(registry, catalog, ExecutorOptions::default())
    }

    pub fn with_options(
        registry: Arc<Registry>,
        catalog: Arc<dyn CatalogClient>,
        options: ExecutorOptions,
    ) -> CheckExecutor {
        CheckExecutor {
            registry,
            catalog,
            options,
        }
    }

    /// Execute the check at `check_path` against the document and sysmeta at
    /// the given paths.
    pub async fn run(
        &self,
        check_path: &Path,
        metadata_path: &Path,
        sysmeta_path: &Path,
        store_config: Option<StoreConfig>,
    ) -> Result<RunDisposition> {
        // LOAD
        let check_doc = Document::parse_file(check_path)?;
        let check = CheckDefinition::from_document(&check_doc, &check_path.to_string_lossy())?;
        if !metadata_path.is_file() {
            return Err(EngineError::FileNotFound(metadata_path.to_path_buf()));
        }
        let document_text = std::fs::read_to_string(metadata_path)?;
        let metadata =
            MetadataDocument::from_str(&document_text, &metadata_path.to_string_lossy())?;
        debug!(check_id = %check.id, "loaded check and metadata document");

        // VALIDATE
        if !check.is_valid_for(metadata.namespaced())? {
            info!(check_id = %check.id, "check dialect does not match document, skipping");
            return Ok(RunDisposition::Skipped {
                check_id: check.id.clone(),
                reason: "no declared dialect matches the document".to_string(),
            });
        }

        // SELECT
        if check.selectors.is_empty() {
            return Err(EngineError::NoSelectors {
                check_id: check.id.clone(),
            });
        }
        if check.code.is_none() {
            return Err(EngineError::NoCode {
                check_id: check.id.clone(),
            });
        }
        let mut variables = BTreeMap::new();
        for sel in &check.selectors {
            // Each selector picks its document form independently.
            let view = if sel.namespace_aware {
                metadata.namespaced()
            } else {
                metadata.stripped()
            };
            let values = selector::select(view, view.root(), sel)?;
            debug!(check_id = %check.id, selector = %sel.name, count = values.len(), "selector applied");
            variables.insert(sel.name.clone(), values);
        }

        // RESOLVE_CONTEXT
        let sysmeta = SystemMetadata::from_path(sysmeta_path)?;
        let data_pids = if self.options.offline {
            Vec::new()
        } else {
            resolve_associated_pids(
                self.catalog.as_ref(),
                &sysmeta.identifier,
                &sysmeta.authoritative_member_node,
            )
            .await?
        };
        let context = ExecutionContext {
            variables,
            data_pids: data_pids.clone(),
            store_config,
            document: document_text,
            sysmeta: std::fs::read_to_string(sysmeta_path)?,
            resources_dir: self.options.resources_dir.clone(),
        };

        // EXECUTE — from here on, failures become ERROR outcomes.
        let Some(routine) = self.registry.resolve(&check.id, check.code.as_deref()) else {
            warn!(check_id = %check.id, "no routine registered");
            return Ok(RunDisposition::Completed(CheckOutcome::error(
                data_pids,
                format!("No validation routine registered for check {}", check.id),
            )));
        };

        let mut scope = Scope::new();
        let invoked = catch_unwind(AssertUnwindSafe(|| routine(&context, &mut scope)));
        let outcome = match invoked {
            Ok(Ok(())) => classify(&scope, data_pids),
            Ok(Err(e)) => {
                warn!(check_id = %check.id, error = %e, "check routine failed");
                CheckOutcome::error(data_pids, format!("Check routine failed: {e:#}"))
            }
            Err(panic) => {
                let message = panic_text(&panic);
                warn!(check_id = %check.id, panic = %message, "check routine panicked");
                CheckOutcome::error(data_pids, format!("Check routine panicked: {message}"))
            }
        };

        info!(check_id = %check.id, status = %outcome.status, "check completed");
        Ok(RunDisposition::Completed(outcome))
    }
}

/// CLASSIFY: the designated structured result wins and is serialized
/// directly; otherwise read the loosely-named `output` / `status` entries
/// left in the scope, defaulting status to FAILURE. The loose path is a
/// compatibility shim for routines predating the structured convention.
fn classify(scope: &Scope, data_pids: Vec<String>) -> CheckOutcome {
    if let Some(value) = scope.get(RESULT_VAR) {
        return match serde_json::from_value::<CheckOutcome>(value.clone()) {
            Ok(outcome) => outcome,
            Err(e) => CheckOutcome::error(data_pids, format!("Malformed structured result: {e}")),
        };
    }

    let output = match scope.get(OUTPUT_VAR) {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(other) => vec![other.to_string()],
        None => Vec::new(),
    };
    let status = scope
        .get(STATUS_VAR)
        .and_then(Value::as_str)
        .map(CheckStatus::from)
        .unwrap_or(CheckStatus::Failure);

    CheckOutcome {
        identifiers: data_pids,
        output,
        status,
    }
}

fn panic_text(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::MemoryCatalog;
    use crate::registry::CheckRoutine;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    const METADATA: &str = r#"<catalog>
  <item>alpha</item>
  <item>beta</item>
  <item>gamma</item>
</catalog>"#;

    const EMPTY_METADATA: &str = "<catalog><name>empty</name></catalog>";

    const SYSMETA: &str = r#"<systemMetadata>
  <identifier>doi:10.5063/F1000001</identifier>
  <authoritativeMemberNode>urn:node:TEST</authoritativeMemberNode>
</systemMetadata>"#;

    const COUNT_CHECK: &str = r#"<check>
  <id>items.count.positive-1.0.0</id>
  <environment>rust</environment>
  <selector>
    <name>count</name>
    <xpath>count(//item)</xpath>
  </selector>
  <code>count_positive</code>
</check>"#;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    fn catalog() -> Arc<MemoryCatalog> {
        Arc::new(
            MemoryCatalog::new()
                .with_endpoint("urn:node:TEST", "https://test.example.org/mn")
                .with_association("doi:10.5063/F1000001", &["urn:uuid:data-1"]),
        )
    }

    fn executor() -> CheckExecutor {
        CheckExecutor::new(Arc::new(Registry::with_builtins()), catalog())
    }

    async fn run_files(
        exec: &CheckExecutor,
        check: &str,
        metadata: &str,
        sysmeta: &str,
    ) -> Result<RunDisposition> {
        let dir = TempDir::new().unwrap();
        let check_path = write(&dir, "check.xml", check);
        let metadata_path = write(&dir, "metadata.xml", metadata);
        let sysmeta_path = write(&dir, "sysmeta.xml", sysmeta);
        exec.run(&check_path, &metadata_path, &sysmeta_path, None)
            .await
    }

    #[tokio::test]
    async fn test_count_check_success_end_to_end() {
        let disposition = run_files(&executor(), COUNT_CHECK, METADATA, SYSMETA)
            .await
            .unwrap();
        match disposition {
            RunDisposition::Completed(outcome) => {
                assert_eq!(outcome.status, CheckStatus::Success);
                assert_eq!(outcome.identifiers, vec!["urn:uuid:data-1"]);
                assert!(outcome.output[0].contains("3"));
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_count_check_failure_is_not_error() {
        // Zero items: the check decides FAILURE; the engine must not
        // report ERROR.
        let disposition = run_files(&executor(), COUNT_CHECK, EMPTY_METADATA, SYSMETA)
            .await
            .unwrap();
        match disposition {
            RunDisposition::Completed(outcome) => {
                assert_eq!(outcome.status, CheckStatus::Failure)
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dialect_mismatch_skips_without_outcome() {
        let check = r#"<check>
  <id>eml.only-1.0.0</id>
  <dialect><name>EML</name><xpath>boolean(/eml)</xpath></dialect>
  <selector><name>count</name><xpath>count(//item)</xpath></selector>
  <code>count_positive</code>
</check>"#;
        let disposition = run_files(&executor(), check, METADATA, SYSMETA)
            .await
            .unwrap();
        match disposition {
            RunDisposition::Skipped { check_id, .. } => {
                assert_eq!(check_id, "eml.only-1.0.0")
            }
            other => panic!("expected Skipped, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_selectors_is_fatal() {
        let check = "<check><id>c</id><code>count_positive</code></check>";
        let err = run_files(&executor(), check, METADATA, SYSMETA)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoSelectors { .. }));
    }

    #[tokio::test]
    async fn test_no_code_is_fatal() {
        let check =
            "<check><id>c</id><selector><name>x</name><xpath>//item</xpath></selector></check>";
        let err = run_files(&executor(), check, METADATA, SYSMETA)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoCode { .. }));
    }

    #[tokio::test]
    async fn test_malformed_check_xml_is_fatal() {
        let err = run_files(&executor(), "<check><id>c</id>", METADATA, SYSMETA)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::XmlParse { .. }));
    }

    #[tokio::test]
    async fn test_unresolvable_endpoint_propagates() {
        let sysmeta = r#"<systemMetadata>
  <identifier>pid:1</identifier>
  <authoritativeMemberNode>urn:node:UNREGISTERED</authoritativeMemberNode>
</systemMetadata>"#;
        let err = run_files(&executor(), COUNT_CHECK, METADATA, sysmeta)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EndpointNotFound { .. }));
    }

    #[tokio::test]
    async fn test_offline_mode_skips_resolution() {
        let exec = CheckExecutor::with_options(
            Arc::new(Registry::with_builtins()),
            Arc::new(MemoryCatalog::new()),
            ExecutorOptions {
                offline: true,
                resources_dir: None,
            },
        );
        let disposition = run_files(&exec, COUNT_CHECK, METADATA, SYSMETA).await.unwrap();
        match disposition {
            RunDisposition::Completed(outcome) => {
                assert_eq!(outcome.status, CheckStatus::Success);
                assert!(outcome.identifiers.is_empty());
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_routine_error_becomes_error_outcome() {
        let mut registry = Registry::with_builtins();
        let failing: CheckRoutine =
            Arc::new(|_, _| anyhow::bail!("index out of range in check logic"));
        registry.register("broken_routine", failing);
        let exec = CheckExecutor::new(Arc::new(registry), catalog());

        let check = r#"<check>
  <id>broken-1.0.0</id>
  <selector><name>count</name><xpath>count(//item)</xpath></selector>
  <code>broken_routine</code>
</check>"#;
        let disposition = run_files(&exec, check, METADATA, SYSMETA).await.unwrap();
        match disposition {
            RunDisposition::Completed(outcome) => {
                assert_eq!(outcome.status, CheckStatus::Error);
                assert!(outcome.output[0].contains("index out of range"));
                // The ERROR outcome still carries the resolved identifiers.
                assert_eq!(outcome.identifiers, vec!["urn:uuid:data-1"]);
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_routine_panic_becomes_error_outcome() {
        let mut registry = Registry::new();
        let panicking: CheckRoutine = Arc::new(|_, _| panic!("boom"));
        registry.register("panicking_routine", panicking);
        let exec = CheckExecutor::new(Arc::new(registry), catalog());

        let check = r#"<check>
  <id>panics-1.0.0</id>
  <selector><name>count</name><xpath>count(//item)</xpath></selector>
  <code>panicking_routine</code>
</check>"#;
        let disposition = run_files(&exec, check, METADATA, SYSMETA).await.unwrap();
        match disposition {
            RunDisposition::Completed(outcome) => {
                assert_eq!(outcome.status, CheckStatus::Error);
                assert!(outcome.output[0].contains("boom"));
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unregistered_routine_becomes_error_outcome() {
        let exec = CheckExecutor::new(Arc::new(Registry::new()), catalog());
        let disposition = run_files(&exec, COUNT_CHECK, METADATA, SYSMETA).await.unwrap();
        match disposition {
            RunDisposition::Completed(outcome) => {
                assert_eq!(outcome.status, CheckStatus::Error);
                assert!(outcome.output[0].contains("No validation routine"));
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_legacy_scope_classification() {
        let mut registry = Registry::new();
        let legacy: CheckRoutine = Arc::new(|_, scope| {
            scope.set(OUTPUT_VAR, json!("legacy message"));
            scope.set(STATUS_VAR, json!("SUCCESS"));
            Ok(())
        });
        registry.register("legacy_routine", legacy);
        let exec = CheckExecutor::new(Arc::new(registry), catalog());

        let check = r#"<check>
  <id>legacy-1.0.0</id>
  <selector><name>count</name><xpath>count(//item)</xpath></selector>
  <code>legacy_routine</code>
</check>"#;
        let disposition = run_files(&exec, check, METADATA, SYSMETA).await.unwrap();
        match disposition {
            RunDisposition::Completed(outcome) => {
                assert_eq!(outcome.status, CheckStatus::Success);
                assert_eq!(outcome.output, vec!["legacy message"]);
                assert_eq!(outcome.identifiers, vec!["urn:uuid:data-1"]);
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_defaults_status_to_failure() {
        let mut scope = Scope::new();
        scope.set(OUTPUT_VAR, json!(["message one", "message two"]));
        let outcome = classify(&scope, vec![]);
        assert_eq!(outcome.status, CheckStatus::Failure);
        assert_eq!(outcome.output.len(), 2);
    }

    #[test]
    fn test_classify_malformed_structured_result() {
        let mut scope = Scope::new();
        scope.set(RESULT_VAR, json!({"output": ["x"]}));
        let outcome = classify(&scope, vec!["pid".into()]);
        assert_eq!(outcome.status, CheckStatus::Error);
        assert_eq!(outcome.identifiers, vec!["pid"]);
    }
}
