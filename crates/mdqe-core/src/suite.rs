//! Suite orchestration: map check ids to files, fan execution out across a
//! pool of worker processes, and aggregate outcomes into one report.
//!
//! Each queued check runs as an independent OS process (`mdqe check …`) so
//! executions share no mutable state; the pool is bounded by a semaphore
//! sized to the available CPU count. A worker that fails outright still
//! yields an ERROR entry tagged with its check id — no single check aborts
//! the suite.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::document::Document;
use crate::error::{EngineError, Result};
use crate::report::{CheckOutcome, CheckStatus, SuiteCheckResult, SuiteReport, SysmetaSummary};
use crate::sysmeta::SystemMetadata;

/// The execution environment this orchestrator runs checks for.
pub const EXECUTION_ENVIRONMENT: &str = "rust";

/// Options governing a suite run.
#[derive(Debug, Clone, Default)]
pub struct SuiteRunnerOptions {
    /// Worker pool size; defaults to the available CPU count.
    pub parallelism: Option<usize>,
    /// Forwarded to workers: skip catalog resolution.
    pub offline: bool,
    /// Forwarded to workers: node registry URL override.
    pub node_registry: Option<String>,
    /// Forwarded to workers: store configuration JSON file.
    pub store_config_path: Option<PathBuf>,
    /// Forwarded to workers: resources directory hint.
    pub resources_dir: Option<PathBuf>,
    /// Worker executable; defaults to the current executable.
    pub worker_exe: Option<PathBuf>,
}

/// Result of scanning a checks directory.
#[derive(Debug, Default)]
pub struct CheckIndex {
    /// Check id → definition file path.
    pub path_by_id: HashMap<String, PathBuf>,
    /// Check id → declared execution environment.
    pub env_by_id: HashMap<String, String>,
    /// Per-file scan problems, surfaced through the report's comments.
    pub comments: Vec<String>,
}

/// Scan every `.xml` file in `dir`, mapping check ids to file paths and
/// declared environments. A file that fails to parse is recorded as a
/// comment rather than aborting the scan.
pub fn scan_checks_dir(dir: &Path) -> Result<CheckIndex> {
    let mut index = CheckIndex::default();

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "xml"))
        .collect();
    paths.sort();

    for path in paths {
        let doc = match Document::parse_file(&path) {
            Ok(doc) => doc,
            Err(e) => {
                index
                    .comments
                    .push(format!("Error parsing {}: {e}", path.display()));
                continue;
            }
        };
        let root = doc.root();
        let id = doc
            .descendant_local(root, "id")
            .map(|n| doc.string_value(n))
            .filter(|s| !s.is_empty());
        let Some(id) = id else {
            warn!(path = %path.display(), "no <id> found in check file");
            continue;
        };
        match doc
            .descendant_local(root, "environment")
            .map(|n| doc.string_value(n))
            .filter(|s| !s.is_empty())
        {
            Some(env) => {
                index.env_by_id.insert(id.clone(), env);
            }
            None => warn!(path = %path.display(), "no <environment> found in check file"),
        }
        index.path_by_id.insert(id, path);
    }

    Ok(index)
}

/// A check queued for worker execution.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedCheck {
    pub check_id: String,
    pub path: PathBuf,
}

/// Decide, for each check the suite references, whether it runs or is
/// recorded as a skip comment.
pub fn plan_checks(check_ids: &[String], index: &CheckIndex) -> (Vec<QueuedCheck>, Vec<String>) {
    let mut queue = Vec::new();
    let mut comments = index.comments.clone();

    for check_id in check_ids {
        let env = index.env_by_id.get(check_id);
        if env.map(String::as_str) != Some(EXECUTION_ENVIRONMENT) {
            comments.push(format!(
                "Check environment ({}) incompatible for check: {check_id}",
                env.map(String::as_str).unwrap_or("unspecified")
            ));
            continue;
        }
        match index.path_by_id.get(check_id) {
            None => comments.push(format!(
                "Check not found in check map for check: {check_id}"
            )),
            Some(path) if !path.is_file() => comments.push(format!(
                "Check not found at path: {}",
                path.display()
            )),
            Some(path) => queue.push(QueuedCheck {
                check_id: check_id.clone(),
                path: path.clone(),
            }),
        }
    }

    (queue, comments)
}

/// The check ids a suite definition references, in document order.
pub fn suite_check_ids(doc: &Document) -> (Vec<String>, Vec<String>) {
    let mut ids = Vec::new();
    let mut comments = Vec::new();
    for node in doc.children_local(doc.root(), "check") {
        match doc
            .child_local(node, "id")
            .map(|n| doc.string_value(n))
            .filter(|s| !s.is_empty())
        {
            Some(id) => ids.push(id),
            None => comments.push("Suite references a check without an <id>".to_string()),
        }
    }
    (ids, comments)
}

#[derive(Debug)]
enum WorkerOutput {
    Outcome(CheckOutcome),
    Skipped(String),
    Failed(String),
}

/// Interpret one worker's stdout: a skip envelope or a check result.
fn parse_worker_stdout(stdout: &str) -> WorkerOutput {
    let value: serde_json::Value = match serde_json::from_str(stdout) {
        Ok(v) => v,
        Err(e) => return WorkerOutput::Failed(format!("unparseable worker output: {e}")),
    };
    if let Some(reason) = value.get("skipped").and_then(|v| v.as_str()) {
        return WorkerOutput::Skipped(reason.to_string());
    }
    match serde_json::from_value::<CheckOutcome>(value) {
        Ok(outcome) => WorkerOutput::Outcome(outcome),
        Err(e) => WorkerOutput::Failed(format!("unparseable worker output: {e}")),
    }
}

/// Orchestrates one suite run.
pub struct SuiteRunner {
    options: SuiteRunnerOptions,
}

impl SuiteRunner {
    pub fn new(options: SuiteRunnerOptions) -> SuiteRunner {
        SuiteRunner { options }
    }

    fn parallelism(&self) -> usize {
        self.options.parallelism.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }

    /// Run every applicable check in the suite and assemble the report.
    pub async fn run(
        &self,
        suite_path: &Path,
        checks_dir: &Path,
        metadata_path: &Path,
        sysmeta_path: &Path,
    ) -> Result<SuiteReport> {
        for path in [suite_path, metadata_path, sysmeta_path] {
            if !path.is_file() {
                return Err(EngineError::FileNotFound(path.to_path_buf()));
            }
        }

        let suite_doc = Document::parse_file(suite_path)?;
        let (check_ids, id_comments) = suite_check_ids(&suite_doc);
        let index = scan_checks_dir(checks_dir)?;
        let (queue, mut comments) = plan_checks(&check_ids, &index);
        comments.extend(id_comments);

        if queue.is_empty() {
            return Err(EngineError::NoRunnableChecks { comments });
        }

        let worker_exe = match &self.options.worker_exe {
            Some(exe) => exe.clone(),
            None => std::env::current_exe()?,
        };
        let parallelism = self.parallelism();
        info!(
            suite = %suite_path.display(),
            checks = queue.len(),
            parallelism,
            "dispatching suite"
        );

        let permits = Arc::new(Semaphore::new(parallelism));
        let mut handles = Vec::with_capacity(queue.len());
        for queued in queue {
            let permits = Arc::clone(&permits);
            let command = self.worker_command(&worker_exe, &queued, metadata_path, sysmeta_path);
            handles.push(tokio::spawn(async move {
                // Acquire never fails: the semaphore is never closed.
                let _permit = permits.acquire_owned().await.expect("worker pool closed");
                let output = run_worker(command).await;
                (queued.check_id, output)
            }));
        }

        // Join barrier: every outcome is collected before the report is
        // assembled; result order carries no meaning.
        let mut results = Vec::new();
        for joined in futures::future::join_all(handles).await {
            let (check_id, output) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    comments.push(format!("Worker task failed: {e}"));
                    continue;
                }
            };
            match output {
                WorkerOutput::Outcome(outcome) => {
                    results.push(SuiteCheckResult::from_outcome(check_id, outcome));
                }
                WorkerOutput::Skipped(reason) => {
                    debug!(check_id = %check_id, reason = %reason, "check skipped");
                    comments.push(format!("Check {check_id} not applicable: {reason}"));
                }
                WorkerOutput::Failed(message) => {
                    results.push(SuiteCheckResult {
                        check_id,
                        identifiers: vec!["N/A".to_string()],
                        output: vec![format!("Unexpected exception: {message}")],
                        status: CheckStatus::Error,
                    });
                }
            }
        }

        let sysmeta = SystemMetadata::from_path(sysmeta_path)?;
        Ok(assemble_report(
            suite_path, &sysmeta, comments, results,
        ))
    }

    fn worker_command(
        &self,
        worker_exe: &Path,
        queued: &QueuedCheck,
        metadata_path: &Path,
        sysmeta_path: &Path,
    ) -> Command {
        let mut command = Command::new(worker_exe);
        command
            .arg("check")
            .arg("--check")
            .arg(&queued.path)
            .arg("--metadata")
            .arg(metadata_path)
            .arg("--sysmeta")
            .arg(sysmeta_path);
        if let Some(store_config) = &self.options.store_config_path {
            command.arg("--store-config").arg(store_config);
        }
        if let Some(registry) = &self.options.node_registry {
            command.arg("--node-registry").arg(registry);
        }
        if let Some(resources) = &self.options.resources_dir {
            command.arg("--resources-dir").arg(resources);
        }
        if self.options.offline {
            command.arg("--offline");
        }
        command.stdout(Stdio::piped()).stderr(Stdio::piped());
        command
    }
}

async fn run_worker(mut command: Command) -> WorkerOutput {
    let output = match command.output().await {
        Ok(output) => output,
        Err(e) => return WorkerOutput::Failed(format!("failed to spawn worker: {e}")),
    };
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr
            .lines()
            .last()
            .map(str::to_string)
            .unwrap_or_else(|| format!("worker exited with {}", output.status));
        return WorkerOutput::Failed(detail);
    }
    parse_worker_stdout(&String::from_utf8_lossy(&output.stdout))
}

/// Build the final report. `run_status` is SUCCESS iff at least one check
/// produced a result, regardless of individual statuses.
fn assemble_report(
    suite_path: &Path,
    sysmeta: &SystemMetadata,
    run_comments: Vec<String>,
    results: Vec<SuiteCheckResult>,
) -> SuiteReport {
    let suite = suite_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| suite_path.to_string_lossy().into_owned());
    let run_status = if results.is_empty() {
        CheckStatus::Failure
    } else {
        CheckStatus::Success
    };
    SuiteReport {
        suite,
        timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        object_identifier: sysmeta.identifier.clone(),
        run_status,
        run_comments,
        sysmeta: SysmetaSummary::from(sysmeta),
        results,
    }
}
