//! Outcome and report wire types.
//!
//! These are the JSON surfaces of the engine: the standalone check result
//! (`{identifiers, output, status}`) and the suite report that wraps many of
//! them together with sysmeta-derived provenance.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::sysmeta::SystemMetadata;

/// Status of a check outcome. Checks may define their own status strings
/// beyond the three well-known ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Success,
    Failure,
    Error,
    Other(String),
}

impl CheckStatus {
    pub fn as_str(&self) -> &str {
        match self {
            CheckStatus::Success => "SUCCESS",
            CheckStatus::Failure => "FAILURE",
            CheckStatus::Error => "ERROR",
            CheckStatus::Other(s) => s,
        }
    }
}

impl From<&str> for CheckStatus {
    fn from(s: &str) -> Self {
        match s {
            "SUCCESS" => CheckStatus::Success,
            "FAILURE" => CheckStatus::Failure,
            "ERROR" => CheckStatus::Error,
            other => CheckStatus::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CheckStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CheckStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s.is_empty() {
            return Err(D::Error::custom("status must not be empty"));
        }
        Ok(CheckStatus::from(s.as_str()))
    }
}

/// Normalized result of one check execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckOutcome {
    /// Identifiers the outcome speaks about, usually the resolved data pids.
    #[serde(default)]
    pub identifiers: Vec<String>,
    /// Human-readable messages produced by the check.
    #[serde(default)]
    pub output: Vec<String>,
    pub status: CheckStatus,
}

impl CheckOutcome {
    /// An ERROR outcome carrying the original failure text.
    pub fn error(identifiers: Vec<String>, message: impl Into<String>) -> CheckOutcome {
        CheckOutcome {
            identifiers,
            output: vec![message.into()],
            status: CheckStatus::Error,
        }
    }
}

/// One entry in a suite report's `results` array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuiteCheckResult {
    pub check_id: String,
    #[serde(default)]
    pub identifiers: Vec<String>,
    #[serde(default)]
    pub output: Vec<String>,
    pub status: CheckStatus,
}

impl SuiteCheckResult {
    pub fn from_outcome(check_id: impl Into<String>, outcome: CheckOutcome) -> SuiteCheckResult {
        SuiteCheckResult {
            check_id: check_id.into(),
            identifiers: outcome.identifiers,
            output: outcome.output,
            status: outcome.status,
        }
    }
}

/// Provenance subset of the target object's system metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SysmetaSummary {
    pub origin_member_node: Option<String>,
    pub rights_holder: Option<String>,
    pub date_uploaded: Option<String>,
    pub format_id: Option<String>,
    pub obsoletes: Option<String>,
}

impl From<&SystemMetadata> for SysmetaSummary {
    fn from(sm: &SystemMetadata) -> Self {
        SysmetaSummary {
            origin_member_node: Some(sm.authoritative_member_node.clone()),
            rights_holder: sm.rights_holder.clone(),
            date_uploaded: sm.date_uploaded.clone(),
            format_id: sm.format_id.clone(),
            obsoletes: sm.obsoletes.clone(),
        }
    }
}

/// Aggregated report for one suite run against one object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuiteReport {
    /// Suite name (the suite definition's file name).
    pub suite: String,
    pub timestamp: String,
    pub object_identifier: String,
    /// SUCCESS when at least one check produced a result — this measures
    /// "did checks run", not "did they pass".
    pub run_status: CheckStatus,
    pub run_comments: Vec<String>,
    pub sysmeta: SysmetaSummary,
    pub results: Vec<SuiteCheckResult>,
}
