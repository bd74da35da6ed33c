//! mdqe Core Library
//!
//! Selector-driven quality-check execution for scientific metadata
//! documents: a declarative check pulls typed values out of an XML document
//! through a recursive path-query language, a registered routine validates
//! them against the assembled execution context, and a suite fans many such
//! checks out across worker processes and aggregates their outcomes.

pub mod catalog;
pub mod check;
pub mod context;
pub mod document;
pub mod error;
pub mod executor;
pub mod fakes;
pub mod query;
pub mod registry;
pub mod report;
pub mod selector;
pub mod store;
pub mod suite;
pub mod sysmeta;
pub mod telemetry;

pub use catalog::{CatalogClient, HttpCatalogClient, DEFAULT_NODE_REGISTRY};
pub use check::{CheckDefinition, Dialect};
pub use context::{ExecutionContext, Scope};
pub use document::{DocView, Document, MetadataDocument};
pub use error::{EngineError, Result};
pub use executor::{CheckExecutor, ExecutorOptions, RunDisposition};
pub use query::QueryValue;
pub use registry::{CheckRoutine, Registry};
pub use report::{CheckOutcome, CheckStatus, SuiteCheckResult, SuiteReport, SysmetaSummary};
pub use selector::{Selector, SelectorValue};
pub use store::{ObjectStore, StoreConfig};
pub use suite::{SuiteRunner, SuiteRunnerOptions, EXECUTION_ENVIRONMENT};
pub use sysmeta::SystemMetadata;
pub use telemetry::init_tracing;

/// mdqe version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
