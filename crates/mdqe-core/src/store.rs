//! Object/metadata store boundary.
//!
//! The engine never reads or writes a store itself — check routines do, via
//! the configuration passed through the execution context. The trait below
//! is the contract a concrete store implementation must satisfy; it lives
//! outside this crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Store types this configuration format understands.
const KNOWN_STORE_TYPES: &[&str] = &["HashStore"];

/// Opaque store configuration forwarded to check routines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    pub store_type: String,
    pub store_path: String,
    pub store_depth: u32,
    pub store_width: u32,
    pub store_algorithm: String,
    pub store_metadata_namespace: String,
}

impl StoreConfig {
    /// Validate the configuration names a known store type and a path.
    pub fn validate(&self) -> Result<()> {
        if !KNOWN_STORE_TYPES.contains(&self.store_type.as_str()) {
            return Err(EngineError::StoreConfig(format!(
                "Unknown store_type: {}. Expected one of: {}",
                self.store_type,
                KNOWN_STORE_TYPES.join(", ")
            )));
        }
        if self.store_path.is_empty() {
            return Err(EngineError::StoreConfig(
                "store_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Load and validate a configuration from a JSON file.
    pub fn from_json_file(path: &std::path::Path) -> Result<StoreConfig> {
        if !path.is_file() {
            return Err(EngineError::FileNotFound(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path)?;
        let config: StoreConfig = serde_json::from_str(&raw)
            .map_err(|e| EngineError::StoreConfig(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }
}

/// Read access to a content-addressed object store keyed by identifier.
///
/// `get_object` returns the object bytes and its system-metadata bytes.
/// "Object missing" and "metadata missing" are distinguishable conditions
/// ([`EngineError::ObjectNotFound`] / [`EngineError::MetadataNotFound`]).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, identifier: &str) -> Result<(Vec<u8>, Vec<u8>)>;
}
