//! In-memory fakes for external boundaries (testing only)
//!
//! Provides `MemoryCatalog` and `MemoryObjectStore` that satisfy the trait
//! contracts without any network or filesystem dependencies.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::catalog::CatalogClient;
use crate::error::{EngineError, Result};
use crate::store::ObjectStore;

/// In-memory catalog: fixed endpoint and association tables.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    endpoints: HashMap<String, String>,
    associations: HashMap<String, Vec<String>>,
}

impl MemoryCatalog {
    pub fn new() -> MemoryCatalog {
        MemoryCatalog::default()
    }

    pub fn with_endpoint(mut self, node_id: &str, base_url: &str) -> MemoryCatalog {
        self.endpoints.insert(node_id.to_string(), base_url.to_string());
        self
    }

    pub fn with_association(mut self, subject: &str, pids: &[&str]) -> MemoryCatalog {
        self.associations.insert(
            subject.to_string(),
            pids.iter().map(|p| p.to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl CatalogClient for MemoryCatalog {
    async fn resolve_endpoint(&self, node_id: &str) -> Result<String> {
        self.endpoints
            .get(node_id)
            .cloned()
            .ok_or_else(|| EngineError::EndpointNotFound {
                node_id: node_id.to_string(),
            })
    }

    async fn query_associated_identifiers(
        &self,
        subject: &str,
        _base_url: &str,
    ) -> Result<Vec<String>> {
        Ok(self
            .associations
            .get(subject)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|pid| pid != subject)
            .collect())
    }
}

/// In-memory object store backed by two `HashMap`s.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: HashMap<String, Vec<u8>>,
    sysmeta: HashMap<String, Vec<u8>>,
}

impl MemoryObjectStore {
    pub fn new() -> MemoryObjectStore {
        MemoryObjectStore::default()
    }

    pub fn with_object(mut self, pid: &str, object: &[u8], sysmeta: &[u8]) -> MemoryObjectStore {
        self.objects.insert(pid.to_string(), object.to_vec());
        self.sysmeta.insert(pid.to_string(), sysmeta.to_vec());
        self
    }

    /// An object whose system metadata is missing, for testing the
    /// distinguishable not-found conditions.
    pub fn with_orphan_object(mut self, pid: &str, object: &[u8]) -> MemoryObjectStore {
        self.objects.insert(pid.to_string(), object.to_vec());
        self
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, identifier: &str) -> Result<(Vec<u8>, Vec<u8>)> {
        let object = self
            .objects
            .get(identifier)
            .ok_or_else(|| EngineError::ObjectNotFound {
                pid: identifier.to_string(),
            })?;
        let sysmeta = self
            .sysmeta
            .get(identifier)
            .ok_or_else(|| EngineError::MetadataNotFound {
                pid: identifier.to_string(),
            })?;
        Ok((object.clone(), sysmeta.clone()))
    }
}
