//! Catalog and index resolution for associated data objects.
//!
//! Two network lookups back the execution context: resolving a catalog
//! node's symbolic name (e.g. `urn:node:KNB`) to its service endpoint via a
//! node registry, and querying that endpoint's index for every object that
//! documents the subject identifier ("isDocumentedBy").

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::document::Document;
use crate::error::{EngineError, Result};

/// Default node registry queried for endpoint resolution.
pub const DEFAULT_NODE_REGISTRY: &str = "https://cn.dataone.org/cn/v2/node";

/// External catalog/index boundary. Both calls are fallible network
/// operations; failures propagate as resolution errors.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Resolve a symbolic node name to its base service URL.
    async fn resolve_endpoint(&self, node_id: &str) -> Result<String>;

    /// Identifiers of all objects documenting `subject`, subject excluded.
    async fn query_associated_identifiers(
        &self,
        subject: &str,
        base_url: &str,
    ) -> Result<Vec<String>>;
}

/// Resolve the associated data pids for `subject` via its authoritative
/// catalog node.
pub async fn resolve_associated_pids(
    client: &dyn CatalogClient,
    subject: &str,
    node_id: &str,
) -> Result<Vec<String>> {
    let base_url = client.resolve_endpoint(node_id).await?;
    debug!(node_id, base_url, "resolved catalog endpoint");
    client.query_associated_identifiers(subject, &base_url).await
}

/// HTTP-backed catalog client.
pub struct HttpCatalogClient {
    http: reqwest::Client,
    registry_url: String,
}

impl HttpCatalogClient {
    pub fn new(registry_url: impl Into<String>) -> HttpCatalogClient {
        HttpCatalogClient {
            http: reqwest::Client::new(),
            registry_url: registry_url.into(),
        }
    }
}

impl Default for HttpCatalogClient {
    fn default() -> Self {
        Self::new(DEFAULT_NODE_REGISTRY)
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn resolve_endpoint(&self, node_id: &str) -> Result<String> {
        let response = self.http.get(&self.registry_url).send().await?;
        let body = response.error_for_status()?.text().await?;
        base_url_from_node_list(&body, node_id)
    }

    async fn query_associated_identifiers(
        &self,
        subject: &str,
        base_url: &str,
    ) -> Result<Vec<String>> {
        let url = format!("{}/v2/query/solr/", base_url.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .query(&[
                ("q", format!("isDocumentedBy:\"{subject}\"").as_str()),
                ("fl", "identifier"),
                ("rows", "1000"),
                ("wt", "json"),
            ])
            .send()
            .await?;
        let body = response.error_for_status()?.text().await?;
        identifiers_from_index_response(&body, subject)
    }
}

/// Find a node's base URL in a registry node-list document.
fn base_url_from_node_list(xml: &str, node_id: &str) -> Result<String> {
    let doc = Document::parse_str(xml, "node list").map_err(|e| {
        EngineError::Resolution(format!("unparseable node list: {e}"))
    })?;
    for id in doc.descendants(doc.root()) {
        if doc.node(id).local_name != "node" {
            continue;
        }
        let identifier = doc
            .child_local(id, "identifier")
            .map(|c| doc.string_value(c));
        if identifier.as_deref() == Some(node_id) {
            if let Some(base) = doc.child_local(id, "baseURL") {
                return Ok(doc.string_value(base));
            }
        }
    }
    Err(EngineError::EndpointNotFound {
        node_id: node_id.to_string(),
    })
}

#[derive(Deserialize)]
struct IndexResponse {
    response: IndexDocs,
}

#[derive(Deserialize)]
struct IndexDocs {
    #[serde(default)]
    docs: Vec<IndexDoc>,
}

#[derive(Deserialize)]
struct IndexDoc {
    identifier: String,
}

/// Extract identifiers from an index query response, excluding the subject.
fn identifiers_from_index_response(json: &str, subject: &str) -> Result<Vec<String>> {
    let parsed: IndexResponse = serde_json::from_str(json)
        .map_err(|e| EngineError::Resolution(format!("unparseable index response: {e}")))?;
    Ok(parsed
        .response
        .docs
        .into_iter()
        .map(|d| d.identifier)
        .filter(|id| id != subject)
        .collect())
}
