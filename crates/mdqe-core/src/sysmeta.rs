//! System-metadata parsing for check-execution context.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::{EngineError, Result};

/// The fields the engine reads from a system-metadata record.
///
/// `identifier` and `authoritative_member_node` are required; the rest are
/// read permissively and degrade to `None` when absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemMetadata {
    pub identifier: String,
    pub authoritative_member_node: String,
    pub rights_holder: Option<String>,
    pub date_uploaded: Option<String>,
    pub format_id: Option<String>,
    pub obsoletes: Option<String>,
}

impl SystemMetadata {
    /// Read system metadata from a file.
    pub fn from_path(path: &Path) -> Result<SystemMetadata> {
        let doc = Document::parse_file(path)?;
        Self::from_document(&doc)
    }

    /// Read system metadata from an in-memory string. `path` labels errors.
    pub fn from_str(xml: &str, path: &str) -> Result<SystemMetadata> {
        let doc = Document::parse_str(xml, path)?;
        Self::from_document(&doc)
    }

    fn from_document(doc: &Document) -> Result<SystemMetadata> {
        Ok(SystemMetadata {
            identifier: required(doc, "identifier")?,
            authoritative_member_node: required(doc, "authoritativeMemberNode")?,
            rights_holder: optional(doc, "rightsHolder"),
            date_uploaded: optional(doc, "dateUploaded"),
            format_id: optional(doc, "formatId"),
            obsoletes: optional(doc, "obsoletes"),
        })
    }
}

/// A required element must exist (`MissingElement`) and carry text
/// (`EmptyElement`) — two distinct failure modes.
fn required(doc: &Document, element: &str) -> Result<String> {
    let id = doc
        .descendant_local(doc.root(), element)
        .ok_or_else(|| EngineError::MissingElement {
            element: element.to_string(),
        })?;
    let value = doc.string_value(id);
    if value.is_empty() {
        return Err(EngineError::EmptyElement {
            element: element.to_string(),
        });
    }
    Ok(value)
}

fn optional(doc: &Document, element: &str) -> Option<String> {
    let id = doc.descendant_local(doc.root(), element)?;
    let value = doc.string_value(id);
    (!value.is_empty()).then_some(value)
}
