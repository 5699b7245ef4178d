//! Auth read path: which integrations already have persisted credentials.
//!
//! Credentials live in `[auth:<provider>]` sections. Only key names are
//! reported, never values.

use std::path::Path;

use serde::Serialize;

use super::{FlowDocument, FlowValue};

/// Section kind holding credentials.
pub const AUTH_KIND: &str = "auth";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthEntry {
    pub provider: String,
    /// At least one non-empty text value is present.
    pub configured: bool,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthState {
    pub entries: Vec<AuthEntry>,
}

impl AuthState {
    pub fn from_document(doc: &FlowDocument) -> Self {
        let entries = doc
            .sections_of_kind(AUTH_KIND)
            .map(|section| {
                let configured = section.entries().any(|(_, v)| match v {
                    FlowValue::String(s) | FlowValue::Raw(s) => !s.trim().is_empty(),
                    _ => false,
                });
                AuthEntry {
                    provider: section.identifier().to_string(),
                    configured,
                    fields: section.entries().map(|(k, _)| k.to_string()).collect(),
                }
            })
            .collect();
        Self { entries }
    }

    /// Read a persisted state file. A missing file means nothing is
    /// configured yet.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Self::from_document(&super::parse(&text))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("[Dialect] no auth state at {}", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    pub fn is_configured(&self, provider: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.provider == provider && e.configured)
    }

    pub fn configured_providers(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.configured)
            .map(|e| e.provider.as_str())
            .collect()
    }
}
