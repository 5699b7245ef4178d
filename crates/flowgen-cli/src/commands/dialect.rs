//! `flowgen inspect` and `flowgen auth-status`: read-only views of flow
//! dialect files.

use std::path::Path;

use flowgen_core::dialect::{self, AuthState};
use serde_json::Value;

use super::print_json;

/// Default persisted auth state, relative to the working directory.
pub const DEFAULT_AUTH_FILE: &str = ".flowgen/auth.toml";

pub fn inspect_json(path: &Path) -> Result<Value, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    serde_json::to_value(dialect::parse(&text)).map_err(|e| e.to_string())
}

pub fn inspect(path: &Path) -> Result<(), String> {
    print_json(&inspect_json(path)?);
    Ok(())
}

pub fn auth_status_json(path: &Path) -> Result<Value, String> {
    let state = AuthState::load(path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    serde_json::to_value(&state).map_err(|e| e.to_string())
}

pub fn auth_status(path: &Path) -> Result<(), String> {
    print_json(&auth_status_json(path)?);
    Ok(())
}
