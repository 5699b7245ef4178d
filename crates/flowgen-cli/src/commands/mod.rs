//! CLI command implementations.
//!
//! Each submodule backs one or more top-level commands. Commands return
//! `Result<(), String>`; `main` prints the error and exits non-zero.

pub mod bridge;
pub mod dialect;
pub mod generate;
pub mod resume;

use std::path::{Path, PathBuf};

use flowgen_core::FlowgenConfig;

/// Default location of a saved permission stop.
pub const DEFAULT_RESUME_FILE: &str = ".flowgen/resume.json";

/// Resolve the effective configuration.
pub fn load_config(path: Option<&Path>) -> Result<FlowgenConfig, String> {
    FlowgenConfig::load(path).map_err(|e| e.to_string())
}

pub fn resume_file(path: Option<PathBuf>) -> PathBuf {
    path.unwrap_or_else(|| PathBuf::from(DEFAULT_RESUME_FILE))
}

/// Load `.env.local` then `.env` from the working directory. Variables
/// already set in the environment win.
pub fn load_dotenv() {
    for filename in &[".env.local", ".env"] {
        let path = Path::new(filename);
        if !path.exists() {
            continue;
        }
        if let Ok(content) = std::fs::read_to_string(path) {
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    let key = key.trim();
                    let mut value = value.trim().to_string();
                    if value.len() >= 2
                        && ((value.starts_with('"') && value.ends_with('"'))
                            || (value.starts_with('\'') && value.ends_with('\'')))
                    {
                        value = value[1..value.len() - 1].to_string();
                    }
                    if std::env::var(key).is_err() {
                        std::env::set_var(key, &value);
                    }
                }
            }
            tracing::info!("[CLI] Loaded environment from '{}'", filename);
        }
    }
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}
