//! Configuration loader: resolves process paths and credentials.
//!
//! Config files are YAML. String values may reference environment
//! variables with `${VAR}` or `${VAR:-default}`; a few well-known
//! variables override the file after expansion.
//!
//! ```yaml
//! reasoning:
//!   command: claude
//!   model: claude-sonnet-4-5
//!   permission_mode: bypassPermissions
//!   env:
//!     ANTHROPIC_API_KEY: ${ANTHROPIC_API_KEY}
//! bridge:
//!   server_name: flow
//!   command: flow-mcp
//!   args: ["serve", "--stdio"]
//! output_dir: ./flows
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "flowgen.yaml";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowgenConfig {
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    /// Directory finalized artifacts are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Record a JSONL session trace under `<cwd>/.flowgen/traces`.
    #[serde(default)]
    pub trace: bool,
}

impl Default for FlowgenConfig {
    fn default() -> Self {
        Self {
            reasoning: ReasoningConfig::default(),
            bridge: BridgeConfig::default(),
            output_dir: default_output_dir(),
            trace: false,
        }
    }
}

/// How to start the external reasoning process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    /// Command to run (usually "claude")
    #[serde(default = "default_reasoning_command")]
    pub command: String,
    /// Working directory
    #[serde(default = "default_cwd")]
    pub cwd: String,
    /// Model id passed with `--model`; the CLI default is used when empty.
    #[serde(default)]
    pub model: Option<String>,
    /// Permission mode: "bypassPermissions" | "acceptEdits" | "default"
    #[serde(default = "default_permission_mode")]
    pub permission_mode: String,
    /// Extra environment for the process (credentials live here).
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            command: default_reasoning_command(),
            cwd: default_cwd(),
            model: None,
            permission_mode: default_permission_mode(),
            env: HashMap::new(),
        }
    }
}

/// How to start the capability bridge (one process per call).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Server name the reasoning process sees tools under (`mcp__<name>__…`).
    #[serde(default = "default_server_name")]
    pub server_name: String,
    #[serde(default = "default_bridge_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory for bridge processes; inherits when unset.
    #[serde(default)]
    pub cwd: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            server_name: default_server_name(),
            command: default_bridge_command(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("flows")
}

fn default_reasoning_command() -> String {
    "claude".to_string()
}

fn default_cwd() -> String {
    ".".to_string()
}

fn default_permission_mode() -> String {
    "bypassPermissions".to_string()
}

fn default_server_name() -> String {
    "flow".to_string()
}

fn default_bridge_command() -> String {
    "flow-mcp".to_string()
}

impl FlowgenConfig {
    /// Parse a config from a YAML string, then expand env references.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        let mut config: FlowgenConfig = serde_yaml::from_str(yaml)?;
        config.expand_env();
        Ok(config)
    }

    /// Load a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_yaml(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Resolve the effective configuration.
    ///
    /// An explicit path must exist. Otherwise `./flowgen.yaml`, then
    /// `<config dir>/flowgen/config.yaml`, then built-in defaults.
    /// Environment overrides apply last in every case.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::discover() {
                Some(path) => {
                    tracing::info!("[Config] Using {}", path.display());
                    Self::from_file(&path)?
                }
                None => Self::default(),
            },
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.is_file() {
            return Some(local);
        }
        dirs::config_dir()
            .map(|dir| dir.join("flowgen").join("config.yaml"))
            .filter(|p| p.is_file())
    }

    fn expand_env(&mut self) {
        let r = &mut self.reasoning;
        r.command = resolve_env_vars(&r.command);
        r.cwd = resolve_env_vars(&r.cwd);
        r.model = r.model.as_deref().map(resolve_env_vars);
        for value in r.env.values_mut() {
            *value = resolve_env_vars(value);
        }

        let b = &mut self.bridge;
        b.command = resolve_env_vars(&b.command);
        b.cwd = b.cwd.as_deref().map(resolve_env_vars);
        for arg in b.args.iter_mut() {
            *arg = resolve_env_vars(arg);
        }
        for value in b.env.values_mut() {
            *value = resolve_env_vars(value);
        }

        let out = self.output_dir.to_string_lossy().to_string();
        self.output_dir = PathBuf::from(resolve_env_vars(&out));
    }

    fn apply_env_overrides(&mut self) {
        if let Some(cmd) = env_non_empty("FLOWGEN_CLAUDE_BIN") {
            self.reasoning.command = cmd;
        }
        if let Some(cmd) = env_non_empty("FLOWGEN_BRIDGE_BIN") {
            self.bridge.command = cmd;
        }
        if let Some(model) = env_non_empty("FLOWGEN_MODEL") {
            self.reasoning.model = Some(model);
        }
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Resolve environment variable references in a string.
/// Supports `${ENV_VAR}` and `${ENV_VAR:-default}` syntax; unknown
/// variables without a default are left untouched.
pub fn resolve_env_vars(input: &str) -> String {
    let re = match regex::Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return input.to_string(),
    };
    re.replace_all(input, |caps: &regex::Captures| {
        let var_expr = &caps[1];
        if let Some(idx) = var_expr.find(":-") {
            let var_name = &var_expr[..idx];
            let default_val = &var_expr[idx + 2..];
            std::env::var(var_name).unwrap_or_else(|_| default_val.to_string())
        } else {
            std::env::var(var_expr).unwrap_or_else(|_| format!("${{{}}}", var_expr))
        }
    })
    .to_string()
}
