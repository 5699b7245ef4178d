//! Flow dialect codec: read-only parser for the section-based config
//! dialect used by persisted flow state.
//!
//! ```text
//! # comment
//! ; also a comment
//! [workflow]
//! name = "Daily report"
//! enabled = true
//! retries = 3
//!
//! [auth:github]
//! token = "ghp_…"
//! ```
//!
//! Parsing is total: lines that match nothing are skipped. Section names
//! may carry one `kind:identifier` separator. Multi-line arrays and tables
//! are not understood; their first line passes through as raw text.
//!
//! There is deliberately no serializer. Generated artifacts never go
//! through this module (see [`crate::finalizer::ArtifactText`]).

pub mod auth;

pub use auth::{AuthEntry, AuthState};

use std::sync::OnceLock;

use regex::Regex;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Separator between the kind and identifier of a namespaced section.
pub const KIND_SEPARATOR: char = ':';

/// A typed value after coercion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FlowValue {
    /// Quoted in the source; quotes stripped.
    String(String),
    Number(f64),
    Boolean(bool),
    /// Anything else, trimmed, verbatim.
    Raw(String),
}

impl FlowValue {
    /// Text of string and raw values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FlowValue::String(s) | FlowValue::Raw(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FlowValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FlowValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// One `[section]` with its entries in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    name: String,
    entries: Vec<(String, FlowValue)>,
}

impl Section {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: Vec::new(),
        }
    }

    /// Full header text, e.g. `auth:github`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `auth` for `[auth:github]`; `None` for plain sections.
    pub fn kind(&self) -> Option<&str> {
        self.name.split_once(KIND_SEPARATOR).map(|(kind, _)| kind)
    }

    /// `github` for `[auth:github]`; the whole name for plain sections.
    pub fn identifier(&self) -> &str {
        self.name
            .split_once(KIND_SEPARATOR)
            .map(|(_, id)| id)
            .unwrap_or(&self.name)
    }

    pub fn get(&self, key: &str) -> Option<&FlowValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &FlowValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn set(&mut self, key: String, value: FlowValue) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }
}

impl Serialize for Section {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Parsed document: sections in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowDocument {
    sections: Vec<Section>,
}

impl FlowDocument {
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// All `[kind:…]` sections of one kind, in order.
    pub fn sections_of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Section> + 'a {
        self.sections.iter().filter(move |s| s.kind() == Some(kind))
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&FlowValue> {
        self.section(section).and_then(|s| s.get(key))
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    fn section_mut(&mut self, name: &str) -> &mut Section {
        let idx = match self.sections.iter().position(|s| s.name == name) {
            Some(idx) => idx,
            None => {
                self.sections.push(Section::new(name));
                self.sections.len() - 1
            }
        };
        &mut self.sections[idx]
    }
}

impl Serialize for FlowDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.sections.len()))?;
        for section in &self.sections {
            map.serialize_entry(&section.name, section)?;
        }
        map.end()
    }
}

fn section_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[([^\]]+)\]$").expect("valid section regex"))
}

fn assignment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([^=]+?)\s*=\s*(.+)$").expect("valid assignment regex"))
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").expect("valid number regex"))
}

/// Parse dialect text. Never fails.
pub fn parse(text: &str) -> FlowDocument {
    let mut doc = FlowDocument::default();
    let mut current: Option<String> = None;

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(caps) = section_re().captures(line) {
            let name = caps[1].trim().to_string();
            doc.section_mut(&name);
            current = Some(name);
            continue;
        }

        if let Some(caps) = assignment_re().captures(line) {
            let Some(ref section) = current else {
                tracing::debug!("[Dialect] line {}: key outside any section, skipped", lineno + 1);
                continue;
            };
            let key = caps[1].trim().to_string();
            let value = coerce(&caps[2]);
            doc.section_mut(section).set(key, value);
            continue;
        }

        tracing::debug!("[Dialect] line {}: unrecognized, skipped", lineno + 1);
    }

    doc
}

/// Quoted string, then boolean, then number, then raw.
fn coerce(value: &str) -> FlowValue {
    let v = value.trim();

    if v.len() >= 2
        && ((v.starts_with('"') && v.ends_with('"')) || (v.starts_with('\'') && v.ends_with('\'')))
    {
        return FlowValue::String(v[1..v.len() - 1].to_string());
    }

    match v {
        "true" => return FlowValue::Boolean(true),
        "false" => return FlowValue::Boolean(false),
        _ => {}
    }

    if number_re().is_match(v) {
        if let Ok(n) = v.parse::<f64>() {
            return FlowValue::Number(n);
        }
    }

    FlowValue::Raw(v.to_string())
}
