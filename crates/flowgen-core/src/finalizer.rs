//! Artifact finalizer: cleans the reasoning process's final text and writes
//! it to disk.
//!
//! The artifact is never parsed, validated or re-serialized here. The flow
//! dialect has constructs the read-side codec does not round-trip, so the
//! payload travels as an opaque [`ArtifactText`] and is written exactly as
//! cleaned.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::FinalizeError;

/// First structural marker of every artifact.
pub const ARTIFACT_MARKER: &str = "[workflow]";

/// File stem used when the artifact carries no usable title.
pub const FALLBACK_NAME: &str = "workflow";

/// Extension of written artifacts.
pub const ARTIFACT_EXTENSION: &str = "toml";

const FENCE: &str = "```";

/// Artifact text as produced by the reasoning process. Opaque on purpose:
/// there is no conversion into a parsed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactText(String);

impl ArtifactText {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for ArtifactText {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl From<&str> for ArtifactText {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

impl fmt::Display for ArtifactText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A correction applied to malformed upstream output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatRecovery {
    /// A fenced-block wrapper was removed.
    FenceStripped,
    /// Text before the first marker was dropped.
    PreambleDiscarded { bytes: usize },
    /// No marker found; content kept as-is.
    MarkerMissing,
}

impl fmt::Display for FormatRecovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatRecovery::FenceStripped => write!(f, "stripped code fence"),
            FormatRecovery::PreambleDiscarded { bytes } => {
                write!(f, "discarded {} bytes before {}", bytes, ARTIFACT_MARKER)
            }
            FormatRecovery::MarkerMissing => write!(f, "no {} marker found", ARTIFACT_MARKER),
        }
    }
}

/// Result of a successful finalization.
#[derive(Debug, Clone)]
pub struct FinalizedArtifact {
    pub content: ArtifactText,
    pub path: PathBuf,
    pub recoveries: Vec<FormatRecovery>,
}

/// Clean raw artifact text. Pure; returns the cleaned text and every
/// recovery that was applied.
pub fn clean(raw: &str) -> (String, Vec<FormatRecovery>) {
    let mut recoveries = Vec::new();
    let mut text = raw.trim();

    if let Some(inner) = strip_fence(text) {
        text = inner;
        recoveries.push(FormatRecovery::FenceStripped);
    }

    match find_marker(text) {
        Some(0) => {}
        Some(offset) => {
            tracing::warn!(
                "[Finalizer] discarding {} bytes of preamble before {}",
                offset,
                ARTIFACT_MARKER
            );
            recoveries.push(FormatRecovery::PreambleDiscarded { bytes: offset });
            text = &text[offset..];

            // A fenced block that followed the preamble leaves its closer behind.
            if let Some(inner) = text.strip_suffix(FENCE) {
                text = inner.trim_end();
                if !recoveries.contains(&FormatRecovery::FenceStripped) {
                    recoveries.push(FormatRecovery::FenceStripped);
                }
            }
        }
        None => {
            tracing::warn!(
                "[Finalizer] no {} marker in artifact, keeping it as-is",
                ARTIFACT_MARKER
            );
            recoveries.push(FormatRecovery::MarkerMissing);
        }
    }

    (text.to_string(), recoveries)
}

/// Remove an opening fence line (with optional language tag) and its
/// closing fence. Returns `None` when the text is not fenced.
fn strip_fence(text: &str) -> Option<&str> {
    if !text.starts_with(FENCE) {
        return None;
    }
    let body = match text.find('\n') {
        Some(idx) => &text[idx + 1..],
        None => "",
    };
    let body = body.trim_end();
    let body = body.strip_suffix(FENCE).unwrap_or(body);
    Some(body.trim())
}

/// Offset of the marker at the start of a line.
fn find_marker(text: &str) -> Option<usize> {
    text.match_indices(ARTIFACT_MARKER)
        .map(|(idx, _)| idx)
        .find(|&idx| idx == 0 || text.as_bytes()[idx - 1] == b'\n')
}

/// Human-readable title: the `name` or `title` key of the first section.
/// A line scan, not a parse.
pub fn derive_title(content: &str) -> Option<String> {
    let mut in_first_section = false;
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('[') && line.ends_with(']') {
            if in_first_section {
                break;
            }
            in_first_section = true;
            continue;
        }
        if !in_first_section {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        if matches!(key.trim(), "name" | "title") {
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'').trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Lowercase, collapse non-alphanumeric runs into `-`, trim dashes.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Writes cleaned artifacts under an output directory.
#[derive(Debug, Clone)]
pub struct ArtifactFinalizer {
    output_dir: PathBuf,
    destination: Option<PathBuf>,
}

impl ArtifactFinalizer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            destination: None,
        }
    }

    /// Write to this exact path instead of a derived one.
    pub fn with_destination(mut self, path: impl Into<PathBuf>) -> Self {
        self.destination = Some(path.into());
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Where cleaned `content` would be written.
    pub fn destination_for(&self, content: &str) -> PathBuf {
        if let Some(path) = &self.destination {
            return path.clone();
        }
        let slug = derive_title(content)
            .map(|t| slugify(&t))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| FALLBACK_NAME.to_string());
        self.output_dir
            .join(format!("{}.{}", slug, ARTIFACT_EXTENSION))
    }

    /// Clean `raw` and write it byte-for-byte.
    pub async fn finalize(&self, raw: ArtifactText) -> Result<FinalizedArtifact, FinalizeError> {
        let (content, recoveries) = clean(raw.as_str());
        if content.is_empty() {
            return Err(FinalizeError::Empty);
        }

        let path = self.destination_for(&content);
        let write_err = |e: std::io::Error| FinalizeError::Write {
            path: path.display().to_string(),
            message: e.to_string(),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        tokio::fs::write(&path, content.as_bytes())
            .await
            .map_err(write_err)?;

        tracing::info!(
            "[Finalizer] wrote {} bytes to {}",
            content.len(),
            path.display()
        );

        Ok(FinalizedArtifact {
            content: ArtifactText::from(content),
            path,
            recoveries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLOW: &str = "[workflow]\nname = \"Simple API\"\n\n[step:fetch]\nop = \"py.run\"";

    #[test]
    fn test_clean_is_noop_on_well_formed_text() {
        let (content, recoveries) = clean(FLOW);
        assert_eq!(content, FLOW);
        assert!(recoveries.is_empty());
    }

    #[test]
    fn test_clean_strips_fence_with_language_tag() {
        let raw = format!("```toml\n{}\n```\n", FLOW);
        let (content, recoveries) = clean(&raw);
        assert_eq!(content, FLOW);
        assert_eq!(recoveries, vec![FormatRecovery::FenceStripped]);
    }

    #[test]
    fn test_clean_discards_preamble() {
        let raw = format!("Here is your flow:\n\n{}", FLOW);
        let (content, recoveries) = clean(&raw);
        assert!(content.starts_with(ARTIFACT_MARKER));
        assert_eq!(content, FLOW);
        assert_eq!(
            recoveries,
            vec![FormatRecovery::PreambleDiscarded { bytes: 20 }]
        );
    }

    #[test]
    fn test_clean_preamble_then_fence() {
        let raw = format!("Sure! Here it is:\n```toml\n{}\n```", FLOW);
        let (content, recoveries) = clean(&raw);
        assert_eq!(content, FLOW);
        assert!(recoveries.contains(&FormatRecovery::FenceStripped));
        assert!(matches!(
            recoveries[0],
            FormatRecovery::PreambleDiscarded { .. }
        ));
    }

    #[test]
    fn test_marker_mentioned_inline_is_not_a_cut_point() {
        let raw = format!("The [workflow] section comes first:\n{}", FLOW);
        let (content, _) = clean(&raw);
        assert_eq!(content, FLOW);
    }

    #[test]
    fn test_missing_marker_keeps_text() {
        let (content, recoveries) = clean("  name = \"x\"\n");
        assert_eq!(content, "name = \"x\"");
        assert_eq!(recoveries, vec![FormatRecovery::MarkerMissing]);
    }

    #[test]
    fn test_derive_title_first_section_only() {
        assert_eq!(derive_title(FLOW).as_deref(), Some("Simple API"));
        assert_eq!(
            derive_title("[workflow]\ntitle = 'Daily Report'").as_deref(),
            Some("Daily Report")
        );
        assert_eq!(derive_title("[workflow]\n\n[step:a]\nname = \"a\""), None);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Simple API"), "simple-api");
        assert_eq!(slugify("  --Sync: GitHub -> Slack!! "), "sync-github-slack");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn test_destination_fallback_and_override() {
        let finalizer = ArtifactFinalizer::new("out");
        assert_eq!(
            finalizer.destination_for("[workflow]\nname = \"!!!\""),
            PathBuf::from("out/workflow.toml")
        );
        assert_eq!(
            finalizer.destination_for(FLOW),
            PathBuf::from("out/simple-api.toml")
        );
        let finalizer = finalizer.with_destination("/tmp/custom.flow");
        assert_eq!(finalizer.destination_for(FLOW), PathBuf::from("/tmp/custom.flow"));
    }

    #[tokio::test]
    async fn test_finalize_writes_bytes_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let finalizer = ArtifactFinalizer::new(dir.path().join("nested"));
        // Multi-line collections the codec cannot read must survive untouched.
        let body = "[workflow]\nname = \"Fan Out\"\nsteps = [\n  \"a\",\n  \"b\",\n]\n";
        let raw = format!("```\n{}```", body);

        let artifact = finalizer.finalize(ArtifactText::from(raw)).await.unwrap();
        assert_eq!(artifact.path, dir.path().join("nested").join("fan-out.toml"));
        let written = std::fs::read_to_string(&artifact.path).unwrap();
        assert_eq!(written, body.trim_end());
        assert_eq!(artifact.content.as_str(), written);
    }

    #[tokio::test]
    async fn test_finalize_rejects_empty() {
        let dir = tempfile::tempdir().unwrap();
        let finalizer = ArtifactFinalizer::new(dir.path());
        let err = finalizer.finalize(ArtifactText::from("```\n```")).await.unwrap_err();
        assert!(matches!(err, FinalizeError::Empty));
    }
}
