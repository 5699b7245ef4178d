//! Instruction payload for the reasoning process.
//!
//! Everything the reasoning process knows about the artifact comes from
//! here; the finalizer writes whatever comes back without validation.

use super::Turn;
use crate::bridge::Capability;
use crate::finalizer::ARTIFACT_MARKER;
use crate::interpreter::TASK_LIST_TOOL;

/// Structural and syntactic contract of a generated workflow.
pub const STRUCTURAL_CONTRACT: &str = r#"A workflow is a TOML document in the flow dialect:

- It starts with a `[workflow]` section holding `name`, `description` and an
  optional `trigger` (`manual`, `schedule` or `webhook`).
- Each step is a `[step:<id>]` section with `capability`, `operation` and the
  operation's parameters as `key = value` pairs. Step ids are lowercase
  snake_case and unique.
- Steps run in the order they appear. A step may reference an earlier
  step's output as `"{{ steps.<id>.output }}"`.
- Credentials are never written inline. Reference them as
  `"{{ auth.<provider>.<field> }}"`.
- Values are quoted strings, numbers, booleans, or inline arrays/tables.
- Comments start with `#`."#;

/// Build the single instruction payload for a session.
pub fn build_payload(request: &str, prior_turns: &[Turn], server_name: &str) -> String {
    let mut prompt = String::new();

    prompt.push_str("You generate workflow definitions. Your only deliverable is one workflow document.\n\n");

    prompt.push_str("## Artifact Contract\n\n");
    prompt.push_str(STRUCTURAL_CONTRACT);
    prompt.push_str("\n\n");

    prompt.push_str("## Tools\n\n");
    prompt.push_str("Discover what is available before writing any step. Use only these capability tools:\n");
    for capability in Capability::ALL {
        prompt.push_str(&format!(
            "- `{}`: {}\n",
            capability.tool_name(server_name),
            capability.description()
        ));
    }
    prompt.push_str(&format!(
        "Check `{}` before using an integration and validate every step's parameters with `{}`.\n\n",
        Capability::GetAuthStatus.tool_name(server_name),
        Capability::ValidateParameters.tool_name(server_name),
    ));

    if !prior_turns.is_empty() {
        prompt.push_str("## Conversation So Far\n\n");
        prompt.push_str(&render_transcript(prior_turns));
        prompt.push('\n');
    }

    prompt.push_str("## Request\n\n");
    prompt.push_str(request.trim());
    prompt.push_str("\n\n");

    prompt.push_str("## Planning\n\n");
    prompt.push_str(&format!(
        "Before doing anything else, call `{}` with your task list. Size it to the request:\n",
        TASK_LIST_TOOL
    ));
    prompt.push_str("- simple request (one integration, linear): 4-7 tasks\n");
    prompt.push_str("- moderate request (a few integrations or branches): 8-12 tasks\n");
    prompt.push_str("- complex request (many integrations, error handling, fan-out): 12-20 tasks\n");
    prompt.push_str("Keep exactly one task in progress and never reopen a completed task.\n\n");

    prompt.push_str("## Output Format\n\n");
    prompt.push_str(&format!(
        "Your final message is the workflow document and nothing else. Its very first character must be the `{}` marker. \
         Do not add any introduction, explanation or closing remark, and do not wrap it in a code fence.\n",
        ARTIFACT_MARKER
    ));

    prompt
}

/// Prior turns as a labeled transcript.
pub fn render_transcript(turns: &[Turn]) -> String {
    let mut transcript = String::new();
    for turn in turns {
        transcript.push_str(&format!("**{}:** {}\n", turn.role.label(), turn.content.trim()));
    }
    transcript
}
