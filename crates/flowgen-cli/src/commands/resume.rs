//! `flowgen resume`: answer a saved permission request and continue in a
//! fresh session.

use std::collections::BTreeMap;
use std::path::Path;

use dialoguer::{Confirm, Input};
use flowgen_core::interpreter::PermissionRequest;
use flowgen_core::session::{PermissionDecision, ResumeState};
use flowgen_core::FlowgenConfig;

use super::generate::{clear_resume_file, run_session, RunOptions};

/// How the decision was given on the command line.
#[derive(Debug, Clone, Default)]
pub struct DecisionArgs {
    pub approve: bool,
    pub reject: bool,
    pub fields: Vec<String>,
    pub note: Option<String>,
}

/// Parse a `name=value` field argument.
pub fn parse_field(arg: &str) -> Result<(String, String), String> {
    let (name, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("Invalid field '{}', expected name=value", arg))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("Invalid field '{}', name is empty", arg));
    }
    Ok((name.to_string(), value.to_string()))
}

/// Decision from flags; `None` when neither `--approve` nor `--reject`
/// was given.
pub fn decision_from_args(args: &DecisionArgs) -> Result<Option<PermissionDecision>, String> {
    if args.approve && args.reject {
        return Err("--approve and --reject are mutually exclusive".to_string());
    }
    if !args.approve && !args.reject {
        return Ok(None);
    }

    let fields = args
        .fields
        .iter()
        .map(|f| parse_field(f))
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    Ok(Some(PermissionDecision {
        approved: args.approve,
        fields,
        note: args.note.clone(),
    }))
}

fn prompt_decision(request: &PermissionRequest) -> Result<PermissionDecision, String> {
    let approved = Confirm::new()
        .with_prompt(&request.question)
        .default(true)
        .interact()
        .map_err(|e| e.to_string())?;

    let mut decision = if approved {
        PermissionDecision::approve()
    } else {
        PermissionDecision::reject()
    };
    if approved {
        for field in &request.required_fields {
            let value: String = Input::new()
                .with_prompt(field)
                .interact_text()
                .map_err(|e| e.to_string())?;
            decision = decision.with_field(field, value);
        }
    }
    Ok(decision)
}

pub async fn run(
    config: &FlowgenConfig,
    args: &DecisionArgs,
    options: &RunOptions,
) -> Result<(), String> {
    let state = load_state(&options.resume_file).await?;
    println!("📄 Pending: {}", state.pending_permission.question);

    let decision = match decision_from_args(args)? {
        Some(decision) => decision,
        None => prompt_decision(&state.pending_permission)?,
    };

    let saved = state.clone();
    let (request, prior_turns) = state
        .into_next_turn(&decision)
        .map_err(|e| e.to_string())?;

    // A new permission stop rewrites the file; a failed run restores it.
    clear_resume_file(&options.resume_file).await;
    let result = run_session(config, request, prior_turns, options).await;
    if result.is_err() {
        if let Err(e) = saved.save(&options.resume_file).await {
            tracing::warn!("[CLI] could not restore {}: {}", options.resume_file.display(), e);
        }
    }
    result
}

pub async fn load_state(path: &Path) -> Result<ResumeState, String> {
    if !path.exists() {
        return Err(format!(
            "No saved session at '{}'. Run `flowgen generate` first.",
            path.display()
        ));
    }
    ResumeState::load(path).await.map_err(|e| e.to_string())
}
