//! `flowgen generate`: run one generation session end to end.

use std::path::{Path, PathBuf};

use flowgen_core::session::{SessionConfig, Turn};
use flowgen_core::trace::TraceWriter;
use flowgen_core::{ArtifactFinalizer, FlowgenConfig, SessionDriver, SessionOutcome};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

/// Options shared by `generate` and `resume`.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Write the artifact here instead of `<output_dir>/<slug>.toml`.
    pub output: Option<PathBuf>,
    /// Where a permission stop is saved.
    pub resume_file: PathBuf,
    /// Print `session/update` notifications as JSON lines.
    pub events: bool,
}

pub async fn run(config: &FlowgenConfig, request: &str, options: &RunOptions) -> Result<(), String> {
    if request.trim().is_empty() {
        return Err("Request must not be empty".to_string());
    }
    run_session(config, request.to_string(), Vec::new(), options).await
}

/// Drive one session and report how it ended.
pub async fn run_session(
    config: &FlowgenConfig,
    request: String,
    prior_turns: Vec<Turn>,
    options: &RunOptions,
) -> Result<(), String> {
    let mut finalizer = ArtifactFinalizer::new(&config.output_dir);
    if let Some(path) = &options.output {
        finalizer = finalizer.with_destination(path);
    }

    let (tx, _rx) = broadcast::channel::<Value>(256);
    if options.events {
        spawn_event_printer(tx.subscribe());
    }

    let mut driver = SessionDriver::new(
        request,
        prior_turns,
        SessionConfig::from_config(config),
        finalizer,
    )
    .with_notifications(tx);
    let trace = if config.trace {
        let cwd = std::env::current_dir().map_err(|e| e.to_string())?;
        let writer = TraceWriter::new(cwd);
        driver = driver.with_trace(writer.clone());
        Some(writer)
    } else {
        None
    };

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    println!("🚀 Starting session {}", driver.session().id);
    let stream = driver
        .start(&config.reasoning, &config.bridge)
        .await
        .map_err(|e| e.to_string())?;

    let outcome = driver.run(stream, cancel).await;
    if let Some(writer) = &trace {
        if let Some(path) = writer.session_file(&driver.session().id).await {
            println!("🧾 Trace: {}", path.display());
        }
    }
    let outcome = outcome.map_err(|e| e.to_string())?;
    report_tasks(&driver);

    match outcome {
        SessionOutcome::Completed(artifact) => {
            println!(
                "\n✅ Wrote {} ({} bytes)",
                artifact.path.display(),
                artifact.content.as_bytes().len()
            );
            Ok(())
        }
        SessionOutcome::AwaitingPermission(state) => {
            state
                .save(&options.resume_file)
                .await
                .map_err(|e| e.to_string())?;
            let request = &state.pending_permission;
            println!("\n⏸  Permission needed: {}", request.question);
            if !request.required_fields.is_empty() {
                println!("   Required fields: {}", request.required_fields.join(", "));
            }
            println!(
                "   Saved to {}. Continue with `flowgen resume --approve{}` or `flowgen resume --reject`.",
                options.resume_file.display(),
                field_hint(&request.required_fields)
            );
            Ok(())
        }
        SessionOutcome::Cancelled => Err("Session cancelled".to_string()),
    }
}

fn field_hint(fields: &[String]) -> String {
    fields
        .iter()
        .map(|f| format!(" --field {}=<value>", f))
        .collect()
}

fn report_tasks(driver: &SessionDriver) {
    let tracker = driver.tracker();
    let bridge_calls = tracker.bridge_calls().count();
    if bridge_calls > 0 {
        println!("\n🔌 Bridge calls: {}", bridge_calls);
    }
    let tasks = tracker.task_list();
    if tasks.is_empty() {
        return;
    }
    println!(
        "\n📋 Tasks: {}/{} completed",
        tasks.completed_count(),
        tasks.items().len()
    );
}

fn spawn_event_printer(mut rx: broadcast::Receiver<Value>) {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(notification) => println!("{}", notification),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("[CLI] dropped {} session updates", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Remove a resume file once its session has been continued.
pub async fn clear_resume_file(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::debug!("[CLI] could not remove {}: {}", path.display(), e);
    }
}
