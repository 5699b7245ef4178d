//! End-to-end session runs against hand-fed event streams.

use flowgen_core::finalizer::{FormatRecovery, ARTIFACT_MARKER};
use flowgen_core::interpreter::{PermissionRequest, StreamEvent, TaskItem, TaskStatus};
use flowgen_core::session::{
    EventStream, PermissionDecision, SessionConfig, SessionDriver, SessionOutcome, SessionState,
};
use flowgen_core::trace::TraceWriter;
use flowgen_core::{ArtifactFinalizer, SessionError};
use serde_json::json;
use tokio_util::sync::CancellationToken;

const FLOW: &str = "[workflow]\nname = \"Simple API\"\ntrigger = \"webhook\"\n\n[step:respond]\ncapability = \"py\"\noperation = \"run\"";

fn driver(output_dir: &std::path::Path, request: &str) -> SessionDriver {
    SessionDriver::new(
        request,
        vec![],
        SessionConfig::default(),
        ArtifactFinalizer::new(output_dir),
    )
}

async fn feed(events: Vec<StreamEvent>) -> EventStream {
    let (tx, stream) = EventStream::channel(events.len().max(1));
    for event in events {
        tx.send(event).await.unwrap();
    }
    stream
}

#[tokio::test]
async fn fenced_final_result_is_written_from_marker() {
    let dir = tempfile::tempdir().unwrap();
    let mut driver = driver(dir.path(), "simple API");
    driver.begin_streaming().await.unwrap();

    let stream = feed(vec![
        StreamEvent::ToolInvocation {
            id: "toolu_1".into(),
            name: "mcp__flow__list_capabilities".into(),
            input: json!({}),
        },
        StreamEvent::ToolResult {
            id: "toolu_1".into(),
            output: json!(["py", "aci"]),
            is_error: false,
        },
        StreamEvent::FinalResult {
            text: format!("```toml\n{}\n```", FLOW),
        },
    ])
    .await;

    let outcome = driver.run(stream, CancellationToken::new()).await.unwrap();
    let SessionOutcome::Completed(artifact) = outcome else {
        panic!("expected completion");
    };

    assert!(artifact.content.as_str().starts_with(ARTIFACT_MARKER));
    assert!(!artifact.content.as_str().contains("```"));
    assert_eq!(std::fs::read_to_string(&artifact.path).unwrap(), FLOW);
    assert_eq!(driver.state(), SessionState::Completed);

    let call = driver.tracker().tool_call("toolu_1").unwrap();
    assert_eq!(call.result.as_ref().unwrap().output, json!(["py", "aci"]));
}

#[tokio::test]
async fn preamble_is_discarded_and_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let mut driver = driver(dir.path(), "simple API");
    driver.begin_streaming().await.unwrap();

    let stream = feed(vec![StreamEvent::FinalResult {
        text: format!("Here is your flow:\n\n{}", FLOW),
    }])
    .await;

    let SessionOutcome::Completed(artifact) =
        driver.run(stream, CancellationToken::new()).await.unwrap()
    else {
        panic!("expected completion");
    };
    assert!(artifact.content.as_str().starts_with(ARTIFACT_MARKER));
    assert!(artifact
        .recoveries
        .iter()
        .any(|r| matches!(r, FormatRecovery::PreambleDiscarded { .. })));
}

#[tokio::test]
async fn error_before_final_result_never_finalizes() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("flows");
    let mut driver = driver(&out, "simple API");
    driver.begin_streaming().await.unwrap();

    let stream = feed(vec![
        StreamEvent::AssistantText { text: "working".into() },
        StreamEvent::Error { message: "overloaded".into() },
        StreamEvent::FinalResult { text: FLOW.into() },
    ])
    .await;

    let err = driver.run(stream, CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, SessionError::Reasoning(_)));
    assert_eq!(driver.state(), SessionState::Failed);
    assert!(driver.artifact().is_none());
    assert!(!out.exists());
}

#[tokio::test]
async fn stream_closing_early_is_a_transport_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut driver = driver(dir.path(), "simple API");
    driver.begin_streaming().await.unwrap();

    let stream = feed(vec![StreamEvent::AssistantText { text: "partial".into() }]).await;
    let err = driver.run(stream, CancellationToken::new()).await.unwrap_err();
    assert!(err.is_transport());
    assert_eq!(driver.state(), SessionState::Failed);
}

#[tokio::test]
async fn task_list_snapshots_replace() {
    let dir = tempfile::tempdir().unwrap();
    let mut driver = driver(dir.path(), "simple API");
    driver.begin_streaming().await.unwrap();

    let second = vec![
        TaskItem::new("A", TaskStatus::Completed),
        TaskItem::new("B", TaskStatus::InProgress),
    ];
    let stream = feed(vec![
        StreamEvent::TaskListUpdate {
            tasks: vec![TaskItem::new("A", TaskStatus::InProgress)],
        },
        StreamEvent::TaskListUpdate { tasks: second.clone() },
        StreamEvent::FinalResult { text: FLOW.into() },
    ])
    .await;

    driver.run(stream, CancellationToken::new()).await.unwrap();
    assert_eq!(driver.tracker().task_list().items(), second.as_slice());
    assert!(driver.tracker().task_violations().is_empty());
}

#[tokio::test]
async fn cancellation_discards_pending_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let mut driver = driver(dir.path(), "simple API");
    driver.begin_streaming().await.unwrap();

    let (tx, stream) = EventStream::channel(4);
    tx.send(StreamEvent::AssistantText { text: "thinking".into() })
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = driver.run(stream, cancel).await.unwrap();

    assert!(matches!(outcome, SessionOutcome::Cancelled));
    assert_eq!(driver.state(), SessionState::Failed);
    assert_eq!(driver.failure(), Some("cancelled"));

    // The source is closed; nothing else reaches the finalizer.
    assert!(tx.send(StreamEvent::FinalResult { text: FLOW.into() }).await.is_err());
    assert!(driver.artifact().is_none());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn permission_stop_resumes_as_next_user_turn() {
    let dir = tempfile::tempdir().unwrap();
    let mut driver = driver(dir.path(), "post GitHub issues to Slack");
    driver.begin_streaming().await.unwrap();

    let stream = feed(vec![
        StreamEvent::AssistantText { text: "Slack needs a token".into() },
        StreamEvent::PermissionRequest(PermissionRequest {
            id: "req_1".into(),
            tool_name: Some("mcp__flow__get_auth_status".into()),
            question: "Connect Slack?".into(),
            required_fields: vec!["bot_token".into()],
        }),
    ])
    .await;

    let SessionOutcome::AwaitingPermission(state) =
        driver.run(stream, CancellationToken::new()).await.unwrap()
    else {
        panic!("expected a permission stop");
    };
    assert_eq!(state.pending_permission.question, "Connect Slack?");
    assert!(driver.artifact().is_none());

    let path = dir.path().join("resume.json");
    state.save(&path).await.unwrap();
    let state = flowgen_core::session::ResumeState::load(&path).await.unwrap();

    let decision = PermissionDecision::approve().with_field("bot_token", "xoxb-123");
    let (request, prior_turns) = state.into_next_turn(&decision).unwrap();

    let mut resumed = SessionDriver::new(
        request,
        prior_turns,
        SessionConfig::default(),
        ArtifactFinalizer::new(dir.path()),
    );
    let payload = resumed.begin_streaming().await.unwrap();
    assert!(payload.contains("**User:** post GitHub issues to Slack"));
    assert!(payload.contains("**Assistant:** Slack needs a token"));
    assert!(payload.contains("Approved: \"Connect Slack?\""));

    // A result for a call made before the stop arrives unannounced.
    let stream = feed(vec![
        StreamEvent::ToolResult {
            id: "toolu_before_stop".into(),
            output: json!({"slack": true}),
            is_error: false,
        },
        StreamEvent::FinalResult { text: FLOW.into() },
    ])
    .await;
    let outcome = resumed.run(stream, CancellationToken::new()).await.unwrap();
    assert!(matches!(outcome, SessionOutcome::Completed(_)));
    assert_eq!(resumed.tracker().orphaned_results().len(), 1);
}

#[tokio::test]
async fn trace_records_session_events() {
    let dir = tempfile::tempdir().unwrap();
    let writer = TraceWriter::new(dir.path());
    let mut driver = driver(&dir.path().join("flows"), "simple API").with_trace(writer.clone());
    driver.begin_streaming().await.unwrap();

    let stream = feed(vec![
        StreamEvent::AssistantText { text: "planning".into() },
        StreamEvent::FinalResult { text: FLOW.into() },
    ])
    .await;
    driver.run(stream, CancellationToken::new()).await.unwrap();

    let session_id = driver.session().id.clone();
    let file = writer.session_file(&session_id).await.unwrap();
    assert_eq!(file.file_name().unwrap().to_string_lossy(), format!("{}.jsonl", session_id));
    let kinds: Vec<String> = std::fs::read_to_string(file)
        .unwrap()
        .lines()
        .map(|l| {
            let v: serde_json::Value = serde_json::from_str(l).unwrap();
            v["eventType"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(
        kinds,
        vec!["session_start", "user_message", "agent_message", "final_result", "session_end"]
    );
}
