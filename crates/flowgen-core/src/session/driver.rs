//! Session driver: owns one session and consumes its event stream.

use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::process::{EventStream, ReasoningProcess};
use super::prompt::build_payload;
use super::resume::ResumeState;
use super::{Session, SessionConfig, SessionState, Turn};
use crate::config::{BridgeConfig, ReasoningConfig};
use crate::error::SessionError;
use crate::finalizer::{ArtifactFinalizer, ArtifactText, FinalizedArtifact};
use crate::interpreter::{
    Disposition, EventTracker, PermissionRequest, StreamEvent, TASK_LIST_TOOL,
};
use crate::trace::{Contributor, TraceConversation, TraceEventType, TraceRecord, TraceWriter};

/// Result of consuming a single event.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    Continue,
    /// The session waits for a caller decision.
    AwaitingInput(PermissionRequest),
    Completed(FinalizedArtifact),
}

/// How a full run ended.
#[derive(Debug, Clone)]
pub enum SessionOutcome {
    Completed(FinalizedArtifact),
    /// Stopped for a permission decision; continue with a new session.
    AwaitingPermission(ResumeState),
    Cancelled,
}

pub struct SessionDriver {
    session: Session,
    tracker: EventTracker,
    finalizer: ArtifactFinalizer,
    notification_tx: Option<broadcast::Sender<Value>>,
    trace: Option<TraceWriter>,
    contributor: Contributor,
    artifact: Option<FinalizedArtifact>,
    failure: Option<String>,
}

impl SessionDriver {
    pub fn new(
        request: impl Into<String>,
        prior_turns: Vec<Turn>,
        config: SessionConfig,
        finalizer: ArtifactFinalizer,
    ) -> Self {
        let contributor = Contributor::new("claude", config.model.clone());
        Self {
            session: Session::new(request, prior_turns, config),
            tracker: EventTracker::new(),
            finalizer,
            notification_tx: None,
            trace: None,
            contributor,
            artifact: None,
            failure: None,
        }
    }

    /// Broadcast `session/update` notifications on `tx`.
    pub fn with_notifications(mut self, tx: broadcast::Sender<Value>) -> Self {
        self.notification_tx = Some(tx);
        self
    }

    pub fn with_trace(mut self, writer: TraceWriter) -> Self {
        self.trace = Some(writer);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    pub fn tracker(&self) -> &EventTracker {
        &self.tracker
    }

    pub fn artifact(&self) -> Option<&FinalizedArtifact> {
        self.artifact.as_ref()
    }

    /// Why the session failed, once it has.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// The instruction payload for this session.
    pub fn payload(&self) -> String {
        build_payload(
            &self.session.request,
            &self.session.prior_turns,
            &self.session.config.server_name,
        )
    }

    /// Move to Streaming without launching anything. Returns the payload
    /// the event source must be fed with.
    pub async fn begin_streaming(&mut self) -> Result<String, SessionError> {
        if self.session.state != SessionState::NotStarted {
            return Err(SessionError::InvalidState(format!(
                "cannot start a session that is {}",
                self.session.state
            )));
        }
        let payload = self.payload();

        self.record(
            TraceRecord::new(&self.session.id, TraceEventType::SessionStart, self.contributor.clone())
                .with_metadata("request", Value::String(self.session.request.clone())),
        )
        .await;
        self.record(
            TraceRecord::new(&self.session.id, TraceEventType::UserMessage, self.contributor.clone())
                .with_conversation(TraceConversation::preview("user", &payload)),
        )
        .await;

        self.transition(SessionState::Streaming);
        Ok(payload)
    }

    /// Launch the reasoning process and start streaming.
    pub async fn start(
        &mut self,
        reasoning: &ReasoningConfig,
        bridge: &BridgeConfig,
    ) -> Result<EventStream, SessionError> {
        let payload = self.begin_streaming().await?;
        match ReasoningProcess::spawn(reasoning, bridge, &self.session.config, &payload).await {
            Ok(stream) => Ok(stream),
            Err(e) => Err(self.fail(e).await),
        }
    }

    /// Apply one event to the session.
    pub async fn consume_event(&mut self, event: StreamEvent) -> Result<StepOutcome, SessionError> {
        if self.session.state != SessionState::Streaming {
            let err = SessionError::InvalidState(format!(
                "{} event received while {}",
                event.kind(),
                self.session.state
            ));
            tracing::warn!("[Driver] {}", err);
            return Err(err);
        }

        tracing::debug!("[Driver] {} event for session {}", event.kind(), self.session.id);
        self.record(TraceRecord::from_event(
            &self.session.id,
            self.contributor.clone(),
            &event,
        ))
        .await;
        self.notify_event(&event);

        let awaiting = self.tracker.pending_permission().is_some();
        match self.tracker.apply(event) {
            Disposition::Continue => Ok(StepOutcome::Continue),

            Disposition::AwaitingInput(request) => {
                tracing::info!(
                    "[Driver] session {} awaiting permission: {}",
                    self.session.id,
                    request.question
                );
                Ok(StepOutcome::AwaitingInput(request))
            }

            Disposition::Final(_) if awaiting => Err(self
                .fail(SessionError::InvalidState(
                    "final result received while a permission request is pending".into(),
                ))
                .await),

            Disposition::Final(text) => self.finalize(text).await,

            Disposition::Failed(message) => Err(self.fail(SessionError::Reasoning(message)).await),
        }
    }

    async fn finalize(&mut self, text: String) -> Result<StepOutcome, SessionError> {
        self.transition(SessionState::Finalizing);
        match self.finalizer.finalize(ArtifactText::from(text)).await {
            Ok(artifact) => {
                for recovery in &artifact.recoveries {
                    tracing::info!("[Driver] format recovery: {}", recovery);
                }
                self.emit(json!({
                    "sessionUpdate": "artifact_written",
                    "path": artifact.path.display().to_string(),
                    "bytes": artifact.content.as_bytes().len(),
                }));
                self.record(
                    TraceRecord::new(&self.session.id, TraceEventType::SessionEnd, self.contributor.clone())
                        .with_metadata("artifact", Value::String(artifact.path.display().to_string())),
                )
                .await;
                self.artifact = Some(artifact.clone());
                self.transition(SessionState::Completed);
                Ok(StepOutcome::Completed(artifact))
            }
            Err(e) => Err(self.fail(e.into()).await),
        }
    }

    /// Drive the session to a terminal point or a permission stop.
    pub async fn run(
        &mut self,
        mut stream: EventStream,
        cancel: CancellationToken,
    ) -> Result<SessionOutcome, SessionError> {
        let result = self.run_loop(&mut stream, &cancel).await;
        stream.terminate().await;
        result
    }

    async fn run_loop(
        &mut self,
        stream: &mut EventStream,
        cancel: &CancellationToken,
    ) -> Result<SessionOutcome, SessionError> {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.cancel().await;
                    return Ok(SessionOutcome::Cancelled);
                }
                event = stream.next() => event,
            };

            let Some(event) = event else {
                return Err(self
                    .fail(SessionError::Transport(
                        "event stream closed before a final result".into(),
                    ))
                    .await);
            };

            match self.consume_event(event).await? {
                StepOutcome::Continue => {}
                StepOutcome::AwaitingInput(request) => {
                    let state = ResumeState::capture(
                        &self.session.request,
                        &self.session.prior_turns,
                        self.tracker.transcript(),
                        request,
                    );
                    return Ok(SessionOutcome::AwaitingPermission(state));
                }
                StepOutcome::Completed(artifact) => return Ok(SessionOutcome::Completed(artifact)),
            }
        }
    }

    /// Abandon the session. Nothing is finalized afterwards.
    pub async fn cancel(&mut self) {
        if self.session.state.is_terminal() {
            return;
        }
        tracing::info!("[Driver] session {} cancelled", self.session.id);
        self.failure = Some("cancelled".to_string());
        self.record(
            TraceRecord::new(&self.session.id, TraceEventType::SessionEnd, self.contributor.clone())
                .with_metadata("cancelled", Value::Bool(true)),
        )
        .await;
        self.transition(SessionState::Failed);
    }

    /// Snapshot for continuing after a permission stop.
    pub fn resume_state(&self) -> Option<ResumeState> {
        self.tracker.pending_permission().map(|request| {
            ResumeState::capture(
                &self.session.request,
                &self.session.prior_turns,
                self.tracker.transcript(),
                request.clone(),
            )
        })
    }

    async fn fail(&mut self, err: SessionError) -> SessionError {
        tracing::error!("[Driver] session {} failed: {}", self.session.id, err);
        self.failure = Some(err.to_string());
        self.emit(json!({
            "sessionUpdate": "error",
            "message": err.to_string(),
        }));
        self.record(
            TraceRecord::new(&self.session.id, TraceEventType::SessionEnd, self.contributor.clone())
                .with_metadata("error", Value::String(err.to_string())),
        )
        .await;
        self.transition(SessionState::Failed);
        err
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(
            "[Driver] session {}: {} -> {}",
            self.session.id,
            self.session.state,
            next
        );
        self.session.state = next;
        self.emit(json!({
            "sessionUpdate": "session_state",
            "state": next.as_str(),
        }));
    }

    fn notify_event(&self, event: &StreamEvent) {
        let update = match event {
            StreamEvent::AssistantText { text } => json!({
                "sessionUpdate": "agent_message_chunk",
                "content": { "type": "text", "text": text }
            }),
            StreamEvent::ToolInvocation { id, name, input } => {
                if name == TASK_LIST_TOOL {
                    json!({
                        "sessionUpdate": "plan",
                        "entries": input.get("todos").cloned().unwrap_or_else(|| json!([]))
                    })
                } else {
                    json!({
                        "sessionUpdate": "tool_call",
                        "toolCallId": id,
                        "title": name,
                        "status": "running",
                        "rawInput": input
                    })
                }
            }
            StreamEvent::ToolResult { id, output, is_error } => json!({
                "sessionUpdate": "tool_call_update",
                "toolCallId": id,
                "status": if *is_error { "failed" } else { "completed" },
                "rawOutput": output
            }),
            StreamEvent::TaskListUpdate { tasks } => json!({
                "sessionUpdate": "plan",
                "entries": tasks
            }),
            StreamEvent::PermissionRequest(request) => json!({
                "sessionUpdate": "permission_request",
                "requestId": request.id,
                "toolName": request.tool_name,
                "question": request.question,
                "requiredFields": request.required_fields
            }),
            // Terminal events are reported once their outcome is known.
            StreamEvent::FinalResult { .. } | StreamEvent::Error { .. } => return,
        };
        self.emit(update);
    }

    fn emit(&self, update: Value) {
        if let Some(tx) = &self.notification_tx {
            emit_session_update(tx, &self.session.id, update);
        }
    }

    async fn record(&self, record: TraceRecord) {
        if let Some(writer) = &self.trace {
            writer.append_safe(&record).await;
        }
    }
}

fn emit_session_update(tx: &broadcast::Sender<Value>, session_id: &str, update: Value) {
    let notification = json!({
        "jsonrpc": "2.0",
        "method": "session/update",
        "params": {
            "sessionId": session_id,
            "update": update
        }
    });
    let _ = tx.send(notification);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::{TaskItem, TaskStatus};

    fn driver(dir: &std::path::Path) -> SessionDriver {
        SessionDriver::new(
            "simple API",
            vec![],
            SessionConfig::default(),
            ArtifactFinalizer::new(dir),
        )
    }

    #[tokio::test]
    async fn test_events_rejected_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = driver(dir.path());
        let err = driver
            .consume_event(StreamEvent::AssistantText { text: "hi".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidState(_)));
        assert_eq!(driver.state(), SessionState::NotStarted);
    }

    #[tokio::test]
    async fn test_start_twice_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = driver(dir.path());
        let payload = driver.begin_streaming().await.unwrap();
        assert!(payload.contains("simple API"));
        assert_eq!(driver.state(), SessionState::Streaming);
        assert!(matches!(
            driver.begin_streaming().await,
            Err(SessionError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_final_result_completes() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = driver(dir.path());
        driver.begin_streaming().await.unwrap();

        let outcome = driver
            .consume_event(StreamEvent::FinalResult {
                text: "[workflow]\nname = \"Simple API\"".into(),
            })
            .await
            .unwrap();
        let StepOutcome::Completed(artifact) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(artifact.path, dir.path().join("simple-api.toml"));
        assert_eq!(driver.state(), SessionState::Completed);

        let err = driver
            .consume_event(StreamEvent::AssistantText { text: "late".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_error_fails_without_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = driver(dir.path());
        driver.begin_streaming().await.unwrap();
        let err = driver
            .consume_event(StreamEvent::Error { message: "rate limited".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Reasoning(ref m) if m == "rate limited"));
        assert_eq!(driver.state(), SessionState::Failed);
        assert!(driver.artifact().is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_final_result_while_awaiting_permission_is_not_finalized() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = driver(dir.path());
        driver.begin_streaming().await.unwrap();
        driver
            .consume_event(StreamEvent::PermissionRequest(PermissionRequest {
                id: "p".into(),
                tool_name: None,
                question: "Connect GitHub?".into(),
                required_fields: vec![],
            }))
            .await
            .unwrap();
        let err = driver
            .consume_event(StreamEvent::FinalResult { text: "[workflow]".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidState(_)));
        assert!(driver.artifact().is_none());
    }

    #[tokio::test]
    async fn test_notifications_broadcast() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = broadcast::channel(64);
        let mut driver = driver(dir.path()).with_notifications(tx);
        driver.begin_streaming().await.unwrap();
        driver
            .consume_event(StreamEvent::TaskListUpdate {
                tasks: vec![TaskItem::new("Inspect capabilities", TaskStatus::InProgress)],
            })
            .await
            .unwrap();

        let state = rx.recv().await.unwrap();
        assert_eq!(state["method"], "session/update");
        assert_eq!(state["params"]["sessionId"], driver.session().id.as_str());
        assert_eq!(state["params"]["update"]["state"], "streaming");

        let plan = rx.recv().await.unwrap();
        assert_eq!(plan["params"]["update"]["sessionUpdate"], "plan");
        assert_eq!(plan["params"]["update"]["entries"][0]["status"], "in_progress");
    }
}
