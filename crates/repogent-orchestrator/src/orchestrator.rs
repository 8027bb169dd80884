//! Core orchestrator implementation
//!
//! There is no long-running orchestrator process. Each invocation opens
//! the on-disk stores, performs one cycle and exits:
//!
//! 1. route the inbound event
//! 2. drain the orchestrator's own mailbox
//! 3. dispatch each self-addressed control message

use chrono::Utc;
use repogent_core::fail_open::fail_open;
use repogent_core::{
    positive_id_from_json, AgentKind, ControlKind, RepogentConfig, Result, ANALYZE_BUILD_FAILURE,
    CONTEXT_RESPONSE,
};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::context::{ContextStore, EntityWrite};
use crate::decision_log::DecisionLog;
use crate::mailbox::AgentMailbox;
use crate::message::Message;
use crate::queue::MessageQueue;
use crate::routing::{EventRouter, Route};

/// Outcome of handling one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Build failure merged into a PR's context and forwarded for review
    ContextUpdated { pr_number: u64, write: EntityWrite },
    /// Context reply queued for the requester
    ContextReplied { requester: String, found: bool },
    /// Decision appended to the audit log
    DecisionLogged(PathBuf),
    /// Control message that could not be acted on
    Dropped(String),
    /// Addressed to another agent; delivered when that agent drains its mailbox
    Forwarded(String),
    /// Self-addressed message of a type with no handler
    Ignored(String),
}

/// Summary of one orchestrator cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub route: Route,
    pub processed: usize,
    pub failed: usize,
}

impl CycleReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Composes the message queue, context store and decision log
pub struct Orchestrator {
    queue: MessageQueue,
    context: ContextStore,
    decisions: DecisionLog,
    router: EventRouter,
    max_payload_bytes: usize,
}

impl Orchestrator {
    /// Open the stores under the configured storage root of `repo_root`
    ///
    /// Temp files left by crashed writers are purged on a best-effort basis.
    #[instrument(skip(config))]
    pub fn open(config: &RepogentConfig, repo_root: &Path) -> Result<Self> {
        let limits = &config.limits;
        let queue = MessageQueue::with_limits(config.queue_dir(repo_root), limits)?;
        let context = ContextStore::with_limits(config.context_dir(repo_root), limits)?;
        let decisions = DecisionLog::new(config.log_dir(repo_root));
        let router = EventRouter::new(&config.routing.mention);

        let max_age = Duration::from_secs(limits.orphan_temp_max_age_secs);
        let queue_purged =
            fail_open("purge_queue_temp_files", || queue.purge_orphaned_temp_files(max_age));
        let context_purged =
            fail_open("purge_context_temp_files", || context.purge_orphaned_temp_files(max_age));
        let purged = queue_purged.unwrap_or(0) + context_purged.unwrap_or(0);
        if purged > 0 {
            info!(purged, "Removed interrupted writes");
        }

        Ok(Self::from_parts(
            queue,
            context,
            decisions,
            router,
            limits.max_payload_bytes,
        ))
    }

    /// Assemble an orchestrator from already-open stores
    pub fn from_parts(
        queue: MessageQueue,
        context: ContextStore,
        decisions: DecisionLog,
        router: EventRouter,
        max_payload_bytes: usize,
    ) -> Self {
        Self {
            queue,
            context,
            decisions,
            router,
            max_payload_bytes,
        }
    }

    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    pub fn context(&self) -> &ContextStore {
        &self.context
    }

    pub fn decisions(&self) -> &DecisionLog {
        &self.decisions
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Mailbox bound to `agent`
    pub fn mailbox(&self, agent: impl Into<String>) -> AgentMailbox<'_> {
        AgentMailbox::new(self, agent)
    }

    /// Target agent for an inbound event
    pub fn route_event(&self, event_kind: &str, event_data: &Value) -> Route {
        self.router.route(event_kind, event_data)
    }

    /// Build and enqueue a message
    ///
    /// A message that fails validation is logged and dropped (`Ok(None)`);
    /// only storage failures are errors. Returns the queued message id.
    #[instrument(skip(self, payload))]
    pub fn send_message(
        &self,
        sender: &str,
        receiver: &str,
        message_type: &str,
        payload: Map<String, Value>,
    ) -> Result<Option<String>> {
        let message = match Message::with_limit(
            sender,
            receiver,
            message_type,
            payload,
            self.max_payload_bytes,
        ) {
            Ok(message) => message,
            Err(e) if e.is_validation() => {
                warn!("Failed to send message: {}", e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        self.queue.enqueue(&message)?;
        info!("Message queued: {} -> {} ({})", sender, receiver, message_type);
        Ok(Some(message.id().to_string()))
    }

    /// All pending messages for `agent`, most urgent first
    pub fn receive_messages(&self, agent: &str) -> Result<Vec<Message>> {
        self.queue.drain(agent)
    }

    /// Act on one message
    #[instrument(skip(self, message), fields(id = %message.id(), kind = %message.message_type()))]
    pub fn handle_agent_communication(&self, message: &Message) -> Result<Dispatch> {
        let own_name = AgentKind::Orchestrator.as_str();
        if !message.is_for(own_name) {
            debug!("Forwarding message to {}", message.receiver());
            return Ok(Dispatch::Forwarded(message.receiver().to_string()));
        }

        match ControlKind::parse(message.message_type()) {
            Some(ControlKind::BuildFailure) => self.handle_build_failure(message.payload()),
            Some(ControlKind::RequestContext) => self.handle_context_request(message),
            Some(ControlKind::LogDecision) => self.log_agent_decision(message),
            None => {
                debug!("No handler for {}", message.message_type());
                Ok(Dispatch::Ignored(message.message_type().to_string()))
            }
        }
    }

    /// Record the failure on the PR and ask the reviewer to analyze it
    fn handle_build_failure(&self, payload: &Map<String, Value>) -> Result<Dispatch> {
        let Some(pr_number) = payload.get("pr_number").and_then(positive_id_from_json) else {
            warn!("Build failure has no associated PR, skipping context save");
            return Ok(Dispatch::Dropped(
                "build_failure without a positive pr_number".to_string(),
            ));
        };

        let mut update = Map::new();
        update.insert("build_status".to_string(), json!("failed"));
        update.insert("failure_details".to_string(), Value::Object(payload.clone()));
        update.insert("timestamp".to_string(), json!(Utc::now().to_rfc3339()));
        let write = self.context.save_pr_context(pr_number, &update)?;

        self.send_message(
            AgentKind::Orchestrator.as_str(),
            AgentKind::PrReviewer.as_str(),
            ANALYZE_BUILD_FAILURE,
            payload.clone(),
        )?;

        Ok(Dispatch::ContextUpdated { pr_number, write })
    }

    /// Reply to the requester with the stored record, or null
    fn handle_context_request(&self, message: &Message) -> Result<Dispatch> {
        let record = match message.payload().get("context_id") {
            Some(Value::String(id)) => self.context.load(id),
            other => {
                warn!("Context request without a string context_id: {:?}", other);
                None
            }
        };
        let found = record.is_some();

        let mut reply = Map::new();
        reply.insert("context".to_string(), serde_json::to_value(record)?);

        self.send_message(
            AgentKind::Orchestrator.as_str(),
            message.sender(),
            CONTEXT_RESPONSE,
            reply,
        )?;

        Ok(Dispatch::ContextReplied {
            requester: message.sender().to_string(),
            found,
        })
    }

    fn log_agent_decision(&self, message: &Message) -> Result<Dispatch> {
        let path = self.decisions.append(message.sender(), message.payload())?;
        Ok(Dispatch::DecisionLogged(path))
    }

    /// One full invocation: route, drain own mailbox, dispatch
    ///
    /// Failures are counted, not rolled back; messages handled before a
    /// failure stay handled.
    #[instrument(skip(self, event_data))]
    pub fn run_cycle(&self, event_kind: &str, event_data: &Value) -> Result<CycleReport> {
        info!("Orchestrator processing: {}", event_kind);

        let route = self.route_event(event_kind, event_data);
        info!("Routing to: {}", route);

        let messages = self.receive_messages(AgentKind::Orchestrator.as_str())?;
        let mut failed = 0;
        for message in &messages {
            if let Err(e) = self.handle_agent_communication(message) {
                error!(id = %message.id(), "Failed to handle {}: {}", message.message_type(), e);
                failed += 1;
            }
        }

        info!("Orchestrator processed {} messages", messages.len());
        Ok(CycleReport {
            route,
            processed: messages.len(),
            failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repogent_core::LimitsConfig;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Orchestrator) {
        let dir = TempDir::new().unwrap();
        let config = RepogentConfig::default();
        let orchestrator = Orchestrator::open(&config, dir.path()).unwrap();
        (dir, orchestrator)
    }

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_open_creates_stores() {
        let (dir, orchestrator) = setup();
        assert!(dir.path().join(".repogent/queue").is_dir());
        assert!(dir.path().join(".repogent/context").is_dir());
        assert_eq!(orchestrator.queue().depth().unwrap(), 0);
    }

    #[test]
    fn test_send_and_receive() {
        let (_dir, orchestrator) = setup();

        let id = orchestrator
            .send_message("cicd_agent", "pr_reviewer", "note", map(json!({"n": 1})))
            .unwrap()
            .unwrap();

        let messages = orchestrator.receive_messages("pr_reviewer").unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id(), id);
        assert!(orchestrator.receive_messages("pr_reviewer").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_message_is_dropped_not_raised() {
        let (_dir, orchestrator) = setup();
        let sent = orchestrator
            .send_message("", "pr_reviewer", "note", Map::new())
            .unwrap();
        assert!(sent.is_none());
        assert_eq!(orchestrator.queue().depth().unwrap(), 0);
    }

    #[test]
    fn test_oversized_message_is_dropped() {
        let dir = TempDir::new().unwrap();
        let mut config = RepogentConfig::default();
        config.limits = LimitsConfig {
            max_payload_bytes: 64,
            ..LimitsConfig::default()
        };
        let orchestrator = Orchestrator::open(&config, dir.path()).unwrap();

        let sent = orchestrator
            .send_message("a", "b", "note", map(json!({"blob": "z".repeat(128)})))
            .unwrap();
        assert!(sent.is_none());
    }

    #[test]
    fn test_forwarding_is_a_no_op() {
        let (_dir, orchestrator) = setup();
        let message = Message::new("a", "issue_manager", "note", Map::new()).unwrap();

        let outcome = orchestrator.handle_agent_communication(&message).unwrap();
        assert_eq!(outcome, Dispatch::Forwarded("issue_manager".to_string()));
        assert_eq!(orchestrator.queue().depth().unwrap(), 0);
    }

    #[test]
    fn test_build_failure_without_pr_is_dropped() {
        let (_dir, orchestrator) = setup();

        for payload in [json!({"run_id": 5}), json!({"pr_number": "42"}), json!({"pr_number": 0})] {
            let message = Message::new("cicd_agent", "orchestrator", "build_failure", map(payload))
                .unwrap();
            let outcome = orchestrator.handle_agent_communication(&message).unwrap();
            assert!(matches!(outcome, Dispatch::Dropped(_)));
        }

        assert!(orchestrator.context().list_ids().unwrap().is_empty());
        assert_eq!(orchestrator.queue().depth().unwrap(), 0);
    }

    #[test]
    fn test_build_failure_merges_into_existing_pr_context() {
        let (_dir, orchestrator) = setup();
        orchestrator
            .context()
            .save_pr_context(42, &map(json!({"review": {"score": 8}})))
            .unwrap();

        let message = Message::new(
            "cicd_agent",
            "orchestrator",
            "build_failure",
            map(json!({"pr_number": 42})),
        )
        .unwrap();
        let outcome = orchestrator.handle_agent_communication(&message).unwrap();
        assert_eq!(
            outcome,
            Dispatch::ContextUpdated {
                pr_number: 42,
                write: EntityWrite::Merged
            }
        );

        let data = orchestrator.context().get_pr_context(42).unwrap().data;
        assert_eq!(data["review"], json!({"score": 8}));
        assert_eq!(data["build_status"], "failed");
    }

    #[test]
    fn test_request_context_missing_replies_null() {
        let (_dir, orchestrator) = setup();
        let message = Message::new(
            "issue_manager",
            "orchestrator",
            "request_context",
            map(json!({"context_id": "nope"})),
        )
        .unwrap();

        let outcome = orchestrator.handle_agent_communication(&message).unwrap();
        assert_eq!(
            outcome,
            Dispatch::ContextReplied {
                requester: "issue_manager".to_string(),
                found: false
            }
        );

        let replies = orchestrator.receive_messages("issue_manager").unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].message_type(), CONTEXT_RESPONSE);
        assert_eq!(replies[0].payload()["context"], Value::Null);
    }

    #[test]
    fn test_log_decision() {
        let (dir, orchestrator) = setup();
        let message = Message::new(
            "pr_reviewer",
            "orchestrator",
            "log_decision",
            map(json!({"action": "request_changes"})),
        )
        .unwrap();

        let outcome = orchestrator.handle_agent_communication(&message).unwrap();
        let Dispatch::DecisionLogged(path) = outcome else {
            panic!("expected DecisionLogged, got {:?}", outcome);
        };
        assert!(path.starts_with(dir.path().join(".repogent/logs")));

        let line: Value =
            serde_json::from_str(std::fs::read_to_string(&path).unwrap().trim()).unwrap();
        assert_eq!(line["agent"], "pr_reviewer");
        assert_eq!(line["decision"]["action"], "request_changes");
    }

    #[test]
    fn test_unknown_control_type_is_ignored() {
        let (_dir, orchestrator) = setup();
        let message = Message::new("a", "orchestrator", "status_ping", Map::new()).unwrap();
        let outcome = orchestrator.handle_agent_communication(&message).unwrap();
        assert_eq!(outcome, Dispatch::Ignored("status_ping".to_string()));
    }

    #[test]
    fn test_run_cycle_drains_own_mailbox_only() {
        let (_dir, orchestrator) = setup();
        orchestrator
            .send_message("pr_reviewer", "orchestrator", "log_decision", map(json!({"a": 1})))
            .unwrap();
        orchestrator
            .send_message("a", "community_assistant", "note", Map::new())
            .unwrap();

        let report = orchestrator
            .run_cycle("pull_request", &json!({}))
            .unwrap();

        assert_eq!(report.route, Route::Agent(AgentKind::PrReviewer));
        assert_eq!(report.processed, 1);
        assert!(report.is_success());
        assert_eq!(orchestrator.queue().depth().unwrap(), 1);
    }
}
