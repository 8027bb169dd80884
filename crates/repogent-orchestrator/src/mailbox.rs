//! Agent-side view of the coordination stores
//!
//! Worker agents hold an [`AgentMailbox`] borrowed from the orchestrator
//! their entry point opened, instead of reaching for a shared global.

use repogent_core::{AgentKind, ControlKind, Result};
use serde_json::{Map, Value};

use crate::context::ContextRecord;
use crate::message::Message;
use crate::orchestrator::Orchestrator;

/// Messaging and context access on behalf of one agent
pub struct AgentMailbox<'a> {
    orchestrator: &'a Orchestrator,
    agent: String,
}

impl<'a> AgentMailbox<'a> {
    pub fn new(orchestrator: &'a Orchestrator, agent: impl Into<String>) -> Self {
        Self {
            orchestrator,
            agent: agent.into(),
        }
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// Send a message from this agent; `Ok(None)` if it was rejected
    pub fn send(
        &self,
        receiver: &str,
        message_type: &str,
        payload: Map<String, Value>,
    ) -> Result<Option<String>> {
        self.orchestrator
            .send_message(&self.agent, receiver, message_type, payload)
    }

    /// Drain this agent's pending messages
    pub fn receive(&self) -> Result<Vec<Message>> {
        self.orchestrator.receive_messages(&self.agent)
    }

    pub fn get_context(&self, context_id: &str) -> Option<ContextRecord> {
        self.orchestrator.context().load(context_id)
    }

    pub fn save_context(&self, context_id: &str, data: &Map<String, Value>) -> Result<ContextRecord> {
        self.orchestrator.context().save(context_id, data)
    }

    /// Queue a decision for the orchestrator's audit log
    pub fn log_decision(&self, decision: Map<String, Value>) -> Result<Option<String>> {
        self.send(
            AgentKind::Orchestrator.as_str(),
            ControlKind::LogDecision.as_str(),
            decision,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repogent_core::RepogentConfig;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_mailbox_round_trip() {
        let dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::open(&RepogentConfig::default(), dir.path()).unwrap();

        let cicd = orchestrator.mailbox("cicd_agent");
        let reviewer = orchestrator.mailbox("pr_reviewer");

        cicd.send("pr_reviewer", "note", json!({"hi": true}).as_object().cloned().unwrap())
            .unwrap();
        let inbox = reviewer.receive().unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].sender(), "cicd_agent");
        assert!(cicd.receive().unwrap().is_empty());
    }

    #[test]
    fn test_mailbox_context_access() {
        let dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::open(&RepogentConfig::default(), dir.path()).unwrap();
        let mailbox = orchestrator.mailbox("issue_manager");

        let data = json!({"labels": ["bug"]}).as_object().cloned().unwrap();
        mailbox.save_context("issue_12", &data).unwrap();
        assert_eq!(mailbox.get_context("issue_12").unwrap().data, json!({"labels": ["bug"]}));
    }

    #[test]
    fn test_log_decision_goes_through_orchestrator() {
        let dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::open(&RepogentConfig::default(), dir.path()).unwrap();

        orchestrator
            .mailbox("pr_reviewer")
            .log_decision(json!({"verdict": "approve"}).as_object().cloned().unwrap())
            .unwrap();

        let pending = orchestrator.queue().peek_all(Some("orchestrator")).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].message_type(), "log_decision");
        assert_eq!(pending[0].sender(), "pr_reviewer");
    }
}
