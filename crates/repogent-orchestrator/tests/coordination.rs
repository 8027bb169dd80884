//! Integration tests for the coordination core.
//!
//! Each test opens the stores the way separate agent processes would:
//! independent handles over one shared directory.

use repogent_core::{LimitsConfig, PriorityClass, RepogentConfig};
use repogent_orchestrator::{Dispatch, EntityWrite, Message, MessageQueue, Orchestrator, Route};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn map(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn backdate(path: &Path, secs_ago: u64) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::now() - Duration::from_secs(secs_ago))
        .unwrap();
}

#[test]
fn test_build_failure_updates_pr_context_and_notifies_reviewer() {
    let dir = TempDir::new().unwrap();
    let config = RepogentConfig::default();

    // CI/CD agent run
    let cicd = Orchestrator::open(&config, dir.path()).unwrap();
    let payload = json!({"pr_number": 42, "analysis": {"failure_type": "test_failure"}});
    cicd.mailbox("cicd_agent")
        .send("orchestrator", "build_failure", map(payload.clone()))
        .unwrap()
        .unwrap();
    drop(cicd);

    // Orchestrator run
    let orchestrator = Orchestrator::open(&config, dir.path()).unwrap();
    let report = orchestrator.run_cycle("workflow_run", &json!({})).unwrap();
    assert_eq!(report.processed, 1);
    assert!(report.is_success());

    let context = orchestrator.context().get_pr_context(42).unwrap();
    assert_eq!(context.data["build_status"], "failed");
    assert_eq!(context.data["failure_details"], payload);

    let for_reviewer = orchestrator.receive_messages("pr_reviewer").unwrap();
    assert_eq!(for_reviewer.len(), 1);
    assert_eq!(for_reviewer[0].message_type(), "analyze_build_failure");
    assert_eq!(for_reviewer[0].sender(), "orchestrator");
    assert_eq!(Value::Object(for_reviewer[0].payload().clone()), payload);
}

#[test]
fn test_full_queue_keeps_critical_entry_across_processes() {
    let dir = TempDir::new().unwrap();
    let limits = LimitsConfig::default();
    assert_eq!(limits.max_queue_depth, 100);

    let first = MessageQueue::with_limits(dir.path(), &limits).unwrap();
    let critical = Message::new("cicd_agent", "orchestrator", "build_failure", map(json!({"pr_number": 1})))
        .unwrap();
    let critical_path = first.enqueue(&critical).unwrap();
    backdate(&critical_path, 10_000);

    let mut routine_paths = Vec::new();
    for n in 0..99u64 {
        let msg = Message::new("a", "b", "note", map(json!({"n": n}))).unwrap();
        let path = first.enqueue(&msg).unwrap();
        backdate(&path, 5_000 - n);
        routine_paths.push(path);
    }
    assert_eq!(first.depth().unwrap(), 100);

    let second = MessageQueue::with_limits(dir.path(), &limits).unwrap();
    first
        .enqueue(&Message::new("a", "b", "note", map(json!({"from": "first"}))).unwrap())
        .unwrap();
    second
        .enqueue(&Message::new("a", "b", "note", map(json!({"from": "second"}))).unwrap())
        .unwrap();

    assert_eq!(first.depth().unwrap(), 100);
    assert!(critical_path.exists());
    assert!(!routine_paths[0].exists());
    assert!(!routine_paths[1].exists());
    assert!(routine_paths[2..].iter().all(|p| p.exists()));
}

#[test]
fn test_critical_never_evicted_while_routine_remains() {
    let dir = TempDir::new().unwrap();
    let limits = LimitsConfig {
        max_queue_depth: 5,
        ..LimitsConfig::default()
    };
    let queue = MessageQueue::with_limits(dir.path(), &limits).unwrap();

    for n in 0..3u64 {
        let msg = Message::new("cicd_agent", "orchestrator", "security_alert", map(json!({"n": n})))
            .unwrap();
        queue.enqueue(&msg).unwrap();
    }
    for n in 0..20u64 {
        let msg = Message::new("a", "b", "note", map(json!({"n": n}))).unwrap();
        queue.enqueue(&msg).unwrap();
        assert!(queue.depth().unwrap() <= 5);
    }

    let critical = queue
        .peek_all(None)
        .unwrap()
        .into_iter()
        .filter(|m| m.priority() == PriorityClass::Critical)
        .count();
    assert_eq!(critical, 3);
}

#[test]
fn test_drain_returns_each_message_exactly_once() {
    let dir = TempDir::new().unwrap();
    let producer = MessageQueue::open(dir.path()).unwrap();
    let consumer = MessageQueue::open(dir.path()).unwrap();

    let mut expected = HashSet::new();
    for n in 0..10u64 {
        let msg = Message::new("a", "issue_manager", "note", map(json!({"n": n}))).unwrap();
        producer.enqueue(&msg).unwrap();
        expected.insert(msg.id().to_string());

        let other = Message::new("a", "pr_reviewer", "note", map(json!({"n": n}))).unwrap();
        producer.enqueue(&other).unwrap();
    }
    let urgent = Message::new("a", "issue_manager", "request_context", map(json!({}))).unwrap();
    producer.enqueue(&urgent).unwrap();
    expected.insert(urgent.id().to_string());

    let drained = consumer.drain("issue_manager").unwrap();
    assert_eq!(drained[0].id(), urgent.id());
    assert!(drained.iter().all(|m| m.receiver() == "issue_manager"));

    let ids: HashSet<String> = drained.iter().map(|m| m.id().to_string()).collect();
    assert_eq!(ids.len(), drained.len());
    assert_eq!(ids, expected);

    assert!(consumer.dequeue("issue_manager").unwrap().is_none());
    assert_eq!(producer.depth().unwrap(), 10);
}

#[test]
fn test_request_context_reply_carries_record() {
    let dir = TempDir::new().unwrap();
    let orchestrator = Orchestrator::open(&RepogentConfig::default(), dir.path()).unwrap();

    let assistant = orchestrator.mailbox("community_assistant");
    assistant
        .save_context("faq", &map(json!({"answers": {"queue": "durable"}})))
        .unwrap();
    assistant
        .send("orchestrator", "request_context", map(json!({"context_id": "faq"})))
        .unwrap();

    let report = orchestrator
        .run_cycle("issue_comment", &json!({"comment": {"body": "@repogent explain the queue"}}))
        .unwrap();
    assert_eq!(report.route.to_string(), "community_assistant");
    assert_eq!(report.processed, 1);

    let replies = assistant.receive().unwrap();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].message_type(), "context_response");

    let context = &replies[0].payload()["context"];
    assert_eq!(context["id"], "faq");
    assert_eq!(context["data"]["answers"]["queue"], "durable");
}

#[test]
fn test_independent_writers_merge_pr_context() {
    let dir = TempDir::new().unwrap();
    let config = RepogentConfig::default();

    let reviewer = Orchestrator::open(&config, dir.path()).unwrap();
    let write = reviewer
        .context()
        .save_pr_context(7, &map(json!({"agents": {"pr_reviewer": {"score": 9}}})))
        .unwrap();
    assert_eq!(write, EntityWrite::Created);

    let triage = Orchestrator::open(&config, dir.path()).unwrap();
    triage
        .context()
        .save_pr_context(7, &map(json!({"agents": {"issue_manager": {"labels": ["docs"]}}})))
        .unwrap();

    let data = triage.context().get_pr_context(7).unwrap().data;
    assert_eq!(data["agents"]["pr_reviewer"]["score"], 9);
    assert_eq!(data["agents"]["issue_manager"]["labels"], json!(["docs"]));
}

#[test]
fn test_cycle_counts_failures_without_rollback() {
    let dir = TempDir::new().unwrap();
    let config = RepogentConfig::default();
    let orchestrator = Orchestrator::open(&config, dir.path()).unwrap();

    orchestrator
        .send_message("pr_reviewer", "orchestrator", "log_decision", map(json!({"ok": true})))
        .unwrap();

    // A file where the log directory should be makes the decision append fail
    std::fs::write(config.log_dir(dir.path()), "not a directory").unwrap();

    let report = orchestrator.run_cycle("unknown_event", &json!({})).unwrap();
    assert_eq!(report.route, Route::Unknown);
    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 1);
    assert!(!report.is_success());
    assert_eq!(orchestrator.queue().depth().unwrap(), 0);
}

#[test]
fn test_forwarded_messages_wait_for_their_agent() {
    let dir = TempDir::new().unwrap();
    let orchestrator = Orchestrator::open(&RepogentConfig::default(), dir.path()).unwrap();

    let msg = Message::new("pr_reviewer", "issue_manager", "link_issue", map(json!({"issue": 3})))
        .unwrap();
    orchestrator.queue().enqueue(&msg).unwrap();

    let outcome = orchestrator.handle_agent_communication(&msg).unwrap();
    assert_eq!(outcome, Dispatch::Forwarded("issue_manager".to_string()));
    assert_eq!(orchestrator.receive_messages("issue_manager").unwrap().len(), 1);
}
