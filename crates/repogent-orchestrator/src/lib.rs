//! # repogent-orchestrator
//!
//! Inter-agent coordination for Repogent.
//!
//! This crate provides:
//! - [`Message`]: validated, size-bounded messages between agents
//! - [`MessageQueue`]: durable, priority-ordered mailbox with bounded depth
//! - [`ContextStore`]: durable JSON context with per-PR merge
//! - [`DecisionLog`]: append-only daily audit trail
//! - [`EventRouter`]: event kind to agent routing
//! - [`Orchestrator`]: one coordination cycle per process invocation
//!
//! All state lives on a shared filesystem. Any number of short-lived
//! processes may read, enqueue and dequeue at once; writes become visible
//! through atomic rename and a lost unlink race counts as success.

mod context;
mod decision_log;
mod durable;
mod mailbox;
mod message;
mod orchestrator;
mod queue;
mod routing;

pub use context::{
    merge_entity_data, pr_context_id, sanitize_context_id, ContextRecord, ContextStore, EntityWrite,
};
pub use decision_log::DecisionLog;
pub use mailbox::AgentMailbox;
pub use message::{Message, DEFAULT_MAX_PAYLOAD_BYTES};
pub use orchestrator::{CycleReport, Dispatch, Orchestrator};
pub use queue::MessageQueue;
pub use routing::{EventKind, EventRouter, Route, RouteRule};
