//! Event routing
//!
//! Maps an inbound repository event to the agent that should handle it.
//! Most event kinds map to a fixed agent; comments are routed by content.

use repogent_core::AgentKind;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Repository event kinds the router understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PullRequest,
    PullRequestReview,
    Issues,
    IssueComment,
    WorkflowRun,
    WorkflowJob,
    CheckRun,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::PullRequest,
        EventKind::PullRequestReview,
        EventKind::Issues,
        EventKind::IssueComment,
        EventKind::WorkflowRun,
        EventKind::WorkflowJob,
        EventKind::CheckRun,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PullRequest => "pull_request",
            Self::PullRequestReview => "pull_request_review",
            Self::Issues => "issues",
            Self::IssueComment => "issue_comment",
            Self::WorkflowRun => "workflow_run",
            Self::WorkflowJob => "workflow_job",
            Self::CheckRun => "check_run",
        }
    }

    /// How events of this kind are routed
    pub fn rule(&self) -> RouteRule {
        match self {
            Self::PullRequest | Self::PullRequestReview => RouteRule::Agent(AgentKind::PrReviewer),
            Self::Issues => RouteRule::Agent(AgentKind::IssueManager),
            Self::IssueComment => RouteRule::CommentMention,
            Self::WorkflowRun | Self::WorkflowJob | Self::CheckRun => {
                RouteRule::Agent(AgentKind::CicdAgent)
            }
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown event kind: {}", s))
    }
}

/// Routing rule attached to an event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteRule {
    /// Always the same agent
    Agent(AgentKind),
    /// Community assistant when the comment mentions the bot, else issue manager
    CommentMention,
}

/// Result of routing an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Agent(AgentKind),
    /// No rule for this event kind
    Unknown,
}

impl Route {
    pub fn agent(&self) -> Option<AgentKind> {
        match self {
            Self::Agent(kind) => Some(*kind),
            Self::Unknown => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent(kind) => kind.as_str(),
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stateless router holding the configured mention token
#[derive(Debug, Clone)]
pub struct EventRouter {
    mention: String,
}

impl EventRouter {
    pub fn new(mention: impl AsRef<str>) -> Self {
        Self {
            mention: mention.as_ref().to_lowercase(),
        }
    }

    /// Route an event by its wire name; unknown kinds give [`Route::Unknown`]
    pub fn route(&self, event_kind: &str, event_data: &Value) -> Route {
        let route = match event_kind.parse::<EventKind>() {
            Ok(kind) => self.route_kind(kind, event_data),
            Err(_) => Route::Unknown,
        };
        debug!(event = event_kind, route = %route, "Event routed");
        route
    }

    pub fn route_kind(&self, kind: EventKind, event_data: &Value) -> Route {
        match kind.rule() {
            RouteRule::Agent(agent) => Route::Agent(agent),
            RouteRule::CommentMention => Route::Agent(self.route_comment(event_data)),
        }
    }

    /// Content rule for comment events; the body lives at `comment.body`
    pub fn route_comment(&self, event_data: &Value) -> AgentKind {
        let body = match event_data.get("comment").and_then(|c| c.get("body")) {
            None | Some(Value::Null) => "",
            Some(Value::String(body)) => body.as_str(),
            Some(other) => {
                warn!("Invalid comment body type: {}", other);
                return AgentKind::IssueManager;
            }
        };

        if body.to_lowercase().contains(&self.mention) {
            AgentKind::CommunityAssistant
        } else {
            AgentKind::IssueManager
        }
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new("@repogent")
    }
}
