//! Core type definitions shared by Repogent agents

use serde::{Deserialize, Serialize};

/// Message type the orchestrator sends to the PR reviewer after a build failure
pub const ANALYZE_BUILD_FAILURE: &str = "analyze_build_failure";

/// Message type of the orchestrator's reply to `request_context`
pub const CONTEXT_RESPONSE: &str = "context_response";

/// Message type raised for security findings
pub const SECURITY_ALERT: &str = "security_alert";

/// Named agents in the Repogent ecosystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    PrReviewer,
    IssueManager,
    CommunityAssistant,
    CicdAgent,
    /// The coordinator itself; messages addressed here are control messages
    Orchestrator,
}

impl AgentKind {
    /// Worker agents, in registry order
    pub const WORKERS: [AgentKind; 4] = [
        AgentKind::PrReviewer,
        AgentKind::IssueManager,
        AgentKind::CommunityAssistant,
        AgentKind::CicdAgent,
    ];

    /// Mailbox name used as `receiver` on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrReviewer => "pr_reviewer",
            Self::IssueManager => "issue_manager",
            Self::CommunityAssistant => "community_assistant",
            Self::CicdAgent => "cicd_agent",
            Self::Orchestrator => "orchestrator",
        }
    }

    /// Registry entry for a worker agent
    pub fn info(&self) -> Option<AgentInfo> {
        let (name, entrypoint, capabilities): (&str, &str, &[&str]) = match self {
            Self::PrReviewer => (
                "PR Reviewer",
                "review_pr",
                &["code_review", "pr_analysis", "inline_comments"],
            ),
            Self::IssueManager => (
                "Issue Manager",
                "triage_issue",
                &["issue_classification", "labeling", "triage"],
            ),
            Self::CommunityAssistant => (
                "Community Assistant",
                "community_assistant",
                &["codebase_search", "qa", "documentation"],
            ),
            Self::CicdAgent => (
                "CI/CD Agent",
                "cicd_agent",
                &["build_monitoring", "failure_analysis", "deployment_tracking"],
            ),
            Self::Orchestrator => return None,
        };

        Some(AgentInfo {
            kind: *self,
            name: name.to_string(),
            entrypoint: entrypoint.to_string(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        })
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pr_reviewer" => Ok(Self::PrReviewer),
            "issue_manager" => Ok(Self::IssueManager),
            "community_assistant" => Ok(Self::CommunityAssistant),
            "cicd_agent" => Ok(Self::CicdAgent),
            "orchestrator" => Ok(Self::Orchestrator),
            _ => Err(format!("Unknown agent: {}", s)),
        }
    }
}

/// Static description of a worker agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub kind: AgentKind,
    /// Human-readable name
    pub name: String,
    /// Job that runs this agent
    pub entrypoint: String,
    pub capabilities: Vec<String>,
}

/// Registry entry for an agent, `None` for the orchestrator
pub fn agent_info(kind: AgentKind) -> Option<AgentInfo> {
    kind.info()
}

/// All registered worker agents
pub fn list_agents() -> Vec<AgentInfo> {
    AgentKind::WORKERS.iter().filter_map(AgentKind::info).collect()
}

/// Message priority buckets (lower number = more urgent)
///
/// Determines both dequeue order and which entry is evicted on overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityClass {
    Critical = 1,
    High = 2,
    Routine = 3,
}

impl PriorityClass {
    const CRITICAL_TYPES: [&'static str; 2] = ["build_failure", SECURITY_ALERT];
    const HIGH_TYPES: [&'static str; 2] = [ANALYZE_BUILD_FAILURE, "request_context"];

    /// Classify a message type
    pub fn of(message_type: &str) -> Self {
        if Self::CRITICAL_TYPES.contains(&message_type) {
            Self::Critical
        } else if Self::HIGH_TYPES.contains(&message_type) {
            Self::High
        } else {
            Self::Routine
        }
    }

    pub fn rank(&self) -> u8 {
        *self as u8
    }
}

impl std::fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::High => write!(f, "high"),
            Self::Routine => write!(f, "routine"),
        }
    }
}

/// Control operations carried by self-addressed messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    /// CI/CD agent reports a failed build
    BuildFailure,
    /// An agent asks for a stored context record
    RequestContext,
    /// An agent records a decision in the audit trail
    LogDecision,
}

impl ControlKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BuildFailure => "build_failure",
            Self::RequestContext => "request_context",
            Self::LogDecision => "log_decision",
        }
    }

    /// Parse a wire message type; `None` for anything not handled by the orchestrator
    pub fn parse(message_type: &str) -> Option<Self> {
        match message_type {
            "build_failure" => Some(Self::BuildFailure),
            "request_context" => Some(Self::RequestContext),
            "log_decision" => Some(Self::LogDecision),
            _ => None,
        }
    }
}

impl std::fmt::Display for ControlKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_classes() {
        assert_eq!(PriorityClass::of("build_failure"), PriorityClass::Critical);
        assert_eq!(PriorityClass::of("security_alert"), PriorityClass::Critical);
        assert_eq!(PriorityClass::of("analyze_build_failure"), PriorityClass::High);
        assert_eq!(PriorityClass::of("request_context"), PriorityClass::High);
        assert_eq!(PriorityClass::of("log_decision"), PriorityClass::Routine);
        assert_eq!(PriorityClass::of("anything_else"), PriorityClass::Routine);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(PriorityClass::Critical < PriorityClass::High);
        assert!(PriorityClass::High < PriorityClass::Routine);
        assert_eq!(PriorityClass::Routine.rank(), 3);
    }

    #[test]
    fn test_agent_round_trip_names() {
        for kind in AgentKind::WORKERS {
            let parsed: AgentKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("nobody".parse::<AgentKind>().is_err());
    }

    #[test]
    fn test_registry() {
        let agents = list_agents();
        assert_eq!(agents.len(), 4);
        assert_eq!(agents[0].name, "PR Reviewer");
        assert!(agent_info(AgentKind::Orchestrator).is_none());

        let cicd = agent_info(AgentKind::CicdAgent).unwrap();
        assert!(cicd.capabilities.contains(&"failure_analysis".to_string()));
    }

    #[test]
    fn test_control_kind_parse() {
        assert_eq!(ControlKind::parse("build_failure"), Some(ControlKind::BuildFailure));
        assert_eq!(ControlKind::parse("log_decision"), Some(ControlKind::LogDecision));
        assert_eq!(ControlKind::parse("context_response"), None);
    }
}
