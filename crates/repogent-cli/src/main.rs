//! Repogent CLI - one coordination cycle per agent job
//!
//! Usage:
//!   repogent run                       Route the current event and drain the orchestrator mailbox
//!   repogent route <kind>              Show which agent handles an event
//!   repogent send <from> <to> <type> <json>
//!   repogent receive <agent>           Drain an agent's mailbox
//!   repogent peek                      List pending messages without removing them
//!   repogent context get|set|pr        Inspect or update stored context
//!   repogent agents                    List registered agents
//!   repogent comment <issue> <body>    Post an issue or PR comment
//!   repogent ask <prompt>              Run one LLM completion
//!   repogent init                      Write the default configuration

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use repogent_agent::{CompletionRequest, GitHubClient, GroqClient, LlmClient, RepositoryApi};
use repogent_core::fail_open::fail_open;
use repogent_core::{list_agents, validate_positive_id, RepogentConfig};
use repogent_orchestrator::{Message, Orchestrator};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "repogent")]
#[command(author, version, about = "Coordination core for repository automation agents")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Repository root (defaults to current directory)
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one orchestrator cycle for the current event
    Run {
        /// Event kind, e.g. pull_request or issue_comment
        #[arg(long, env = "GITHUB_EVENT_NAME")]
        event: Option<String>,

        /// JSON file with the event payload
        #[arg(long, env = "GITHUB_EVENT_PATH")]
        event_path: Option<PathBuf>,
    },

    /// Print the agent an event routes to
    Route {
        /// Event kind
        kind: String,

        /// JSON file with the event payload
        #[arg(long)]
        event_path: Option<PathBuf>,
    },

    /// Queue a message
    Send {
        sender: String,
        receiver: String,
        /// Message type
        message_type: String,
        /// Payload as a JSON object
        payload: String,
    },

    /// Drain and print an agent's pending messages
    Receive { agent: String },

    /// Print pending messages without removing them
    Peek {
        #[arg(long)]
        receiver: Option<String>,
    },

    /// Context store access
    Context {
        #[command(subcommand)]
        action: ContextCommands,
    },

    /// List registered agents
    Agents,

    /// Post a comment on an issue or pull request
    Comment {
        /// Issue or PR number
        issue: String,
        body: String,
    },

    /// Run one completion
    Ask {
        /// pr_review, issue_triage, community_qa or comment_response
        #[arg(long, default_value = "comment_response")]
        task: String,

        /// System prompt
        #[arg(long, default_value = "You are Repogent, a helpful repository assistant.")]
        system: String,

        prompt: String,
    },

    /// Write .repogent/config.toml with defaults
    Init,
}

#[derive(Subcommand)]
enum ContextCommands {
    /// Print a stored context record
    Get { id: String },

    /// Replace a context record
    Set {
        id: String,
        /// Data as a JSON object
        data: String,
    },

    /// Merge data into a pull request's context
    Pr {
        number: String,
        /// Data as a JSON object
        data: String,
    },

    /// List stored context ids
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG wins when set
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let root = cli.root;
    if let Commands::Init = cli.command {
        return cmd_init(&root);
    }

    let config = RepogentConfig::load_or_default(&root).context("Failed to load configuration")?;

    match cli.command {
        Commands::Run { event, event_path } => cmd_run(&config, &root, event, event_path),
        Commands::Route { kind, event_path } => cmd_route(&config, &root, &kind, event_path),
        Commands::Send {
            sender,
            receiver,
            message_type,
            payload,
        } => cmd_send(&config, &root, &sender, &receiver, &message_type, &payload),
        Commands::Receive { agent } => cmd_receive(&config, &root, &agent),
        Commands::Peek { receiver } => cmd_peek(&config, &root, receiver.as_deref()),
        Commands::Context { action } => cmd_context(&config, &root, action),
        Commands::Agents => cmd_agents(),
        Commands::Comment { issue, body } => cmd_comment(&config, &issue, &body).await,
        Commands::Ask {
            task,
            system,
            prompt,
        } => cmd_ask(&config, &task, &system, &prompt).await,
        Commands::Init => Ok(()),
    }
}

fn open_orchestrator(config: &RepogentConfig, root: &Path) -> Result<Orchestrator> {
    Orchestrator::open(config, root).context("Failed to open coordination stores")
}

/// Event payload from a file; unreadable or missing data is an empty object
fn load_event_data(path: Option<&Path>) -> Value {
    let Some(path) = path else {
        return Value::Object(Map::new());
    };
    if !path.exists() {
        warn!("Event file not found: {}", path.display());
        return Value::Object(Map::new());
    }

    fail_open("load_event_data", || {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    })
    .unwrap_or_else(|| Value::Object(Map::new()))
}

fn parse_object(raw: &str, what: &str) -> Result<Map<String, Value>> {
    let value: Value =
        serde_json::from_str(raw).with_context(|| format!("{} is not valid JSON", what))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => bail!("{} must be a JSON object", what),
    }
}

fn print_messages(messages: &[Message]) -> Result<()> {
    for message in messages {
        println!("{}", serde_json::to_string(&message.to_durable_form())?);
    }
    Ok(())
}

fn cmd_run(
    config: &RepogentConfig,
    root: &Path,
    event: Option<String>,
    event_path: Option<PathBuf>,
) -> Result<()> {
    let Some(event) = event.filter(|e| !e.trim().is_empty()) else {
        bail!("No event type provided (pass --event or set GITHUB_EVENT_NAME)");
    };
    let event_data = load_event_data(event_path.as_deref());

    let orchestrator = open_orchestrator(config, root)?;
    let report = orchestrator
        .run_cycle(&event, &event_data)
        .context("Orchestrator cycle failed")?;

    println!("{}", report.route);
    if !report.is_success() {
        bail!(
            "{} of {} messages failed to dispatch",
            report.failed,
            report.processed
        );
    }
    info!("Cycle complete: {} messages processed", report.processed);
    Ok(())
}

fn cmd_route(
    config: &RepogentConfig,
    root: &Path,
    kind: &str,
    event_path: Option<PathBuf>,
) -> Result<()> {
    let event_data = load_event_data(event_path.as_deref());
    let orchestrator = open_orchestrator(config, root)?;
    println!("{}", orchestrator.route_event(kind, &event_data));
    Ok(())
}

fn cmd_send(
    config: &RepogentConfig,
    root: &Path,
    sender: &str,
    receiver: &str,
    message_type: &str,
    payload: &str,
) -> Result<()> {
    let payload = parse_object(payload, "payload")?;
    let orchestrator = open_orchestrator(config, root)?;

    match orchestrator.send_message(sender, receiver, message_type, payload)? {
        Some(id) => {
            println!("{}", id);
            Ok(())
        }
        None => bail!("Message rejected"),
    }
}

fn cmd_receive(config: &RepogentConfig, root: &Path, agent: &str) -> Result<()> {
    let orchestrator = open_orchestrator(config, root)?;
    let messages = orchestrator.receive_messages(agent)?;
    print_messages(&messages)
}

fn cmd_peek(config: &RepogentConfig, root: &Path, receiver: Option<&str>) -> Result<()> {
    let orchestrator = open_orchestrator(config, root)?;
    let messages = orchestrator.queue().peek_all(receiver)?;
    print_messages(&messages)
}

fn cmd_context(config: &RepogentConfig, root: &Path, action: ContextCommands) -> Result<()> {
    let orchestrator = open_orchestrator(config, root)?;
    let store = orchestrator.context();

    match action {
        ContextCommands::Get { id } => match store.load(&id) {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => bail!("No context stored for {}", id),
        },
        ContextCommands::Set { id, data } => {
            let data = parse_object(&data, "data")?;
            let record = store.save(&id, &data)?;
            println!("{}", record.id);
        }
        ContextCommands::Pr { number, data } => {
            let pr_number = validate_positive_id(&number, "PR number")?;
            let data = parse_object(&data, "data")?;
            let outcome = store.save_pr_context(pr_number, &data)?;
            info!("PR {} context: {:?}", pr_number, outcome);
        }
        ContextCommands::List => {
            for id in store.list_ids()? {
                println!("{}", id);
            }
        }
    }
    Ok(())
}

fn cmd_agents() -> Result<()> {
    for agent in list_agents() {
        println!(
            "{:<20} {:<20} {}",
            agent.kind.as_str(),
            agent.name,
            agent.capabilities.join(", ")
        );
    }
    Ok(())
}

async fn cmd_comment(config: &RepogentConfig, issue: &str, body: &str) -> Result<()> {
    let issue_number = validate_positive_id(issue, "issue number")?;
    let client = GitHubClient::from_env(&config.http).context("GitHub client unavailable")?;

    if !client.post_comment(issue_number, body).await {
        bail!("Failed to post comment on #{}", issue_number);
    }
    info!("Posted comment on {}#{}", client.repo(), issue_number);
    Ok(())
}

async fn cmd_ask(config: &RepogentConfig, task: &str, system: &str, prompt: &str) -> Result<()> {
    let client = GroqClient::from_env(&config.models, &config.http)?;
    let request = CompletionRequest::for_task(&config.models, task, system, prompt);

    let answer = client.complete(&request).await.context("Completion failed")?;
    println!("{}", answer);
    Ok(())
}

fn cmd_init(root: &Path) -> Result<()> {
    info!("Initializing Repogent in {:?}", root);
    let path = RepogentConfig::write_default(root).context("Failed to write configuration")?;
    println!("Created {}", path.display());
    Ok(())
}
