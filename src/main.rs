use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use switchboard_agent::{blueprint, DialogGraph, RunLogger, StepOutcome};
use switchboard_core::config::AppConfig;
use switchboard_core::error::SwitchboardError;
use switchboard_core::event::EventBus;
use switchboard_core::state::PendingApproval;
use switchboard_core::traits::CustomerDirectory;
use switchboard_core::types::{AgentEvent, Message, Role, SessionId};
use switchboard_store::SqliteSessionStore;
use switchboard_tools::{HttpCustomerDirectory, InMemoryCustomerDirectory, ToolRegistry};

#[derive(Parser)]
#[command(name = "switchboard", version, about = "Multi-skill customer-service dialog orchestrator")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "switchboard.toml")]
    config: PathBuf,

    /// Session ID (auto-generated if not provided)
    #[arg(short, long, global = true)]
    session: Option<String>,

    /// Customer the session belongs to
    #[arg(long, global = true)]
    customer: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive REPL mode
    Repl,
    /// Send a single message and exit
    Run {
        #[arg(trailing_var_arg = true)]
        prompt: Vec<String>,
    },
    /// Approve (or deny) the calls a session is waiting on
    Approve {
        session: String,
        /// Deny instead, with this reason
        #[arg(long)]
        deny: Option<String>,
    },
    /// Print a session's message history
    History { session: String },
    /// List the calls a session is waiting on
    Pending { session: String },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("switchboard=info,warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "switchboard", &mut io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    if let Some(Commands::Config) = &cli.command {
        print_config(&config)?;
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let event_bus = Arc::new(EventBus::default());
    let graph = Arc::new(build_graph(&config, event_bus.clone(), cancel.clone())?);

    if let Some(log) = config.log.as_ref().filter(|l| l.enabled) {
        RunLogger::new(config.log_dir(), log.level).start(&event_bus, cancel.clone());
    }

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted; cancelling");
                cancel.cancel();
            }
        });
    }

    let session_id = cli
        .session
        .as_deref()
        .map(SessionId::from_str)
        .unwrap_or_default();

    match cli.command.unwrap_or(Commands::Repl) {
        Commands::Repl => {
            spawn_event_printer(&event_bus);
            graph.start_session(&session_id, cli.customer.as_deref()).await?;
            repl(&graph, &session_id, &cancel).await
        }
        Commands::Run { prompt } => {
            let prompt = prompt.join(" ");
            if prompt.trim().is_empty() {
                anyhow::bail!("Nothing to send. Usage: switchboard run <message>");
            }
            spawn_event_printer(&event_bus);
            graph.start_session(&session_id, cli.customer.as_deref()).await?;
            let outcome = step_or_report(graph.send_message(&session_id, &prompt).await)?;
            print_outcome(&session_id, &outcome);
            if outcome.is_suspended() {
                eprintln!(
                    "Session {} is waiting for approval. Run `switchboard approve {}` (or add --deny <reason>).",
                    session_id, session_id
                );
            }
            Ok(())
        }
        Commands::Approve { session, deny } => {
            spawn_event_printer(&event_bus);
            let sid = SessionId::from_str(&session);
            let approved = deny.is_none();
            let outcome = step_or_report(graph.resolve_approval(&sid, approved, deny).await)?;
            print_outcome(&sid, &outcome);
            Ok(())
        }
        Commands::History { session } => {
            let history = graph.history(&SessionId::from_str(&session)).await?;
            if history.is_empty() {
                println!("No messages in session {}.", session);
            }
            for message in &history {
                print_message(message);
            }
            Ok(())
        }
        Commands::Pending { session } => {
            let pending = graph.pending_approvals(&SessionId::from_str(&session)).await?;
            if pending.is_empty() {
                println!("Session {} is not waiting on anything.", session);
            }
            for item in &pending {
                print_pending(item);
            }
            Ok(())
        }
        Commands::Config | Commands::Completions { .. } => Ok(()),
    }
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }
    let home_config = dirs_home().map(|h| h.join(".switchboard").join("config.toml"));
    match home_config {
        Some(p) if p.exists() => {
            info!(path = %p.display(), "Using config");
            Ok(AppConfig::load(&p)?)
        }
        _ => anyhow::bail!(
            "Config file not found: {} (also looked in ~/.switchboard/config.toml)",
            path.display()
        ),
    }
}

fn print_config(config: &AppConfig) -> anyhow::Result<()> {
    let mut shown = config.clone();
    for model in std::iter::once(&mut shown.model).chain(shown.fallback_models.iter_mut()) {
        if model.api_key.is_some() {
            model.api_key = Some("***".to_string());
        }
    }
    if shown.directory.access_code.is_some() {
        shown.directory.access_code = Some("***".to_string());
    }
    println!("{}", toml::to_string_pretty(&shown).context("render config")?);
    Ok(())
}

fn build_graph(
    config: &AppConfig,
    event_bus: Arc<EventBus>,
    cancel: CancellationToken,
) -> anyhow::Result<DialogGraph> {
    let directory: Arc<dyn CustomerDirectory> = match config.directory.base_url {
        Some(_) => Arc::new(HttpCustomerDirectory::new(&config.directory)?),
        None => {
            info!("No directory configured; using the in-memory sample directory");
            Arc::new(InMemoryCustomerDirectory::with_sample())
        }
    };
    let registry = ToolRegistry::with_builtins(directory);

    let definition = blueprint::customer_service(config)?
        .build(&registry)
        .context("build dialog graph")?;

    let llm = switchboard_llm::client_from_config(config)?;
    let store = SqliteSessionStore::open(&config.store_path())?;
    info!(
        model = %config.model.model_id,
        provider = %config.model.provider,
        store = %config.store_path().display(),
        tools = registry.len(),
        "Switchboard ready"
    );

    Ok(DialogGraph::new(
        Arc::new(definition),
        Arc::new(registry),
        Arc::new(llm),
        config.model.clone(),
        Arc::new(store),
        event_bus,
    )
    .with_config(config.agent.clone())
    .with_policy(config.security.to_policy())
    .with_cancel(cancel))
}

async fn repl(graph: &DialogGraph, session_id: &SessionId, cancel: &CancellationToken) -> anyhow::Result<()> {
    eprintln!("Switchboard session {}. Type /quit to exit.", session_id);

    let stdin = io::stdin();
    loop {
        if cancel.is_cancelled() {
            break;
        }
        print!("> ");
        io::stdout().flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/history" => {
                for message in graph.history(session_id).await? {
                    print_message(&message);
                }
                continue;
            }
            "/pending" => {
                for item in graph.pending_approvals(session_id).await? {
                    print_pending(&item);
                }
                continue;
            }
            _ => {}
        }

        let mut result = graph.send_message(session_id, input).await;
        loop {
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    report_failure(&e);
                    break;
                }
            };
            print_outcome(session_id, &outcome);
            if !outcome.is_suspended() {
                break;
            }
            let (approved, reason) = ask_approval(outcome.pending().to_vec()).await?;
            result = graph.resolve_approval(session_id, approved, reason).await;
        }
    }
    Ok(())
}

/// Prompt on the terminal for a decision on a suspended batch.
async fn ask_approval(pending: Vec<PendingApproval>) -> anyhow::Result<(bool, Option<String>)> {
    tokio::task::spawn_blocking(move || {
        for item in &pending {
            print_pending(item);
        }
        let approved = dialoguer::Confirm::new()
            .with_prompt("Approve?")
            .default(false)
            .interact()
            .unwrap_or(false);
        if approved {
            return (true, None);
        }
        let reason: String = dialoguer::Input::new()
            .with_prompt("Reason")
            .allow_empty(true)
            .interact_text()
            .unwrap_or_default();
        let reason = Some(reason).filter(|r| !r.trim().is_empty());
        (false, reason)
    })
    .await
    .context("approval prompt")
}

fn step_or_report(result: switchboard_core::Result<StepOutcome>) -> anyhow::Result<StepOutcome> {
    result.map_err(|e| {
        report_failure(&e);
        anyhow::Error::new(e)
    })
}

fn report_failure(error: &SwitchboardError) {
    warn!(error = %error, "Step failed");
    println!("{}", error.user_message());
}

fn print_outcome(session_id: &SessionId, outcome: &StepOutcome) {
    if let Some(reply) = outcome.reply() {
        println!("{}", reply);
    }
    if outcome.is_suspended() {
        eprintln!(
            "[session {} waiting on {} call(s) in {}]",
            session_id,
            outcome.pending().len(),
            outcome.active_skill
        );
    }
}

fn print_message(message: &Message) {
    match message.role {
        Role::Human => println!("user: {}", message.text()),
        Role::Agent => {
            let who = message.skill.as_ref().map(|s| s.as_str()).unwrap_or("agent");
            if !message.text().is_empty() {
                println!("{}: {}", who, message.text());
            }
            for call in &message.tool_calls {
                println!("{} -> {}({})", who, call.name, truncate(&call.args.to_string(), 120));
            }
        }
        Role::Tool => println!(
            "  [{}{}] {}",
            message.tool_call_id.as_deref().unwrap_or("?"),
            if message.is_error { " error" } else { "" },
            truncate(message.text(), 200)
        ),
    }
}

fn print_pending(item: &PendingApproval) {
    eprintln!(
        "[APPROVAL {}] {} wants to call {}({})",
        &item.id[..item.id.len().min(8)],
        item.skill,
        item.call.name,
        truncate(&item.call.args.to_string(), 200)
    );
}

/// Mirror tool activity and skill changes on stderr.
fn spawn_event_printer(event_bus: &EventBus) {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(AgentEvent::ToolStart { name, .. }) => eprintln!("[tool: {}]", name),
                Ok(AgentEvent::ToolEnd { name, result, .. }) if result.is_error => {
                    eprintln!("[{}: ERROR] {}", name, truncate(&result.content, 200));
                }
                Ok(AgentEvent::SkillEntered { skill, .. }) => eprintln!("[-> {}]", skill),
                Ok(AgentEvent::SkillLeft { skill, resumed, .. }) => {
                    eprintln!("[{} -> {}]", skill, resumed)
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
