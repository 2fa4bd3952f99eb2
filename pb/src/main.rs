//! PlanBridge terminal driver
//!
//! Drives a full plan lifecycle from the command line: submit a goal,
//! review the proposal, answer clarifications, watch streamed progress.

use std::fs;
use std::io::Write as IoWrite;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use planbridge::cli::{Cli, Command};
use planbridge::protocol::format_error_block;
use planbridge::{
    ApprovalRequest, ClientEvent, Config, ConnectionManager, EventBus, HttpBackend, MessageWriter, PlanBackend,
    PlanSession, SessionHandle, ToastKind, UiEffects, WsTransport,
};

fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("planbridge")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Log to file so stdout stays clean for the interactive driver
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("planbridge.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(api = %config.backend.api_base_url, ws = %config.backend.websocket_url(), "PlanBridge loaded config");

    match cli.command {
        Command::Run { goal, auto_approve } => cmd_run(&config, &goal, auto_approve).await,
        Command::Plans => cmd_plans(&config).await,
        Command::Show { plan_id } => cmd_show(&config, &plan_id).await,
    }
}

/// Toasts and navigation rendered as terminal lines
struct CliEffects;

impl UiEffects for CliEffects {
    fn show_toast(&self, text: &str, kind: ToastKind) {
        match kind {
            ToastKind::Error => eprintln!("{} {}", "!".red().bold(), text),
            ToastKind::Success => println!("{} {}", "+".green().bold(), text),
            ToastKind::Info => println!("{} {}", "*".blue().bold(), text),
        }
    }

    fn navigate_home(&self) {
        println!("{}", "(left plan view)".dimmed());
    }

    fn scroll_to_latest(&self) {}
}

async fn cmd_run(config: &Config, goal: &str, auto_approve: bool) -> Result<()> {
    let bus = Arc::new(EventBus::with_default_capacity());
    let backend: Arc<dyn PlanBackend> = Arc::new(HttpBackend::from_config(config)?);
    let conn = ConnectionManager::spawn(
        config.backend.websocket_url(),
        Arc::new(WsTransport),
        bus.clone(),
        &config.reconnect,
    );
    let writer = MessageWriter::new(backend.clone(), bus.clone(), config.persistence.refresh_delay());
    let (session, _snapshots) = PlanSession::spawn(backend, conn.clone(), writer, Arc::new(CliEffects), &bus);

    let mut events = bus.subscribe();
    conn.connect().await.context("Failed to open realtime connection")?;

    let plan_id = session.submit_goal(goal).await?;
    println!("{} {}", "plan".bold(), plan_id);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match events.recv().await {
            Ok(ClientEvent::ApprovalRequest { request, .. }) => {
                render_approval(&request);
                if !handle_approval(&session, &mut lines, auto_approve).await? {
                    break;
                }
            }

            Ok(ClientEvent::StreamingChunk { text, .. }) => {
                print!("{}", text.dimmed());
                let _ = std::io::stdout().flush();
            }

            Ok(ClientEvent::Clarification { request, .. }) => {
                println!("\n{} {}", "?".yellow().bold(), request.question);
                print!("> ");
                let _ = std::io::stdout().flush();
                let answer = lines.next_line().await?.unwrap_or_default();
                if let Err(e) = session.answer_clarification(answer.trim()).await {
                    eprintln!("{} {}", "!".red().bold(), e);
                }
            }

            Ok(ClientEvent::AgentMessage { message, .. }) => {
                println!("{} {}", format!("[{}]", message.agent_id).cyan(), message.content);
            }

            Ok(ClientEvent::FinalResult { content, .. }) => {
                println!("\n{} {}", "done".green().bold(), content);
                break;
            }

            Ok(ClientEvent::BackendError { detail, .. }) => {
                eprintln!("{}", format_error_block(&detail).red());
                break;
            }

            Ok(ClientEvent::ReconnectExhausted { attempts }) => {
                eprintln!("{} connection lost after {} attempts", "!".red().bold(), attempts);
                break;
            }

            Ok(_) => continue,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }

    // Let the final persistence write and list refresh settle
    tokio::time::sleep(config.persistence.refresh_delay() + std::time::Duration::from_millis(200)).await;

    session.shutdown().await.ok();
    conn.shutdown().await.ok();
    Ok(())
}

fn render_approval(request: &ApprovalRequest) {
    println!("\n{}", "proposed plan".bold().underline());
    if let Some(facts) = &request.facts {
        println!("{}", facts.dimmed());
    }
    for step in &request.steps {
        if step.is_heading {
            println!("{}", step.action.bold());
        } else {
            match &step.agent {
                Some(agent) => println!("  - {} {}", step.action, format!("({})", agent).cyan()),
                None => println!("  - {}", step.action),
            }
        }
    }
}

/// Returns false when the plan was rejected and the run should end
async fn handle_approval(session: &SessionHandle, lines: &mut Lines<BufReader<Stdin>>, auto_approve: bool) -> Result<bool> {
    let approved = if auto_approve {
        println!("{}", "auto-approving".dimmed());
        true
    } else {
        print!("approve? [y/N] ");
        let _ = std::io::stdout().flush();
        let line = lines.next_line().await?.unwrap_or_default();
        matches!(line.trim(), "y" | "Y" | "yes")
    };

    if approved {
        if let Err(e) = session.approve().await {
            eprintln!("{} {}", "!".red().bold(), e);
        }
        Ok(true)
    } else {
        session.reject(None).await?;
        println!("{}", "plan rejected".yellow());
        Ok(false)
    }
}

async fn cmd_plans(config: &Config) -> Result<()> {
    let backend = HttpBackend::from_config(config)?;
    let plans = backend.list_plans().await?;

    if plans.is_empty() {
        println!("{}", "no plans".dimmed());
        return Ok(());
    }

    for plan in plans {
        println!("{}  {}  {}", plan.id.bold(), format!("[{}]", plan.status).cyan(), plan.goal);
    }
    Ok(())
}

async fn cmd_show(config: &Config, plan_id: &str) -> Result<()> {
    let backend = HttpBackend::from_config(config)?;
    let snapshot = backend.fetch_plan(plan_id).await?;

    println!("{} {}", "plan".bold(), snapshot.plan.id);
    println!("{} {}", "goal".bold(), snapshot.plan.goal);
    println!("{} {}", "status".bold(), snapshot.plan.status);
    println!();

    for message in &snapshot.messages {
        println!("{} {}", format!("[{}]", message.agent_id).cyan(), message.content);
    }
    if let Some(streaming) = &snapshot.streaming_message {
        println!("{}", streaming.dimmed());
    }
    Ok(())
}
