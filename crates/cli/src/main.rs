use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use corral_api::{InProcService, ResourceService, RetryPolicy, RetryingService, Seed};
use corral_console::{Console, ToastBuffer};
use corral_core::{Project, ResourceKind, Task, TaskStatus, User};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::info;

mod shell;

use shell::{Command, Shell, Step};

#[derive(Parser, Debug)]
#[command(name = "corralctl", version, about = "Corral admin console")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// JSON file with initial users/projects/tasks (default: built-in demo data)
    #[arg(long = "seed", global = true, env = "CORRAL_SEED")]
    seed: Option<PathBuf>,

    /// Id of the signed-in user
    #[arg(long = "me", global = true, env = "CORRAL_ME")]
    me: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive console (default)
    Shell,
    /// Print one page of a resource and exit
    Ls {
        /// users, projects or tasks
        kind: String,
        /// 1-based page number
        #[arg(long = "page", default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        page: u32,
    },
}

fn init_tracing() {
    let env = std::env::var("CORRAL_LOG").unwrap_or_else(|_| "warn".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("CORRAL_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid CORRAL_METRICS_ADDR; expected host:port");
        }
    }
}

fn demo_seed() -> Seed {
    let user = |id: &str, email: &str, name: &str, superuser: bool| User {
        id: id.into(),
        email: email.into(),
        full_name: Some(name.into()),
        is_active: true,
        is_superuser: superuser,
    };
    let project = |id: &str, name: &str, desc: &str| Project {
        id: id.into(),
        name: name.into(),
        description: Some(desc.into()),
        owner_id: Some("u1".into()),
    };
    let task = |id: &str, project: &str, title: &str, status: TaskStatus, who: Option<&str>| Task {
        id: id.into(),
        project_id: project.into(),
        title: title.into(),
        description: None,
        status,
        assigned_member_id: who.map(Into::into),
    };
    Seed {
        users: vec![
            user("u1", "admin@corral.dev", "Admin", true),
            user("u2", "ann@corral.dev", "Ann Lee", false),
            user("u3", "bo@corral.dev", "Bo Park", false),
        ],
        projects: vec![
            project("p1", "Alpha", "Onboarding portal"),
            project("p2", "Beta", "Billing rewrite"),
        ],
        tasks: vec![
            task("t1", "p1", "Draft welcome email", TaskStatus::Completed, Some("u2")),
            task("t2", "p1", "Set up accounts", TaskStatus::InProgress, Some("u3")),
            task("t3", "p1", "Schedule kickoff", TaskStatus::Pending, None),
            task("t4", "p2", "Audit invoices", TaskStatus::Pending, Some("u2")),
            task("t5", "p2", "Pick payment provider", TaskStatus::Pending, None),
            task("t6", "p2", "Migrate customers", TaskStatus::Pending, None),
        ],
    }
}

fn load_seed(path: Option<&PathBuf>) -> Result<Seed> {
    let Some(path) = path else {
        return Ok(demo_seed());
    };
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading seed {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing seed {}", path.display()))
}

fn build_console(cli: &Cli, toasts: Arc<ToastBuffer>) -> Result<Console> {
    let seed = load_seed(cli.seed.as_ref())?;
    info!(users = seed.users.len(), projects = seed.projects.len(), tasks = seed.tasks.len(), "seed loaded");
    let backend: Arc<dyn ResourceService> = Arc::new(InProcService::from_seed(seed).with_acting_user(cli.me.clone()));
    let service: Arc<dyn ResourceService> = Arc::new(RetryingService::new(backend, RetryPolicy::from_env()));
    Ok(Console::new(service, toasts).signed_in_as(cli.me.clone()))
}

async fn run_shell(mut shell: Shell) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    stdout.write_all(b"corral console; type help for commands\n").await?;
    loop {
        let prompt: &[u8] = if shell.awaiting_confirmation() { b"? " } else { b"> " };
        stdout.write_all(prompt).await?;
        stdout.flush().await?;
        let line = tokio::select! {
            line = lines.next_line() => line.context("reading stdin")?,
            _ = signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        match shell.handle_line(&line).await {
            Step::Print(out) if out.is_empty() => {}
            Step::Print(out) => {
                stdout.write_all(out.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
            }
            Step::Quit => break,
        }
    }
    info!("console closed");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let toasts = Arc::new(ToastBuffer::new());
    let console = build_console(&cli, toasts.clone())?;
    let mut shell = Shell::new(console, toasts, cli.output);

    match cli.command {
        None | Some(Commands::Shell) => run_shell(shell).await?,
        Some(Commands::Ls { ref kind, page }) => {
            let kind = ResourceKind::from_str(kind)?;
            let out = shell.exec(Command::Ls { kind, page: Some(page) }).await;
            println!("{}", out);
        }
    }
    Ok(())
}
