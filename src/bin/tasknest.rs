//! tasknest - terminal client for the task API
//!
//! Usage:
//!   tasknest signup <email> <password> --name <display name>
//!   tasknest list --status todo --sort-by dueDate --order asc
//!   tasknest add "Buy milk" --due 2026-01-10

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};
use tasknest::{
    client::{ApiClient, AuthBridge, ClientError, SessionState, TaskBoard},
    config::DEFAULT_API_URL,
    present, telemetry,
    view::{SortField, SortOrder, StatusFilter, TaskFilters},
    Session, TaskDraft, TaskStatus,
};

#[derive(Parser)]
#[command(name = "tasknest")]
#[command(about = "Manage your tasks from the terminal")]
struct Cli {
    /// Base URL of the task API
    #[arg(long, env = "TASKNEST_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Where the signed-in session is kept between runs
    #[arg(long, env = "TASKNEST_SESSION_FILE", default_value = ".tasknest-session.json")]
    session_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and sign in
    Signup {
        email: String,
        password: String,
        #[arg(long)]
        name: Option<String>,
    },
    Signin {
        email: String,
        password: String,
    },
    Signout,
    /// Ask the server who the current credential belongs to
    Whoami,
    /// List tasks with a status filter and ordering
    List {
        #[arg(long, default_value = "all")]
        status: StatusFilter,
        #[arg(long, default_value = "dueDate")]
        sort_by: SortField,
        #[arg(long, default_value = "asc")]
        order: SortOrder,
    },
    Show {
        id: String,
    },
    Add {
        title: String,
        /// Due date, YYYY-MM-DD
        #[arg(long)]
        due: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        status: Option<TaskStatus>,
    },
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        due: Option<String>,
    },
    /// Set a task's status
    Status {
        id: String,
        status: TaskStatus,
    },
    /// Shorthand for `status <id> done`
    Done {
        id: String,
    },
    Rm {
        id: String,
    },
    /// Permanently delete the signed-in account
    DeleteAccount,
    Health,
}

#[tokio::main]
async fn main() -> ExitCode {
    telemetry::init_with_default("tasknest=warn");
    let cli = Cli::parse();

    let session = SessionState::new();
    let api = ApiClient::new(cli.api_url.clone(), session.clone());
    let bridge = AuthBridge::new(api.clone(), session.clone());
    bridge.start(load_session(&cli.session_file));

    let outcome = run(cli.command, &api, &bridge).await;

    if let Err(error) = save_session(&cli.session_file, session.current()) {
        eprintln!("warning: could not update {}: {error}", cli.session_file.display());
    }
    bridge.shutdown();

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            if let ClientError::Validation(v) = &error {
                for violation in v.violations() {
                    eprintln!("  {}: {}", violation.field, violation.message);
                }
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(
    command: Commands,
    api: &ApiClient,
    bridge: &AuthBridge<ApiClient>,
) -> Result<(), ClientError> {
    let today = Local::now().date_naive();
    let board = TaskBoard::new(api.clone());

    match command {
        Commands::Signup { email, password, name } => {
            let user = bridge.sign_up(&email, &password, name.as_deref()).await?;
            println!("Account created successfully! Signed in as {}", user.email);
        }
        Commands::Signin { email, password } => {
            let user = bridge.sign_in(&email, &password).await?;
            println!("Signed in successfully! Welcome back, {}", display_name(&user.display_name, &user.email));
        }
        Commands::Signout => {
            bridge.sign_out().await?;
            println!("Signed out successfully!");
        }
        Commands::Whoami => {
            let token = api.session().token().ok_or(ClientError::Unauthenticated)?;
            let user = api.verify_token(&token).await?;
            println!("{} <{}> ({})", display_name(&user.name, &user.email), user.email, user.uid);
        }
        Commands::List { status, sort_by, order } => {
            board.fetch(TaskFilters { status, sort_by, order }).await?;
            let visible = board.visible().await;
            println!("{}", present::render_board(&visible, &board.stats(today).await, today));
        }
        Commands::Show { id } => {
            let task = api.get_task(&id).await?;
            println!("{}", present::render_task_line(&task, today));
            println!("  created {}  updated {}", task.created_at, task.updated_at);
        }
        Commands::Add { title, due, description, status } => {
            let mut draft = TaskDraft::new(title, due);
            draft.description = description;
            draft.status = status.map(|s| s.as_str().to_string());
            let task = board.add(draft).await?;
            println!("Task created successfully");
            println!("{}", present::render_task_line(&task, today));
        }
        Commands::Edit { id, title, description, due } => {
            let draft = TaskDraft {
                title,
                description,
                due_date: due,
                status: None,
            };
            let task = board.edit(&id, draft).await?;
            println!("Task updated successfully");
            println!("{}", present::render_task_line(&task, today));
        }
        Commands::Status { id, status } => set_status(&board, &id, status, today).await?,
        Commands::Done { id } => set_status(&board, &id, TaskStatus::Done, today).await?,
        Commands::Rm { id } => {
            board.remove(&id).await?;
            println!("Task deleted successfully");
        }
        Commands::DeleteAccount => {
            let user = api.session().user().ok_or(ClientError::Unauthenticated)?;
            api.delete_account(&user.uid).await?;
            bridge.shutdown();
            println!("User deleted successfully");
        }
        Commands::Health => {
            let health = api.health().await?;
            println!(
                "status: {}  persistence: {}  verifier: {}",
                health.status, health.persistence, health.verifier
            );
        }
    }
    Ok(())
}

async fn set_status(
    board: &TaskBoard<ApiClient>,
    id: &str,
    status: TaskStatus,
    today: NaiveDate,
) -> Result<(), ClientError> {
    let task = board.change_status(id, status).await?;
    println!("{}", present::render_task_line(&task, today));
    Ok(())
}

fn display_name<'a>(name: &'a Option<String>, email: &'a str) -> &'a str {
    name.as_deref().unwrap_or(email)
}

// ── Session file ───────────────────────────────────────────────

fn load_session(path: &Path) -> Option<Session> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(session) => Some(session),
        Err(error) => {
            tracing::warn!(%error, path = %path.display(), "ignoring unreadable session file");
            None
        }
    }
}

fn save_session(path: &Path, session: Option<Session>) -> std::io::Result<()> {
    match session {
        Some(session) => {
            let json = serde_json::to_string_pretty(&session)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            std::fs::write(path, json)
        }
        None if path.exists() => std::fs::remove_file(path),
        None => Ok(()),
    }
}
