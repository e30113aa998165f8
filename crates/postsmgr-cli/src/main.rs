//! postsmgr - a terminal client for the Posts Manager API.
//!
//! Sign in, then list, create, edit and delete posts from the command line.
//! The session survives between runs according to the configured backend.

mod app;
mod format;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use postsmgr_core::config::SessionBackend;
use postsmgr_core::Config;

use app::App;

/// Log file name prefix inside the log directory
const LOG_FILE_PREFIX: &str = "postsmgr.log";

#[derive(Debug, Parser)]
#[command(name = "postsmgr", version, about = "Manage posts on a Posts Manager server")]
struct Cli {
    /// API base URL, e.g. http://localhost:8000/api
    #[arg(long, global = true, env = "POSTS_API_URL")]
    api_url: Option<String>,

    /// Keep the session in memory only for this run
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    /// Create an account and sign in
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
    /// Sign out and forget the session
    Logout,
    /// Show the signed-in user as the server sees it
    Whoami,
    /// Show local session state without contacting the server
    Status,
    /// List all posts
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show one post
    Show {
        id: i64,
        #[arg(long)]
        json: bool,
    },
    /// Create a post
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Image file to attach
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Change a post's title, description or image
    Update {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Delete one or more posts
    Delete {
        #[arg(required = true)]
        ids: Vec<i64>,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
}

/// Initialize the tracing subscriber for logging.
///
/// Stderr always gets events at the `RUST_LOG` level (default `warn`). With a
/// log directory configured, a daily-rolling file gets the same events.
fn init_tracing(log_dir: Option<&PathBuf>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let (mut config, rejected_env) = Config::load()?;
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }
    if cli.ephemeral {
        config.session_backend = SessionBackend::Memory;
    }

    let _guard = init_tracing(config.log_dir.as_ref());
    for message in &rejected_env {
        warn!("{}", message);
    }
    info!(api = %config.api_base_url, "postsmgr starting");

    let mut app = App::new(config)?;
    let result = match cli.command {
        Command::Login { email } => app.login(email).await,
        Command::Register { name, email } => app.register(name, email).await,
        Command::Logout => app.logout().await,
        Command::Whoami => app.whoami().await,
        Command::Status => {
            app.status();
            Ok(())
        }
        Command::List { json } => app.list(json).await,
        Command::Show { id, json } => app.show(id, json).await,
        Command::Create {
            title,
            description,
            image,
        } => app.create(title, description, image).await,
        Command::Update {
            id,
            title,
            description,
            image,
        } => app.update(id, title, description, image).await,
        Command::Delete { ids, yes } => app.delete(ids, yes).await,
    };

    app.handle_events();
    result
}
