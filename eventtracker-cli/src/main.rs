mod app;
mod commands;
mod permission;
mod render;
mod utils;

use std::io::IsTerminal;

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::app::App;
use crate::commands::delete::DeleteTarget;
use crate::commands::events::SortKey;

#[derive(Parser)]
#[command(name = "eventtracker")]
#[command(about = "Track events, keep them in sync and text yourself a digest")]
struct Cli {
    /// Log what the stores are doing (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in, sign out, or create an account
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
    /// Create an event (prompts for anything not given)
    New {
        title: Option<String>,

        /// Date (MM/DD/YYYY or YYYY-MM-DD)
        #[arg(short, long)]
        date: Option<String>,

        /// Time (9:00AM or 09:00)
        #[arg(short, long)]
        time: Option<String>,
    },
    /// List events
    Events {
        /// "key" keeps store order, "date" sorts by calendar date and time
        #[arg(long, value_enum, default_value_t = SortKey::Key)]
        sort: SortKey,

        /// Print the events as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Change the title, date or time of an event
    Edit {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(short, long)]
        date: Option<String>,

        #[arg(short, long)]
        time: Option<String>,
    },
    /// Delete an event by id, or by its row number in `events`
    Delete {
        #[arg(required_unless_present = "row", conflicts_with = "row")]
        id: Option<String>,

        #[arg(long)]
        row: Option<usize>,
    },
    /// Follow the event list live
    Watch {
        /// Text a fresh digest after every change
        #[arg(long)]
        digest: bool,
    },
    /// Text yourself a summary of upcoming events
    Digest,
    /// Inspect or refresh the local cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum AuthAction {
    /// Create an account and sign in
    Register {
        #[arg(long)]
        email: Option<String>,
    },
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    /// Sign in with a token from your identity provider
    Google {
        #[arg(long)]
        token: Option<String>,
    },
    Logout,
    Status,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Cached events, ordered by the date column
    List,
    /// Look up a cached event by exact title
    Get { title: String },
    /// Copy the current remote events into the cache
    Sync,
    /// Remove a cached event
    Delete { id: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose) {
        eprintln!("{}", e.to_string().red());
    }

    if let Err(e) = run(cli.command).await {
        eprintln!("{}", format!("{:#}", e).red());
        std::process::exit(1);
    }
}

async fn run(command: Commands) -> Result<()> {
    let app = App::load().await?;

    match command {
        Commands::Auth { action } => match action {
            AuthAction::Register { email } => commands::auth::register(&app, email).await,
            AuthAction::Login { email } => commands::auth::login(&app, email).await,
            AuthAction::Google { token } => commands::auth::federated(&app, token).await,
            AuthAction::Logout => commands::auth::logout(&app).await,
            AuthAction::Status => commands::auth::status(&app).await,
        },
        Commands::New { title, date, time } => commands::new::run(&app, title, date, time).await,
        Commands::Events { sort, json } => commands::events::run(&app, sort, json).await,
        Commands::Edit {
            id,
            title,
            date,
            time,
        } => commands::edit::run(&app, &id, title, date, time).await,
        Commands::Delete { id, row } => {
            let target = match (id, row) {
                (Some(id), _) => DeleteTarget::Id(id),
                (None, Some(row)) => DeleteTarget::Row(row),
                (None, None) => return Err(anyhow!("Give an event id or --row")),
            };
            commands::delete::run(&app, target).await
        }
        Commands::Watch { digest } => commands::watch::run(&app, digest).await,
        Commands::Digest => commands::digest::run(&app).await,
        Commands::Cache { action } => match action {
            CacheAction::List => commands::cache::list(&app).await,
            CacheAction::Get { title } => commands::cache::get(&app, &title).await,
            CacheAction::Sync => commands::cache::sync(&app).await,
            CacheAction::Delete { id } => commands::cache::delete(&app, &id).await,
        },
    }
}

/// Log to stderr. `RUST_LOG` wins, otherwise `warn` (or `info` with `--verbose`).
fn init_tracing(verbose: bool) -> Result<()> {
    let default_level = if verbose { "info" } else { "warn" };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}
