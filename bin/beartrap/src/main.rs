mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "beartrap")]
#[command(about = "Session bearer-token acquisition for browser-gated accounts", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the stored account list
    Accounts {
        #[command(subcommand)]
        command: AccountsCommands,
    },

    /// Inspect and manage captured token records
    Tokens {
        #[command(subcommand)]
        command: TokensCommands,
    },

    /// Run one acquisition pass over the given accounts
    Fetch {
        /// Accounts to process (defaults to every stored account, in order)
        emails: Vec<String>,

        /// Run the browser headless (interactive logins will fail fast)
        #[arg(long)]
        headless: bool,

        /// Wipe each account's profile and force a clean login
        #[arg(long)]
        force_login: bool,

        /// Emit machine-readable JSON instead of the table
        #[arg(long)]
        json: bool,

        /// POST successful results to the configured submission endpoint
        #[arg(long)]
        submit: bool,

        /// Upsert successful results into the configured document store
        #[arg(long)]
        docstore: bool,
    },

    /// Run recurring passes with a fixed delay between them
    Daemon {
        /// Delay between passes, in seconds
        #[arg(long, default_value_t = 3600)]
        interval_secs: u64,

        #[arg(long)]
        headless: bool,

        #[arg(long)]
        force_login: bool,

        #[arg(long)]
        submit: bool,

        #[arg(long)]
        docstore: bool,
    },

    /// Run environment diagnostics
    Doctor,
}

#[derive(Subcommand)]
enum AccountsCommands {
    /// Add an account (or update its stored password)
    Add {
        email: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Remove an account, its profile, and its token record
    Remove { email: String },
    /// List stored accounts
    List,
    /// Remove every account, profile, and token record
    Clear,
}

#[derive(Subcommand)]
enum TokensCommands {
    /// List captured token records
    List {
        #[arg(long)]
        json: bool,
    },
    /// Wipe all profiles and the entire token map
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Accounts { command } => match command {
            AccountsCommands::Add { email, password } => {
                commands::accounts::add(&email, password).await?;
            }
            AccountsCommands::Remove { email } => {
                commands::accounts::remove(&email).await?;
            }
            AccountsCommands::List => {
                commands::accounts::list().await?;
            }
            AccountsCommands::Clear => {
                commands::accounts::clear().await?;
            }
        },

        Commands::Tokens { command } => match command {
            TokensCommands::List { json } => {
                commands::tokens::list(json).await?;
            }
            TokensCommands::Clear => {
                commands::tokens::clear().await?;
            }
        },

        Commands::Fetch {
            emails,
            headless,
            force_login,
            json,
            submit,
            docstore,
        } => {
            commands::fetch::run(commands::fetch::FetchArgs {
                emails,
                headless,
                force_login,
                json,
                submit,
                docstore,
            })
            .await?;
        }

        Commands::Daemon {
            interval_secs,
            headless,
            force_login,
            submit,
            docstore,
        } => {
            commands::daemon_cmd::run(interval_secs, headless, force_login, submit, docstore)
                .await?;
        }

        Commands::Doctor => {
            commands::doctor::run().await?;
        }
    }

    Ok(())
}
