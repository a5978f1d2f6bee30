//! tradedash - command-line client for the trading dashboard backend.
//!
//! Signs in through the configured auth service, browses market data and
//! analyses, and manages the API keys the backend uses for live analysis.

mod app;
mod commands;

use std::io;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tradedash_core::api::{ApiError, DEFAULT_TOP_COINS_LIMIT};
use tradedash_core::settings::{FormError, SettingsField};

use app::App;

#[derive(Parser)]
#[command(name = "tradedash")]
#[command(about = "Command-line client for the trading dashboard", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account
    Signup {
        #[arg(long)]
        email: String,
    },
    /// Sign in with email and password
    Login {
        /// Defaults to the last email used
        #[arg(long)]
        email: Option<String>,
    },
    /// Sign out and forget the saved session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List the top coins by market activity
    TopCoins {
        #[arg(long, default_value_t = DEFAULT_TOP_COINS_LIMIT)]
        limit: u32,
    },
    /// Analyze one or more symbols, sent as typed, e.g. BTCUSDT
    Analyze {
        #[arg(required = true)]
        symbols: Vec<String>,
    },
    /// Show or change your API keys
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Check that the backend is up
    Health,
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the stored keys (secrets masked)
    Show,
    /// Update one or more keys; pass an empty string to clear a key
    Set {
        #[arg(long)]
        binance_api_key: Option<String>,
        #[arg(long)]
        binance_secret_key: Option<String>,
        #[arg(long)]
        openai_api_key: Option<String>,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

/// Whether the failure means the saved session is no longer accepted
fn is_unauthorized(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause.downcast_ref::<ApiError>().is_some_and(ApiError::is_unauthorized)
            || matches!(
                cause.downcast_ref::<FormError>(),
                Some(FormError::Api(ApiError::Unauthorized))
            )
    })
}

async fn run(cli: Cli) -> Result<()> {
    let mut app = App::new().await?;

    match cli.command {
        Commands::Signup { email } => commands::sign_up(&mut app, email).await,
        Commands::Login { email } => commands::login(&mut app, email).await,
        Commands::Logout => commands::logout(&app).await,
        Commands::Whoami => commands::whoami(&app),
        Commands::TopCoins { limit } => commands::top_coins(&app, limit).await,
        Commands::Analyze { symbols } => commands::analyze(&app, symbols).await,
        Commands::Settings { action } => match action {
            SettingsAction::Show => commands::show_settings(&app).await,
            SettingsAction::Set {
                binance_api_key,
                binance_secret_key,
                openai_api_key,
            } => {
                let changes = [
                    (SettingsField::BinanceApiKey, binance_api_key),
                    (SettingsField::BinanceSecretKey, binance_secret_key),
                    (SettingsField::OpenaiApiKey, openai_api_key),
                ]
                .into_iter()
                .filter_map(|(field, value)| value.map(|v| (field, v)))
                .collect();
                commands::update_settings(&app, changes).await
            }
        },
        Commands::Health => commands::health(&app).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing();
    info!("tradedash starting");

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if is_unauthorized(&e) {
                eprintln!("Your session is no longer valid. Run `tradedash login`.");
            }
            ExitCode::FAILURE
        }
    }
}
