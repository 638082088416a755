use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use demobank::config::Settings;
use demobank::db::DbClient;
use demobank::rest::{self, AppState};
use demobank::seed::{self, SeedData};

#[derive(Parser)]
#[command(name = "demobank", about = "Seeds and serves a demo banking dataset")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the customer account and transaction-summary endpoints.
    Serve {
        #[arg(long, default_value = "127.0.0.1:3000")]
        listen: SocketAddr,
    },
    /// Create the tables and insert the seed dataset.
    Seed {
        /// JSON file with customers/accounts/transactions; defaults to the
        /// built-in demo rows.
        #[arg(long)]
        data: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env().context("failed to resolve settings")?;

    match cli.command {
        Command::Serve { listen } => serve(&settings, listen).await,
        Command::Seed { data } => {
            let data = match data {
                Some(path) => SeedData::from_json_file(&path)?,
                None => SeedData::builtin(),
            };
            let report = seed::run(&settings, &data).await?;
            info!(
                "seeded database: {} rows inserted, {} skipped",
                report.inserted, report.skipped
            );
            Ok(())
        }
    }
}

async fn serve(settings: &Settings, listen: SocketAddr) -> anyhow::Result<()> {
    let db = DbClient::connect(&settings.database_url)
        .await
        .context("failed to connect to database")?;
    let ui_origin = settings
        .ui_origin
        .parse()
        .with_context(|| format!("invalid UI origin {:?}", settings.ui_origin))?;

    let app = rest::router(AppState::new(db), ui_origin);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!("Listening on {}", listen);
    axum::serve(listener, app).await?;

    Ok(())
}
