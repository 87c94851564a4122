use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use fleche_engine::wordbank::{StoreWordSource, WordBank};
use fleche_server::ServerConfig;
use fleche_store::words::WordRepo;
use fleche_store::Database;
use fleche_telemetry::{init_telemetry, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(name = "fleche", about = "Real-time multiplayer arrowword server")]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = 8090)]
    port: u16,

    /// Database file path. Defaults to ~/.fleche/fleche.db.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Skip seeding the starter dictionary when the words table is empty.
    #[arg(long)]
    no_seed: bool,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _telemetry = init_telemetry(TelemetryConfig {
        json_output: cli.json_logs,
        ..TelemetryConfig::default()
    });

    tracing::info!("starting fleche server");

    let db_path = cli
        .db_path
        .unwrap_or_else(|| dirs_home().join(".fleche").join("fleche.db"));
    let db = Database::open(&db_path)?;
    tracing::info!(path = %db_path.display(), "database opened");

    if !cli.no_seed {
        let seeded = WordRepo::new(db.clone()).seed_demo_words()?;
        if seeded > 0 {
            tracing::info!(words = seeded, "starter dictionary seeded");
        }
    }

    let bank = Arc::new(WordBank::new(Box::new(StoreWordSource::new(db.clone()))));
    bank.ensure_loaded()?;

    let config = ServerConfig {
        port: cli.port,
        ..ServerConfig::default()
    };
    let handle = fleche_server::start(config, db, bank).await?;
    tracing::info!(port = handle.port, "fleche server ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    Ok(())
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
