use std::sync::Arc;

use clap::{Parser, Subcommand};

use oi_monitor_core::{ConfigLoader, ReplicationSink, SessionClock};
use oi_monitor_data::{CsvExporter, PgSnapshotSource};
use oi_monitor_engine::{Monitor, MonitorConfig};
use oi_monitor_portfolio::{GitReplicationSink, NoopReplicationSink, PortfolioStore};

#[derive(Parser)]
#[command(name = "oi-monitor")]
#[command(about = "Option-chain snapshot monitor with a simulated portfolio", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor loop
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Print the persisted portfolio state
    Status {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Run { config } => {
            run_monitor(&config).await?;
        }
        Commands::Status { config } => {
            print_status(&config)?;
        }
    }

    Ok(())
}

async fn run_monitor(config_path: &str) -> anyhow::Result<()> {
    tracing::info!("Starting option-chain monitor with config: {}", config_path);

    let config = ConfigLoader::load_from(config_path)?;
    let clock = SessionClock::from_config(&config.session)?;
    let source = PgSnapshotSource::connect(&config.database).await?;
    let store = PortfolioStore::new(&config.portfolio_path);
    let exporter = config
        .export
        .enabled
        .then(|| CsvExporter::new(&config.export.dir));
    let sink: Arc<dyn ReplicationSink> = if config.replication.enabled {
        Arc::new(GitReplicationSink::new(
            &config.portfolio_path,
            &config.replication.remote,
            &config.replication.branch,
        ))
    } else {
        Arc::new(NoopReplicationSink)
    };

    let monitor_config = MonitorConfig::from_app_config(&config)?;
    let mut monitor = Monitor::new(monitor_config, source, clock, store, exporter, sink)?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received");
            let _ = shutdown_tx.send(true);
        }
    });

    monitor.run(shutdown_rx).await
}

fn print_status(config_path: &str) -> anyhow::Result<()> {
    let config = ConfigLoader::load_from(config_path)?;
    let store = PortfolioStore::new(&config.portfolio_path);
    let portfolio = store.load()?;
    let summary = portfolio.summary(None);

    println!("Portfolio: {}", store.path().display());
    println!("  Cash:           {}", summary.cash);
    println!("  Realized P&L:   {}", summary.realized_pnl);
    println!("  Trades:         {}", summary.total_trades);
    match &portfolio.position {
        Some(position) => {
            println!(
                "  Open position:  {} @ {} (snapshot {})",
                position.quantity, position.entry_price, position.entry_snapshot_id
            );
            println!("  Unrealized P&L: {}", position.unrealized_pnl);
        }
        None => println!("  Open position:  none"),
    }
    println!("  Last update:    {}", portfolio.last_update);
    Ok(())
}
