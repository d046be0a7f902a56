///
/// tandem-stress - Scenario runner for the tandem synchronization layer
///
/// Runs end-to-end scenarios against the configured primitives:
/// - tandem-stress rwlock: readers and a writer contending one RwLock
/// - tandem-stress barrier: repeated Barrier rounds
/// - tandem-stress broadcast: CondVar broadcast to many waiters
/// - tandem-stress workers: workers through spawn_worker (cooperative with --cooperative)
/// - tandem-stress all: every scenario with default sizes
///

mod scenarios;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use scenarios::Report;
use tandem_core::{Config, StrategyOverride, SyncError, SyncResult};
use tandem_threads::{capabilities, runtime};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "tandem-stress")]
#[command(author, version, about = "Stress scenarios for the tandem primitives", long_about = None)]
struct Cli {
    /// Configuration file (defaults to TANDEM_* environment variables)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Force a lock strategy (auto, native, fallback)
    #[arg(long, global = true)]
    strategy: Option<String>,

    /// Run workers on the cooperative scheduler
    #[arg(long, global = true)]
    cooperative: bool,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Readers and one writer on a shared RwLock
    Rwlock {
        #[arg(long, default_value_t = 4)]
        readers: usize,

        #[arg(long, default_value_t = 1000)]
        iterations: u64,
    },

    /// Threads meeting at a Barrier for several rounds
    Barrier {
        #[arg(long, default_value_t = 3)]
        parties: u32,

        #[arg(long, default_value_t = 5)]
        rounds: usize,
    },

    /// Waiters released by a single CondVar broadcast
    Broadcast {
        #[arg(long, default_value_t = 8)]
        waiters: usize,
    },

    /// Workers started through spawn_worker
    Workers {
        #[arg(long, default_value_t = 2)]
        count: usize,

        #[arg(long, default_value_t = 10)]
        yields: usize,
    },

    /// Every scenario with default sizes
    All,
}

fn main() {
    let cli = Cli::parse();

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    init_logging(&config);

    if let Err(e) = runtime::init(config) {
        eprintln!("Error: {}", e);
        std::process::exit(2);
    }
    info!(caps = ?capabilities(), "capabilities");

    let reports = match run(cli.command) {
        Ok(reports) => reports,
        Err(e) => {
            error!(%e, "scenario failed to run");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let mut failed = 0;
    for report in &reports {
        let status = if report.passed { "ok" } else { "FAILED" };
        println!(
            "{:<10} {:<6} {} ({:.1?})",
            report.name, status, report.detail, report.elapsed
        );
        if !report.passed {
            failed += 1;
        }
    }

    if failed > 0 {
        std::process::exit(1);
    }
}

fn build_config(cli: &Cli) -> SyncResult<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };

    if let Some(strategy) = &cli.strategy {
        config.strategy.mode =
            StrategyOverride::parse(strategy).ok_or_else(|| SyncError::Config {
                reason: format!("unknown strategy '{}'", strategy),
            })?;
    }
    if cli.cooperative {
        config.scheduler.cooperative = true;
    }
    if let Some(level) = &cli.log_level {
        config.log.level = level.clone();
    }

    config.log.tracing_level()?;
    config.validate()?;
    Ok(config)
}

fn init_logging(config: &Config) {
    if let Ok(Some(level)) = config.log.tracing_level() {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .with_max_level(level)
            .init();
    }
}

fn run(command: Commands) -> SyncResult<Vec<Report>> {
    let reports = match command {
        Commands::Rwlock {
            readers,
            iterations,
        } => vec![scenarios::rwlock(readers, iterations)?],
        Commands::Barrier { parties, rounds } => vec![scenarios::barrier(parties, rounds)?],
        Commands::Broadcast { waiters } => vec![scenarios::broadcast(waiters)?],
        Commands::Workers { count, yields } => vec![scenarios::workers(count, yields)?],
        Commands::All => vec![
            scenarios::rwlock(4, 1000)?,
            scenarios::barrier(3, 5)?,
            scenarios::broadcast(8)?,
            scenarios::workers(2, 10)?,
        ],
    };
    Ok(reports)
}
