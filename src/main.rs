//! Rally-Graph main entry point
//!
//! This is the command-line interface for the Rally-Graph results crawler.

use clap::Parser;
use rally_graph::audit::{purge_duplicates, run_audit, AuditScope};
use rally_graph::config::{load_config_with_hash, Config, SeedEntry};
use rally_graph::crawler::{run_crawl, Frontier};
use rally_graph::output::{load_statistics, print_statistics, write_audit_markdown};
use rally_graph::storage::{self, SqliteStorage};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Rally-Graph: an incremental crawler for public sports-results sites
///
/// Rally-Graph walks player profiles breadth-first from seeded players,
/// stores a deduplicated record of their matches and reports what it could
/// not trust.
#[derive(Parser, Debug)]
#[command(name = "rally-graph")]
#[command(version)]
#[command(about = "An incremental crawler for public sports-results sites", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Extra seed player to (re-)scrape; may be repeated
    #[arg(long = "seed", value_name = "ID")]
    seeds: Vec<i64>,

    /// Override the configured per-run player limit (-1 = unlimited)
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    max_players: Option<i64>,

    /// Validate config and print the effective settings
    #[arg(long, group = "mode")]
    dry_run: bool,

    /// Show frontier and store statistics and exit
    #[arg(long, group = "mode")]
    status: bool,

    /// Return failed players to pending and exit
    #[arg(long, group = "mode")]
    reset_failed: bool,

    /// Return players stuck in processing to pending and exit
    #[arg(long, group = "mode")]
    reset_stuck: bool,

    /// Delete every frontier item and exit
    #[arg(long, group = "mode")]
    clear_queue: bool,

    /// Run the integrity audit over stored matches and exit
    #[arg(long, group = "mode")]
    audit: bool,

    /// Limit the audit to one player
    #[arg(long, value_name = "ID", requires = "audit")]
    player: Option<i64>,

    /// Limit the audit to one tournament of that player
    #[arg(long, value_name = "ID", requires = "player")]
    tournament: Option<i64>,

    /// Delete all but the oldest row of every duplicate match group and exit
    #[arg(long, group = "mode")]
    purge_duplicates: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.status {
        handle_status(&config)?;
    } else if cli.reset_failed || cli.reset_stuck || cli.clear_queue {
        handle_queue_command(&config, &cli)?;
    } else if cli.audit {
        handle_audit(&config, cli.player, cli.tournament)?;
    } else if cli.purge_duplicates {
        handle_purge(&config)?;
    } else {
        handle_crawl(config, &config_hash, &cli).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("rally_graph=info,warn"),
            1 => EnvFilter::new("rally_graph=debug,info"),
            2 => EnvFilter::new("rally_graph=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn open_storage(config: &Config) -> Result<SqliteStorage, Box<dyn std::error::Error>> {
    Ok(storage::open_storage(Path::new(&config.output.database_path))?)
}

/// Handles --dry-run: prints the effective settings
fn handle_dry_run(config: &Config) {
    println!("=== Rally-Graph Dry Run ===\n");

    let unlimited = |v: i64| {
        if v < 0 {
            "unlimited".to_string()
        } else {
            v.to_string()
        }
    };

    println!("Crawler:");
    println!("  Max depth: {}", unlimited(config.crawler.max_depth.into()));
    println!("  Max players per run: {}", unlimited(config.crawler.max_players));
    println!("  Request timeout: {}s", config.crawler.request_timeout_secs);
    println!("  Idle poll: {}s", config.crawler.idle_poll_secs);

    println!("\nPacing:");
    println!("  Base delay: {}ms", config.pacing.base_delay_ms);
    println!(
        "  Bounds: {}ms .. {}ms",
        config.pacing.min_delay_ms, config.pacing.max_delay_ms
    );

    println!("\nSource:");
    println!("  Base URL: {}", config.source.base_url);
    println!("  Profile path: {}", config.source.profile_path);
    println!("  Season query: ?{}=<code>", config.source.season_query);
    println!("  Respect robots.txt: {}", config.source.respect_robots);

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Integrity report: {}", config.output.report_path);

    println!("\nSeeds ({}):", config.seeds.len());
    for seed in &config.seeds {
        println!("  - player {} (priority {})", seed.player_id, seed.priority);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles --status: frontier counts, recent failures and store totals
fn handle_status(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(config)?;
    let stats = load_statistics(&storage, 10)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the operator queue commands
fn handle_queue_command(config: &Config, cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let storage = open_storage(config)?;
    let frontier = Frontier::new(Arc::new(Mutex::new(storage)), config.crawler.depth_limit());

    if cli.reset_failed {
        let count = frontier.reset_failed()?;
        println!("✓ {} failed players returned to pending", count);
    } else if cli.reset_stuck {
        let count = frontier.reset_stuck()?;
        println!("✓ {} stuck players returned to pending", count);
    } else if cli.clear_queue {
        let count = frontier.clear()?;
        println!("✓ Removed {} frontier items", count);
    }

    Ok(())
}

/// Handles --audit: prints the report and writes it as markdown
fn handle_audit(
    config: &Config,
    player: Option<i64>,
    tournament: Option<i64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let scope = match (player, tournament) {
        (Some(player_id), Some(tournament_id)) => {
            AuditScope::PlayerTournament(player_id, tournament_id)
        }
        (Some(player_id), None) => AuditScope::Player(player_id),
        _ => AuditScope::All,
    };

    let storage = open_storage(config)?;
    let report = run_audit(&storage, scope)?;
    print!("{}", report);

    let report_path = Path::new(&config.output.report_path);
    let generated_at = chrono::Utc::now().to_rfc3339();
    write_audit_markdown(&report, &generated_at, report_path)?;
    println!("\n✓ Report written to: {}", report_path.display());

    Ok(())
}

/// Handles --purge-duplicates
fn handle_purge(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut storage = open_storage(config)?;
    let removed = purge_duplicates(&mut storage)?;
    println!("✓ Removed {} duplicate matches", removed);
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: Config,
    config_hash: &str,
    cli: &Cli,
) -> Result<(), Box<dyn std::error::Error>> {
    let max_players = match cli.max_players {
        Some(n) => u64::try_from(n).ok(),
        None => config.crawler.player_limit(),
    };
    let extra_seeds: Vec<SeedEntry> = cli
        .seeds
        .iter()
        .map(|&player_id| SeedEntry {
            player_id,
            priority: 0,
        })
        .collect();

    tracing::info!(
        "Seeds: {} configured, {} from the command line; player limit: {:?}",
        config.seeds.len(),
        extra_seeds.len(),
        max_players
    );

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current step");
            signal_token.cancel();
        }
    });

    match run_crawl(config, config_hash, &extra_seeds, max_players, cancel).await {
        Ok(report) => {
            println!();
            report.print();
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
