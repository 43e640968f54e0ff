//! # netquota
//!
//! Command-line front end for the usage accounting engine.
//!
//! ## Usage
//!
//! ```bash
//! netquota set --quota-gb 50 --reset-day 1 --interface wlan0
//! netquota watch            # commit every poll interval
//! netquota status           # usage against quota
//! ```

use clap::{Parser, Subcommand};
use log::{info, warn};
use std::time::Duration;

use netquota::common;
use netquota::config::{self, Config};
use netquota::display::{format_bytes, format_report};
use netquota::version::version_string;
use netquota::{ConfigUpdate, InterfaceSelector, Result, StateStore, SystemCounters, UsageEngine};

/// netquota - track network data usage against a monthly quota
#[derive(Parser)]
#[command(name = "netquota")]
#[command(version = env!("NETQUOTA_VERSION"))]
#[command(about = "Track network data usage against a monthly quota", long_about = None)]
struct Cli {
    /// Show detailed version information
    #[arg(long = "version-full")]
    version_full: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show usage against the quota (default)
    Status {
        /// Print only the total in bytes
        #[arg(long)]
        raw: bool,
    },

    /// Poll counters and commit usage at a fixed interval
    Watch {
        /// Seconds between commits (overrides tracking.poll_interval_secs)
        #[arg(long)]
        interval: Option<u64>,

        /// Stop after this many polls (runs until killed otherwise)
        #[arg(long)]
        iterations: Option<u64>,

        /// Print a status line after each commit
        #[arg(long)]
        print: bool,
    },

    /// Change quota, reset day, measured interface, or correct the usage
    Set {
        /// Monthly quota in GB (keeps the current value if omitted)
        #[arg(long)]
        quota_gb: Option<String>,

        /// Day of month the cycle resets, 1-31 (keeps the current value if omitted)
        #[arg(long)]
        reset_day: Option<String>,

        /// Usage so far this cycle in GB; replaces everything tracked until now
        #[arg(long)]
        usage_gb: Option<String>,

        /// Measure only this interface
        #[arg(long, conflicts_with = "all")]
        interface: Option<String>,

        /// Measure all interfaces combined
        #[arg(long)]
        all: bool,
    },

    /// List interfaces with their counters since boot
    Interfaces,

    /// Start a new cycle now, clearing tracked usage
    Reset,

    /// Generate example config file
    GenerateConfig,
}

fn main() -> Result<()> {
    // WARN by default, override with RUST_LOG
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    if cli.version_full {
        print!("{}", version_string());
        return Ok(());
    }

    let config = config::get_config();

    match cli.command.unwrap_or(Commands::Status { raw: false }) {
        Commands::Status { raw } => show_status(config, raw),
        Commands::Watch {
            interval,
            iterations,
            print,
        } => watch(config, interval, iterations, print),
        Commands::Set {
            quota_gb,
            reset_day,
            usage_gb,
            interface,
            all,
        } => set(config, quota_gb, reset_day, usage_gb, interface, all),
        Commands::Interfaces => list_interfaces(config),
        Commands::Reset => reset(config),
        Commands::GenerateConfig => generate_config(),
    }
}

fn show_status(config: &Config, raw: bool) -> Result<()> {
    let store = StateStore::from_config(config)?;
    let mut engine = UsageEngine::open(store, SystemCounters::new());

    if raw {
        println!("{}", engine.current_usage());
    } else {
        println!("{}", format_report(&engine.report(), &config.display));
    }
    Ok(())
}

fn watch(
    config: &Config,
    interval: Option<u64>,
    iterations: Option<u64>,
    print: bool,
) -> Result<()> {
    let store = StateStore::from_config(config)?;
    let _lock = store.lock()?;
    let interval = Duration::from_secs(interval.unwrap_or(config.tracking.poll_interval_secs).max(1));

    let mut engine = UsageEngine::open(store, SystemCounters::new())
        .with_auto_reset(config.tracking.auto_reset);
    info!(
        "Watching {} every {}s, state at {}",
        engine.selector(),
        interval.as_secs(),
        engine.store().path().display()
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        let mut polls = 0u64;
        loop {
            if iterations.is_some_and(|limit| polls >= limit) {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = &mut shutdown => break,
            }
            polls += 1;

            // A failed save keeps the usage in memory; the next commit retries it.
            if let Err(e) = engine.commit() {
                warn!("Commit failed: {}", e);
                continue;
            }
            if print {
                println!("{}", format_report(&engine.report(), &config.display));
            }
        }
    });

    // Also runs after SIGINT/SIGTERM, so a stop loses nothing since the last poll.
    engine.commit()?;
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigint, mut sigterm) =
        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Could not install signal handlers: {}", e);
                return std::future::pending().await;
            }
        };

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, committing before exit"),
        _ = sigterm.recv() => info!("Received SIGTERM, committing before exit"),
    }
}

/// Resolves on Ctrl-C.
#[cfg(not(unix))]
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, committing before exit"),
        Err(e) => {
            warn!("Could not install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

fn set(
    config: &Config,
    quota_gb: Option<String>,
    reset_day: Option<String>,
    usage_gb: Option<String>,
    interface: Option<String>,
    all: bool,
) -> Result<()> {
    let store = StateStore::from_config(config)?;
    let _lock = store.lock()?;
    let mut engine = UsageEngine::open(store, SystemCounters::new());

    let quota_gb = quota_gb.unwrap_or_else(|| engine.state().total_limit_gb.to_string());
    let reset_day = reset_day.unwrap_or_else(|| engine.state().reset_day.to_string());
    let mut update = ConfigUpdate::parse(
        &quota_gb,
        &reset_day,
        usage_gb.as_deref(),
        interface.as_deref(),
    )?;
    if all {
        update = update.with_interface(InterfaceSelector::Aggregate);
    }

    if let Some(InterfaceSelector::Named(name)) = &update.interface {
        if !SystemCounters::new().interfaces().contains(name) {
            warn!("Interface {} is not present right now; usage counts once it appears", name);
        }
    }

    engine.set_config(update)?;
    println!("{}", format_report(&engine.report(), &config.display));
    Ok(())
}

fn list_interfaces(config: &Config) -> Result<()> {
    let store = StateStore::from_config(config)?;
    let selected = store.load().selector();

    for (name, counters) in SystemCounters::new().per_interface() {
        let marker = if selected == InterfaceSelector::Named(name.clone()) {
            "*"
        } else {
            " "
        };
        println!(
            "{} {:<16} sent {:>12}  received {:>12}",
            marker,
            name,
            format_bytes(counters.bytes_sent),
            format_bytes(counters.bytes_received)
        );
    }
    if selected.is_aggregate() {
        println!("(measuring all interfaces)");
    }
    Ok(())
}

fn reset(config: &Config) -> Result<()> {
    let store = StateStore::from_config(config)?;
    let _lock = store.lock()?;
    let mut engine = UsageEngine::open(store, SystemCounters::new());

    engine.reset_cycle(common::today())?;
    println!("{}", format_report(&engine.report(), &config.display));
    Ok(())
}

fn generate_config() -> Result<()> {
    let config_path = Config::default_config_path()?;
    println!("Generating example config file at: {}", config_path.display());

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&config_path, Config::example_toml())?;

    println!("Edit {} to customize settings", config_path.display());
    Ok(())
}
