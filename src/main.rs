use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use redlimit::config::RedlimitConfig;
use redlimit::{Decision, RateLimiter, RedisStore};

/// Distributed sliding-window rate limiter backed by Redis.
#[derive(Debug, Parser)]
#[command(name = "redlimit", version, about)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "REDLIMIT_CONFIG")]
    config: Option<PathBuf>,

    /// Redis URL, overriding the configuration file
    #[arg(long, env = "REDLIMIT_REDIS_URL")]
    redis_url: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check (and record) requests for a key
    Check {
        key: String,
        /// Number of consecutive checks
        #[arg(short = 'n', long, default_value_t = 1)]
        times: u32,
    },
    /// Load the procedure into the store's script cache
    Prime,
    /// Print the configured window and limits
    Limits,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let mut config = match &cli.config {
        Some(path) => RedlimitConfig::from_file(path)?,
        None => RedlimitConfig::default(),
    };
    if let Some(url) = cli.redis_url {
        config.store.url = url;
        config.validate()?;
    }

    match cli.command {
        Command::Limits => print_limits(&config),
        Command::Prime => {
            let limiter = build_limiter(&config).await?;
            limiter.prepare().await?;
            println!("{}", limiter.procedure().sha());
        }
        Command::Check { key, times } => {
            let limiter = build_limiter(&config).await?;
            for i in 1..=times {
                match limiter.check(&key).await? {
                    Decision::Allowed { remaining } => {
                        println!("{}\t{}\tallowed\tremaining={}", i, key, remaining)
                    }
                    Decision::Breached => println!("{}\t{}\tbreached", i, key),
                }
            }
        }
    }

    Ok(())
}

async fn build_limiter(config: &RedlimitConfig) -> anyhow::Result<RateLimiter> {
    let store = Arc::new(RedisStore::connect(&config.store.url).await?);
    let limiter = RateLimiter::from_config(
        &config.limiter,
        &config.store.key_prefix,
        config.store.timeout(),
        store,
    )?;
    info!(
        window_secs = limiter.window_secs(),
        keys = limiter.limits().len(),
        "Rate limiter initialized"
    );
    Ok(limiter)
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_limits(config: &RedlimitConfig) {
    println!("window_secs\t{}", config.limiter.effective_window());

    let mut limits: Vec<_> = config.limiter.limits.iter().collect();
    limits.sort();
    for (key, limit) in limits {
        println!("{}\t{}", key, limit);
    }
}
