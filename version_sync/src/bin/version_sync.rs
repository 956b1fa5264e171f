use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use chrono::{Duration, Utc};
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand};
use history_ingestor::{
    extractor::NixEnvExtractor, models::channel::Channel, providers::github_rest::GithubProvider,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::prelude::*;
use version_sync::{
    config::{Config, load_config_path},
    db::migrate,
    fetcher::RateLimitedFetcher,
    orchestrator::Updater,
    period::{Frequency, Period},
    storage::{SqliteStorage, Storage},
    tz,
};

#[derive(Parser)]
#[command(version, about = "Track package versions across nixpkgs channel history")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Args)]
struct ConfigArg {
    #[arg(long, value_name = "FILE", default_value = "version-sync.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Cmd {
    /// Verify uncovered periods and record their package sets.
    Update {
        #[command(flatten)]
        config: ConfigArg,
        /// Start of the range (RFC-3339 or YYYY-MM-DD). Defaults to a year before --to.
        #[arg(long)]
        from: Option<String>,
        /// End of the range (RFC-3339 or YYYY-MM-DD). Defaults to now.
        #[arg(long)]
        to: Option<String>,
        #[arg(long, default_value_t = 7)]
        frequency_days: u32,
        /// Zone for bare dates.
        #[arg(long, default_value = "UTC")]
        tz: String,
    },
    /// Print recorded coverage.
    Coverage {
        #[command(flatten)]
        config: ConfigArg,
        #[arg(long)]
        channel: Option<String>,
    },
    /// Print every recorded version of a package.
    Versions {
        #[command(flatten)]
        config: ConfigArg,
        name: String,
    },
}

fn open_storage(cfg: &Config) -> Result<SqliteStorage> {
    migrate::run_sqlite(&cfg.database_url)?;
    SqliteStorage::open(&cfg.database_url)
}

async fn update(
    cfg: Config,
    from: Option<String>,
    to: Option<String>,
    frequency_days: u32,
    tz_name: &str,
) -> Result<()> {
    let zone: Tz = tz_name
        .parse()
        .map_err(|e| anyhow!("bad --tz {tz_name}: {e}"))?;
    let end = match to {
        Some(s) => tz::parse_cli_instant(&s, zone)?,
        None => Utc::now(),
    };
    let start = match from {
        Some(s) => tz::parse_cli_instant(&s, zone)?,
        None => end - Duration::days(365),
    };
    let target = Period::new(start, end)?;
    let frequency = Frequency::days(frequency_days)?;

    let storage = Arc::new(open_storage(&cfg)?);

    let token = shared_utils::env::get_secret_env_var("GITHUB_TOKEN");
    if token.is_none() {
        tracing::warn!("GITHUB_TOKEN not set, GitHub allows 60 unauthenticated requests per hour");
    }
    let provider = GithubProvider::new(cfg.github_config()?, token)?;
    let fetcher = Arc::new(RateLimitedFetcher::new(Arc::new(provider), cfg.fetch_policy()));
    let extractor = Arc::new(NixEnvExtractor::new(
        cfg.extractor.program.clone(),
        cfg.extractor.archive_base.clone(),
    ));
    let updater = Updater::new(storage, extractor, fetcher, cfg.update_options());

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, finishing periods in flight");
            on_signal.cancel();
        }
    });

    let outcomes = updater
        .update_database(&cfg.channel_list()?, frequency, target, cancel)
        .await?;

    let mut failed = 0usize;
    for outcome in &outcomes {
        match outcome {
            Ok(line) => println!("ok    {line}"),
            Err(line) => {
                failed += 1;
                println!("FAIL  {line}");
            }
        }
    }
    println!(
        "{} period(s) verified, {failed} failed",
        outcomes.len() - failed
    );
    if failed > 0 {
        bail!("{failed} of {} period(s) failed", outcomes.len());
    }
    Ok(())
}

async fn coverage(cfg: Config, channel: Option<String>) -> Result<()> {
    let channels = match channel {
        Some(name) => vec![name.parse::<Channel>()?],
        None => cfg.channel_list()?,
    };
    let storage = open_storage(&cfg)?;
    for channel in channels {
        for r in storage.coverage(channel).await? {
            println!("{}\t{}\t{}\t{}", r.channel, r.period, r.commit, r.state);
        }
    }
    Ok(())
}

async fn versions(cfg: Config, name: &str) -> Result<()> {
    let storage = open_storage(&cfg)?;
    let found = storage.versions_of(name).await?;
    if found.is_empty() {
        println!("no versions of {name} recorded");
    }
    for (commit, version) in found {
        println!("{version}\t{commit}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.cmd {
        Cmd::Update {
            config,
            from,
            to,
            frequency_days,
            tz,
        } => {
            let cfg = load_config_path(&config.config)?;
            update(cfg, from, to, frequency_days, &tz).await
        }
        Cmd::Coverage { config, channel } => {
            let cfg = load_config_path(&config.config)?;
            coverage(cfg, channel).await
        }
        Cmd::Versions { config, name } => {
            let cfg = load_config_path(&config.config)?;
            versions(cfg, &name).await
        }
    }
}
