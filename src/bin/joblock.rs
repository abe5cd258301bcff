//! joblock CLI: operator interface to the lock store.
//!
//! Inspect and clear execution and admission locks. Clearing is the only
//! recovery for a no-timeout lock whose holder died.

use std::path::Path;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use joblock::config::Config;
use joblock::job::JobRegistry;
use joblock::model::LockValue;
use joblock::store::{PgStore, Store};
use joblock::telemetry::{TelemetryConfig, init_telemetry};
use joblock::{Clock, SystemClock, keys};
use secrecy::ExposeSecret;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "joblock", about = "Inspect and clear distributed job locks")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Which job a command targets.
#[derive(clap::Args)]
struct Target {
    /// Job type name
    job_type: String,
    /// Job arguments; each is parsed as JSON, falling back to a plain string
    args: Vec<String>,
    /// Use this identifier instead of deriving one from the arguments
    #[arg(long)]
    identifier: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the lock and admission keys for a job
    Keys {
        #[command(flatten)]
        target: Target,
    },
    /// Show stored lock and admission state for a job
    Status {
        #[command(flatten)]
        target: Target,
    },
    /// Delete a job's execution lock
    Clear {
        #[command(flatten)]
        target: Target,
        /// Also delete the admission key
        #[arg(long)]
        admission: bool,
    },
    /// List stored keys
    List {
        /// Only keys starting with this prefix
        #[arg(long, default_value = "")]
        prefix: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Command::Keys { target } = &cli.command {
        let identifier = resolve_identifier(target);
        println!("Lock:       {}", keys::lock_key(&target.job_type, &identifier));
        println!("Admission:  {}", keys::admission_key(&target.job_type, &identifier));
        return Ok(());
    }

    let config = Config::from_env()?;
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "joblock".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let store = PgStore::connect(config.database_url.expose_secret()).await?;
    store.migrate().await?;

    match cli.command {
        Command::Keys { .. } => Ok(()),
        Command::Status { target } => {
            let registry = load_registry(&config.jobs_file)?;
            cmd_status(&store, &registry, &target).await
        }
        Command::Clear { target, admission } => cmd_clear(&store, &target, admission).await,
        Command::List { prefix } => cmd_list(&store, &prefix).await,
    }
}

fn parse_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn resolve_identifier(target: &Target) -> String {
    match &target.identifier {
        Some(id) => id.clone(),
        None => {
            let args: Vec<Value> = target.args.iter().map(|a| parse_arg(a)).collect();
            keys::identifier(&args)
        }
    }
}

/// Job definitions are optional here; unknown job types read as no-timeout.
fn load_registry(path: &Path) -> anyhow::Result<JobRegistry> {
    if path.exists() {
        Ok(JobRegistry::load_from_file(path)?)
    } else {
        Ok(JobRegistry::empty())
    }
}

async fn cmd_status(
    store: &PgStore,
    registry: &JobRegistry,
    target: &Target,
) -> anyhow::Result<()> {
    let timeout = registry
        .get(&target.job_type)
        .map(|c| c.timeout())
        .unwrap_or(0);
    let identifier = resolve_identifier(target);
    let now = SystemClock.now();

    let shown_identifier = if identifier.is_empty() {
        "-"
    } else {
        identifier.as_str()
    };
    let shown_timeout = if timeout == 0 {
        "none".to_string()
    } else {
        format!("{timeout}s")
    };

    println!("Job Type:   {}", target.job_type);
    println!("Identifier: {shown_identifier}");
    println!("Timeout:    {shown_timeout}");

    for (label, key) in [
        ("Lock", keys::lock_key(&target.job_type, &identifier)),
        ("Admission", keys::admission_key(&target.job_type, &identifier)),
    ] {
        println!("---");
        println!("{label:<11} {key}");
        match store.get(&key).await? {
            None => println!("State:      free"),
            Some(raw) => println!("State:      {}", describe(&raw, timeout, now)),
        }
    }

    Ok(())
}

fn describe(raw: &str, timeout: u64, now: i64) -> String {
    match LockValue::parse(raw) {
        LockValue::Held => "held (no expiry)".to_string(),
        LockValue::Until(ts) if timeout == 0 => {
            format!("held (stored expiry {ts} ignored, no timeout)")
        }
        LockValue::Until(ts) => {
            let at = DateTime::<Utc>::from_timestamp(ts, 0)
                .map(|d| d.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| ts.to_string());
            if ts < now {
                format!("stale (expired {at}, {}s ago)", now.saturating_sub(ts))
            } else {
                format!("live (until {at}, {}s left)", ts.saturating_sub(now))
            }
        }
    }
}

async fn cmd_clear(store: &PgStore, target: &Target, admission: bool) -> anyhow::Result<()> {
    let identifier = resolve_identifier(target);
    let lock_key = keys::lock_key(&target.job_type, &identifier);
    store.delete(&lock_key).await?;
    tracing::info!(lock_key, "lock cleared by operator");
    println!("Cleared: {lock_key}");

    if admission {
        let admission_key = keys::admission_key(&target.job_type, &identifier);
        store.delete(&admission_key).await?;
        tracing::info!(admission_key, "admission cleared by operator");
        println!("Cleared: {admission_key}");
    }
    Ok(())
}

async fn cmd_list(store: &PgStore, prefix: &str) -> anyhow::Result<()> {
    let rows = store.scan(prefix).await?;
    if rows.is_empty() {
        println!("No keys found.");
        return Ok(());
    }

    println!("{:<60}  VALUE", "KEY");
    println!("{}", "-".repeat(80));
    for (key, value) in &rows {
        println!("{key:<60}  {value}");
    }
    println!("\n{} key(s)", rows.len());
    Ok(())
}
