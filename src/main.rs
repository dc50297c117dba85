//! # LarvaCare — larval feeding scheduler
//!
//! Tracks larval batches, their feeding schedule, and sends SMS reminders
//! for overdue batches.
//!
//! Usage:
//!   larvacare add --id B1 --species "Attacus atlas" --count 50 --phone +15550001111 --every 2
//!   larvacare list                       # Active batches, most urgent first
//!   larvacare feed B1                    # Record a feeding
//!   larvacare sweep                      # One overdue sweep
//!   larvacare run                        # Sweep periodically until Ctrl-C

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use larvacare_core::LarvaCareConfig;
use larvacare_scheduler::{
    NewBatch, NotificationScheduler, Nursery, SweepPolicy, gateway_from_config, spawn_scheduler,
};
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "larvacare",
    version,
    about = "🐛 LarvaCare — larval feeding schedules and SMS reminders"
)]
struct Cli {
    /// Config file (default: ~/.larvacare/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the data directory
    #[arg(long, global = true)]
    data_dir: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a new batch
    Add {
        #[arg(long)]
        id: String,
        #[arg(long)]
        species: String,
        /// Number of larvae
        #[arg(long)]
        count: u32,
        /// Phone number for reminders
        #[arg(long)]
        phone: String,
        /// Days between feedings
        #[arg(long)]
        every: u32,
        /// First feeding due (RFC 3339). Defaults to one interval from now.
        #[arg(long)]
        next_due: Option<DateTime<Utc>>,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// List active batches, most urgent first
    List,
    /// Record a feeding
    Feed { id: String },
    /// Mark a batch completed
    Complete { id: String },
    /// Remove completed batches
    Purge,
    /// Show the feeding log, newest first
    Log {
        #[arg(long)]
        batch: Option<String>,
    },
    /// Export batches and log as CSV
    Export {
        /// Write to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Run one overdue sweep now
    Sweep,
    /// Send a reminder for one batch immediately
    Notify { id: String },
    /// Dashboard counters
    Summary,
    /// Delete every log entry
    ClearLog {
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },
    /// Sweep periodically until interrupted
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "larvacare=debug,larvacare_scheduler=debug,larvacare_core=debug"
    } else {
        "larvacare=info,larvacare_scheduler=info,larvacare_core=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => {
            let mut config = LarvaCareConfig::load_from(path)?;
            config.apply_env();
            config
        }
        None => LarvaCareConfig::load()?,
    };
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    let mut nursery = Nursery::open(&config)
        .with_context(|| format!("opening data in {}", config.data_path().display()))?;
    let scheduler = NotificationScheduler::new(
        Arc::from(gateway_from_config(&config.sms)),
        SweepPolicy::from(&config.scheduler),
    );
    let now = Utc::now();

    match cli.command {
        Command::Add { id, species, count, phone, every, next_due, notes } => {
            let mut new = NewBatch::starting_at(&id, &species, count, &phone, every, now);
            new.notes = notes;
            if let Some(due) = next_due {
                new.next_feeding_due = due;
            }
            new.validate()?;
            if nursery.add(new) {
                println!("✅ Batch '{id}' added");
            } else {
                anyhow::bail!("batch '{id}' already exists");
            }
        }
        Command::List => {
            let active = nursery.list_active();
            if active.is_empty() {
                println!("No active batches.");
            }
            for b in active {
                let state = match b.overdue_by(now) {
                    Some(late) => format!("OVERDUE {}", human(late)),
                    None => format!("due in {}", human(b.next_feeding_due - now)),
                };
                println!(
                    "{:<12} {:<20} {:>5} larvae  every {}d  fed {}x  {}",
                    b.batch_id, b.species, b.larval_count, b.feeding_interval_days, b.total_feedings, state
                );
            }
        }
        Command::Feed { id } => report(nursery.mark_fed(&id), &id, "fed"),
        Command::Complete { id } => report(nursery.complete(&id), &id, "completed"),
        Command::Purge => println!("🧹 Removed {} completed batches", nursery.purge_completed()),
        Command::Log { batch } => {
            let entries = match batch {
                Some(id) => nursery.log().for_batch(&id),
                None => nursery.log().all(),
            };
            for e in entries {
                println!(
                    "{}  {:<12} {:<18} {}",
                    e.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    e.batch_id,
                    e.event_kind.to_string(),
                    e.activity
                );
            }
        }
        Command::Export { out } => {
            let text = nursery.export()?;
            match out {
                Some(path) => {
                    std::fs::write(&path, text)?;
                    println!("📄 Exported to {}", path.display());
                }
                None => print!("{text}"),
            }
        }
        Command::Sweep => {
            let r = scheduler.sweep(&mut nursery).await;
            println!(
                "📣 {} checked, {} notified, {} failed, {} cooling down, {} not due",
                r.checked, r.notified, r.failed, r.skipped_cooldown, r.not_due
            );
        }
        Command::Notify { id } => {
            if scheduler.notify_now(&mut nursery, &id, now).await {
                println!("📨 Reminder sent for '{id}'");
            } else {
                anyhow::bail!("reminder for '{id}' was not sent");
            }
        }
        Command::Summary => {
            let s = nursery.summary(now);
            println!("Active batches:      {}", s.active);
            println!("Completed batches:   {}", s.completed);
            println!("Overdue:             {}", s.overdue);
            println!("Due within 24h:      {}", s.due_within_24h);
            println!("Larvae under care:   {}", s.total_larvae);
        }
        Command::ClearLog { yes } => {
            if !yes {
                anyhow::bail!("refusing to clear the feeding log without --yes");
            }
            println!("🧹 Removed {} log entries", nursery.clear_log());
        }
        Command::Run => {
            let nursery = Arc::new(Mutex::new(nursery));
            let loop_handle = tokio::spawn(spawn_scheduler(
                nursery.clone(),
                Arc::new(scheduler),
                config.scheduler.check_interval_secs,
            ));
            tokio::signal::ctrl_c().await?;
            loop_handle.abort();
            tracing::info!("🛑 Shutting down");
            nursery.lock().await.shutdown();
            return Ok(());
        }
    }

    nursery.shutdown();
    Ok(())
}

fn report(changed: bool, id: &str, what: &str) {
    if changed {
        println!("✅ Batch '{id}' {what}");
    } else {
        println!("ℹ️  Nothing to do for '{id}'");
    }
}

fn human(d: Duration) -> String {
    let mins = d.num_minutes().abs();
    if mins >= 60 * 24 {
        format!("{}d {}h", mins / (60 * 24), (mins / 60) % 24)
    } else {
        format!("{}h {}m", mins / 60, mins % 60)
    }
}
