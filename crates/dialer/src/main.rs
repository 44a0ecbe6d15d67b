use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use crm_dialer_core::adapters::leads::normalize_phone;
use crm_dialer_core::{
    CallOutcome, DialerConfig, DialerEngineBuilder, DialerEvent, DialerLauncher, DispositionUpdate, LeadId,
    StaticLeadDirectory,
};
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod script;

use script::Step;

/// CRM dialer: replay native-bridge call events through the reconciliation engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log Level (error, warn, info, debug, trace)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a JSON-lines script of dialer steps and print every UI event as JSON
    Replay {
        /// Script file
        #[arg(long)]
        script: String,

        /// SQLite URL for the pending call and call-log tables, unless the
        /// config file or CRM_DIALER_DATABASE_URL sets one
        #[arg(long, default_value = "sqlite::memory:")]
        db: String,

        /// JSON configuration file
        #[arg(long)]
        config: Option<String>,

        /// Override the fallback delay
        #[arg(long)]
        fallback_secs: Option<f64>,

        /// Phone-to-lead mapping, repeatable: --lead +15550100=lead-1
        #[arg(long = "lead", value_parser = parse_lead)]
        leads: Vec<(String, String)>,

        /// How long to keep listening after the last step
        #[arg(long, default_value_t = 10.0)]
        linger_secs: f64,
    },

    /// Print the effective configuration
    Config {
        #[arg(long)]
        config: Option<String>,
    },
}

fn parse_lead(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((phone, lead)) if !phone.trim().is_empty() && !lead.trim().is_empty() => {
            Ok((phone.trim().to_string(), lead.trim().to_string()))
        }
        _ => Err(format!("expected PHONE=LEAD_ID, got '{}'", s)),
    }
}

/// Launcher for replays: there is no dialer to open
struct LoggingLauncher;

#[async_trait]
impl DialerLauncher for LoggingLauncher {
    fn name(&self) -> &str {
        "log"
    }

    async fn launch(&self, phone_number: &str) -> crm_dialer_core::Result<bool> {
        info!("📞 would dial tel:{}", phone_number);
        Ok(true)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},crm_dialer_core=debug", args.log_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Replay {
            script,
            db,
            config,
            fallback_secs,
            leads,
            linger_secs,
        } => {
            let mut config = load_config(config.as_deref()).await?.with_env_overrides()?;
            if let Some(secs) = fallback_secs {
                if !secs.is_finite() || secs <= 0.0 {
                    bail!("--fallback-secs must be a positive number");
                }
                let delay = Duration::try_from_secs_f64(secs).context("--fallback-secs is out of range")?;
                config = config.with_fallback_delay(delay);
                config.validate()?;
            }
            if config.database_url.is_none() {
                config = config.with_database_url(db);
            }
            let linger = Duration::try_from_secs_f64(linger_secs.max(0.0)).context("--linger-secs is out of range")?;
            replay(config, &script, leads, linger).await
        }
        Command::Config { config } => {
            let config = load_config(config.as_deref()).await?.with_env_overrides()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn load_config(path: Option<&str>) -> Result<DialerConfig> {
    match path {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading config {}", path))?;
            Ok(DialerConfig::from_json(&text)?)
        }
        None => Ok(DialerConfig::default()),
    }
}

async fn replay(
    config: DialerConfig,
    script_path: &str,
    leads: Vec<(String, String)>,
    linger: Duration,
) -> Result<()> {
    let text = tokio::fs::read_to_string(script_path)
        .await
        .with_context(|| format!("reading script {}", script_path))?;
    let steps = script::parse(&text)?;

    info!("🚀 CRM dialer replay v{}", crm_dialer_core::VERSION);
    info!("   📜 Script:    {} ({} steps)", script_path, steps.len());
    info!("   💾 Database:  {}", config.database_url.as_deref().unwrap_or("-"));
    info!("   ⏱️  Fallback:  {:?}", config.fallback_delay);

    let directory = leads
        .iter()
        .fold(StaticLeadDirectory::new(), |dir, (phone, lead)| dir.with_lead(phone, lead.as_str()));
    let lead_table: HashMap<String, LeadId> = leads
        .into_iter()
        .map(|(phone, lead)| (normalize_phone(&phone), LeadId::new(lead)))
        .collect();

    let (handle, mut events) = DialerEngineBuilder::new(config)
        .with_lead_directory(Arc::new(directory))
        .with_launcher(Arc::new(LoggingLauncher))
        .start()
        .await?;

    let last_outcome: Arc<Mutex<Option<CallOutcome>>> = Arc::new(Mutex::new(None));
    let printer_outcome = last_outcome.clone();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("failed to encode event: {}", e),
            }
            if let DialerEvent::CallCompleted { outcome } = event {
                info!(
                    phone = %outcome.phone_number,
                    status = %outcome.status(None),
                    source = %outcome.source,
                    "call completed"
                );
                *printer_outcome.lock().await = Some(outcome);
            }
        }
    });

    let started = Instant::now();
    let run = async {
        for line in steps {
            sleep_until(started + Duration::from_millis(line.at_ms)).await;
            match line.step {
                Step::Initiate { phone, lead } => {
                    let lead = lead
                        .map(LeadId::new)
                        .or_else(|| lead_table.get(&normalize_phone(&phone)).cloned());
                    handle.initiate(&phone, lead).await?;
                }
                Step::Native { payload } => handle.deliver_native(payload).await?,
                Step::Visibility { state } => handle.set_visibility(state).await?,
                Step::Clear => handle.clear().await?,
                Step::Disposition { disposition, notes } => {
                    let outcome = last_outcome.lock().await.clone();
                    match outcome {
                        Some(mut outcome) => {
                            let mut update = DispositionUpdate::new(disposition);
                            update.notes = notes;
                            match handle.save_disposition(&mut outcome, &update).await {
                                Ok(id) => info!(%id, status = %outcome.status(update.disposition.as_deref()), "disposition saved"),
                                Err(e) => warn!("disposition not saved: {}", e),
                            }
                            *last_outcome.lock().await = Some(outcome);
                        }
                        None => warn!("disposition step with no completed call"),
                    }
                }
                Step::Sync { entries } => {
                    let report = handle.sync_call_logs(entries).await;
                    println!("{}", serde_json::to_string(&report)?);
                }
            }
        }
        tokio::time::sleep(linger).await;
        Ok::<_, anyhow::Error>(())
    };

    tokio::select! {
        result = run => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Interrupted");
        }
    }

    if let Ok(snapshot) = handle.snapshot().await {
        info!(state = %snapshot.state, finalized = snapshot.finalized_count, "final engine state");
    }
    handle.shutdown().await?;
    drop(handle);
    if printer.await.is_err() {
        warn!("event printer task panicked");
    }
    info!("👋 Replay finished");
    Ok(())
}
