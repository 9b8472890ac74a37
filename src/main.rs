//! simrelay daemon and CLI
//!
//! Relays SMS and call events to one of two configured HTTP backends with
//! automatic fallback. `run` consumes a line-delimited JSON event stream
//! on stdin; the other subcommands drive single operations.

use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use simrelay::api::EventFilter;
use simrelay::config::Config;
use simrelay::fallback::BackendManager;
use simrelay::health::HealthMap;
use simrelay::relay::{CallKind, RelayService};
use simrelay::settings::Backend;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// simrelay - relay device events to redundant backends
#[derive(Parser)]
#[command(name = "simrelay")]
#[command(about = "Relay SMS/call events to one of two HTTP backends")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show backend settings and current connectivity
    Status,

    /// Probe a single backend endpoint
    Test {
        /// Backend name: primary or secondary
        backend: String,
    },

    /// Relay one SMS
    SendSms {
        /// Sender phone number
        sender: String,

        /// Message body
        message: String,

        /// Recipient phone number
        #[arg(long)]
        to: Option<String>,

        /// Event time as unix milliseconds (defaults to now)
        #[arg(long)]
        timestamp_ms: Option<i64>,
    },

    /// Relay one call record
    SendCall {
        /// Caller phone number
        number: String,

        /// Recipient phone number (outgoing calls)
        #[arg(long)]
        to: Option<String>,

        /// Call type: incoming, outgoing or missed
        #[arg(long, default_value = "incoming")]
        call_type: String,

        /// Call duration in seconds
        #[arg(long, default_value = "0")]
        duration: u64,

        /// Event time as unix milliseconds (defaults to now)
        #[arg(long)]
        timestamp_ms: Option<i64>,
    },

    /// Register all SIMs from the manifest with a backend
    Register,

    /// List stored events from a backend
    Messages {
        /// Filter by SIM id
        #[arg(long)]
        sim_id: Option<String>,

        /// Filter by event type: sms or call
        #[arg(long = "type")]
        kind: Option<String>,

        /// Maximum number of events
        #[arg(long, default_value = "50")]
        limit: u32,

        /// Number of events to skip
        #[arg(long, default_value = "0")]
        skip: u32,
    },

    /// List SIMs registered with a backend
    Sims,

    /// Mark a stored event as processed
    MarkProcessed {
        /// Backend message id
        message_id: String,
    },

    /// Show or change backend settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Relay a JSON event stream from stdin
    Run,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show stored settings
    Show,

    /// Save settings, then re-register SIMs and re-check connectivity
    Set {
        /// Primary backend base URL
        #[arg(long)]
        primary: Option<String>,

        /// Secondary backend base URL
        #[arg(long)]
        secondary: Option<String>,

        /// Active backend name: primary or secondary
        #[arg(long)]
        active: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = Config::default();
    let manager = Arc::new(BackendManager::new(&config)?);
    let service = Arc::new(RelayService::new(config, manager));

    match cli.command {
        Commands::Status => cmd_status(&service).await,
        Commands::Test { backend } => cmd_test(&service, &backend).await,
        Commands::SendSms {
            sender,
            message,
            to,
            timestamp_ms,
        } => {
            cmd_send_sms(
                &service,
                &sender,
                to.as_deref(),
                &message,
                timestamp_ms.unwrap_or_else(now_millis),
            )
            .await
        }
        Commands::SendCall {
            number,
            to,
            call_type,
            duration,
            timestamp_ms,
        } => {
            cmd_send_call(
                &service,
                &number,
                to.as_deref(),
                &call_type,
                duration,
                timestamp_ms.unwrap_or_else(now_millis),
            )
            .await
        }
        Commands::Register => cmd_register(&service).await,
        Commands::Messages {
            sim_id,
            kind,
            limit,
            skip,
        } => cmd_messages(&service, sim_id, kind.as_deref(), limit, skip).await,
        Commands::Sims => cmd_sims(&service).await,
        Commands::MarkProcessed { message_id } => cmd_mark_processed(&service, &message_id).await,
        Commands::Config { action } => match action {
            ConfigAction::Show => cmd_config_show(&service),
            ConfigAction::Set {
                primary,
                secondary,
                active,
            } => {
                cmd_config_set(
                    &service,
                    primary.as_deref(),
                    secondary.as_deref(),
                    active.as_deref(),
                )
                .await
            }
        },
        Commands::Run => cmd_run(service).await,
    }
}

// ============================================================================
// CLI Commands
// ============================================================================

async fn cmd_status(service: &RelayService) -> anyhow::Result<()> {
    let store = service.manager().store();
    let active = store.active_backend()?;

    println!("Active backend: {}", active);

    let map = service.check_connectivity().await;
    for backend in [Backend::Primary, Backend::Secondary] {
        let state = if map.get(backend) { "online" } else { "offline" };
        println!(
            "  {:<10} {:<40} {}",
            backend.as_str(),
            store.endpoint_url(backend)?,
            state
        );
    }
    println!("{}", map.summary());

    Ok(())
}

async fn cmd_test(service: &RelayService, backend: &str) -> anyhow::Result<()> {
    let backend = parse_backend(backend)?;
    let api = service.manager().api_for(backend)?;
    println!("Probing {} at {}...", backend, api.base_url());

    match api.health().await {
        Ok(probe) if probe.ok => {
            println!("{} is online ({} ms)", backend, probe.latency.as_millis());
            if let Some(report) = probe.report {
                if !report.service.is_empty() {
                    println!("  service: {}", report.service);
                }
                if let Some(dep) = report.dependency_status {
                    println!("  database: {}", dep);
                }
            }
        }
        Ok(_) => {
            println!("{} answered with an error status", backend);
            std::process::exit(1);
        }
        Err(e) => {
            println!("{} is unreachable: {}", backend, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn cmd_send_sms(
    service: &RelayService,
    sender: &str,
    to: Option<&str>,
    message: &str,
    timestamp_ms: i64,
) -> anyhow::Result<()> {
    match service.send_sms(sender, to, message, timestamp_ms).await {
        Some(ack) => {
            match ack.message_id {
                Some(id) => println!("Relayed (message id {})", id),
                None => println!("Relayed"),
            }
            Ok(())
        }
        None => {
            eprintln!("Failed to relay SMS: both backends unavailable");
            std::process::exit(1);
        }
    }
}

async fn cmd_send_call(
    service: &RelayService,
    number: &str,
    to: Option<&str>,
    call_type: &str,
    duration: u64,
    timestamp_ms: i64,
) -> anyhow::Result<()> {
    let kind = parse_call_kind(call_type)?;
    match service
        .send_call(number, to, kind, duration, timestamp_ms)
        .await
    {
        Some(ack) => {
            match ack.message_id {
                Some(id) => println!("Relayed (message id {})", id),
                None => println!("Relayed"),
            }
            Ok(())
        }
        None => {
            eprintln!("Failed to relay call: both backends unavailable");
            std::process::exit(1);
        }
    }
}

async fn cmd_register(service: &RelayService) -> anyhow::Result<()> {
    let (registered, total) = service.register_all_sims().await;
    println!("Registered {}/{} SIMs", registered, total);
    if registered == 0 && total > 0 {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_messages(
    service: &RelayService,
    sim_id: Option<String>,
    kind: Option<&str>,
    limit: u32,
    skip: u32,
) -> anyhow::Result<()> {
    let kind = match kind {
        Some(value) => Some(simrelay::api::EventKind::parse(value).ok_or_else(|| {
            anyhow::anyhow!("unknown event type: {} (expected sms or call)", value)
        })?),
        None => None,
    };
    let filter = EventFilter {
        sim_id,
        kind,
        limit: Some(limit),
        skip: Some(skip),
    };

    match service.list_events(&filter).await {
        Some(events) => {
            if events.is_empty() {
                println!("No events");
                return Ok(());
            }
            for event in events {
                println!(
                    "{} [{}] {} from {}: {}",
                    event.timestamp,
                    event.kind.as_str(),
                    event.sim_id,
                    event.from,
                    event.message
                );
            }
            Ok(())
        }
        None => {
            eprintln!("Failed to list events: both backends unavailable");
            std::process::exit(1);
        }
    }
}

async fn cmd_sims(service: &RelayService) -> anyhow::Result<()> {
    match service.list_sims().await {
        Some(sims) => {
            if sims.is_empty() {
                println!("No SIMs registered");
                return Ok(());
            }
            for sim in sims {
                println!(
                    "{:<20} {:<16} {:<12} {}",
                    sim.sim_id,
                    sim.phone_number,
                    sim.carrier.as_deref().unwrap_or("-"),
                    if sim.is_active { "active" } else { "inactive" }
                );
            }
            Ok(())
        }
        None => {
            eprintln!("Failed to list SIMs: both backends unavailable");
            std::process::exit(1);
        }
    }
}

async fn cmd_mark_processed(service: &RelayService, message_id: &str) -> anyhow::Result<()> {
    match service.mark_processed(message_id).await {
        Some(_) => {
            println!("Marked {} as processed", message_id);
            Ok(())
        }
        None => {
            eprintln!("Failed to mark processed: both backends unavailable");
            std::process::exit(1);
        }
    }
}

fn cmd_config_show(service: &RelayService) -> anyhow::Result<()> {
    let store = service.manager().store();
    println!("primary   {}", store.endpoint_url(Backend::Primary)?);
    println!("secondary {}", store.endpoint_url(Backend::Secondary)?);
    println!("active    {}", store.active_backend()?);
    Ok(())
}

async fn cmd_config_set(
    service: &RelayService,
    primary: Option<&str>,
    secondary: Option<&str>,
    active: Option<&str>,
) -> anyhow::Result<()> {
    // Saving always re-registers SIMs and re-probes both backends, even
    // when nothing changed.
    let store = service.manager().store();
    let active = match active {
        Some(name) => {
            if Backend::parse(name).is_none() {
                eprintln!("Unknown backend name {:?}, selection unchanged", name);
            }
            name.to_string()
        }
        None => store.active_backend()?.as_str().to_string(),
    };

    let map = service.save_settings(primary, secondary, &active).await?;
    cmd_config_show(service)?;
    println!("{}", map.summary());
    Ok(())
}

// ============================================================================
// Event Stream
// ============================================================================

/// One host event read from the stdin stream
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum HostEvent {
    Sms {
        from: String,
        #[serde(default)]
        to: Option<String>,
        message: String,
        #[serde(default)]
        timestamp_ms: Option<i64>,
    },
    Call {
        number: String,
        #[serde(default)]
        to: Option<String>,
        #[serde(default)]
        call_type: Option<String>,
        #[serde(default)]
        duration_secs: Option<u64>,
        #[serde(default)]
        timestamp_ms: Option<i64>,
    },
}

async fn relay_host_event(service: Arc<RelayService>, event: HostEvent) {
    match event {
        HostEvent::Sms {
            from,
            to,
            message,
            timestamp_ms,
        } => {
            let delivered = service
                .send_sms(
                    &from,
                    to.as_deref(),
                    &message,
                    timestamp_ms.unwrap_or_else(now_millis),
                )
                .await;
            if delivered.is_none() {
                error!(from = %from, "dropped SMS event, both backends unavailable");
            }
        }
        HostEvent::Call {
            number,
            to,
            call_type,
            duration_secs,
            timestamp_ms,
        } => {
            let kind = call_type
                .as_deref()
                .and_then(CallKind::parse)
                .unwrap_or(CallKind::Incoming);
            let delivered = service
                .send_call(
                    &number,
                    to.as_deref(),
                    kind,
                    duration_secs.unwrap_or(0),
                    timestamp_ms.unwrap_or_else(now_millis),
                )
                .await;
            if delivered.is_none() {
                error!(number = %number, "dropped call event, both backends unavailable");
            }
        }
    }
}

async fn cmd_run(service: Arc<RelayService>) -> anyhow::Result<()> {
    info!("simrelay daemon starting");

    let map = service.check_connectivity().await;
    log_connectivity(&map);

    let (registered, total) = service.register_all_sims().await;
    info!(registered, total, "startup SIM registration");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tasks: JoinSet<()> = JoinSet::new();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<HostEvent>(&line) {
            Ok(event) => {
                let service = Arc::clone(&service);
                tasks.spawn(relay_host_event(service, event));
            }
            Err(e) => {
                warn!(error = %e, "skipping unparseable event line");
            }
        }

        // Reap finished relays without blocking the stream
        while let Some(result) = tasks.try_join_next() {
            if let Err(e) = result {
                error!(error = %e, "relay task panicked");
            }
        }
    }

    info!("event stream closed, draining in-flight relays");
    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "relay task panicked");
        }
    }

    info!("simrelay daemon stopped");
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn parse_backend(name: &str) -> anyhow::Result<Backend> {
    Backend::parse(name)
        .ok_or_else(|| anyhow::anyhow!("unknown backend: {} (expected primary or secondary)", name))
}

fn parse_call_kind(name: &str) -> anyhow::Result<CallKind> {
    CallKind::parse(name).ok_or_else(|| {
        anyhow::anyhow!(
            "unknown call type: {} (expected incoming, outgoing or missed)",
            name
        )
    })
}

fn log_connectivity(map: &HealthMap) {
    info!(
        primary = map.primary,
        secondary = map.secondary,
        summary = %map.summary(),
        "backend connectivity"
    );
}
