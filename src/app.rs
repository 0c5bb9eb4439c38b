// ABOUTME: Wires configuration, store, delivery client, and engine into a QueueService for the CLI.
// ABOUTME: Each function here backs one parcel subcommand.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use parcel_core::{ArtifactType, NewArtifact, Notices};
use parcel_delivery::{BotApiClient, BotApiConfig, TracingNotifier};
use parcel_engine::{
    ConnectivityMonitor, DrainReport, EngineConfig, EnqueueOutcome, QueueEngine, QueueService,
    TcpProbe, TriggerSource,
};
use parcel_store::{QueueStore, settings};

use crate::config::ParcelConfig;

pub fn open_store(config: &ParcelConfig) -> anyhow::Result<Arc<QueueStore>> {
    let path = config.db_path();
    let store = QueueStore::open(&path)
        .with_context(|| format!("opening queue store at {}", path.display()))?;
    Ok(Arc::new(store))
}

/// Build the service. Must be called inside the tokio runtime.
pub fn build_service(config: &ParcelConfig, store: Arc<QueueStore>) -> anyhow::Result<QueueService> {
    let token = config.resolve_token(&store)?;
    if token.is_none() {
        tracing::warn!("no bot token configured; deliveries will fail until `parcel configure --token` is run");
    }
    let label = config.resolve_label(&store)?;

    let client = BotApiClient::new(BotApiConfig {
        base_url: config.api_base_url.clone(),
        token,
        timeout: config.http_timeout,
    })?;

    let engine_config = EngineConfig {
        artifact_root: config.artifact_root(),
        retention: config.retention,
        missing_file_grace: config.missing_file_grace,
        notices: Notices::new(label),
    };
    let engine = QueueEngine::new(
        store,
        Arc::new(client),
        Arc::new(TracingNotifier),
        engine_config,
    );
    Ok(QueueService::new(engine))
}

/// Daemon mode: drain leftovers, watch connectivity, stop on Ctrl-C.
pub async fn run(config: &ParcelConfig, service: QueueService) -> anyhow::Result<()> {
    std::fs::create_dir_all(config.artifact_root())
        .with_context(|| format!("creating {}", config.artifact_root().display()))?;

    let probe = Arc::new(TcpProbe::new(
        config.probe_addr.clone(),
        parcel_engine::connectivity::DEFAULT_PROBE_TIMEOUT,
    ));
    let monitor = ConnectivityMonitor::new(probe, config.probe_interval)
        .spawn(service.handle(), service.shutdown_signal());

    service.start();
    tracing::info!(home = %config.home.display(), "parcel running; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    tracing::info!("shutdown requested");

    service.shutdown().await;
    if let Err(e) = monitor.await {
        tracing::warn!(error = %e, "connectivity monitor ended abnormally");
    }
    Ok(())
}

/// Enqueue one artifact and wait for a drain pass to finish.
pub async fn enqueue(service: &QueueService, artifact: NewArtifact) -> anyhow::Result<()> {
    let outcome = service.engine().enqueue(artifact).await;
    match outcome {
        EnqueueOutcome::Queued(id) => {
            println!("queued {}", id);
            let report = service.drain_now(TriggerSource::Manual).await?;
            print_report(&report);
            Ok(())
        }
        EnqueueOutcome::Duplicate(id) => {
            println!("already pending as {}", id);
            Ok(())
        }
        EnqueueOutcome::MissingFile => bail!("file does not exist"),
        EnqueueOutcome::Invalid(reason) => bail!("invalid artifact: {}", reason),
        EnqueueOutcome::StoreUnavailable => bail!("queue store is unavailable; capture not recorded"),
    }
}

pub fn file_artifact(
    path: PathBuf,
    chat: String,
    artifact_type: ArtifactType,
    captured_at_ms: Option<i64>,
) -> anyhow::Result<NewArtifact> {
    let captured_at = captured_at(captured_at_ms)?;
    let path = std::path::absolute(&path)
        .with_context(|| format!("resolving {}", path.display()))?;
    Ok(NewArtifact::file(path, chat, artifact_type, captured_at))
}

pub fn captured_at(millis: Option<i64>) -> anyhow::Result<DateTime<Utc>> {
    match millis {
        None => Ok(Utc::now()),
        Some(ms) => DateTime::from_timestamp_millis(ms)
            .with_context(|| format!("capture time {} is out of range", ms)),
    }
}

pub async fn drain(service: &QueueService) -> anyhow::Result<()> {
    let report = service.drain_now(TriggerSource::Manual).await?;
    print_report(&report);
    Ok(())
}

pub fn list(store: &QueueStore, json: bool) -> anyhow::Result<()> {
    let records = store.list_all()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("queue is empty");
        return Ok(());
    }
    for record in records {
        let source = match (&record.local_path, &record.payload_text) {
            (Some(path), _) => path.display().to_string(),
            (None, Some(text)) => format!("{:?}", text),
            (None, None) => "-".to_string(),
        };
        println!(
            "{}\t{}\t{}\t{}\t{}",
            record.id,
            record.artifact_type,
            record.captured_at.to_rfc3339(),
            record.destination,
            source
        );
    }
    Ok(())
}

pub fn sweep(config: &ParcelConfig) -> anyhow::Result<()> {
    let report = parcel_store::sweep(&config.artifact_root(), config.retention)?;
    println!("scanned {} files, deleted {}", report.scanned, report.deleted);
    Ok(())
}

pub fn configure(store: &QueueStore, token: Option<String>, label: Option<String>) -> anyhow::Result<()> {
    if let Some(token) = token {
        store.set_setting(settings::BOT_TOKEN, token.trim())?;
        println!("bot token saved");
    }
    if let Some(label) = label {
        store.set_setting(settings::DEVICE_LABEL, label.trim())?;
        println!("device label saved");
    }

    let token_state = match store.get_setting(settings::BOT_TOKEN)? {
        Some(t) if !t.is_empty() => "set",
        _ => "not set",
    };
    let label = store.get_setting(settings::DEVICE_LABEL)?.unwrap_or_default();
    println!("bot_token: {}", token_state);
    println!("device_label: {}", if label.is_empty() { "-" } else { &label });
    Ok(())
}

fn print_report(report: &DrainReport) {
    println!(
        "pass {}: considered {}, delivered {}, failed {}, dropped {}, deferred {}{}",
        report.pass_id,
        report.considered,
        report.delivered,
        report.failed,
        report.dropped,
        report.deferred,
        if report.stopped { " (stopped)" } else { "" }
    );
}
