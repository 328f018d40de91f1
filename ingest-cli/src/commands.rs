use anyhow::{Context, Result, bail};
use ingest_engine::source::parse_channels;
use ingest_engine::{
    ChannelSource, FileChannelSource, KeyManager, PipelineManager, build_transcoder_args,
    run_reconcile_loop,
};
use ingest_providers::{ProviderConfig, ProviderFactory, ProviderKind, create_client};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::OutputFormat;
use crate::config::AppConfig;

/// Supervise the channel file until SIGINT/SIGTERM.
pub async fn run(config: &AppConfig, channels: &Path, poll_interval: Option<u64>) -> Result<()> {
    let engine_config = config.ingest_config()?;
    let client = create_client(&config.client_config())?;
    let manager = PipelineManager::with_providers(engine_config, ProviderFactory::new(client))?;
    info!(
        segment_root = %manager.config().segment_root.display(),
        transcoder = %manager.config().transcoder_path.display(),
        "Ingest engine ready"
    );

    // a broken channel file at startup is fatal; later polls only warn
    let source = FileChannelSource::new(channels);
    let initial = source
        .desired_channels()
        .await
        .context("Failed to load channel file")?;
    let report = manager.sync(&initial).context("Channel file rejected")?;
    info!(started = report.started.len(), "Initial channel set applied");

    let interval = poll_interval
        .map(|secs| Duration::from_secs(secs.max(1)))
        .unwrap_or_else(|| config.poll_interval());
    let cancel = CancellationToken::new();

    tokio::select! {
        _ = run_reconcile_loop(&manager, &source, interval, cancel.clone()) => {}
        result = shutdown_signal() => {
            result?;
            info!("Shutdown requested");
        }
    }

    cancel.cancel();
    manager.stop_all().await;
    info!("All channels stopped");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for ctrl-c"),
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")
}

/// List (or just health-check) a provider catalog.
pub async fn catalog(
    config: &AppConfig,
    provider: &str,
    settings: Vec<(String, String)>,
    output: OutputFormat,
    check: bool,
) -> Result<()> {
    let kind: ProviderKind = provider.parse()?;
    let settings: ProviderConfig = settings.into_iter().collect();
    let client = create_client(&config.client_config())?;
    let provider = ProviderFactory::new(client).create(kind, settings)?;

    if check {
        provider.health_check().await?;
        println!("{kind} provider is reachable");
        return Ok(());
    }

    let channels = provider.get_channels().await?;
    match output {
        OutputFormat::Pretty => {
            for channel in &channels {
                println!("{channel}");
            }
            println!("{} channels", channels.len());
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&channels)?),
    }
    Ok(())
}

/// Rotate a channel key on disk. A running daemon keeps serving the old key
/// until the channel's transcoder is relaunched, which re-reads the key file.
pub fn rotate_key(config: &AppConfig, slug: &str) -> Result<()> {
    let engine_config = config.ingest_config()?;
    let root = std::path::absolute(&engine_config.segment_root)?;
    let keys = KeyManager::new(root).with_uri_prefix(engine_config.key_uri_prefix);

    keys.rotate_key(slug)?;
    let info = keys.write_key_info(slug)?;
    println!("Rotated key for {slug} ({})", info.display());
    Ok(())
}

/// Print the transcoder command line for one channel. The input URL is masked.
pub fn print_args(config: &AppConfig, channels: &Path, slug: &str) -> Result<()> {
    let engine_config = config.ingest_config()?;
    let text = std::fs::read_to_string(channels)
        .with_context(|| format!("Failed to read {}", channels.display()))?;
    let channels = parse_channels(channels, &text)?;
    let Some(channel) = channels.iter().find(|c| c.slug == slug) else {
        bail!("no channel `{slug}` in channel file");
    };
    channel.validate()?;

    let scheme = match channel.source_type {
        ProviderKind::Direct => channel.source_url.scheme().unwrap_or_else(|| "http".into()),
        ProviderKind::M3u | ProviderKind::Xtream => "http".into(),
    };
    let input = format!("{scheme}://<redacted>");
    let root = std::path::absolute(&engine_config.segment_root)?;
    let args = build_transcoder_args(channel, &input, &root, &engine_config.hls);

    let mut line = engine_config.transcoder_path.display().to_string();
    for arg in &args {
        line.push(' ');
        if arg.contains(' ') {
            line.push_str(&format!("\"{arg}\""));
        } else {
            line.push_str(arg);
        }
    }
    println!("{line}");
    Ok(())
}
