//! keyscribe-daemon: background daemon for hotkey-driven dictation
//!
//! This daemon runs as a LaunchAgent and provides:
//! - Global hotkey detection via CGEventTap
//! - Hold-to-talk and continuous recording through an external recorder
//! - Transcription and selection rewrite through configured commands
//! - IPC server for status queries and state notifications

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use keyscribe::capture::CommandRecorder;
use keyscribe::config::Config;
use keyscribe::engine::{HotkeyEngine, Services};
use keyscribe::hotkey;
use keyscribe::ipc::Server;
use keyscribe::lifecycle::{apply_reload, ReloadSignal, ShutdownSignal};
use keyscribe::output::{system_text_sink, JsonlHistory};
use keyscribe::pipeline::{CommandRewriter, CommandTranscriber};
use keyscribe::settings::SettingsStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration before logging so the file can set the filter
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let default_filter = config.file.logging.filter.as_deref().unwrap_or("info");
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "keyscribe-daemon starting"
    );
    info!(?config.socket_path, ?config.config_path, "configuration loaded");

    config.ensure_dirs()?;
    let settings = SettingsStore::new(config.file.shortcut_set()?);

    let file = &config.file;
    let services = Services {
        capture: Box::new(CommandRecorder::new(
            file.recorder.command.clone(),
            file.recorder.dir.clone(),
        )),
        transcriber: Arc::new(CommandTranscriber::new(
            file.transcription.command.clone(),
            Duration::from_millis(file.transcription.timeout_ms),
        )),
        rewriter: Arc::new(CommandRewriter::new(
            file.rewrite.command.clone(),
            Duration::from_millis(file.rewrite.timeout_ms),
        )),
        text: Arc::from(system_text_sink(
            file.output.insert_command.clone(),
            file.output.selection_command.clone(),
        )),
        history: Arc::new(JsonlHistory::new(config.history_path())),
    };

    let mut engine = HotkeyEngine::new(settings.clone(), services, file.engine_options());

    // A missing event tap leaves the daemon serving status over IPC
    match engine.start(hotkey::system_source()).await {
        Ok(()) => info!("hotkey listener started"),
        Err(e) => {
            error!(?e, "failed to start hotkey listener");
            warn!("continuing without hotkey support - check Accessibility permissions");
        }
    }

    let server = Server::new(&config.socket_path, engine.watch_status(), engine.subscribe())?;
    let mut shutdown = ShutdownSignal::new().context("failed to register shutdown signals")?;
    let mut reload = ReloadSignal::new().context("failed to register SIGHUP handler")?;

    info!("daemon initialized, entering main loop");

    tokio::select! {
        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Reload shortcuts on SIGHUP
        _ = async {
            while reload.recv().await.is_some() {
                match apply_reload(&config, &settings) {
                    Ok(()) => info!("configuration reloaded"),
                    Err(e) => warn!(%e, "configuration reload failed, keeping current shortcuts"),
                }
            }
        } => {
            info!("reload handler exited");
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    engine.stop().await;
    server.shutdown().await;

    info!("keyscribe-daemon stopped");

    Ok(())
}
