//! Run command: keeps the presence session alive and publishes the stdin feed.
//!
//! Wires together:
//! - Signal handler (SIGTERM/SIGINT for shutdown, SIGHUP for reconnect)
//! - Supervisor (connect, retry)
//! - Publisher (change detection, `SET_ACTIVITY`)
//! - Status reporter (one line on stderr per status change)
//! - Stdin feed

use std::sync::Arc;
use std::time::Duration;

use tokio::io::BufReader;
use tokio::sync::watch;
use tracing::{info, warn};

use tunecord_core::SessionStatus;
use tunecord_ipc::{
    ArtworkResolver, IpcConfig, Locator, NoArtwork, Publisher, Session, StaticArtwork, Supervisor,
};

use crate::config::{ArtworkSource, ClientConfig};
use crate::error::{ClientError, ClientResult};
use crate::feed;
use crate::signals::{SignalHandler, wait_for_shutdown};

/// Runs until a shutdown signal arrives, or until stdin ends when
/// `exit_on_eof` is set.
pub async fn run(ipc: IpcConfig, config: &ClientConfig, exit_on_eof: bool) -> ClientResult<()> {
    let resolver = build_resolver(config)?;

    // 1. Signal handler
    let signals = Arc::new(SignalHandler::new());
    signals.spawn_listener();

    // 2. Session, supervisor, publisher
    let session = Session::new(&ipc);
    let locator = Locator::from_config(&ipc);
    let supervisor = Supervisor::new(session.clone(), locator, ipc.retry_delay);
    let supervisor_handle = supervisor.handle();
    let publisher = Arc::new(
        Publisher::new(session.clone(), ipc.presence.clone()).with_resolver(resolver),
    );

    info!(
        client_id = %ipc.client_id,
        ipc_dir = %ipc.resolved_ipc_dir().display(),
        "Starting presence session"
    );

    let supervisor_task = tokio::spawn(supervisor.run());
    let publisher_task = tokio::spawn(publisher.clone().run(signals.shutdown()));
    let status_task = tokio::spawn(report_status(session.subscribe(), signals.shutdown()));

    // 3. SIGHUP forwards to the supervisor
    let reconnect_signals = signals.clone();
    let reconnect_handle = supervisor_handle.clone();
    let reconnect_task = tokio::spawn(async move {
        loop {
            reconnect_signals.reconnect_requested().await;
            if reconnect_handle.reconnect_now().await.is_err() {
                break;
            }
        }
    });

    // 4. Feed stdin until EOF, then wait for shutdown unless told to exit
    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = feed::pump(stdin, &publisher) => {
            match result {
                Ok(stats) => info!(
                    updates = stats.updates,
                    clears = stats.clears,
                    rejected = stats.rejected,
                    "Input closed"
                ),
                Err(e) => warn!(error = %e, "Failed to read input"),
            }
            if !exit_on_eof {
                wait_for_shutdown(signals.shutdown()).await;
            }
        }
        _ = wait_for_shutdown(signals.shutdown()) => {}
    }

    // Clean shutdown: clear the activity, stop the background tasks
    info!("Shutting down...");
    signals.trigger_shutdown();
    match tokio::time::timeout(Duration::from_secs(2), publisher.clear()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Failed to clear presence on exit"),
        Err(_) => warn!("Timed out clearing presence on exit"),
    }
    if let Err(e) = supervisor_handle.stop().await {
        warn!(error = %e, "Failed to send stop command to supervisor");
    }
    reconnect_task.abort();

    let _ = tokio::time::timeout(Duration::from_secs(5), supervisor_task).await;
    let _ = tokio::time::timeout(Duration::from_secs(1), publisher_task).await;
    let _ = tokio::time::timeout(Duration::from_secs(1), status_task).await;

    info!("Stopped");
    Ok(())
}

/// Picks the artwork resolver named in the configuration.
fn build_resolver(config: &ClientConfig) -> ClientResult<Arc<dyn ArtworkResolver>> {
    match config.presence.artwork {
        ArtworkSource::None => Ok(Arc::new(NoArtwork)),
        ArtworkSource::Static => Ok(Arc::new(StaticArtwork)),
        #[cfg(feature = "itunes")]
        ArtworkSource::Itunes => {
            let resolver = tunecord_ipc::ItunesArtwork::new(Duration::from_secs(5))
                .map_err(|e| ClientError::Config(format!("failed to create HTTP client: {}", e)))?
                .with_country(&config.presence.itunes_country);
            Ok(Arc::new(resolver))
        }
        #[cfg(not(feature = "itunes"))]
        ArtworkSource::Itunes => Err(ClientError::Config(
            "artwork = \"itunes\" requires the itunes feature".to_string(),
        )),
    }
}

/// Prints one line per status change on stderr.
async fn report_status(
    mut status: watch::Receiver<SessionStatus>,
    shutdown: watch::Receiver<bool>,
) {
    let stop = wait_for_shutdown(shutdown);
    tokio::pin!(stop);

    loop {
        let current = *status.borrow_and_update();
        if current.is_unrecoverable() {
            eprintln!("status: {} (giving up)", current);
        } else {
            eprintln!("status: {}", current);
        }

        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = &mut stop => break,
        }
    }
}
