// SPDX-License-Identifier: Apache-2.0

use crate::config::TriggerSettings;
use crate::updater::Updater;
use custodian_model::UpdateEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{error, info};

/// Drives the initial cache population and the periodic full updates.
/// Each run is bounded by the configured per-run timeout; a timed-out run
/// releases the lock and the next interval retries.
pub fn spawn_trigger(
    updater: Arc<Updater>,
    events: mpsc::Receiver<UpdateEvent>,
    settings: TriggerSettings,
    ready: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match run_once(&updater, &settings).await {
            Ok(()) => {
                ready.store(true, Ordering::Relaxed);
                info!("initial metadata population complete");
            }
            Err(message) => error!(error = %message, "initial metadata population failed"),
        }
        updater.start_receiving_events(events);

        let mut interval = tokio::time::interval(settings.update_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; the initial run already happened.
        interval.tick().await;
        loop {
            interval.tick().await;
            match run_once(&updater, &settings).await {
                Ok(()) => ready.store(true, Ordering::Relaxed),
                Err(message) => error!(error = %message, "periodic metadata update failed"),
            }
        }
    })
}

async fn run_once(updater: &Updater, settings: &TriggerSettings) -> Result<(), String> {
    let update = async {
        let mut txn = updater.lock().await;
        txn.perform_full_update().await
    };
    match timeout(settings.run_timeout, update).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("full update timed out".to_string()),
    }
}
