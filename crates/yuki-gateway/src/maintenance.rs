//! Background housekeeping: audio cache purge and idle session eviction.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use yuki_core::config::{AudioConfig, MaintenanceConfig};
use yuki_core::TurnProcessor;

#[derive(Debug, Clone, Copy)]
pub struct MaintenancePolicy {
    pub interval: Duration,
    pub session_idle: Duration,
    pub audio_max_age: Duration,
    pub audio_max_files: usize,
}

impl MaintenancePolicy {
    pub fn from_config(maintenance: &MaintenanceConfig, audio: &AudioConfig) -> Self {
        Self {
            interval: Duration::from_secs(maintenance.interval_secs.max(1)),
            session_idle: Duration::from_secs(maintenance.session_idle_secs),
            audio_max_age: Duration::from_secs(audio.max_age_secs),
            audio_max_files: audio.max_files,
        }
    }
}

/// One housekeeping pass. Returns `(files_removed, sessions_evicted)`.
pub async fn run_once(processor: &TurnProcessor, policy: &MaintenancePolicy) -> (usize, usize) {
    let removed = match processor
        .audio()
        .cache()
        .purge(policy.audio_max_age, policy.audio_max_files)
        .await
    {
        Ok(report) => {
            if report.removed > 0 {
                tracing::info!(
                    "Audio cache purge: removed {} files ({} kept)",
                    report.removed,
                    report.kept
                );
            }
            report.removed
        }
        Err(e) => {
            tracing::warn!("Audio cache purge failed: {}", e);
            0
        }
    };

    let sessions = processor.sessions();
    let evicted = sessions.evict_idle(policy.session_idle);
    if evicted > 0 {
        tracing::info!(
            "Session cleanup: removed {} idle sessions ({} remaining)",
            evicted,
            sessions.count()
        );
    }

    (removed, evicted)
}

/// Spawn the periodic housekeeping task. Send `true` on the returned
/// sender to stop it.
pub fn start(processor: Arc<TurnProcessor>, policy: MaintenancePolicy) -> watch::Sender<bool> {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(policy.interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    run_once(&processor, &policy).await;
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Maintenance task shutting down");
                        break;
                    }
                }
            }
        }
    });

    shutdown_tx
}
