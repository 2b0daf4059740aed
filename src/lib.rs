pub mod application;
pub mod domain;
pub mod infrastructure;

use application::commands::{
    load_prayer_times_impl, refresh_if_stale_impl, request_notification_permission_impl, AppState,
};
use domain::models::Coordinates;
use infrastructure::error::InfraError;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

const REFRESH_PERIOD: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub workspace_root: PathBuf,
    pub device_position: Option<Coordinates>,
    /// Evaluate a single tick, print today's table and countdown, then exit.
    pub once: bool,
}

pub async fn run(options: RunOptions) -> Result<(), InfraError> {
    let state = Arc::new(AppState::new(
        options.workspace_root,
        options.device_position,
    )?);

    if state.settings()?.app.notifications_enabled {
        if let Err(error) = request_notification_permission_impl(&state) {
            state.command_error("request_notification_permission", &error);
        }
    }

    let loaded = match load_prayer_times_impl(&state, None).await {
        Ok(response) => Some(response),
        Err(error) => {
            state.command_error("load_prayer_times", &error);
            None
        }
    };

    if options.once {
        let countdown = state.tick_loop().tick_once()?;
        let report = serde_json::json!({
            "prayerTimes": loaded,
            "countdown": countdown,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ticks = tokio::spawn(state.tick_loop().run(shutdown_rx.clone()));
    let refresher = tokio::spawn(refresh_loop(Arc::clone(&state), shutdown_rx));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    shutdown_tx.send_replace(true);

    if let Err(error) = ticks.await {
        tracing::warn!(%error, "tick loop task ended abnormally");
    }
    if let Err(error) = refresher.await {
        tracing::warn!(%error, "refresh task ended abnormally");
    }
    Ok(())
}

/// Keeps today's table loaded across midnight and after an offline start.
async fn refresh_loop(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(REFRESH_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(error) = refresh_if_stale_impl(&state).await {
                    state.command_error("refresh_prayer_times", &error);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
