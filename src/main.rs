use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use park_alerts::config::Config;
use park_alerts::db::SqliteAlertStore;
use park_alerts::services::{
    clock::{Clock, SystemClock},
    freshness::FreshnessEncoder,
    identity::Identity,
    init,
    session::DashboardSession,
    sync::{AlertView, SyncStatus},
};

/// Wait before reopening an interrupted subscription.
const RESTART_DELAY: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "park_alerts=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Park Alerts dashboard");

    let pool = init::init_db(&config).await?;

    let store = Arc::new(SqliteAlertStore::new(
        pool.clone(),
        config.alerts.collection.clone(),
        Duration::from_secs(config.alerts.poll_interval_seconds),
    ));
    let identity = Identity::new(
        config
            .dashboard
            .display_name
            .clone()
            .unwrap_or_default(),
    );
    if identity.default_notify_target().is_none() {
        tracing::warn!("No default notify target for this identity; new alerts need one picked");
    }

    let clock = Arc::new(SystemClock);
    let encoder = FreshnessEncoder::default();

    let mut session = DashboardSession::open(store, identity, clock.clone()).await?;
    tracing::info!(
        "Watching alert collection {} (refresh every {}s)",
        config.alerts.collection,
        config.dashboard.refresh_seconds
    );

    let mut view_rx = session.watch();
    render(&view_rx.borrow_and_update(), &encoder, clock.now());

    let mut refresh =
        tokio::time::interval(Duration::from_secs(config.dashboard.refresh_seconds.max(1)));
    refresh.tick().await;

    let mut restart_at: Option<Instant> = None;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received, closing dashboard session");
                break;
            }
            changed = view_rx.changed() => {
                if changed.is_err() {
                    tracing::warn!("Alert view closed");
                    break;
                }
                let view = view_rx.borrow_and_update().clone();
                session.lifecycle_mut().refresh(&view.alerts);
                render(&view, &encoder, clock.now());

                if let SyncStatus::Stale { reason } = &view.status {
                    tracing::warn!(
                        "Live updates stopped ({}); retrying in {}s",
                        reason,
                        RESTART_DELAY.as_secs()
                    );
                    restart_at = Some(Instant::now() + RESTART_DELAY);
                }
            }
            _ = tokio::time::sleep_until(restart_at.unwrap_or_else(Instant::now)), if restart_at.is_some() => {
                restart_at = None;
                if let Err(e) = session.restart().await {
                    let notice = serde_json::to_string(&e.notice()).unwrap_or_else(|_| e.to_string());
                    tracing::error!("Failed to restart alert sync: {}", notice);
                }
            }
            _ = refresh.tick() => {
                render(&session.view(), &encoder, clock.now());
            }
        }
    }

    // Subscription first, so no snapshot lands after the pool is gone.
    session.close();
    pool.close().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn render(view: &AlertView, encoder: &FreshnessEncoder, now: DateTime<Utc>) {
    let status = match &view.status {
        SyncStatus::Idle => "waiting for first snapshot",
        SyncStatus::Live => "live",
        SyncStatus::Stale { .. } => "data may be stale",
    };
    tracing::info!("{} alert(s), {}", view.alerts.len(), status);

    for alert in &view.alerts {
        let seen = match encoder.encode(alert.last_observed_at, now) {
            Some(freshness) => format!("last seen {} ago {}", freshness.label, freshness.color),
            None => "never seen".to_string(),
        };
        tracing::info!(
            "  {} {} for {} [{}] notified {}x, {}",
            alert.target_date,
            alert.scope.label(),
            alert.notify_target.label(),
            alert.status().label(),
            alert.notification_count,
            seen
        );
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            futures::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to bind SIGTERM: {}", e);
                futures::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = futures::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
