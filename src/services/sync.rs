use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::db::models::Alert;
use crate::db::repository::{AlertStore, SnapshotEvent, SnapshotSink, Subscription};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SyncStatus {
    /// No snapshot received yet.
    #[default]
    Idle,
    Live,
    /// The subscription ended unexpectedly; `alerts` holds the last good snapshot.
    Stale { reason: String },
}

/// Materialized local view of the alert collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertView {
    /// Sorted by target date, ties in arrival order.
    pub alerts: Vec<Alert>,
    pub status: SyncStatus,
    /// Bumped on every applied event.
    pub revision: u64,
}

impl AlertView {
    pub fn is_stale(&self) -> bool {
        matches!(self.status, SyncStatus::Stale { .. })
    }

    pub fn find(&self, id: &str) -> Option<&Alert> {
        self.alerts.iter().find(|alert| alert.id == id)
    }
}

/// Replace-not-patch: the snapshot becomes the whole list, stably sorted by date.
pub fn materialize(snapshot: Vec<Alert>) -> Vec<Alert> {
    let mut alerts = snapshot;
    alerts.sort_by_key(|alert| alert.target_date);
    alerts
}

/// Owns the one live subscription to the alert store and republishes the
/// sorted collection to observers through a `watch` channel.
pub struct AlertSync {
    store: Arc<dyn AlertStore>,
    view: Arc<watch::Sender<AlertView>>,
    subscription: Option<Subscription>,
}

impl AlertSync {
    pub fn new(store: Arc<dyn AlertStore>) -> Self {
        let (view, _) = watch::channel(AlertView::default());
        Self {
            store,
            view: Arc::new(view),
            subscription: None,
        }
    }

    /// Open the subscription.
    ///
    /// Fails with `AlreadySubscribed` while a subscription is live. After the
    /// store interrupted the stream, `start` may be called again to open a fresh one.
    pub async fn start(&mut self) -> AppResult<()> {
        if self.subscription.as_ref().is_some_and(Subscription::is_active) {
            error!("Alert subscription start requested while one is already active");
            return Err(AppError::AlreadySubscribed);
        }
        if let Some(mut ended) = self.subscription.take() {
            ended.unsubscribe();
        }

        let view = Arc::clone(&self.view);
        let sink: SnapshotSink = Arc::new(move |event| apply_event(&view, event));

        match self.store.subscribe(sink).await {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                info!("Alert sync started");
                Ok(())
            }
            Err(e) => {
                error!("Failed to open alert subscription: {}", e);
                let reason = e.to_string();
                self.view.send_modify(|current| {
                    current.status = SyncStatus::Stale { reason };
                    current.revision += 1;
                });
                Err(e)
            }
        }
    }

    /// Release the subscription. No-op when not started; safe to repeat.
    pub fn stop(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            if subscription.unsubscribe() {
                info!("Alert sync stopped");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.subscription.as_ref().is_some_and(Subscription::is_active)
    }

    /// Observer handle; changes whenever a snapshot or interruption is applied.
    pub fn watch(&self) -> watch::Receiver<AlertView> {
        self.view.subscribe()
    }

    pub fn view(&self) -> AlertView {
        self.view.borrow().clone()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.view.borrow().alerts.clone()
    }
}

impl Drop for AlertSync {
    fn drop(&mut self) {
        self.stop();
    }
}

fn apply_event(view: &watch::Sender<AlertView>, event: SnapshotEvent) {
    match event {
        SnapshotEvent::Snapshot(snapshot) => {
            let alerts = materialize(snapshot);
            debug!("Applying alert snapshot with {} alert(s)", alerts.len());
            view.send_modify(|current| {
                current.alerts = alerts;
                current.status = SyncStatus::Live;
                current.revision += 1;
            });
        }
        SnapshotEvent::Interrupted(reason) => {
            error!("Alert subscription interrupted, data may be stale: {}", reason);
            view.send_modify(|current| {
                current.status = SyncStatus::Stale { reason };
                current.revision += 1;
            });
        }
    }
}
