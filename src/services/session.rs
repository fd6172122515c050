use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::db::repository::AlertStore;
use crate::error::AppResult;
use crate::services::clock::Clock;
use crate::services::identity::Identity;
use crate::services::lifecycle::{AlertDraft, AlertLifecycle};
use crate::services::sync::{AlertSync, AlertView};

/// One open dashboard: the live view plus the command side, torn down in order.
pub struct DashboardSession {
    identity: Identity,
    sync: AlertSync,
    lifecycle: AlertLifecycle,
    closed: bool,
}

impl DashboardSession {
    /// Build the session and start the live subscription.
    pub async fn open(
        store: Arc<dyn AlertStore>,
        identity: Identity,
        clock: Arc<dyn Clock>,
    ) -> AppResult<Self> {
        let mut sync = AlertSync::new(Arc::clone(&store));
        sync.start().await?;

        info!("Dashboard session opened for {}", identity.display_name());
        Ok(Self {
            identity,
            sync,
            lifecycle: AlertLifecycle::new(store, clock),
            closed: false,
        })
    }

    /// Open a fresh subscription after the previous one was interrupted.
    pub async fn restart(&mut self) -> AppResult<()> {
        self.sync.start().await?;
        self.closed = false;
        Ok(())
    }

    /// Stop the subscription, then drop dialog state. Safe to call more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.sync.stop();
        self.lifecycle.reset();
        self.closed = true;
        info!("Dashboard session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn new_draft(&self) -> AlertDraft {
        AlertDraft::for_identity(&self.identity)
    }

    pub fn view(&self) -> AlertView {
        self.sync.view()
    }

    pub fn watch(&self) -> watch::Receiver<AlertView> {
        self.sync.watch()
    }

    pub fn sync(&self) -> &AlertSync {
        &self.sync
    }

    pub fn lifecycle(&self) -> &AlertLifecycle {
        &self.lifecycle
    }

    pub fn lifecycle_mut(&mut self) -> &mut AlertLifecycle {
        &mut self.lifecycle
    }
}

impl Drop for DashboardSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Alert, NotifyTarget, ResourceScope};
    use crate::db::repository::testing::{FakeAlertStore, StoreCall};
    use crate::error::AppError;
    use crate::services::clock::FixedClock;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn alert(id: &str) -> Alert {
        let created_at = Utc.with_ymd_and_hms(2025, 1, 3, 12, 0, 0).unwrap();
        Alert {
            id: id.to_string(),
            scope: ResourceScope::CaliforniaAdventure,
            target_date: NaiveDate::from_ymd_opt(2025, 6, 14).unwrap(),
            notify_target: NotifyTarget::Both,
            created_at,
            updated_at: created_at,
            last_observed_at: None,
            deactivated_at: None,
            notification_count: 0,
        }
    }

    async fn open(store: &FakeAlertStore) -> DashboardSession {
        DashboardSession::open(
            Arc::new(store.clone()),
            Identity::new("Ian Example"),
            Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap())),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn open_starts_live_view() {
        let store = FakeAlertStore::with_alerts(vec![alert("A1")]);
        let session = open(&store).await;

        assert!(session.sync().is_running());
        assert_eq!(session.view().alerts.len(), 1);
        assert_eq!(session.new_draft().notify_target, Some(NotifyTarget::Ian));
        assert_eq!(store.calls(), vec![StoreCall::Subscribe]);
    }

    #[tokio::test]
    async fn open_fails_when_subscription_cannot_start() {
        let store = FakeAlertStore::default();
        store.fail_subscribe(true);

        let result = DashboardSession::open(
            Arc::new(store.clone()),
            Identity::new("Bri"),
            Arc::new(FixedClock::new(Utc::now())),
        )
        .await;
        assert!(matches!(result, Err(AppError::Subscription(_))));
    }

    #[tokio::test]
    async fn close_stops_subscription_before_clearing_dialogs() {
        let store = FakeAlertStore::with_alerts(vec![alert("A1")]);
        let mut session = open(&store).await;
        let view = session.view();
        session.lifecycle_mut().request_delete(&view.alerts, "A1");
        let rx = session.watch();

        session.close();
        session.close();

        assert!(session.is_closed());
        assert_eq!(store.open_subscriptions(), 0);
        assert!(session.lifecycle().pending_delete().is_none());

        store.emit(vec![]);
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn drop_releases_subscription() {
        let store = FakeAlertStore::default();
        let session = open(&store).await;
        assert_eq!(store.open_subscriptions(), 1);

        drop(session);
        assert_eq!(store.open_subscriptions(), 0);
    }

    #[tokio::test]
    async fn restart_after_interruption() {
        let store = FakeAlertStore::with_alerts(vec![alert("A1")]);
        let mut session = open(&store).await;

        store.interrupt("network lost");
        assert!(session.view().is_stale());

        session.restart().await.unwrap();
        assert!(!session.view().is_stale());
        assert!(matches!(
            session.restart().await,
            Err(AppError::AlreadySubscribed)
        ));
    }
}
