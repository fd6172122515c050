//! In-memory `AlertStore` for unit tests: records every call, can fail writes on
//! demand and lets tests push snapshots or interruptions by hand.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::alert::{AlertStore, SnapshotEvent, SnapshotPublisher, SnapshotSink, Subscription};
use crate::db::models::{Alert, AlertPatch, NewAlert};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StoreCall {
    Create(NewAlert),
    Remove(String),
    Update(String, AlertPatch),
    Subscribe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailMode {
    Write,
    NotFound,
}

#[derive(Default)]
struct FakeState {
    alerts: Vec<Alert>,
    next_id: u32,
    calls: Vec<StoreCall>,
    fail_writes: Option<FailMode>,
    fail_subscribe: bool,
    publishers: Vec<SnapshotPublisher>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeAlertStore {
    state: Arc<Mutex<FakeState>>,
}

impl FakeAlertStore {
    pub(crate) fn with_alerts(alerts: Vec<Alert>) -> Self {
        let store = Self::default();
        store.state.lock().unwrap().alerts = alerts;
        store
    }

    pub(crate) fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn write_calls(&self) -> Vec<StoreCall> {
        self.calls()
            .into_iter()
            .filter(|call| *call != StoreCall::Subscribe)
            .collect()
    }

    pub(crate) fn alerts(&self) -> Vec<Alert> {
        self.state.lock().unwrap().alerts.clone()
    }

    pub(crate) fn fail_writes(&self, mode: Option<FailMode>) {
        self.state.lock().unwrap().fail_writes = mode;
    }

    pub(crate) fn fail_subscribe(&self, fail: bool) {
        self.state.lock().unwrap().fail_subscribe = fail;
    }

    /// Deliver an arbitrary snapshot to every open subscription.
    pub(crate) fn emit(&self, alerts: Vec<Alert>) {
        for publisher in self.open_publishers() {
            publisher.publish(SnapshotEvent::Snapshot(alerts.clone()));
        }
    }

    /// End every open subscription with an interruption.
    pub(crate) fn interrupt(&self, reason: &str) {
        for publisher in self.open_publishers() {
            publisher.finish(reason);
        }
    }

    pub(crate) fn open_subscriptions(&self) -> usize {
        self.open_publishers().len()
    }

    fn open_publishers(&self) -> Vec<SnapshotPublisher> {
        let mut state = self.state.lock().unwrap();
        state.publishers.retain(SnapshotPublisher::is_open);
        state.publishers.clone()
    }

    fn publish_current(&self) {
        let alerts = self.alerts();
        self.emit(alerts);
    }

    fn check_write(state: &FakeState, id: &str) -> AppResult<()> {
        match state.fail_writes {
            Some(FailMode::Write) => Err(AppError::Write(format!("injected failure for {id}"))),
            Some(FailMode::NotFound) => Err(AppError::NotFound(id.to_string())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AlertStore for FakeAlertStore {
    async fn create(&self, alert: NewAlert) -> AppResult<String> {
        let id = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(StoreCall::Create(alert.clone()));
            Self::check_write(&state, "new alert")?;
            state.next_id += 1;
            let id = format!("A{}", state.next_id);
            state.alerts.push(alert.into_alert(id.clone()));
            id
        };
        self.publish_current();
        Ok(id)
    }

    async fn remove(&self, id: &str) -> AppResult<()> {
        {
            let mut state = self.state.lock().unwrap();
            state.calls.push(StoreCall::Remove(id.to_string()));
            Self::check_write(&state, id)?;
            let before = state.alerts.len();
            state.alerts.retain(|alert| alert.id != id);
            if state.alerts.len() == before {
                return Err(AppError::NotFound(id.to_string()));
            }
        }
        self.publish_current();
        Ok(())
    }

    async fn update(&self, id: &str, patch: AlertPatch) -> AppResult<()> {
        {
            let mut state = self.state.lock().unwrap();
            state
                .calls
                .push(StoreCall::Update(id.to_string(), patch.clone()));
            Self::check_write(&state, id)?;
            let alert = state
                .alerts
                .iter_mut()
                .find(|alert| alert.id == id)
                .ok_or_else(|| AppError::NotFound(id.to_string()))?;
            patch.apply(alert);
        }
        self.publish_current();
        Ok(())
    }

    async fn subscribe(&self, sink: SnapshotSink) -> AppResult<Subscription> {
        let initial = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(StoreCall::Subscribe);
            if state.fail_subscribe {
                return Err(AppError::Subscription("injected subscribe failure".to_string()));
            }
            state.alerts.clone()
        };

        let (subscription, publisher) = Subscription::open(sink);
        publisher.publish(SnapshotEvent::Snapshot(initial));
        self.state.lock().unwrap().publishers.push(publisher);
        Ok(subscription)
    }
}
