use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::models::{format_date, format_timestamp, Alert, AlertPatch, AlertRecord, NewAlert};
use crate::error::{AppError, AppResult};

/// Lower bound for the re-read interval of a live subscription.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What a live subscription hands to its sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotEvent {
    /// The full current collection, in arrival order.
    Snapshot(Vec<Alert>),
    /// The stream ended unexpectedly; no further events follow.
    Interrupted(String),
}

pub type SnapshotSink = Arc<dyn Fn(SnapshotEvent) + Send + Sync>;

/// Backing store for alert records.
#[async_trait]
pub trait AlertStore: Send + Sync + 'static {
    /// Persist a new alert and return the id assigned to it.
    async fn create(&self, alert: NewAlert) -> AppResult<String>;

    /// Hard-delete by id. `NotFound` if nothing was removed.
    async fn remove(&self, id: &str) -> AppResult<()>;

    /// Apply a partial update; unspecified fields are preserved.
    async fn update(&self, id: &str, patch: AlertPatch) -> AppResult<()>;

    /// Register a sink that receives the full collection on every change.
    ///
    /// The initial snapshot is delivered before this returns, even if the
    /// collection is empty.
    async fn subscribe(&self, sink: SnapshotSink) -> AppResult<Subscription>;
}

struct SnapshotGate {
    sink: Mutex<Option<SnapshotSink>>,
}

impl SnapshotGate {
    fn lock(&self) -> MutexGuard<'_, Option<SnapshotSink>> {
        match self.sink.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Store-side end of a subscription.
///
/// The sink runs while the gate lock is held, so once
/// [`Subscription::unsubscribe`] returns no delivery is in flight and none can
/// start. Sinks must not unsubscribe from inside the callback.
#[derive(Clone)]
pub struct SnapshotPublisher {
    gate: Arc<SnapshotGate>,
}

impl SnapshotPublisher {
    /// Deliver an event; returns `false` once the subscription is closed.
    pub fn publish(&self, event: SnapshotEvent) -> bool {
        let guard = self.gate.lock();
        match guard.as_ref() {
            Some(sink) => {
                sink(event);
                true
            }
            None => false,
        }
    }

    /// Deliver a terminal interruption and close the stream.
    pub fn finish(&self, reason: impl Into<String>) {
        let mut guard = self.gate.lock();
        if let Some(sink) = guard.take() {
            sink(SnapshotEvent::Interrupted(reason.into()));
        }
    }

    pub fn is_open(&self) -> bool {
        self.gate.lock().is_some()
    }
}

/// Single-owner handle for a live subscription. Dropping it unsubscribes.
pub struct Subscription {
    gate: Arc<SnapshotGate>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn open(sink: SnapshotSink) -> (Self, SnapshotPublisher) {
        let gate = Arc::new(SnapshotGate {
            sink: Mutex::new(Some(sink)),
        });
        let publisher = SnapshotPublisher {
            gate: Arc::clone(&gate),
        };
        (Self { gate, task: None }, publisher)
    }

    /// Tie a delivery task to this subscription; it is aborted on unsubscribe.
    pub fn attach(&mut self, task: JoinHandle<()>) {
        if let Some(previous) = self.task.replace(task) {
            previous.abort();
        }
    }

    /// True until unsubscribed or until the store ended the stream.
    pub fn is_active(&self) -> bool {
        self.gate.lock().is_some()
    }

    /// Stop deliveries. Safe to call repeatedly; returns whether a live sink was released.
    pub fn unsubscribe(&mut self) -> bool {
        let released = self.gate.lock().take().is_some();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        released
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

// ============================================================================
// SQLite adapter
// ============================================================================

/// `AlertStore` over an SQLite table. Alerts of one logical collection share the
/// `alerts` table, distinguished by the `collection` column.
#[derive(Clone)]
pub struct SqliteAlertStore {
    pool: SqlitePool,
    collection: String,
    poll_interval: Duration,
    revision: Arc<watch::Sender<u64>>,
}

impl SqliteAlertStore {
    pub fn new(pool: SqlitePool, collection: impl Into<String>, poll_interval: Duration) -> Self {
        let (revision, _) = watch::channel(0u64);
        Self {
            pool,
            collection: collection.into(),
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            revision: Arc::new(revision),
        }
    }

    /// Current collection in arrival order.
    pub async fn list(&self) -> AppResult<Vec<Alert>> {
        fetch_collection(&self.pool, &self.collection).await
    }

    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<Alert>> {
        let record = sqlx::query_as::<_, AlertRecord>(
            r#"
            SELECT
                id, park, date, created_at, updated_at,
                last_found_at, deactivated_at, notification_count, "user"
            FROM alerts
            WHERE id = ? AND collection = ?
            "#,
        )
        .bind(id)
        .bind(&self.collection)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        record.map(Alert::try_from).transpose()
    }

    fn notify_changed(&self) {
        self.revision.send_modify(|rev| *rev = rev.wrapping_add(1));
    }
}

#[async_trait]
impl AlertStore for SqliteAlertStore {
    async fn create(&self, alert: NewAlert) -> AppResult<String> {
        let id = Uuid::new_v4().to_string();
        let record = alert.into_alert(id.clone()).to_record();

        sqlx::query(
            r#"
            INSERT INTO alerts (
                id,
                collection,
                park,
                date,
                created_at,
                updated_at,
                last_found_at,
                deactivated_at,
                notification_count,
                "user"
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&self.collection)
        .bind(&record.park)
        .bind(&record.date)
        .bind(&record.created_at)
        .bind(&record.updated_at)
        .bind(&record.last_found_at)
        .bind(&record.deactivated_at)
        .bind(record.notification_count)
        .bind(&record.user)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error("create", &id, e))?;

        debug!("Stored alert {} in {}", id, self.collection);
        self.notify_changed();
        Ok(id)
    }

    async fn remove(&self, id: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM alerts WHERE id = ? AND collection = ?")
            .bind(id)
            .bind(&self.collection)
            .execute(&self.pool)
            .await
            .map_err(|e| write_error("remove", id, e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(id.to_string()));
        }

        self.notify_changed();
        Ok(())
    }

    async fn update(&self, id: &str, patch: AlertPatch) -> AppResult<()> {
        if patch.is_empty() {
            return match self.find_by_id(id).await? {
                Some(_) => Ok(()),
                None => Err(AppError::NotFound(id.to_string())),
            };
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE alerts SET ");
        {
            let mut set = builder.separated(", ");
            if let Some(scope) = patch.scope {
                set.push("park = ");
                set.push_bind_unseparated(scope.as_str());
            }
            if let Some(date) = patch.target_date {
                set.push("date = ");
                set.push_bind_unseparated(format_date(date));
            }
            if let Some(target) = patch.notify_target {
                set.push("\"user\" = ");
                set.push_bind_unseparated(target.as_str());
            }
            if let Some(updated_at) = patch.updated_at {
                set.push("updated_at = ");
                set.push_bind_unseparated(format_timestamp(updated_at));
            }
            if let Some(last_observed_at) = patch.last_observed_at {
                set.push("last_found_at = ");
                set.push_bind_unseparated(last_observed_at.map(format_timestamp));
            }
            if let Some(deactivated_at) = patch.deactivated_at {
                set.push("deactivated_at = ");
                set.push_bind_unseparated(deactivated_at.map(format_timestamp));
            }
            if let Some(count) = patch.notification_count {
                set.push("notification_count = ");
                set.push_bind_unseparated(i64::from(count));
            }
        }
        builder.push(" WHERE id = ");
        builder.push_bind(id.to_string());
        builder.push(" AND collection = ");
        builder.push_bind(self.collection.clone());

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| write_error("update", id, e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(id.to_string()));
        }

        self.notify_changed();
        Ok(())
    }

    async fn subscribe(&self, sink: SnapshotSink) -> AppResult<Subscription> {
        // Take the receiver first so a write racing the initial read still triggers a re-read.
        let mut changes = self.revision.subscribe();
        let initial = fetch_collection(&self.pool, &self.collection)
            .await
            .map_err(|e| AppError::Subscription(e.to_string()))?;

        let (mut subscription, publisher) = Subscription::open(sink);
        publisher.publish(SnapshotEvent::Snapshot(initial.clone()));

        let pool = self.pool.clone();
        let collection = self.collection.clone();
        let poll_interval = self.poll_interval;

        let task = tokio::spawn(async move {
            let mut last = initial;
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; the initial snapshot already covers it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    changed = changes.changed() => {
                        if changed.is_err() {
                            warn!("Alert store for {} dropped, ending subscription", collection);
                            publisher.finish("alert store closed");
                            return;
                        }
                    }
                    _ = ticker.tick() => {}
                }

                if !publisher.is_open() {
                    return;
                }

                match fetch_collection(&pool, &collection).await {
                    Ok(snapshot) => {
                        if snapshot == last {
                            continue;
                        }
                        last = snapshot.clone();
                        if !publisher.publish(SnapshotEvent::Snapshot(snapshot)) {
                            return;
                        }
                    }
                    Err(e) => {
                        error!("Failed to read alert collection {}: {}", collection, e);
                        publisher.finish(e.to_string());
                        return;
                    }
                }
            }
        });
        subscription.attach(task);

        info!("Subscribed to alert collection {}", self.collection);
        Ok(subscription)
    }
}

async fn fetch_collection(pool: &SqlitePool, collection: &str) -> AppResult<Vec<Alert>> {
    let records = sqlx::query_as::<_, AlertRecord>(
        r#"
        SELECT
            id, park, date, created_at, updated_at,
            last_found_at, deactivated_at, notification_count, "user"
        FROM alerts
        WHERE collection = ?
        ORDER BY rowid ASC
        "#,
    )
    .bind(collection)
    .fetch_all(pool)
    .await
    .map_err(AppError::Database)?;

    let mut alerts = Vec::with_capacity(records.len());
    for record in records {
        let id = record.id.clone();
        match Alert::try_from(record) {
            Ok(alert) => alerts.push(alert),
            Err(e) => warn!("Skipping unreadable alert {} in {}: {}", id, collection, e),
        }
    }
    Ok(alerts)
}

fn write_error(operation: &str, id: &str, err: sqlx::Error) -> AppError {
    error!("Alert {} failed for {}: {:?}", operation, id, err);
    AppError::Write(format!("{operation} {id}: {err}"))
}
