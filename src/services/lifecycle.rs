use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, error, info, warn};

use crate::db::models::{Alert, AlertPatch, NewAlert, NotifyTarget, ResourceScope};
use crate::db::repository::AlertStore;
use crate::error::{AppError, AppResult};
use crate::services::clock::Clock;
use crate::services::identity::Identity;

/// Contents of the "add alert" form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertDraft {
    pub scope: Option<ResourceScope>,
    pub target_date: Option<NaiveDate>,
    pub notify_target: Option<NotifyTarget>,
}

impl AlertDraft {
    /// Fresh form: both parks, no date, notify target pre-selected from the identity.
    pub fn for_identity(identity: &Identity) -> Self {
        Self {
            scope: Some(ResourceScope::Both),
            target_date: None,
            notify_target: identity.default_notify_target(),
        }
    }

    pub fn is_submittable(&self) -> bool {
        self.scope.is_some() && self.target_date.is_some() && self.notify_target.is_some()
    }
}

/// Commands that move alerts through their lifecycle, plus the dialog state
/// (pending delete confirmation, details panel) the presenter renders.
///
/// Nothing here mutates the local view: the next store snapshot is the
/// authoritative outcome of every command.
pub struct AlertLifecycle {
    store: Arc<dyn AlertStore>,
    clock: Arc<dyn Clock>,
    pending_delete: Option<Alert>,
    details: Option<Alert>,
}

impl AlertLifecycle {
    pub fn new(store: Arc<dyn AlertStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            pending_delete: None,
            details: None,
        }
    }

    /// Create a new active alert. Missing fields are rejected before the store is touched.
    pub async fn submit(
        &self,
        scope: Option<ResourceScope>,
        target_date: Option<NaiveDate>,
        notify_target: Option<NotifyTarget>,
    ) -> AppResult<String> {
        let (scope, target_date, notify_target) = match (scope, target_date, notify_target) {
            (Some(scope), Some(date), Some(target)) => (scope, date, target),
            (scope, date, target) => {
                let missing: Vec<&str> = [
                    scope.is_none().then_some("park"),
                    date.is_none().then_some("date"),
                    target.is_none().then_some("user"),
                ]
                .into_iter()
                .flatten()
                .collect();
                let message = format!("Missing required field(s): {}", missing.join(", "));
                debug!("Rejected alert submission: {}", message);
                return Err(AppError::Validation(message));
            }
        };

        let alert = NewAlert {
            scope,
            target_date,
            notify_target,
            created_at: self.clock.now(),
        };

        match self.store.create(alert).await {
            Ok(id) => {
                info!(
                    "Created alert {} for {} on {} ({})",
                    id, scope, target_date, notify_target
                );
                Ok(id)
            }
            Err(e) => {
                error!("Failed to create alert: {}", e);
                Err(e)
            }
        }
    }

    /// Submit the form. On success the park and date are reset for the next
    /// entry; the notify target is kept. On failure the draft is left as is.
    pub async fn submit_draft(&self, draft: &mut AlertDraft) -> AppResult<String> {
        let id = self
            .submit(draft.scope, draft.target_date, draft.notify_target)
            .await?;
        draft.scope = Some(ResourceScope::Both);
        draft.target_date = None;
        Ok(id)
    }

    /// Ask for confirmation before deleting. Returns false when the alert is not
    /// in the current view; the store is never touched here.
    pub fn request_delete(&mut self, view: &[Alert], id: &str) -> bool {
        match view.iter().find(|alert| alert.id == id) {
            Some(alert) => {
                self.pending_delete = Some(alert.clone());
                true
            }
            None => {
                warn!("Delete requested for alert {} which is not in the view", id);
                false
            }
        }
    }

    /// Hard-delete the alert awaiting confirmation.
    ///
    /// A write failure keeps the confirmation pending so the user can retry. An
    /// alert that is already gone counts as deleted.
    pub async fn confirm_delete(&mut self, id: &str) -> AppResult<()> {
        if self.pending_delete.as_ref().map(|alert| alert.id.as_str()) != Some(id) {
            warn!("Delete confirmed for alert {} without a matching request", id);
            return Err(AppError::Validation(
                "No delete is awaiting confirmation for this alert".to_string(),
            ));
        }

        match self.store.remove(id).await {
            Ok(()) => {
                info!("Deleted alert {}", id);
            }
            Err(e) if e.is_not_found() => {
                info!("Alert {} was already deleted", id);
            }
            Err(e) => {
                error!("Failed to delete alert {}: {}", id, e);
                return Err(e);
            }
        }

        self.pending_delete = None;
        if self.details.as_ref().is_some_and(|alert| alert.id == id) {
            self.details = None;
        }
        Ok(())
    }

    pub fn cancel_delete(&mut self) {
        if let Some(alert) = self.pending_delete.take() {
            debug!("Delete of alert {} cancelled", alert.id);
        }
    }

    /// Clear the pause and reset the notification counter.
    pub async fn reactivate(&self, alert: &Alert) -> AppResult<()> {
        if !alert.is_deactivated() {
            return Err(AppError::Validation(format!(
                "Alert {} is already active",
                alert.id
            )));
        }

        // Keeps updatedAt >= createdAt even if the local clock lags the writer's.
        let now = self.clock.now().max(alert.created_at);

        match self.store.update(&alert.id, AlertPatch::reactivate(now)).await {
            Ok(()) => {
                info!("Reactivated alert {}", alert.id);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                warn!("Alert {} vanished before it could be reactivated", alert.id);
                Ok(())
            }
            Err(e) => {
                error!("Failed to reactivate alert {}: {}", alert.id, e);
                Err(e)
            }
        }
    }

    pub fn show_details(&mut self, view: &[Alert], id: &str) -> bool {
        match view.iter().find(|alert| alert.id == id) {
            Some(alert) => {
                self.details = Some(alert.clone());
                true
            }
            None => false,
        }
    }

    pub fn close_details(&mut self) {
        self.details = None;
    }

    pub fn details(&self) -> Option<&Alert> {
        self.details.as_ref()
    }

    pub fn pending_delete(&self) -> Option<&Alert> {
        self.pending_delete.as_ref()
    }

    /// Re-read dialog contents from a fresh snapshot. Alerts that disappeared
    /// close their dialogs.
    pub fn refresh(&mut self, view: &[Alert]) {
        if let Some(pending) = self.pending_delete.take() {
            match view.iter().find(|alert| alert.id == pending.id) {
                Some(current) => self.pending_delete = Some(current.clone()),
                None => debug!("Pending delete of {} already satisfied", pending.id),
            }
        }
        if let Some(shown) = self.details.take() {
            self.details = view.iter().find(|alert| alert.id == shown.id).cloned();
        }
    }

    /// Drop all dialog state.
    pub fn reset(&mut self) {
        self.pending_delete = None;
        self.details = None;
    }
}
