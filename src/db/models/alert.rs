use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::AppError;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Which park an alert watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceScope {
    Disneyland,
    CaliforniaAdventure,
    Both,
}

impl ResourceScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceScope::Disneyland => "DL",
            ResourceScope::CaliforniaAdventure => "DCA",
            ResourceScope::Both => "Both",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResourceScope::Disneyland => "Disneyland",
            ResourceScope::CaliforniaAdventure => "Disney California Adventure",
            ResourceScope::Both => "Any Park",
        }
    }
}

impl FromStr for ResourceScope {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DL" => Ok(ResourceScope::Disneyland),
            "DCA" => Ok(ResourceScope::CaliforniaAdventure),
            "Both" => Ok(ResourceScope::Both),
            other => Err(AppError::InvalidRecord(format!("unknown park '{other}'"))),
        }
    }
}

impl fmt::Display for ResourceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who receives notifications for an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyTarget {
    Bri,
    Ian,
    Both,
}

impl NotifyTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyTarget::Bri => "bri",
            NotifyTarget::Ian => "ian",
            NotifyTarget::Both => "both",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NotifyTarget::Bri => "Bri",
            NotifyTarget::Ian => "Ian",
            NotifyTarget::Both => "Both",
        }
    }
}

impl FromStr for NotifyTarget {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bri" => Ok(NotifyTarget::Bri),
            "ian" => Ok(NotifyTarget::Ian),
            "both" => Ok(NotifyTarget::Both),
            other => Err(AppError::InvalidRecord(format!("unknown user '{other}'"))),
        }
    }
}

impl fmt::Display for NotifyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertStatus {
    Active,
    Paused,
}

impl AlertStatus {
    pub fn label(&self) -> &'static str {
        match self {
            AlertStatus::Active => "Active",
            AlertStatus::Paused => "Paused",
        }
    }
}

/// A watch alert as held in the local view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub id: String,
    pub scope: ResourceScope,
    pub target_date: NaiveDate,
    pub notify_target: NotifyTarget,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Last time the external matcher saw the watched condition satisfied.
    pub last_observed_at: Option<DateTime<Utc>>,
    /// Non-null while the alert is paused.
    pub deactivated_at: Option<DateTime<Utc>>,
    pub notification_count: u32,
}

impl Alert {
    pub fn status(&self) -> AlertStatus {
        if self.deactivated_at.is_some() {
            AlertStatus::Paused
        } else {
            AlertStatus::Active
        }
    }

    pub fn is_deactivated(&self) -> bool {
        self.deactivated_at.is_some()
    }

    pub fn to_record(&self) -> AlertRecord {
        AlertRecord {
            id: self.id.clone(),
            park: self.scope.as_str().to_string(),
            date: format_date(self.target_date),
            created_at: format_timestamp(self.created_at),
            updated_at: format_timestamp(self.updated_at),
            last_found_at: self.last_observed_at.map(format_timestamp),
            deactivated_at: self.deactivated_at.map(format_timestamp),
            notification_count: i64::from(self.notification_count),
            user: self.notify_target.as_str().to_string(),
        }
    }
}

/// Persisted representation shared with the external notifier.
///
/// Serializes to exactly the wire fields (`park`, `date`, `createdAt`, `updatedAt`,
/// `lastFoundAt`, `deactivatedAt`, `notificationCount`, `user`); the id is the
/// document key and is not part of the body.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    #[serde(skip)]
    pub id: String,
    pub park: String,
    pub date: String,
    pub created_at: String,
    pub updated_at: String,
    pub last_found_at: Option<String>,
    pub deactivated_at: Option<String>,
    pub notification_count: i64,
    pub user: String,
}

impl TryFrom<AlertRecord> for Alert {
    type Error = AppError;

    fn try_from(record: AlertRecord) -> Result<Self, Self::Error> {
        let notification_count = u32::try_from(record.notification_count).map_err(|_| {
            AppError::InvalidRecord(format!(
                "notificationCount {} out of range",
                record.notification_count
            ))
        })?;

        Ok(Alert {
            scope: record.park.parse()?,
            target_date: parse_date(&record.date)?,
            notify_target: record.user.parse()?,
            created_at: parse_timestamp(&record.created_at)?,
            updated_at: parse_timestamp(&record.updated_at)?,
            last_observed_at: record
                .last_found_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
            deactivated_at: record
                .deactivated_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
            notification_count,
            id: record.id,
        })
    }
}

/// Fields for a new alert; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAlert {
    pub scope: ResourceScope,
    pub target_date: NaiveDate,
    pub notify_target: NotifyTarget,
    /// Used for both `createdAt` and `updatedAt`.
    pub created_at: DateTime<Utc>,
}

impl NewAlert {
    /// Materialize the alert with counters and flags zeroed.
    pub fn into_alert(self, id: String) -> Alert {
        Alert {
            id,
            scope: self.scope,
            target_date: self.target_date,
            notify_target: self.notify_target,
            created_at: self.created_at,
            updated_at: self.created_at,
            last_observed_at: None,
            deactivated_at: None,
            notification_count: 0,
        }
    }
}

/// Partial update. `None` leaves a field untouched; for nullable fields
/// `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertPatch {
    pub scope: Option<ResourceScope>,
    pub target_date: Option<NaiveDate>,
    pub notify_target: Option<NotifyTarget>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_observed_at: Option<Option<DateTime<Utc>>>,
    pub deactivated_at: Option<Option<DateTime<Utc>>>,
    pub notification_count: Option<u32>,
}

impl AlertPatch {
    /// Clear the pause, reset the counter and bump `updatedAt`.
    pub fn reactivate(now: DateTime<Utc>) -> Self {
        AlertPatch {
            updated_at: Some(now),
            deactivated_at: Some(None),
            notification_count: Some(0),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == AlertPatch::default()
    }

    #[cfg(test)]
    pub(crate) fn apply(&self, alert: &mut Alert) {
        if let Some(scope) = self.scope {
            alert.scope = scope;
        }
        if let Some(date) = self.target_date {
            alert.target_date = date;
        }
        if let Some(target) = self.notify_target {
            alert.notify_target = target;
        }
        if let Some(updated_at) = self.updated_at {
            alert.updated_at = updated_at;
        }
        if let Some(last_observed_at) = self.last_observed_at {
            alert.last_observed_at = last_observed_at;
        }
        if let Some(deactivated_at) = self.deactivated_at {
            alert.deactivated_at = deactivated_at;
        }
        if let Some(count) = self.notification_count {
            alert.notification_count = count;
        }
    }
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(value: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|e| AppError::InvalidRecord(format!("invalid date '{value}': {e}")))
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| AppError::InvalidRecord(format!("invalid timestamp '{value}': {e}")))
}
