use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Alert not found: {0}")]
    NotFound(String),

    #[error("Write failed: {0}")]
    Write(String),

    #[error("Subscription interrupted: {0}")]
    Subscription(String),

    #[error("Alert subscription is already active")]
    AlreadySubscribed,

    #[error("Invalid alert record: {0}")]
    InvalidRecord(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Presenter-facing shape of an error: a stable code plus text safe to show inline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorNotice {
    pub code: String,
    pub message: String,
    pub transient: bool,
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Write(_) => "WRITE_FAILED",
            AppError::Subscription(_) => "SUBSCRIPTION_INTERRUPTED",
            AppError::AlreadySubscribed => "ALREADY_SUBSCRIBED",
            AppError::InvalidRecord(_) => "INVALID_RECORD",
            AppError::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Failures the user can resolve by issuing the same command again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Write(_) | AppError::Subscription(_) | AppError::Database(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }

    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg) => msg.clone(),
            AppError::NotFound(_) => "That alert no longer exists".to_string(),
            AppError::Write(_) | AppError::Database(_) => {
                "Could not save the change, please try again".to_string()
            }
            AppError::Subscription(_) => "Live updates stopped, data may be stale".to_string(),
            AppError::AlreadySubscribed => "Live updates are already running".to_string(),
            AppError::InvalidRecord(_) => "An alert record could not be read".to_string(),
        }
    }

    pub fn notice(&self) -> ErrorNotice {
        if let AppError::Database(e) = self {
            tracing::error!("Database error: {:?}", e);
        }

        ErrorNotice {
            code: self.code().to_string(),
            message: self.user_message(),
            transient: self.is_transient(),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_errors_are_transient() {
        let notice = AppError::Write("disk full".to_string()).notice();
        assert_eq!(notice.code, "WRITE_FAILED");
        assert!(notice.transient);
        assert!(notice.message.contains("try again"));
    }

    #[test]
    fn validation_message_is_shown_verbatim() {
        let notice = AppError::Validation("date is required".to_string()).notice();
        assert_eq!(notice.code, "VALIDATION_ERROR");
        assert_eq!(notice.message, "date is required");
        assert!(!notice.transient);
    }

    #[test]
    fn database_errors_hide_details_behind_retry_message() {
        let notice = AppError::Database(sqlx::Error::PoolClosed).notice();
        assert_eq!(notice.code, "DATABASE_ERROR");
        assert!(notice.transient);
        assert!(!notice.message.contains("pool"));
    }

    #[test]
    fn not_found_is_recognised() {
        assert!(AppError::NotFound("a1".to_string()).is_not_found());
        assert!(!AppError::Write("a1".to_string()).is_not_found());
    }
}
