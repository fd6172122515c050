use crate::db::models::NotifyTarget;

/// The signed-in user, as handed over by the sign-in flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    display_name: String,
}

impl Identity {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// First word of the display name, lowercased.
    pub fn notify_handle(&self) -> Option<String> {
        self.display_name
            .split_whitespace()
            .next()
            .map(|word| word.to_lowercase())
    }

    /// Pre-selected notify target for new alerts; `None` when the handle
    /// matches no known recipient and the user has to pick one.
    pub fn default_notify_target(&self) -> Option<NotifyTarget> {
        self.notify_handle()?.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_target_comes_from_first_name() {
        assert_eq!(
            Identity::new("Bri Example").default_notify_target(),
            Some(NotifyTarget::Bri)
        );
        assert_eq!(
            Identity::new("  IAN  ").default_notify_target(),
            Some(NotifyTarget::Ian)
        );
    }

    #[test]
    fn unknown_or_empty_names_have_no_default() {
        assert_eq!(Identity::new("Morgan Lee").notify_handle().as_deref(), Some("morgan"));
        assert_eq!(Identity::new("Morgan Lee").default_notify_target(), None);
        assert_eq!(Identity::new("").notify_handle(), None);
        assert_eq!(Identity::new("").default_notify_target(), None);
    }
}
