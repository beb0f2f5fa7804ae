use serde::{Deserialize, Serialize};

use super::event::Entity;

/// Account notification types the feed treats specially. Everything else is
/// passed through as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PaymentDue,
    Maintenance,
    Outage,
    VolumeMigrationScheduled,
    VolumeMigrationImminent,
    #[serde(untagged)]
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationSeverity {
    Minor,
    Major,
    Critical,
}

/// Notification attached to the account (not part of the event stream).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountNotification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub label: String,
    #[serde(default)]
    pub message: String,
    pub severity: NotificationSeverity,
    #[serde(default)]
    pub entity: Option<Entity>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileFlags {
    /// Restricted users cannot see account billing.
    #[serde(default)]
    pub restricted: bool,
}

/// Account data the feed derives synthetic notices from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub balance: f64,
    #[serde(default)]
    pub notifications: Vec<AccountNotification>,
    #[serde(default)]
    pub profile: ProfileFlags,
}

impl AccountSnapshot {
    pub fn has_notification(&self, kind: &NotificationKind) -> bool {
        self.notifications.iter().any(|n| &n.kind == kind)
    }
}
