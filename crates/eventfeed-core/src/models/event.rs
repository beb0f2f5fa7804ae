use std::collections::HashSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::format::format_time_remaining;

/// Lifecycle status reported by the API for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Scheduled,
    Started,
    Finished,
    Failed,
    Notification,
}

impl EventStatus {
    pub fn phase(&self) -> LifecyclePhase {
        match self {
            Self::Scheduled | Self::Started => LifecyclePhase::InProgress,
            Self::Finished | Self::Failed | Self::Notification => LifecyclePhase::Settled,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Started => "started",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Notification => "notification",
        }
    }
}

/// The two display phases an event can be classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    InProgress,
    Settled,
}

macro_rules! event_actions {
    ($($variant:ident => $name:literal,)*) => {
        /// Operation kind an event describes.
        ///
        /// Kinds this build does not know about decode into `Other` instead of
        /// failing the record.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum EventAction {
            $($variant,)*
            Other(String),
        }

        impl EventAction {
            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $name,)*
                    Self::Other(name) => name,
                }
            }
        }

        impl From<String> for EventAction {
            fn from(name: String) -> Self {
                match name.as_str() {
                    $($name => Self::$variant,)*
                    _ => Self::Other(name),
                }
            }
        }
    };
}

event_actions! {
    AccountUpdate => "account_update",
    AccountSettingsUpdate => "account_settings_update",
    BackupsEnable => "backups_enable",
    BackupsRestore => "backups_restore",
    DiskCreate => "disk_create",
    DiskDelete => "disk_delete",
    DiskImagize => "disk_imagize",
    DiskResize => "disk_resize",
    ImageDelete => "image_delete",
    LinodeBoot => "linode_boot",
    LinodeClone => "linode_clone",
    LinodeCreate => "linode_create",
    LinodeDelete => "linode_delete",
    LinodeMigrate => "linode_migrate",
    LinodeReboot => "linode_reboot",
    LinodeRebuild => "linode_rebuild",
    LinodeResize => "linode_resize",
    LinodeShutdown => "linode_shutdown",
    LinodeSnapshot => "linode_snapshot",
    PasswordReset => "password_reset",
    ProfileUpdate => "profile_update",
    TagCreate => "tag_create",
    TagDelete => "tag_delete",
    TicketCreate => "ticket_create",
    TicketReply => "ticket_reply",
    UserSshKeyAdd => "user_ssh_key_add",
    VolumeAttach => "volume_attach",
    VolumeClone => "volume_clone",
    VolumeCreate => "volume_create",
    VolumeDelete => "volume_delete",
    VolumeDetach => "volume_detach",
    VolumeMigrate => "volume_migrate",
    VolumeResize => "volume_resize",
}

impl From<EventAction> for String {
    fn from(action: EventAction) -> Self {
        action.as_str().to_string()
    }
}

impl std::fmt::Display for EventAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EventAction {
    /// Actions whose secondary entity is the resource actually being changed
    /// (a clone targets the secondary entity, not the source).
    pub fn affects_secondary_entity(&self) -> bool {
        matches!(self, Self::LinodeClone | Self::VolumeClone)
    }
}

/// Weak reference to the resource an event concerns. Display linking only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: u64,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub label: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum EventRecordError {
    #[error("event record has no id")]
    MissingId,
    #[error("event {id} could not be decoded: {source}")]
    Malformed {
        id: u64,
        #[source]
        source: serde_json::Error,
    },
}

/// A record describing one asynchronous operation's lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub action: EventAction,
    pub status: EventStatus,
    pub created: NaiveDateTime,
    #[serde(default)]
    pub percent_complete: Option<u8>,
    #[serde(default)]
    pub time_remaining: Option<String>,
    #[serde(default)]
    pub entity: Option<Entity>,
    #[serde(default)]
    pub secondary_entity: Option<Entity>,
    #[serde(default)]
    pub seen: bool,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// Completion estimate for an operation that is still running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub percent: Option<u8>,
    pub time_remaining: Option<String>,
}

impl Event {
    /// Decode a single raw API record.
    ///
    /// The id is checked first so a record without one is reported as such
    /// rather than as a generic decode failure.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, EventRecordError> {
        let id = value
            .get("id")
            .and_then(|v| v.as_u64())
            .ok_or(EventRecordError::MissingId)?;

        serde_json::from_value(value.clone())
            .map_err(|source| EventRecordError::Malformed { id, source })
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.status.phase()
    }

    pub fn is_in_progress(&self) -> bool {
        self.phase() == LifecyclePhase::InProgress
    }

    pub fn is_settled(&self) -> bool {
        self.phase() == LifecyclePhase::Settled
    }

    /// Progress information, only while the operation is in progress.
    /// Settled events report `None` even if the API still carries values.
    pub fn progress(&self) -> Option<Progress> {
        if !self.is_in_progress() {
            return None;
        }
        Some(Progress {
            percent: self.percent_complete.map(|p| p.min(100)),
            time_remaining: format_time_remaining(self.time_remaining.as_deref()),
        })
    }

    pub fn is_primary_entity(&self, entity_id: u64) -> bool {
        self.entity.as_ref().is_some_and(|e| e.id == entity_id)
    }

    pub fn is_secondary_entity(&self, entity_id: u64) -> bool {
        self.secondary_entity
            .as_ref()
            .is_some_and(|e| e.id == entity_id)
    }

    pub fn is_relevant_to_entity(&self, entity_id: u64) -> bool {
        self.is_primary_entity(entity_id)
            || (self.action.affects_secondary_entity() && self.is_secondary_entity(entity_id))
    }
}

/// In-progress iff the status is `scheduled` or `started`.
pub fn classify(event: &Event) -> LifecyclePhase {
    event.phase()
}

pub fn is_blocklisted(action: &EventAction, blocklist: &HashSet<EventAction>) -> bool {
    blocklist.contains(action)
}

/// Self-caused account/profile edits that are not interesting as notifications.
pub fn default_blocklist() -> HashSet<EventAction> {
    [
        EventAction::AccountUpdate,
        EventAction::AccountSettingsUpdate,
        EventAction::ProfileUpdate,
        EventAction::UserSshKeyAdd,
    ]
    .into_iter()
    .collect()
}
