pub mod account;
pub mod event;
pub mod feed;

pub use account::{
    AccountNotification, AccountSnapshot, NotificationKind, NotificationSeverity, ProfileFlags,
};
pub use event::{
    classify, default_blocklist, is_blocklisted, Entity, Event, EventAction, EventRecordError,
    EventStatus, LifecyclePhase, Progress,
};
pub use feed::{FeedBody, FeedItem, FeedItemId, SyntheticNotice};
