use super::account::NotificationSeverity;
use super::event::Event;

/// Notice assembled from account data rather than from the event stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticNotice {
    /// Stable key, e.g. `"past-due-balance"`.
    pub key: String,
    pub label: String,
    pub message: String,
    pub severity: NotificationSeverity,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeedItemId {
    Event(u64),
    Notice(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedBody {
    Event(Event),
    Notice(SyntheticNotice),
}

/// Display-ready unit of the notification feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub id: FeedItemId,
    pub body: FeedBody,
    pub counts_toward_unread: bool,
}

impl FeedItem {
    pub fn from_event(event: &Event) -> Self {
        Self {
            id: FeedItemId::Event(event.id),
            body: FeedBody::Event(event.clone()),
            counts_toward_unread: !event.seen,
        }
    }

    pub fn from_notice(notice: &SyntheticNotice) -> Self {
        Self {
            id: FeedItemId::Notice(notice.key.clone()),
            body: FeedBody::Notice(notice.clone()),
            counts_toward_unread: true,
        }
    }

    pub fn event(&self) -> Option<&Event> {
        match &self.body {
            FeedBody::Event(event) => Some(event),
            FeedBody::Notice(_) => None,
        }
    }
}
