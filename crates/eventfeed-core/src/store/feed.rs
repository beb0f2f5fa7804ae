use chrono::{Datelike, NaiveDate};

use crate::models::{
    AccountSnapshot, Event, FeedItem, NotificationKind, NotificationSeverity, SyntheticNotice,
};

pub const PAST_DUE_NOTICE_KEY: &str = "past-due-balance";
pub const VOLUME_MIGRATION_NOTICE_KEY: &str = "volume-migration";

/// Derive the notices that are shown ahead of real events.
///
/// - A past-due balance notice when the balance is positive, the account has a
///   `payment_due` notification, the user may see billing and the month is past
///   its first `grace_days` days (automatic payments may still be processing).
/// - All volume migration notifications condense into a single notice.
/// - Other account notifications pass through unchanged.
pub fn synthesize_notices(
    account: &AccountSnapshot,
    today: NaiveDate,
    grace_days: u32,
) -> Vec<SyntheticNotice> {
    let mut notices = Vec::new();

    if account.balance > 0.0
        && account.has_notification(&NotificationKind::PaymentDue)
        && !account.profile.restricted
        && today.day() > grace_days
    {
        notices.push(SyntheticNotice {
            key: PAST_DUE_NOTICE_KEY.to_string(),
            label: "Your account balance is past due".to_string(),
            message: format!(
                "Please make a payment of ${:.2} to keep your services running.",
                account.balance
            ),
            severity: NotificationSeverity::Critical,
        });
    }

    let mut has_volume_migration = false;
    for (idx, notification) in account.notifications.iter().enumerate() {
        let kind = match &notification.kind {
            NotificationKind::PaymentDue => continue,
            NotificationKind::VolumeMigrationScheduled
            | NotificationKind::VolumeMigrationImminent => {
                has_volume_migration = true;
                continue;
            }
            NotificationKind::Maintenance => "maintenance",
            NotificationKind::Outage => "outage",
            NotificationKind::Other(kind) => kind.as_str(),
        };
        let key = match &notification.entity {
            Some(entity) => format!("{}-{}", kind, entity.id),
            None => format!("{}-{}", kind, idx),
        };
        notices.push(SyntheticNotice {
            key,
            label: notification.label.clone(),
            message: notification.message.clone(),
            severity: notification.severity,
        });
    }

    if has_volume_migration {
        notices.push(SyntheticNotice {
            key: VOLUME_MIGRATION_NOTICE_KEY.to_string(),
            label: "You have a scheduled Block Storage volume upgrade pending!".to_string(),
            message: "You have pending volume migrations. Check the maintenance page for more details."
                .to_string(),
            severity: NotificationSeverity::Major,
        });
    }

    notices
}

/// Combine synthetic notices and settled events (newest first) into the
/// display feed, capped at `limit` items.
pub fn project_feed<'a, I>(settled: I, notices: &[SyntheticNotice], limit: usize) -> Vec<FeedItem>
where
    I: IntoIterator<Item = &'a Event>,
{
    notices
        .iter()
        .map(FeedItem::from_notice)
        .chain(settled.into_iter().map(FeedItem::from_event))
        .take(limit)
        .collect()
}

pub fn unread_count(feed: &[FeedItem]) -> usize {
    feed.iter().filter(|item| item.counts_toward_unread).count()
}
