use chrono::NaiveDateTime;
use eventfeed_core::format::format_relative_time;
use eventfeed_core::models::{Event, FeedBody, FeedItem};
use eventfeed_core::store::InProgressEntry;
use eventfeed_core::FeedSnapshot;

const UNREAD_MARKER: &str = "*";

fn entity_label(event: &Event) -> &str {
    event
        .entity
        .as_ref()
        .map(|e| e.label.as_str())
        .unwrap_or("-")
}

/// `linode_boot my-linode 40% 8 minutes remaining`
pub fn in_progress_line(entry: &InProgressEntry) -> String {
    let mut line = format!("{} {}", entry.event.action, entity_label(&entry.event));
    if let Some(percent) = entry.progress.percent {
        line.push_str(&format!(" {}%", percent));
    }
    if let Some(remaining) = &entry.progress.time_remaining {
        line.push(' ');
        line.push_str(remaining);
    }
    line
}

pub fn feed_line(item: &FeedItem, now: NaiveDateTime) -> String {
    let marker = if item.counts_toward_unread {
        UNREAD_MARKER
    } else {
        " "
    };

    match &item.body {
        FeedBody::Event(event) => format!(
            "{} {:>8}  {} {} {}",
            marker,
            format_relative_time(event.created, now),
            event.action,
            entity_label(event),
            event.status.as_str()
        ),
        FeedBody::Notice(notice) => {
            if notice.message.is_empty() {
                format!("{} {:>8}  {}", marker, "notice", notice.label)
            } else {
                format!(
                    "{} {:>8}  {}: {}",
                    marker, "notice", notice.label, notice.message
                )
            }
        }
    }
}

pub fn render_snapshot(snapshot: &FeedSnapshot, now: NaiveDateTime) -> String {
    let mut out = String::new();

    if !snapshot.in_progress.is_empty() {
        out.push_str("In progress:\n");
        for entry in &snapshot.in_progress {
            out.push_str("  ");
            out.push_str(&in_progress_line(entry));
            out.push('\n');
        }
    }

    out.push_str(&format!("Notifications ({} unread):\n", snapshot.unread_count));
    if snapshot.feed.is_empty() {
        out.push_str("  (none)\n");
    }
    for item in &snapshot.feed {
        out.push_str(&feed_line(item, now));
        out.push('\n');
    }
    out
}
