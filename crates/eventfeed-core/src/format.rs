//! Human-readable labels for event fields.

use chrono::NaiveDateTime;

/// Parse an `HH:MM:SS` countdown into a `"<N> hours remaining"` or
/// `"<N> minutes remaining"` label.
///
/// Hours are unbounded, minutes and seconds must be below 60. Anything else
/// yields `None`. Durations with a non-zero hour component are rounded
/// half-up to whole hours, everything else to whole minutes. An hour count
/// too large to represent in seconds also yields `None`.
pub fn format_time_remaining(raw: Option<&str>) -> Option<String> {
    let (hours, minutes, seconds) = parse_countdown(raw?)?;
    let total_secs = hours
        .checked_mul(3600)?
        .checked_add(minutes * 60 + seconds)?;

    if hours > 0 {
        let rounded = total_secs.checked_add(1800)? / 3600;
        Some(format!("{} hours remaining", rounded))
    } else {
        let rounded = (total_secs + 30) / 60;
        Some(format!("{} minutes remaining", rounded))
    }
}

fn parse_countdown(raw: &str) -> Option<(u64, u64, u64)> {
    let mut parts = raw.split(':');
    let hours = parse_component(parts.next()?)?;
    let minutes = parse_component(parts.next()?)?;
    let seconds = parse_component(parts.next()?)?;
    if parts.next().is_some() || minutes >= 60 || seconds >= 60 {
        return None;
    }
    Some((hours, minutes, seconds))
}

fn parse_component(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Format a timestamp relative to `now` (e.g., "2m ago", "1h ago").
pub fn format_relative_time(created: NaiveDateTime, now: NaiveDateTime) -> String {
    let diff = (now - created).num_seconds().max(0);

    if diff < 60 {
        "just now".to_string()
    } else if diff < 3600 {
        format!("{}m ago", diff / 60)
    } else if diff < 86400 {
        format!("{}h ago", diff / 3600)
    } else if diff < 604800 {
        format!("{}d ago", diff / 86400)
    } else {
        format!("{}w ago", diff / 604800)
    }
}
