//! Pure projections over the event store.
//!
//! Everything here is recomputed from scratch whenever the store changes and
//! never mutates its inputs.

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::models::{
    is_blocklisted, AccountSnapshot, Event, EventAction, FeedItem, LifecyclePhase, Progress,
};
use crate::store::feed::{project_feed, synthesize_notices, unread_count};
use crate::store::EventStore;

/// Disjoint in-progress and settled views of the non-blocklisted events.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition<'a> {
    /// Oldest-created first.
    pub in_progress: Vec<&'a Event>,
    /// Newest-created first.
    pub settled: Vec<&'a Event>,
}

pub fn partition<'a>(store: &'a EventStore, blocklist: &HashSet<EventAction>) -> Partition<'a> {
    let mut in_progress = Vec::new();
    let mut settled = Vec::new();

    for event in store.iter() {
        if is_blocklisted(&event.action, blocklist) {
            continue;
        }
        match event.phase() {
            LifecyclePhase::InProgress => in_progress.push(event),
            LifecyclePhase::Settled => settled.push(event),
        }
    }

    // Store order is newest first; running operations surface longest-running first
    in_progress.reverse();

    Partition {
        in_progress,
        settled,
    }
}

/// The in-progress event a resource page would show for `entity_id`: the most
/// recently created one relevant to it.
pub fn latest_in_progress_for_entity<'a>(
    partition: &Partition<'a>,
    entity_id: u64,
) -> Option<&'a Event> {
    partition
        .in_progress
        .iter()
        .rev()
        .find(|e| e.is_relevant_to_entity(entity_id))
        .copied()
}

#[derive(Debug, Clone, PartialEq)]
pub struct InProgressEntry {
    pub event: Event,
    pub progress: Progress,
}

/// Owned, render-ready state published after every recompute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedSnapshot {
    pub in_progress: Vec<InProgressEntry>,
    pub settled: Vec<Event>,
    pub feed: Vec<FeedItem>,
    pub unread_count: usize,
}

impl FeedSnapshot {
    /// Unseen event ids currently visible in the feed.
    pub fn unseen_event_ids(&self) -> Vec<u64> {
        self.feed
            .iter()
            .filter_map(|item| item.event())
            .filter(|e| !e.seen)
            .map(|e| e.id)
            .collect()
    }
}

/// Inputs to a snapshot that do not come from the event store.
#[derive(Debug, Clone)]
pub struct ViewOptions<'a> {
    pub blocklist: &'a HashSet<EventAction>,
    pub account: Option<&'a AccountSnapshot>,
    pub today: NaiveDate,
    pub payment_grace_days: u32,
    pub feed_limit: usize,
}

pub fn build_snapshot(store: &EventStore, options: &ViewOptions<'_>) -> FeedSnapshot {
    let views = partition(store, options.blocklist);

    let notices = options
        .account
        .map(|account| synthesize_notices(account, options.today, options.payment_grace_days))
        .unwrap_or_default();
    let feed = project_feed(views.settled.iter().copied(), &notices, options.feed_limit);
    let unread_count = unread_count(&feed);

    let in_progress = views
        .in_progress
        .iter()
        .filter_map(|event| {
            event.progress().map(|progress| InProgressEntry {
                event: (*event).clone(),
                progress,
            })
        })
        .collect();

    FeedSnapshot {
        in_progress,
        settled: views.settled.into_iter().cloned().collect(),
        feed,
        unread_count,
    }
}
