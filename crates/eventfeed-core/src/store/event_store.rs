//! Canonical, deduplicated collection of known events.
//!
//! Events are keyed by id and kept ordered newest-created first (ties broken
//! by id descending). Incoming pages replace stored records wholesale; nothing
//! is removed except by an explicit [`EventStore::truncate`].
//!
//! ## Guards
//! - An id once observed settled is never moved back to in-progress, even if
//!   a later page (or a duplicate page) reports it that way.
//! - Pages carry a sequence number assigned when the request was issued; a page
//!   that is not newer than the last applied one is dropped whole so a slow
//!   response cannot overwrite a fresher one.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::models::Event;

type OrderKey = (Reverse<NaiveDateTime>, Reverse<u64>);

fn order_key(event: &Event) -> OrderKey {
    (Reverse(event.created), Reverse(event.id))
}

/// Counts describing what a merge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub inserted: usize,
    pub updated: usize,
    /// Records dropped because they could not be decoded.
    pub rejected: usize,
    /// In-progress records ignored because the id had already settled.
    pub regressions: usize,
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        self.inserted > 0 || self.updated > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    Applied(MergeOutcome),
    Stale { seq: u64, last_applied: u64 },
}

#[derive(Debug, Clone, Default)]
pub struct EventStore {
    events: BTreeMap<OrderKey, Event>,
    index: HashMap<u64, OrderKey>,
    settled_ids: HashSet<u64>,
    last_applied_seq: Option<u64>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.index.clear();
        self.settled_ids.clear();
        self.last_applied_seq = None;
    }

    // ===== Merge =====

    /// Merge a page of raw API records.
    ///
    /// Records that fail to decode are logged and skipped; the rest of the page
    /// is still applied.
    pub fn merge(&mut self, records: &[serde_json::Value]) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        for record in records {
            match Event::from_value(record) {
                Ok(event) => self.upsert(event, &mut outcome),
                Err(e) => {
                    warn!(error = %e, "dropping malformed event record");
                    outcome.rejected += 1;
                }
            }
        }
        outcome
    }

    /// Merge already-decoded events.
    pub fn merge_events<I>(&mut self, events: I) -> MergeOutcome
    where
        I: IntoIterator<Item = Event>,
    {
        let mut outcome = MergeOutcome::default();
        for event in events {
            self.upsert(event, &mut outcome);
        }
        outcome
    }

    /// Merge a page tagged with the sequence number of the request that
    /// produced it. Pages not newer than the last applied page are rejected.
    pub fn merge_page(&mut self, seq: u64, records: &[serde_json::Value]) -> PageOutcome {
        if let Some(last_applied) = self.last_applied_seq {
            if seq <= last_applied {
                debug!(seq, last_applied, "rejecting stale event page");
                return PageOutcome::Stale { seq, last_applied };
            }
        }
        self.last_applied_seq = Some(seq);
        PageOutcome::Applied(self.merge(records))
    }

    fn upsert(&mut self, event: Event, outcome: &mut MergeOutcome) {
        if event.is_in_progress() && self.settled_ids.contains(&event.id) {
            debug!(
                event_id = event.id,
                status = event.status.as_str(),
                "ignoring in-progress record for settled event"
            );
            outcome.regressions += 1;
            return;
        }

        if event.is_settled() {
            self.settled_ids.insert(event.id);
        }

        let key = order_key(&event);
        match self.index.insert(event.id, key) {
            Some(previous) => {
                self.events.remove(&previous);
                outcome.updated += 1;
            }
            None => outcome.inserted += 1,
        }
        self.events.insert(key, event);
    }

    /// Keep only the `max` newest events by `created`.
    ///
    /// Settled ids of evicted events stay remembered only while they are not
    /// below the oldest retained id, which keeps the guard set bounded by the
    /// retained window.
    pub fn truncate(&mut self, max: usize) -> usize {
        let mut evicted = 0;
        while self.events.len() > max {
            if let Some((_, event)) = self.events.pop_last() {
                self.index.remove(&event.id);
                evicted += 1;
            }
        }
        if evicted > 0 {
            match self.oldest_id() {
                Some(floor) => self.settled_ids.retain(|id| *id >= floor),
                None => self.settled_ids.clear(),
            }
        }
        evicted
    }

    // ===== Queries =====

    /// Events newest-created first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Event> {
        self.events.values()
    }

    pub fn get(&self, id: u64) -> Option<&Event> {
        self.index.get(&id).and_then(|key| self.events.get(key))
    }

    pub fn contains(&self, id: u64) -> bool {
        self.index.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn last_applied_seq(&self) -> Option<u64> {
        self.last_applied_seq
    }

    pub fn most_recent_created(&self) -> Option<NaiveDateTime> {
        self.events.values().next().map(|e| e.created)
    }

    /// Smallest known id, the cursor for fetching older pages.
    pub fn oldest_id(&self) -> Option<u64> {
        self.index.keys().min().copied()
    }

    pub fn unseen_count(&self) -> usize {
        self.events.values().filter(|e| !e.seen).count()
    }

    /// Ids of all in-progress events, blocklisted or not.
    pub fn in_progress_ids(&self) -> Vec<u64> {
        self.events
            .values()
            .filter(|e| e.is_in_progress())
            .map(|e| e.id)
            .collect()
    }

    pub fn ids_created_at(&self, created: NaiveDateTime) -> Vec<u64> {
        self.events
            .values()
            .filter(|e| e.created == created)
            .map(|e| e.id)
            .collect()
    }
}
