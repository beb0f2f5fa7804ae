use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tracing::debug;

use crate::api::SeenApi;
use crate::detached::spawn_detached;
use crate::store::FeedSnapshot;

/// Fire-and-forget marking of events as seen/read.
///
/// Each id is sent at most once per session, as its own request. Failures are
/// dropped. The event store is never touched here: `seen` only changes in
/// memory once a later poll returns the updated record.
pub struct SeenMarker {
    api: Arc<dyn SeenApi>,
    handle: Handle,
    marked_seen: Mutex<HashSet<u64>>,
    marked_read: Mutex<HashSet<u64>>,
}

impl SeenMarker {
    pub fn new(api: Arc<dyn SeenApi>, handle: Handle) -> Self {
        Self {
            api,
            handle,
            marked_seen: Mutex::new(HashSet::new()),
            marked_read: Mutex::new(HashSet::new()),
        }
    }

    pub fn mark_seen(&self, event_ids: &[u64]) {
        for id in claim_new(&self.marked_seen, event_ids) {
            debug!(event_id = id, "marking event seen");
            let api = self.api.clone();
            spawn_detached(&self.handle, "mark_event_seen", async move {
                api.mark_event_seen(id).await
            });
        }
    }

    pub fn mark_read(&self, event_ids: &[u64]) {
        for id in claim_new(&self.marked_read, event_ids) {
            let api = self.api.clone();
            spawn_detached(&self.handle, "mark_event_read", async move {
                api.mark_event_read(id).await
            });
        }
    }

    /// Mark every unseen event currently visible in the feed.
    pub fn mark_visible_seen(&self, snapshot: &FeedSnapshot) {
        self.mark_seen(&snapshot.unseen_event_ids());
    }

    pub fn was_marked_seen(&self, id: u64) -> bool {
        self.marked_seen
            .lock()
            .map(|set| set.contains(&id))
            .unwrap_or(false)
    }
}

/// Record `ids` as issued and return the ones that were not issued before.
fn claim_new(issued: &Mutex<HashSet<u64>>, ids: &[u64]) -> Vec<u64> {
    let Ok(mut issued) = issued.lock() else {
        return Vec::new();
    };
    ids.iter().copied().filter(|id| issued.insert(*id)).collect()
}
