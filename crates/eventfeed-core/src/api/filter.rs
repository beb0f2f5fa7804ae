use chrono::NaiveDateTime;
use serde_json::{json, Map, Value};

use crate::store::EventStore;

const API_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Incremental poll: everything created at or after `since`, every event that
/// is still in progress, every event whose `seen` flag needs refreshing, minus
/// events already known at exactly `since`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollFilter {
    pub since: NaiveDateTime,
    pub in_progress_ids: Vec<u64>,
    /// Settled events shown as unseen; re-fetched so a mark-seen made since
    /// the last poll shows up.
    pub refresh_ids: Vec<u64>,
    pub exclude_ids: Vec<u64>,
}

impl PollFilter {
    /// Build the poll filter from what the store already knows. `fallback` is
    /// used as the lower bound when the store is empty (typically the time the
    /// driver started).
    pub fn from_store(store: &EventStore, fallback: NaiveDateTime) -> Self {
        let since = store.most_recent_created().unwrap_or(fallback);
        let in_progress_ids = store.in_progress_ids();
        let exclude_ids = store
            .ids_created_at(since)
            .into_iter()
            .filter(|id| !in_progress_ids.contains(id))
            .collect();

        Self {
            since,
            in_progress_ids,
            refresh_ids: Vec::new(),
            exclude_ids,
        }
    }

    /// Also re-fetch `ids`. None of them is excluded, and ids already covered
    /// as in progress are not repeated.
    pub fn with_refresh(mut self, ids: &[u64]) -> Self {
        self.exclude_ids.retain(|id| !ids.contains(id));
        self.refresh_ids = ids
            .iter()
            .copied()
            .filter(|id| !self.in_progress_ids.contains(id))
            .collect();
        self
    }

    /// Whether the API would return a record with this id and `created` for
    /// this filter.
    pub fn matches(&self, id: u64, created: NaiveDateTime) -> bool {
        let wanted = created >= self.since
            || self.in_progress_ids.contains(&id)
            || self.refresh_ids.contains(&id);
        wanted && !self.exclude_ids.contains(&id)
    }
}

/// Which slice of the event stream a request asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    /// First fetch, limited to a recent window.
    Initial { since: NaiveDateTime },
    Poll(PollFilter),
    /// Infinite-scroll page of events older than `before_id`. `None` fetches
    /// from the top without a time window.
    Older { before_id: Option<u64> },
}

impl PageRequest {
    /// Render as the API's `X-Filter` JSON.
    pub fn to_x_filter(&self) -> Value {
        let mut filter = Map::new();
        filter.insert("+order_by".to_string(), json!("id"));
        filter.insert("+order".to_string(), json!("desc"));

        match self {
            Self::Initial { since } => {
                filter.insert(
                    "created".to_string(),
                    json!({ "+gt": since.format(API_DATETIME_FORMAT).to_string() }),
                );
            }
            Self::Older { before_id } => {
                if let Some(id) = before_id {
                    filter.insert("id".to_string(), json!({ "+lt": id }));
                }
            }
            Self::Poll(poll) => {
                let mut any_of = vec![json!({
                    "created": { "+gte": poll.since.format(API_DATETIME_FORMAT).to_string() }
                })];
                any_of.extend(
                    poll.in_progress_ids
                        .iter()
                        .chain(&poll.refresh_ids)
                        .map(|id| json!({ "id": id })),
                );

                let mut all_of = vec![json!({ "+or": any_of })];
                all_of.extend(
                    poll.exclude_ids
                        .iter()
                        .map(|id| json!({ "id": { "+neq": id } })),
                );
                filter.insert("+and".to_string(), Value::Array(all_of));
            }
        }

        Value::Object(filter)
    }
}
