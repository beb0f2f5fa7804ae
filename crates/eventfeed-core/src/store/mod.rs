pub mod event_store;
pub mod feed;
pub mod seen_marker;
pub mod views;

pub use event_store::{EventStore, MergeOutcome, PageOutcome};
pub use feed::{project_feed, synthesize_notices, unread_count};
pub use seen_marker::SeenMarker;
pub use views::{
    build_snapshot, latest_in_progress_for_entity, partition, FeedSnapshot, InProgressEntry,
    Partition, ViewOptions,
};
