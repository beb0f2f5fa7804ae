pub mod api;
pub mod config;
pub mod constants;
pub mod detached;
pub mod format;
pub mod models;
pub mod poller;
pub mod store;
pub mod tracing_setup;

// Re-export the types most callers need at crate root
pub use api::{AccountSource, EventSource, HttpApiClient, SeenApi};
pub use config::{ConfigError, FeedConfig};
pub use poller::EventPoller;
pub use store::{EventStore, FeedSnapshot, SeenMarker};
