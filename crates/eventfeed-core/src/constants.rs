//! Application-wide constants
//!
//! Defaults for configuration values and intervals used across modules.

/// Default REST API base URL
pub const DEFAULT_API_BASE_URL: &str = "https://api.linode.com/v4";

/// Poll interval when nothing is in progress
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 16;

/// Poll interval while at least one operation is in progress, so progress
/// updates feel close to realtime
pub const IN_PROGRESS_POLL_INTERVAL_SECS: u64 = 2;

/// Account data (balance, notifications, profile) refresh interval
pub const ACCOUNT_POLL_INTERVAL_SECS: u64 = 5 * 60; // 5 minutes

/// Maximum number of items in the notification feed
pub const DEFAULT_FEED_LIMIT: usize = 20;

/// Maximum number of events retained in memory after each merge
pub const DEFAULT_MAX_RETAINED_EVENTS: usize = 500;

/// Days at the start of a month during which past-due notices are held back
pub const PAYMENT_GRACE_DAYS: u32 = 3;

/// The first fetch only covers this many days of history
pub const INITIAL_WINDOW_DAYS: u32 = 7;

// Environment variables
pub const ENV_TOKEN: &str = "EVENTFEED_TOKEN";
pub const ENV_LOG: &str = "EVENTFEED_LOG";
pub const ENV_LOG_FILE: &str = "EVENTFEED_LOG_FILE";
