//! Boundary with the backing REST API.
//!
//! The engine only depends on the traits here; [`client::HttpApiClient`] is the
//! production implementation and tests substitute in-memory fakes.

pub mod client;
pub mod filter;

use anyhow::Result;
use futures::future::BoxFuture;
use serde::Deserialize;

use crate::models::AccountSnapshot;

pub use client::HttpApiClient;
pub use filter::{PageRequest, PollFilter};

/// One page of raw event records as returned by the API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPage {
    pub data: Vec<serde_json::Value>,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default = "first_page")]
    pub pages: u32,
    #[serde(default)]
    pub results: u32,
}

fn first_page() -> u32 {
    1
}

impl EventPage {
    pub fn has_more(&self) -> bool {
        self.page < self.pages
    }
}

pub trait EventSource: Send + Sync {
    fn fetch_events_page<'a>(&'a self, request: &'a PageRequest) -> BoxFuture<'a, Result<EventPage>>;
}

/// Mark-seen / mark-read endpoints. Both are idempotent server-side.
pub trait SeenApi: Send + Sync {
    fn mark_event_seen(&self, id: u64) -> BoxFuture<'_, Result<()>>;
    fn mark_event_read(&self, id: u64) -> BoxFuture<'_, Result<()>>;
}

pub trait AccountSource: Send + Sync {
    fn fetch_account(&self) -> BoxFuture<'_, Result<AccountSnapshot>>;
}
