use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{AccountSource, EventPage, EventSource, PageRequest, SeenApi};
use crate::models::{AccountNotification, AccountSnapshot, ProfileFlags};

#[derive(Debug, Deserialize)]
struct AccountResponse {
    balance: f64,
}

#[derive(Debug, Deserialize)]
struct NotificationsResponse {
    data: Vec<AccountNotification>,
}

/// REST client for the account events, notifications and profile endpoints.
#[derive(Debug, Clone)]
pub struct HttpApiClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpApiClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.header("Authorization", format!("Bearer {}", token)),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let response = builder
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", what))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("{} request failed ({}): {}", what, status, error_text);
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        filter: Option<&serde_json::Value>,
    ) -> Result<T> {
        let mut builder = self.request(reqwest::Method::GET, path);
        if let Some(filter) = filter {
            builder = builder.header("X-Filter", filter.to_string());
        }

        self.send(builder, path)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", path))
    }

    async fn post_empty(&self, path: &str) -> Result<()> {
        let builder = self.request(reqwest::Method::POST, path);
        self.send(builder, path).await?;
        Ok(())
    }

    pub async fn events_page(&self, request: &PageRequest) -> Result<EventPage> {
        let filter = request.to_x_filter();
        self.get_json("/account/events", Some(&filter)).await
    }

    pub async fn account(&self) -> Result<AccountSnapshot> {
        let (account, notifications, profile) = tokio::try_join!(
            self.get_json::<AccountResponse>("/account", None),
            self.get_json::<NotificationsResponse>("/account/notifications", None),
            self.get_json::<ProfileFlags>("/profile", None),
        )?;

        Ok(AccountSnapshot {
            balance: account.balance,
            notifications: notifications.data,
            profile,
        })
    }
}

impl EventSource for HttpApiClient {
    fn fetch_events_page<'a>(&'a self, request: &'a PageRequest) -> BoxFuture<'a, Result<EventPage>> {
        self.events_page(request).boxed()
    }
}

impl SeenApi for HttpApiClient {
    fn mark_event_seen(&self, id: u64) -> BoxFuture<'_, Result<()>> {
        async move { self.post_empty(&format!("/account/events/{}/seen", id)).await }.boxed()
    }

    fn mark_event_read(&self, id: u64) -> BoxFuture<'_, Result<()>> {
        async move { self.post_empty(&format!("/account/events/{}/read", id)).await }.boxed()
    }
}

impl AccountSource for HttpApiClient {
    fn fetch_account(&self) -> BoxFuture<'_, Result<AccountSnapshot>> {
        self.account().boxed()
    }
}
