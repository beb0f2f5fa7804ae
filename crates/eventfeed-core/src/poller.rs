//! Polling driver: periodically fetches event pages into the store and
//! publishes recomputed views.
//!
//! Polls are issued strictly one at a time. Each request gets a sequence
//! number before it is sent so the store can refuse a response that is older
//! than one it already applied. A failed poll leaves the store untouched; the
//! next scheduled poll is the retry.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{Local, NaiveDateTime, Utc};
use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::{AccountSource, EventPage, EventSource, PageRequest, PollFilter};
use crate::config::FeedConfig;
use crate::models::{AccountSnapshot, EventAction};
use crate::store::{build_snapshot, partition, EventStore, FeedSnapshot, PageOutcome, ViewOptions};

pub struct EventPoller {
    config: FeedConfig,
    blocklist: HashSet<EventAction>,
    source: Arc<dyn EventSource>,
    account_source: Option<Arc<dyn AccountSource>>,
    store: EventStore,
    account: Option<AccountSnapshot>,
    next_seq: u64,
    started_at: NaiveDateTime,
    initial_loaded: bool,
    has_more_older: bool,
    snapshot_tx: watch::Sender<FeedSnapshot>,
    poke: Arc<Notify>,
}

impl EventPoller {
    pub fn new(
        config: FeedConfig,
        source: Arc<dyn EventSource>,
        account_source: Option<Arc<dyn AccountSource>>,
    ) -> (Self, watch::Receiver<FeedSnapshot>) {
        let (snapshot_tx, snapshot_rx) = watch::channel(FeedSnapshot::default());
        let blocklist = config.blocklist_set();
        let poller = Self {
            config,
            blocklist,
            source,
            account_source,
            store: EventStore::new(),
            account: None,
            next_seq: 0,
            started_at: Utc::now().naive_utc(),
            initial_loaded: false,
            has_more_older: true,
            snapshot_tx,
            poke: Arc::new(Notify::new()),
        };
        (poller, snapshot_rx)
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn account(&self) -> Option<&AccountSnapshot> {
        self.account.as_ref()
    }

    /// Whether older pages may still exist beyond what has been loaded.
    pub fn has_more_older(&self) -> bool {
        self.has_more_older
    }

    /// Notifying this handle makes a running driver poll immediately, e.g.
    /// right after starting a long-running operation.
    pub fn poke_handle(&self) -> Arc<Notify> {
        self.poke.clone()
    }

    fn issue_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// The request the next poll will send.
    pub fn next_request(&self) -> PageRequest {
        if !self.initial_loaded {
            let window = chrono::Duration::days(i64::from(self.config.initial_window_days));
            return PageRequest::Initial {
                since: Utc::now().naive_utc() - window,
            };
        }
        // Unseen events on screen are re-fetched so their `seen` flag catches up
        let visible_unseen = self.snapshot_tx.borrow().unseen_event_ids();
        PageRequest::Poll(
            PollFilter::from_store(&self.store, self.started_at).with_refresh(&visible_unseen),
        )
    }

    pub async fn poll_once(&mut self) -> Result<PageOutcome> {
        let fetched = self.fetch_next().await?;
        Ok(self.apply(fetched))
    }

    /// Send the next request without touching the store.
    async fn fetch_next(&mut self) -> Result<FetchedPage> {
        let request = self.next_request();
        let seq = self.issue_seq();
        let page = self.source.fetch_events_page(&request).await?;
        Ok(FetchedPage { request, seq, page })
    }

    fn apply(&mut self, fetched: FetchedPage) -> PageOutcome {
        let FetchedPage { request, seq, page } = fetched;

        let outcome = self.store.merge_page(seq, &page.data);
        if let PageOutcome::Applied(merge) = outcome {
            debug!(
                seq,
                inserted = merge.inserted,
                updated = merge.updated,
                rejected = merge.rejected,
                "merged event page"
            );
        }

        if matches!(request, PageRequest::Initial { .. }) {
            self.initial_loaded = true;
            // An empty recent window says nothing about older history
            self.has_more_older = page.has_more() || page.data.is_empty();
        }

        self.finish_merge();
        outcome
    }

    /// Fetch the next page of older events (infinite scroll).
    pub async fn load_older(&mut self) -> Result<bool> {
        let request = PageRequest::Older {
            before_id: self.store.oldest_id(),
        };
        let seq = self.issue_seq();
        let page = self.source.fetch_events_page(&request).await?;

        self.store.merge_page(seq, &page.data);
        self.has_more_older = page.has_more();
        self.finish_merge();
        Ok(self.has_more_older)
    }

    /// Refresh account data. On failure the previous snapshot is kept.
    pub async fn refresh_account(&mut self) -> Result<()> {
        if let Some(account) = self.fetch_account().await? {
            self.apply_account(account);
        }
        Ok(())
    }

    async fn fetch_account(&self) -> Result<Option<AccountSnapshot>> {
        match &self.account_source {
            Some(source) => Ok(Some(source.fetch_account().await?)),
            None => Ok(None),
        }
    }

    fn apply_account(&mut self, account: AccountSnapshot) {
        self.account = Some(account);
        self.publish();
    }

    fn finish_merge(&mut self) {
        let evicted = self.store.truncate(self.config.max_retained_events);
        if evicted > 0 {
            debug!(evicted, "truncated event store");
        }
        self.publish();
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        build_snapshot(
            &self.store,
            &ViewOptions {
                blocklist: &self.blocklist,
                account: self.account.as_ref(),
                today: Local::now().date_naive(),
                payment_grace_days: self.config.payment_grace_days,
                feed_limit: self.config.feed_limit,
            },
        )
    }

    fn publish(&self) {
        // Kept even with no receivers left; consumers that went away just miss it
        self.snapshot_tx.send_replace(self.snapshot());
    }

    /// Poll faster while anything visible is still running.
    pub fn current_interval(&self) -> Duration {
        if partition(&self.store, &self.blocklist).in_progress.is_empty() {
            self.config.poll_interval()
        } else {
            self.config.in_progress_poll_interval()
        }
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped).
    ///
    /// A request already in flight when shutdown is signalled is allowed to
    /// finish, but its result is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("event poller started");
        let poke = self.poke.clone();
        let mut next_account_refresh = Instant::now();

        while !*shutdown.borrow() {
            if self.account_source.is_some() && Instant::now() >= next_account_refresh {
                let fetched = self.fetch_account().await;
                if *shutdown.borrow() {
                    debug!("discarding account data after shutdown");
                    break;
                }
                match fetched {
                    Ok(Some(account)) => self.apply_account(account),
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "account refresh failed, keeping previous data"),
                }
                next_account_refresh = Instant::now() + self.config.account_poll_interval();
            }

            let fetched = self.fetch_next().await;
            if *shutdown.borrow() {
                debug!("discarding poll result after shutdown");
                break;
            }
            match fetched {
                Ok(fetched) => {
                    if let PageOutcome::Stale { seq, last_applied } = self.apply(fetched) {
                        warn!(seq, last_applied, "discarded stale event page");
                    }
                }
                Err(e) => warn!(error = %e, "event poll failed, keeping previous state"),
            }

            let interval = self.current_interval();
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = poke.notified() => debug!("poll requested early"),
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("event poller stopped");
    }
}

struct FetchedPage {
    request: PageRequest,
    seq: u64,
    page: EventPage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SeenApi;
    use crate::models::{AccountNotification, NotificationKind, NotificationSeverity};
    use crate::store::SeenMarker;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use serde_json::json;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::Mutex;

    /// Replays scripted responses and records every request.
    #[derive(Default)]
    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<EventPage>>>,
        requests: Mutex<Vec<PageRequest>>,
    }

    impl ScriptedSource {
        fn with(responses: Vec<Result<EventPage>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    impl EventSource for ScriptedSource {
        fn fetch_events_page<'a>(
            &'a self,
            request: &'a PageRequest,
        ) -> BoxFuture<'a, Result<EventPage>> {
            async move {
                self.requests.lock().unwrap().push(request.clone());
                self.responses
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| Ok(EventPage::default()))
            }
            .boxed()
        }
    }

    /// In-memory backend that evaluates the rendered `X-Filter` like the API
    /// does and flips `seen` when asked.
    #[derive(Default)]
    struct FakeBackend {
        records: Mutex<BTreeMap<u64, serde_json::Value>>,
        served: Mutex<Vec<Vec<u64>>>,
    }

    impl FakeBackend {
        fn insert(&self, record: serde_json::Value) {
            let id = record["id"].as_u64().unwrap();
            self.records.lock().unwrap().insert(id, record);
        }

        fn last_served(&self) -> Vec<u64> {
            self.served.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    fn clause_matches(clause: &serde_json::Value, record: &serde_json::Value) -> bool {
        clause.as_object().unwrap().iter().all(|(key, cond)| match key.as_str() {
            "+order_by" | "+order" => true,
            "+and" => cond.as_array().unwrap().iter().all(|c| clause_matches(c, record)),
            "+or" => cond.as_array().unwrap().iter().any(|c| clause_matches(c, record)),
            field => field_matches(&record[field], cond),
        })
    }

    fn field_matches(value: &serde_json::Value, cond: &serde_json::Value) -> bool {
        use std::cmp::Ordering;
        use serde_json::Value;

        let Some(ops) = cond.as_object() else {
            return value == cond;
        };
        ops.iter().all(|(op, operand)| {
            let ord = match (value, operand) {
                (Value::Number(a), Value::Number(b)) => a.as_u64().unwrap().cmp(&b.as_u64().unwrap()),
                // API timestamps compare correctly as strings
                (Value::String(a), Value::String(b)) => a.cmp(b),
                _ => panic!("cannot compare {} with {}", value, operand),
            };
            match op.as_str() {
                "+gt" => ord == Ordering::Greater,
                "+gte" => ord != Ordering::Less,
                "+lt" => ord == Ordering::Less,
                "+neq" => ord != Ordering::Equal,
                other => panic!("unsupported operator {}", other),
            }
        })
    }

    impl EventSource for FakeBackend {
        fn fetch_events_page<'a>(
            &'a self,
            request: &'a PageRequest,
        ) -> BoxFuture<'a, Result<EventPage>> {
            async move {
                let filter = request.to_x_filter();
                let data: Vec<_> = self
                    .records
                    .lock()
                    .unwrap()
                    .values()
                    .rev()
                    .filter(|record| clause_matches(&filter, record))
                    .cloned()
                    .collect();
                self.served
                    .lock()
                    .unwrap()
                    .push(data.iter().map(|r| r["id"].as_u64().unwrap()).collect());
                Ok(EventPage {
                    results: data.len() as u32,
                    data,
                    page: 1,
                    pages: 1,
                })
            }
            .boxed()
        }
    }

    impl SeenApi for FakeBackend {
        fn mark_event_seen(&self, id: u64) -> BoxFuture<'_, Result<()>> {
            async move {
                if let Some(record) = self.records.lock().unwrap().get_mut(&id) {
                    record["seen"] = json!(true);
                }
                Ok(())
            }
            .boxed()
        }

        fn mark_event_read(&self, _: u64) -> BoxFuture<'_, Result<()>> {
            async { Ok(()) }.boxed()
        }
    }

    struct FailingAccount;

    impl AccountSource for FailingAccount {
        fn fetch_account(&self) -> BoxFuture<'_, Result<AccountSnapshot>> {
            async { anyhow::bail!("connection reset") }.boxed()
        }
    }

    /// Flips the shutdown flag while its request is in flight.
    struct ShutdownDuringFetch {
        shutdown: watch::Sender<bool>,
    }

    impl AccountSource for ShutdownDuringFetch {
        fn fetch_account(&self) -> BoxFuture<'_, Result<AccountSnapshot>> {
            async move {
                let _ = self.shutdown.send(true);
                Ok(maintenance_account())
            }
            .boxed()
        }
    }

    fn maintenance_account() -> AccountSnapshot {
        AccountSnapshot {
            notifications: vec![AccountNotification {
                kind: NotificationKind::Maintenance,
                label: "Maintenance".to_string(),
                message: String::new(),
                severity: NotificationSeverity::Minor,
                entity: None,
            }],
            ..Default::default()
        }
    }

    fn record(id: u64, status: &str, created: &str, percent: Option<u8>) -> serde_json::Value {
        json!({
            "id": id,
            "action": "linode_boot",
            "status": status,
            "created": created,
            "percent_complete": percent,
            "time_remaining": null,
            "seen": false,
            "read": false
        })
    }

    fn page(data: Vec<serde_json::Value>) -> Result<EventPage> {
        Ok(EventPage {
            results: data.len() as u32,
            data,
            page: 1,
            pages: 1,
        })
    }

    fn in_progress_ids(snapshot: &FeedSnapshot) -> Vec<u64> {
        snapshot.in_progress.iter().map(|e| e.event.id).collect()
    }

    fn settled_ids(snapshot: &FeedSnapshot) -> Vec<u64> {
        snapshot.settled.iter().map(|e| e.id).collect()
    }

    #[tokio::test]
    async fn test_started_then_finished_end_to_end() {
        let source = ScriptedSource::with(vec![
            page(vec![record(1, "started", "2024-05-01T08:00:00", Some(10))]),
            page(vec![record(1, "finished", "2024-05-01T08:00:00", Some(100))]),
        ]);
        let (mut poller, rx) = EventPoller::new(FeedConfig::default(), source.clone(), None);

        poller.poll_once().await.unwrap();
        let snapshot = rx.borrow().clone();
        assert_eq!(in_progress_ids(&snapshot), vec![1]);
        assert_eq!(snapshot.in_progress[0].progress.percent, Some(10));
        assert!(snapshot.settled.is_empty());

        poller.poll_once().await.unwrap();
        let snapshot = rx.borrow().clone();
        assert!(snapshot.in_progress.is_empty());
        assert_eq!(settled_ids(&snapshot), vec![1]);
        assert_eq!(poller.store().len(), 1);

        let requests = source.requests.lock().unwrap().clone();
        assert!(matches!(requests[0], PageRequest::Initial { .. }));
        match &requests[1] {
            PageRequest::Poll(filter) => assert_eq!(filter.in_progress_ids, vec![1]),
            other => panic!("expected poll request, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_state() {
        let source = ScriptedSource::with(vec![
            page(vec![record(1, "finished", "2024-05-01T08:00:00", None)]),
            Err(anyhow::anyhow!("502 Bad Gateway")),
        ]);
        let (mut poller, rx) = EventPoller::new(FeedConfig::default(), source, None);

        poller.poll_once().await.unwrap();
        let before = rx.borrow().clone();

        assert!(poller.poll_once().await.is_err());
        assert_eq!(*rx.borrow(), before);
        assert_eq!(poller.store().len(), 1);
        // The failed request still consumed a sequence number
        assert_eq!(poller.store().last_applied_seq(), Some(1));
    }

    #[tokio::test]
    async fn test_adaptive_interval() {
        let source = ScriptedSource::with(vec![
            page(vec![record(1, "scheduled", "2024-05-01T08:00:00", None)]),
            page(vec![record(1, "failed", "2024-05-01T08:00:00", None)]),
        ]);
        let config = FeedConfig::default();
        let (mut poller, _rx) = EventPoller::new(config.clone(), source, None);

        assert_eq!(poller.current_interval(), config.poll_interval());
        poller.poll_once().await.unwrap();
        assert_eq!(poller.current_interval(), config.in_progress_poll_interval());
        poller.poll_once().await.unwrap();
        assert_eq!(poller.current_interval(), config.poll_interval());
    }

    #[tokio::test]
    async fn test_blocklisted_in_progress_does_not_speed_up_polling() {
        let mut edit = record(1, "started", "2024-05-01T08:00:00", None);
        edit["action"] = json!("profile_update");
        let source = ScriptedSource::with(vec![page(vec![edit])]);
        let config = FeedConfig::default();
        let (mut poller, _rx) = EventPoller::new(config.clone(), source, None);

        poller.poll_once().await.unwrap();
        assert_eq!(poller.current_interval(), config.poll_interval());
        assert_eq!(poller.store().in_progress_ids(), vec![1]);
    }

    #[tokio::test]
    async fn test_store_truncated_after_merge() {
        let source = ScriptedSource::with(vec![page(vec![
            record(1, "finished", "2024-05-01T08:00:00", None),
            record(2, "finished", "2024-05-01T09:00:00", None),
            record(3, "finished", "2024-05-01T10:00:00", None),
        ])]);
        let config = FeedConfig {
            max_retained_events: 2,
            ..Default::default()
        };
        let (mut poller, rx) = EventPoller::new(config, source, None);

        poller.poll_once().await.unwrap();
        assert_eq!(settled_ids(&rx.borrow()), vec![3, 2]);
    }

    #[tokio::test]
    async fn test_load_older_uses_oldest_id_cursor() {
        let source = ScriptedSource::with(vec![
            page(vec![record(10, "finished", "2024-05-01T08:00:00", None)]),
            Ok(EventPage {
                data: vec![record(9, "finished", "2024-04-01T08:00:00", None)],
                page: 1,
                pages: 2,
                results: 1,
            }),
        ]);
        let (mut poller, rx) = EventPoller::new(FeedConfig::default(), source.clone(), None);

        poller.poll_once().await.unwrap();
        assert!(poller.load_older().await.unwrap());
        assert_eq!(settled_ids(&rx.borrow()), vec![10, 9]);

        let requests = source.requests.lock().unwrap().clone();
        assert_eq!(requests[1], PageRequest::Older { before_id: Some(10) });
    }

    #[tokio::test]
    async fn test_empty_initial_window_still_allows_older_pages() {
        let source = ScriptedSource::with(vec![page(vec![])]);
        let (mut poller, _rx) = EventPoller::new(FeedConfig::default(), source, None);

        poller.poll_once().await.unwrap();
        assert!(poller.has_more_older());
    }

    #[tokio::test]
    async fn test_account_failure_keeps_previous() {
        let source = ScriptedSource::with(vec![]);
        let (mut poller, _rx) = EventPoller::new(
            FeedConfig::default(),
            source,
            Some(Arc::new(FailingAccount)),
        );
        poller.account = Some(AccountSnapshot {
            balance: 10.0,
            ..maintenance_account()
        });

        assert!(poller.refresh_account().await.is_err());
        assert_eq!(poller.account().map(|a| a.balance), Some(10.0));
        assert_eq!(poller.snapshot().unread_count, 1);
    }

    fn hours_ago(hours: i64) -> String {
        (Utc::now().naive_utc() - chrono::Duration::hours(hours))
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string()
    }

    #[tokio::test]
    async fn test_unread_count_drops_after_marking_and_repolling() {
        let backend = Arc::new(FakeBackend::default());
        backend.insert(record(1, "finished", &hours_ago(2), None));
        backend.insert(record(2, "failed", &hours_ago(1), None));
        let (mut poller, rx) = EventPoller::new(FeedConfig::default(), backend.clone(), None);
        let marker = SeenMarker::new(backend.clone(), tokio::runtime::Handle::current());

        poller.poll_once().await.unwrap();
        assert_eq!(rx.borrow().unread_count, 2);

        marker.mark_visible_seen(&rx.borrow().clone());
        tokio::time::sleep(Duration::from_millis(20)).await;
        // Nothing changes in memory until the next poll
        assert_eq!(rx.borrow().unread_count, 2);

        // Both are older than the newest known event, yet still re-fetched
        poller.poll_once().await.unwrap();
        assert_eq!(backend.last_served(), vec![2, 1]);
        assert_eq!(rx.borrow().unread_count, 0);

        // Once seen they drop out of the poll again
        poller.poll_once().await.unwrap();
        assert_eq!(backend.last_served(), Vec::<u64>::new());
        assert_eq!(rx.borrow().unread_count, 0);
    }

    #[tokio::test]
    async fn test_poll_picks_up_new_events_through_filter() {
        let backend = Arc::new(FakeBackend::default());
        backend.insert(record(1, "started", &hours_ago(3), Some(10)));
        let (mut poller, rx) = EventPoller::new(FeedConfig::default(), backend.clone(), None);
        poller.poll_once().await.unwrap();

        backend.insert(record(1, "finished", &hours_ago(3), Some(100)));
        backend.insert(record(2, "finished", &hours_ago(1), None));
        poller.poll_once().await.unwrap();

        assert_eq!(backend.last_served(), vec![2, 1]);
        let snapshot = rx.borrow().clone();
        assert!(snapshot.in_progress.is_empty());
        assert_eq!(settled_ids(&snapshot), vec![2, 1]);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let source = ScriptedSource::with(vec![page(vec![record(
            1,
            "finished",
            "2024-05-01T08:00:00",
            None,
        )])]);
        let (poller, mut rx) = EventPoller::new(FeedConfig::default(), source, None);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(poller.run(shutdown_rx));
        rx.changed().await.unwrap();
        assert_eq!(settled_ids(&rx.borrow()), vec![1]);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_poke_triggers_early_poll() {
        let source = ScriptedSource::with(vec![
            page(vec![record(1, "finished", "2024-05-01T08:00:00", None)]),
            page(vec![record(2, "finished", "2024-05-01T09:00:00", None)]),
        ]);
        let config = FeedConfig {
            poll_interval_secs: 3600,
            ..Default::default()
        };
        let (poller, mut rx) = EventPoller::new(config, source, None);
        let poke = poller.poke_handle();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(poller.run(shutdown_rx));
        rx.changed().await.unwrap();

        poke.notify_one();
        tokio::time::timeout(Duration::from_secs(1), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(settled_ids(&rx.borrow()), vec![2, 1]);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_account_result_discarded_after_shutdown() {
        let source = ScriptedSource::with(vec![]);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let account: Arc<dyn AccountSource> = Arc::new(ShutdownDuringFetch {
            shutdown: shutdown_tx,
        });
        let (poller, rx) = EventPoller::new(FeedConfig::default(), source.clone(), Some(account));

        tokio::time::timeout(Duration::from_secs(1), poller.run(shutdown_rx))
            .await
            .unwrap();

        assert!(rx.borrow().feed.is_empty());
        assert_eq!(rx.borrow().unread_count, 0);
        assert!(source.requests.lock().unwrap().is_empty());
    }
}
