use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use stock_notifier::data::{Broadcaster, PriceFeed, PriceStore, PricingModel};
use stock_notifier::db::{MemoryRepository, PriceRepository, PriceSnapshotRecord};
use stock_notifier::error::DbError;

/// Fails every save for one symbol and records the rest.
struct FlakyRepository {
    failing_symbol: &'static str,
    inner: MemoryRepository,
}

#[async_trait]
impl PriceRepository for FlakyRepository {
    async fn save(&self, symbol: &str, price: f64) -> Result<(), DbError> {
        if symbol == self.failing_symbol {
            return Err(DbError::Unavailable(format!("cannot write {}", symbol)));
        }
        self.inner.save(symbol, price).await
    }

    async fn load_all(&self) -> Result<Vec<PriceSnapshotRecord>, DbError> {
        self.inner.load_all().await
    }
}

/// Replays a fixed list of ticks, then repeats the last one.
struct Scripted {
    ticks: Vec<Vec<(&'static str, f64)>>,
    next: usize,
}

impl PricingModel for Scripted {
    fn next_prices(&mut self, _current: &BTreeMap<String, f64>) -> Vec<(String, f64)> {
        let index = self.next.min(self.ticks.len() - 1);
        self.next += 1;
        self.ticks[index]
            .iter()
            .map(|(symbol, price)| (symbol.to_string(), *price))
            .collect()
    }
}

fn scripted(ticks: Vec<Vec<(&'static str, f64)>>) -> Box<dyn PricingModel> {
    Box::new(Scripted { ticks, next: 0 })
}

#[tokio::test]
async fn both_subscribers_receive_the_summary_exactly_once() {
    let broadcaster = Broadcaster::new(16);
    let mut s1 = broadcaster.register_new().unwrap();
    let mut s2 = broadcaster.register_new().unwrap();

    broadcaster.publish("Updated Prices: {AAPL:151}");
    broadcaster.close();

    for sub in [&mut s1, &mut s2] {
        assert_eq!(sub.recv().await.as_deref(), Some("Updated Prices: {AAPL:151}"));
        assert_eq!(sub.recv().await, None);
    }
}

#[tokio::test]
async fn failed_save_does_not_block_other_symbols_or_publish() {
    let store = PriceStore::new();
    let broadcaster = Arc::new(Broadcaster::new(16));
    let repository = Arc::new(FlakyRepository {
        failing_symbol: "GOOG",
        inner: MemoryRepository::new(),
    });
    let mut s1 = broadcaster.register_new().unwrap();
    let mut s2 = broadcaster.register_new().unwrap();

    let mut feed = PriceFeed::new(
        store.clone(),
        broadcaster.clone(),
        repository.clone(),
        scripted(vec![vec![("AAPL", 151.0), ("GOOG", 2810.0)]]),
        Duration::from_secs(5),
    );
    let report = feed.tick().await;

    assert_eq!(report.persist_failures, vec!["GOOG".to_string()]);
    assert_eq!(store.get("GOOG"), Some(2810.0));

    let saved = repository.load_all().await.unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].stock_name, "AAPL");
    assert_eq!(saved[0].price, 151.0);

    for sub in [&mut s1, &mut s2] {
        assert_eq!(
            sub.try_recv().as_deref(),
            Some("Updated Prices: {AAPL:151, GOOG:2810}")
        );
    }
}

#[tokio::test(start_paused = true)]
async fn running_feed_delivers_ticks_in_order_and_drains_on_shutdown() {
    let store = PriceStore::new();
    let broadcaster = Arc::new(Broadcaster::new(16));
    let repository = Arc::new(MemoryRepository::new());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut tasks = Vec::new();
    for _ in 0..3 {
        let seen = seen.clone();
        let sub = broadcaster.register_new().unwrap();
        tasks.push(sub.spawn(move |id, message| seen.lock().unwrap().push((*id, message))));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let feed = PriceFeed::new(
        store.clone(),
        broadcaster.clone(),
        repository.clone(),
        scripted(vec![
            vec![("AAPL", 150.0)],
            vec![("AAPL", 151.0)],
            vec![("AAPL", 152.0)],
        ]),
        Duration::from_secs(5),
    );
    let feed_task = feed.spawn(shutdown_rx);

    // Three periods plus slack; the paused clock auto-advances.
    tokio::time::sleep(Duration::from_millis(15_500)).await;
    shutdown_tx.send(true).unwrap();
    feed_task.await.unwrap();

    broadcaster.close();
    for task in tasks {
        assert_eq!(task.await.unwrap(), 3);
    }

    let seen = seen.lock().unwrap();
    let mut per_subscriber: BTreeMap<_, Vec<String>> = BTreeMap::new();
    for (id, message) in seen.iter() {
        per_subscriber.entry(*id).or_default().push(message.clone());
    }
    assert_eq!(per_subscriber.len(), 3);
    for messages in per_subscriber.values() {
        assert_eq!(
            messages,
            &vec![
                "Updated Prices: {AAPL:150}".to_string(),
                "Updated Prices: {AAPL:151}".to_string(),
                "Updated Prices: {AAPL:152}".to_string(),
            ]
        );
    }

    assert_eq!(store.snapshot_all(), BTreeMap::from([("AAPL".to_string(), 152.0)]));
    assert_eq!(repository.len(), 3);
}

#[tokio::test]
async fn stalled_subscriber_does_not_hold_back_the_feed() {
    let store = PriceStore::new();
    let broadcaster = Arc::new(Broadcaster::new(1));
    let repository = Arc::new(MemoryRepository::new());
    let mut stalled = broadcaster.register_new().unwrap();
    let mut healthy = broadcaster.register_new().unwrap();

    let mut feed = PriceFeed::new(
        store,
        broadcaster.clone(),
        repository,
        scripted(vec![vec![("AAPL", 150.0)], vec![("AAPL", 151.0)], vec![("AAPL", 152.0)]]),
        Duration::from_secs(5),
    );

    let mut healthy_seen = Vec::new();
    let mut dropped = 0;
    for _ in 0..3 {
        let report = feed.tick().await;
        dropped += report.publish.dropped;
        healthy_seen.push(healthy.try_recv().unwrap());
    }

    assert_eq!(dropped, 2);
    assert_eq!(healthy_seen.len(), 3);
    assert_eq!(stalled.try_recv().as_deref(), Some("Updated Prices: {AAPL:150}"));
    assert_eq!(stalled.try_recv(), None);
}
