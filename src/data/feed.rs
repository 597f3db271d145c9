use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::data::{Broadcaster, PriceStore, PricingModel, PublishReport};
use crate::db::PriceRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPhase {
    Idle,
    ComputingPrices,
    Persisting,
    Publishing,
}

/// Everything that changed in one tick, rendered as the broadcast message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TickSummary {
    pub prices: BTreeMap<String, f64>,
}

impl fmt::Display for TickSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Updated Prices: {{")?;
        for (i, (symbol, price)) in self.prices.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:{}", symbol, price)?;
        }
        write!(f, "}}")
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub updated: BTreeMap<String, f64>,
    pub persist_failures: Vec<String>,
    pub message: Option<String>,
    pub publish: PublishReport,
}

/// Periodic producer: computes prices, commits them, persists each one and
/// publishes a single summary per tick.
pub struct PriceFeed {
    store: PriceStore,
    broadcaster: Arc<Broadcaster>,
    repository: Arc<dyn PriceRepository>,
    pricing: Box<dyn PricingModel>,
    period: Duration,
    phase: FeedPhase,
}

impl PriceFeed {
    pub fn new(
        store: PriceStore,
        broadcaster: Arc<Broadcaster>,
        repository: Arc<dyn PriceRepository>,
        pricing: Box<dyn PricingModel>,
        period: Duration,
    ) -> Self {
        Self {
            store,
            broadcaster,
            repository,
            pricing,
            period: period.max(Duration::from_millis(1)),
            phase: FeedPhase::Idle,
        }
    }

    pub fn phase(&self) -> FeedPhase {
        self.phase
    }

    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        self.enter(FeedPhase::ComputingPrices);
        let batch = self.pricing.next_prices(&self.store.snapshot_all());
        if let Err(e) = self.store.apply(&batch) {
            error!("Discarding tick, computed prices were rejected: {}", e);
            self.enter(FeedPhase::Idle);
            return report;
        }
        report.updated = batch.into_iter().collect();

        // Persistence and broadcast are independent; a failed save only costs that row.
        self.enter(FeedPhase::Persisting);
        for (symbol, price) in &report.updated {
            if let Err(e) = self.repository.save(symbol, *price).await {
                warn!("Failed to save price for {}: {}", symbol, e);
                report.persist_failures.push(symbol.clone());
            }
        }

        self.enter(FeedPhase::Publishing);
        let message = TickSummary {
            prices: report.updated.clone(),
        }
        .to_string();
        report.publish = self.broadcaster.publish(&message);
        report.message = Some(message);

        self.enter(FeedPhase::Idle);
        report
    }

    /// Ticks every period until `shutdown` turns true or its sender is dropped.
    /// A tick already in progress always runs to completion.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval_at(
            tokio::time::Instant::now() + self.period,
            self.period,
        );
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Price feed started (every {:?})", self.period);
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.tick().await;
                    debug!(
                        "Tick done: {} prices, {} save failures, {} delivered",
                        report.updated.len(),
                        report.persist_failures.len(),
                        report.publish.delivered
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("Price feed stopped");
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    fn enter(&mut self, phase: FeedPhase) {
        debug!("Feed phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }
}
