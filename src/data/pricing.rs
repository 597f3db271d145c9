use std::collections::BTreeMap;

use chrono::{DateTime, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Rule for computing the next price of every tracked symbol.
pub trait PricingModel: Send {
    fn next_prices(&mut self, current: &BTreeMap<String, f64>) -> Vec<(String, f64)>;
}

/// A symbol together with the band its price moves in: `[base, base + span]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedSymbol {
    pub symbol: String,
    pub base: f64,
    pub span: u32,
}

impl TrackedSymbol {
    pub fn new(symbol: impl Into<String>, base: f64, span: u32) -> Self {
        Self {
            symbol: symbol.into(),
            base,
            span,
        }
    }
}

pub fn default_symbols() -> Vec<TrackedSymbol> {
    vec![
        TrackedSymbol::new("AAPL", 150.0, 10),
        TrackedSymbol::new("GOOG", 2800.0, 50),
    ]
}

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send>;

/// `base + (current second % span)`, evaluated on every tick.
pub struct WallClockPricing {
    symbols: Vec<TrackedSymbol>,
    clock: Clock,
}

impl WallClockPricing {
    pub fn new(symbols: Vec<TrackedSymbol>) -> Self {
        Self::with_clock(symbols, Utc::now)
    }

    pub fn with_clock<C>(symbols: Vec<TrackedSymbol>, clock: C) -> Self
    where
        C: Fn() -> DateTime<Utc> + Send + 'static,
    {
        Self {
            symbols,
            clock: Box::new(clock),
        }
    }
}

impl PricingModel for WallClockPricing {
    fn next_prices(&mut self, _current: &BTreeMap<String, f64>) -> Vec<(String, f64)> {
        let second = (self.clock)().second();
        self.symbols
            .iter()
            .map(|tracked| {
                let offset = second % tracked.span.max(1);
                (tracked.symbol.clone(), tracked.base + offset as f64)
            })
            .collect()
    }
}

/// Bounded random walk. Each step moves at most `max_step` and stays inside
/// the symbol's band. Prices are rounded to cents.
pub struct RandomWalkPricing {
    symbols: Vec<TrackedSymbol>,
    max_step: f64,
    rng: StdRng,
}

impl RandomWalkPricing {
    pub fn new(symbols: Vec<TrackedSymbol>, max_step: f64) -> Self {
        let seed = Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
        Self::with_seed(symbols, max_step, seed)
    }

    pub fn with_seed(symbols: Vec<TrackedSymbol>, max_step: f64, seed: u64) -> Self {
        Self {
            symbols,
            max_step: max_step.abs(),
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl PricingModel for RandomWalkPricing {
    fn next_prices(&mut self, current: &BTreeMap<String, f64>) -> Vec<(String, f64)> {
        let mut prices = Vec::with_capacity(self.symbols.len());
        for tracked in &self.symbols {
            let ceiling = tracked.base + tracked.span as f64;
            let from = current
                .get(&tracked.symbol)
                .copied()
                .unwrap_or(tracked.base + tracked.span as f64 / 2.0);

            let step = if self.max_step > 0.0 {
                self.rng.gen_range(-self.max_step..=self.max_step)
            } else {
                0.0
            };
            let next = ((from + step).clamp(tracked.base, ceiling) * 100.0).round() / 100.0;
            prices.push((tracked.symbol.clone(), next));
        }
        prices
    }
}
