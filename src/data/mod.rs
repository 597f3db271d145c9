pub mod feed;
pub mod pricing;
pub mod pubsub;
pub mod store;

pub use feed::{FeedPhase, PriceFeed, TickReport, TickSummary};
pub use pricing::{default_symbols, PricingModel, RandomWalkPricing, TrackedSymbol, WallClockPricing};
pub use pubsub::{Broadcaster, PublishReport, Subscriber, SubscriberId};
pub use store::PriceStore;
