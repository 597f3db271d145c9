use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use futures::future::join_all;
use log::{error, info};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;

use stock_notifier::api::{create_api_router, ApiState};
use stock_notifier::config::{Config, PricingKind, RANDOM_WALK_MAX_STEP};
use stock_notifier::data::{
    default_symbols, Broadcaster, PriceFeed, PriceStore, PricingModel, RandomWalkPricing,
    WallClockPricing,
};
use stock_notifier::db::{MemoryRepository, PriceRepository, SeaOrmRepository};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    config.log_config();

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        return Err(e.into());
    }

    info!("Starting Stock Price Notifier...");

    let repository: Arc<dyn PriceRepository> = if config.database.is_memory() {
        Arc::new(MemoryRepository::new())
    } else {
        Arc::new(SeaOrmRepository::connect(&config.database).await?)
    };

    let price_store = PriceStore::new();
    let broadcaster = Arc::new(Broadcaster::new(config.subscriber_queue_capacity));

    // Subscribers go first so the very first tick reaches them
    let mut subscriber_tasks = Vec::with_capacity(config.subscriber_count);
    for n in 1..=config.subscriber_count {
        let subscriber = broadcaster.register_new()?;
        subscriber_tasks.push(subscriber.spawn(move |id, message| {
            info!("Subscriber {} ({}) received: {}", n, id, message);
        }));
    }

    let pricing: Box<dyn PricingModel> = match config.pricing {
        PricingKind::RandomWalk => Box::new(RandomWalkPricing::new(default_symbols(), RANDOM_WALK_MAX_STEP)),
        PricingKind::WallClock => Box::new(WallClockPricing::new(default_symbols())),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let feed_task = PriceFeed::new(
        price_store.clone(),
        broadcaster.clone(),
        repository.clone(),
        pricing,
        Duration::from_secs(config.tick_interval_secs),
    )
    .spawn(shutdown_rx);

    let api_state = ApiState {
        price_store,
        repository: repository.clone(),
    };
    let api_router = create_api_router(api_state)
        .layer(CorsLayer::permissive());

    // Teardown runs whether the server stopped on a signal or failed
    let served = serve_api(&config.bind_address, api_router).await;
    if let Err(e) = &served {
        error!("HTTP API server failed: {}", e);
    }

    info!("Shutting down...");
    let _ = shutdown_tx.send(true);
    if let Err(e) = feed_task.await {
        error!("Price feed task failed: {}", e);
    }

    broadcaster.close();
    for (i, result) in join_all(subscriber_tasks).await.into_iter().enumerate() {
        match result {
            Ok(handled) => info!("Subscriber {} handled {} messages", i + 1, handled),
            Err(e) => error!("Subscriber {} task failed: {}", i + 1, e),
        }
    }

    repository.close().await?;
    served.map_err(Into::into)
}

async fn serve_api(bind_address: &str, router: Router) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_address).await?;
    info!("HTTP API server running at http://{}", bind_address);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
