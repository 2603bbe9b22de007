use clap::Parser;
use hub::controller::{HubConfig, HubController, HubHandle};
use hub::generator::RandomIdGenerator;
use hub::lease::LeaseManager;
use hub::supplier::SupplierConfig;
use log::{error, info, warn};
use shared::DEFAULT_MAX_BATCH;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Maximum number of connected plus waiting players
    #[arg(short = 'm', long, default_value = "32")]
    max_players: usize,

    /// Seconds without a check-in before a player is dropped
    #[arg(short = 't', long, default_value = "90")]
    player_timeout: u64,

    /// Milliseconds between demand polls by the ID supplier
    #[arg(short = 'p', long, default_value = "50")]
    poll_interval: u64,

    /// Largest batch of ids generated at once
    #[arg(short = 'b', long, default_value_t = DEFAULT_MAX_BATCH)]
    max_batch: usize,

    /// Milliseconds between timeout sweeps
    #[arg(long, default_value = "1000")]
    sweep_interval: u64,

    /// Seconds between stats log lines (0 disables them)
    #[arg(long, default_value = "10")]
    stats_interval: u64,

    /// Seed for the id generator
    #[arg(long)]
    seed: Option<u64>,

    /// Number of simulated sessions to admit at start-up
    #[arg(short = 's', long, default_value = "0")]
    simulate: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = HubConfig {
        max_clients: args.max_players,
        player_timeout: Duration::from_secs(args.player_timeout),
        sweep_interval: Duration::from_millis(args.sweep_interval.max(1)),
        supplier: SupplierConfig {
            poll_interval: Duration::from_millis(args.poll_interval.max(1)),
            max_batch: args.max_batch,
        },
    };

    let generator = match args.seed {
        Some(seed) => RandomIdGenerator::seeded(seed),
        None => RandomIdGenerator::new(),
    };

    let leases = Arc::new(LeaseManager::new());
    let mut controller = HubController::new(Arc::clone(&leases), config);
    let hub = controller.handle();

    let hub_task = tokio::spawn(async move {
        controller.run(generator).await;
    });

    if args.stats_interval > 0 {
        tokio::spawn(log_stats(hub.clone(), Duration::from_secs(args.stats_interval)));
    }

    for session in 0..args.simulate {
        let hub = hub.clone();
        tokio::spawn(async move {
            match hub.join().await {
                Ok(id) => info!("Simulated session {} got player id {}", session, id),
                Err(e) => warn!("Simulated session {} was rejected: {}", session, e),
            }
        });
    }

    tokio::select! {
        result = hub_task => {
            if let Err(e) = result {
                error!("Hub task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            if let Err(e) = hub.shutdown() {
                warn!("Hub already stopped: {}", e);
            }
        }
    }

    Ok(())
}

/// Logs a JSON stats line at a fixed interval until the hub closes
async fn log_stats(hub: HubHandle, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Ok(stats) = hub.stats().await else {
            break;
        };
        match serde_json::to_string(&stats) {
            Ok(line) => info!("Stats: {}", line),
            Err(e) => warn!("Failed to encode stats: {}", e),
        }
    }
}
