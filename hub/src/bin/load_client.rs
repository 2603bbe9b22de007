use clap::Parser;
use hub::controller::{HubConfig, HubController};
use hub::error::HubError;
use hub::generator::RandomIdGenerator;
use hub::lease::LeaseManager;
use hub::supplier::SupplierConfig;
use log::{info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};

/// Drives an in-process hub with many concurrent sessions and checks that
/// every admitted player received a distinct id.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of concurrent sessions
    #[arg(short = 'n', long, default_value = "200")]
    sessions: usize,

    /// Check-ins sent by each session before it leaves
    #[arg(short = 'c', long, default_value = "3")]
    check_ins: u32,

    /// Largest batch of ids generated at once
    #[arg(short = 'b', long, default_value = "16")]
    max_batch: usize,

    /// Seed for the id generator
    #[arg(long, default_value = "1")]
    seed: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = HubConfig {
        max_clients: args.sessions,
        sweep_interval: Duration::from_millis(100),
        supplier: SupplierConfig {
            poll_interval: Duration::from_millis(5),
            max_batch: args.max_batch,
        },
        ..HubConfig::default()
    };

    let mut controller = HubController::new(Arc::new(LeaseManager::new()), config);
    let hub = controller.handle();
    let generator = RandomIdGenerator::seeded(args.seed);
    let hub_task = tokio::spawn(async move {
        controller.run(generator).await;
    });

    info!("Starting {} sessions", args.sessions);
    let start = Instant::now();

    let sessions: Vec<_> = (0..args.sessions)
        .map(|_| {
            let hub = hub.clone();
            let check_ins = args.check_ins;
            tokio::spawn(async move {
                let id = hub.join().await?;
                for _ in 0..check_ins {
                    sleep(Duration::from_millis(10)).await;
                    hub.check_in(id)?;
                }
                hub.leave(id)?;
                Ok::<_, HubError>(id)
            })
        })
        .collect();

    let mut ids = HashSet::new();
    let mut rejected = 0;
    for session in sessions {
        match session.await? {
            Ok(id) => {
                if !ids.insert(id) {
                    warn!("Player id {} was handed out twice", id);
                }
            }
            Err(e) => {
                warn!("Session failed: {}", e);
                rejected += 1;
            }
        }
    }

    let stats = hub.stats().await?;
    info!(
        "{} sessions admitted with {} distinct ids ({} rejected) in {:?}",
        args.sessions - rejected,
        ids.len(),
        rejected,
        start.elapsed()
    );
    info!("Final stats: {}", serde_json::to_string(&stats)?);

    hub.shutdown()?;
    hub_task.await?;

    if ids.len() + rejected != args.sessions {
        return Err("duplicate player ids detected".into());
    }

    Ok(())
}
