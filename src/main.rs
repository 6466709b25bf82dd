//! Registrar daemon entry point.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use tokio::signal;

use registrar::upstream::aws::{load_sdk_config, AwsComputeApi, AwsContainerApi};
use registrar::{Config, ConsulKv, DiscoveryOrchestrator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let cfg = Config::load()?;
    info!("Starting registrar with config: {:?}", cfg);

    let sdk_config = load_sdk_config(&cfg.region).await;
    let mut orchestrator = DiscoveryOrchestrator::builder(&cfg)
        .container_api(Arc::new(AwsContainerApi::new(&sdk_config)))
        .compute_api(Arc::new(AwsComputeApi::new(&sdk_config)))
        .registry(Arc::new(ConsulKv::new(&cfg.consul)?))
        .build()?;

    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut delay = cfg.interval();
    loop {
        let result = tokio::select! {
            result = orchestrator.run_cycle() => result,
            res = &mut shutdown => {
                log_signal(res);
                break;
            }
        };

        delay = match result {
            Ok(_) => cfg.interval(),
            Err(e) => {
                error!("Discovery cycle for {} failed: {}", orchestrator.cluster(), e);
                let next = backoff(delay, cfg.max_backoff());
                info!("Backing off for {:?}", next);
                next
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            res = &mut shutdown => {
                log_signal(res);
                break;
            }
        }
    }

    info!("Shutdown complete.");
    Ok(())
}

fn backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}

fn log_signal(res: std::io::Result<()>) {
    match res {
        Ok(()) => info!("Received Ctrl+C, shutting down..."),
        Err(err) => error!("Unable to listen for shutdown signal: {}", err),
    }
}
