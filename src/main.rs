#![forbid(unsafe_code)]

//! Mock ground station - connects one station, uploads an image per scheduled transmission
//!
//! Usage:
//!   GS_APP_ID=... GS_API_KEY=... cargo run --bin mock_ground_station
//!   cargo run --bin mock_ground_station -- --app-id ... --api-key ... --image memesat-1.png

use anyhow::Result;
use clap::Parser;
use groundlink::config::GroundStationArgs;
use groundlink::ground_station::MockGroundStation;
use groundlink::stop;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let args = GroundStationArgs::parse();

    // Initialize tracing
    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Mock ground station - starting");

    let config = args.into_config()?;
    let station = MockGroundStation::new(config)?;
    let summary = station.run_until(stop::ctrl_c()).await?;

    info!(
        "Mock ground station stopped: {} transmissions scheduled, {} images uploaded",
        summary.scheduled, summary.uploaded
    );
    Ok(())
}
