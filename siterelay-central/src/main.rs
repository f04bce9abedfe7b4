use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use siterelay_broker::AmqpConnector;
use siterelay_central::{AlarmService, CentralConfig, LogAlarmSink, ResilientConsumer};
use siterelay_types::Settings;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "siterelay-central")]
#[command(about = "Drain the measurement queue and raise threshold alarms")]
struct Args {
    /// Optional TOML file; environment variables override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let config = CentralConfig::from_settings(&Settings::load(args.config.as_deref()));

    let service = Arc::new(AlarmService::new(config.thresholds, Arc::new(LogAlarmSink)));
    let connector = Arc::new(AmqpConnector::new(&config.broker_url, &config.queue_name));
    let consumer = ResilientConsumer::new(connector, service).start();

    info!(
        "siterelay-central started queue={} temperature_threshold={} humidity_threshold={}",
        config.queue_name, config.thresholds.temperature, config.thresholds.humidity
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    consumer.stop();
    consumer.join().await;

    let stats = consumer.stats();
    info!(
        "siterelay-central stopped received={} forwarded={} discarded={} reconnects={}",
        stats.received, stats.forwarded, stats.discarded, stats.reconnects
    );
    Ok(())
}
