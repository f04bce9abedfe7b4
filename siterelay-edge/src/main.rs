use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use siterelay_broker::AmqpConnector;
use siterelay_edge::{EdgeConfig, MeasurementParser, ResilientPublisher, UdpListener};
use siterelay_types::{SensorType, Settings};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "siterelay-edge")]
#[command(about = "Relay warehouse sensor datagrams to the measurement queue")]
struct Args {
    /// Optional TOML file; environment variables override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

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

    let config = EdgeConfig::from_settings(&Settings::load(args.config.as_deref()));

    let connector = Arc::new(AmqpConnector::new(&config.broker_url, &config.queue_name));
    let publisher = Arc::new(ResilientPublisher::connect(connector).await);
    let parser = Arc::new(MeasurementParser::new(Some(config.warehouse_id.clone())));

    let listeners = vec![
        UdpListener::new(
            config.temperature_port,
            SensorType::Temperature,
            parser.clone(),
            publisher.clone(),
        )
        .start()
        .await,
        UdpListener::new(
            config.humidity_port,
            SensorType::Humidity,
            parser,
            publisher.clone(),
        )
        .start()
        .await,
    ];

    info!(
        "siterelay-edge started warehouse={} temperature_port={} humidity_port={} queue={}",
        config.warehouse_id, config.temperature_port, config.humidity_port, config.queue_name
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    for listener in &listeners {
        listener.close();
    }
    for listener in &listeners {
        listener.join().await;
        let stats = listener.stats();
        info!(
            "{} listener: datagrams={} relayed={} rejected={}",
            listener.sensor_type(),
            stats.datagrams,
            stats.relayed,
            stats.rejected
        );
    }

    publisher.close().await;
    let stats = publisher.stats();
    info!(
        "siterelay-edge stopped published={} dropped={} reconnects={}",
        stats.published, stats.dropped, stats.reconnects
    );
    Ok(())
}
