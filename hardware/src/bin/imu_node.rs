//! WT901 IMU node.
//!
//! Opens the serial port, calibrates the accelerometer, then polls telemetry
//! at the configured rate and publishes each reading until Ctrl-C.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use hardware::wt901::{
    open_serial, ImuNode, JsonLinesPublisher, LinkReceiver, LogPublisher, NodeConfig,
    ReadingPublisher,
};
use tracing::info;
use wt901::Link;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Output {
    /// Log each reading
    Log,
    /// Write one JSON object per message to stdout
    Json,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Poll a WT901 IMU and publish its readings")]
struct Args {
    #[command(flatten)]
    config: NodeConfig,

    /// Where readings are published
    #[arg(long, value_enum, default_value = "log")]
    output: Output,
}

async fn run_node<L, P>(link: L, publisher: P, config: NodeConfig, mut rx: LinkReceiver) -> Result<()>
where
    L: Link,
    P: ReadingPublisher,
{
    let mut node = ImuNode::new(link, publisher, config);
    node.run(&mut rx).await?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.config;

    info!("WT901 IMU node on {} ({:?} output)", config.port, args.output);

    let (port, rx) = open_serial(&config.port, config.baud_rate)
        .with_context(|| format!("Failed to open {}", config.port))?;

    match args.output {
        Output::Log => {
            let publisher = LogPublisher::new(&config.imu_topic, &config.mag_topic);
            run_node(port, publisher, config, rx).await
        }
        Output::Json => {
            let publisher =
                JsonLinesPublisher::new(std::io::stdout(), &config.imu_topic, &config.mag_topic);
            run_node(port, publisher, config, rx).await
        }
    }
}
