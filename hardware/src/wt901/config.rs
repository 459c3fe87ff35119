use std::time::Duration;

use clap::Parser;

/// Default line rate of the WT901C-485
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Runtime configuration of the IMU node
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Serial device the IMU is attached to
    #[arg(long, default_value = "/dev/ttyUSB0")]
    pub port: String,

    /// Serial baud rate
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    pub baud_rate: u32,

    /// Topic for inertial messages
    #[arg(long, default_value = "imu/data_raw")]
    pub imu_topic: String,

    /// Topic for magnetic field messages
    #[arg(long, default_value = "mag/data_raw")]
    pub mag_topic: String,

    /// Frame identifier stamped on every message
    #[arg(long, default_value = "imu_link")]
    pub frame_id: String,

    /// Telemetry poll rate in Hz
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub imu_freq: u32,
}

impl NodeConfig {
    /// Interval between telemetry polls
    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.imu_freq))
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            imu_topic: "imu/data_raw".to_string(),
            mag_topic: "mag/data_raw".to_string(),
            frame_id: "imu_link".to_string(),
            imu_freq: 10,
        }
    }
}
