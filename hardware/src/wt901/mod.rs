//! WitMotion WT901 (RS485) IMU driver
//!
//! Wires the `wt901` protocol engine to a serial port: calibration at
//! startup, then periodic telemetry polls whose responses are decoded and
//! handed to a [`ReadingPublisher`].

mod config;
mod link;
mod node;
mod publish;

pub use config::{NodeConfig, DEFAULT_BAUD_RATE};
pub use link::{open_serial, spawn_reader, LinkReceiver};
pub use node::{ImuNode, NodeError, NodeStats};
pub use publish::{
    Header, ImuMessage, JsonLinesPublisher, LogPublisher, MagneticFieldMessage, PublishError,
    Quaternion, ReadingPublisher, Vector3,
};
