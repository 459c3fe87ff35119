//! Hardware drivers for inertial sensors.
//!
//! Each driver is feature-gated for optional compilation.
//!
//! # Features
//!
//! - `wt901` - WitMotion WT901 9-axis IMU over RS485 (serial, cross-platform)

#[cfg(feature = "wt901")]
pub mod wt901;
