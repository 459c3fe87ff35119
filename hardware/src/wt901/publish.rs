//! Published message types and publisher back ends
//!
//! Each decoded reading is published as two messages: an inertial message
//! (orientation, angular rate, linear acceleration) and a magnetic field
//! message, both stamped with the time of decoding and a frame identifier.

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use wt901::SensorReading;

/// Errors raised by a publisher back end.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Timestamp and coordinate frame of a message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Header {
    pub stamp: DateTime<Utc>,
    pub frame_id: String,
}

impl Header {
    /// Header stamped with the current time
    pub fn now(frame_id: &str) -> Self {
        Self {
            stamp: Utc::now(),
            frame_id: frame_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<[f64; 3]> for Vector3 {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

/// Inertial message: orientation, angular rate (deg/s), acceleration (m/s²)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImuMessage {
    pub header: Header,
    pub orientation: Quaternion,
    pub angular_velocity: Vector3,
    pub linear_acceleration: Vector3,
}

impl ImuMessage {
    pub fn from_reading(reading: &SensorReading, header: Header) -> Self {
        let [x, y, z, w] = reading.orientation_xyzw();
        Self {
            header,
            orientation: Quaternion { x, y, z, w },
            angular_velocity: reading.angular_velocity.into(),
            linear_acceleration: reading.linear_acceleration.into(),
        }
    }
}

/// Magnetic field message in device units
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MagneticFieldMessage {
    pub header: Header,
    pub magnetic_field: Vector3,
}

impl MagneticFieldMessage {
    pub fn from_reading(reading: &SensorReading, header: Header) -> Self {
        Self {
            header,
            magnetic_field: reading.magnetic_field.into(),
        }
    }
}

/// Destination for decoded readings
pub trait ReadingPublisher {
    fn publish_imu(&mut self, message: &ImuMessage) -> Result<(), PublishError>;

    fn publish_magnetic_field(&mut self, message: &MagneticFieldMessage)
        -> Result<(), PublishError>;
}

/// Publishes readings as `tracing` events
#[derive(Debug, Clone)]
pub struct LogPublisher {
    imu_topic: String,
    mag_topic: String,
}

impl LogPublisher {
    pub fn new(imu_topic: &str, mag_topic: &str) -> Self {
        Self {
            imu_topic: imu_topic.to_string(),
            mag_topic: mag_topic.to_string(),
        }
    }
}

impl ReadingPublisher for LogPublisher {
    fn publish_imu(&mut self, message: &ImuMessage) -> Result<(), PublishError> {
        let a = message.linear_acceleration;
        let g = message.angular_velocity;
        let q = message.orientation;
        info!(
            topic = %self.imu_topic,
            frame_id = %message.header.frame_id,
            "accel=[{:.3}, {:.3}, {:.3}] m/s² gyro=[{:.2}, {:.2}, {:.2}] deg/s quat=[{:.4}, {:.4}, {:.4}, {:.4}]",
            a.x, a.y, a.z, g.x, g.y, g.z, q.x, q.y, q.z, q.w
        );
        Ok(())
    }

    fn publish_magnetic_field(
        &mut self,
        message: &MagneticFieldMessage,
    ) -> Result<(), PublishError> {
        let m = message.magnetic_field;
        info!(
            topic = %self.mag_topic,
            frame_id = %message.header.frame_id,
            "mag=[{:.4}, {:.4}, {:.4}]",
            m.x, m.y, m.z
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    topic: &'a str,
    message: &'a T,
}

/// Writes one JSON object per message: `{"topic": ..., "message": {...}}`
#[derive(Debug)]
pub struct JsonLinesPublisher<W> {
    writer: W,
    imu_topic: String,
    mag_topic: String,
}

impl<W: Write> JsonLinesPublisher<W> {
    pub fn new(writer: W, imu_topic: &str, mag_topic: &str) -> Self {
        Self {
            writer,
            imu_topic: imu_topic.to_string(),
            mag_topic: mag_topic.to_string(),
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line<T: Serialize>(&mut self, topic: &str, message: &T) -> Result<(), PublishError> {
        serde_json::to_writer(&mut self.writer, &Envelope { topic, message })?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write> ReadingPublisher for JsonLinesPublisher<W> {
    fn publish_imu(&mut self, message: &ImuMessage) -> Result<(), PublishError> {
        let topic = self.imu_topic.clone();
        self.write_line(&topic, message)
    }

    fn publish_magnetic_field(
        &mut self,
        message: &MagneticFieldMessage,
    ) -> Result<(), PublishError> {
        let topic = self.mag_topic.clone();
        self.write_line(&topic, message)
    }
}
