//! WitMotion WT901 (RS485) register protocol
//!
//! Structures and codecs for the Modbus-like register-read protocol spoken by
//! the WT901C-485 nine-axis inertial/magnetic sensor: request framing, response
//! validation, fixed-point unit conversion and the accelerometer calibration
//! handshake.

pub mod assembler;
pub mod calibration;
mod checksum;
pub mod decode;
pub mod frame;
mod link;
mod registers;

pub use assembler::{FrameAssembler, RejectedFrame};
pub use calibration::{
    CalibrationError, CalibrationSequencer, CalibrationState, CALIBRATION_TIME, START_CALIBRATION,
    UNLOCK, UNLOCK_SETTLE_TIME,
};
pub use checksum::{compute_checksum, verify_checksum, Checksummed};
pub use decode::{decode, FullScale, SensorReading, STANDARD_GRAVITY};
pub use frame::{
    build_request, build_response, parse_request, parse_response, parse_telemetry,
    telemetry_request, ParseError, ReadRequest, ResponseFrame, DEVICE_ID, FRAME_OVERHEAD,
    READ_REGISTERS, TELEMETRY_REGISTER_COUNT, TELEMETRY_START_REGISTER,
};
pub use link::Link;
pub use registers::{BeI16, BeU16, RegisterBlock, REGISTER_COUNT};
