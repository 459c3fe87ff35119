//! Request and response framing for the register-read function
//!
//! # Wire format
//!
//! Request (8 bytes):
//! ```text
//! 50 03 <start hi> <start lo> <count hi> <count lo> <crc hi> <crc lo>
//! ```
//!
//! Response (`len + 5` bytes):
//! ```text
//! 50 03 <len> <len bytes of big-endian i16 registers> <crc hi> <crc lo>
//! ```
//!
//! The checksum always covers every byte before it.

use bytemuck::{Pod, Zeroable};
use thiserror::Error;

use crate::checksum::{compute_checksum, Checksummed};
use crate::registers::{BeU16, RegisterBlock, REGISTER_COUNT};

/// Address of the sensor on the bus
pub const DEVICE_ID: u8 = 0x50;

/// Modbus "read holding registers" function code
pub const READ_REGISTERS: u8 = 0x03;

/// First register of the telemetry block (AX)
pub const TELEMETRY_START_REGISTER: u16 = 0x0034;

/// Registers requested per telemetry poll
pub const TELEMETRY_REGISTER_COUNT: u16 = REGISTER_COUNT as u16;

/// Bytes in a response that are not payload: id, function, length, 2 checksum bytes
pub const FRAME_OVERHEAD: usize = 5;

/// Errors that can occur while validating a received frame.
///
/// None of these are fatal; the frame is dropped and the next poll
/// re-requests the data.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Not enough bytes to hold the frame envelope.
    #[error("Frame too short: {len} bytes")]
    FrameTooShort { len: usize },

    /// Header does not address this device or the read function.
    #[error("Unexpected device 0x{device_id:02X} / function 0x{function_code:02X}")]
    UnexpectedDeviceOrFunction { device_id: u8, function_code: u8 },

    /// Declared length disagrees with the number of bytes received.
    #[error("Frame length mismatch: expected {expected} bytes, received {received}")]
    FrameLengthMismatch { expected: usize, received: usize },

    /// Integrity check failed.
    #[error("Checksum mismatch: computed 0x{computed:04X}, received 0x{received:04X}")]
    ChecksumMismatch { computed: u16, received: u16 },

    /// Frame is valid but does not carry a full telemetry block.
    #[error("Payload size {actual} bytes, expected {expected}")]
    PayloadSize { expected: usize, actual: usize },
}

/// Register read request
///
/// Total frame size: 8 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ReadRequest {
    /// Bus address (1 byte)
    pub device_id: u8,

    /// Function code, always read (1 byte)
    pub function_code: u8,

    /// First register to read (2 bytes)
    pub start_register: BeU16,

    /// Number of registers to read (2 bytes)
    pub register_count: BeU16,

    /// Checksum over the preceding 6 bytes (2 bytes)
    pub checksum: BeU16,
}

impl ReadRequest {
    /// Expected frame size in bytes
    pub const FRAME_SIZE: usize = 8;

    /// Create a request with a freshly computed checksum.
    pub fn new(start_register: u16, register_count: u16) -> Self {
        let mut request = Self {
            device_id: DEVICE_ID,
            function_code: READ_REGISTERS,
            start_register: BeU16::new(start_register),
            register_count: BeU16::new(register_count),
            checksum: BeU16::default(),
        };
        request.update_checksum();
        request
    }

    /// Wire bytes of this request
    pub fn to_bytes(&self) -> [u8; Self::FRAME_SIZE] {
        bytemuck::cast(*self)
    }
}

impl Checksummed for ReadRequest {}

/// Telemetry response carrying a full register block
///
/// Total frame size: 29 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
struct TelemetryResponse {
    device_id: u8,
    function_code: u8,
    data_length: u8,
    registers: RegisterBlock,
    checksum: BeU16,
}

impl TelemetryResponse {
    const FRAME_SIZE: usize = RegisterBlock::SIZE + FRAME_OVERHEAD;
}

impl Checksummed for TelemetryResponse {}

/// A response frame that passed header, length and checksum validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseFrame<'a> {
    bytes: &'a [u8],
}

impl<'a> ResponseFrame<'a> {
    pub fn device_id(&self) -> u8 {
        self.bytes[0]
    }

    pub fn function_code(&self) -> u8 {
        self.bytes[1]
    }

    /// Declared payload length in bytes
    pub fn data_length(&self) -> usize {
        self.bytes[2] as usize
    }

    /// Register payload, excluding header and checksum
    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[3..self.bytes.len() - 2]
    }

    pub fn checksum(&self) -> u16 {
        let end = self.bytes.len();
        u16::from_be_bytes([self.bytes[end - 2], self.bytes[end - 1]])
    }

    /// The whole frame, including header and checksum
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

/// Build a register-read request frame.
pub fn build_request(start_register: u16, register_count: u16) -> [u8; ReadRequest::FRAME_SIZE] {
    ReadRequest::new(start_register, register_count).to_bytes()
}

/// Build the periodic telemetry poll: 12 registers from 0x34.
pub fn telemetry_request() -> [u8; ReadRequest::FRAME_SIZE] {
    build_request(TELEMETRY_START_REGISTER, TELEMETRY_REGISTER_COUNT)
}

/// Validate a received response frame.
///
/// Checks, in order: envelope size, device id and function code, declared
/// length against the received length, then the checksum. A frame that fails
/// any check yields no data.
pub fn parse_response(bytes: &[u8]) -> Result<ResponseFrame<'_>, ParseError> {
    if bytes.len() < FRAME_OVERHEAD {
        return Err(ParseError::FrameTooShort { len: bytes.len() });
    }

    check_header(bytes)?;

    let expected = bytes[2] as usize + FRAME_OVERHEAD;
    if bytes.len() != expected {
        return Err(ParseError::FrameLengthMismatch {
            expected,
            received: bytes.len(),
        });
    }

    check_trailer(bytes)?;

    Ok(ResponseFrame { bytes })
}

/// Validate a telemetry response and extract its register block.
pub fn parse_telemetry(bytes: &[u8]) -> Result<RegisterBlock, ParseError> {
    let frame = parse_response(bytes)?;
    RegisterBlock::from_payload(frame.payload())
}

/// Encode a checksummed telemetry response for a register block.
///
/// This is what the device sends back for [`telemetry_request`].
pub fn build_response(registers: &RegisterBlock) -> Vec<u8> {
    let mut response = TelemetryResponse {
        device_id: DEVICE_ID,
        function_code: READ_REGISTERS,
        data_length: RegisterBlock::SIZE as u8,
        registers: *registers,
        checksum: BeU16::default(),
    };
    response.update_checksum();
    bytemuck::bytes_of(&response).to_vec()
}

/// Validate a received register-read request.
pub fn parse_request(bytes: &[u8]) -> Result<ReadRequest, ParseError> {
    if bytes.len() < ReadRequest::FRAME_SIZE {
        return Err(ParseError::FrameTooShort { len: bytes.len() });
    }

    check_header(bytes)?;

    if bytes.len() != ReadRequest::FRAME_SIZE {
        return Err(ParseError::FrameLengthMismatch {
            expected: ReadRequest::FRAME_SIZE,
            received: bytes.len(),
        });
    }

    check_trailer(bytes)?;

    Ok(bytemuck::pod_read_unaligned(bytes))
}

impl RegisterBlock {
    /// Interpret a validated payload as the telemetry register block.
    pub fn from_payload(payload: &[u8]) -> Result<Self, ParseError> {
        bytemuck::try_pod_read_unaligned(payload).map_err(|_| ParseError::PayloadSize {
            expected: Self::SIZE,
            actual: payload.len(),
        })
    }
}

fn check_header(bytes: &[u8]) -> Result<(), ParseError> {
    if bytes[0] != DEVICE_ID || bytes[1] != READ_REGISTERS {
        return Err(ParseError::UnexpectedDeviceOrFunction {
            device_id: bytes[0],
            function_code: bytes[1],
        });
    }
    Ok(())
}

fn check_trailer(bytes: &[u8]) -> Result<(), ParseError> {
    let data_end = bytes.len() - 2;
    let computed = compute_checksum(&bytes[..data_end]);
    let received = u16::from_be_bytes([bytes[data_end], bytes[data_end + 1]]);
    if computed != received {
        return Err(ParseError::ChecksumMismatch { computed, received });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero_response() -> Vec<u8> {
        let mut frame = vec![0x50, 0x03, 0x18];
        frame.extend_from_slice(&[0u8; 24]);
        frame.extend_from_slice(&[0x92, 0xE6]);
        frame
    }

    #[test]
    fn test_frame_sizes() {
        assert_eq!(std::mem::size_of::<ReadRequest>(), 8);
        assert_eq!(std::mem::size_of::<TelemetryResponse>(), 29);
        assert_eq!(TelemetryResponse::FRAME_SIZE, 29);
    }

    #[test]
    fn test_telemetry_request_bytes() {
        assert_eq!(
            telemetry_request(),
            [0x50, 0x03, 0x00, 0x34, 0x00, 0x0C, 0x09, 0x80]
        );
    }

    #[test]
    fn test_request_checksum_recomputes() {
        let request = build_request(TELEMETRY_START_REGISTER, TELEMETRY_REGISTER_COUNT);
        let embedded = u16::from_be_bytes([request[6], request[7]]);
        assert_eq!(compute_checksum(&request[..6]), embedded);
    }

    #[test]
    fn test_request_fields() {
        let request = ReadRequest::new(0x1234, 0x0002);
        assert_eq!(request.device_id, DEVICE_ID);
        assert_eq!(request.function_code, READ_REGISTERS);
        assert_eq!(request.start_register.get(), 0x1234);
        assert_eq!(request.register_count.get(), 2);
        assert_eq!(&request.to_bytes()[..6], &[0x50, 0x03, 0x12, 0x34, 0x00, 0x02]);
    }

    #[test]
    fn test_parse_zero_response() {
        let bytes = zero_response();
        let frame = parse_response(&bytes).unwrap();
        assert_eq!(frame.device_id(), DEVICE_ID);
        assert_eq!(frame.function_code(), READ_REGISTERS);
        assert_eq!(frame.data_length(), 24);
        assert_eq!(frame.payload().len(), 24);
        assert_eq!(frame.checksum(), 0x92E6);

        let block = parse_telemetry(&bytes).unwrap();
        assert_eq!(block.to_raw(), [0; 12]);
    }

    #[test]
    fn test_build_response_matches_handmade_frame() {
        assert_eq!(build_response(&RegisterBlock::default()), zero_response());
    }

    #[test]
    fn test_parse_known_response() {
        let raw = [16384, 0, -16384, 100, -200, 300, 1000, -1000, 0, 0, 0, 16384];
        let bytes = build_response(&RegisterBlock::from_raw(raw));
        assert_eq!(&bytes[27..], &[0xAB, 0xAB]);
        assert_eq!(parse_telemetry(&bytes).unwrap().to_raw(), raw);
    }

    #[test]
    fn test_parse_too_short() {
        assert_eq!(
            parse_response(&[0x50, 0x03, 0x00, 0xFF]),
            Err(ParseError::FrameTooShort { len: 4 })
        );
        assert_eq!(
            parse_response(&[]),
            Err(ParseError::FrameTooShort { len: 0 })
        );
    }

    #[test]
    fn test_parse_wrong_device() {
        let mut bytes = zero_response();
        bytes[0] = 0x51;
        assert_eq!(
            parse_response(&bytes),
            Err(ParseError::UnexpectedDeviceOrFunction {
                device_id: 0x51,
                function_code: 0x03
            })
        );
    }

    #[test]
    fn test_parse_wrong_function() {
        let mut bytes = zero_response();
        bytes[1] = 0x06;
        assert!(matches!(
            parse_response(&bytes),
            Err(ParseError::UnexpectedDeviceOrFunction {
                function_code: 0x06,
                ..
            })
        ));
    }

    #[test]
    fn test_parse_length_mismatch_with_valid_checksum() {
        // Declared 0x17 but 24 payload bytes, checksum recomputed so it is valid
        let mut bytes = zero_response();
        bytes[2] = 0x17;
        let crc = compute_checksum(&bytes[..27]).to_be_bytes();
        bytes[27..].copy_from_slice(&crc);

        assert_eq!(
            parse_response(&bytes),
            Err(ParseError::FrameLengthMismatch {
                expected: 28,
                received: 29
            })
        );
    }

    #[test]
    fn test_parse_truncated_frame() {
        let bytes = zero_response();
        assert!(matches!(
            parse_response(&bytes[..20]),
            Err(ParseError::FrameLengthMismatch {
                expected: 29,
                received: 20
            })
        ));
    }

    #[test]
    fn test_parse_any_payload_bit_flip_fails_checksum() {
        let raw = [1, -2, 3, -4, 5, -6, 7, -8, 9, -10, 11, -12];
        let valid = build_response(&RegisterBlock::from_raw(raw));

        for byte in 3..valid.len() {
            for bit in 0..8 {
                let mut corrupted = valid.clone();
                corrupted[byte] ^= 1 << bit;
                assert!(
                    matches!(
                        parse_response(&corrupted),
                        Err(ParseError::ChecksumMismatch { .. })
                    ),
                    "byte {byte} bit {bit}"
                );
            }
        }
    }

    #[test]
    fn test_parse_any_header_bit_flip_is_rejected() {
        let valid = zero_response();
        for byte in 0..3 {
            for bit in 0..8 {
                let mut corrupted = valid.clone();
                corrupted[byte] ^= 1 << bit;
                assert!(parse_response(&corrupted).is_err(), "byte {byte} bit {bit}");
            }
        }
    }

    #[test]
    fn test_parse_short_payload_is_not_telemetry() {
        // Single register response: 50 03 02 12 34 crc
        let mut bytes = vec![0x50, 0x03, 0x02, 0x12, 0x34];
        let crc = compute_checksum(&bytes).to_be_bytes();
        bytes.extend_from_slice(&crc);

        let frame = parse_response(&bytes).unwrap();
        assert_eq!(frame.payload(), &[0x12, 0x34]);
        assert_eq!(
            parse_telemetry(&bytes),
            Err(ParseError::PayloadSize {
                expected: 24,
                actual: 2
            })
        );
    }

    #[test]
    fn test_parse_request_roundtrip() {
        let request = parse_request(&telemetry_request()).unwrap();
        assert_eq!(request.start_register.get(), TELEMETRY_START_REGISTER);
        assert_eq!(request.register_count.get(), TELEMETRY_REGISTER_COUNT);
    }

    #[test]
    fn test_parse_request_rejects_corruption() {
        let mut bytes = telemetry_request();
        bytes[5] = 0x0D;
        assert!(matches!(
            parse_request(&bytes),
            Err(ParseError::ChecksumMismatch { .. })
        ));
        assert!(matches!(
            parse_request(&[0xFF, 0xAA, 0x69, 0x88, 0x5B, 0, 0, 0]),
            Err(ParseError::UnexpectedDeviceOrFunction { .. })
        ));
    }
}
