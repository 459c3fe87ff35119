//! Simulated WT901 on a serial port.
//!
//! Answers telemetry read requests with a level sensor slowly turning about
//! its vertical axis, and logs any configuration commands it receives. Pair
//! it with `imu_node` over a null-modem or a pty pair (e.g. `socat`).

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use hardware::wt901::DEFAULT_BAUD_RATE;
use tracing::{debug, info, warn};
use wt901::{
    build_response, parse_request, ReadRequest, RegisterBlock, DEVICE_ID,
    TELEMETRY_REGISTER_COUNT, TELEMETRY_START_REGISTER,
};

/// Prefix of every configuration command
const COMMAND_HEADER: [u8; 2] = [0xFF, 0xAA];
const COMMAND_SIZE: usize = 5;

#[derive(Parser, Debug)]
#[command(author, version, about = "Emulate a WT901 IMU on a serial port")]
struct Args {
    /// Serial device to answer on
    #[arg(long, default_value = "/dev/ttyUSB1")]
    port: String,

    /// Serial baud rate
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud_rate: u32,

    /// Yaw rate of the simulated sensor in degrees per second
    #[arg(long, default_value = "10.0")]
    yaw_rate: f64,
}

/// Scale an angle in degrees to the device's register encoding
fn angle_register(degrees: f64) -> i16 {
    let wrapped = (degrees + 180.0).rem_euclid(360.0) - 180.0;
    (wrapped / 180.0 * 32768.0).clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

fn simulated_registers(elapsed: Duration, yaw_rate: f64) -> RegisterBlock {
    let yaw = angle_register(yaw_rate * elapsed.as_secs_f64());
    let gyro_z = (yaw_rate / 2000.0 * 32768.0) as i16;
    RegisterBlock::from_raw([
        0, 0, 2048, // 1 g along z
        0, 0, gyro_z, //
        120, -40, 300, //
        0, 0, yaw,
    ])
}

/// Consume complete requests and commands from the head of `buffer`.
///
/// Returns the requests found; unrecognised bytes are dropped one at a time.
fn drain_requests(buffer: &mut Vec<u8>) -> Vec<ReadRequest> {
    let mut requests = Vec::new();
    loop {
        if buffer.starts_with(&COMMAND_HEADER) {
            if buffer.len() < COMMAND_SIZE {
                break;
            }
            let command: Vec<u8> = buffer.drain(..COMMAND_SIZE).collect();
            info!("Configuration command {:02X?}", command);
        } else if buffer.first() == Some(&DEVICE_ID) {
            if buffer.len() < ReadRequest::FRAME_SIZE {
                break;
            }
            match parse_request(&buffer[..ReadRequest::FRAME_SIZE]) {
                Ok(request) => {
                    buffer.drain(..ReadRequest::FRAME_SIZE);
                    requests.push(request);
                }
                Err(e) => {
                    debug!("Not a request ({e}), skipping a byte");
                    buffer.remove(0);
                }
            }
        } else if buffer.is_empty() {
            break;
        } else {
            buffer.remove(0);
        }
    }
    requests
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    let args = Args::parse();

    let mut port = serialport::new(&args.port, args.baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .timeout(Duration::from_millis(50))
        .open()
        .with_context(|| format!("Failed to open {}", args.port))?;

    info!("Mock WT901 listening on {} at {} baud", args.port, args.baud_rate);

    let start = Instant::now();
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 64];
    let mut answered = 0u64;

    loop {
        match port.read(&mut chunk) {
            Ok(0) => continue,
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == ErrorKind::TimedOut => continue,
            Err(e) => return Err(e).context("Serial read failed"),
        }

        for request in drain_requests(&mut buffer) {
            let start_register = request.start_register.get();
            let count = request.register_count.get();
            if start_register != TELEMETRY_START_REGISTER || count != TELEMETRY_REGISTER_COUNT {
                warn!("Ignoring read of {count} registers at {start_register:#06X}");
                continue;
            }

            let response = build_response(&simulated_registers(start.elapsed(), args.yaw_rate));
            port.write_all(&response)?;
            port.flush()?;

            answered += 1;
            if answered % 100 == 0 {
                info!("Answered {answered} telemetry requests");
            }
        }
    }
}
