//! Decode a raw capture of WT901 link traffic into CSV.
//!
//! The capture is the byte stream read from the serial port. It is framed
//! with the same assembler the node uses; every decoded reading becomes a
//! `data` row, every rejected candidate a `rejected` row with its hex bytes.
//! A rejected candidate only consumes its first byte, so its bytes may
//! overlap the next row.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use wt901::{decode, parse_telemetry, FrameAssembler, ParseError};

#[derive(Parser, Debug)]
#[command(author, version, about = "Decode a WT901 serial capture to CSV")]
struct Args {
    /// Raw capture file
    dump_file: PathBuf,

    /// CSV output path
    output_csv: PathBuf,
}

const CHUNK_SIZE: usize = 64;

/// Parsed record - either a decoded reading or a rejected candidate frame
enum Record {
    Data(wt901::SensorReading),
    Rejected(Vec<u8>, ParseError),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    let args = Args::parse();

    let data = std::fs::read(&args.dump_file)
        .with_context(|| format!("Failed to read {}", args.dump_file.display()))?;
    println!("Read {} bytes from {}", data.len(), args.dump_file.display());

    let mut assembler = FrameAssembler::new();
    let mut records = Vec::new();

    // Feed in serial-sized chunks so the assembler backlog stays bounded
    for chunk in data.chunks(CHUNK_SIZE) {
        assembler.push(chunk);
        while let Some(candidate) = assembler.next_frame() {
            let record = match candidate {
                Ok(frame) => match parse_telemetry(&frame) {
                    Ok(registers) => Record::Data(decode(&registers)),
                    Err(e) => Record::Rejected(frame, e),
                },
                Err(rejected) => Record::Rejected(rejected.bytes, rejected.error),
            };
            records.push(record);
        }
    }

    let data_count = records
        .iter()
        .filter(|r| matches!(r, Record::Data(_)))
        .count();
    let rejected_count = records.len() - data_count;
    let skipped = assembler.skipped() + assembler.buffered();

    println!(
        "Parsed {data_count} readings, {rejected_count} rejected frames ({skipped} bytes skipped)"
    );

    let file = File::create(&args.output_csv)
        .with_context(|| format!("Failed to create {}", args.output_csv.display()))?;
    let mut out = BufWriter::new(file);

    writeln!(
        out,
        "type,accel_x,accel_y,accel_z,gyro_x,gyro_y,gyro_z,mag_x,mag_y,mag_z,roll_deg,pitch_deg,yaw_deg,quat_x,quat_y,quat_z,quat_w,detail"
    )?;

    for record in &records {
        match record {
            Record::Data(reading) => {
                let [ax, ay, az] = reading.linear_acceleration;
                let [gx, gy, gz] = reading.angular_velocity;
                let [mx, my, mz] = reading.magnetic_field;
                let [roll, pitch, yaw] = reading.roll_pitch_yaw.map(f64::to_degrees);
                let [qx, qy, qz, qw] = reading.orientation_xyzw();
                writeln!(
                    out,
                    "data,{ax:.4},{ay:.4},{az:.4},{gx:.4},{gy:.4},{gz:.4},{mx:.6},{my:.6},{mz:.6},{roll:.3},{pitch:.3},{yaw:.3},{qx:.6},{qy:.6},{qz:.6},{qw:.6},"
                )?;
            }
            Record::Rejected(bytes, error) => {
                let hex: String = bytes
                    .iter()
                    .map(|b| format!("{b:02x}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                writeln!(out, "rejected,,,,,,,,,,,,,,,,,\"{error}: {hex}\"")?;
            }
        }
    }

    out.flush()?;
    println!("Wrote {}", args.output_csv.display());
    Ok(())
}
