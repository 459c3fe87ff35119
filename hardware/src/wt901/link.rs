//! Serial transport for the WT901
//!
//! The port is split in two: the write half stays with the node (it is a
//! [`wt901::Link`] through the blanket `io::Write` impl), and the read half
//! moves to a reader thread that forwards every chunk it receives over a
//! channel. The node's reactor consumes that channel alongside its poll timer.

use std::io::{ErrorKind, Read};
use std::thread;
use std::time::Duration;

use serialport::SerialPort;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::node::NodeError;

/// Receiving end of the link's data notifications
pub type LinkReceiver = mpsc::UnboundedReceiver<Vec<u8>>;

/// Read timeout; bounds how long the reader thread blocks between checks
const READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Open the IMU serial port (8N1) and start the reader thread.
///
/// Returns the write half of the port and the receiver for incoming bytes.
pub fn open_serial(
    path: &str,
    baud_rate: u32,
) -> Result<(Box<dyn SerialPort>, LinkReceiver), NodeError> {
    let port = serialport::new(path, baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(READ_TIMEOUT)
        .open()?;

    info!("Opened {path} at {baud_rate} baud");

    let reader = port.try_clone()?;
    let receiver = spawn_reader(reader)?;
    Ok((port, receiver))
}

/// Forward everything read from `reader` to a channel from a dedicated thread.
///
/// The thread exits on end of stream, on a read error other than a timeout,
/// or once the receiver is dropped. The channel closes when it does.
pub fn spawn_reader<R>(mut reader: R) -> Result<LinkReceiver, NodeError>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();

    thread::Builder::new()
        .name("wt901-rx".to_string())
        .spawn(move || {
            let mut buf = [0u8; 256];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => {
                        debug!("Link reached end of stream");
                        break;
                    }
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                        if tx.is_closed() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => {}
                    Err(e) => {
                        error!("Link read failed: {e}");
                        break;
                    }
                }
            }
        })?;

    Ok(rx)
}
