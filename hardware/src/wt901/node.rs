//! IMU polling node
//!
//! Owns the write half of the link and the publisher. Startup runs the
//! calibration handshake to completion; only then does the poll timer start.
//! Timer ticks and link data are served from one `select!` loop, so frame
//! handling never runs concurrently with request building.

use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use wt901::{
    decode, parse_telemetry, telemetry_request, CalibrationError, CalibrationSequencer,
    FrameAssembler, Link,
};

use super::config::NodeConfig;
use super::publish::{Header, ImuMessage, MagneticFieldMessage, ReadingPublisher};

/// Errors that stop the node.
///
/// Frame-level problems never show up here; they are logged and the frame
/// is dropped.
#[derive(Error, Debug)]
pub enum NodeError {
    /// Calibration command could not be sent; the device state is unknown.
    #[error("Calibration failed: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Counters maintained while polling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStats {
    /// Telemetry requests written to the link
    pub requests_sent: u64,
    /// Requests that failed to write
    pub write_failures: u64,
    /// Ticks that fired while the previous request was still unanswered
    pub overlapping_polls: u64,
    /// Readings whose messages were all accepted by the publisher
    pub readings_published: u64,
    /// Candidate frames discarded by validation
    pub frames_rejected: u64,
    /// Messages the publisher failed to accept, counted per message
    pub publish_failures: u64,
}

/// Coordinates calibration, polling and decoding for one device
pub struct ImuNode<L, P> {
    link: L,
    publisher: P,
    config: NodeConfig,
    assembler: FrameAssembler,
    awaiting_response: bool,
    stats: NodeStats,
}

impl<L: Link, P: ReadingPublisher> ImuNode<L, P> {
    pub fn new(link: L, publisher: P, config: NodeConfig) -> Self {
        Self {
            link,
            publisher,
            config,
            assembler: FrameAssembler::new(),
            awaiting_response: false,
            stats: NodeStats::default(),
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn stats(&self) -> NodeStats {
        self.stats
    }

    /// Run the calibration handshake, awaiting each mandated delay.
    ///
    /// Nothing else runs on the node while this is in progress.
    pub async fn calibrate(&mut self) -> Result<(), CalibrationError> {
        info!("Starting accelerometer calibration");
        let mut sequencer = CalibrationSequencer::new();
        while !sequencer.is_ready() {
            if let Some(wait) = sequencer.step(&mut self.link)? {
                debug!("Calibration {}: waiting {:?}", sequencer.state(), wait);
                tokio::time::sleep(wait).await;
            }
        }
        Ok(())
    }

    /// Send one telemetry request.
    ///
    /// A write failure is logged and counted; the next tick tries again.
    pub fn poll(&mut self) {
        if self.awaiting_response {
            self.stats.overlapping_polls += 1;
            debug!("Polling again before the previous response arrived");
        }

        match self.link.write_frame(&telemetry_request()) {
            Ok(()) => {
                self.stats.requests_sent += 1;
                self.awaiting_response = true;
            }
            Err(e) => {
                self.stats.write_failures += 1;
                warn!("Failed to send telemetry request: {e}");
            }
        }
    }

    /// Handle bytes delivered by the link.
    pub fn on_data_received(&mut self, bytes: &[u8]) {
        debug!("Link delivered {} bytes", bytes.len());
        self.assembler.push(bytes);
        while let Some(candidate) = self.assembler.next_frame() {
            match candidate {
                Ok(frame) => self.handle_frame(&frame),
                Err(rejected) => {
                    self.stats.frames_rejected += 1;
                    warn!("Discarding response frame: {rejected}");
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: &[u8]) {
        let registers = match parse_telemetry(frame) {
            Ok(registers) => registers,
            Err(e) => {
                self.stats.frames_rejected += 1;
                warn!("Discarding response frame: {e}");
                return;
            }
        };

        self.awaiting_response = false;
        let reading = decode(&registers);
        let frame_id = &self.config.frame_id;

        let imu = ImuMessage::from_reading(&reading, Header::now(frame_id));
        let mag = MagneticFieldMessage::from_reading(&reading, Header::now(frame_id));

        let mut failures = 0;
        if let Err(e) = self.publisher.publish_imu(&imu) {
            failures += 1;
            warn!("Failed to publish IMU message: {e}");
        }
        if let Err(e) = self.publisher.publish_magnetic_field(&mag) {
            failures += 1;
            warn!("Failed to publish magnetic field message: {e}");
        }

        if failures == 0 {
            self.stats.readings_published += 1;
        }
        self.stats.publish_failures += failures;
    }

    /// Calibrate, then poll until the link closes or Ctrl-C is received.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Calibration`] if a calibration command could not
    /// be written. Polling itself never fails.
    pub async fn run(&mut self, data: &mut UnboundedReceiver<Vec<u8>>) -> Result<(), NodeError> {
        self.calibrate().await?;

        // Bytes that arrived during calibration are not responses to a poll
        while data.try_recv().is_ok() {}
        self.assembler.clear();

        let period = self.config.poll_period();
        info!("Polling telemetry every {:?}", period);

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.poll(),
                chunk = data.recv() => match chunk {
                    Some(bytes) => self.on_data_received(&bytes),
                    None => {
                        warn!("Link closed, stopping");
                        break;
                    }
                },
                _ = &mut shutdown => {
                    info!("Interrupted, stopping");
                    break;
                }
            }
        }

        info!("Node stopped: {:?}", self.stats);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wt901::publish::PublishError;
    use wt901::{build_response, RegisterBlock, START_CALIBRATION, UNLOCK};

    #[derive(Default)]
    struct Collector {
        imu: Vec<ImuMessage>,
        mag: Vec<MagneticFieldMessage>,
    }

    impl ReadingPublisher for Collector {
        fn publish_imu(&mut self, message: &ImuMessage) -> Result<(), PublishError> {
            self.imu.push(message.clone());
            Ok(())
        }

        fn publish_magnetic_field(
            &mut self,
            message: &MagneticFieldMessage,
        ) -> Result<(), PublishError> {
            self.mag.push(message.clone());
            Ok(())
        }
    }

    /// Refuses one topic, records the other
    struct OneTopicDown {
        fail_imu: bool,
        imu: usize,
        mag: usize,
    }

    impl ReadingPublisher for OneTopicDown {
        fn publish_imu(&mut self, _message: &ImuMessage) -> Result<(), PublishError> {
            if self.fail_imu {
                return Err(std::io::Error::other("imu topic closed").into());
            }
            self.imu += 1;
            Ok(())
        }

        fn publish_magnetic_field(
            &mut self,
            _message: &MagneticFieldMessage,
        ) -> Result<(), PublishError> {
            if !self.fail_imu {
                return Err(std::io::Error::other("mag topic closed").into());
            }
            self.mag += 1;
            Ok(())
        }
    }

    fn node() -> ImuNode<Vec<u8>, Collector> {
        ImuNode::new(Vec::new(), Collector::default(), NodeConfig::default())
    }

    #[test]
    fn test_poll_writes_request() {
        let mut node = node();
        node.poll();
        assert_eq!(node.link().as_slice(), &telemetry_request());
        assert_eq!(node.stats().requests_sent, 1);
    }

    #[test]
    fn test_poll_without_response_counts_overlap() {
        let mut node = node();
        node.poll();
        node.poll();
        assert_eq!(node.stats().requests_sent, 2);
        assert_eq!(node.stats().overlapping_polls, 1);

        node.on_data_received(&build_response(&RegisterBlock::default()));
        node.poll();
        assert_eq!(node.stats().overlapping_polls, 1);
    }

    #[test]
    fn test_valid_frame_publishes_both_messages() {
        let mut node = node();
        let frame = build_response(&RegisterBlock::from_raw([0, 0, 2048, 0, 0, 0, 1, 2, 3, 0, 0, 0]));

        node.on_data_received(&frame[..10]);
        assert!(node.publisher().imu.is_empty());
        node.on_data_received(&frame[10..]);

        let publisher = node.publisher();
        assert_eq!(publisher.imu.len(), 1);
        assert_eq!(publisher.mag.len(), 1);
        assert_eq!(publisher.imu[0].header.frame_id, "imu_link");
        assert_eq!(publisher.mag[0].header.frame_id, "imu_link");
        approx::assert_relative_eq!(publisher.imu[0].linear_acceleration.z, 9.80665);
        assert_eq!(node.stats().readings_published, 1);
    }

    #[test]
    fn test_topics_fail_independently() {
        let frame = build_response(&RegisterBlock::default());

        for fail_imu in [true, false] {
            let publisher = OneTopicDown {
                fail_imu,
                imu: 0,
                mag: 0,
            };
            let mut node = ImuNode::new(Vec::new(), publisher, NodeConfig::default());

            node.on_data_received(&frame);
            node.on_data_received(&frame);

            let delivered = if fail_imu {
                node.publisher().mag
            } else {
                node.publisher().imu
            };
            assert_eq!(delivered, 2);
            assert_eq!(node.stats().publish_failures, 2);
            assert_eq!(node.stats().readings_published, 0);
        }
    }

    #[test]
    fn test_spurious_header_keeps_following_readings() {
        let mut node = node();
        node.on_data_received(&[0x50, 0x03, 0xF0]);
        for _ in 0..3 {
            node.on_data_received(&build_response(&RegisterBlock::default()));
        }

        assert_eq!(node.publisher().imu.len(), 3);
        assert_eq!(node.stats().frames_rejected, 0);
    }

    #[test]
    fn test_corrupt_frame_is_dropped() {
        let mut node = node();
        let mut frame = build_response(&RegisterBlock::from_raw([100; 12]));
        frame[20] ^= 0x01;

        node.on_data_received(&frame);

        assert!(node.publisher().imu.is_empty());
        assert!(node.publisher().mag.is_empty());
        assert_eq!(node.stats().frames_rejected, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_calibrate_sends_handshake_and_waits() {
        let mut node = node();
        let start = tokio::time::Instant::now();

        node.calibrate().await.unwrap();

        let mut expected = UNLOCK.to_vec();
        expected.extend_from_slice(&START_CALIBRATION);
        assert_eq!(node.link(), &expected);
        assert!(start.elapsed() >= std::time::Duration::from_millis(5600));
    }

    struct RefusingLink {
        attempts: usize,
    }

    impl Link for RefusingLink {
        fn write_frame(&mut self, _bytes: &[u8]) -> std::io::Result<()> {
            self.attempts += 1;
            Err(std::io::Error::other("port unplugged"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_when_calibration_fails() {
        let mut node = ImuNode::new(
            RefusingLink { attempts: 0 },
            Collector::default(),
            NodeConfig::default(),
        );
        let (_tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let result = node.run(&mut rx).await;

        assert!(matches!(result, Err(NodeError::Calibration(_))));
        assert_eq!(node.link().attempts, 1);
        assert_eq!(node.stats().requests_sent, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_polls_after_calibration_until_link_closes() {
        let mut node = node();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let reply = build_response(&RegisterBlock::from_raw([0, 0, 2048, 0, 0, 0, 0, 0, 0, 0, 0, 0]));

        // Arrives while calibrating and must not be published
        tx.send(reply.clone()).unwrap();

        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(6000)).await;
            tx.send(reply[..7].to_vec()).unwrap();
            tx.send(reply[7..].to_vec()).unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(1000)).await;
        });

        node.run(&mut rx).await.unwrap();

        assert_eq!(&node.link()[..5], &UNLOCK);
        assert_eq!(&node.link()[5..10], &START_CALIBRATION);

        let stats = node.stats();
        assert!(stats.requests_sent >= 10);
        assert_eq!(node.link().len(), 10 + 8 * stats.requests_sent as usize);
        for request in node.link()[10..].chunks(8) {
            assert_eq!(request, &telemetry_request());
        }

        assert_eq!(stats.readings_published, 1);
        assert_eq!(node.publisher().imu.len(), 1);
        assert_eq!(node.publisher().mag.len(), 1);
    }
}
