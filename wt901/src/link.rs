use std::io::Write;

/// Write side of the half-duplex link to the device.
///
/// Anything implementing [`std::io::Write`] (a serial port, a `Vec<u8>`)
/// is a link; each frame is written whole and flushed.
pub trait Link {
    fn write_frame(&mut self, bytes: &[u8]) -> std::io::Result<()>;
}

impl<W: Write + ?Sized> Link for W {
    fn write_frame(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.write_all(bytes)?;
        self.flush()
    }
}
