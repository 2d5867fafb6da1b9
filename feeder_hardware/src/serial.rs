//! Serial transport to the motion controller board.
//!
//! The port is opened once and cloned into independent writer and reader
//! halves so the reader thread can block on its own handle. Read timeouts
//! surface as zero-length chunks; the reader uses them as stop-flag ticks.

use std::io::{Read, Write};
use std::time::Duration;

use tracing::info;

use crate::error::Result;
use feeder_traits::{LineReader, LineWriter};

pub struct SerialWriter {
    port: Box<dyn serialport::SerialPort>,
}

pub struct SerialReader {
    port: Box<dyn serialport::SerialPort>,
}

/// Open `path` at `baud` (8N1) and split it into the two transport halves.
pub fn open(path: &str, baud: u32, read_timeout: Duration) -> Result<(SerialWriter, SerialReader)> {
    let port = serialport::new(path, baud)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(read_timeout)
        .open()?;
    let reader = port.try_clone()?;
    info!(path, baud, "serial port open");
    Ok((SerialWriter { port }, SerialReader { port: reader }))
}

impl LineWriter for SerialWriter {
    fn write_line(&mut self, line: &str) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.port.write_all(line.as_bytes())?;
        self.port.write_all(b"\n")?;
        self.port.flush()?;
        Ok(())
    }
}

impl LineReader for SerialReader {
    fn read_chunk(
        &mut self,
        buf: &mut [u8],
    ) -> std::result::Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(Box::new(e)),
        }
    }
}
