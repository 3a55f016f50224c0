//! VISCA over an RS-232/RS-422 serial line.

use log::debug;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::time::{Duration, Instant};

use super::Transport;
use crate::error::TransportError;
use crate::protocol::FrameReader;

/// VISCA line speed. Cameras do not negotiate.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

const OPEN_TIMEOUT: Duration = Duration::from_millis(100);

pub struct SerialTransport {
    path: String,
    baud_rate: u32,
    port: Option<Box<dyn SerialPort>>,
    reader: FrameReader,
    buffer: [u8; 64],
}

impl SerialTransport {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            port: None,
            reader: FrameReader::new(),
            buffer: [0u8; 64],
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        self.close();
        let port = serialport::new(&self.path, self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(OPEN_TIMEOUT)
            .open()
            .map_err(|e| TransportError::connect(format!("{}: {}", self.describe(), e)))?;
        debug!("opened {} at {} baud", self.path, self.baud_rate);
        self.port = Some(port);
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| TransportError::closed("port not open"))?;
        port.write_all(bytes).map_err(TransportError::from_write)?;
        port.flush().map_err(TransportError::from_write)
    }

    fn read_frame(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(frame) = self.reader.next_frame() {
                return Ok(frame);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::timeout(format!(
                    "no reply on {} within {:?}",
                    self.path, timeout
                )));
            }

            let port = self
                .port
                .as_mut()
                .ok_or_else(|| TransportError::closed("port not open"))?;
            port.set_timeout(remaining)
                .map_err(TransportError::from)?;
            match port.read(&mut self.buffer) {
                Ok(n) => self.reader.push(&self.buffer[..n]),
                Err(e) => {
                    let err = TransportError::from_read(e);
                    if !err.is_timeout() {
                        return Err(err);
                    }
                }
            }
        }
    }

    fn close(&mut self) {
        self.port = None;
        self.reader.clear();
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn describe(&self) -> String {
        format!("serial://{}", self.path)
    }
}
