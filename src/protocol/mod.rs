//! VISCA wire protocol: frame layout, response decoding and nibble packing.
//!
//! Every VISCA message is a short byte sequence terminated by `0xFF`.
//! Commands from the controller start with `0x8d` where `d` is the camera
//! address (1-7). Replies start with `z0` where `z = d + 8`:
//!
//! | Reply         | Bytes            |
//! |---------------|------------------|
//! | ACK           | `z0 4y FF`       |
//! | Completion    | `z0 5y FF`       |
//! | Inquiry reply | `z0 50 .. FF`    |
//! | Error         | `z0 6y ee FF`    |
//!
//! `y` is the command socket the camera assigned. Multi-byte numeric fields
//! carry one nibble per byte, most significant first.

pub mod command;
pub mod dialect;

use byteorder::WriteBytesExt;
use log::{error, warn};
use std::io;

use crate::error::{DeviceError, Error, Result};

pub use self::command::{Command, CommandKind, ResponseShape};
pub use self::dialect::{Dialect, DialectKind, Field, PropertySpec, ReplyAt};

/// Every frame ends with this byte.
pub const TERMINATOR: u8 = 0xFF;

/// Longest frame any supported camera sends. Longer runs without a
/// terminator are treated as garbage.
pub const MAX_FRAME_LEN: usize = 16;

/// Default camera address on a point-to-point link.
pub const DEFAULT_ADDRESS: u8 = 1;

const ACK_NIBBLE: u8 = 0x4;
const COMPLETION_NIBBLE: u8 = 0x5;
const ERROR_NIBBLE: u8 = 0x6;

// =============================================================================
// Frame Encoding
// =============================================================================

/// Protocol types that may be written as bytes.
pub trait WriteToBytes {
    fn write_to_bytes<W: WriteBytesExt>(&self, writer: W) -> io::Result<()>;
}

/// A header byte, a body, and the terminator.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Frame<'a> {
    pub header: u8,
    pub body: &'a [u8],
}

impl<'a> Frame<'a> {
    /// A controller-to-camera frame.
    pub fn command(address: u8, body: &'a [u8]) -> Self {
        Frame {
            header: 0x80 | (address & 0x07),
            body,
        }
    }

    /// A camera-to-controller frame.
    pub fn reply(address: u8, body: &'a [u8]) -> Self {
        Frame {
            header: 0x80 | (((address & 0x07) + 8) << 4),
            body,
        }
    }

    /// Encode the frame. Fails if the body contains the terminator.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.body.len() + 2);
        self.write_to_bytes(&mut bytes)
            .map_err(|e| Error::invalid_argument(format!("{}: {:02X?}", e, self.body)))?;
        Ok(bytes)
    }
}

impl<'a> WriteToBytes for Frame<'a> {
    fn write_to_bytes<W: WriteBytesExt>(&self, mut writer: W) -> io::Result<()> {
        if self.body.contains(&TERMINATOR) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "frame body contains the terminator byte",
            ));
        }
        writer.write_u8(self.header)?;
        writer.write_all(self.body)?;
        writer.write_u8(TERMINATOR)?;
        Ok(())
    }
}

/// Split a controller-to-camera frame into its address and body.
///
/// Used by the simulator and by tests that script camera behavior.
pub fn decode_command(frame: &[u8]) -> Result<(u8, &[u8])> {
    if frame.len() < 3 || frame[frame.len() - 1] != TERMINATOR {
        return Err(Error::protocol(format!("truncated command frame {:02X?}", frame)));
    }
    let header = frame[0];
    if header & 0xF8 != 0x80 {
        return Err(Error::protocol(format!("bad command header {:#04x}", header)));
    }
    Ok((header & 0x07, &frame[1..frame.len() - 1]))
}

// =============================================================================
// Responses
// =============================================================================

/// A decoded camera reply.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Response {
    /// Command accepted into `socket`; completion pending.
    Ack { socket: u8 },
    /// Command in `socket` finished.
    Completion { socket: u8 },
    /// Command rejected or aborted.
    Error { socket: u8, error: DeviceError },
    /// Data returned for an inquiry.
    InquiryReply(Vec<u8>),
}

impl Response {
    /// Decode one complete frame, terminator included.
    pub fn decode(frame: &[u8]) -> Result<Response> {
        if frame.len() < 3 {
            return Err(Error::protocol(format!("truncated frame {:02X?}", frame)));
        }
        if frame[frame.len() - 1] != TERMINATOR {
            return Err(Error::protocol(format!("unterminated frame {:02X?}", frame)));
        }
        let header = frame[0];
        if header & 0x8F != 0x80 || header < 0x90 {
            return Err(Error::protocol(format!("bad reply header {:#04x}", header)));
        }

        let kind = frame[1] >> 4;
        let socket = frame[1] & 0x0F;
        let body = &frame[2..frame.len() - 1];
        match (kind, body.len()) {
            (ACK_NIBBLE, 0) => Ok(Response::Ack { socket }),
            (COMPLETION_NIBBLE, 0) => Ok(Response::Completion { socket }),
            (COMPLETION_NIBBLE, _) if socket == 0 => Ok(Response::InquiryReply(body.to_vec())),
            (ERROR_NIBBLE, 1) => Ok(Response::Error {
                socket,
                error: DeviceError::from_code(body[0]),
            }),
            _ => Err(Error::protocol(format!("unrecognized frame {:02X?}", frame))),
        }
    }

    /// Encode this reply as the camera at `address` would send it.
    pub fn encode(&self, address: u8) -> Vec<u8> {
        let body = match self {
            Response::Ack { socket } => vec![(ACK_NIBBLE << 4) | (socket & 0x0F)],
            Response::Completion { socket } => vec![(COMPLETION_NIBBLE << 4) | (socket & 0x0F)],
            Response::Error { socket, error } => {
                vec![(ERROR_NIBBLE << 4) | (socket & 0x0F), error.code()]
            }
            Response::InquiryReply(data) => {
                let mut body = Vec::with_capacity(data.len() + 1);
                body.push(COMPLETION_NIBBLE << 4);
                body.extend_from_slice(data);
                body
            }
        };
        match Frame::reply(address, &body).to_vec() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("cannot encode {:?}: {}", self, e);
                debug_assert!(false, "unencodable reply {:?}", self);
                Vec::new()
            }
        }
    }
}

// =============================================================================
// Frame Assembly
// =============================================================================

/// Reassembles frames from a byte stream.
///
/// Transports push whatever the OS hands them and pull complete frames out.
#[derive(Debug, Default)]
pub struct FrameReader {
    buffer: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Take the next complete frame, terminator included.
    ///
    /// A run longer than [`MAX_FRAME_LEN`] with no terminator is returned as
    /// is, so the decoder reports it as a protocol error instead of the
    /// reader buffering forever.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        if let Some(end) = self.buffer.iter().position(|&b| b == TERMINATOR) {
            return Some(self.buffer.drain(..=end).collect());
        }
        if self.buffer.len() > MAX_FRAME_LEN {
            warn!("dropping {} bytes with no frame terminator", self.buffer.len());
            return Some(std::mem::take(&mut self.buffer));
        }
        None
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

// =============================================================================
// Nibble Packing
// =============================================================================

/// Pack the low `width * 4` bits of `value` into `width` bytes, one nibble
/// each, most significant first.
pub fn pack_nibbles(value: u32, width: usize) -> Vec<u8> {
    (0..width)
        .rev()
        .map(|i| ((value >> (i * 4)) & 0x0F) as u8)
        .collect()
}

/// Reassemble a value from nibble bytes. Each byte must be `0x00..=0x0F`.
pub fn unpack_nibbles(bytes: &[u8]) -> Result<u32> {
    if bytes.len() > 8 {
        return Err(Error::protocol(format!("{} nibbles overflow u32", bytes.len())));
    }
    bytes.iter().try_fold(0u32, |acc, &b| {
        if b > 0x0F {
            Err(Error::protocol(format!("byte {:#04x} is not a nibble", b)))
        } else {
            Ok((acc << 4) | b as u32)
        }
    })
}

/// Two's complement encoding of `value` over `width` nibbles.
pub fn to_field(value: i32, width: usize) -> u32 {
    let bits = (width * 4) as u32;
    if bits >= 32 {
        value as u32
    } else {
        (value as u32) & ((1u32 << bits) - 1)
    }
}

/// Interpret `raw` as a two's complement number of `width` nibbles.
pub fn sign_extend(raw: u32, width: usize) -> i32 {
    let bits = (width * 4) as u32;
    if bits == 0 || bits >= 32 {
        return raw as i32;
    }
    if raw & (1 << (bits - 1)) != 0 {
        (raw as i64 - (1i64 << bits)) as i32
    } else {
        raw as i32
    }
}
