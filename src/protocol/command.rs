//! Dialect-independent VISCA commands.
//!
//! Property-specific sets and inquiries live in the dialect table; this
//! module holds the commands whose bytes are the same on every supported
//! camera family.

use super::Frame;
use crate::error::Result;
use crate::types::{Horizontal, PanTiltDrive, Vertical};

/// What a command does, for logging and for choosing the expected reply.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Control,
    Inquiry,
    MemoryRecall,
    MemorySet,
    Cancel,
}

/// The reply that ends an exchange.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResponseShape {
    /// ACK, then Completion.
    Completion,
    /// A single inquiry reply, no ACK.
    InquiryReply,
}

/// An encoded command body, without address header or terminator.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Command {
    kind: CommandKind,
    body: Vec<u8>,
}

impl Command {
    pub fn new(kind: CommandKind, body: Vec<u8>) -> Self {
        Self { kind, body }
    }

    pub fn control(body: Vec<u8>) -> Self {
        Self::new(CommandKind::Control, body)
    }

    pub fn inquiry(body: Vec<u8>) -> Self {
        Self::new(CommandKind::Inquiry, body)
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn expects(&self) -> ResponseShape {
        match self.kind {
            CommandKind::Inquiry => ResponseShape::InquiryReply,
            _ => ResponseShape::Completion,
        }
    }

    /// Full frame addressed to the camera at `address`.
    pub fn encode(&self, address: u8) -> Result<Vec<u8>> {
        Frame::command(address, &self.body).to_vec()
    }
}

// =============================================================================
// Memory (scenes)
// =============================================================================

const MEMORY: [u8; 3] = [0x01, 0x04, 0x3F];

fn memory(kind: CommandKind, op: u8, scene: u8) -> Command {
    let mut body = MEMORY.to_vec();
    body.extend_from_slice(&[op, scene]);
    Command::new(kind, body)
}

/// Move to the pose stored in `scene`.
pub fn memory_recall(scene: u8) -> Command {
    memory(CommandKind::MemoryRecall, 0x02, scene)
}

/// Store the current pose in `scene`.
pub fn memory_set(scene: u8) -> Command {
    memory(CommandKind::MemorySet, 0x01, scene)
}

/// Clear `scene`.
pub fn memory_reset(scene: u8) -> Command {
    memory(CommandKind::Control, 0x00, scene)
}

/// Abort whatever is running in `socket`.
pub fn cancel(socket: u8) -> Command {
    Command::new(CommandKind::Cancel, vec![0x20 | (socket & 0x0F)])
}

// =============================================================================
// Pan / Tilt
// =============================================================================

pub fn pantilt_home() -> Command {
    Command::control(vec![0x01, 0x06, 0x04])
}

pub fn pantilt_reset() -> Command {
    Command::control(vec![0x01, 0x06, 0x05])
}

pub fn pantilt_drive(drive: PanTiltDrive) -> Command {
    let h = match drive.horizontal {
        Horizontal::Left => 0x01,
        Horizontal::Right => 0x02,
        Horizontal::Stop => 0x03,
    };
    let v = match drive.vertical {
        Vertical::Up => 0x01,
        Vertical::Down => 0x02,
        Vertical::Stop => 0x03,
    };
    Command::control(vec![
        0x01,
        0x06,
        0x01,
        drive.pan_speed,
        drive.tilt_speed,
        h,
        v,
    ])
}

// =============================================================================
// Zoom / Focus drive
// =============================================================================

/// Variable-speed drive: `0x2p` one way, `0x3p` the other, `0x00` stop.
fn drive(opcode: u8, code: u8) -> Command {
    Command::control(vec![0x01, 0x04, opcode, code])
}

pub fn zoom_tele() -> Command {
    drive(0x07, 0x02)
}

pub fn zoom_wide() -> Command {
    drive(0x07, 0x03)
}

pub fn zoom_tele_speed(speed: u8) -> Command {
    drive(0x07, 0x20 | (speed & 0x07))
}

pub fn zoom_wide_speed(speed: u8) -> Command {
    drive(0x07, 0x30 | (speed & 0x07))
}

pub fn zoom_stop() -> Command {
    drive(0x07, 0x00)
}

pub fn focus_far() -> Command {
    drive(0x08, 0x02)
}

pub fn focus_near() -> Command {
    drive(0x08, 0x03)
}

pub fn focus_far_speed(speed: u8) -> Command {
    drive(0x08, 0x20 | (speed & 0x07))
}

pub fn focus_near_speed(speed: u8) -> Command {
    drive(0x08, 0x30 | (speed & 0x07))
}

pub fn focus_stop() -> Command {
    drive(0x08, 0x00)
}

// =============================================================================
// Preset speed / OSD
// =============================================================================

/// Speed used by subsequent memory recalls.
pub fn preset_speed(speed: u8) -> Command {
    Command::control(vec![0x01, 0x7E, 0x01, 0x0B, speed])
}

pub fn osd_menu_toggle() -> Command {
    Command::control(vec![0x01, 0x06, 0x06, 0x10])
}

pub fn osd_menu_close() -> Command {
    Command::control(vec![0x01, 0x06, 0x06, 0x03])
}

pub fn osd_menu_enter() -> Command {
    Command::control(vec![0x01, 0x7E, 0x01, 0x02, 0x00, 0x01])
}

pub fn osd_menu_return() -> Command {
    Command::control(vec![0x01, 0x06, 0x01, 0x0E, 0x0E, 0x03, 0x01])
}
