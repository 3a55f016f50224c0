//! Camera-family command tables.
//!
//! A [`Dialect`] is everything that differs between supported camera
//! families: which properties exist, their opcodes, how many nibbles each
//! field takes on the wire, their valid ranges, and the scene index rules.
//! Call sites never hard-code these; they ask the camera's dialect.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

use super::command::{self, Command};
use super::{pack_nibbles, sign_extend, to_field, unpack_nibbles};
use crate::error::{Error, Result};
use crate::types::{Capabilities, PanTiltDrive, Property};

/// Supported camera families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DialectKind {
    #[default]
    PtzOptics,
    Sony,
}

impl DialectKind {
    pub fn all() -> &'static [DialectKind] {
        &[DialectKind::PtzOptics, DialectKind::Sony]
    }

    pub fn dialect(&self) -> &'static Dialect {
        match self {
            DialectKind::PtzOptics => &PTZOPTICS,
            DialectKind::Sony => &SONY,
        }
    }

    /// Stable key used in preference storage.
    pub fn key(&self) -> &'static str {
        match self {
            DialectKind::PtzOptics => "ptzoptics",
            DialectKind::Sony => "sony",
        }
    }

    pub fn from_key(key: &str) -> Option<DialectKind> {
        DialectKind::all().iter().copied().find(|k| k.key() == key)
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dialect().name)
    }
}

// =============================================================================
// Property Table
// =============================================================================

/// How a property value is laid out on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// `width` bytes of one nibble each, optionally two's complement.
    Nibbles { width: usize, signed: bool },
    /// One raw byte.
    Byte,
    /// `0x02` on, `0x03` off. Values are 1 and 0.
    Toggle,
    /// One byte chosen from a list. Values are indices into the list.
    Choice(&'static [u8]),
}

impl Field {
    /// Bytes the field occupies.
    pub fn width(&self) -> usize {
        match self {
            Field::Nibbles { width, .. } => *width,
            Field::Byte | Field::Toggle | Field::Choice(_) => 1,
        }
    }

    /// Wire bytes for `value`. The value must already be in range.
    pub fn encode(&self, value: i32) -> Vec<u8> {
        match *self {
            Field::Nibbles { width, .. } => pack_nibbles(to_field(value, width), width),
            Field::Byte => vec![value as u8],
            Field::Toggle => vec![if value != 0 { 0x02 } else { 0x03 }],
            Field::Choice(choices) => vec![choices.get(value as usize).copied().unwrap_or(0)],
        }
    }

    /// Value from exactly [`Field::width`] wire bytes.
    pub fn decode(&self, bytes: &[u8]) -> Result<i32> {
        if bytes.len() != self.width() {
            return Err(Error::protocol(format!(
                "field needs {} bytes, got {}",
                self.width(),
                bytes.len()
            )));
        }
        match *self {
            Field::Nibbles { width, signed } => {
                let raw = unpack_nibbles(bytes)?;
                Ok(if signed { sign_extend(raw, width) } else { raw as i32 })
            }
            Field::Byte => Ok(bytes[0] as i32),
            Field::Toggle => match bytes[0] {
                0x02 => Ok(1),
                0x03 => Ok(0),
                other => Err(Error::protocol(format!("bad toggle value {:#04x}", other))),
            },
            Field::Choice(choices) => choices
                .iter()
                .position(|&c| c == bytes[0])
                .map(|i| i as i32)
                .ok_or_else(|| Error::protocol(format!("unknown choice {:#04x}", bytes[0]))),
        }
    }
}

/// Where a field sits in an inquiry reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyAt {
    /// First bytes of the reply.
    Head,
    /// Last bytes of the reply; leading padding is ignored.
    Tail,
}

/// One row of a dialect's command table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertySpec {
    pub property: Property,
    /// Body prefix for a direct set, padding included. Empty when the
    /// property has no standalone set command.
    pub set: &'static [u8],
    pub inquiry: &'static [u8],
    pub field: Field,
    pub min: i32,
    pub max: i32,
    pub reply_at: ReplyAt,
}

impl PropertySpec {
    const fn new(
        property: Property,
        set: &'static [u8],
        inquiry: &'static [u8],
        field: Field,
        min: i32,
        max: i32,
    ) -> Self {
        Self {
            property,
            set,
            inquiry,
            field,
            min,
            max,
            reply_at: ReplyAt::Tail,
        }
    }

    const fn nibbles(
        property: Property,
        set: &'static [u8],
        inquiry: &'static [u8],
        width: usize,
        min: i32,
        max: i32,
    ) -> Self {
        Self::new(
            property,
            set,
            inquiry,
            Field::Nibbles {
                width,
                signed: false,
            },
            min,
            max,
        )
    }

    const fn toggle(property: Property, set: &'static [u8], inquiry: &'static [u8]) -> Self {
        Self::new(property, set, inquiry, Field::Toggle, 0, 1)
    }

    const fn choice(
        property: Property,
        set: &'static [u8],
        inquiry: &'static [u8],
        choices: &'static [u8],
    ) -> Self {
        Self::new(
            property,
            set,
            inquiry,
            Field::Choice(choices),
            0,
            choices.len() as i32 - 1,
        )
    }

    const fn position(property: Property, width: usize, at: ReplyAt, min: i32, max: i32) -> Self {
        Self {
            property,
            set: &[],
            inquiry: &[0x09, 0x06, 0x12],
            field: Field::Nibbles {
                width,
                signed: true,
            },
            min,
            max,
            reply_at: at,
        }
    }

    pub fn range(&self) -> RangeInclusive<i32> {
        self.min..=self.max
    }

    /// Extract this property's value from an inquiry reply payload.
    pub fn decode_reply(&self, payload: &[u8]) -> Result<i32> {
        let width = self.field.width();
        if payload.len() < width {
            return Err(Error::protocol(format!(
                "{} reply has {} bytes, need {}",
                self.property,
                payload.len(),
                width
            )));
        }
        let bytes = match self.reply_at {
            ReplyAt::Head => &payload[..width],
            ReplyAt::Tail => &payload[payload.len() - width..],
        };
        self.field.decode(bytes)
    }
}

const ZOOM: PropertySpec =
    PropertySpec::nibbles(Property::Zoom, &[0x01, 0x04, 0x47], &[0x09, 0x04, 0x47], 4, 0, 0x4000);
const FOCUS: PropertySpec =
    PropertySpec::nibbles(Property::Focus, &[0x01, 0x04, 0x48], &[0x09, 0x04, 0x48], 4, 0, 0xC000);
const AUTOFOCUS: PropertySpec =
    PropertySpec::toggle(Property::Autofocus, &[0x01, 0x04, 0x38], &[0x09, 0x04, 0x38]);
const WB_MODE: PropertySpec = PropertySpec::new(
    Property::WbMode,
    &[0x01, 0x04, 0x35],
    &[0x09, 0x04, 0x35],
    Field::Byte,
    0,
    5,
);
const RED_GAIN: PropertySpec = PropertySpec::nibbles(
    Property::RedGain,
    &[0x01, 0x04, 0x43, 0x00, 0x00],
    &[0x09, 0x04, 0x43],
    2,
    0,
    255,
);
const BLUE_GAIN: PropertySpec = PropertySpec::nibbles(
    Property::BlueGain,
    &[0x01, 0x04, 0x44, 0x00, 0x00],
    &[0x09, 0x04, 0x44],
    2,
    0,
    255,
);
const COLOR_TEMP: PropertySpec = PropertySpec::nibbles(
    Property::ColorTemp,
    &[0x01, 0x04, 0x20],
    &[0x09, 0x04, 0x20],
    2,
    0,
    0x37,
);
const AWB_SENS: PropertySpec = PropertySpec::new(
    Property::AwbSens,
    &[0x01, 0x04, 0xA9],
    &[0x09, 0x04, 0xA9],
    Field::Byte,
    0,
    2,
);
const SATURATION: PropertySpec = PropertySpec::nibbles(
    Property::Saturation,
    &[0x01, 0x04, 0x49, 0x00, 0x00, 0x00],
    &[0x09, 0x04, 0x49],
    1,
    0,
    14,
);
const HUE: PropertySpec = PropertySpec::nibbles(
    Property::Hue,
    &[0x01, 0x04, 0x4F, 0x00, 0x00, 0x00],
    &[0x09, 0x04, 0x4F],
    1,
    0,
    14,
);
// Full auto, manual, shutter priority, iris priority, bright.
const EXPOSURE_MODE: PropertySpec = PropertySpec::choice(
    Property::ExposureMode,
    &[0x01, 0x04, 0x39],
    &[0x09, 0x04, 0x39],
    &[0x00, 0x03, 0x0A, 0x0B, 0x0D],
);
const EXPCOMP_MODE: PropertySpec =
    PropertySpec::toggle(Property::ExpCompMode, &[0x01, 0x04, 0x3E], &[0x09, 0x04, 0x3E]);
const EXPCOMP: PropertySpec = PropertySpec::nibbles(
    Property::ExpComp,
    &[0x01, 0x04, 0x4E, 0x00, 0x00],
    &[0x09, 0x04, 0x4E],
    2,
    0,
    14,
);
const BACKLIGHT: PropertySpec =
    PropertySpec::toggle(Property::Backlight, &[0x01, 0x04, 0x33], &[0x09, 0x04, 0x33]);
const SHUTTER: PropertySpec = PropertySpec::nibbles(
    Property::Shutter,
    &[0x01, 0x04, 0x4A, 0x00, 0x00],
    &[0x09, 0x04, 0x4A],
    2,
    0,
    21,
);
const GAIN: PropertySpec = PropertySpec::nibbles(
    Property::Gain,
    &[0x01, 0x04, 0x4C, 0x00, 0x00],
    &[0x09, 0x04, 0x4C],
    2,
    0,
    15,
);
const BRIGHT: PropertySpec = PropertySpec::nibbles(
    Property::Bright,
    &[0x01, 0x04, 0x4D, 0x00, 0x00],
    &[0x09, 0x04, 0x4D],
    2,
    0,
    23,
);
const GAIN_LIMIT: PropertySpec = PropertySpec::nibbles(
    Property::GainLimit,
    &[0x01, 0x04, 0x2C],
    &[0x09, 0x04, 0x2C],
    1,
    4,
    15,
);
const FLICKER: PropertySpec = PropertySpec::new(
    Property::Flicker,
    &[0x01, 0x04, 0x23],
    &[0x09, 0x04, 0x23],
    Field::Byte,
    0,
    2,
);
const LUMINANCE: PropertySpec = PropertySpec::nibbles(
    Property::Luminance,
    &[0x01, 0x04, 0xA1, 0x00, 0x00],
    &[0x09, 0x04, 0xA1],
    2,
    0,
    14,
);
const CONTRAST: PropertySpec = PropertySpec::nibbles(
    Property::Contrast,
    &[0x01, 0x04, 0xA2, 0x00, 0x00],
    &[0x09, 0x04, 0xA2],
    2,
    0,
    14,
);
const APERTURE: PropertySpec = PropertySpec::nibbles(
    Property::Aperture,
    &[0x01, 0x04, 0x42, 0x00, 0x00],
    &[0x09, 0x04, 0x42],
    2,
    0,
    15,
);
const FLIP_H: PropertySpec =
    PropertySpec::toggle(Property::FlipH, &[0x01, 0x04, 0x61], &[0x09, 0x04, 0x61]);
const FLIP_V: PropertySpec =
    PropertySpec::toggle(Property::FlipV, &[0x01, 0x04, 0x66], &[0x09, 0x04, 0x66]);
// Picture effect: off, black and white.
const BW_MODE: PropertySpec = PropertySpec::choice(
    Property::BwMode,
    &[0x01, 0x04, 0x63],
    &[0x09, 0x04, 0x63],
    &[0x00, 0x04],
);

const PTZOPTICS_PROPERTIES: [PropertySpec; 28] = [
    PropertySpec::position(Property::Pan, 4, ReplyAt::Head, -2448, 2448),
    PropertySpec::position(Property::Tilt, 4, ReplyAt::Tail, -432, 1296),
    ZOOM,
    FOCUS,
    AUTOFOCUS,
    WB_MODE,
    RED_GAIN,
    BLUE_GAIN,
    COLOR_TEMP,
    AWB_SENS,
    SATURATION,
    HUE,
    EXPOSURE_MODE,
    EXPCOMP_MODE,
    EXPCOMP,
    BACKLIGHT,
    PropertySpec::nibbles(
        Property::Iris,
        &[0x01, 0x04, 0x4B, 0x00, 0x00],
        &[0x09, 0x04, 0x4B],
        2,
        0,
        13,
    ),
    SHUTTER,
    GAIN,
    BRIGHT,
    GAIN_LIMIT,
    FLICKER,
    LUMINANCE,
    CONTRAST,
    APERTURE,
    FLIP_H,
    FLIP_V,
    BW_MODE,
];

// No AWB sensitivity, anti-flicker, luminance or contrast; wider pan field.
const SONY_PROPERTIES: [PropertySpec; 24] = [
    PropertySpec::position(Property::Pan, 5, ReplyAt::Head, -61200, 61200),
    PropertySpec::position(Property::Tilt, 4, ReplyAt::Tail, -20400, 20400),
    ZOOM,
    FOCUS,
    AUTOFOCUS,
    WB_MODE,
    RED_GAIN,
    BLUE_GAIN,
    COLOR_TEMP,
    SATURATION,
    HUE,
    EXPOSURE_MODE,
    EXPCOMP_MODE,
    EXPCOMP,
    BACKLIGHT,
    PropertySpec::nibbles(
        Property::Iris,
        &[0x01, 0x04, 0x4B, 0x00, 0x00],
        &[0x09, 0x04, 0x4B],
        2,
        0,
        17,
    ),
    SHUTTER,
    GAIN,
    BRIGHT,
    GAIN_LIMIT,
    APERTURE,
    FLIP_H,
    FLIP_V,
    BW_MODE,
];

// =============================================================================
// Dialect
// =============================================================================

/// Command table and limits for one camera family.
#[derive(Debug)]
pub struct Dialect {
    pub kind: DialectKind,
    pub name: &'static str,
    /// TCP port used when a device name has none.
    pub default_port: u16,
    pub max_scene_index: u8,
    /// Scene indices the firmware uses for special functions.
    pub reserved_scenes: &'static [u8],
    pub max_pan_speed: u8,
    pub max_tilt_speed: u8,
    /// Zoom and focus variable-speed drives.
    pub max_drive_speed: u8,
    pub max_preset_speed: u8,
    properties: &'static [PropertySpec],
}

pub static PTZOPTICS: Dialect = Dialect {
    kind: DialectKind::PtzOptics,
    name: "PTZOptics",
    default_port: 5678,
    max_scene_index: 254,
    reserved_scenes: &[90, 91, 92, 93, 94, 95, 96, 97, 98, 99],
    max_pan_speed: 0x18,
    max_tilt_speed: 0x14,
    max_drive_speed: 7,
    max_preset_speed: 0x18,
    properties: &PTZOPTICS_PROPERTIES,
};

pub static SONY: Dialect = Dialect {
    kind: DialectKind::Sony,
    name: "Sony",
    default_port: 52381,
    max_scene_index: 99,
    reserved_scenes: &[],
    max_pan_speed: 0x18,
    max_tilt_speed: 0x17,
    max_drive_speed: 7,
    max_preset_speed: 0x18,
    properties: &SONY_PROPERTIES,
};

impl Dialect {
    pub fn spec(&self, property: Property) -> Option<&'static PropertySpec> {
        self.properties.iter().find(|s| s.property == property)
    }

    /// The capability descriptor: every property this family supports.
    pub fn capabilities(&self) -> Capabilities {
        self.properties.iter().map(|s| s.property).collect()
    }

    pub fn supports(&self, property: Property) -> bool {
        self.spec(property).is_some()
    }

    pub fn range(&self, property: Property) -> Option<RangeInclusive<i32>> {
        self.spec(property).map(|s| s.range())
    }

    fn require(&self, property: Property) -> Result<&'static PropertySpec> {
        self.spec(property)
            .ok_or(Error::CapabilityUnsupported(property))
    }

    fn check_range(&self, spec: &PropertySpec, value: i32) -> Result<()> {
        if spec.range().contains(&value) {
            Ok(())
        } else {
            Err(Error::invalid_argument(format!(
                "{} value {} outside {}..={} for {}",
                spec.property, value, spec.min, spec.max, self.name
            )))
        }
    }

    // -------------------------------------------------------------------------
    // Scenes
    // -------------------------------------------------------------------------

    pub fn is_valid_scene_index(&self, scene: i32) -> bool {
        (0..=self.max_scene_index as i32).contains(&scene)
            && !self.reserved_scenes.contains(&(scene as u8))
    }

    /// Clamp a scene range offset so that shifted ranges stay addressable.
    pub fn validate_range_offset(&self, offset: i32) -> i32 {
        offset.clamp(1, self.max_scene_index as i32)
    }

    fn scene(&self, scene: i32) -> Result<u8> {
        if self.is_valid_scene_index(scene) {
            Ok(scene as u8)
        } else {
            Err(Error::invalid_argument(format!(
                "scene {} is not valid for {}",
                scene, self.name
            )))
        }
    }

    pub fn memory_recall(&self, scene: i32) -> Result<Command> {
        Ok(command::memory_recall(self.scene(scene)?))
    }

    pub fn memory_set(&self, scene: i32) -> Result<Command> {
        Ok(command::memory_set(self.scene(scene)?))
    }

    pub fn memory_reset(&self, scene: i32) -> Result<Command> {
        Ok(command::memory_reset(self.scene(scene)?))
    }

    // -------------------------------------------------------------------------
    // Properties
    // -------------------------------------------------------------------------

    pub fn inquiry(&self, property: Property) -> Result<Command> {
        let spec = self.require(property)?;
        Ok(Command::inquiry(spec.inquiry.to_vec()))
    }

    /// Direct set for a single property. Pan and tilt move together; use
    /// [`Dialect::pantilt_absolute`].
    pub fn set(&self, property: Property, value: i32) -> Result<Command> {
        let spec = self.require(property)?;
        if spec.set.is_empty() {
            return Err(Error::invalid_argument(format!(
                "{} has no standalone set command",
                property
            )));
        }
        self.check_range(spec, value)?;
        let mut body = spec.set.to_vec();
        body.extend(spec.field.encode(value));
        Ok(Command::control(body))
    }

    pub fn decode(&self, property: Property, payload: &[u8]) -> Result<i32> {
        self.require(property)?.decode_reply(payload)
    }

    pub fn pantilt_absolute(
        &self,
        pan_speed: u8,
        tilt_speed: u8,
        pan: i32,
        tilt: i32,
    ) -> Result<Command> {
        let pan_spec = self.require(Property::Pan)?;
        let tilt_spec = self.require(Property::Tilt)?;
        self.check_range(pan_spec, pan)?;
        self.check_range(tilt_spec, tilt)?;
        let mut body = vec![
            0x01,
            0x06,
            0x02,
            pan_speed.clamp(1, self.max_pan_speed),
            tilt_speed.clamp(1, self.max_tilt_speed),
        ];
        body.extend(pan_spec.field.encode(pan));
        body.extend(tilt_spec.field.encode(tilt));
        Ok(Command::control(body))
    }

    pub fn pantilt_drive(&self, drive: PanTiltDrive) -> Command {
        command::pantilt_drive(PanTiltDrive {
            pan_speed: drive.pan_speed.clamp(1, self.max_pan_speed),
            tilt_speed: drive.tilt_speed.clamp(1, self.max_tilt_speed),
            ..drive
        })
    }

    pub fn preset_speed(&self, speed: u8) -> Command {
        command::preset_speed(speed.clamp(1, self.max_preset_speed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Response;

    /// Simulate the camera answering an inquiry with the bytes a set
    /// command carried, then decode it back.
    fn reply_for(spec: &PropertySpec, field_bytes: &[u8]) -> Vec<u8> {
        // Same zero padding the set command used after its opcode.
        let padding = spec.set.len().saturating_sub(3);
        let mut data = vec![0x00; padding];
        data.extend_from_slice(field_bytes);
        match Response::decode(&Response::InquiryReply(data).encode(1)).unwrap() {
            Response::InquiryReply(bytes) => bytes,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_set_then_inquiry_round_trip_all_values() {
        for kind in DialectKind::all() {
            let dialect = kind.dialect();
            for spec in dialect.properties.iter().filter(|s| !s.set.is_empty()) {
                for value in spec.range() {
                    let cmd = dialect.set(spec.property, value).unwrap();
                    let field_bytes = &cmd.body()[spec.set.len()..];
                    assert_eq!(field_bytes.len(), spec.field.width());
                    let payload = reply_for(spec, field_bytes);
                    assert_eq!(
                        dialect.decode(spec.property, &payload).unwrap(),
                        value,
                        "{} {}",
                        dialect.name,
                        spec.property
                    );
                }
            }
        }
    }

    #[test]
    fn test_pantilt_round_trip_signed() {
        for kind in DialectKind::all() {
            let dialect = kind.dialect();
            let pan_range = dialect.range(Property::Pan).unwrap();
            let tilt_range = dialect.range(Property::Tilt).unwrap();
            let samples = [
                (*pan_range.start(), *tilt_range.start()),
                (-1, -1),
                (0, 0),
                (*pan_range.end(), *tilt_range.end()),
            ];
            for (pan, tilt) in samples {
                let cmd = dialect.pantilt_absolute(5, 5, pan, tilt).unwrap();
                // Position reply carries the same nibbles as the absolute move.
                let payload = reply_for(&ZOOM, &cmd.body()[5..]);
                assert_eq!(dialect.decode(Property::Pan, &payload).unwrap(), pan);
                assert_eq!(dialect.decode(Property::Tilt, &payload).unwrap(), tilt);
            }
        }
    }

    #[test]
    fn test_nibble_widths_differ_between_dialects() {
        let ptz = PTZOPTICS.pantilt_absolute(1, 1, 0, 0).unwrap();
        let sony = SONY.pantilt_absolute(1, 1, 0, 0).unwrap();
        assert_eq!(ptz.body().len(), 5 + 4 + 4);
        assert_eq!(sony.body().len(), 5 + 5 + 4);
    }

    #[test]
    fn test_unsupported_property_is_rejected_before_encoding() {
        assert!(PTZOPTICS.supports(Property::Flicker));
        assert!(!SONY.supports(Property::Flicker));
        assert_eq!(
            SONY.inquiry(Property::Flicker),
            Err(Error::CapabilityUnsupported(Property::Flicker))
        );
        assert!(!SONY.capabilities().contains(Capabilities::AWB_SENS));
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        assert!(PTZOPTICS.set(Property::Zoom, 0x4001).is_err());
        assert!(PTZOPTICS.set(Property::Iris, -1).is_err());
        assert!(PTZOPTICS.set(Property::Pan, 0).is_err());
        assert!(PTZOPTICS.pantilt_absolute(1, 1, 5000, 0).is_err());
    }

    #[test]
    fn test_scene_index_rules() {
        assert!(PTZOPTICS.is_valid_scene_index(0));
        assert!(PTZOPTICS.is_valid_scene_index(254));
        assert!(!PTZOPTICS.is_valid_scene_index(255));
        assert!(!PTZOPTICS.is_valid_scene_index(95));
        assert!(SONY.is_valid_scene_index(95));
        assert!(!SONY.is_valid_scene_index(100));
        assert!(PTZOPTICS.memory_recall(95).is_err());
        assert!(PTZOPTICS.memory_set(-1).is_err());
        assert_eq!(SONY.validate_range_offset(500), 99);
    }

    #[test]
    fn test_toggle_and_choice_decoding() {
        assert_eq!(PTZOPTICS.decode(Property::Autofocus, &[0x02]).unwrap(), 1);
        assert_eq!(PTZOPTICS.decode(Property::Autofocus, &[0x03]).unwrap(), 0);
        assert!(PTZOPTICS.decode(Property::Autofocus, &[0x07]).is_err());
        assert_eq!(PTZOPTICS.decode(Property::ExposureMode, &[0x0B]).unwrap(), 3);
        assert!(PTZOPTICS.decode(Property::Zoom, &[0x01]).is_err());
    }
}
