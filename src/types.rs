//! Camera-agnostic types: properties, capability sets, endpoints and states.

use bitflags::bitflags;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

// =============================================================================
// Properties
// =============================================================================

/// A controllable or observable camera attribute.
///
/// Values are carried as plain integers in the property's natural range.
/// Toggles use 1 for on and 0 for off; the codec maps them to wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Property {
    // Position
    Pan,
    Tilt,
    Zoom,
    Focus,
    Autofocus,
    // White balance
    WbMode,
    RedGain,
    BlueGain,
    ColorTemp,
    AwbSens,
    Saturation,
    Hue,
    // Exposure
    ExposureMode,
    ExpCompMode,
    ExpComp,
    Backlight,
    Iris,
    Shutter,
    Gain,
    Bright,
    GainLimit,
    Flicker,
    // Image
    Luminance,
    Contrast,
    Aperture,
    FlipH,
    FlipV,
    BwMode,
}

/// Which batch a property is fetched and applied with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PropertyGroup {
    Position,
    WhiteBalance,
    Exposure,
    Image,
}

impl Property {
    /// Every property, in wire-table order.
    pub const ALL: [Property; 28] = [
        Property::Pan,
        Property::Tilt,
        Property::Zoom,
        Property::Focus,
        Property::Autofocus,
        Property::WbMode,
        Property::RedGain,
        Property::BlueGain,
        Property::ColorTemp,
        Property::AwbSens,
        Property::Saturation,
        Property::Hue,
        Property::ExposureMode,
        Property::ExpCompMode,
        Property::ExpComp,
        Property::Backlight,
        Property::Iris,
        Property::Shutter,
        Property::Gain,
        Property::Bright,
        Property::GainLimit,
        Property::Flicker,
        Property::Luminance,
        Property::Contrast,
        Property::Aperture,
        Property::FlipH,
        Property::FlipV,
        Property::BwMode,
    ];

    /// Stable key used in logs and preference storage.
    pub fn name(&self) -> &'static str {
        match self {
            Property::Pan => "pan",
            Property::Tilt => "tilt",
            Property::Zoom => "zoom",
            Property::Focus => "focus",
            Property::Autofocus => "autofocus",
            Property::WbMode => "wbMode",
            Property::RedGain => "redGain",
            Property::BlueGain => "blueGain",
            Property::ColorTemp => "colorTemp",
            Property::AwbSens => "awbSens",
            Property::Saturation => "saturation",
            Property::Hue => "hue",
            Property::ExposureMode => "exposureMode",
            Property::ExpCompMode => "expcompmode",
            Property::ExpComp => "expcomp",
            Property::Backlight => "backlight",
            Property::Iris => "iris",
            Property::Shutter => "shutter",
            Property::Gain => "gain",
            Property::Bright => "bright",
            Property::GainLimit => "gainlimit",
            Property::Flicker => "flicker",
            Property::Luminance => "luminance",
            Property::Contrast => "contrast",
            Property::Aperture => "aperture",
            Property::FlipH => "flipH",
            Property::FlipV => "flipV",
            Property::BwMode => "bwMode",
        }
    }

    pub fn from_name(name: &str) -> Option<Property> {
        Property::ALL.iter().copied().find(|p| p.name() == name)
    }

    pub fn group(&self) -> PropertyGroup {
        use Property::*;
        match self {
            Pan | Tilt | Zoom | Focus | Autofocus => PropertyGroup::Position,
            WbMode | RedGain | BlueGain | ColorTemp | AwbSens | Saturation | Hue => {
                PropertyGroup::WhiteBalance
            }
            ExposureMode | ExpCompMode | ExpComp | Backlight | Iris | Shutter | Gain | Bright
            | GainLimit | Flicker => PropertyGroup::Exposure,
            Luminance | Contrast | Aperture | FlipH | FlipV | BwMode => PropertyGroup::Image,
        }
    }

    /// The capability bit for this property.
    pub fn flag(&self) -> Capabilities {
        // Declaration order matches the bit order of `Capabilities`.
        Capabilities::from_bits_truncate(1 << (*self as u32))
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl PropertyGroup {
    /// Properties in this group, in wire-table order.
    pub fn properties(&self) -> impl Iterator<Item = Property> + '_ {
        Property::ALL.iter().copied().filter(move |p| p.group() == *self)
    }
}

// =============================================================================
// Capabilities
// =============================================================================

bitflags! {
    /// A set of properties, one bit per [`Property`] in `Property::ALL` order.
    ///
    /// Used both as a dialect's capability descriptor and as a caller's
    /// selection of which properties to fetch or apply.
    #[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
    pub struct Capabilities: u32 {
        const PAN = 1 << 0;
        const TILT = 1 << 1;
        const ZOOM = 1 << 2;
        const FOCUS = 1 << 3;
        const AUTOFOCUS = 1 << 4;
        const WB_MODE = 1 << 5;
        const RED_GAIN = 1 << 6;
        const BLUE_GAIN = 1 << 7;
        const COLOR_TEMP = 1 << 8;
        const AWB_SENS = 1 << 9;
        const SATURATION = 1 << 10;
        const HUE = 1 << 11;
        const EXPOSURE_MODE = 1 << 12;
        const EXPCOMP_MODE = 1 << 13;
        const EXPCOMP = 1 << 14;
        const BACKLIGHT = 1 << 15;
        const IRIS = 1 << 16;
        const SHUTTER = 1 << 17;
        const GAIN = 1 << 18;
        const BRIGHT = 1 << 19;
        const GAIN_LIMIT = 1 << 20;
        const FLICKER = 1 << 21;
        const LUMINANCE = 1 << 22;
        const CONTRAST = 1 << 23;
        const APERTURE = 1 << 24;
        const FLIP_H = 1 << 25;
        const FLIP_V = 1 << 26;
        const BW_MODE = 1 << 27;

        const POSITION = Self::PAN.bits()
            | Self::TILT.bits()
            | Self::ZOOM.bits()
            | Self::FOCUS.bits()
            | Self::AUTOFOCUS.bits();
        const WHITE_BALANCE = Self::WB_MODE.bits()
            | Self::RED_GAIN.bits()
            | Self::BLUE_GAIN.bits()
            | Self::COLOR_TEMP.bits()
            | Self::AWB_SENS.bits()
            | Self::SATURATION.bits()
            | Self::HUE.bits();
        const EXPOSURE = Self::EXPOSURE_MODE.bits()
            | Self::EXPCOMP_MODE.bits()
            | Self::EXPCOMP.bits()
            | Self::BACKLIGHT.bits()
            | Self::IRIS.bits()
            | Self::SHUTTER.bits()
            | Self::GAIN.bits()
            | Self::BRIGHT.bits()
            | Self::GAIN_LIMIT.bits()
            | Self::FLICKER.bits();
        const IMAGE = Self::LUMINANCE.bits()
            | Self::CONTRAST.bits()
            | Self::APERTURE.bits()
            | Self::FLIP_H.bits()
            | Self::FLIP_V.bits()
            | Self::BW_MODE.bits();
    }
}

impl Capabilities {
    pub fn supports(&self, property: Property) -> bool {
        self.contains(property.flag())
    }

    /// Properties in this set, in wire-table order.
    pub fn properties(&self) -> impl Iterator<Item = Property> + '_ {
        Property::ALL.iter().copied().filter(move |p| self.supports(*p))
    }
}

impl From<Property> for Capabilities {
    fn from(property: Property) -> Self {
        property.flag()
    }
}

impl FromIterator<Property> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Property>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Capabilities::empty(), |acc, p| acc | p.flag())
    }
}

// =============================================================================
// Connection Types
// =============================================================================

/// Where a camera is reached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Endpoint {
    /// VISCA over a raw TCP socket.
    Tcp { host: String, port: u16 },
    /// VISCA over a serial line.
    Serial { path: String },
}

impl Endpoint {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Endpoint::Tcp {
            host: host.into(),
            port,
        }
    }

    pub fn serial(path: impl Into<String>) -> Self {
        Endpoint::Serial { path: path.into() }
    }

    /// Parse a persisted device name.
    ///
    /// Accepts `host`, `host:port`, `[v6addr]:port` and serial device paths
    /// (`/dev/...` or `COMn`). A bare host uses `default_port`.
    pub fn parse(devicename: &str, default_port: u16) -> Result<Self> {
        let name = devicename.trim();
        if name.is_empty() {
            return Err(Error::invalid_argument("empty device name"));
        }
        if name.starts_with("/dev/") || name.to_ascii_uppercase().starts_with("COM") {
            return Ok(Endpoint::serial(name));
        }

        if let Some(rest) = name.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| Error::invalid_argument(format!("bad address '{}'", name)))?;
            let port = match tail.strip_prefix(':') {
                Some(port) => parse_port(port)?,
                None if tail.is_empty() => default_port,
                None => return Err(Error::invalid_argument(format!("bad address '{}'", name))),
            };
            return Ok(Endpoint::tcp(host, port));
        }

        match name.matches(':').count() {
            0 => Ok(Endpoint::tcp(name, default_port)),
            1 => {
                let (host, port) = name.split_once(':').unwrap_or((name, ""));
                if host.is_empty() {
                    return Err(Error::invalid_argument(format!("missing host in '{}'", name)));
                }
                Ok(Endpoint::tcp(host, parse_port(port)?))
            }
            // Bare IPv6 address without a port.
            _ => Ok(Endpoint::tcp(name, default_port)),
        }
    }

    /// The device name form accepted by [`Endpoint::parse`].
    pub fn devicename(&self) -> String {
        match self {
            Endpoint::Tcp { host, port } if host.contains(':') => format!("[{}]:{}", host, port),
            Endpoint::Tcp { host, port } => format!("{}:{}", host, port),
            Endpoint::Serial { path } => path.clone(),
        }
    }

    pub fn is_serial(&self) -> bool {
        matches!(self, Endpoint::Serial { .. })
    }
}

fn parse_port(port: &str) -> Result<u16> {
    port.parse::<u16>()
        .map_err(|_| Error::invalid_argument(format!("bad port '{}'", port)))
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { .. } => write!(f, "tcp://{}", self.devicename()),
            Endpoint::Serial { path } => write!(f, "serial://{}", path),
        }
    }
}

/// Lifecycle of a camera connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConnectionState {
    /// Not connected; the next command opens the connection.
    Closed,
    /// Connect in progress.
    Opening,
    /// Connected and usable.
    Open,
    /// Opening failed or the retry budget ran out. Commands fail fast until
    /// an explicit reopen succeeds.
    Faulted,
}

/// Where the per-camera command queue is in its exchange cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum QueueState {
    Idle,
    AwaitingAck,
    AwaitingCompletion,
    Closed,
}

/// How much a cached property value can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Freshness {
    /// Never confirmed, or invalidated since.
    Stale,
    /// Optimistically set; the set command has not completed yet.
    Pending,
    /// Confirmed by a successful fetch or set.
    Fresh,
}

// =============================================================================
// Motion Parameters
// =============================================================================

/// Horizontal drive direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Horizontal {
    Left,
    Right,
    Stop,
}

/// Vertical drive direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Vertical {
    Up,
    Down,
    Stop,
}

/// Parameters for a continuous pan/tilt drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PanTiltDrive {
    pub pan_speed: u8,
    pub tilt_speed: u8,
    pub horizontal: Horizontal,
    pub vertical: Vertical,
}

impl PanTiltDrive {
    pub fn stop() -> Self {
        Self {
            pan_speed: 1,
            tilt_speed: 1,
            horizontal: Horizontal::Stop,
            vertical: Vertical::Stop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_flags_are_unique() {
        let all: Capabilities = Property::ALL.iter().copied().collect();
        assert_eq!(all.bits().count_ones() as usize, Property::ALL.len());
        assert_eq!(Property::Iris.flag(), Capabilities::IRIS);
        assert_eq!(Property::BwMode.flag(), Capabilities::BW_MODE);
    }

    #[test]
    fn test_group_masks_match_property_groups() {
        let groups = [
            (PropertyGroup::Position, Capabilities::POSITION),
            (PropertyGroup::WhiteBalance, Capabilities::WHITE_BALANCE),
            (PropertyGroup::Exposure, Capabilities::EXPOSURE),
            (PropertyGroup::Image, Capabilities::IMAGE),
        ];
        for (group, mask) in groups {
            let from_group: Capabilities = group.properties().collect();
            assert_eq!(from_group, mask, "{:?}", group);
        }
    }

    #[test]
    fn test_property_names_round_trip() {
        for p in Property::ALL {
            assert_eq!(Property::from_name(p.name()), Some(p));
        }
    }

    #[test]
    fn test_endpoint_parse_forms() {
        assert_eq!(
            Endpoint::parse("192.0.2.10", 5678).unwrap(),
            Endpoint::tcp("192.0.2.10", 5678)
        );
        assert_eq!(
            Endpoint::parse("cam.local:1259", 5678).unwrap(),
            Endpoint::tcp("cam.local", 1259)
        );
        assert_eq!(
            Endpoint::parse("[fe80::1]:5678", 1).unwrap(),
            Endpoint::tcp("fe80::1", 5678)
        );
        assert_eq!(
            Endpoint::parse("/dev/tty.usbserial-1410", 5678).unwrap(),
            Endpoint::serial("/dev/tty.usbserial-1410")
        );
        assert!(Endpoint::parse("", 5678).is_err());
        assert!(Endpoint::parse("host:notaport", 5678).is_err());
    }

    #[test]
    fn test_endpoint_devicename_round_trips() {
        for ep in [
            Endpoint::tcp("192.0.2.10", 5678),
            Endpoint::tcp("fe80::1", 52381),
            Endpoint::serial("/dev/ttyUSB0"),
        ] {
            assert_eq!(Endpoint::parse(&ep.devicename(), 1).unwrap(), ep);
        }
    }
}
