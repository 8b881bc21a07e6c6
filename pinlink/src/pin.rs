//! Pin identities and outgoing pin-level payloads.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The two kinds of pin a device exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinKind {
    Analog,
    Digital,
}

impl PinKind {
    /// Returns the string representation of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            PinKind::Analog => "analog",
            PinKind::Digital => "digital",
        }
    }
}

impl fmt::Display for PinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A pin on the remote device, identified by kind and address.
///
/// Two pins are equal iff both kind and address match, so `Analog(3)` and
/// `Digital(3)` are different pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pin {
    Analog(u16),
    Digital(u16),
}

impl Pin {
    pub fn analog(num: u16) -> Self {
        Pin::Analog(num)
    }

    pub fn digital(num: u16) -> Self {
        Pin::Digital(num)
    }

    pub fn kind(&self) -> PinKind {
        match self {
            Pin::Analog(_) => PinKind::Analog,
            Pin::Digital(_) => PinKind::Digital,
        }
    }

    /// Returns the numeric address of the pin.
    pub fn num(&self) -> u16 {
        match self {
            Pin::Analog(n) | Pin::Digital(n) => *n,
        }
    }

    pub fn is(&self, kind: PinKind) -> bool {
        self.kind() == kind
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pin::Analog(n) => write!(f, "A{}", n),
            Pin::Digital(n) => write!(f, "D{}", n),
        }
    }
}

/// Address of an analog pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalogPin(pub u16);

/// Address of a digital pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DigitalPin(pub u16);

impl From<AnalogPin> for Pin {
    fn from(p: AnalogPin) -> Self {
        Pin::Analog(p.0)
    }
}

impl From<DigitalPin> for Pin {
    fn from(p: DigitalPin) -> Self {
        Pin::Digital(p.0)
    }
}

/// A tone to play on an analog (PWM) pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tone {
    pub pin: AnalogPin,
    pub hertz: u32,
    /// How long to play. `None` plays until a no-tone command arrives.
    pub duration: Option<Duration>,
}

impl Tone {
    /// Creates an endless tone.
    pub fn new(pin: AnalogPin, hertz: u32) -> Self {
        Self {
            pin,
            hertz,
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// A key press forwarded to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyPress {
    pub key_char: char,
    pub key_code: i32,
    pub key_location: i32,
    pub key_modifiers: i32,
    pub key_modifiers_ex: i32,
}

impl KeyPress {
    pub fn new(key_char: char, key_code: i32) -> Self {
        Self {
            key_char,
            key_code,
            ..Default::default()
        }
    }
}
