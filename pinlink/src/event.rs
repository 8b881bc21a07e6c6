//! Inbound event types produced by the reader loop.

use crate::{AnalogPin, DigitalPin, Pin};
use std::collections::BTreeMap;
use std::fmt;

/// The new value carried by a pin change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinValue {
    Analog(i32),
    Digital(bool),
}

/// A pin changed its value on the device.
///
/// Only the typed constructors exist, so an analog pin always carries an
/// analog value and a digital pin a digital one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinValueChangedEvent {
    pin: Pin,
    value: PinValue,
}

impl PinValueChangedEvent {
    pub fn analog(pin: AnalogPin, value: i32) -> Self {
        Self {
            pin: pin.into(),
            value: PinValue::Analog(value),
        }
    }

    pub fn digital(pin: DigitalPin, value: bool) -> Self {
        Self {
            pin: pin.into(),
            value: PinValue::Digital(value),
        }
    }

    pub fn pin(&self) -> Pin {
        self.pin
    }

    pub fn value(&self) -> PinValue {
        self.value
    }
}

/// The device answered a request carrying a message id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyEvent {
    /// Correlation id of the request being answered.
    pub id: u64,
    pub ok: bool,
    /// Extra key/value payload sent along with the reply.
    pub params: BTreeMap<String, String>,
}

impl ReplyEvent {
    pub fn new(id: u64, ok: bool) -> Self {
        Self {
            id,
            ok,
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// A protocol extension message not otherwise modeled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomEvent {
    pub message: String,
}

impl CustomEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Connection status transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    Connected,
    Lost,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Lost => write!(f, "lost"),
        }
    }
}

#[cfg(test)]
mod event_tests {
    use super::*;
    use crate::PinKind;

    #[test]
    fn test_pin_event_kind_matches_value() {
        let a = PinValueChangedEvent::analog(AnalogPin(2), 512);
        assert!(a.pin().is(PinKind::Analog));
        assert_eq!(a.value(), PinValue::Analog(512));

        let d = PinValueChangedEvent::digital(DigitalPin(9), true);
        assert!(d.pin().is(PinKind::Digital));
        assert_eq!(d.value(), PinValue::Digital(true));
    }

    #[test]
    fn test_reply_params() {
        let r = ReplyEvent::new(7, true).with_param("state", "on");
        assert_eq!(r.id, 7);
        assert_eq!(r.params.get("state").map(String::as_str), Some("on"));
    }

    #[test]
    fn test_connection_status_display() {
        assert_eq!(ConnectionStatus::Lost.to_string(), "lost");
        assert_eq!(ConnectionStatus::Connected.to_string(), "connected");
    }
}
