//! Outgoing command types.

use crate::{AnalogPin, DigitalPin, KeyPress, Pin, Tone};
use std::fmt;

/// A command sent from the host to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SwitchDigitalPin { pin: DigitalPin, value: bool },
    SwitchAnalogPin { pin: AnalogPin, value: i32 },
    StartListening(Pin),
    StopListening(Pin),
    Custom(Vec<String>),
    Tone(Tone),
    NoTone(AnalogPin),
    KeyPress(KeyPress),
}

impl Command {
    /// Builds a custom command from its message parts.
    pub fn custom<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Command::Custom(parts.into_iter().map(Into::into).collect())
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Command::SwitchDigitalPin { .. } => CommandKind::SwitchDigitalPin,
            Command::SwitchAnalogPin { .. } => CommandKind::SwitchAnalogPin,
            Command::StartListening(_) => CommandKind::StartListening,
            Command::StopListening(_) => CommandKind::StopListening,
            Command::Custom(_) => CommandKind::Custom,
            Command::Tone(_) => CommandKind::Tone,
            Command::NoTone(_) => CommandKind::NoTone,
            Command::KeyPress(_) => CommandKind::KeyPress,
        }
    }
}

/// Discriminant of [`Command`], used for capability queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    SwitchDigitalPin,
    SwitchAnalogPin,
    StartListening,
    StopListening,
    Custom,
    Tone,
    NoTone,
    KeyPress,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::SwitchDigitalPin => "switch_digital_pin",
            CommandKind::SwitchAnalogPin => "switch_analog_pin",
            CommandKind::StartListening => "start_listening",
            CommandKind::StopListening => "stop_listening",
            CommandKind::Custom => "custom",
            CommandKind::Tone => "tone",
            CommandKind::NoTone => "no_tone",
            CommandKind::KeyPress => "key_press",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A command on its way to the codec, optionally tagged with a message id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: Command,
    pub message_id: Option<u64>,
}

impl Request {
    /// Creates an untagged request.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            message_id: None,
        }
    }

    /// Returns the request tagged with the given message id.
    pub fn with_message_id(mut self, id: u64) -> Self {
        self.message_id = Some(id);
        self
    }
}

impl From<Command> for Request {
    fn from(command: Command) -> Self {
        Request::new(command)
    }
}
