//! Host-side link to pin-controlling microcontrollers.
//!
//! A [`Link`] is one logical connection to a device. Commands go out
//! (switch pins, play tones, custom messages), events come back
//! (pin value changes, replies, custom events) and are dispatched to
//! registered listeners.
//!
//! - [`Pin`], [`Command`] and the event types: the data model
//! - [`Listeners`]: copy-on-write listener registries with isolated dispatch
//! - [`Correlator`]: opt-in message-id tagging for request/reply matching
//! - [`ConnectionLink`]: reader task, boot wait, reconnect detection
//! - [`Codec`] and [`AlpCodec`]: the wire protocol boundary
//! - [`new_pipe`]: in-memory transport for testing
//!
//! # Example
//!
//! ```rust,no_run
//! use giztoy_pinlink::{ConnectionLink, DigitalPin, Link};
//!
//! # async fn run() -> giztoy_pinlink::Result<()> {
//! let link = ConnectionLink::connect_uri("tcp://192.168.1.20:4478?boot_timeout_ms=3000").await?;
//! link.switch_digital_pin(DigitalPin(13), true).await?;
//! link.close().await?;
//! # Ok(())
//! # }
//! ```

mod pin;
mod event;
mod command;
mod error;
mod link;
mod conn;
pub mod logger;
pub mod listener;
pub mod message_id;
pub mod codec;
pub mod alp;
pub mod transport;
pub mod pipe;
pub mod config;

pub use pin::*;
pub use event::*;
pub use command::*;
pub use error::*;
pub use link::Link;
pub use conn::{ConnectionLink, ConnectionLinkBuilder, LinkState};
pub use listener::*;
pub use logger::{default_logger, Logger, NopLogger};
pub use message_id::{Correlator, MessageIdCounter, RequestContext};
pub use codec::{Codec, Decoded, Inbound};
pub use alp::AlpCodec;
pub use transport::{Connector, Duplex, TcpConnector, Transport};
pub use pipe::{new_pipe, DeviceEnd, PipeConnector};
pub use config::{BootWaitMode, LinkConfig, DEFAULT_PORT};
