//! In-memory transport for testing.
//!
//! [`new_pipe`] returns the link side of a duplex pipe together with a
//! [`DeviceEnd`] that plays the microcontroller: it reads the lines the link
//! writes and sends lines back.

use crate::transport::{Connector, Transport};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use tokio::io::{
    AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf,
};

const PIPE_CAPACITY: usize = 64 * 1024;

/// Creates a connected pair: the transport for a link and the device side.
pub fn new_pipe() -> (Transport, DeviceEnd) {
    let (link_side, device_side) = tokio::io::duplex(PIPE_CAPACITY);
    let (reader, writer) = tokio::io::split(device_side);
    let device = DeviceEnd {
        reader: BufReader::new(reader),
        writer,
    };
    (Box::new(link_side), device)
}

/// Device side of a pipe.
pub struct DeviceEnd {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl DeviceEnd {
    /// Sends one line; the terminator is appended.
    pub async fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    /// Sends raw bytes without framing.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await
    }

    /// Receives the next line written by the link, without its terminator.
    /// Returns `Ok(None)` once the link closed its side.
    pub async fn recv_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }

    /// Closes the device side. The link sees end of stream.
    pub async fn close(mut self) -> io::Result<()> {
        self.writer.shutdown().await
    }
}

/// Hands out queued pipes, standing in for a device that can be redialed.
#[derive(Default)]
pub struct PipeConnector {
    pending: Mutex<VecDeque<Transport>>,
}

impl PipeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a pipe for the next `connect` and returns its device side.
    pub fn push(&self) -> DeviceEnd {
        let (transport, device) = new_pipe();
        self.pending.lock().push_back(transport);
        device
    }
}

#[async_trait]
impl Connector for PipeConnector {
    async fn connect(&self) -> io::Result<Transport> {
        self.pending.lock().pop_front().ok_or_else(|| {
            io::Error::new(io::ErrorKind::ConnectionRefused, "no pipe queued")
        })
    }

    fn target(&self) -> String {
        "pipe".to_string()
    }
}
