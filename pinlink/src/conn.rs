//! Connection-based link.
//!
//! [`ConnectionLink`] drives one device over a byte-stream [`Transport`].
//! A single background task owns the read half: it decodes one frame at a
//! time and dispatches it to the registered listeners. Callers write
//! concurrently through a shared write half.
//!
//! Dispatch is synchronous with the reader, so a slow listener delays the
//! delivery of every following frame.

use crate::alp::AlpCodec;
use crate::codec::{Codec, Decoded, Inbound};
use crate::config::{BootWaitMode, LinkConfig};
use crate::listener::Listeners;
use crate::logger::{default_logger, Logger};
use crate::message_id::{Correlator, MessageIdCounter, RequestContext};
use crate::transport::{Connector, TcpConnector, Transport};
use crate::{
    log_debug, log_info, log_warn, AnalogPin, Command, CommandKind, ConnectionListener,
    ConnectionStatus, CustomListener, DigitalPin, EventListener, KeyPress, Link, LinkError,
    ListenerResult, Pin, ReplyEvent, ReplyListener, Request, Result, Tone,
};
use async_trait::async_trait;
use bytes::BytesMut;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const READ_BUF_SIZE: usize = 4096;
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_MALFORMED: usize = 16;

/// Connection state of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// The stream is healthy.
    Connected,
    /// The stream failed and the link is resynchronizing.
    Lost,
    /// The link is closed or has no way to reconnect.
    Disconnected,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LinkState::Connected => "connected",
            LinkState::Lost => "lost",
            LinkState::Disconnected => "disconnected",
        })
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Configures a [`ConnectionLink`] over an already opened transport.
pub struct ConnectionLinkBuilder {
    transport: Transport,
    codec: Arc<dyn Codec>,
    counter: MessageIdCounter,
    logger: Arc<dyn Logger>,
    connector: Option<Arc<dyn Connector>>,
    reconnect_delay: Duration,
    max_consecutive_malformed: usize,
}

impl ConnectionLinkBuilder {
    /// Sets the wire codec. Defaults to [`AlpCodec`].
    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Sets the message-id source. Defaults to the process-wide counter.
    pub fn counter(mut self, counter: MessageIdCounter) -> Self {
        self.counter = counter;
        self
    }

    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Enables reconnecting through `connector` after a stream failure.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Delay before each reconnect attempt.
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Malformed frames tolerated in a row before the stream counts as lost.
    pub fn max_consecutive_malformed(mut self, max: usize) -> Self {
        self.max_consecutive_malformed = max;
        self
    }

    /// Builds the link and starts its reader task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> ConnectionLink {
        let (reader, writer) = tokio::io::split(self.transport);
        let (ready, _) = watch::channel(false);
        let inner = Arc::new(Inner {
            codec: self.codec,
            correlator: Correlator::new(self.counter),
            listeners: Listeners::new(self.logger.clone()),
            logger: self.logger,
            writer: tokio::sync::Mutex::new(Some(writer)),
            state: parking_lot::Mutex::new(LinkState::Connected),
            ready,
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            connector: self.connector,
            reconnect_delay: self.reconnect_delay,
            max_consecutive_malformed: self.max_consecutive_malformed,
        });

        let handle = tokio::spawn(run_reader(inner.clone(), reader));

        ConnectionLink {
            inner,
            reader: parking_lot::Mutex::new(Some(handle)),
        }
    }
}

// =============================================================================
// ConnectionLink
// =============================================================================

/// A [`Link`] over a byte-stream transport.
pub struct ConnectionLink {
    inner: Arc<Inner>,
    reader: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    codec: Arc<dyn Codec>,
    correlator: Correlator,
    listeners: Listeners,
    logger: Arc<dyn Logger>,
    writer: tokio::sync::Mutex<Option<WriteHalf<Transport>>>,
    state: parking_lot::Mutex<LinkState>,
    /// Latched once the device announced it finished booting.
    ready: watch::Sender<bool>,
    closed: AtomicBool,
    shutdown: CancellationToken,
    connector: Option<Arc<dyn Connector>>,
    reconnect_delay: Duration,
    max_consecutive_malformed: usize,
}

impl ConnectionLink {
    /// Starts configuring a link over `transport`.
    pub fn builder(transport: Transport) -> ConnectionLinkBuilder {
        ConnectionLinkBuilder {
            transport,
            codec: Arc::new(AlpCodec::new()),
            counter: MessageIdCounter::process_wide(),
            logger: default_logger(),
            connector: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_consecutive_malformed: DEFAULT_MAX_MALFORMED,
        }
    }

    /// Opens a TCP link as described by `config`.
    ///
    /// Failing to reach the target is fatal. When a boot timeout is
    /// configured the device is awaited before returning; a device that does
    /// not report in time is logged, not treated as an error.
    pub async fn connect(config: &LinkConfig) -> Result<Self> {
        config.validate()?;
        let connector = Arc::new(TcpConnector::new(config.addr()));
        let transport = connector.connect().await?;

        let mut builder = Self::builder(transport)
            .reconnect_delay(config.reconnect_delay())
            .max_consecutive_malformed(config.max_malformed);
        if config.reconnect {
            builder = builder.connector(connector);
        }
        let link = builder.build();
        log_info!(link.inner.logger, "connected to tcp://{}", config.addr());

        if let Some(timeout) = config.boot_timeout() {
            if !link.wait_for_boot_with(timeout, config.boot_wait).await? {
                log_warn!(
                    link.inner.logger,
                    "device at {} did not report boot within {:?}",
                    config.addr(),
                    timeout
                );
            }
        }
        Ok(link)
    }

    /// Parses `uri` with [`LinkConfig::from_uri`] and connects.
    pub async fn connect_uri(uri: &str) -> Result<Self> {
        Self::connect(&LinkConfig::from_uri(uri)?).await
    }

    /// Returns the current connection state.
    pub fn state(&self) -> LinkState {
        *self.inner.state.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Returns true once the device's ready marker has been seen.
    pub fn ready_seen(&self) -> bool {
        *self.inner.ready.borrow()
    }

    /// Allocates an id and reserves it in `ctx` for the next
    /// [`send_command`](Self::send_command) with the same context.
    pub fn reserve_next_id(&self, ctx: &mut RequestContext) -> u64 {
        self.inner.correlator.reserve_next_id(ctx)
    }

    /// Sends one command, tagging it with a message id while reply
    /// listeners are registered. Consumes any id reserved in `ctx`.
    pub async fn send_command(&self, command: Command, ctx: &mut RequestContext) -> Result<()> {
        if self.inner.is_closed() {
            return Err(LinkError::Closed);
        }
        let kind = command.kind();
        if !self.inner.codec.supports(kind) {
            return Err(LinkError::Unsupported(kind));
        }
        let request = self.inner.correlator.attach_if_needed(
            Request::new(command),
            ctx,
            self.inner.listeners.has_reply_listeners(),
        );
        self.inner.write_request(&request).await
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.send_command(command, &mut RequestContext::new()).await
    }

    async fn probe(&self, timeout: Duration) -> Result<bool> {
        let mut ctx = RequestContext::new();
        let id = self.reserve_next_id(&mut ctx);

        let (tx, rx) = oneshot::channel();
        // Registered before sending so the probe is tagged with `id`.
        let _waiter = WaiterGuard::register(
            &self.inner.listeners,
            Arc::new(ReplyWaiter {
                id,
                tx: parking_lot::Mutex::new(Some(tx)),
            }),
        );

        self.send_command(Command::NoTone(AnalogPin(0)), &mut ctx).await?;
        log_debug!(self.inner.logger, "boot probe #{} sent", id);

        let replied = tokio::select! {
            res = tokio::time::timeout(timeout, rx) => matches!(res, Ok(Ok(()))),
            _ = self.inner.shutdown.cancelled() => false,
        };
        Ok(replied)
    }

    async fn wait_ready(&self, timeout: Duration) -> bool {
        let mut rx = self.inner.ready.subscribe();
        tokio::select! {
            res = tokio::time::timeout(timeout, rx.wait_for(|ready| *ready)) => {
                matches!(res, Ok(Ok(_)))
            }
            _ = self.inner.shutdown.cancelled() => *self.inner.ready.borrow(),
        }
    }
}

impl Drop for ConnectionLink {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

/// Completes a boot probe when the reply with its id arrives.
struct ReplyWaiter {
    id: u64,
    tx: parking_lot::Mutex<Option<oneshot::Sender<()>>>,
}

/// Keeps a reply waiter registered for as long as the probe runs.
struct WaiterGuard<'a> {
    listeners: &'a Listeners,
    waiter: Arc<dyn ReplyListener>,
}

impl<'a> WaiterGuard<'a> {
    fn register(listeners: &'a Listeners, waiter: Arc<dyn ReplyListener>) -> Self {
        listeners.add_reply_listener(waiter.clone());
        Self { listeners, waiter }
    }
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.listeners.remove_reply_listener(&self.waiter);
    }
}

impl ReplyListener for ReplyWaiter {
    fn reply_received(&self, event: &ReplyEvent) -> ListenerResult {
        if event.id == self.id {
            if let Some(tx) = self.tx.lock().take() {
                let _ = tx.send(());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Link for ConnectionLink {
    async fn switch_digital_pin(&self, pin: DigitalPin, value: bool) -> Result<()> {
        self.send(Command::SwitchDigitalPin { pin, value }).await
    }

    async fn switch_analog_pin(&self, pin: AnalogPin, value: i32) -> Result<()> {
        self.send(Command::SwitchAnalogPin { pin, value }).await
    }

    async fn start_listening(&self, pin: Pin) -> Result<()> {
        self.send(Command::StartListening(pin)).await
    }

    async fn stop_listening(&self, pin: Pin) -> Result<()> {
        self.send(Command::StopListening(pin)).await
    }

    async fn send_custom_message(&self, parts: &[&str]) -> Result<()> {
        self.send(Command::custom(parts.iter().copied())).await
    }

    async fn send_tone(&self, tone: Tone) -> Result<()> {
        self.send(Command::Tone(tone)).await
    }

    async fn send_no_tone(&self, pin: AnalogPin) -> Result<()> {
        self.send(Command::NoTone(pin)).await
    }

    async fn send_key_press_event(&self, key: KeyPress) -> Result<()> {
        self.send(Command::KeyPress(key)).await
    }

    fn supports(&self, kind: CommandKind) -> bool {
        self.inner.codec.supports(kind)
    }

    async fn wait_for_boot_with(&self, timeout: Duration, mode: BootWaitMode) -> Result<bool> {
        match mode {
            BootWaitMode::Probe => self.probe(timeout).await,
            BootWaitMode::ReadyMessageOnly => Ok(self.wait_ready(timeout).await),
        }
    }

    async fn add_listener(&self, listener: Arc<dyn EventListener>) -> Result<()> {
        let Some(pin) = self.inner.listeners.add_event_listener(listener.clone()) else {
            return Ok(());
        };
        if self.inner.is_closed() {
            return Ok(());
        }
        let Err(e) = self.start_listening(pin).await else {
            return Ok(());
        };

        self.inner.listeners.remove_event_listener(&listener);
        // Listeners added for the same pin in the meantime skipped activation.
        if self.inner.listeners.is_watching(pin) && !self.inner.is_closed() {
            if let Err(retry) = self.start_listening(pin).await {
                log_warn!(
                    self.inner.logger,
                    "start listening on {} failed again: {}",
                    pin,
                    retry
                );
            }
        }
        Err(e)
    }

    async fn remove_listener(&self, listener: &Arc<dyn EventListener>) -> Result<()> {
        match self.inner.listeners.remove_event_listener(listener) {
            Some(pin) if !self.inner.is_closed() => self.stop_listening(pin).await,
            _ => Ok(()),
        }
    }

    fn add_reply_listener(&self, listener: Arc<dyn ReplyListener>) {
        self.inner.listeners.add_reply_listener(listener);
    }

    fn remove_reply_listener(&self, listener: &Arc<dyn ReplyListener>) -> bool {
        self.inner.listeners.remove_reply_listener(listener)
    }

    fn add_custom_listener(&self, listener: Arc<dyn CustomListener>) {
        self.inner.listeners.add_custom_listener(listener);
    }

    fn remove_custom_listener(&self, listener: &Arc<dyn CustomListener>) -> bool {
        self.inner.listeners.remove_custom_listener(listener)
    }

    fn add_connection_listener(&self, listener: Arc<dyn ConnectionListener>) {
        self.inner.listeners.add_connection_listener(listener);
    }

    fn remove_connection_listener(&self, listener: &Arc<dyn ConnectionListener>) -> bool {
        self.inner.listeners.remove_connection_listener(listener)
    }

    async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Pins are released on the device before the stream goes away.
        let pins = self.inner.listeners.deregister_all_event_listeners();
        if self.inner.codec.supports(CommandKind::StopListening) {
            for pin in pins {
                let request = Request::new(Command::StopListening(pin));
                if let Err(e) = self.inner.write_request(&request).await {
                    log_warn!(self.inner.logger, "stop listening on {} failed: {}", pin, e);
                }
            }
        }

        self.inner.shutdown.cancel();
        if let Some(mut writer) = self.inner.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                log_debug!(self.inner.logger, "writer shutdown: {}", e);
            }
        }
        *self.inner.state.lock() = LinkState::Disconnected;

        let handle = self.reader.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log_warn!(self.inner.logger, "reader task failed: {}", e);
            }
        }
        log_info!(self.inner.logger, "link closed");
        Ok(())
    }
}

// =============================================================================
// Inner
// =============================================================================

impl Inner {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn write_request(&self, request: &Request) -> Result<()> {
        let mut frame = BytesMut::new();
        self.codec.encode(request, &mut frame)?;

        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| LinkError::Io("link disconnected".to_string()))?;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }

    fn dispatch(&self, msg: Inbound) {
        match msg {
            Inbound::PinValueChanged(event) => self.listeners.fire_state_changed(&event),
            Inbound::Reply(event) => self.listeners.fire_reply_received(&event),
            Inbound::Custom(event) => self.listeners.fire_custom_received(&event),
            Inbound::Ready => {
                if !self.ready.send_replace(true) {
                    log_info!(self.logger, "device ready");
                }
            }
        }
    }

    /// Connected -> Lost. Fires once per failure episode.
    fn lose(&self, reason: &str) {
        if self.is_closed() {
            return;
        }
        let changed = {
            let mut state = self.state.lock();
            if *state == LinkState::Connected {
                *state = LinkState::Lost;
                true
            } else {
                false
            }
        };
        if changed {
            log_warn!(self.logger, "connection lost: {}", reason);
            self.listeners.fire_connection_status(ConnectionStatus::Lost);
        }
    }

    /// Lost -> Connected. Fires once per failure episode.
    fn recovered(&self) {
        let changed = {
            let mut state = self.state.lock();
            if *state == LinkState::Lost {
                *state = LinkState::Connected;
                true
            } else {
                false
            }
        };
        if changed {
            log_info!(self.logger, "connection recovered");
            self.listeners
                .fire_connection_status(ConnectionStatus::Connected);
        }
    }

    /// Redials until a new transport is up. Returns its read half, or `None`
    /// when the link shuts down or cannot reconnect.
    async fn reconnect(&self) -> Option<ReadHalf<Transport>> {
        let Some(connector) = self.connector.clone() else {
            log_info!(self.logger, "no connector configured, giving up");
            *self.state.lock() = LinkState::Disconnected;
            self.writer.lock().await.take();
            self.shutdown.cancel();
            return None;
        };

        let mut attempt = 0u32;
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
            attempt += 1;

            let connected = tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                res = connector.connect() => res,
            };
            match connected {
                Ok(transport) => {
                    let (reader, writer) = tokio::io::split(transport);
                    let mut guard = self.writer.lock().await;
                    if self.is_closed() {
                        return None;
                    }
                    *guard = Some(writer);
                    log_info!(
                        self.logger,
                        "reconnected to {} after {} attempt(s)",
                        connector.target(),
                        attempt
                    );
                    return Some(reader);
                }
                Err(e) => {
                    log_warn!(
                        self.logger,
                        "reconnect #{} to {} failed: {}",
                        attempt,
                        connector.target(),
                        e
                    );
                }
            }
        }
    }
}

// =============================================================================
// Reader loop
// =============================================================================

async fn run_reader(inner: Arc<Inner>, mut reader: ReadHalf<Transport>) {
    let mut buf = BytesMut::with_capacity(READ_BUF_SIZE);
    let mut malformed = 0usize;
    // Set after a reconnect; the first bytes read end the episode.
    let mut awaiting_first_read = false;

    loop {
        loop {
            match inner.codec.decode(&mut buf) {
                Decoded::NeedMore => break,
                Decoded::Frame(msg) => {
                    malformed = 0;
                    inner.recovered();
                    inner.dispatch(msg);
                }
                Decoded::Unrecognized(frame) => {
                    malformed += 1;
                    log_warn!(inner.logger, "skipping unrecognized frame: {:?}", frame);
                    if malformed > inner.max_consecutive_malformed {
                        inner.lose("too many malformed frames in a row");
                    }
                }
            }
        }

        let read = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            res = reader.read_buf(&mut buf) => res,
        };

        let reason = match read {
            Ok(0) => "end of stream".to_string(),
            Ok(_) => {
                if awaiting_first_read {
                    awaiting_first_read = false;
                    inner.recovered();
                }
                continue;
            }
            Err(e) => e.to_string(),
        };

        if inner.is_closed() {
            break;
        }
        inner.lose(&reason);
        buf.clear();
        malformed = 0;

        match inner.reconnect().await {
            Some(next) => {
                reader = next;
                awaiting_first_read = true;
            }
            None => break,
        }
    }

    log_debug!(inner.logger, "reader stopped");
}
