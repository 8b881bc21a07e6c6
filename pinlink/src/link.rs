//! The Link contract exposed to bindings and adapters.

use crate::{
    AnalogPin, BootWaitMode, CommandKind, ConnectionListener, CustomListener, DigitalPin,
    EventListener, KeyPress, Pin, ReplyListener, Result, Tone,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// One logical connection to a controlled device.
///
/// Transport operations fail with [`LinkError::Closed`](crate::LinkError::Closed)
/// after [`close`](Link::close), and with
/// [`LinkError::Unsupported`](crate::LinkError::Unsupported) when
/// [`supports`](Link::supports) is false for the command.
#[async_trait]
pub trait Link: Send + Sync {
    // --- Pin Commands ---

    async fn switch_digital_pin(&self, pin: DigitalPin, value: bool) -> Result<()>;

    async fn switch_analog_pin(&self, pin: AnalogPin, value: i32) -> Result<()>;

    /// Asks the device to start reporting changes of `pin`.
    async fn start_listening(&self, pin: Pin) -> Result<()>;

    /// Asks the device to stop reporting changes of `pin`.
    async fn stop_listening(&self, pin: Pin) -> Result<()>;

    // --- Other Commands ---

    async fn send_custom_message(&self, parts: &[&str]) -> Result<()>;

    async fn send_tone(&self, tone: Tone) -> Result<()>;

    async fn send_no_tone(&self, pin: AnalogPin) -> Result<()>;

    async fn send_key_press_event(&self, key: KeyPress) -> Result<()>;

    /// Returns true if this link can send commands of `kind`.
    fn supports(&self, kind: CommandKind) -> bool;

    // --- Boot ---

    /// Waits up to `timeout` for the device to boot.
    ///
    /// Returns `Ok(false)` on timeout or when the link shuts down first.
    /// Errors only if a probe could not be sent.
    async fn wait_for_boot_with(&self, timeout: Duration, mode: BootWaitMode) -> Result<bool>;

    /// Waits for the device to boot using [`BootWaitMode::Probe`].
    async fn wait_for_boot(&self, timeout: Duration) -> Result<bool> {
        self.wait_for_boot_with(timeout, BootWaitMode::Probe).await
    }

    // --- Listeners ---

    /// Registers an event listener. A pin-filtered listener that is the first
    /// one for its pin starts listening on the device. On a closed link the
    /// listener is only recorded.
    async fn add_listener(&self, listener: Arc<dyn EventListener>) -> Result<()>;

    /// Unregisters one entry of an event listener. Removing the last
    /// listener of a pin stops listening on the device.
    async fn remove_listener(&self, listener: &Arc<dyn EventListener>) -> Result<()>;

    fn add_reply_listener(&self, listener: Arc<dyn ReplyListener>);

    fn remove_reply_listener(&self, listener: &Arc<dyn ReplyListener>) -> bool;

    fn add_custom_listener(&self, listener: Arc<dyn CustomListener>);

    fn remove_custom_listener(&self, listener: &Arc<dyn CustomListener>) -> bool;

    fn add_connection_listener(&self, listener: Arc<dyn ConnectionListener>);

    fn remove_connection_listener(&self, listener: &Arc<dyn ConnectionListener>) -> bool;

    /// Releases the link. Repeated calls are no-ops.
    async fn close(&self) -> Result<()>;
}
