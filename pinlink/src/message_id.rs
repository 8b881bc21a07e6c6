//! Message-id allocation and request tagging.
//!
//! Correlation is opt-in and tied to listener presence: a request is only
//! tagged with an id while at least one reply listener is registered.
//! Untagged traffic pays nothing.

use crate::Request;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Shared, monotonically increasing id source.
///
/// Cloning shares the counter. Every link built with the default counter
/// uses [`MessageIdCounter::process_wide`], so no two links in a process
/// hand out the same id.
#[derive(Debug, Clone)]
pub struct MessageIdCounter {
    next: Arc<AtomicU64>,
}

impl MessageIdCounter {
    /// Creates an isolated counter whose first id is 1.
    pub fn new() -> Self {
        Self {
            next: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Returns the counter shared by the whole process.
    pub fn process_wide() -> Self {
        static PROCESS_WIDE: OnceLock<MessageIdCounter> = OnceLock::new();
        PROCESS_WIDE.get_or_init(MessageIdCounter::new).clone()
    }

    /// Allocates the next id.
    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for MessageIdCounter {
    fn default() -> Self {
        Self::process_wide()
    }
}

/// Per-request slot for an id reserved ahead of sending.
///
/// Reserve an id when you need it before the request goes out, e.g. to
/// register a matching reply waiter first. The next
/// [`Correlator::attach_if_needed`] with the same context consumes it.
#[derive(Debug, Default)]
pub struct RequestContext {
    reserved: Option<u64>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the reserved id, if any.
    pub fn reserved(&self) -> Option<u64> {
        self.reserved
    }
}

/// Allocates ids and tags outgoing requests.
#[derive(Debug, Clone, Default)]
pub struct Correlator {
    counter: MessageIdCounter,
}

impl Correlator {
    pub fn new(counter: MessageIdCounter) -> Self {
        Self { counter }
    }

    /// Allocates an id and reserves it in `ctx` for the next request.
    ///
    /// An earlier unconsumed reservation in the same context is discarded.
    pub fn reserve_next_id(&self, ctx: &mut RequestContext) -> u64 {
        let id = self.counter.next_id();
        ctx.reserved = Some(id);
        id
    }

    /// Tags `request` with a message id if replies are being watched.
    ///
    /// The reservation in `ctx` is always consumed. With no reply listener
    /// the request is returned unchanged; otherwise it carries the reserved
    /// id, or a freshly allocated one when nothing was reserved.
    pub fn attach_if_needed(
        &self,
        request: Request,
        ctx: &mut RequestContext,
        replies_watched: bool,
    ) -> Request {
        let reserved = ctx.reserved.take();
        if !replies_watched {
            return request;
        }
        let id = reserved.unwrap_or_else(|| self.counter.next_id());
        request.with_message_id(id)
    }
}
