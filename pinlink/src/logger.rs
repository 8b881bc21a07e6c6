//! Logging interface for pinlink.
//!
//! Provides a `Logger` trait and a default implementation using the `tracing` crate.

use std::sync::Arc;

/// Logger interface for pinlink components.
///
/// Links accept a `Logger` for diagnostic output from the reader loop and the
/// listener dispatcher. The default implementation forwards to `tracing`.
pub trait Logger: Send + Sync {
    fn error(&self, msg: &str);
    fn warn(&self, msg: &str);
    fn info(&self, msg: &str);
    fn debug(&self, msg: &str);
}

/// Returns the default logger that uses the `tracing` crate.
pub fn default_logger() -> Arc<dyn Logger> {
    Arc::new(TracingLogger)
}

/// Default logger implementation using `tracing`.
struct TracingLogger;

impl Logger for TracingLogger {
    fn error(&self, msg: &str) {
        tracing::error!("pinlink: {}", msg);
    }

    fn warn(&self, msg: &str) {
        tracing::warn!("pinlink: {}", msg);
    }

    fn info(&self, msg: &str) {
        tracing::info!("pinlink: {}", msg);
    }

    fn debug(&self, msg: &str) {
        tracing::debug!("pinlink: {}", msg);
    }
}

/// No-op logger that discards all messages.
pub struct NopLogger;

impl Logger for NopLogger {
    fn error(&self, _msg: &str) {}
    fn warn(&self, _msg: &str) {}
    fn info(&self, _msg: &str) {}
    fn debug(&self, _msg: &str) {}
}

/// Convenience macro for formatted error logging.
#[macro_export]
macro_rules! log_error {
    ($logger:expr, $($arg:tt)*) => {
        $logger.error(&format!($($arg)*))
    };
}

/// Convenience macro for formatted warn logging.
#[macro_export]
macro_rules! log_warn {
    ($logger:expr, $($arg:tt)*) => {
        $logger.warn(&format!($($arg)*))
    };
}

/// Convenience macro for formatted info logging.
#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)*) => {
        $logger.info(&format!($($arg)*))
    };
}

/// Convenience macro for formatted debug logging.
#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($arg:tt)*) => {
        $logger.debug(&format!($($arg)*))
    };
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Records every message so tests can assert on what was logged.
    #[derive(Default)]
    pub(crate) struct CapturingLogger {
        messages: Mutex<Vec<(String, String)>>,
    }

    impl CapturingLogger {
        pub(crate) fn messages(&self) -> Vec<(String, String)> {
            self.messages.lock().clone()
        }

        pub(crate) fn count(&self, level: &str) -> usize {
            self.messages.lock().iter().filter(|(l, _)| l == level).count()
        }
    }

    impl Logger for CapturingLogger {
        fn error(&self, msg: &str) {
            self.messages.lock().push(("error".to_string(), msg.to_string()));
        }
        fn warn(&self, msg: &str) {
            self.messages.lock().push(("warn".to_string(), msg.to_string()));
        }
        fn info(&self, msg: &str) {
            self.messages.lock().push(("info".to_string(), msg.to_string()));
        }
        fn debug(&self, msg: &str) {
            self.messages.lock().push(("debug".to_string(), msg.to_string()));
        }
    }

    #[test]
    fn test_capturing_logger() {
        let logger = CapturingLogger::default();
        log_error!(logger, "listener {} failed", 3);
        log_warn!(logger, "malformed frame");
        log_info!(logger, "connected to {}", "127.0.0.1:4478");
        log_debug!(logger, "frame len={}", 12);

        let msgs = logger.messages();
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0], ("error".to_string(), "listener 3 failed".to_string()));
        assert_eq!(msgs[2], ("info".to_string(), "connected to 127.0.0.1:4478".to_string()));
        assert_eq!(logger.count("debug"), 1);
    }

    #[test]
    fn test_nop_logger() {
        let logger = NopLogger;
        logger.error("should not panic");
        logger.warn("should not panic");
        logger.info("should not panic");
        logger.debug("should not panic");
    }

    #[test]
    fn test_default_logger() {
        let logger = default_logger();
        logger.info("test default logger");
    }
}
