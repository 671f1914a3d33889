//! Injected log capability.
//!
//! Bridge devices and displays report human-readable diagnostics (device
//! opened, bus reset, page write failed, ...) through a [`LogSink`] handed to
//! them at construction. The default sink discards everything; nothing in the
//! library writes to a global logger on its own behalf.

use std::sync::Arc;

/// Receiver for diagnostic messages.
pub trait LogSink: Send + Sync {
    /// Emit one message.
    fn emit(&self, message: &str);
}

/// Sink that drops every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl LogSink for NoopSink {
    fn emit(&self, _message: &str) {}
}

/// Sink that forwards messages to `tracing` at INFO level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, message: &str) {
        tracing::info!("{}", message);
    }
}

impl<F> LogSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn emit(&self, message: &str) {
        self(message)
    }
}

/// Shared handle to a sink.
pub type SharedSink = Arc<dyn LogSink>;

/// The default sink.
pub fn noop() -> SharedSink {
    Arc::new(NoopSink)
}
