//! Logger port used by the client to report host-facing events.

use std::error::Error;

// =============================================================================
// Service Trait for Dependency Injection
// =============================================================================

/// Sink for the client's informational, severe and exceptional reports.
///
/// Implementations are fire-and-forget and must never panic. The client
/// shares one logger across its engine task and every caller of
/// `write`/`disconnect`, hence the `Send + Sync` bound.
pub trait Logger: Send + Sync {
    /// Report a routine event (connected, disconnecting, reconnecting).
    fn info(&self, msg: &str);

    /// Report a failure the host should notice.
    fn severe(&self, msg: &str);

    /// Report an error value that was absorbed rather than propagated.
    fn exception(&self, err: &(dyn Error + 'static));
}

/// Default logger that forwards to `tracing`.
///
/// Nothing is printed unless the host installs a `tracing` subscriber, as
/// the `jsonlink` binary does with `tracing_subscriber::fmt`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, msg: &str) {
        tracing::info!("{}", msg);
    }

    fn severe(&self, msg: &str) {
        tracing::error!("{}", msg);
    }

    fn exception(&self, err: &(dyn Error + 'static)) {
        tracing::warn!("{}", error_chain(err));
    }
}

/// Render an error and its sources as `outer: inner: root`.
///
/// A source whose message the outer error already ends with is not
/// repeated.
pub fn error_chain(err: &(dyn Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let message = cause.to_string();
        if !rendered.ends_with(&message) {
            rendered.push_str(": ");
            rendered.push_str(&message);
        }
        source = cause.source();
    }
    rendered
}
