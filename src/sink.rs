//! Application-wide error sink.
//!
//! Every error that reaches the request coordinator is broadcast here before
//! any recovery is attempted, so monitoring sees it whatever ends up on the
//! wire. Listeners are registered on the [`App`](crate::App). With none
//! registered, [`LogErrors`] is installed.

use std::error::Error as _;
use std::sync::Arc;

use tracing::{debug, error};

use crate::context::Context;
use crate::error::Error;

/// One emitted error.
pub struct ErrorEvent<'a> {
    pub error: &'a Error,
    /// The request the error belongs to. `None` when the request was already
    /// torn down, e.g. a connection dropped mid-pipeline.
    pub context: Option<&'a Context>,
    /// Headers were already flushed (or the connection is gone), so no error
    /// response could be written.
    pub header_sent: bool,
}

/// Receives emitted errors.
pub trait ErrorListener: Send + Sync + 'static {
    fn on_error(&self, event: &ErrorEvent<'_>);
}

impl<F> ErrorListener for F
where
    F: Fn(&ErrorEvent<'_>) + Send + Sync + 'static,
{
    fn on_error(&self, event: &ErrorEvent<'_>) {
        self(event)
    }
}

/// Broadcasts errors to its listeners in registration order.
#[derive(Clone, Default)]
pub struct ErrorSink {
    listeners: Vec<Arc<dyn ErrorListener>>,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listener: Arc<dyn ErrorListener>) {
        self.listeners.push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn emit(&self, event: &ErrorEvent<'_>) {
        for listener in &self.listeners {
            listener.on_error(event);
        }
    }
}

/// The default listener: logs the error and its source chain.
///
/// Quiet for 404s, for errors whose message is exposed to the client, and
/// when the application is configured silent. A client hanging up is logged
/// at debug level only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogErrors {
    silent: bool,
}

impl LogErrors {
    pub fn new(silent: bool) -> Self {
        Self { silent }
    }

    pub(crate) fn should_log(&self, err: &Error) -> bool {
        !(self.silent || err.status() == 404 || err.expose() || matches!(err, Error::Aborted))
    }
}

impl ErrorListener for LogErrors {
    fn on_error(&self, event: &ErrorEvent<'_>) {
        if matches!(event.error, Error::Aborted) {
            debug!(url = event.context.map(|ctx| ctx.original_url()), "client went away");
            return;
        }
        if !self.should_log(event.error) {
            return;
        }
        let url = event.context.map(|ctx| ctx.original_url());
        error!(
            error = %event.error,
            trace = %source_chain(event.error),
            status = event.error.status(),
            url,
            header_sent = event.header_sent,
            "unhandled error",
        );
    }
}

/// `err: cause: cause...`, one line.
fn source_chain(err: &Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
