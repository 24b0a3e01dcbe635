//! The application shell.
//!
//! [`App`] is the builder: register middleware, error listeners and
//! collaborators, then freeze everything with [`App::callback`] into a
//! [`RequestHandler`] the transport can drive. Registration consumes the
//! builder, so the pipeline can't change once requests are flowing.
//!
//! [`Application`] is the frozen, shared part: configuration, the app-level
//! extension values every context can read, the negotiation and address
//! collaborators and the error sink. It is reference counted and never
//! copied per request.
//!
//! ```rust,no_run
//! use shallot::App;
//!
//! #[tokio::main]
//! async fn main() -> shallot::Result<()> {
//!     App::new()
//!         .use_fn(|ctx, _next| Box::pin(async move {
//!             ctx.set_body("Hello World");
//!             Ok(())
//!         }))
//!         .listen("0.0.0.0:3000")
//!         .await
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use http::Extensions;
use serde_json::json;
use tracing::debug;

use crate::config::Config;
use crate::context::Context;
use crate::error::Result;
use crate::handler::RequestHandler;
use crate::middleware::{compose, from_fn, BoxFuture, BoxedMiddleware, Middleware, Next};
use crate::negotiate::{AcceptHeader, Negotiator};
use crate::proxy::{ForwardedFor, IpResolver};
use crate::server::Server;
use crate::sink::{ErrorListener, ErrorSink, LogErrors};
use crate::transport::{RawRequest, RawResponse};

// ── Builder ───────────────────────────────────────────────────────────────────

pub struct App {
    config: Config,
    middleware: Vec<BoxedMiddleware>,
    sink: ErrorSink,
    extensions: Extensions,
    negotiator: Arc<dyn Negotiator>,
    ip_resolver: Arc<dyn IpResolver>,
}

impl App {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            middleware: Vec::new(),
            sink: ErrorSink::new(),
            extensions: Extensions::new(),
            negotiator: Arc::new(AcceptHeader),
            ip_resolver: Arc::new(ForwardedFor),
        }
    }

    pub fn config(&self) -> &Config { &self.config }

    /// Appends `middleware` to the pipeline.
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        debug!(middleware = middleware.name(), "use");
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Appends a closure middleware. See [`from_fn`].
    pub fn use_fn<F>(self, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        self.with(from_fn(f))
    }

    /// Registers an error listener. Registering any listener replaces the
    /// default [`LogErrors`] one.
    pub fn on_error(mut self, listener: impl ErrorListener) -> Self {
        self.sink.add(Arc::new(listener));
        self
    }

    /// Adds an app-wide value readable from every request through
    /// [`Application::extension`].
    pub fn extension<T: Clone + Send + Sync + 'static>(mut self, value: T) -> Self {
        self.extensions.insert(value);
        self
    }

    pub fn negotiator(mut self, negotiator: impl Negotiator) -> Self {
        self.negotiator = Arc::new(negotiator);
        self
    }

    pub fn ip_resolver(mut self, resolver: impl IpResolver) -> Self {
        self.ip_resolver = Arc::new(resolver);
        self
    }

    /// Freezes the application into a request handler.
    pub fn callback(mut self) -> RequestHandler {
        if self.sink.listener_count() == 0 {
            self.sink.add(Arc::new(LogErrors::new(self.config.silent)));
        }
        let pipeline = compose(std::mem::take(&mut self.middleware));
        debug!(middleware = pipeline.len(), "pipeline composed");
        RequestHandler::new(self.into_application(), pipeline)
    }

    /// Binds `addr` and serves until a shutdown signal.
    pub async fn listen(self, addr: &str) -> Result<()> {
        Server::bind(addr)?.serve(self.callback()).await
    }

    pub(crate) fn into_application(self) -> Arc<Application> {
        Arc::new(Application {
            config: self.config,
            extensions: self.extensions,
            negotiator: self.negotiator,
            ip_resolver: self.ip_resolver,
            sink: self.sink,
        })
    }

    /// The public settings: `subdomainOffset`, `proxy` and `env`.
    pub fn to_json(&self) -> serde_json::Value {
        settings_json(&self.config)
    }
}

impl Default for App {
    fn default() -> Self { Self::new() }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("config", &self.config)
            .field("middleware", &self.middleware.iter().map(|m| m.name()).collect::<Vec<_>>())
            .field("listeners", &self.sink.listener_count())
            .finish()
    }
}

fn settings_json(config: &Config) -> serde_json::Value {
    json!({
        "subdomainOffset": config.subdomain_offset,
        "proxy": config.proxy,
        "env": config.env,
    })
}

// ── Frozen application ────────────────────────────────────────────────────────

/// Shared, immutable application state.
pub struct Application {
    config: Config,
    extensions: Extensions,
    negotiator: Arc<dyn Negotiator>,
    ip_resolver: Arc<dyn IpResolver>,
    sink: ErrorSink,
}

impl Application {
    pub fn config(&self) -> &Config { &self.config }

    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    pub fn negotiator(&self) -> &dyn Negotiator { self.negotiator.as_ref() }
    pub fn ip_resolver(&self) -> &dyn IpResolver { self.ip_resolver.as_ref() }
    pub(crate) fn sink(&self) -> &ErrorSink { &self.sink }

    /// Builds the per-request context around the transport handles.
    pub fn create_context(self: &Arc<Self>, req: RawRequest, res: RawResponse) -> Context {
        Context::new(req, res, Arc::clone(self))
    }

    pub fn to_json(&self) -> serde_json::Value {
        settings_json(&self.config)
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("config", &self.config)
            .field("listeners", &self.sink.listener_count())
            .finish()
    }
}
