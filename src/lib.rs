//! # shallot
//!
//! An onion-model middleware core for async HTTP services.
//!
//! A shallot application is an ordered list of middleware. Each one gets the
//! request [`Context`] and a [`Next`](middleware::Next) handle, does some
//! work, awaits the rest of the pipeline, then does more work on the way
//! out. Whatever the response looks like when the last layer returns is
//! written to the wire exactly once.
//!
//! What the core owns:
//!
//! - **Composition**: the onion, with a runtime guard against calling `next`
//!   twice
//! - **Context**: request and response facades, per-request state, proxy
//!   trust, cookies and content negotiation
//! - **Finalization**: status-dependent body handling, `HEAD`, JSON encoding,
//!   streaming
//! - **Error recovery**: any error or panic becomes one plain-text response
//!   and one event on the application's error sink
//!
//! What it leaves out: routing, templating, body parsing, concrete business
//! middleware. Those are middleware.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use shallot::{App, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     App::new()
//!         // x-response-time
//!         .use_fn(|ctx, next| Box::pin(async move {
//!             let start = std::time::Instant::now();
//!             next.run(ctx).await?;
//!             let ms = format!("{}ms", start.elapsed().as_millis());
//!             ctx.set("x-response-time", &ms)?;
//!             Ok(())
//!         }))
//!         // response
//!         .use_fn(|ctx, _next| Box::pin(async move {
//!             if ctx.path() == "/private" {
//!                 return ctx.throw(403, "members only");
//!             }
//!             ctx.set_body("Hello World");
//!             Ok(())
//!         }))
//!         .listen("0.0.0.0:3000")
//!         .await
//! }
//! ```

mod application;
mod body;
mod config;
mod context;
mod cookies;
mod error;
mod fresh;
mod handler;
mod negotiate;
mod proxy;
mod request;
mod respond;
mod response;
mod server;
mod sink;
mod transport;

pub mod middleware;
pub mod status;

pub use application::{App, Application};
pub use body::{Body, BodyStream, RequestBody, ResponseBody};
pub use config::Config;
pub use context::{Context, State};
pub use cookies::{Cookie, CookieJar, SameSite};
pub use error::{BoxError, Error, HttpError, Result};
pub use handler::RequestHandler;
pub use negotiate::{AcceptHeader, Negotiator};
pub use proxy::{ForwardedFor, IpResolver};
pub use request::Request;
pub use response::{ContentType, Response};
pub use server::Server;
pub use sink::{ErrorEvent, ErrorListener, ErrorSink, LogErrors};
pub use transport::{Payload, RawRequest, RawResponse};
