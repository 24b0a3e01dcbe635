//! Minimal shallot example: logging, timing, error handling and a few
//! hand-dispatched endpoints.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/
//!   curl -i http://localhost:3000/users/42
//!   curl -i -H 'accept: application/json' http://localhost:3000/users/42
//!   curl -i http://localhost:3000/admin
//!   curl -I http://localhost:3000/users/42
//!   curl -i http://localhost:3000/nowhere

use std::time::Instant;

use serde_json::json;
use shallot::middleware::{BoxFuture, Middleware, Next};
use shallot::{App, Config, Context, ErrorEvent, Result};
use tracing::info;

/// Logs one line per request on the way out.
struct AccessLog;

impl Middleware for AccessLog {
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let start = Instant::now();
            let outcome = next.run(ctx).await;
            info!(
                method = %ctx.method(),
                url = ctx.original_url(),
                status = ctx.status().as_u16(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "request",
            );
            outcome
        })
    }

    fn name(&self) -> &str {
        "access_log"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;

    App::with_config(config)
        .on_error(|event: &ErrorEvent<'_>| {
            tracing::error!(error = %event.error, status = event.error.status(), "request failed");
        })
        .with(AccessLog)
        .use_fn(|ctx, next| Box::pin(async move {
            let start = Instant::now();
            next.run(ctx).await?;
            let ms = format!("{}ms", start.elapsed().as_millis());
            ctx.set("x-response-time", &ms)?;
            Ok(())
        }))
        .use_fn(|ctx, next| Box::pin(async move {
            if ctx.path() == "/admin" {
                return ctx.throw(401, "login first");
            }
            next.run(ctx).await
        }))
        .use_fn(|ctx, _next| Box::pin(async move {
            let path = ctx.path().to_owned();
            match path.as_str() {
                "/" => ctx.set_body("<h1>Hello from shallot</h1>"),
                p if p.starts_with("/users/") => {
                    let id = p.trim_start_matches("/users/").to_owned();
                    if ctx.accepts(&["text/plain", "application/json"]) == Some("application/json") {
                        ctx.set_body(json!({ "id": id, "name": "alice" }));
                    } else {
                        ctx.set_body(format!("user {id}"));
                    }
                }
                // Anything else stays 404.
                _ => {}
            }
            Ok(())
        }))
        .listen("0.0.0.0:3000")
        .await
}
