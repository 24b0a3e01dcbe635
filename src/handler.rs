//! Request coordination.
//!
//! [`RequestHandler`] drives one request from raw transport handles to a
//! finished raw response:
//!
//! ```text
//! Pending ──▶ RunningPipeline ──ok──▶ Finalizing ──ok──▶ Done
//!                   │                      │
//!                   └──err──▶ Erroring ◀───┘ err
//!                                 │
//!                                 └──────────────────▶ Done
//! ```
//!
//! The status starts at 404, so a pipeline that never touches the response
//! answers "Not Found". Every error is reported to the application's error
//! sink, including requests whose connection went away mid-flight: dropping
//! the request future before `Done` emits [`Error::Aborted`].

use std::sync::Arc;

use http::StatusCode;
use tracing::{debug, debug_span, Instrument};

use crate::application::Application;
use crate::context::Context;
use crate::error::Error;
use crate::middleware::Composed;
use crate::respond::respond;
use crate::sink::{ErrorEvent, ErrorSink};
use crate::transport::{RawRequest, RawResponse};

/// The composed application, ready to serve. Cheap to clone.
#[derive(Clone)]
pub struct RequestHandler {
    app: Arc<Application>,
    pipeline: Composed,
}

impl RequestHandler {
    pub(crate) fn new(app: Arc<Application>, pipeline: Composed) -> Self {
        Self { app, pipeline }
    }

    pub fn app(&self) -> &Arc<Application> { &self.app }

    /// Serves one request.
    pub async fn handle(&self, req: RawRequest) -> RawResponse {
        let ctx = self.app.create_context(req, RawResponse::new());
        self.handle_context(ctx).await.into_raw_response()
    }

    /// Runs the pipeline, the finalizer and error recovery over `ctx`.
    pub async fn handle_context(&self, mut ctx: Context) -> Context {
        let span = debug_span!("request", method = %ctx.method(), url = ctx.url());
        async move {
            let mut observer = AbortObserver::arm(self.app.sink());

            observer.enter(Phase::RunningPipeline);
            ctx.res_mut().set_status(StatusCode::NOT_FOUND);
            let mut outcome = self.pipeline.call(&mut ctx).await;
            if outcome.is_ok() && ctx.res().is_closed() {
                outcome = Err(Error::Aborted);
            }

            let outcome = outcome.and_then(|()| {
                observer.enter(Phase::Finalizing);
                respond(&mut ctx)
            });
            if let Err(err) = outcome {
                observer.enter(Phase::Erroring);
                ctx.on_error(Some(err));
            }

            observer.enter(Phase::Done);
            debug!(status = ctx.res().status().as_u16(), "response finished");
            ctx
        }
        .instrument(span)
        .await
    }
}

impl std::fmt::Debug for RequestHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandler")
            .field("app", &self.app)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

// ── Abort observer ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Pending,
    RunningPipeline,
    Finalizing,
    Erroring,
    Done,
}

/// Reports an abandoned request. Lives on the request future's stack, so it
/// is dropped with the future when the transport gives up on the connection.
struct AbortObserver<'a> {
    sink: &'a ErrorSink,
    phase: Phase,
}

impl<'a> AbortObserver<'a> {
    fn arm(sink: &'a ErrorSink) -> Self {
        Self { sink, phase: Phase::Pending }
    }

    fn enter(&mut self, phase: Phase) {
        debug!(from = ?self.phase, to = ?phase, "phase");
        self.phase = phase;
    }
}

impl Drop for AbortObserver<'_> {
    fn drop(&mut self) {
        if self.phase == Phase::Done {
            return;
        }
        debug!(phase = ?self.phase, "request dropped before completion");
        let err = Error::Aborted;
        self.sink.emit(&ErrorEvent { error: &err, context: None, header_sent: true });
    }
}
