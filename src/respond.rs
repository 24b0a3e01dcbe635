//! Response finalization.
//!
//! Turns the context's final response state into exactly one terminal write
//! on the raw response. Checks run in a fixed order and the first match wins:
//!
//! 1. bypass requested, nothing to do
//! 2. response no longer writable, nothing to do
//! 3. empty-body status (204, 205, 304): strip entity headers, end
//! 4. `HEAD`: fill in Content-Length when it can be known, end
//! 5. no body: the status text as a plain-text body
//! 6. bytes, 7. text: written as is
//! 8. stream: piped
//! 9. JSON: serialized, Content-Length from the encoded bytes

use bytes::Bytes;
use http::Method;
use tracing::debug;

use crate::body::Body;
use crate::context::Context;
use crate::error::Result;
use crate::response::ContentType;
use crate::status;

pub(crate) fn respond(ctx: &mut Context) -> Result<()> {
    if !ctx.respond() {
        debug!("respond bypassed");
        return Ok(());
    }
    if !ctx.writable() {
        return Ok(());
    }

    let code = ctx.status();
    if status::is_empty(code) {
        ctx.clear_body();
        ctx.res_mut().end(None);
        return Ok(());
    }

    if *ctx.method() == Method::HEAD {
        if !ctx.header_sent() && !ctx.has("content-length") {
            if let Some(length) = ctx.length() {
                ctx.set_length(length);
            }
        }
        ctx.res_mut().end(None);
        return Ok(());
    }

    let Some(body) = ctx.response_mut().take_body() else {
        let fallback = if ctx.request().http_version_major() >= 2 {
            code.as_str().to_owned()
        } else {
            match ctx.message() {
                "" => code.as_str().to_owned(),
                message => message.to_owned(),
            }
        };
        if !ctx.header_sent() {
            ctx.response_mut().set_content_type(ContentType::Text);
            ctx.set_length(fallback.len() as u64);
        }
        ctx.res_mut().end(Some(Bytes::from(fallback)));
        return Ok(());
    };

    match body {
        Body::Bytes(bytes) => ctx.res_mut().end(Some(bytes)),
        Body::Text(text) => ctx.res_mut().end(Some(Bytes::from(text))),
        Body::Stream(stream) => ctx.res_mut().pipe(stream),
        Body::Json(value) => {
            let encoded = serde_json::to_vec(&value)?;
            if !ctx.header_sent() {
                ctx.set_length(encoded.len() as u64);
            }
            ctx.res_mut().end(Some(Bytes::from(encoded)));
        }
    }
    Ok(())
}
