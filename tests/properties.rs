//! End-to-end behaviour through the public API: `App` → `RequestHandler` →
//! raw response.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{Method, StatusCode, Uri};
use serde_json::{json, Value};
use shallot::{App, Error, ErrorEvent, HttpError, Payload, RawRequest, RawResponse};

type Events = Arc<Mutex<Vec<(String, bool)>>>;

fn with_recorder(app: App) -> (App, Events) {
    let events: Events = Arc::default();
    let sink = Arc::clone(&events);
    let app = app.on_error(move |event: &ErrorEvent<'_>| {
        sink.lock().unwrap().push((event.error.to_string(), event.header_sent));
    });
    (app, events)
}

fn request(method: Method, uri: &'static str) -> RawRequest {
    RawRequest::new(method, Uri::from_static(uri))
}

fn payload(res: &RawResponse) -> Option<&Bytes> {
    res.payload().bytes()
}

fn header<'r>(res: &'r RawResponse, name: &str) -> Option<&'r str> {
    res.headers().get(name).and_then(|v| v.to_str().ok())
}

#[tokio::test]
async fn double_next_reaches_the_error_path() {
    let (app, events) = with_recorder(App::new());
    let res = app
        .use_fn(|ctx, next| Box::pin(async move {
            next.run(ctx).await?;
            next.run(ctx).await
        }))
        .callback()
        .handle(request(Method::GET, "/"))
        .await;

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(payload(&res).map(|b| &b[..]), Some(&b"Internal Server Error"[..]));
    assert_eq!(*events.lock().unwrap(), [("next() called multiple times".to_owned(), false)]);
}

#[tokio::test]
async fn empty_statuses_never_carry_a_body() {
    for code in [204, 205, 304] {
        let res = App::new()
            .use_fn(move |ctx, _next| Box::pin(async move {
                ctx.set_body("should not be sent");
                ctx.set_status(code)?;
                ctx.set_body("nor this");
                Ok(())
            }))
            .callback()
            .handle(request(Method::GET, "/"))
            .await;

        assert_eq!(res.status().as_u16(), code);
        assert!(matches!(res.payload(), Payload::Empty));
        assert_eq!(res.write_count(), 1);
    }
}

#[tokio::test]
async fn head_sends_length_but_no_payload() {
    let res = App::new()
        .use_fn(|ctx, _next| Box::pin(async move {
            ctx.set_body("twelve bytes");
            Ok(())
        }))
        .callback()
        .handle(request(Method::HEAD, "/"))
        .await;

    assert_eq!(res.status(), StatusCode::OK);
    assert!(matches!(res.payload(), Payload::Empty));
    assert_eq!(header(&res, "content-length"), Some("12"));
}

#[tokio::test]
async fn json_bodies_round_trip() {
    let res = App::new()
        .use_fn(|ctx, _next| Box::pin(async move {
            ctx.set_body(json!({ "a": 1, "b": "x" }));
            Ok(())
        }))
        .callback()
        .handle(request(Method::GET, "/"))
        .await;

    let bytes = payload(&res).expect("json payload");
    let decoded: Value = serde_json::from_slice(bytes).unwrap();
    assert_eq!(decoded, json!({ "a": 1, "b": "x" }));
    assert_eq!(header(&res, "content-length"), Some(bytes.len().to_string().as_str()));
    assert_eq!(header(&res, "content-type"), Some("application/json; charset=utf-8"));
}

#[tokio::test]
async fn missing_body_falls_back_to_reason() {
    let res = App::new()
        .use_fn(|ctx, _next| Box::pin(async move {
            ctx.set("x-seen", "1")?;
            Ok(())
        }))
        .callback()
        .handle(request(Method::GET, "/"))
        .await;

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(payload(&res).map(|b| &b[..]), Some(&b"Not Found"[..]));
    assert_eq!(header(&res, "content-type"), Some("text/plain; charset=utf-8"));
    assert_eq!(header(&res, "x-seen"), Some("1"));
}

#[tokio::test]
async fn exposed_error_reaches_the_client() {
    let res = App::new()
        .use_fn(|_ctx, _next| Box::pin(async move {
            Err(Error::from(HttpError::new(400).with_expose(true).with_message("bad input")))
        }))
        .callback()
        .handle(request(Method::POST, "/"))
        .await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(payload(&res).map(|b| &b[..]), Some(&b"bad input"[..]));
    assert_eq!(header(&res, "content-length"), Some("9"));
}

fn lookup(id: &str) -> Result<u32, shallot::BoxError> {
    id.parse()
        .map_err(|_| Box::new(HttpError::new(400).with_message("bad id")) as shallot::BoxError)
}

#[tokio::test]
async fn boxed_http_error_keeps_its_status() {
    let res = App::new()
        .use_fn(|ctx, _next| Box::pin(async move {
            let id = lookup(ctx.path().trim_start_matches('/'))?;
            ctx.set_body(format!("user {id}"));
            Ok(())
        }))
        .callback()
        .handle(request(Method::GET, "/abc"))
        .await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(payload(&res).map(|b| &b[..]), Some(&b"bad id"[..]));
}

#[tokio::test]
async fn empty_application_answers_404() {
    let handler = App::new().callback();
    for uri in ["/", "/anything?at=all"] {
        let res = handler.handle(request(Method::GET, uri)).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(payload(&res).map(|b| &b[..]), Some(&b"Not Found"[..]));
    }
}

#[tokio::test]
async fn error_after_headers_sent_is_only_reported() {
    let (app, events) = with_recorder(App::new());
    let res = app
        .use_fn(|ctx, _next| Box::pin(async move {
            ctx.set_status(200)?;
            ctx.flush_headers();
            Err(Error::msg("stream broke"))
        }))
        .callback()
        .handle(request(Method::GET, "/"))
        .await;

    assert_eq!(res.write_count(), 0);
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(*events.lock().unwrap(), [("stream broke".to_owned(), true)]);
}

async fn explode() -> shallot::Result<()> {
    panic!("kaboom")
}

#[tokio::test]
async fn panics_are_recovered() {
    let (app, events) = with_recorder(App::new());
    let res = app
        .use_fn(|_ctx, _next| Box::pin(explode()))
        .callback()
        .handle(request(Method::GET, "/"))
        .await;

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(events.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn bypass_leaves_the_raw_response_to_middleware() {
    let res = App::new()
        .use_fn(|ctx, _next| Box::pin(async move {
            ctx.set_respond(false);
            ctx.res_mut().set_status(StatusCode::ACCEPTED);
            ctx.res_mut().end(Some(Bytes::from_static(b"manual")));
            Ok(())
        }))
        .callback()
        .handle(request(Method::GET, "/"))
        .await;

    assert_eq!(res.status(), StatusCode::ACCEPTED);
    assert_eq!(res.write_count(), 1);
    assert_eq!(payload(&res).map(|b| &b[..]), Some(&b"manual"[..]));
}

#[tokio::test]
async fn into_http_carries_status_headers_and_body() {
    use http_body_util::BodyExt;

    let res = App::new()
        .use_fn(|ctx, _next| Box::pin(async move {
            ctx.set_status(201)?;
            ctx.set_body("created");
            Ok(())
        }))
        .callback()
        .handle(request(Method::POST, "/items"))
        .await
        .into_http();

    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(res.headers()["content-length"], "7");
    let body = res.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body, Bytes::from_static(b"created"));
}
