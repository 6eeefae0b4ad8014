use std::convert::Infallible;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Full};
use hyper::body::Incoming;
use serde_json::json;

use datastar_backend::{
    stream, with_signals, Error, PatchElementsOptions, PatchMode, PatchSignalsOptions, SignalSet,
    SseBody, StreamOptions,
};

use crate::pages;

pub type DemoBody = UnsyncBoxBody<Bytes, Error>;

pub async fn handle(req: Request<Incoming>) -> Result<Response<DemoBody>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!("{} {}", method, path);

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/") => html(pages::welcome()),
        (&Method::GET, "/chat") => html(pages::chat()),
        (&Method::GET, "/counter") => html(pages::counter()),
        (&Method::GET, "/clock") => html(pages::clock()),
        (&Method::GET, "/slider") => html(pages::slider()),
        (&Method::GET, "/time") => html(pages::time(&chrono::Utc::now().to_rfc3339())),
        (&Method::GET, "/api/time") => sse(time()),
        (&Method::GET, "/sse/clock") => sse(clock()),
        (_, "/sse/slider") => sse(slider(req).await),
        (_, "/sse/chat") => sse(chat(req).await),
        (&Method::POST, "/sse/chat/clear") => sse(clear_chat()),
        _ => not_found(),
    };
    Ok(response)
}

fn html(markup: String) -> Response<DemoBody> {
    let body = Full::new(Bytes::from(markup))
        .map_err(|never| match never {})
        .boxed_unsync();
    let mut response = Response::new(body);
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

fn not_found() -> Response<DemoBody> {
    let mut response = html("<h1>Not found</h1>".to_string());
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

fn sse(response: Response<SseBody>) -> Response<DemoBody> {
    response.map(|body| body.boxed_unsync())
}

fn log_abort(route: &'static str) -> StreamOptions {
    StreamOptions::default().on_abort(move |reason| {
        debug!("{} stream aborted: {}", route, reason.as_deref().unwrap_or("-"));
    })
}

/// Client signals may carry numbers as JSON numbers or as strings.
fn number_signal(signals: &SignalSet, key: &str) -> i64 {
    match signals.get(key) {
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn next_slider(value: i64) -> i64 {
    (value + 4).rem_euclid(100)
}

fn time() -> Response<SseBody> {
    stream(
        |sse| async move {
            let now = chrono::Utc::now().to_rfc3339();
            sse.patch_signals_value(&json!({ "now": now }), &PatchSignalsOptions::default())?;
            Ok::<(), Error>(())
        },
        StreamOptions::default(),
    )
}

fn clock() -> Response<SseBody> {
    stream(
        |sse| async move {
            let mut ticks = Box::pin(sse.interval(Duration::from_secs(1)));
            while ticks.next().await.is_some() {
                let now = chrono::Local::now().format("%H:%M:%S");
                sse.patch_elements(
                    &format!("<span id=\"server-time\">{}</span>", now),
                    &PatchElementsOptions::default(),
                )?;
            }
            Ok::<(), Error>(())
        },
        log_abort("clock"),
    )
}

async fn slider(req: Request<Incoming>) -> Response<SseBody> {
    with_signals(
        req,
        |_parts, signals, sse| async move {
            let slider = next_slider(number_signal(&signals, "slider"));
            sse.patch_signals_value(&json!({ "slider": slider }), &PatchSignalsOptions::default())?;
            Ok::<(), Error>(())
        },
        log_abort("slider"),
    )
    .await
}

async fn chat(req: Request<Incoming>) -> Response<SseBody> {
    with_signals(
        req,
        |parts, _signals, sse| async move {
            let message = format!("Ping {}", chrono::Local::now().format("%H:%M:%S"));
            sse.patch_elements(
                &format!("<li>{}</li>", message),
                &PatchElementsOptions::default()
                    .with_selector("#chat")
                    .with_mode(PatchMode::Append),
            )?;
            sse.patch_signals_value(
                &json!({ "lastMsg": message, "fromUrl": parts.uri.to_string() }),
                &PatchSignalsOptions::default(),
            )?;
            Ok::<(), Error>(())
        },
        log_abort("chat"),
    )
    .await
}

fn clear_chat() -> Response<SseBody> {
    stream(
        |sse| async move {
            sse.patch_elements("", &PatchElementsOptions::remove("#chat li"))?;
            sse.patch_signals_value(&json!({ "lastMsg": "" }), &PatchSignalsOptions::default())?;
            Ok::<(), Error>(())
        },
        StreamOptions::default(),
    )
}
