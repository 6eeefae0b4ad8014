use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::channel::oneshot;
use futures::StreamExt;
use http::request::Parts;
use http::{header, HeaderValue, Method, Request};
use http_body_util::{BodyExt, Full};
use parking_lot::Mutex;

use datastar_backend::{
    from_frames, patch_signals, stream, with_signals, Error, PatchElementsOptions, PatchMode,
    PatchSignalsOptions, ServerSentEventGenerator, SignalSet, SseBody, StreamOptions, StreamState,
};

async fn body_text(body: SseBody) -> String {
    let bytes = body.collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_frames_in_order_then_closed() {
    let response = stream(
        |sse| async move {
            sse.patch_elements(
                "<li>Ping</li>",
                &PatchElementsOptions::default()
                    .with_selector("#chat")
                    .with_mode(PatchMode::Append),
            )?;
            sse.patch_signals("{\"lastMsg\":\"Ping\"}", &PatchSignalsOptions::default())?;
            Ok::<(), Error>(())
        },
        StreamOptions::default(),
    );

    let headers = response.headers();
    assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream");
    assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
    assert_eq!(headers[header::CONNECTION], "keep-alive");

    assert_eq!(
        body_text(response.into_body()).await,
        "event: datastar-patch-elements\n\
         data: selector #chat\n\
         data: mode append\n\
         data: elements <li>Ping</li>\n\
         \n\
         event: datastar-patch-signals\n\
         data: signals {\"lastMsg\":\"Ping\"}\n\
         \n"
    );
}

#[tokio::test]
async fn test_extra_headers() {
    let options = StreamOptions::default()
        .header(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))
        .header(
            header::HeaderName::from_static("x-demo"),
            HeaderValue::from_static("1"),
        );
    let response = stream(|_sse| async { Ok::<(), Error>(()) }, options);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    assert_eq!(response.headers()["x-demo"], "1");
    assert_eq!(body_text(response.into_body()).await, "");
}

#[tokio::test]
async fn test_error_handler_runs_after_abort_handler() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let (calls_abort, calls_error) = (calls.clone(), calls.clone());

    let options = StreamOptions::default()
        .on_abort(move |reason| calls_abort.lock().push(format!("abort: {:?}", reason)))
        .on_error(move |e| calls_error.lock().push(format!("error: {}", e)));

    let response = stream(
        |sse| async move {
            sse.patch_signals("{\"a\":1}", &PatchSignalsOptions::default())?;
            sse.patch_elements("", &PatchElementsOptions::default())?;
            Ok::<(), Error>(())
        },
        options,
    );

    let text = body_text(response.into_body()).await;
    assert_eq!(text, "event: datastar-patch-signals\ndata: signals {\"a\":1}\n\n");

    let calls = calls.lock();
    assert_eq!(calls.len(), 2);
    assert_eq!(
        calls[0],
        "abort: Some(\"elements is required and cannot be empty\")"
    );
    assert_eq!(calls[1], "error: elements is required and cannot be empty");
}

#[tokio::test]
async fn test_error_without_handler_reaches_transport() {
    let response = stream(
        |_sse| async { Err::<(), Error>(Error::GeneratorFault("boom".into())) },
        StreamOptions::default(),
    );
    match response.into_body().collect().await {
        Err(Error::GeneratorFault(msg)) => assert!(msg.contains("boom")),
        other => panic!("expected a generator fault, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_error_without_handler_survives_full_stream() {
    let response = stream(
        |sse| async move {
            let frame = patch_signals("{\"x\":0}", &PatchSignalsOptions::default())?;
            let written = (0..5).filter(|_| sse.send_frame(&frame)).count();
            assert!(written < 5);
            Err::<(), Error>(Error::GeneratorFault("boom".into()))
        },
        StreamOptions::default().channel_capacity(1),
    );
    let mut body = response.into_body();

    let mut frames = 0;
    loop {
        match body.frame().await {
            Some(Ok(_)) => frames += 1,
            Some(Err(Error::GeneratorFault(msg))) => {
                assert!(msg.contains("boom"));
                break;
            }
            Some(Err(e)) => panic!("unexpected error {}", e),
            None => panic!("stream ended without the routine error"),
        }
    }
    assert!(frames > 0);
    assert!(body.frame().await.is_none());
}

#[tokio::test]
async fn test_writes_after_close_are_ignored() {
    let response = stream(
        |sse| async move {
            assert!(sse.close());
            assert!(!sse.close());
            assert_eq!(sse.state(), StreamState::Closed);
            let frame = patch_signals("{}", &PatchSignalsOptions::default())?;
            assert!(!sse.send_frame(&frame));
            sse.patch_signals("{}", &PatchSignalsOptions::default())?;
            Ok::<(), Error>(())
        },
        StreamOptions::default(),
    );
    assert_eq!(body_text(response.into_body()).await, "");
}

#[tokio::test]
async fn test_abort_is_idempotent() {
    let aborts = Arc::new(AtomicUsize::new(0));
    let reason = Arc::new(Mutex::new(None));
    let (aborts2, reason2) = (aborts.clone(), reason.clone());

    let options = StreamOptions::default().on_abort(move |r| {
        aborts2.fetch_add(1, Ordering::SeqCst);
        *reason2.lock() = r;
    });

    let response = stream(
        |sse| async move {
            assert!(sse.abort(Some("bye".into())));
            assert!(!sse.abort(Some("again".into())));
            assert!(!sse.close());
            assert_eq!(sse.state(), StreamState::Aborted);
            Ok::<(), Error>(())
        },
        options,
    );

    // Dropping the body after the abort must not call the handler again.
    assert_eq!(body_text(response.into_body()).await, "");
    assert_eq!(aborts.load(Ordering::SeqCst), 1);
    assert_eq!(reason.lock().as_deref(), Some("bye"));
}

#[tokio::test]
async fn test_keepalive_holds_stream_until_disconnect() {
    let (abort_tx, abort_rx) = oneshot::channel();
    let options = StreamOptions::default()
        .keepalive(true)
        .on_abort(move |reason| {
            let _ = abort_tx.send(reason);
        });

    let response = stream(
        |sse| async move {
            sse.patch_signals("{\"n\":1}", &PatchSignalsOptions::default())?;
            Ok::<(), Error>(())
        },
        options,
    );
    let mut body = response.into_body();

    let first = body.frame().await.unwrap().unwrap().into_data().unwrap();
    assert_eq!(
        first,
        Bytes::from_static(b"event: datastar-patch-signals\ndata: signals {\"n\":1}\n\n")
    );

    let pending = tokio::time::timeout(Duration::from_millis(50), body.frame()).await;
    assert!(pending.is_err(), "stream ended despite keepalive");

    drop(body);
    assert_eq!(
        abort_rx.await.unwrap().as_deref(),
        Some("client disconnected")
    );
}

#[tokio::test]
async fn test_disconnect_stops_interval() {
    let (sse_tx, sse_rx) = oneshot::channel::<ServerSentEventGenerator>();
    let aborts = Arc::new(AtomicUsize::new(0));
    let aborts2 = aborts.clone();

    let response = stream(
        |sse| async move {
            let _ = sse_tx.send(sse.clone());
            let mut ticks = Box::pin(sse.interval(Duration::from_millis(5)));
            let mut n = 0;
            while ticks.next().await.is_some() {
                n += 1;
                sse.patch_signals_value(&serde_json::json!({ "n": n }), &Default::default())?;
            }
            Ok::<(), Error>(())
        },
        StreamOptions::default().on_abort(move |_| {
            aborts2.fetch_add(1, Ordering::SeqCst);
        }),
    );
    let mut body = response.into_body();
    for _ in 0..2 {
        assert!(body.frame().await.unwrap().is_ok());
    }
    drop(body);

    let sse = sse_rx.await.unwrap();
    assert_eq!(sse.state(), StreamState::Aborted);
    assert!(Box::pin(sse.interval(Duration::from_millis(1)))
        .next()
        .await
        .is_none());
    sse.cancelled().await;
    assert_eq!(aborts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_full_channel_skips_frames() {
    let written = Arc::new(AtomicUsize::new(0));
    let written2 = written.clone();

    let response = stream(
        |sse| async move {
            let frame = patch_signals("{\"x\":0}", &PatchSignalsOptions::default())?;
            let mut skipped = 0;
            for _ in 0..5 {
                if sse.send_frame(&frame) {
                    written2.fetch_add(1, Ordering::SeqCst);
                } else {
                    skipped += 1;
                }
            }
            assert!(skipped > 0);
            Ok::<(), Error>(())
        },
        StreamOptions::default().channel_capacity(1),
    );

    let text = body_text(response.into_body()).await;
    let frames = text.matches("event: ").count();
    assert_eq!(frames, written.load(Ordering::SeqCst));
    assert!(frames < 5);
}

#[tokio::test]
async fn test_from_frames() {
    let frames = futures::stream::iter(vec![
        patch_signals("{\"a\":1}", &PatchSignalsOptions::default()),
        patch_signals("{\"a\":2}", &PatchSignalsOptions::default()),
    ]);
    let response = from_frames(frames, StreamOptions::default());
    assert_eq!(
        body_text(response.into_body()).await,
        "event: datastar-patch-signals\ndata: signals {\"a\":1}\n\n\
         event: datastar-patch-signals\ndata: signals {\"a\":2}\n\n"
    );
}

#[tokio::test]
async fn test_with_signals_falls_back_to_empty() {
    let echo = |_parts: Parts, signals: SignalSet, sse: ServerSentEventGenerator| async move {
        sse.patch_signals_value(&signals, &PatchSignalsOptions::default())?;
        Ok::<(), Error>(())
    };

    let req = Request::builder()
        .method(Method::POST)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from_static(b"{\"slider\":42}")))
        .unwrap();
    let response = with_signals(req, echo, StreamOptions::default()).await;
    assert_eq!(
        body_text(response.into_body()).await,
        "event: datastar-patch-signals\ndata: signals {\"slider\":42}\n\n"
    );

    let req = Request::builder()
        .method(Method::POST)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from_static(b"[1]")))
        .unwrap();
    let response = with_signals(req, echo, StreamOptions::default()).await;
    assert_eq!(
        body_text(response.into_body()).await,
        "event: datastar-patch-signals\ndata: signals {}\n\n"
    );
}

#[tokio::test]
async fn test_keepalive_ends_on_explicit_abort() {
    let (sse_tx, sse_rx) = oneshot::channel::<ServerSentEventGenerator>();
    let aborts = Arc::new(AtomicUsize::new(0));
    let reason = Arc::new(Mutex::new(None));
    let (aborts2, reason2) = (aborts.clone(), reason.clone());

    let options = StreamOptions::default().keepalive(true).on_abort(move |r| {
        aborts2.fetch_add(1, Ordering::SeqCst);
        *reason2.lock() = r;
    });
    let response = stream(
        |sse| async move {
            sse.patch_signals("{\"n\":1}", &PatchSignalsOptions::default())?;
            let _ = sse_tx.send(sse.clone());
            Ok::<(), Error>(())
        },
        options,
    );
    let mut body = response.into_body();
    assert!(body.frame().await.unwrap().is_ok());

    let sse = sse_rx.await.unwrap();
    let pending = tokio::time::timeout(Duration::from_millis(50), body.frame()).await;
    assert!(pending.is_err(), "stream ended despite keepalive");
    assert_eq!(sse.state(), StreamState::Open);

    assert!(sse.abort(Some("done".into())));
    assert!(body.frame().await.is_none());
    drop(body);

    assert_eq!(sse.state(), StreamState::Aborted);
    assert_eq!(aborts.load(Ordering::SeqCst), 1);
    assert_eq!(reason.lock().as_deref(), Some("done"));
}
