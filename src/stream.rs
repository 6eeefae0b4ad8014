//! Event streams driven by a generator routine.
//!
//! [`stream`] creates a [`ServerSentEventGenerator`] bound to the body of an
//! SSE response and runs the caller's routine with it on the Tokio runtime.
//! Each patch call on the generator encodes one frame and writes it to the
//! body as a single chunk.
//!
//! A session moves through [`StreamState`]:
//!
//! - `Created` to `Open` when the routine is started,
//! - `Open` to `Closed` when the routine returns `Ok` (unless keepalive was
//!   requested, in which case the body stays open until aborted),
//! - `Open` to `Aborted` when the client disconnects or
//!   [`ServerSentEventGenerator::abort`] is called,
//! - `Open` to `Errored` when the routine returns `Err`.
//!
//! Once a session has left `Open`, writes, closes and aborts are no-ops.
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::channel::{mpsc, oneshot};
use futures::future::{self, FutureExt};
use futures::stream::{Stream, StreamExt};
use http::header::{HeaderMap, HeaderName, HeaderValue, CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use http::request::Parts;
use http::{Request, Response};
use hyper::body::Body;
use parking_lot::Mutex;
use serde::Serialize;
use stream_cancel::{StreamExt as _, Trigger, Tripwire};

use datastar_backend_types::{SessionKey, SignalSet};

use crate::encoder::Frame;
use crate::patch::{self, PatchElementsOptions, PatchSignalsOptions};
use crate::{signals, Error};

/// Frames buffered per session before writes are skipped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Called once when a session is aborted, with the reason if known.
pub type AbortFn = Box<dyn FnOnce(Option<String>) + Send + 'static>;

/// Called with the error returned by a stream routine.
pub type ErrorFn = Box<dyn FnOnce(Error) + Send + 'static>;

type ChunkSender = mpsc::Sender<Bytes>;
type ChunkReceiver = mpsc::Receiver<Bytes>;
type FaultSender = oneshot::Sender<Error>;
type FaultReceiver = oneshot::Receiver<Error>;

/// The lifecycle state of a [`ServerSentEventGenerator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Created,
    Open,
    Closed,
    Aborted,
    Errored,
}

impl StreamState {
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            StreamState::Closed | StreamState::Aborted | StreamState::Errored
        )
    }
}

/// Configuration of an event stream.
pub struct StreamOptions {
    keepalive: bool,
    on_abort: Option<AbortFn>,
    on_error: Option<ErrorFn>,
    channel_capacity: usize,
    headers: HeaderMap,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            keepalive: false,
            on_abort: None,
            on_error: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            headers: HeaderMap::new(),
        }
    }
}

impl fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamOptions")
            .field("keepalive", &self.keepalive)
            .field("on_abort", &self.on_abort.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("channel_capacity", &self.channel_capacity)
            .field("headers", &self.headers)
            .finish()
    }
}

impl StreamOptions {
    /// Keep the stream open after the routine returns, until the client
    /// disconnects or the session is aborted.
    pub fn keepalive(mut self, keepalive: bool) -> Self {
        self.keepalive = keepalive;
        self
    }

    pub fn on_abort<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Option<String>) + Send + 'static,
    {
        self.on_abort = Some(Box::new(f));
        self
    }

    /// Handle routine errors. Without a handler the error is passed on to
    /// the HTTP connection, which is then dropped.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Error) + Send + 'static,
    {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Add a response header. Overrides the SSE default of the same name.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

struct Inner {
    state: StreamState,
    sender: Option<ChunkSender>,
    // Routine errors bypass the bounded channel so a full stream cannot lose them.
    fault: Option<FaultSender>,
    trigger: Option<Trigger>,
    on_abort: Option<AbortFn>,
}

struct Shared {
    key: SessionKey,
    inner: Mutex<Inner>,
    tripwire: Tripwire,
}

impl Shared {
    fn state(&self) -> StreamState {
        self.inner.lock().state
    }

    fn open(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != StreamState::Created {
            return false;
        }
        inner.state = StreamState::Open;
        debug!("session {} open", self.key);
        true
    }

    fn write(&self, chunk: Bytes) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != StreamState::Open {
            trace!("session {}: write in state {:?} ignored", self.key, inner.state);
            return false;
        }
        let sender = match inner.sender.as_mut() {
            Some(sender) => sender,
            None => return false,
        };
        match sender.try_send(chunk) {
            Ok(()) => true,
            Err(e) if e.is_full() => {
                warn!("session {}: event stream full, skipping frame", self.key);
                false
            }
            Err(_) => {
                debug!("session {}: event stream receiver gone", self.key);
                false
            }
        }
    }

    fn close(&self) -> bool {
        let trigger = {
            let mut inner = self.inner.lock();
            if inner.state.is_finished() {
                trace!("session {} already finished", self.key);
                return false;
            }
            inner.state = StreamState::Closed;
            inner.sender.take();
            inner.fault.take();
            inner.trigger.take()
        };
        debug!("session {} closed", self.key);
        if let Some(trigger) = trigger {
            trigger.cancel();
        }
        true
    }

    fn abort(&self, reason: Option<String>) -> bool {
        let (on_abort, trigger) = {
            let mut inner = self.inner.lock();
            if inner.state.is_finished() {
                trace!("session {} already finished, abort ignored", self.key);
                return false;
            }
            inner.state = StreamState::Aborted;
            inner.sender.take();
            inner.fault.take();
            (inner.on_abort.take(), inner.trigger.take())
        };
        info!(
            "session {} aborted: {}",
            self.key,
            reason.as_deref().unwrap_or("no reason given")
        );
        if let Some(on_abort) = on_abort {
            on_abort(reason);
        }
        if let Some(trigger) = trigger {
            trigger.cancel();
        }
        true
    }

    fn fail(&self, err: Error, on_error: Option<ErrorFn>) {
        let (on_abort, sender, fault, trigger) = {
            let mut inner = self.inner.lock();
            if inner.state.is_finished() {
                debug!("session {} finished before routine error: {}", self.key, err);
                return;
            }
            inner.state = StreamState::Errored;
            (
                inner.on_abort.take(),
                inner.sender.take(),
                inner.fault.take(),
                inner.trigger.take(),
            )
        };
        error!("session {}: stream routine failed: {}", self.key, err);

        if let Some(on_abort) = on_abort {
            on_abort(Some(err.to_string()));
        }
        match on_error {
            Some(on_error) => on_error(err),
            None => {
                if let Some(fault) = fault {
                    if fault.send(Error::GeneratorFault(err.to_string())).is_err() {
                        debug!("session {}: body gone, error not passed on", self.key);
                    }
                }
            }
        }
        drop(sender);
        if let Some(trigger) = trigger {
            trigger.cancel();
        }
    }
}

/// Handle to one open event stream.
///
/// Cheap to clone; all clones write to the same stream.
#[derive(Clone)]
pub struct ServerSentEventGenerator {
    shared: Arc<Shared>,
}

impl fmt::Debug for ServerSentEventGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSentEventGenerator")
            .field("key", &self.shared.key)
            .field("state", &self.shared.state())
            .finish()
    }
}

impl ServerSentEventGenerator {
    fn new(sender: ChunkSender, fault: FaultSender, on_abort: Option<AbortFn>) -> Self {
        let (trigger, tripwire) = Tripwire::new();
        let shared = Shared {
            key: SessionKey::new(),
            inner: Mutex::new(Inner {
                state: StreamState::Created,
                sender: Some(sender),
                fault: Some(fault),
                trigger: Some(trigger),
                on_abort,
            }),
            tripwire,
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn key(&self) -> SessionKey {
        self.shared.key
    }

    pub fn state(&self) -> StreamState {
        self.shared.state()
    }

    pub fn is_closed(&self) -> bool {
        self.state().is_finished()
    }

    /// Send a `datastar-patch-elements` event.
    ///
    /// Validation errors are returned before anything is written.
    pub fn patch_elements(
        &self,
        elements: &str,
        options: &PatchElementsOptions,
    ) -> Result<Frame, Error> {
        let frame = patch::patch_elements(elements, options)?;
        self.send_frame(&frame);
        Ok(frame)
    }

    /// Send a `datastar-patch-signals` event from JSON text.
    pub fn patch_signals(
        &self,
        signals: &str,
        options: &PatchSignalsOptions,
    ) -> Result<Frame, Error> {
        let frame = patch::patch_signals(signals, options)?;
        self.send_frame(&frame);
        Ok(frame)
    }

    /// Send a `datastar-patch-signals` event from a serializable value.
    pub fn patch_signals_value<T>(
        &self,
        signals: &T,
        options: &PatchSignalsOptions,
    ) -> Result<Frame, Error>
    where
        T: Serialize + ?Sized,
    {
        let frame = patch::patch_signals_value(signals, options)?;
        self.send_frame(&frame);
        Ok(frame)
    }

    /// Write an encoded frame. Returns false if it was not written, because
    /// the session is no longer open or the stream is full.
    pub fn send_frame(&self, frame: &Frame) -> bool {
        self.shared.write(frame.to_bytes())
    }

    /// End the stream normally.
    pub fn close(&self) -> bool {
        self.shared.close()
    }

    /// Abort the stream, calling the abort handler if this is the first
    /// time the session finishes.
    pub fn abort(&self, reason: Option<String>) -> bool {
        self.shared.abort(reason)
    }

    /// Resolves once the session has finished for any reason.
    pub fn cancelled(&self) -> impl Future<Output = ()> + Send + 'static {
        self.shared.tripwire.clone().map(|_| ())
    }

    /// Ticks every `period`, the first one immediately.
    ///
    /// The stream ends as soon as the session finishes; the state is checked
    /// before each tick is handed out.
    pub fn interval(
        &self,
        period: Duration,
    ) -> impl Stream<Item = tokio::time::Instant> + Send + 'static {
        let shared = self.shared.clone();
        tokio_stream::wrappers::IntervalStream::new(tokio::time::interval(period))
            .take_until_if(self.shared.tripwire.clone())
            .take_while(move |_| future::ready(shared.state() == StreamState::Open))
    }
}

/// Response body fed by a [`ServerSentEventGenerator`].
///
/// Dropping the body before the stream finished aborts the session.
pub struct SseBody {
    rx: ChunkReceiver,
    fault: Option<FaultReceiver>,
    _guard: DisconnectGuard,
}

impl fmt::Debug for SseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SseBody")
            .field("session", &self._guard.0.key)
            .finish()
    }
}

struct DisconnectGuard(Arc<Shared>);

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        self.0.abort(Some("client disconnected".to_string()));
    }
}

impl Body for SseBody {
    type Data = Bytes;
    type Error = Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<hyper::body::Frame<Bytes>, Error>>> {
        let this = self.get_mut();
        match this.rx.poll_next_unpin(cx) {
            Poll::Ready(Some(chunk)) => Poll::Ready(Some(Ok(hyper::body::Frame::data(chunk)))),
            Poll::Pending => Poll::Pending,
            // Frames are drained; a routine error, if any, comes last.
            Poll::Ready(None) => match this.fault.as_mut() {
                None => Poll::Ready(None),
                Some(fault) => match fault.poll_unpin(cx) {
                    Poll::Pending => Poll::Pending,
                    Poll::Ready(result) => {
                        this.fault = None;
                        Poll::Ready(result.ok().map(Err))
                    }
                },
            },
        }
    }
}

/// Start an event stream.
///
/// `on_start` is spawned on the current Tokio runtime and handed the session;
/// the returned response carries the SSE headers and streams whatever the
/// session writes.
pub fn stream<F, Fut>(on_start: F, options: StreamOptions) -> Response<SseBody>
where
    F: FnOnce(ServerSentEventGenerator) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    let StreamOptions {
        keepalive,
        on_abort,
        on_error,
        channel_capacity,
        headers,
    } = options;

    let (tx, rx) = mpsc::channel(channel_capacity);
    let (fault_tx, fault_rx) = oneshot::channel();
    let generator = ServerSentEventGenerator::new(tx, fault_tx, on_abort);
    let body = SseBody {
        rx,
        fault: Some(fault_rx),
        _guard: DisconnectGuard(generator.shared.clone()),
    };

    tokio::spawn(drive(generator, on_start, keepalive, on_error));

    sse_response(body, headers)
}

/// Stream already encoded frames, e.g. from an async generator.
///
/// An `Err` item ends the stream as a routine error would.
pub fn from_frames<S>(frames: S, options: StreamOptions) -> Response<SseBody>
where
    S: Stream<Item = Result<Frame, Error>> + Send + 'static,
{
    stream(
        move |sse| async move {
            futures::pin_mut!(frames);
            while let Some(frame) = frames.next().await {
                sse.send_frame(&frame?);
            }
            Ok::<(), Error>(())
        },
        options,
    )
}

/// Read the request's signals, then start an event stream with them.
///
/// Signals that cannot be read are logged and replaced by an empty set, so
/// a malformed request never fails the stream.
pub async fn with_signals<B, F, Fut>(
    req: Request<B>,
    on_start: F,
    options: StreamOptions,
) -> Response<SseBody>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    F: FnOnce(Parts, SignalSet, ServerSentEventGenerator) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    let (parts, body) = req.into_parts();
    let signals = match signals::read_parts(&parts, body).await {
        Ok(signals) => signals,
        Err(e) => {
            warn!("failed to read signals for {}: {}", parts.uri.path(), e);
            SignalSet::new()
        }
    };
    stream(move |sse| on_start(parts, signals, sse), options)
}

fn sse_response(body: SseBody, extra: HeaderMap) -> Response<SseBody> {
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    for (name, value) in extra.iter() {
        headers.insert(name.clone(), value.clone());
    }
    response
}

async fn drive<F, Fut>(
    sse: ServerSentEventGenerator,
    on_start: F,
    keepalive: bool,
    on_error: Option<ErrorFn>,
) where
    F: FnOnce(ServerSentEventGenerator) -> Fut,
    Fut: Future<Output = Result<(), Error>>,
{
    let shared = sse.shared.clone();
    if !shared.open() {
        debug!("session {} finished before it was started", shared.key);
        return;
    }
    let cancelled = shared.tripwire.clone();

    let outcome = tokio::select! {
        result = on_start(sse) => Some(result),
        _ = cancelled.clone() => None,
    };

    match outcome {
        None => debug!("session {}: routine dropped after cancellation", shared.key),
        Some(Ok(())) if keepalive => {
            debug!("session {}: routine done, keeping stream alive", shared.key);
            cancelled.await;
        }
        Some(Ok(())) => {
            shared.close();
        }
        Some(Err(e)) => shared.fail(e, on_error),
    }
}
