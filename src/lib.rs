//! This library, datastar-backend, lets a [hyper](https://hyper.rs) server
//! drive a [Datastar](https://data-star.dev/) frontend. The browser renders
//! HTML produced by the server and keeps its reactive state in "signals". The
//! server pushes updates over [Server Sent
//! Events](https://html.spec.whatwg.org/multipage/server-sent-events.html):
//! HTML fragments to patch into the DOM, and new signal values.
//!
//! The operating principle is that each SSE request gets its own event
//! stream. The application supplies an async routine which receives a
//! [`ServerSentEventGenerator`] and calls
//! [`patch_elements`](ServerSentEventGenerator::patch_elements) or
//! [`patch_signals`](ServerSentEventGenerator::patch_signals) on it. Every
//! call is encoded into one SSE frame and written to the response body as a
//! single chunk. Signals sent by the browser are read with
//! [`read_signals`], from the query string on GET and from the body
//! otherwise. All data is encoded as JSON.
//!
//! #### Features
//!
//!  - Exact Datastar wire format. Options equal to their protocol default are
//!    never sent.
//!  - Signal reading never fails the request in its safe form: errors come
//!    back as a [`SignalReadResult`].
//!  - Stream lifecycle with keepalive, abort and error handlers. Client
//!    disconnects are detected when hyper drops the response body.
//!  - Written in async style using
//!    [futures](https://github.com/rust-lang/futures-rs) and Tokio.
//!
//! #### Security warning
//!
//! Due to its nature, the program listens and responds to client connections
//! from the network. Signals are client input: treat them as untrusted
//! within any routine you write.
// #![deny(missing_docs)]

#[macro_use]
extern crate log;

mod errors;
pub use crate::errors::Error;

pub mod defaults;
pub mod encoder;
pub mod patch;
pub mod signals;
pub mod stream;

pub use datastar_backend_types::{SessionKey, SignalReadResult, SignalSet};

pub use crate::encoder::{EventOptions, EventType, Frame};
pub use crate::patch::{
    patch_elements, patch_signals, patch_signals_value, PatchElementsOptions, PatchMode,
    PatchSignalsOptions,
};
pub use crate::signals::{
    decode_signals, is_datastar_request, read_signals, read_signals_strict,
    read_signals_with_defaults,
};
pub use crate::stream::{
    from_frames, stream, with_signals, ServerSentEventGenerator, SseBody, StreamOptions,
    StreamState,
};
