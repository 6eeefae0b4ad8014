//! The SSE frame encoder.
//!
//! A frame on the wire looks like
//!
//! ```text
//! event: datastar-patch-elements
//! id: 42
//! retry: 5000
//! data: selector #chat
//! data: elements <li>hello</li>
//!
//! ```
//!
//! `id:` is only written when an event id is set, `retry:` only when the retry
//! duration differs from [`DEFAULT_RETRY_DURATION_MS`].
use std::fmt;

use bytes::Bytes;

use crate::defaults::DEFAULT_RETRY_DURATION_MS;

/// The kinds of events understood by the Datastar client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Patches HTML elements into the DOM.
    PatchElements,
    /// Patches signals into the signal store.
    PatchSignals,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PatchElements => "datastar-patch-elements",
            EventType::PatchSignals => "datastar-patch-signals",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SSE metadata common to every event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventOptions {
    /// Written as `id:` when present and non-empty.
    pub event_id: Option<String>,
    /// Reconnection delay in milliseconds. Zero and the default are not sent.
    pub retry_duration: Option<u64>,
}

impl EventOptions {
    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    pub fn with_retry_duration(mut self, millis: u64) -> Self {
        self.retry_duration = Some(millis);
        self
    }
}

/// One complete SSE event, as the ordered list of lines written to the wire.
///
/// Every line, including the blank terminator, ends with `\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    event_type: EventType,
    lines: Vec<String>,
}

impl Frame {
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// The values of the `data:` lines, without prefix or newline.
    pub fn data_values(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .filter_map(|line| line.strip_prefix("data: "))
            .map(|value| value.strip_suffix('\n').unwrap_or(value))
    }

    /// The whole frame as one chunk, ready for a single channel write.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.to_string())
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            f.write_str(line)?;
        }
        Ok(())
    }
}

/// Split `text` into one `"<keyword> <line>"` value per source line.
///
/// Lines are split on `\n`; a `\r` ending a line is dropped. A trailing
/// newline yields a final empty line so line boundaries survive intact.
pub fn split_lines<'a>(keyword: &'a str, text: &'a str) -> impl Iterator<Item = String> + 'a {
    text.split('\n').map(move |line| {
        let line = line.strip_suffix('\r').unwrap_or(line);
        format!("{} {}", keyword, line)
    })
}

/// Encode an event into its wire lines.
pub fn encode<I>(event_type: EventType, data: I, options: &EventOptions) -> Frame
where
    I: IntoIterator<Item = String>,
{
    let mut lines = vec![format!("event: {}\n", event_type)];

    if let Some(id) = options.event_id.as_deref().filter(|id| !id.is_empty()) {
        lines.push(format!("id: {}\n", id));
    }

    match options.retry_duration {
        Some(ms) if ms != 0 && ms != DEFAULT_RETRY_DURATION_MS => {
            lines.push(format!("retry: {}\n", ms));
        }
        _ => {}
    }

    lines.extend(data.into_iter().map(|value| format!("data: {}\n", value)));
    lines.push("\n".to_string());

    Frame { event_type, lines }
}
