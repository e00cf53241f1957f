//! Server-sent events decoder.
//!
//! Turns a byte stream into assembled events: `data:` lines are joined with
//! `\n` until a blank line, `event:` names the event, comments and unknown
//! fields are ignored. Used for the upstream model stream and for reading
//! our own `/api/chat` output in tests.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes, BytesMut};
use futures::Stream;

/// One assembled SSE event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Stream adapter from raw bytes to [`SseEvent`]s.
///
/// Bytes are buffered until a full line is available, so multi-byte UTF-8
/// sequences split across chunks decode correctly.
pub struct SseEventStream<S> {
    inner: S,
    buffer: BytesMut,
    current: Option<SseEvent>,
    done: bool,
}

impl<S> SseEventStream<S> {
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: BytesMut::new(),
            current: None,
            done: false,
        }
    }

    /// Pop the next complete line (without its terminator) from the buffer.
    fn next_line(&mut self) -> Option<String> {
        let end = self.buffer.iter().position(|b| *b == b'\n')?;
        let mut line = self.buffer.split_to(end + 1);
        line.truncate(end);
        if line.last() == Some(&b'\r') {
            line.truncate(end - 1);
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Feed one line; returns an event when the line closes one.
    fn apply_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.current.take();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                let event = self.current.get_or_insert_with(SseEvent::default);
                if !event.data.is_empty() {
                    event.data.push('\n');
                }
                event.data.push_str(value);
            }
            "event" => {
                self.current.get_or_insert_with(SseEvent::default).event = Some(value.to_string());
            }
            _ => {}
        }
        None
    }
}

impl<S, E> Stream for SseEventStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<SseEvent, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            while let Some(line) = self.next_line() {
                if let Some(event) = self.apply_line(&line) {
                    return Poll::Ready(Some(Ok(event)));
                }
            }

            if self.done {
                // Flush a trailing line without terminator, then any open event.
                if self.buffer.has_remaining() {
                    let rest = self.buffer.split().freeze();
                    let line = String::from_utf8_lossy(&rest).into_owned();
                    if let Some(event) = self.apply_line(&line) {
                        return Poll::Ready(Some(Ok(event)));
                    }
                }
                return Poll::Ready(self.current.take().map(Ok));
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => self.buffer.extend_from_slice(&chunk),
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => self.done = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
