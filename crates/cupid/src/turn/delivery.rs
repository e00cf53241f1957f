//! Delivery of turn events to a client, either as frames or one reply.

use futures::stream::{self, Stream, StreamExt};
use tracing::warn;

use super::events::{TurnError, TurnEvent};
use crate::api::{BufferedReply, StreamFrame};
use crate::store::Session;

/// Reason reported when the event source ends without a terminal event.
const ENDED_WITHOUT_RESULT: &str = "turn ended without a result";

/// Render a turn as frames.
///
/// The session id frame comes first and `done` comes exactly once, last,
/// including after a failure. Capability events have no frame kind and are
/// absorbed.
pub fn frames<S>(session_id: String, events: S) -> impl Stream<Item = StreamFrame> + Send
where
    S: Stream<Item = TurnEvent> + Send + Unpin + 'static,
{
    let head = stream::iter([StreamFrame::SessionId { session_id }]);

    let body = stream::unfold(Some(events), |state| async move {
        let mut events = state?;
        loop {
            let frames = match events.next().await {
                Some(TurnEvent::TextChunk { text }) => {
                    return Some((vec![StreamFrame::Message { content: text }], Some(events)));
                }
                Some(TurnEvent::CapabilityInvoked { .. }) => continue,
                Some(TurnEvent::TurnComplete) => vec![StreamFrame::Done],
                Some(TurnEvent::TurnFailed { reason }) => {
                    vec![StreamFrame::Error { error: reason }, StreamFrame::Done]
                }
                None => {
                    warn!("turn events ended without a terminal event");
                    vec![
                        StreamFrame::Error {
                            error: ENDED_WITHOUT_RESULT.to_string(),
                        },
                        StreamFrame::Done,
                    ]
                }
            };
            return Some((frames, None));
        }
    })
    .flat_map(stream::iter);

    head.chain(body)
}

/// Drain a turn into one reply: the concatenation of every text chunk.
///
/// A failed turn yields its reason as `TurnError::Failed`.
pub async fn collect_reply<S>(session: &Session, mut events: S) -> Result<BufferedReply, TurnError>
where
    S: Stream<Item = TurnEvent> + Unpin,
{
    let mut message = String::new();
    while let Some(event) = events.next().await {
        match event {
            TurnEvent::TextChunk { text } => message.push_str(&text),
            TurnEvent::CapabilityInvoked { .. } => {}
            TurnEvent::TurnComplete => {
                return Ok(BufferedReply {
                    session_id: session.session_id.clone(),
                    message,
                    user_id: session.user_id.clone(),
                });
            }
            TurnEvent::TurnFailed { reason } => return Err(TurnError::Failed(reason)),
        }
    }
    Err(TurnError::Failed(ENDED_WITHOUT_RESULT.to_string()))
}
