use std::convert::Infallible;

use axum::response::sse::Event;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

use triad_core::events::RunEvent;

/// Convert a run event into an SSE frame: the event type as the SSE event
/// name and the event JSON as data.
pub fn to_sse_event(event: &RunEvent) -> Event {
    let frame = Event::default().event(event.event_type());
    match serde_json::to_string(event) {
        Ok(json) => frame.data(json),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize run event");
            frame.data("{}")
        }
    }
}

/// Adapt a run's event receiver into an SSE stream. Dropping the stream
/// (client disconnect) drops the receiver, which the run observes at its
/// next phase boundary.
pub fn sse_stream(
    rx: mpsc::Receiver<RunEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    ReceiverStream::new(rx).map(|event| Ok(to_sse_event(&event)))
}
