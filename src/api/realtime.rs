//! Server-sent-events change feed.

use std::convert::Infallible;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{stream, Stream, StreamExt};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

use crate::models::RealtimeQuery;
use crate::AppState;

/// SSE event name carrying a serialized `ChangeEvent`.
pub const CHANGE_EVENT: &str = "change";

/// GET /api/realtime?table= - Stream row changes for one collection.
pub async fn subscribe(
    State(state): State<AppState>,
    Query(query): Query<RealtimeQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let table = query.table;
    let receiver = state.realtime.subscribe();
    tracing::debug!("Realtime subscriber joined {}", table.as_str());

    // The opening comment flushes response headers so the client knows it is subscribed.
    let opening = stream::once(async { Ok(Event::default().comment("subscribed")) });

    let changes = BroadcastStream::new(receiver).filter_map(move |item| async move {
        match item {
            Ok(change) if change.table == table => match serde_json::to_string(&change) {
                Ok(data) => Some(Ok(Event::default().event(CHANGE_EVENT).data(data))),
                Err(e) => {
                    tracing::warn!("Failed to encode change event: {}", e);
                    None
                }
            },
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(
                    "Realtime subscriber on {} lagged, {} events dropped",
                    table.as_str(),
                    skipped
                );
                None
            }
        }
    });

    Sse::new(opening.chain(changes)).keep_alive(KeepAlive::default())
}
