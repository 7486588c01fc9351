//! Server-sent stream of pipeline events.
//!
//! # Design
//! - Clients that reconnect with `Last-Event-ID` receive buffered events newer
//!   than that id before live delivery resumes.
//! - `?batch=<prefix>` narrows the stream to one batch.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::sse::{self, KeepAlive, Sse},
};
use filegate_events::{EventBus, EventEnvelope, EventId};
use futures_util::{Stream, StreamExt, future, stream};
use serde::Deserialize;
use tracing::warn;

use crate::http::constants::{HEADER_LAST_EVENT_ID, SSE_KEEP_ALIVE_SECS};
use crate::state::ApiState;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct EventsQuery {
    #[serde(default)]
    batch: Option<String>,
}

pub(crate) async fn stream_events(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<sse::Event, Infallible>>> {
    let since = last_event_id(&headers);
    let stream = envelope_stream(&state.events, since, query.batch)
        .filter_map(|envelope| future::ready(to_sse(&envelope).map(Ok)));
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(SSE_KEEP_ALIVE_SECS))
            .text("keep-alive"),
    )
}

fn last_event_id(headers: &HeaderMap) -> Option<EventId> {
    headers
        .get(HEADER_LAST_EVENT_ID)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<EventId>().ok())
}

fn envelope_stream(
    bus: &EventBus,
    since: Option<EventId>,
    batch: Option<String>,
) -> impl Stream<Item = EventEnvelope> + use<> {
    let subscription = bus.subscribe(since);
    stream::unfold(subscription, |mut subscription| async move {
        subscription
            .next()
            .await
            .map(|envelope| (envelope, subscription))
    })
    .filter(move |envelope| {
        let keep = batch
            .as_deref()
            .is_none_or(|prefix| envelope.event.batch_prefix() == prefix);
        future::ready(keep)
    })
}

fn to_sse(envelope: &EventEnvelope) -> Option<sse::Event> {
    match serde_json::to_string(envelope) {
        Ok(data) => Some(
            sse::Event::default()
                .id(envelope.id.to_string())
                .event(envelope.event.kind())
                .data(data),
        ),
        Err(err) => {
            warn!(event_id = envelope.id, error = %err, "failed to encode event for stream");
            None
        }
    }
}
