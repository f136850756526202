//! Live event feed for UI clients, as server-sent events.
//!
//! `GET /api/events` streams every event; `?category=player` or
//! `?category=source` narrows it. Each SSE event is named after its category
//! and carries the JSON form of the event.

use std::convert::Infallible;
use std::time::Instant;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use crate::api::AppState;
use crate::error::{SlimHubError, SlimHubResult};
use crate::events::{BroadcastEvent, EventFilter, EventKind, EventSubscription};

#[derive(Debug, Deserialize)]
pub(super) struct EventsQuery {
    category: Option<String>,
}

fn filter_for(category: Option<&str>) -> SlimHubResult<EventFilter> {
    match category {
        None => Ok(EventFilter::all()),
        Some("player") => Ok(EventFilter::only(EventKind::PLAYER)),
        Some("source") => Ok(EventFilter::only(EventKind::SOURCE)),
        Some(other) => Err(SlimHubError::InvalidRequest(format!(
            "unknown event category: {}",
            other
        ))),
    }
}

fn to_sse(event: &BroadcastEvent) -> Event {
    let name = match event {
        BroadcastEvent::Player(_) => "player",
        BroadcastEvent::Source(_) => "source",
    };
    Event::default()
        .event(name)
        .json_data(event)
        .unwrap_or_else(|e| {
            log::warn!("[Events] Failed to serialize {:?}: {}", event.kind(), e);
            Event::default().event("error").data(e.to_string())
        })
}

/// Logs how long a client stayed subscribed.
struct FeedGuard {
    started: Instant,
}

impl Drop for FeedGuard {
    fn drop(&mut self) {
        log::info!("[Events] Client left after {:?}", self.started.elapsed());
    }
}

fn event_stream(
    subscription: EventSubscription,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    let guard = FeedGuard {
        started: Instant::now(),
    };
    stream::unfold(
        (subscription, guard),
        |(mut subscription, guard)| async move {
            let event = subscription.recv().await?;
            Some((to_sse(&event), (subscription, guard)))
        },
    )
    .map(Ok)
}

pub(super) async fn stream_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> SlimHubResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let filter = filter_for(query.category.as_deref())?;
    let subscription = state.event_bridge.subscribe_filtered(filter);
    log::info!(
        "[Events] Client subscribed ({})",
        query.category.as_deref().unwrap_or("all")
    );
    Ok(Sse::new(event_stream(subscription)).keep_alive(KeepAlive::default()))
}
