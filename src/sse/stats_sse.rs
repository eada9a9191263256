use crate::analytics::PollStats;
use crate::error::PollError;
use crate::extractors::QuestionId;
use crate::sse::models::SseEvent;
use crate::startup::AppState;
use crate::stats::load_poll_stats;
use axum::{
    extract::Extension,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use serde_json::json;
use std::{convert::Infallible, time::Duration};
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};

fn stats_event(name: &str, stats: &PollStats) -> Event {
    Event::default().event(name).data(json!(stats).to_string())
}

/// Pushes the statistics of one poll every time its votes change.
pub async fn poll_stats_sse(
    Extension(app_state): Extension<AppState>,
    QuestionId(question_id): QuestionId,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut updates = BroadcastStream::new(app_state.events.subscribe());

    let stream = async_stream::stream! {
        match load_poll_stats(app_state.store.as_ref(), question_id).await {
            Ok(stats) => {
                yield Ok(stats_event("init", &stats));
            }
            Err(PollError::QuestionNotFound) => {
                yield Ok(Event::default()
                    .event("error")
                    .data(json!({"error": "Question not found"}).to_string()));
                return;
            }
            Err(e) => {
                error!("failed to load statistics for poll {question_id}: {e}");
                yield Ok(Event::default()
                    .event("error")
                    .data(json!({"error": "Failed to load statistics"}).to_string()));
                return;
            }
        }

        while let Some(received) = updates.next().await {
            let event = match received {
                Ok(event) => event,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    debug!("stats stream for poll {question_id} skipped {skipped} events");
                    continue;
                }
            };
            if event.question_id() != question_id {
                continue;
            }

            if let SseEvent::QuestionDeleted(_) = event {
                yield Ok(Event::default()
                    .event("poll_deleted")
                    .data(json!({"question_id": question_id}).to_string()));
                break;
            }

            match load_poll_stats(app_state.store.as_ref(), question_id).await {
                Ok(stats) => {
                    yield Ok(stats_event("stats", &stats));
                }
                Err(e) => {
                    warn!("stats stream for poll {question_id} could not refresh: {e}");
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    )
}
