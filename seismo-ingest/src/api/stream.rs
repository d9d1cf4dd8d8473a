//! Live earthquake stream
//!
//! Clients receive a `connection` event on subscribe, then one
//! `new_earthquake` event per processed earthquake.

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use seismo_common::sse::create_notification_sse_stream;
use std::convert::Infallible;

use crate::AppState;

/// GET /api/stream - SSE stream of new earthquakes
pub async fn earthquake_stream(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    create_notification_sse_stream(state.hub.clone(), state.shutdown.child_token(), "seismo-ingest")
}
