//! Server-Sent Events (SSE) utilities
//!
//! Bridges a [`NotificationHub`] subscription onto an axum SSE response.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::{NotificationHub, SeismoEvent};

/// Interval between heartbeat comments on idle streams
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Serialize a hub event into an SSE frame named after its type
pub fn to_sse_event(event: &SeismoEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event.event_type()).data(json)),
        Err(e) => {
            warn!("SSE: Failed to serialize event {}: {}", event.event_type(), e);
            None
        }
    }
}

/// Removes the subscriber from the hub when the stream is dropped
struct SubscriberGuard {
    hub: NotificationHub,
    id: Uuid,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        let hub = self.hub.clone();
        let id = self.id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { hub.unsubscribe(id).await });
            }
            Err(_) => debug!(subscriber = %id, "SSE: no runtime, leaving subscriber for broadcast pruning"),
        }
    }
}

/// Create an SSE stream that forwards every hub broadcast to one client
///
/// The client is registered with the hub when the stream starts and receives
/// a `connection` event first. The stream ends when `shutdown` is cancelled,
/// and the client is unregistered as soon as the stream is dropped.
///
/// # Arguments
/// * `hub` - Notification hub to subscribe to
/// * `shutdown` - Ends the stream so graceful shutdown can drain connections
/// * `service_name` - Name of the service for logging (e.g., "seismo-ingest")
pub fn create_notification_sse_stream(
    hub: NotificationHub,
    shutdown: CancellationToken,
    service_name: &'static str,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to {} live updates", service_name);

    let stream = async_stream::stream! {
        let mut subscription = hub.subscribe().await;
        let _guard = SubscriberGuard { hub: hub.clone(), id: subscription.id };
        info!(subscriber = %subscription.id, "SSE: {} event stream started", service_name);

        if let Some(frame) = to_sse_event(&SeismoEvent::connection()) {
            yield Ok(frame);
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(subscriber = %subscription.id, "SSE: closing stream for shutdown");
                    break;
                }

                _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                    debug!("SSE: Sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }

                message = subscription.receiver.recv() => {
                    match message {
                        Some(event) => {
                            debug!("SSE: Forwarding {} event", event.event_type());
                            if let Some(frame) = to_sse_event(&event) {
                                yield Ok(frame);
                            }
                        }
                        None => {
                            // Hub dropped us (lagging or shut down)
                            info!(subscriber = %subscription.id, "SSE: subscription closed");
                            break;
                        }
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}
