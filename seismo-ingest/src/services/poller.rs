//! Background poll loop
//!
//! Runs a processing cycle, announces each newly stored event to live
//! subscribers, then sleeps. Cancellation is checked between cycles and
//! while sleeping; a cycle in progress always runs to completion.

use seismo_common::events::{NotificationHub, SeismoEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::seismic_processor::SeismicProcessor;

/// Broadcast a `new_earthquake` notification for each stored event id
///
/// Returns how many notifications were sent. Ids that cannot be loaded are
/// logged and skipped.
pub async fn announce_processed(processor: &SeismicProcessor, hub: &NotificationHub, event_ids: &[String]) -> usize {
    let mut announced = 0;

    for event_id in event_ids {
        match processor.get_event_with_impacts(event_id).await {
            Ok(Some(data)) => {
                let delivered = hub.broadcast(SeismoEvent::new_earthquake(data)).await;
                tracing::debug!(event_id = %event_id, delivered, "Announced new earthquake");
                announced += 1;
            }
            Ok(None) => {
                tracing::warn!(event_id = %event_id, "Processed event not found for announcement");
            }
            Err(e) => {
                tracing::error!(event_id = %event_id, error = %e, "Failed to load processed event");
            }
        }
    }

    announced
}

/// Spawn the poll loop
///
/// `active` is set while the loop runs and cleared when it exits.
pub fn spawn_poller(
    processor: Arc<SeismicProcessor>,
    hub: NotificationHub,
    interval: Duration,
    token: CancellationToken,
    active: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        active.store(true, Ordering::SeqCst);
        tracing::info!(interval_secs = interval.as_secs(), "Earthquake polling started");

        while !token.is_cancelled() {
            let report = processor.process_new_earthquakes().await;

            if !report.processed.is_empty() {
                let announced = announce_processed(&processor, &hub, &report.processed).await;
                tracing::info!(count = announced, "Broadcast new earthquakes");
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        active.store(false, Ordering::SeqCst);
        tracing::info!("Earthquake polling stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;
    use crate::services::feed_client::{FeedQuery, SeismicFeed};
    use crate::services::inference::ImpactInferenceClient;
    use async_trait::async_trait;
    use chrono::Utc;
    use seismo_common::SeismicEvent;
    use std::sync::atomic::AtomicUsize;

    /// Returns the same single event on every call
    struct RepeatingFeed {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SeismicFeed for RepeatingFeed {
        async fn fetch_recent_earthquakes(&self, _query: &FeedQuery) -> Vec<SeismicEvent> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            vec![SeismicEvent {
                event_id: "usgs-001".to_string(),
                magnitude: 6.2,
                depth_km: 10.0,
                latitude: 35.0,
                longitude: 139.0,
                occurred_at: Utc::now(),
                place: "Test".to_string(),
                impact_radius_km: None,
                source: "USGS".to_string(),
            }]
        }

        async fn fetch_single_earthquake(&self, _event_id: &str) -> Option<SeismicEvent> {
            None
        }
    }

    #[tokio::test]
    async fn test_poller_announces_once_and_stops_on_cancel() {
        let pool = init_memory_pool().await.unwrap();
        let feed = Arc::new(RepeatingFeed {
            calls: AtomicUsize::new(0),
        });
        let processor = Arc::new(SeismicProcessor::new(
            pool,
            feed.clone(),
            ImpactInferenceClient::new(None),
            chrono::Duration::hours(24),
        ));
        let hub = NotificationHub::new(8);
        let mut sub = hub.subscribe().await;
        let token = CancellationToken::new();
        let active = Arc::new(AtomicBool::new(false));

        let handle = spawn_poller(
            processor,
            hub.clone(),
            Duration::from_millis(10),
            token.clone(),
            active.clone(),
        );

        let first = tokio::time::timeout(Duration::from_secs(5), sub.receiver.recv())
            .await
            .expect("announcement within timeout")
            .expect("channel open");
        assert_eq!(first.event_type(), "new_earthquake");

        // Let a few more cycles run; the event is already stored so nothing new is sent
        while feed.calls.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(active.load(Ordering::SeqCst));

        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("poller exits after cancel")
            .unwrap();

        assert!(!active.load(Ordering::SeqCst));
        assert!(sub.receiver.try_recv().is_err(), "no duplicate announcement");
    }
}
