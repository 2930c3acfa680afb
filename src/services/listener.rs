//! Adapter feeding a store's change feed into a [`ChangeListener`].

use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::ChangeEvent;
use crate::traits::ChangeListener;

/// Drain `events` until the feed closes, handling each event in its own task.
///
/// Delivery is at-most-once: when the subscriber lags behind the feed the
/// skipped events are logged and lost.
pub async fn run_change_feed(
    listener: Arc<dyn ChangeListener>,
    mut events: broadcast::Receiver<ChangeEvent>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let listener = Arc::clone(&listener);
                tokio::spawn(async move {
                    let outcome = listener.on_change(event).await;
                    debug!(?outcome, "Change event handled");
                });
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Change feed subscriber lagged, events dropped");
            }
            Err(RecvError::Closed) => {
                info!("Change feed closed");
                break;
            }
        }
    }
}

/// Spawn [`run_change_feed`] on the runtime.
pub fn spawn_change_feed(
    listener: Arc<dyn ChangeListener>,
    events: broadcast::Receiver<ChangeEvent>,
) -> JoinHandle<()> {
    tokio::spawn(run_change_feed(listener, events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EnrichmentOutcome, SkipReason, WardrobeItem};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct Recorder(mpsc::UnboundedSender<String>);

    #[async_trait]
    impl ChangeListener for Recorder {
        async fn on_change(&self, event: ChangeEvent) -> EnrichmentOutcome {
            let _ = self.0.send(event.record_id().unwrap_or_default().to_string());
            EnrichmentOutcome::skipped(SkipReason::NoDocument)
        }
    }

    #[tokio::test]
    async fn test_events_reach_listener_until_closed() {
        let (tx, rx) = broadcast::channel(8);
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

        let handle = spawn_change_feed(Arc::new(Recorder(seen_tx)), rx);
        tx.send(ChangeEvent::insert(WardrobeItem::new("a", "cap")))
            .unwrap();
        tx.send(ChangeEvent::delete("b")).unwrap();
        drop(tx);

        handle.await.unwrap();
        let mut seen = vec![seen_rx.recv().await.unwrap(), seen_rx.recv().await.unwrap()];
        seen.sort();
        assert_eq!(seen, vec!["a", "b"]);
    }
}
