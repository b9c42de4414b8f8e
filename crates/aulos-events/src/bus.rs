use tokio::sync::broadcast;
use tracing::trace;

use crate::PlayerEvent;

/// Broadcast bus for [`PlayerEvent`]s.
///
/// Slow subscribers lag rather than block publishers; publishing never
/// fails even with zero subscribers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: PlayerEvent) {
        trace!(?event, "event published");
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(32)
    }
}

#[cfg(test)]
mod tests {
    use aulos_core::TrackType;

    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(PlayerEvent::EndOfStream {
            track: TrackType::Video,
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            PlayerEvent::EndOfStream {
                track: TrackType::Video
            }
        ));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let bus = EventBus::new(8);
        bus.publish(PlayerEvent::InitialCachingComplete { cached_secs: 4.0 });
    }
}
