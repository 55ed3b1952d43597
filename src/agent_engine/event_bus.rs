use tokio::sync::broadcast;

use super::state::ProgressEvent;

/// Fan-out of progress events to any number of observers (console, history).
///
/// Sending never fails the engine: with no subscriber the event is dropped.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ProgressEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    pub fn send(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("progress event dropped, no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_engine::state::InteractionState;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.send(ProgressEvent::StateChanged {
            state: InteractionState::Searching,
        });
        assert_eq!(
            rx.recv().await.unwrap(),
            ProgressEvent::StateChanged {
                state: InteractionState::Searching
            }
        );
    }

    #[test]
    fn sending_without_subscribers_is_fine() {
        EventBus::new().send(ProgressEvent::StateChanged {
            state: InteractionState::Idle,
        });
    }
}
