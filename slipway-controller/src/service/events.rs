//! Event Bus
//!
//! In-process broadcast of [`ControllerEvent`]s. Publishing never blocks;
//! subscribers that fall behind lose the oldest events. There is no replay.

use slipway_core::domain::event::ControllerEvent;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ControllerEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: ControllerEvent) {
        // No subscribers is not an error
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.sender.subscribe()
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
    use uuid::Uuid;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.publish(ControllerEvent::BuildQueued {
            job_id: Uuid::new_v4(),
            pipeline_id: Uuid::new_v4(),
        });

        let mut rx = bus.subscribe();
        let job_id = Uuid::new_v4();
        bus.publish(ControllerEvent::BuildQueued {
            job_id,
            pipeline_id: Uuid::new_v4(),
        });

        match rx.recv().await.unwrap() {
            ControllerEvent::BuildQueued { job_id: got, .. } => assert_eq!(got, job_id),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
