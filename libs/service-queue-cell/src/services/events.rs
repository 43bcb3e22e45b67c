use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::QueueEvent;

pub type QueueEventSender = broadcast::Sender<QueueEvent>;
pub type QueueEventReceiver = broadcast::Receiver<QueueEvent>;

/// Fan-out of queue events: every event reaches global subscribers (billing,
/// medical records), and events tied to an appointment also reach that
/// appointment's channel.
pub struct QueueEventBus {
    channels: Arc<RwLock<HashMap<Uuid, QueueEventSender>>>,
    global_sender: QueueEventSender,
}

impl QueueEventBus {
    pub fn new() -> Self {
        let (global_sender, _) = broadcast::channel(1000);

        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            global_sender,
        }
    }

    pub async fn create_channel(&self, appointment_id: Uuid) -> QueueEventReceiver {
        let mut channels = self.channels.write().await;
        let sender = channels
            .entry(appointment_id)
            .or_insert_with(|| broadcast::channel(100).0);

        debug!("Subscribed to events for appointment {}", appointment_id);
        sender.subscribe()
    }

    pub async fn remove_channel(&self, appointment_id: Uuid) {
        let mut channels = self.channels.write().await;
        channels.remove(&appointment_id);
        debug!("Removed event channel for appointment {}", appointment_id);
    }

    /// A channel whose receivers are all gone is dropped on the next event for it.
    pub async fn publish(&self, event: QueueEvent) {
        if let Some(appointment_id) = event.appointment_id() {
            let undelivered = {
                let channels = self.channels.read().await;
                match channels.get(&appointment_id) {
                    Some(sender) => sender.send(event.clone()).is_err(),
                    None => false,
                }
            };

            if undelivered {
                let mut channels = self.channels.write().await;
                if channels
                    .get(&appointment_id)
                    .is_some_and(|sender| sender.receiver_count() == 0)
                {
                    channels.remove(&appointment_id);
                    warn!(
                        "Dropped event channel for appointment {}: no receivers left",
                        appointment_id
                    );
                }
            }
        }

        // No global subscriber is not an error.
        if let Err(e) = self.global_sender.send(event) {
            debug!("No global subscriber for queue event: {}", e);
        }
    }

    pub fn subscribe_global(&self) -> QueueEventReceiver {
        self.global_sender.subscribe()
    }

    pub async fn get_active_channels(&self) -> Vec<Uuid> {
        let channels = self.channels.read().await;
        channels.keys().cloned().collect()
    }
}

impl Default for QueueEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for QueueEventBus {
    fn clone(&self) -> Self {
        Self {
            channels: Arc::clone(&self.channels),
            global_sender: self.global_sender.clone(),
        }
    }
}
