use tokio::time::{timeout, Duration};
use uuid::Uuid;

use service_queue_cell::*;

fn completed(appointment_id: Option<Uuid>) -> QueueEvent {
    QueueEvent::ServiceCompleted {
        task_id: Uuid::new_v4(),
        appointment_id,
        service_id: Uuid::new_v4(),
        results: None,
    }
}

#[tokio::test]
async fn test_global_subscribers_see_every_event() {
    let bus = QueueEventBus::new();
    let mut billing = bus.subscribe_global();
    let mut records = bus.subscribe_global();

    let event = completed(None);
    bus.publish(event.clone()).await;

    assert_eq!(billing.recv().await.unwrap(), event);
    assert_eq!(records.recv().await.unwrap(), event);
}

#[tokio::test]
async fn test_appointment_channel_only_sees_its_own_events() {
    let bus = QueueEventBus::new();
    let appointment_id = Uuid::new_v4();
    let mut channel = bus.create_channel(appointment_id).await;

    bus.publish(completed(Some(Uuid::new_v4()))).await;
    bus.publish(completed(None)).await;
    let mine = QueueEvent::AppointmentCancelled {
        appointment_id,
        reason: "patient request".into(),
    };
    bus.publish(mine.clone()).await;

    assert_eq!(channel.recv().await.unwrap(), mine);
    assert!(timeout(Duration::from_millis(50), channel.recv()).await.is_err());
}

#[tokio::test]
async fn test_channels_are_shared_between_clones_and_removable() {
    let bus = QueueEventBus::default();
    let appointment_id = Uuid::new_v4();
    let _receiver = bus.create_channel(appointment_id).await;

    let cloned = bus.clone();
    assert_eq!(cloned.get_active_channels().await, vec![appointment_id]);

    cloned.remove_channel(appointment_id).await;
    assert!(bus.get_active_channels().await.is_empty());
}

#[tokio::test]
async fn test_publish_without_subscribers_is_harmless() {
    let bus = QueueEventBus::new();
    bus.publish(completed(Some(Uuid::new_v4()))).await;
    assert!(bus.get_active_channels().await.is_empty());
}

#[tokio::test]
async fn test_abandoned_channel_is_dropped_on_next_event() {
    let bus = QueueEventBus::new();
    let appointment_id = Uuid::new_v4();
    let receiver = bus.create_channel(appointment_id).await;
    drop(receiver);
    assert_eq!(bus.get_active_channels().await, vec![appointment_id]);

    bus.publish(completed(Some(appointment_id))).await;
    assert!(bus.get_active_channels().await.is_empty());
}

#[tokio::test]
async fn test_channel_with_a_live_receiver_is_kept() {
    let bus = QueueEventBus::new();
    let appointment_id = Uuid::new_v4();
    let mut receiver = bus.create_channel(appointment_id).await;

    let event = completed(Some(appointment_id));
    bus.publish(event.clone()).await;

    assert_eq!(receiver.recv().await.unwrap(), event);
    assert_eq!(bus.get_active_channels().await, vec![appointment_id]);
}
