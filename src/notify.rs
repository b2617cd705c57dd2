use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::model::BookingEvent;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("event sink closed")]
    Closed,
    #[error("event sink unavailable: {0}")]
    Unavailable(String),
}

/// Receiver of booking lifecycle events. Called with the room lock held, so
/// implementations must not block; hand off to a task for anything slow.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &BookingEvent) -> Result<(), SinkError>;
}

/// Broadcast hub for LISTEN subscriptions: one channel per room plus one for all rooms.
pub struct NotifyHub {
    rooms: DashMap<String, broadcast::Sender<BookingEvent>>,
    all: broadcast::Sender<BookingEvent>,
    capacity: usize,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            rooms: DashMap::new(),
            all: broadcast::channel(capacity).0,
            capacity,
        }
    }

    /// Subscribe to one room's events. Creates the channel if needed.
    pub fn subscribe(&self, room_id: &str) -> broadcast::Receiver<BookingEvent> {
        let sender = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        sender.subscribe()
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<BookingEvent> {
        self.all.subscribe()
    }

    /// Drop a room channel once nobody listens on it.
    pub fn prune(&self, room_id: &str) {
        self.rooms
            .remove_if(room_id, |_, sender| sender.receiver_count() == 0);
    }

    pub fn room_channels(&self) -> usize {
        self.rooms.len()
    }
}

impl EventSink for NotifyHub {
    /// No-op if nobody is listening. A move also reaches the room it left.
    fn publish(&self, event: &BookingEvent) -> Result<(), SinkError> {
        if let Some(sender) = self.rooms.get(event.room_id()) {
            let _ = sender.send(event.clone());
        }
        if let Some(previous) = event.previous_room_id.as_deref() {
            if previous != event.room_id() {
                if let Some(sender) = self.rooms.get(previous) {
                    let _ = sender.send(event.clone());
                }
            }
        }
        let _ = self.all.send(event.clone());
        Ok(())
    }
}
