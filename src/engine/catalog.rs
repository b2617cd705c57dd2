use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;

use crate::limits::*;
use crate::model::*;

use super::EngineError;
use super::schedule::RoomSchedule;

pub type SharedRoom = Arc<RwLock<RoomState>>;

/// A room plus the bookkeeping the catalog needs. The lock around it is the
/// per-room critical section for every reservation mutation on that room.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub room: Room,
    /// Insertion sequence; defines listing order.
    pub(crate) seq: u64,
    /// Set under the write lock right before the room leaves the catalog.
    pub(crate) deleted: bool,
    /// Bookings held in this room, kept in step with the ledger.
    pub(crate) schedule: RoomSchedule,
}

pub struct RoomCatalog {
    rooms: DashMap<String, SharedRoom>,
    next_seq: AtomicU64,
}

impl Default for RoomCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomCatalog {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn get_shared(&self, id: &str) -> Option<SharedRoom> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    /// Resolve a room or fail with `RoomNotFound`.
    pub fn resolve(&self, id: &str) -> Result<SharedRoom, EngineError> {
        self.get_shared(id)
            .ok_or_else(|| EngineError::RoomNotFound(id.to_string()))
    }

    pub fn create(&self, new: NewRoom) -> Result<Room, EngineError> {
        validate_id("room id", &new.id)?;
        validate_text("room name", &new.name)?;
        validate_text("room location", &new.location)?;
        if new.capacity == 0 {
            return Err(EngineError::InvalidArgument("capacity must be positive".into()));
        }
        if self.rooms.len() >= MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }

        let room = new.into_room();
        match self.rooms.entry(room.id.clone()) {
            Entry::Occupied(_) => Err(EngineError::RoomExists(room.id)),
            Entry::Vacant(slot) => {
                let state = RoomState {
                    room: room.clone(),
                    seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                    deleted: false,
                    schedule: RoomSchedule::new(),
                };
                slot.insert(Arc::new(RwLock::new(state)));
                Ok(room)
            }
        }
    }

    pub async fn get(&self, id: &str) -> Result<Room, EngineError> {
        let shared = self.resolve(id)?;
        let guard = shared.read().await;
        if guard.deleted {
            return Err(EngineError::RoomNotFound(id.to_string()));
        }
        Ok(guard.room.clone())
    }

    pub async fn update(&self, id: &str, patch: RoomPatch) -> Result<Room, EngineError> {
        if let Some(name) = &patch.name {
            validate_text("room name", name)?;
        }
        if let Some(location) = &patch.location {
            validate_text("room location", location)?;
        }
        if patch.capacity == Some(0) {
            return Err(EngineError::InvalidArgument("capacity must be positive".into()));
        }

        let shared = self.resolve(id)?;
        let mut guard = shared.write().await;
        if guard.deleted {
            return Err(EngineError::RoomNotFound(id.to_string()));
        }
        patch.apply(&mut guard.room);
        Ok(guard.room.clone())
    }

    /// Drop a room whose write lock the caller holds. Marks the state deleted so
    /// anyone already holding the `Arc` sees it as gone.
    pub(crate) fn remove_locked(&self, shared: &SharedRoom, state: &mut RoomState) {
        state.deleted = true;
        self.rooms
            .remove_if(&state.room.id, |_, current| Arc::ptr_eq(current, shared));
    }

    /// Rooms matching `query`, in insertion order.
    pub async fn search(&self, query: &RoomQuery) -> Vec<Room> {
        // Clone the Arcs first: no DashMap guard may be held across an await.
        let shared: Vec<SharedRoom> = self.rooms.iter().map(|e| e.value().clone()).collect();
        let mut hits = Vec::new();
        for rs in shared {
            let guard = rs.read().await;
            if !guard.deleted && query.matches(&guard.room) {
                hits.push((guard.seq, guard.room.clone()));
            }
        }
        hits.sort_by_key(|(seq, _)| *seq);
        hits.into_iter().map(|(_, room)| room).collect()
    }

    pub async fn list(&self) -> Vec<Room> {
        self.search(&RoomQuery::default()).await
    }
}

pub(crate) fn validate_id(what: &'static str, id: &str) -> Result<(), EngineError> {
    if id.trim().is_empty() {
        return Err(EngineError::InvalidArgument(format!("{what} is required")));
    }
    if id.len() > MAX_ID_LEN {
        return Err(EngineError::LimitExceeded("id too long"));
    }
    Ok(())
}

fn validate_text(what: &'static str, value: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::InvalidArgument(format!("{what} is required")));
    }
    if value.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    Ok(())
}
