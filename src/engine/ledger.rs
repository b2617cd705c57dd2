use dashmap::DashMap;

use crate::model::*;

/// Every live reservation, keyed by id, with per-room and per-client indexes.
///
/// Index vectors are kept sorted by id, which is creation order because ids come
/// from a monotonic generator. Mutations for a given room are serialized by that
/// room's lock in the catalog; the ledger itself only guarantees that each entry
/// is swapped as a whole.
pub struct ReservationLedger {
    entries: DashMap<ReservationId, Reservation>,
    by_room: DashMap<String, Vec<ReservationId>>,
    by_client: DashMap<String, Vec<ReservationId>>,
}

impl Default for ReservationLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl ReservationLedger {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            by_room: DashMap::new(),
            by_client: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn add(&self, reservation: Reservation) {
        let id = reservation.id;
        index_insert(&self.by_room, &reservation.room_id, id);
        index_insert(&self.by_client, &reservation.client_id, id);
        self.entries.insert(id, reservation);
    }

    pub fn get(&self, id: &ReservationId) -> Option<Reservation> {
        self.entries.get(id).map(|e| e.value().clone())
    }

    pub fn remove(&self, id: &ReservationId) -> Option<Reservation> {
        let (_, removed) = self.entries.remove(id)?;
        index_remove(&self.by_room, &removed.room_id, id);
        index_remove(&self.by_client, &removed.client_id, id);
        Some(removed)
    }

    /// Swap in an already-validated reservation, returning the previous one.
    ///
    /// New index positions are added before the entry swap and stale ones removed
    /// after, so a reader listing by room or client sees either the old or the new
    /// reservation and never loses it.
    pub fn replace(&self, id: &ReservationId, updated: Reservation) -> Option<Reservation> {
        debug_assert_eq!(*id, updated.id);
        let previous = self.get(id)?;
        let room_changed = previous.room_id != updated.room_id;
        let client_changed = previous.client_id != updated.client_id;

        if room_changed {
            index_insert(&self.by_room, &updated.room_id, *id);
        }
        if client_changed {
            index_insert(&self.by_client, &updated.client_id, *id);
        }
        self.entries.insert(*id, updated);
        if room_changed {
            index_remove(&self.by_room, &previous.room_id, id);
        }
        if client_changed {
            index_remove(&self.by_client, &previous.client_id, id);
        }
        Some(previous)
    }

    pub fn list_by_room(&self, room_id: &str) -> Vec<Reservation> {
        self.collect(&self.by_room, room_id, |r| r.room_id == room_id)
    }

    pub fn list_by_client(&self, client_id: &str) -> Vec<Reservation> {
        self.collect(&self.by_client, client_id, |r| r.client_id == client_id)
    }

    pub fn has_reservations(&self, room_id: &str) -> bool {
        self.count_for_room(room_id) > 0
    }

    pub fn count_for_room(&self, room_id: &str) -> usize {
        self.by_room.get(room_id).map_or(0, |ids| ids.len())
    }

    fn collect(
        &self,
        index: &DashMap<String, Vec<ReservationId>>,
        key: &str,
        belongs: impl Fn(&Reservation) -> bool,
    ) -> Vec<Reservation> {
        let ids = match index.get(key) {
            Some(ids) => ids.value().clone(),
            None => return Vec::new(),
        };
        ids.iter()
            .filter_map(|id| self.entries.get(id).map(|e| e.value().clone()))
            // The index may briefly lead or trail an in-flight replace.
            .filter(|r| belongs(r))
            .collect()
    }
}

fn index_insert(index: &DashMap<String, Vec<ReservationId>>, key: &str, id: ReservationId) {
    let mut ids = index.entry(key.to_string()).or_default();
    if let Err(pos) = ids.binary_search(&id) {
        ids.insert(pos, id);
    }
}

fn index_remove(index: &DashMap<String, Vec<ReservationId>>, key: &str, id: &ReservationId) {
    if let Some(mut ids) = index.get_mut(key) {
        ids.retain(|i| i != id);
    }
    index.remove_if(key, |_, ids| ids.is_empty());
}
