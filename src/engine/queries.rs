use chrono::NaiveDate;

use crate::model::*;

use super::availability::free_windows;
use super::catalog::validate_id;
use super::conflict::{has_conflict, validate_slot};
use super::{BookingEngine, EngineError};

impl BookingEngine {
    pub async fn get_room(&self, id: &str) -> Result<Room, EngineError> {
        self.catalog.get(id).await
    }

    pub async fn list_rooms(&self) -> Vec<Room> {
        self.catalog.list().await
    }

    pub async fn search_rooms(&self, query: &RoomQuery) -> Vec<Room> {
        self.catalog.search(query).await
    }

    pub fn get_reservation(&self, id: &ReservationId) -> Result<Reservation, EngineError> {
        self.ledger
            .get(id)
            .ok_or(EngineError::ReservationNotFound(*id))
    }

    /// Reservations on a room in creation order. Unknown rooms are `RoomNotFound`.
    pub async fn list_by_room(&self, room_id: &str) -> Result<Vec<Reservation>, EngineError> {
        let shared = self.catalog.resolve(room_id)?;
        let guard = shared.read().await;
        if guard.deleted {
            return Err(EngineError::RoomNotFound(room_id.to_string()));
        }
        Ok(self.ledger.list_by_room(room_id))
    }

    /// Reservations held by a client in creation order. Clients are opaque, so an
    /// unknown client simply has none.
    pub fn list_by_client(&self, client_id: &str) -> Vec<Reservation> {
        self.ledger.list_by_client(client_id)
    }

    /// Whether `reserve` would accept this slot right now. A room at its
    /// reservation limit has no availability.
    pub async fn check_availability(&self, room_id: &str, slot: Slot) -> Result<bool, EngineError> {
        validate_id("room id", room_id)?;
        validate_slot(&slot)?;
        let shared = self.catalog.resolve(room_id)?;
        let guard = shared.read().await;
        if guard.deleted {
            return Err(EngineError::RoomNotFound(room_id.to_string()));
        }
        if !guard.room.available || guard.schedule.len() >= self.reservation_limit {
            return Ok(false);
        }
        Ok(!has_conflict(&guard.schedule, &slot, None))
    }

    /// Unbooked windows of `room_id` on `date` within `within`. Empty for a
    /// closed room.
    pub async fn free_slots(
        &self,
        room_id: &str,
        date: NaiveDate,
        within: Window,
    ) -> Result<Vec<Window>, EngineError> {
        validate_slot(&Slot::new(date, within.start, within.end))?;
        let shared = self.catalog.resolve(room_id)?;
        let guard = shared.read().await;
        if guard.deleted {
            return Err(EngineError::RoomNotFound(room_id.to_string()));
        }
        if !guard.room.available {
            return Ok(Vec::new());
        }
        let booked: Vec<Window> = guard.schedule.day(date).iter().map(|b| b.window).collect();
        Ok(free_windows(&within, &booked))
    }
}
