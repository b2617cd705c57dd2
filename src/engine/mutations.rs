use tracing::debug;

use crate::model::*;

use super::catalog::{RoomState, validate_id};
use super::conflict::{check_no_conflict, validate_slot};
use super::schedule::Booking;
use super::{BookingEngine, EngineError};

/// A room that is gone or closed takes no new reservations.
fn ensure_bookable(state: &RoomState) -> Result<(), EngineError> {
    if state.deleted {
        return Err(EngineError::RoomNotFound(state.room.id.clone()));
    }
    if !state.room.available {
        return Err(EngineError::RoomUnavailable(state.room.id.clone()));
    }
    Ok(())
}

impl BookingEngine {
    pub async fn create_room(&self, new: NewRoom) -> Result<Room, EngineError> {
        let room = self.catalog.create(new)?;
        debug!("room {} created", room.id);
        self.record_sizes();
        Ok(room)
    }

    pub async fn update_room(&self, id: &str, patch: RoomPatch) -> Result<Room, EngineError> {
        let room = self.catalog.update(id, patch).await?;
        debug!("room {id} updated");
        Ok(room)
    }

    pub async fn delete_room(&self, id: &str) -> Result<(), EngineError> {
        let shared = self.catalog.resolve(id)?;
        let mut guard = shared.write().await;
        if guard.deleted {
            return Err(EngineError::RoomNotFound(id.to_string()));
        }
        // Reservations only land on a room while its write lock is held.
        if self.ledger.has_reservations(id) {
            return Err(EngineError::HasReservations(id.to_string()));
        }
        self.catalog.remove_locked(&shared, &mut guard);
        drop(guard);

        debug!("room {id} deleted");
        self.record_sizes();
        Ok(())
    }

    /// Book a slot on a room. The single path behind every reservation entry point.
    ///
    /// Holds the room's write lock from the availability check through the
    /// ledger append, so two overlapping requests on one room cannot both win.
    pub async fn reserve(&self, req: NewReservation) -> Result<Reservation, EngineError> {
        validate_id("room id", &req.room_id)?;
        validate_id("client id", &req.client_id)?;
        let slot = req.slot();
        validate_slot(&slot)?;

        let shared = self.catalog.resolve(&req.room_id)?;
        let mut guard = shared.write().await;
        ensure_bookable(&guard)?;
        if guard.schedule.len() >= self.reservation_limit {
            return Err(EngineError::LimitExceeded("too many reservations on room"));
        }
        check_no_conflict(&guard.schedule, &slot, None)?;

        let reservation = Reservation {
            id: self.next_id()?,
            room_id: req.room_id,
            client_id: req.client_id,
            date: req.date,
            start: req.start,
            end: req.end,
        };
        guard.schedule.insert(
            reservation.date,
            Booking {
                id: reservation.id,
                window: slot.window(),
            },
        );
        self.ledger.add(reservation.clone());
        // Published under the lock: subscribers see events in commit order.
        self.emit(EventKind::Created, &reservation, None);
        drop(guard);

        debug!(
            "reservation {} booked on room {} for {} {}-{}",
            reservation.id, reservation.room_id, reservation.date, reservation.start, reservation.end
        );
        self.record_sizes();
        Ok(reservation)
    }

    /// Apply a partial update. Moving the slot or the room re-runs conflict
    /// detection against every other reservation on the target room.
    pub async fn update_reservation(
        &self,
        id: ReservationId,
        patch: ReservationPatch,
    ) -> Result<Reservation, EngineError> {
        if let Some(room_id) = &patch.room_id {
            validate_id("room id", room_id)?;
        }
        if let Some(client_id) = &patch.client_id {
            validate_id("client id", client_id)?;
        }

        loop {
            let current = self
                .ledger
                .get(&id)
                .ok_or(EngineError::ReservationNotFound(id))?;
            let merged = patch.merge(&current);
            validate_slot(&merged.slot())?;

            let mut locks = self.lock_rooms(&current.room_id, &merged.room_id).await?;
            match self.ledger.get(&id) {
                None => return Err(EngineError::ReservationNotFound(id)),
                // Changed while we waited for the locks; merge again from the new state.
                Some(latest) if latest != current => continue,
                Some(_) => {}
            }

            let target = locks.target();
            let moved_room = merged.room_id != current.room_id;
            if target.deleted {
                return Err(EngineError::RoomNotFound(merged.room_id));
            }
            if moved_room {
                ensure_bookable(target)?;
                if target.schedule.len() >= self.reservation_limit {
                    return Err(EngineError::LimitExceeded("too many reservations on room"));
                }
            }
            if moved_room || merged.slot() != current.slot() {
                check_no_conflict(&target.schedule, &merged.slot(), Some(&id))?;
            }

            locks.source_mut().schedule.remove(current.date, &id);
            locks.target_mut().schedule.insert(
                merged.date,
                Booking {
                    id,
                    window: merged.slot().window(),
                },
            );
            self.ledger.replace(&id, merged.clone());
            self.emit(EventKind::Updated, &merged, Some(current.room_id.as_str()));
            drop(locks);

            debug!("reservation {id} updated");
            return Ok(merged);
        }
    }

    /// Remove a reservation, returning it as it was at removal.
    pub async fn cancel_reservation(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        loop {
            let current = self
                .ledger
                .get(&id)
                .ok_or(EngineError::ReservationNotFound(id))?;
            let shared = self.catalog.resolve(&current.room_id)?;
            let mut guard = shared.write().await;
            match self.ledger.get(&id) {
                None => return Err(EngineError::ReservationNotFound(id)),
                // Moved to another room while we waited; lock that one instead.
                Some(latest) if latest.room_id != current.room_id => continue,
                Some(_) => {}
            }

            let removed = self
                .ledger
                .remove(&id)
                .ok_or(EngineError::ReservationNotFound(id))?;
            guard.schedule.remove(removed.date, &id);
            self.emit(EventKind::Cancelled, &removed, None);
            drop(guard);

            debug!("reservation {id} cancelled");
            self.record_sizes();
            return Ok(removed);
        }
    }
}
