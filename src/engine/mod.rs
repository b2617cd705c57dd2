mod availability;
mod catalog;
mod conflict;
mod error;
mod ledger;
mod mutations;
mod queries;
mod schedule;

pub use availability::{free_windows, merge_overlapping, subtract_intervals};
pub use catalog::{RoomCatalog, RoomState, SharedRoom};
pub use conflict::{find_conflict, has_conflict, overlaps};
pub use error::{EngineError, ErrorKind};
pub use ledger::ReservationLedger;
pub use schedule::{Booking, RoomSchedule};

use std::sync::{Arc, Mutex};

use tokio::sync::OwnedRwLockWriteGuard;
use tracing::warn;
use ulid::Generator;

use crate::limits::MAX_RESERVATIONS_PER_ROOM;
use crate::model::*;
use crate::notify::EventSink;
use crate::observability::*;

/// The booking core: a room catalog, a reservation ledger, and the rules tying
/// them together. Share it behind an `Arc`; every operation takes `&self`.
pub struct BookingEngine {
    pub(super) catalog: RoomCatalog,
    pub(super) ledger: ReservationLedger,
    sink: Arc<dyn EventSink>,
    ids: Mutex<Generator>,
    reservation_limit: usize,
}

/// Write guards for the room a reservation lives in and the room it is moving
/// to. `target` is `None` when both are the same room.
pub(super) struct RoomLocks {
    source: OwnedRwLockWriteGuard<RoomState>,
    target: Option<OwnedRwLockWriteGuard<RoomState>>,
}

impl RoomLocks {
    pub(super) fn target(&self) -> &RoomState {
        self.target.as_deref().unwrap_or(&self.source)
    }

    pub(super) fn source_mut(&mut self) -> &mut RoomState {
        &mut *self.source
    }

    pub(super) fn target_mut(&mut self) -> &mut RoomState {
        match self.target.as_mut() {
            Some(target) => &mut **target,
            None => &mut *self.source,
        }
    }
}

impl BookingEngine {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            catalog: RoomCatalog::new(),
            ledger: ReservationLedger::new(),
            sink,
            ids: Mutex::new(Generator::new()),
            reservation_limit: MAX_RESERVATIONS_PER_ROOM,
        }
    }

    /// Cap reservations per room below the default.
    pub fn with_reservation_limit(mut self, limit: usize) -> Self {
        self.reservation_limit = limit;
        self
    }

    pub fn reservation_limit(&self) -> usize {
        self.reservation_limit
    }

    pub fn catalog(&self) -> &RoomCatalog {
        &self.catalog
    }

    pub fn ledger(&self) -> &ReservationLedger {
        &self.ledger
    }

    /// Next reservation id; strictly increasing for the life of the engine.
    pub(super) fn next_id(&self) -> Result<ReservationId, EngineError> {
        let mut generator = self
            .ids
            .lock()
            .map_err(|_| EngineError::Internal("id generator poisoned".into()))?;
        generator
            .generate()
            .map_err(|e| EngineError::Internal(format!("id generation failed: {e}")))
    }

    /// Hand an event to the sink. Failures are logged and counted, never returned.
    ///
    /// `previous_room` is the room a moved reservation left, so its listeners
    /// hear about the move too.
    pub(super) fn emit(
        &self,
        kind: EventKind,
        reservation: &Reservation,
        previous_room: Option<&str>,
    ) {
        let label = match kind {
            EventKind::Created => "created",
            EventKind::Updated => "updated",
            EventKind::Cancelled => "cancelled",
        };
        let event = match previous_room {
            Some(from) if from != reservation.room_id => {
                BookingEvent::moved(reservation.clone(), from.to_string())
            }
            _ => BookingEvent::new(kind, reservation.clone()),
        };
        match self.sink.publish(&event) {
            Ok(()) => metrics::counter!(EVENTS_PUBLISHED_TOTAL, "type" => label).increment(1),
            Err(e) => {
                warn!("dropped {label} event for reservation {}: {e}", reservation.id);
                metrics::counter!(EVENTS_DROPPED_TOTAL).increment(1);
            }
        }
    }

    pub(super) fn record_sizes(&self) {
        metrics::gauge!(ROOMS_ACTIVE).set(self.catalog.len() as f64);
        metrics::gauge!(RESERVATIONS_ACTIVE).set(self.ledger.len() as f64);
    }

    /// Write-lock `source` and `target` in ascending id order so two moves in
    /// opposite directions cannot deadlock.
    pub(super) async fn lock_rooms(
        &self,
        source: &str,
        target: &str,
    ) -> Result<RoomLocks, EngineError> {
        let source_rs = self.catalog.resolve(source)?;
        if source == target {
            return Ok(RoomLocks {
                source: source_rs.write_owned().await,
                target: None,
            });
        }
        let target_rs = self.catalog.resolve(target)?;
        let (source, target) = if source < target {
            let s = source_rs.write_owned().await;
            let t = target_rs.write_owned().await;
            (s, t)
        } else {
            let t = target_rs.write_owned().await;
            let s = source_rs.write_owned().await;
            (s, t)
        };
        Ok(RoomLocks {
            source,
            target: Some(target),
        })
    }
}
