use crate::model::*;

use super::EngineError;
use super::schedule::RoomSchedule;

pub(crate) fn validate_slot(slot: &Slot) -> Result<(), EngineError> {
    if slot.start >= slot.end {
        return Err(EngineError::InvalidArgument(format!(
            "start {} must be before end {}",
            slot.start, slot.end
        )));
    }
    Ok(())
}

/// Two slots overlap iff they share a date and their half-open windows intersect.
pub fn overlaps(candidate: &Slot, existing: &Slot) -> bool {
    candidate.overlaps(existing)
}

/// First booking in `schedule` overlapping `slot`, skipping `exclude`.
pub fn find_conflict(
    schedule: &RoomSchedule,
    slot: &Slot,
    exclude: Option<&ReservationId>,
) -> Option<ReservationId> {
    schedule
        .overlapping(slot)
        .find(|b| exclude != Some(&b.id))
        .map(|b| b.id)
}

pub fn has_conflict(
    schedule: &RoomSchedule,
    slot: &Slot,
    exclude: Option<&ReservationId>,
) -> bool {
    find_conflict(schedule, slot, exclude).is_some()
}

pub(crate) fn check_no_conflict(
    schedule: &RoomSchedule,
    slot: &Slot,
    exclude: Option<&ReservationId>,
) -> Result<(), EngineError> {
    match find_conflict(schedule, slot, exclude) {
        Some(id) => Err(EngineError::Conflict(id)),
        None => Ok(()),
    }
}
