use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::model::*;

/// One booked window on a room's day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Booking {
    pub id: ReservationId,
    pub window: Window,
}

/// A room's bookings bucketed by date, each day sorted by start.
///
/// Lives inside the room's lock, so it always agrees with the ledger for that
/// room. Bookings on a day never overlap, which keeps both starts and ends
/// sorted and lets lookups binary search on either.
#[derive(Debug, Clone, Default)]
pub struct RoomSchedule {
    days: BTreeMap<NaiveDate, Vec<Booking>>,
    len: usize,
}

impl RoomSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, date: NaiveDate, booking: Booking) {
        let day = self.days.entry(date).or_default();
        let pos = day
            .binary_search_by_key(&booking.window.start, |b| b.window.start)
            .unwrap_or_else(|e| e);
        day.insert(pos, booking);
        self.len += 1;
    }

    /// Remove a booking by id. Returns whether it was present.
    pub fn remove(&mut self, date: NaiveDate, id: &ReservationId) -> bool {
        let Some(day) = self.days.get_mut(&date) else {
            return false;
        };
        let Some(pos) = day.iter().position(|b| b.id == *id) else {
            return false;
        };
        day.remove(pos);
        if day.is_empty() {
            self.days.remove(&date);
        }
        self.len -= 1;
        true
    }

    /// Bookings on `date`, sorted by start.
    pub fn day(&self, date: NaiveDate) -> &[Booking] {
        self.days.get(&date).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Bookings overlapping `slot`, in start order.
    pub fn overlapping(&self, slot: &Slot) -> impl Iterator<Item = &Booking> {
        let day = self.day(slot.date);
        // Before `left`, everything ends at or before slot.start.
        let left = day.partition_point(|b| b.window.end <= slot.start);
        // From `right`, everything starts at or after slot.end.
        let right = day.partition_point(|b| b.window.start < slot.end).max(left);
        day[left..right].iter()
    }
}
