use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Reservation ids are engine-generated, monotonic ULIDs: id order is creation order.
pub type ReservationId = Ulid;

/// Half-open time-of-day window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Window {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        debug_assert!(start < end, "Window start must be before end");
        Self { start, end }
    }

    pub fn overlaps(&self, other: &Window) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A window on a calendar date. Slots on different dates never overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Slot {
    pub fn new(date: NaiveDate, start: NaiveTime, end: NaiveTime) -> Self {
        Self { date, start, end }
    }

    pub fn window(&self) -> Window {
        Window {
            start: self.start,
            end: self.end,
        }
    }

    pub fn overlaps(&self, other: &Slot) -> bool {
        self.date == other.date && self.start < other.end && self.end > other.start
    }
}

// ── Rooms ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub capacity: u32,
    pub location: String,
    pub available: bool,
}

/// Creation payload. `available` defaults to true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRoom {
    pub id: String,
    pub name: String,
    pub capacity: u32,
    pub location: String,
    #[serde(default)]
    pub available: Option<bool>,
}

impl NewRoom {
    pub fn into_room(self) -> Room {
        Room {
            id: self.id,
            name: self.name,
            capacity: self.capacity,
            location: self.location,
            available: self.available.unwrap_or(true),
        }
    }
}

/// Partial room update: absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub capacity: Option<u32>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub available: Option<bool>,
}

impl RoomPatch {
    pub fn apply(self, room: &mut Room) {
        if let Some(name) = self.name {
            room.name = name;
        }
        if let Some(capacity) = self.capacity {
            room.capacity = capacity;
        }
        if let Some(location) = self.location {
            room.location = location;
        }
        if let Some(available) = self.available {
            room.available = available;
        }
    }
}

/// Room search filters, ANDed. An empty query matches every room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomQuery {
    /// Case-insensitive substring of name or location.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub min_capacity: Option<u32>,
    #[serde(default)]
    pub max_capacity: Option<u32>,
    /// Case-insensitive substring of location.
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub available: Option<bool>,
}

impl RoomQuery {
    pub fn matches(&self, room: &Room) -> bool {
        if let Some(text) = self.text.as_deref().map(str::trim)
            && !text.is_empty()
        {
            let needle = text.to_lowercase();
            if !room.name.to_lowercase().contains(&needle)
                && !room.location.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if self.min_capacity.is_some_and(|min| room.capacity < min) {
            return false;
        }
        if self.max_capacity.is_some_and(|max| room.capacity > max) {
            return false;
        }
        if let Some(location) = &self.location
            && !room
                .location
                .to_lowercase()
                .contains(&location.trim().to_lowercase())
        {
            return false;
        }
        if self.available.is_some_and(|a| room.available != a) {
            return false;
        }
        true
    }
}

// ── Reservations ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub room_id: String,
    pub client_id: String,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Reservation {
    pub fn slot(&self) -> Slot {
        Slot::new(self.date, self.start, self.end)
    }
}

/// Booking request shared by every reservation entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReservation {
    pub room_id: String,
    pub client_id: String,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl NewReservation {
    pub fn slot(&self) -> Slot {
        Slot::new(self.date, self.start, self.end)
    }
}

/// Partial reservation update: absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationPatch {
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub start: Option<NaiveTime>,
    #[serde(default)]
    pub end: Option<NaiveTime>,
}

impl ReservationPatch {
    /// Merge onto a copy of `current`; `current` is untouched.
    pub fn merge(&self, current: &Reservation) -> Reservation {
        Reservation {
            id: current.id,
            room_id: self.room_id.clone().unwrap_or_else(|| current.room_id.clone()),
            client_id: self
                .client_id
                .clone()
                .unwrap_or_else(|| current.client_id.clone()),
            date: self.date.unwrap_or(current.date),
            start: self.start.unwrap_or(current.start),
            end: self.end.unwrap_or(current.end),
        }
    }
}

// ── Events ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Created,
    Updated,
    Cancelled,
}

/// Booking lifecycle notification. For `Cancelled` the reservation is the removed one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub reservation: Reservation,
    /// Set when an update moved the reservation out of another room.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_room_id: Option<String>,
}

impl BookingEvent {
    pub fn new(kind: EventKind, reservation: Reservation) -> Self {
        Self {
            kind,
            reservation,
            previous_room_id: None,
        }
    }

    /// `Updated` event for a reservation that left `previous_room_id`.
    pub fn moved(reservation: Reservation, previous_room_id: String) -> Self {
        Self {
            kind: EventKind::Updated,
            reservation,
            previous_room_id: Some(previous_room_id),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.reservation.room_id
    }
}
