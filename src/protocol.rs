use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::engine::{BookingEngine, EngineError, ErrorKind};
use crate::model::*;

/// One request line. Tagged by `"op"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    // Rooms
    CreateRoom {
        id: String,
        name: String,
        capacity: u32,
        location: String,
        #[serde(default)]
        available: Option<bool>,
    },
    UpdateRoom {
        id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        capacity: Option<u32>,
        #[serde(default)]
        location: Option<String>,
        #[serde(default)]
        available: Option<bool>,
    },
    DeleteRoom {
        id: String,
    },
    GetRoom {
        id: String,
    },
    ListRooms,
    SearchRooms {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        min_capacity: Option<u32>,
        #[serde(default)]
        max_capacity: Option<u32>,
        #[serde(default)]
        location: Option<String>,
        #[serde(default)]
        available: Option<bool>,
    },

    // Reservations
    CreateReservation {
        room_id: String,
        client_id: String,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    },
    ReserveRoom {
        room_id: String,
        client_id: String,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    },
    UpdateReservation {
        id: ReservationId,
        #[serde(default)]
        room_id: Option<String>,
        #[serde(default)]
        client_id: Option<String>,
        #[serde(default)]
        date: Option<NaiveDate>,
        #[serde(default)]
        start: Option<NaiveTime>,
        #[serde(default)]
        end: Option<NaiveTime>,
    },
    CancelReservation {
        id: ReservationId,
    },
    GetReservation {
        id: ReservationId,
    },
    ListByRoom {
        room_id: String,
    },
    ListByClient {
        client_id: String,
    },

    // Availability
    CheckAvailability {
        room_id: String,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    },
    FreeSlots {
        room_id: String,
        date: NaiveDate,
        from: NaiveTime,
        until: NaiveTime,
    },

    // Subscriptions; handled by the connection, not the engine.
    Listen {
        #[serde(default)]
        room_id: Option<String>,
    },
    Unlisten {
        #[serde(default)]
        room_id: Option<String>,
    },
    UnlistenAll,
}

impl Request {
    /// Decode one line. Any decode failure is `InvalidArgument`.
    pub fn parse(line: &str) -> Result<Request, EngineError> {
        serde_json::from_str(line)
            .map_err(|e| EngineError::InvalidArgument(format!("malformed request: {e}")))
    }

    pub fn is_subscription(&self) -> bool {
        matches!(
            self,
            Request::Listen { .. } | Request::Unlisten { .. } | Request::UnlistenAll
        )
    }
}

/// One response line, or a pushed event. Tagged by `"type"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Room {
        room: Room,
    },
    Rooms {
        rooms: Vec<Room>,
    },
    Reservation {
        reservation: Reservation,
    },
    Reservations {
        reservations: Vec<Reservation>,
    },
    /// Acknowledgement for `reserve_room`, shaped like the legacy reserve
    /// reply that clients already parse. Only sent on success, so `success` is
    /// always true; rejections arrive as `Error` frames.
    Booked {
        success: bool,
        message: String,
        reservation_id: ReservationId,
    },
    Bool {
        value: bool,
    },
    Slots {
        slots: Vec<Window>,
    },
    Ok,
    Event {
        event: BookingEvent,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl Response {
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }

    pub fn encode(&self) -> String {
        // Every field is a plain string, number, bool or chrono value.
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","kind":"Internal","message":"encode failed: {e}"}}"#)
        })
    }
}

impl From<EngineError> for Response {
    fn from(e: EngineError) -> Self {
        Response::Error {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Run an engine request. Subscription requests belong to the connection and
/// are rejected here.
pub async fn execute(engine: &BookingEngine, req: Request) -> Result<Response, EngineError> {
    match req {
        Request::CreateRoom {
            id,
            name,
            capacity,
            location,
            available,
        } => {
            let room = engine
                .create_room(NewRoom {
                    id,
                    name,
                    capacity,
                    location,
                    available,
                })
                .await?;
            Ok(Response::Room { room })
        }
        Request::UpdateRoom {
            id,
            name,
            capacity,
            location,
            available,
        } => {
            let patch = RoomPatch {
                name,
                capacity,
                location,
                available,
            };
            let room = engine.update_room(&id, patch).await?;
            Ok(Response::Room { room })
        }
        Request::DeleteRoom { id } => {
            engine.delete_room(&id).await?;
            Ok(Response::Bool { value: true })
        }
        Request::GetRoom { id } => Ok(Response::Room {
            room: engine.get_room(&id).await?,
        }),
        Request::ListRooms => Ok(Response::Rooms {
            rooms: engine.list_rooms().await,
        }),
        Request::SearchRooms {
            text,
            min_capacity,
            max_capacity,
            location,
            available,
        } => {
            let query = RoomQuery {
                text,
                min_capacity,
                max_capacity,
                location,
                available,
            };
            Ok(Response::Rooms {
                rooms: engine.search_rooms(&query).await,
            })
        }
        Request::CreateReservation {
            room_id,
            client_id,
            date,
            start,
            end,
        } => {
            let reservation = engine
                .reserve(NewReservation {
                    room_id,
                    client_id,
                    date,
                    start,
                    end,
                })
                .await?;
            Ok(Response::Reservation { reservation })
        }
        Request::ReserveRoom {
            room_id,
            client_id,
            date,
            start,
            end,
        } => {
            let reservation = engine
                .reserve(NewReservation {
                    room_id,
                    client_id,
                    date,
                    start,
                    end,
                })
                .await?;
            Ok(Response::Booked {
                success: true,
                message: format!("room {} reserved", reservation.room_id),
                reservation_id: reservation.id,
            })
        }
        Request::UpdateReservation {
            id,
            room_id,
            client_id,
            date,
            start,
            end,
        } => {
            let patch = ReservationPatch {
                room_id,
                client_id,
                date,
                start,
                end,
            };
            let reservation = engine.update_reservation(id, patch).await?;
            Ok(Response::Reservation { reservation })
        }
        Request::CancelReservation { id } => {
            engine.cancel_reservation(id).await?;
            Ok(Response::Bool { value: true })
        }
        Request::GetReservation { id } => Ok(Response::Reservation {
            reservation: engine.get_reservation(&id)?,
        }),
        Request::ListByRoom { room_id } => Ok(Response::Reservations {
            reservations: engine.list_by_room(&room_id).await?,
        }),
        Request::ListByClient { client_id } => Ok(Response::Reservations {
            reservations: engine.list_by_client(&client_id),
        }),
        Request::CheckAvailability {
            room_id,
            date,
            start,
            end,
        } => {
            let value = engine
                .check_availability(&room_id, Slot::new(date, start, end))
                .await?;
            Ok(Response::Bool { value })
        }
        Request::FreeSlots {
            room_id,
            date,
            from,
            until,
        } => {
            if from >= until {
                return Err(EngineError::InvalidArgument(
                    "from must be before until".into(),
                ));
            }
            let slots = engine
                .free_slots(&room_id, date, Window::new(from, until))
                .await?;
            Ok(Response::Slots { slots })
        }
        Request::Listen { .. } | Request::Unlisten { .. } | Request::UnlistenAll => Err(
            EngineError::InvalidArgument("subscriptions need a connection".into()),
        ),
    }
}
