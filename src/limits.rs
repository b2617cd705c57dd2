/// Max bytes in a room id or client id.
pub const MAX_ID_LEN: usize = 128;

/// Max bytes in a room name or location.
pub const MAX_NAME_LEN: usize = 256;

/// Max rooms held by one engine.
pub const MAX_ROOMS: usize = 100_000;

/// Max live reservations on a single room.
pub const MAX_RESERVATIONS_PER_ROOM: usize = 50_000;

/// Max bytes in one request line on the wire.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Max LISTEN subscriptions held by one connection.
pub const MAX_SUBSCRIPTIONS_PER_CONNECTION: usize = 64;
