use std::net::SocketAddr;

use crate::protocol::Request;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total operations executed. Labels: op, status.
pub const OPERATIONS_TOTAL: &str = "roomledger_operations_total";

/// Histogram: operation latency in seconds. Labels: op.
pub const OPERATION_DURATION_SECONDS: &str = "roomledger_operation_duration_seconds";

/// Counter: booking events handed to the sink. Labels: type.
pub const EVENTS_PUBLISHED_TOTAL: &str = "roomledger_events_published_total";

/// Counter: booking events the sink refused.
pub const EVENTS_DROPPED_TOTAL: &str = "roomledger_events_dropped_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "roomledger_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "roomledger_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "roomledger_connections_rejected_total";

/// Gauge: rooms in the catalog.
pub const ROOMS_ACTIVE: &str = "roomledger_rooms_active";

/// Gauge: live reservations in the ledger.
pub const RESERVATIONS_ACTIVE: &str = "roomledger_reservations_active";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Request variant to a short label for metrics.
pub fn op_label(req: &Request) -> &'static str {
    match req {
        Request::CreateRoom { .. } => "create_room",
        Request::UpdateRoom { .. } => "update_room",
        Request::DeleteRoom { .. } => "delete_room",
        Request::GetRoom { .. } => "get_room",
        Request::ListRooms => "list_rooms",
        Request::SearchRooms { .. } => "search_rooms",
        Request::CreateReservation { .. } => "create_reservation",
        Request::ReserveRoom { .. } => "reserve_room",
        Request::UpdateReservation { .. } => "update_reservation",
        Request::CancelReservation { .. } => "cancel_reservation",
        Request::GetReservation { .. } => "get_reservation",
        Request::ListByRoom { .. } => "list_by_room",
        Request::ListByClient { .. } => "list_by_client",
        Request::CheckAvailability { .. } => "check_availability",
        Request::FreeSlots { .. } => "free_slots",
        Request::Listen { .. } => "listen",
        Request::Unlisten { .. } => "unlisten",
        Request::UnlistenAll => "unlisten_all",
    }
}
