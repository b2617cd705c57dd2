use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

use roomledger::engine::BookingEngine;
use roomledger::notify::NotifyHub;
use roomledger::wire;

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> (SocketAddr, Arc<NotifyHub>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let hub = Arc::new(NotifyHub::new());
    let engine = Arc::new(BookingEngine::new(hub.clone()));
    let ctx = wire::Context::new(engine, hub.clone(), 64);

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let ctx = ctx.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, ctx).await;
            });
        }
    });

    (addr, hub)
}

/// A line client that splits pushed `event` frames from request responses.
struct Client {
    writer: FramedWrite<tokio::net::tcp::OwnedWriteHalf, LinesCodec>,
    responses: mpsc::UnboundedReceiver<Value>,
    events: mpsc::UnboundedReceiver<Value>,
}

async fn connect(addr: SocketAddr) -> Client {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (read, write) = stream.into_split();
    let mut lines = FramedRead::new(read, LinesCodec::new());

    let (resp_tx, responses) = mpsc::unbounded_channel();
    let (event_tx, events) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(Ok(line)) = lines.next().await {
            let value: Value = serde_json::from_str(&line).unwrap();
            let tx = if value["type"] == "event" {
                &event_tx
            } else {
                &resp_tx
            };
            if tx.send(value).is_err() {
                break;
            }
        }
    });

    Client {
        writer: FramedWrite::new(write, LinesCodec::new()),
        responses,
        events,
    }
}

impl Client {
    async fn call(&mut self, request: Value) -> Value {
        self.call_raw(&request.to_string()).await
    }

    async fn call_raw(&mut self, line: &str) -> Value {
        self.writer.send(line).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), self.responses.recv())
            .await
            .expect("response timed out")
            .expect("connection closed")
    }

    async fn ok(&mut self, request: Value) -> Value {
        let resp = self.call(request.clone()).await;
        assert_ne!(resp["type"], "error", "{request} failed: {resp}");
        resp
    }

    /// Wait for an event with timeout.
    async fn event(&mut self, timeout: Duration) -> Option<Value> {
        tokio::time::timeout(timeout, self.events.recv())
            .await
            .ok()
            .flatten()
    }
}

fn create_room(id: &str) -> Value {
    json!({"op": "create_room", "id": id, "name": format!("Salle {id}"), "capacity": 10, "location": "Bloc A"})
}

fn reserve(room: &str, client: &str, start: &str, end: &str) -> Value {
    json!({
        "op": "create_reservation",
        "room_id": room,
        "client_id": client,
        "date": "2026-05-01",
        "start": start,
        "end": end,
    })
}

const SHORT: Duration = Duration::from_millis(200);

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn connect_and_query() {
    let (addr, _hub) = start_test_server().await;
    let mut client = connect(addr).await;

    let room = client.ok(create_room("1")).await;
    assert_eq!(room["type"], "room");
    assert_eq!(room["room"]["available"], true);

    let rooms = client.ok(json!({"op": "list_rooms"})).await;
    assert_eq!(rooms["rooms"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn conflict_visible_across_connections() {
    let (addr, _hub) = start_test_server().await;
    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    a.ok(create_room("1")).await;

    let first = a.ok(reserve("1", "c1", "10:00", "11:00")).await;
    assert_eq!(first["reservation"]["start"], "10:00:00");

    let clash = b.call(reserve("1", "c2", "10:30", "11:30")).await;
    assert_eq!(clash["type"], "error");
    assert_eq!(clash["kind"], "AlreadyExists");

    let touching = b.ok(reserve("1", "c2", "11:00", "12:00")).await;
    assert_eq!(touching["type"], "reservation");

    let free = b
        .ok(json!({"op": "check_availability", "room_id": "1", "date": "2026-05-01", "start": "09:00", "end": "10:00"}))
        .await;
    assert_eq!(free, json!({"type": "bool", "value": true}));
}

#[tokio::test]
async fn reserve_room_returns_booking_ack() {
    let (addr, _hub) = start_test_server().await;
    let mut client = connect(addr).await;
    client.ok(create_room("1")).await;

    let ack = client
        .ok(json!({"op": "reserve_room", "room_id": "1", "client_id": "c1", "date": "2026-05-01", "start": "10:00", "end": "11:00"}))
        .await;
    assert_eq!(ack["type"], "booked");
    assert_eq!(ack["success"], true);
    let id = ack["reservation_id"].as_str().unwrap().to_string();

    let fetched = client.ok(json!({"op": "get_reservation", "id": id})).await;
    assert_eq!(fetched["reservation"]["client_id"], "c1");
}

#[tokio::test]
async fn malformed_request_keeps_connection() {
    let (addr, _hub) = start_test_server().await;
    let mut client = connect(addr).await;

    let resp = client.call_raw("this is not json").await;
    assert_eq!(resp["type"], "error");
    assert_eq!(resp["kind"], "InvalidArgument");

    let resp = client.call(json!({"op": "get_room"})).await;
    assert_eq!(resp["kind"], "InvalidArgument");

    let resp = client.call(json!({"op": "get_room", "id": "nope"})).await;
    assert_eq!(resp["kind"], "NotFound");
}

#[tokio::test]
async fn listen_receives_event() {
    let (addr, _hub) = start_test_server().await;

    // Connection 1: subscriber
    let mut listener = connect(addr).await;
    listener.ok(create_room("1")).await;
    listener.ok(json!({"op": "listen", "room_id": "1"})).await;

    // Connection 2: mutator
    let mut mutator = connect(addr).await;
    let created = mutator.ok(reserve("1", "c1", "10:00", "11:00")).await;

    let event = listener.event(Duration::from_secs(5)).await.expect("expected event");
    assert_eq!(event["event"]["type"], "CREATED");
    assert_eq!(event["event"]["reservation"], created["reservation"]);
}

#[tokio::test]
async fn event_lifecycle_in_order() {
    let (addr, _hub) = start_test_server().await;
    let mut listener = connect(addr).await;
    listener.ok(create_room("1")).await;
    listener.ok(json!({"op": "listen"})).await;

    let mut mutator = connect(addr).await;
    let created = mutator.ok(reserve("1", "c1", "10:00", "11:00")).await;
    let id = created["reservation"]["id"].clone();
    mutator
        .ok(json!({"op": "update_reservation", "id": id, "end": "11:30"}))
        .await;
    let cancelled = mutator.ok(json!({"op": "cancel_reservation", "id": id})).await;
    assert_eq!(cancelled, json!({"type": "bool", "value": true}));

    let mut kinds = Vec::new();
    for _ in 0..3 {
        let event = listener.event(Duration::from_secs(5)).await.expect("expected event");
        assert_eq!(event["event"]["reservation"]["id"], id);
        kinds.push(event["event"]["type"].as_str().unwrap().to_string());
    }
    assert_eq!(kinds, ["CREATED", "UPDATED", "CANCELLED"]);
    assert_eq!(
        listener.events.try_recv().ok(),
        None,
        "no events beyond the three mutations"
    );
}

#[tokio::test]
async fn event_only_on_subscribed_room() {
    let (addr, _hub) = start_test_server().await;
    let mut listener = connect(addr).await;
    listener.ok(create_room("a")).await;
    listener.ok(create_room("b")).await;
    listener.ok(json!({"op": "listen", "room_id": "a"})).await;

    let mut mutator = connect(addr).await;
    mutator.ok(reserve("b", "c1", "10:00", "11:00")).await;
    assert!(listener.event(SHORT).await.is_none());

    mutator.ok(reserve("a", "c1", "10:00", "11:00")).await;
    let event = listener.event(Duration::from_secs(5)).await.expect("expected event");
    assert_eq!(event["event"]["reservation"]["room_id"], "a");
}

#[tokio::test]
async fn move_out_of_room_reaches_its_listener() {
    let (addr, _hub) = start_test_server().await;
    let mut listener = connect(addr).await;
    listener.ok(create_room("a")).await;
    listener.ok(create_room("b")).await;
    listener.ok(json!({"op": "listen", "room_id": "a"})).await;

    let mut mutator = connect(addr).await;
    let created = mutator.ok(reserve("a", "c1", "10:00", "11:00")).await;
    let id = created["reservation"]["id"].clone();
    let event = listener.event(Duration::from_secs(5)).await.expect("expected created");
    assert_eq!(event["event"]["type"], "CREATED");

    mutator
        .ok(json!({"op": "update_reservation", "id": id, "room_id": "b"}))
        .await;
    let event = listener.event(Duration::from_secs(5)).await.expect("expected updated");
    assert_eq!(event["event"]["type"], "UPDATED");
    assert_eq!(event["event"]["reservation"]["room_id"], "b");
    assert_eq!(event["event"]["previous_room_id"], "a");

    // Later activity in "b" is no longer this listener's business.
    mutator.ok(json!({"op": "cancel_reservation", "id": id})).await;
    assert!(listener.event(SHORT).await.is_none());
}

#[tokio::test]
async fn failed_mutation_sends_no_event() {
    let (addr, _hub) = start_test_server().await;
    let mut client = connect(addr).await;
    client.ok(create_room("1")).await;
    client.ok(reserve("1", "c1", "10:00", "11:00")).await;
    client.ok(json!({"op": "listen", "room_id": "1"})).await;

    let clash = client.call(reserve("1", "c2", "10:00", "11:00")).await;
    assert_eq!(clash["type"], "error");
    assert!(client.event(SHORT).await.is_none());
}

#[tokio::test]
async fn unlisten_stops_events() {
    let (addr, _hub) = start_test_server().await;
    let mut client = connect(addr).await;
    client.ok(create_room("1")).await;
    client.ok(json!({"op": "listen", "room_id": "1"})).await;
    client.ok(json!({"op": "unlisten", "room_id": "1"})).await;

    let mut mutator = connect(addr).await;
    mutator.ok(reserve("1", "c1", "10:00", "11:00")).await;
    assert!(client.event(SHORT).await.is_none());
}

#[tokio::test]
async fn unlisten_all_stops_everything() {
    let (addr, _hub) = start_test_server().await;
    let mut client = connect(addr).await;
    client.ok(create_room("1")).await;
    client.ok(create_room("2")).await;
    client.ok(json!({"op": "listen", "room_id": "1"})).await;
    client.ok(json!({"op": "listen"})).await;
    client.ok(json!({"op": "unlisten_all"})).await;

    let mut mutator = connect(addr).await;
    mutator.ok(reserve("1", "c1", "10:00", "11:00")).await;
    mutator.ok(reserve("2", "c1", "10:00", "11:00")).await;
    assert!(client.event(SHORT).await.is_none());
}

#[tokio::test]
async fn disconnect_cleans_up() {
    let (addr, hub) = start_test_server().await;
    let mut client = connect(addr).await;
    client.ok(create_room("1")).await;
    client.ok(json!({"op": "listen", "room_id": "1"})).await;
    assert_eq!(hub.room_channels(), 1);

    drop(client);

    let mut cleaned = false;
    for _ in 0..100 {
        if hub.room_channels() == 0 {
            cleaned = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(cleaned, "room channel should be pruned after disconnect");
}

#[tokio::test]
async fn delete_room_guarded_by_reservations() {
    let (addr, _hub) = start_test_server().await;
    let mut client = connect(addr).await;
    client.ok(create_room("1")).await;
    let created = client.ok(reserve("1", "c1", "10:00", "11:00")).await;

    let refused = client.call(json!({"op": "delete_room", "id": "1"})).await;
    assert_eq!(refused["kind"], "PreconditionFailed");

    client
        .ok(json!({"op": "cancel_reservation", "id": created["reservation"]["id"]}))
        .await;
    let deleted = client.ok(json!({"op": "delete_room", "id": "1"})).await;
    assert_eq!(deleted, json!({"type": "bool", "value": true}));

    let gone = client.call(json!({"op": "list_by_room", "room_id": "1"})).await;
    assert_eq!(gone["kind"], "NotFound");
}

#[tokio::test]
async fn free_slots_over_the_wire() {
    let (addr, _hub) = start_test_server().await;
    let mut client = connect(addr).await;
    client.ok(create_room("1")).await;
    client.ok(reserve("1", "c1", "10:00", "11:00")).await;

    let slots = client
        .ok(json!({"op": "free_slots", "room_id": "1", "date": "2026-05-01", "from": "09:00", "until": "12:00"}))
        .await;
    assert_eq!(
        slots,
        json!({"type": "slots", "slots": [
            {"start": "09:00:00", "end": "10:00:00"},
            {"start": "11:00:00", "end": "12:00:00"},
        ]})
    );
}

#[tokio::test]
async fn concurrent_clients_single_winner() {
    let (addr, _hub) = start_test_server().await;
    let mut setup = connect(addr).await;
    setup.ok(create_room("1")).await;

    let mut handles = Vec::new();
    for i in 0..16 {
        handles.push(tokio::spawn(async move {
            let mut client = connect(addr).await;
            client
                .call(reserve("1", &format!("c{i}"), "14:00", "15:00"))
                .await
        }));
    }
    let mut wins = 0;
    for h in handles {
        let resp = h.await.unwrap();
        if resp["type"] == "reservation" {
            wins += 1;
        } else {
            assert_eq!(resp["kind"], "AlreadyExists");
        }
    }
    assert_eq!(wins, 1);
}
