//! Minimal end-to-end demonstration of the Exchange + Bridge pair: two in-process "connections"
//! (backed by in-memory channels standing in for a real socket) open endpoints, bridge them, and
//! exchange a packet each way before the relay is stopped.
//!
//! Run with `cargo run --example echo_relay`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use exchange::{bridge, reason, CloseCode, DuplexTransport, Exchange, Packet, TransportReader, TransportWriter};
use time::OffsetDateTime;
use tokio::sync::mpsc;

/// A toy duplex transport backed by a pair of `tokio::sync::mpsc` channels. Stands in for a
/// real network connection (websocket, TCP framing, ...), which is out of scope for this crate.
struct MemoryTransport {
    inbound: mpsc::Receiver<String>,
    outbound: mpsc::Sender<String>,
}

struct MemoryReader(mpsc::Receiver<String>);
struct MemoryWriter(mpsc::Sender<String>);

#[derive(Debug, thiserror::Error)]
#[error("peer hung up")]
struct PeerHungUp;

impl DuplexTransport for MemoryTransport {
    type Reader = MemoryReader;
    type Writer = MemoryWriter;

    fn split(self) -> (Self::Reader, Self::Writer) {
        (MemoryReader(self.inbound), MemoryWriter(self.outbound))
    }
}

#[async_trait]
impl TransportReader for MemoryReader {
    type Error = PeerHungUp;

    async fn read_frame(&mut self) -> Result<String, Self::Error> {
        self.0.recv().await.ok_or(PeerHungUp)
    }
}

#[async_trait]
impl TransportWriter for MemoryWriter {
    type Error = PeerHungUp;

    async fn write_frame(&mut self, frame: String) -> Result<(), Self::Error> {
        self.0.send(frame).await.map_err(|_| PeerHungUp)
    }

    async fn close(&mut self, code: CloseCode, reason: &str) {
        println!("connection closed: {code:?} ({reason})");
    }
}

fn packet(to: &str, from: &str, body: &str) -> Packet {
    Packet {
        magic: exchange::Magic::new("echo-relay-demo", "1", "0"),
        header: exchange::Header {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: OffsetDateTime::now_utc(),
            expiration: 0,
            to: vec![to.to_owned()],
            from: vec![from.to_owned()],
            kind: "text".into(),
        },
        body: body.as_bytes().to_vec(),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    let (relay, relay_loop) = Exchange::<Packet>::new();
    tokio::spawn(relay_loop.run());

    // One "connection" each, wired by a pair of in-memory channels.
    let (alice_inbound_tx, alice_inbound_rx) = mpsc::channel(8);
    let (alice_outbound_tx, mut alice_outbound_rx) = mpsc::channel(8);
    let alice_transport = MemoryTransport { inbound: alice_inbound_rx, outbound: alice_outbound_tx };

    let (bob_inbound_tx, bob_inbound_rx) = mpsc::channel(8);
    let (bob_outbound_tx, mut bob_outbound_rx) = mpsc::channel(8);
    let bob_transport = MemoryTransport { inbound: bob_inbound_rx, outbound: bob_outbound_tx };

    let alice_relay = relay.clone();
    let alice_bridge = tokio::spawn(async move {
        let mut info = HashMap::new();
        info.insert("username".to_owned(), "alice".to_owned());
        bridge(&alice_relay, "/alice", info, alice_transport).await
    });

    let bob_relay = relay.clone();
    let bob_bridge = tokio::spawn(async move {
        let mut info = HashMap::new();
        info.insert("username".to_owned(), "bob".to_owned());
        bridge(&bob_relay, "/bob", info, bob_transport).await
    });

    // Give both bridges a moment to register their endpoints before addressing them by name.
    tokio::time::sleep(Duration::from_millis(20)).await;

    alice_inbound_tx
        .send(packet("/bob", "/alice", "hello from alice").to_json().unwrap())
        .await
        .unwrap();
    let reply = bob_outbound_rx.recv().await.unwrap();
    println!("bob received: {reply}");

    bob_inbound_tx
        .send(packet("/alice", "/bob", "hello back from bob").to_json().unwrap())
        .await
        .unwrap();
    let reply = alice_outbound_rx.recv().await.unwrap();
    println!("alice received: {reply}");

    relay.stop(reason(RelayShuttingDown)).await.unwrap();

    drop(alice_inbound_tx);
    drop(bob_inbound_tx);
    let _ = alice_bridge.await;
    let _ = bob_bridge.await;
}

#[derive(Debug, thiserror::Error)]
#[error("relay shutting down")]
struct RelayShuttingDown;
