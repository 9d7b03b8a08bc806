//! # Exchange
//!
//! A personal data relay's core: authenticated clients open named endpoints over a persistent
//! duplex connection and exchange JSON-framed messages addressed to other named endpoints on
//! the same relay. This crate implements the hard part: a single-writer registry of named,
//! bounded-capacity mailboxes that serializes registry mutations, delivers messages by
//! destination name, enforces per-message lifetimes, and coordinates graceful shutdown so every
//! live holder of an endpoint observes a terminal event exactly once, plus the bridge that
//! adapts a per-connection duplex transport onto one endpoint.
//!
//! The HTTP server and routing, the credential/session store, HTML rendering, the logging sink,
//! configuration loading, and the CLI are deliberately out of scope: this crate is the relay
//! engine an embedding application wires those concerns around.
//!
//! ```no_run
//! use std::collections::HashMap;
//! use exchange::{reason, Exchange, Lifespan};
//!
//! # async fn run() {
//! let (exchange, exchange_loop) = Exchange::<String>::new();
//! tokio::spawn(exchange_loop.run());
//!
//! let a = exchange.open(HashMap::new(), 8, "A").await.unwrap();
//! let b = exchange.open(HashMap::new(), 8, "B").await.unwrap();
//!
//! b.send(Lifespan::unconstrained(), "A", "hello".to_string()).await.unwrap();
//! let received = a.receive().await.unwrap();
//! # let _ = received;
//! # }
//! ```

pub mod bridge;
pub mod endpoint;
pub mod error;
pub mod exchange;
pub mod lifespan;
pub mod name;
pub mod packet;
pub mod runtime;
pub mod transport;

pub use bridge::{bridge, bridge_with_runtime, IdentifyError};
pub use endpoint::{Endpoint, Event, Received};
pub use error::{reason, Error, Reason};
pub use exchange::{Exchange, ExchangeLoop};
pub use lifespan::Lifespan;
pub use packet::{Header, Magic, Packet};
pub use runtime::{Runtime, TokioRuntime};
pub use transport::{CloseCode, DuplexTransport, TransportReader, TransportWriter};
