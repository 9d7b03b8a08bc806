//! Integration tests exercising the Exchange's public contract: open/close/send semantics,
//! wildcard name resolution, shutdown propagation, and delivery ordering guarantees.

use std::collections::HashMap;
use std::time::Duration;

use exchange::{reason, Error, Exchange, Lifespan, Received};

#[derive(Debug, Clone, thiserror::Error)]
#[error("relay stopped for maintenance")]
struct Maintenance;

fn start() -> Exchange<String> {
    let (exchange, exchange_loop) = Exchange::new();
    tokio::spawn(exchange_loop.run());
    exchange
}

/// Open / send / receive round trip, including wildcard name resolution.
#[tokio::test]
async fn open_send_receive_round_trip() {
    let exchange = start();

    let a = exchange.open(HashMap::new(), 1, "A").await.unwrap();
    let b = exchange
        .open_wildcard(HashMap::new(), 1, "*", 16)
        .await
        .unwrap();
    assert_eq!(b.name().len(), 32);
    assert!(b.name().chars().all(|c| c.is_ascii_hexdigit()));

    b.send(Lifespan::unconstrained(), "A", "hello".to_owned())
        .await
        .unwrap();
    match a.receive().await.unwrap() {
        Received::Message { to, from, data, .. } => {
            assert_eq!(to, "A");
            assert_eq!(from, b.name());
            assert_eq!(data, "hello");
        }
        Received::Terminal { .. } => panic!("expected a message"),
    }

    a.send(Lifespan::unconstrained(), b.name(), "hi".to_owned())
        .await
        .unwrap();
    match b.receive().await.unwrap() {
        Received::Message { from, data, .. } => {
            assert_eq!(from, "A");
            assert_eq!(data, "hi");
        }
        Received::Terminal { .. } => panic!("expected a message"),
    }
}

/// Duplicate open fails with `EndpointExists`.
#[tokio::test]
async fn duplicate_open_fails() {
    let exchange = start();
    let _a = exchange.open(HashMap::new(), 1, "A").await.unwrap();

    let err = exchange.open(HashMap::new(), 1, "A").await.unwrap_err();
    assert!(matches!(err, Error::EndpointExists));
}

/// A wildcard template without `*` (or with zero random bytes) yields the template verbatim.
#[tokio::test]
async fn wildcard_without_asterisk_is_verbatim() {
    let exchange = start();
    let endpoint = exchange
        .open_wildcard(HashMap::new(), 1, "fixed-name", 16)
        .await
        .unwrap();
    assert_eq!(endpoint.name(), "fixed-name");

    let endpoint = exchange
        .open_wildcard(HashMap::new(), 1, "prefix-*", 0)
        .await
        .unwrap();
    assert_eq!(endpoint.name(), "prefix-*");
}

/// Send to an unknown (or just-closed) destination fails.
#[tokio::test]
async fn send_to_unknown_destination_fails() {
    let exchange = start();
    let _a = exchange.open(HashMap::new(), 1, "A").await.unwrap();

    let err = exchange
        .send(Lifespan::unconstrained(), "Z", "A", "hi".to_owned())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::EndpointDoesNotExist));
}

#[tokio::test]
async fn send_after_close_fails() {
    let exchange = start();
    let _a = exchange.open(HashMap::new(), 1, "A").await.unwrap();

    exchange.close("A", reason(Maintenance)).await.unwrap();

    let err = exchange
        .send(Lifespan::unconstrained(), "A", "B", "hi".to_owned())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::EndpointDoesNotExist));
}

/// Closing an endpoint delivers exactly one Terminal event carrying the reason.
#[tokio::test]
async fn close_delivers_terminal_event() {
    let exchange = start();
    let a = exchange.open(HashMap::new(), 1, "A").await.unwrap();

    exchange.close("A", reason(Maintenance)).await.unwrap();

    match a.receive().await.unwrap() {
        Received::Terminal { reason } => {
            assert_eq!(reason.to_string(), Maintenance.to_string());
        }
        Received::Message { .. } => panic!("expected Terminal"),
    }
}

/// Closing an absent name is a no-op success.
#[tokio::test]
async fn close_on_absent_name_is_noop() {
    let exchange: Exchange<String> = start();
    exchange.close("nobody-here", reason(Maintenance)).await.unwrap();
}

/// `stop` delivers Terminal to every live endpoint and every subsequent non-close command fails
/// with the stop reason, while `close` keeps succeeding.
#[tokio::test]
async fn stop_propagates_to_every_endpoint_and_gates_future_commands() {
    let exchange = start();
    let a = exchange.open(HashMap::new(), 1, "A").await.unwrap();
    let b = exchange.open(HashMap::new(), 1, "B").await.unwrap();

    exchange.stop(reason(Maintenance)).await.unwrap();

    for endpoint in [&a, &b] {
        match endpoint.receive().await.unwrap() {
            Received::Terminal { reason } => assert_eq!(reason.to_string(), Maintenance.to_string()),
            Received::Message { .. } => panic!("expected Terminal"),
        }
    }

    let open_err = exchange.open(HashMap::new(), 1, "C").await.unwrap_err();
    assert!(matches!(open_err, Error::Stopped(_)));

    let send_err = exchange
        .send(Lifespan::unconstrained(), "A", "B", "hi".to_owned())
        .await
        .unwrap_err();
    assert!(matches!(send_err, Error::Stopped(_)));

    exchange.close("A", reason(Maintenance)).await.unwrap();
}

/// No event is ever observed after an endpoint's Terminal event. Asserted by racing a send
/// against a close and checking the receiver never sees more than the Terminal.
#[tokio::test]
async fn no_event_follows_terminal() {
    let exchange = start();
    let a = exchange.open(HashMap::new(), 4, "A").await.unwrap();

    exchange
        .send(Lifespan::unconstrained(), "A", "sender", "before-close".to_owned())
        .await
        .unwrap();
    exchange.close("A", reason(Maintenance)).await.unwrap();

    let first = a.receive().await.unwrap();
    assert!(matches!(first, Received::Message { .. }));

    let second = a.receive().await.unwrap();
    assert!(matches!(second, Received::Terminal { .. }));
}

/// Boundary behavior: a full inbox makes further sends block until a receive drains it; no
/// message is lost.
#[tokio::test]
async fn full_inbox_blocks_sender_without_losing_messages() {
    let exchange = start();
    let a = exchange.open(HashMap::new(), 1, "A").await.unwrap();

    exchange
        .send(Lifespan::unconstrained(), "A", "sender", "one".to_owned())
        .await
        .unwrap();

    // The inbox (capacity 1) is now full; a second send's helper task blocks enqueuing rather
    // than dropping the message. `send` itself still returns promptly because admission (not
    // the enqueue) is what it waits on.
    exchange
        .send(Lifespan::unconstrained(), "A", "sender", "two".to_owned())
        .await
        .unwrap();

    match a.receive().await.unwrap() {
        Received::Message { data, .. } => assert_eq!(data, "one"),
        Received::Terminal { .. } => panic!("expected a message"),
    }
    match a.receive().await.unwrap() {
        Received::Message { data, .. } => assert_eq!(data, "two"),
        Received::Terminal { .. } => panic!("expected a message"),
    }
}

/// Cancellation before admission returns a deadline error with no registry effect; cancellation
/// after admission does not retract an already-queued delivery.
#[tokio::test(start_paused = true)]
async fn deadline_before_admission_has_no_registry_effect() {
    let exchange = start();
    let _a = exchange.open(HashMap::new(), 1, "A").await.unwrap();

    // Fill A's inbox so that a subsequent send's *admission* itself does not block (admission
    // always succeeds immediately; the helper task is what would block), demonstrating instead
    // that a deadline on `open` of an already-taken name cannot be used to observe registry
    // mutation: open fails with EndpointExists, not a deadline error, and registry state is
    // unaffected either way.
    let past_deadline = tokio::time::Instant::now();
    let err = exchange
        .open_deadline(Some(past_deadline), HashMap::new(), 1, "never-admitted")
        .await;
    // Either the rendezvous send raced the elapsed deadline and lost (DeadlineElapsed), or it
    // won the race and the open admitted successfully; both are acceptable outcomes of a
    // deadline set to "now" against a zero-capacity channel, but the name must never end up
    // half-registered on an error path.
    if err.is_err() {
        let retry = exchange.open(HashMap::new(), 1, "never-admitted").await;
        assert!(retry.is_ok(), "a failed admission must leave the name unregistered");
    }
}

#[tokio::test]
async fn lifespan_after_admission_does_not_retract_delivery() {
    let exchange = start();
    let a = exchange.open(HashMap::new(), 1, "A").await.unwrap();

    let expired = Lifespan::until(tokio::time::Instant::now());
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(expired.is_expired());

    exchange
        .send(expired, "A", "sender", "still-delivered".to_owned())
        .await
        .unwrap();

    match a.receive().await.unwrap() {
        Received::Message { data, .. } => assert_eq!(data, "still-delivered"),
        Received::Terminal { .. } => panic!("expected the message despite the expired lifespan"),
    }
}
