//! Bridges one duplex transport connection to one Exchange endpoint.
//!
//! Identifies the connection by opening an endpoint, runs a reader and a writer side by side,
//! logs connect/disconnect and each admitted send/receive, and closes the endpoint when either
//! side exits. The reader runs on its own dedicated task; the writer runs on the caller's task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::endpoint::{Endpoint, Received};
use crate::error::{reason, Error, Reason};
use crate::exchange::Exchange;
use crate::lifespan::Lifespan;
use crate::packet::{Header, Packet};
use crate::runtime::{Runtime, TokioRuntime};
use crate::transport::{CloseCode, DuplexTransport, TransportReader, TransportWriter};

/// How long the identify phase (opening the endpoint) is allowed to take before the bridge
/// gives up and reports [`IdentifyError::Timeout`].
const IDENTIFY_DEADLINE: Duration = Duration::from_secs(10);

/// Upper bound on a per-message lifespan, regardless of what `header.expiration` requests.
const ADMISSION_DEADLINE: Duration = Duration::from_secs(10);

/// Failure during the bridge's identify phase. The embedding HTTP layer (out of scope here)
/// maps these onto status codes: Conflict -> 409, Unavailable -> 503, Timeout -> 408,
/// InternalError -> 500.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IdentifyError {
    #[error("endpoint name already in use")]
    Conflict,
    #[error("exchange is shutting down")]
    Unavailable,
    #[error("timed out waiting to register the endpoint")]
    Timeout,
    #[error("internal error opening endpoint")]
    InternalError,
}

impl From<Error> for IdentifyError {
    fn from(err: Error) -> Self {
        match err {
            Error::EndpointExists => Self::Conflict,
            Error::Stopped(_) => Self::Unavailable,
            Error::DeadlineElapsed => Self::Timeout,
            Error::EndpointDoesNotExist | Error::ExchangeClosed => Self::InternalError,
        }
    }
}

/// Bridge `transport` to a freshly-opened endpoint named `name`, capacity 1. Runs until the
/// reader or writer side exits, then closes the endpoint and returns.
pub async fn bridge<T>(
    exchange: &Exchange<Packet>,
    name: impl Into<String>,
    information: HashMap<String, String>,
    transport: T,
) -> Result<(), IdentifyError>
where
    T: DuplexTransport,
{
    bridge_with_runtime(exchange, name, information, transport, TokioRuntime).await
}

/// As [`bridge`], but spawning the reader and per-message write jobs through a custom
/// [`Runtime`] instead of bare `tokio::spawn`.
pub async fn bridge_with_runtime<T, R>(
    exchange: &Exchange<Packet>,
    name: impl Into<String>,
    information: HashMap<String, String>,
    transport: T,
    runtime: R,
) -> Result<(), IdentifyError>
where
    T: DuplexTransport,
    R: Runtime,
{
    let deadline = Instant::now() + IDENTIFY_DEADLINE;
    let endpoint = exchange
        .open_deadline(Some(deadline), information, 1, name)
        .await?;

    info!("(CONNECTED) {}", endpoint.name());

    let (transport_reader, transport_writer) = transport.split();
    let (job_tx, job_rx) = mpsc::channel::<OutboundJob>(1);

    runtime.spawn(run_serializer(transport_writer, job_rx));
    runtime.spawn(run_reader(transport_reader, endpoint.clone(), runtime.clone()));

    run_writer(&endpoint, job_tx, &runtime).await;

    // Defensive: a no-op if the reader (or a remote `close`/`stop`) already removed this
    // endpoint.
    let _ = endpoint.close(reason(BridgeClosed)).await;

    info!("(DISCONNECTED) {}", endpoint.name());
    Ok(())
}

#[derive(Debug, thiserror::Error)]
#[error("bridge exited")]
struct BridgeClosed;

/// A job handed to the single write-serializer task, which is the only task ever allowed to
/// touch the transport's write half, so outbound writes never interleave.
enum OutboundJob {
    Write {
        frame: String,
        lifespan: Lifespan,
        from: String,
        len: usize,
    },
    Close(CloseCode, String),
}

/// Runs on a dedicated task. Decodes each inbound frame as a [`Packet`] and spawns a send to
/// the exchange for every destination in `header.to`. Malformed frames are dropped silently
/// (logged at debug). A read error is terminal: it closes the endpoint (which schedules that
/// endpoint's own Terminal event) and returns.
async fn run_reader<T, R>(mut transport_reader: T, endpoint: Endpoint<Packet>, runtime: R)
where
    T: TransportReader,
    R: Runtime,
{
    loop {
        match transport_reader.read_frame().await {
            Ok(frame) => {
                let endpoint = endpoint.clone();
                runtime.spawn(async move {
                    handle_inbound_frame(&endpoint, frame).await;
                });
            }
            Err(err) => {
                debug!("(DISCONNECTED) {} read error: {}", endpoint.name(), err);
                let _ = endpoint.close(reason(err)).await;
                return;
            }
        }
    }
}

async fn handle_inbound_frame(endpoint: &Endpoint<Packet>, frame: String) {
    let packet = match Packet::from_json(&frame) {
        Ok(packet) => packet,
        Err(err) => {
            debug!("(SEND) {} dropped malformed frame: {}", endpoint.name(), err);
            return;
        }
    };

    let lifespan = derive_lifespan(&packet.header);
    let len = frame.len();

    for to in &packet.header.to {
        match endpoint.send(lifespan, to, packet.clone()).await {
            Ok(()) => info!("(SEND) {} {}->{}", len, endpoint.name(), to),
            Err(err) => warn!("(SEND) {} {}->{} {}", len, endpoint.name(), to, err),
        }
    }
}

/// Derive the per-message lifespan from `header.expiration`/`header.timestamp`, capped by
/// [`ADMISSION_DEADLINE`]. `expiration <= 0` means "no expiration"; the lifespan is
/// unconstrained.
fn derive_lifespan(header: &Header) -> Lifespan {
    if header.expiration <= 0 {
        return Lifespan::unconstrained();
    }

    let expires_at = header.timestamp + time::Duration::nanoseconds(header.expiration);
    let remaining = (expires_at - OffsetDateTime::now_utc()).max(time::Duration::ZERO);
    let capped = remaining.unsigned_abs().min(ADMISSION_DEADLINE);
    Lifespan::until(Instant::now() + capped)
}

/// Runs on the caller's task. Repeatedly receives from `endpoint` and turns each event into an
/// [`OutboundJob`] for the serializer. Each write job is handed off from its own spawned task
/// (rather than awaited inline) so a momentarily-full serializer channel cannot stall this
/// receive loop.
async fn run_writer<R: Runtime>(
    endpoint: &Endpoint<Packet>,
    job_tx: mpsc::Sender<OutboundJob>,
    runtime: &R,
) {
    loop {
        match endpoint.receive().await {
            Ok(Received::Message { from, lifespan, data, .. }) => {
                match data.to_json() {
                    Ok(frame) => {
                        let len = frame.len();
                        let job_tx = job_tx.clone();
                        runtime.spawn(async move {
                            let _ = job_tx
                                .send(OutboundJob::Write { frame, lifespan, from, len })
                                .await;
                        });
                    }
                    Err(err) => warn!("(RECEIVE) {}<-{} encode error: {}", endpoint.name(), from, err),
                }
            }
            Ok(Received::Terminal { reason: term_reason }) => {
                let code = match endpoint.exchange().stop_reason().await {
                    Some(stop_reason) if Arc::ptr_eq(&stop_reason, &term_reason) => CloseCode::GoingAway,
                    _ => CloseCode::Normal,
                };
                let _ = job_tx.send(OutboundJob::Close(code, term_reason.to_string())).await;
                return;
            }
            Err(_) => return,
        }
    }
}

/// The only task that ever calls `write_frame`/`close` on the transport's write half, so
/// concurrent writes from different receive events can never interleave on the wire.
async fn run_serializer<W: TransportWriter>(mut transport_writer: W, mut jobs: mpsc::Receiver<OutboundJob>) {
    while let Some(job) = jobs.recv().await {
        match job {
            OutboundJob::Write { frame, lifespan, from, len } => {
                tokio::select! {
                    biased;
                    _ = lifespan.expired() => {
                        warn!("(RECEIVE) {}<-{} abandoned: lifespan expired", len, from);
                    }
                    result = transport_writer.write_frame(frame) => {
                        match result {
                            Ok(()) => debug!("(RECEIVE) {}<-{}", len, from),
                            Err(err) => warn!("(RECEIVE) {}<-{} {}", len, from, err),
                        }
                    }
                }
            }
            OutboundJob::Close(code, reason) => {
                transport_writer.close(code, &reason).await;
                return;
            }
        }
    }
}
