//! Per-message cancellation token bounding a delivery attempt's validity.

use tokio::time::Instant;

/// Bounds how long a single delivery attempt (an enqueue, or a bridge write) remains valid.
///
/// An unconstrained lifespan never expires. A deadline lifespan expires at a fixed
/// [`tokio::time::Instant`], derived by the bridge from a packet's `timestamp + expiration`,
/// capped by an admission deadline.
///
/// `Lifespan` never retracts an enqueue already committed to an inbox; it only bounds the
/// *attempt*. Admission is durable, and the lifespan only governs whether a writer still
/// bothers to put the message on the wire.
#[derive(Debug, Clone, Copy)]
pub enum Lifespan {
    Unconstrained,
    Deadline(Instant),
}

impl Lifespan {
    pub fn unconstrained() -> Self {
        Self::Unconstrained
    }

    pub fn until(deadline: Instant) -> Self {
        Self::Deadline(deadline)
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Deadline(deadline) if Instant::now() >= *deadline)
    }

    /// Resolves once the lifespan has expired. Never resolves for an unconstrained lifespan.
    pub async fn expired(&self) {
        match self {
            Self::Unconstrained => std::future::pending().await,
            Self::Deadline(deadline) => tokio::time::sleep_until(*deadline).await,
        }
    }
}
