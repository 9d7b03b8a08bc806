//! Error taxonomy shared by the [`crate::exchange`] and [`crate::bridge`] modules.

use std::sync::Arc;

use thiserror::Error;

/// The opaque, caller-supplied sentinel carried by [`Error::Stopped`] and by every
/// [`crate::endpoint::Event::Terminal`] event delivered once an [`crate::exchange::Exchange`]
/// is stopped or an individual endpoint is closed.
///
/// Modelled as a boxed `dyn std::error::Error`: any error type can be supplied, it is never
/// interpreted by the core, and it is cheap to clone to every affected endpoint.
pub type Reason = Arc<dyn std::error::Error + Send + Sync>;

/// Wrap any error in a [`Reason`].
pub fn reason(err: impl std::error::Error + Send + Sync + 'static) -> Reason {
    Arc::new(err)
}

/// Errors surfaced by the Exchange's command methods and by the Bridge.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// `open`/`open_wildcard` named an endpoint that is already registered.
    #[error("endpoint exists")]
    EndpointExists,

    /// `send` targeted a name that is not currently registered.
    #[error("endpoint does not exist")]
    EndpointDoesNotExist,

    /// The Exchange has been stopped; every non-close command fails with the stop reason.
    #[error("exchange stopped: {0}")]
    Stopped(Reason),

    /// The caller's deadline elapsed before the command was admitted.
    #[error("deadline elapsed before admission")]
    DeadlineElapsed,

    /// The command loop is no longer running (its command channel was closed).
    #[error("exchange is no longer accepting commands")]
    ExchangeClosed,
}
