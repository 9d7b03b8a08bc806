//! Executor abstraction used by the command loop and the bridge's helper tasks.
//!
//! Keeping a narrow [`Runtime`] trait between this crate and `tokio::spawn` is the same trick
//! the pack's messaging client uses to insulate its subscribe loop from a concrete executor: the
//! core never names `tokio::spawn` directly, so a test harness (or an embedder running its own
//! executor) can supply its own spawner without touching the exchange or bridge code.

use std::future::Future;

/// A place to run detached tasks.
///
/// `spawn` fires the future and returns immediately; the exchange and bridge never observe or
/// await the resulting handle, since the only thing that can make a spawned helper "come back"
/// is the channel it was given to work with.
pub trait Runtime: Clone + Send + Sync + std::fmt::Debug + 'static {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// The default [`Runtime`], backed by the ambient `tokio` executor.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioRuntime;

impl Runtime for TokioRuntime {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(future);
    }
}
