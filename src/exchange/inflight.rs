//! Tracks helper tasks spawned to enqueue events into endpoint inboxes, so `stop` can wait for
//! every admitted delivery to actually land before returning.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::runtime::Runtime;

#[derive(Debug, Clone, Default)]
pub(super) struct Inflight {
    count: Arc<AtomicUsize>,
    drained: Arc<Notify>,
}

impl Inflight {
    /// Spawn `future` on `runtime`, counted until it completes.
    pub(super) fn spawn<R, F>(&self, runtime: &R, future: F)
    where
        R: Runtime,
        F: Future<Output = ()> + Send + 'static,
    {
        self.count.fetch_add(1, Ordering::SeqCst);
        let count = self.count.clone();
        let drained = self.drained.clone();
        runtime.spawn(async move {
            future.await;
            if count.fetch_sub(1, Ordering::SeqCst) == 1 {
                drained.notify_waiters();
            }
        });
    }

    /// Wait until every task spawned through this tracker has completed, including ones
    /// spawned before this call.
    pub(super) async fn drain(&self) {
        loop {
            // `enable` registers this waiter with `Notify` before the count check runs, so a
            // `notify_waiters` call that lands between the check and the await below is still
            // observed. Without it, `notified()` only registers on first poll, leaving a window
            // where the last task's notification is sent and dropped before this future starts
            // waiting for it.
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}
