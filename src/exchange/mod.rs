//! The Exchange core: a process-wide registry of named mailboxes mutated by a single
//! command-loop task, reached by every caller through a rendezvous channel.
//!
//! A control-command enum is sent over a channel, answered by a `oneshot` reply, and consumed
//! one at a time by a task that is the sole owner of the mutable state it guards. That pattern
//! (`Command` + `async_channel` + `oneshot`) replaces ad hoc locking with a serialized mutator.

mod inflight;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::endpoint::{Endpoint, Event};
use crate::error::{Error, Reason};
use crate::lifespan::Lifespan;
use crate::name;
use crate::runtime::{Runtime, TokioRuntime};

use inflight::Inflight;

/// Fixed vs. wildcard name resolution, chosen by which `open*` method was called.
enum NameSpec {
    Fixed(String),
    Wildcard { template: String, random_bytes: usize },
}

struct RegistryEntry<M> {
    information: Arc<HashMap<String, String>>,
    tx: mpsc::Sender<Event<M>>,
}

/// Result of an admitted `open`: everything the caller needs to build an [`Endpoint`].
struct OpenOutcome<M> {
    name: String,
    information: Arc<HashMap<String, String>>,
    inbox: mpsc::Receiver<Event<M>>,
}

enum Command<M> {
    Open {
        spec: NameSpec,
        information: HashMap<String, String>,
        capacity: usize,
        reply: oneshot::Sender<Result<OpenOutcome<M>, Error>>,
    },
    Close {
        name: String,
        reason: Reason,
        reply: oneshot::Sender<Result<(), Error>>,
    },
    Send {
        to: String,
        from: String,
        lifespan: Lifespan,
        data: M,
        reply: oneshot::Sender<Result<(), Error>>,
    },
    Stop {
        reason: Reason,
        reply: oneshot::Sender<Result<(), Error>>,
    },
    /// Read-only: the current stop reason, if any. Exempt from the stop gate like `Close`, so
    /// a bridge can always ask "was this Terminal the global stop?" regardless of state.
    StopReason {
        reply: oneshot::Sender<Option<Reason>>,
    },
}

impl<M> Command<M> {
    fn fail_open(reply: oneshot::Sender<Result<OpenOutcome<M>, Error>>, err: Error) {
        let _ = reply.send(Err(err));
    }

    fn fail_unit(reply: oneshot::Sender<Result<(), Error>>, err: Error) {
        let _ = reply.send(Err(err));
    }
}

/// Cloneable handle used by callers to submit commands. Cheap to clone (one `async_channel`
/// sender); every clone reaches the same command loop.
pub struct Exchange<M> {
    command_tx: async_channel::Sender<Command<M>>,
}

impl<M> Clone for Exchange<M> {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
        }
    }
}

impl<M> std::fmt::Debug for Exchange<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange").finish_non_exhaustive()
    }
}

impl<M> Exchange<M>
where
    M: Send + 'static,
{
    /// Construct an idle Exchange and its command loop. The loop does nothing until
    /// [`ExchangeLoop::run`] is spawned; the exchange is constructed idle and only starts
    /// running once that happens.
    pub fn new() -> (Self, ExchangeLoop<M, TokioRuntime>) {
        Self::with_runtime(TokioRuntime)
    }

    /// As [`Exchange::new`], but spawning helper tasks through a custom [`Runtime`].
    pub fn with_runtime<R: Runtime>(runtime: R) -> (Self, ExchangeLoop<M, R>) {
        // Zero capacity: a true rendezvous. This lets `submit` race the send itself against a
        // deadline and have "the caller gave up before admission" genuinely mean "no registry
        // effect".
        let (command_tx, command_rx) = async_channel::bounded(0);
        let exchange = Exchange { command_tx };
        let exchange_loop = ExchangeLoop {
            command_rx,
            runtime,
            registry: HashMap::new(),
            stop_reason: None,
            inflight: Inflight::default(),
        };
        (exchange, exchange_loop)
    }

    /// Register `name`.
    pub async fn open(
        &self,
        information: HashMap<String, String>,
        capacity: usize,
        name: impl Into<String>,
    ) -> Result<Endpoint<M>, Error> {
        self.open_deadline(None, information, capacity, name).await
    }

    pub async fn open_deadline(
        &self,
        deadline: Option<Instant>,
        information: HashMap<String, String>,
        capacity: usize,
        name: impl Into<String>,
    ) -> Result<Endpoint<M>, Error> {
        let spec = NameSpec::Fixed(name.into());
        self.open_with_spec(deadline, information, capacity, spec).await
    }

    /// Register a name resolved from `template` by substituting `*` with `random_bytes` random
    /// bytes, hex-encoded.
    pub async fn open_wildcard(
        &self,
        information: HashMap<String, String>,
        capacity: usize,
        template: impl Into<String>,
        random_bytes: usize,
    ) -> Result<Endpoint<M>, Error> {
        self.open_wildcard_deadline(None, information, capacity, template, random_bytes)
            .await
    }

    pub async fn open_wildcard_deadline(
        &self,
        deadline: Option<Instant>,
        information: HashMap<String, String>,
        capacity: usize,
        template: impl Into<String>,
        random_bytes: usize,
    ) -> Result<Endpoint<M>, Error> {
        let spec = NameSpec::Wildcard {
            template: template.into(),
            random_bytes,
        };
        self.open_with_spec(deadline, information, capacity, spec).await
    }

    async fn open_with_spec(
        &self,
        deadline: Option<Instant>,
        information: HashMap<String, String>,
        capacity: usize,
        spec: NameSpec,
    ) -> Result<Endpoint<M>, Error> {
        let outcome = self
            .submit_open(deadline, |reply| Command::Open {
                spec,
                information,
                capacity,
                reply,
            })
            .await?;
        Ok(Endpoint::new(
            outcome.name,
            outcome.information,
            self.clone(),
            outcome.inbox,
        ))
    }

    /// Remove `name` and schedule its Terminal event. A no-op success if `name` is absent.
    /// Always admitted, even after `stop`.
    pub async fn close(&self, name: &str, reason: Reason) -> Result<(), Error> {
        self.close_deadline(None, name, reason).await
    }

    pub async fn close_deadline(
        &self,
        deadline: Option<Instant>,
        name: &str,
        reason: Reason,
    ) -> Result<(), Error> {
        self.submit(deadline, |reply| Command::Close {
            name: name.to_owned(),
            reason,
            reply,
        })
        .await
    }

    /// Schedule a Message event onto `to`'s inbox.
    pub async fn send(&self, lifespan: Lifespan, to: &str, from: &str, data: M) -> Result<(), Error> {
        self.send_deadline(None, lifespan, to, from, data).await
    }

    pub async fn send_deadline(
        &self,
        deadline: Option<Instant>,
        lifespan: Lifespan,
        to: &str,
        from: &str,
        data: M,
    ) -> Result<(), Error> {
        self.submit(deadline, |reply| Command::Send {
            to: to.to_owned(),
            from: from.to_owned(),
            lifespan,
            data,
            reply,
        })
        .await
    }

    /// Set the stop reason, close every registered endpoint with it, and wait for every
    /// in-flight delivery (including the Terminal events just scheduled) to drain.
    pub async fn stop(&self, reason: Reason) -> Result<(), Error> {
        self.stop_deadline(None, reason).await
    }

    pub async fn stop_deadline(&self, deadline: Option<Instant>, reason: Reason) -> Result<(), Error> {
        self.submit(deadline, |reply| Command::Stop { reason, reply })
            .await
    }

    /// Close the command channel, letting the loop exit once it finishes any command already
    /// in flight. `stop` itself deliberately does not do this, so late `close` calls still get
    /// processed.
    pub fn shut_down_command_loop(&self) {
        self.command_tx.close();
    }

    /// The current stop reason, if any. Exempt from the stop gate, like `close`: a caller can
    /// always ask whether the exchange has been stopped. The bridge uses this to tell an
    /// orderly shutdown's Terminal event apart from a single endpoint's targeted close
    /// ("Going Away" vs. a normal close).
    pub async fn stop_reason(&self) -> Option<Reason> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.command_tx.send(Command::StopReason { reply: reply_tx }).await.is_err() {
            return None;
        }
        reply_rx.await.ok().flatten()
    }

    async fn submit_open(
        &self,
        deadline: Option<Instant>,
        make: impl FnOnce(oneshot::Sender<Result<OpenOutcome<M>, Error>>) -> Command<M>,
    ) -> Result<OpenOutcome<M>, Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let cmd = make(reply_tx);
        self.rendezvous_send(deadline, cmd).await?;
        Self::await_reply(deadline, reply_rx).await
    }

    async fn submit(
        &self,
        deadline: Option<Instant>,
        make: impl FnOnce(oneshot::Sender<Result<(), Error>>) -> Command<M>,
    ) -> Result<(), Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let cmd = make(reply_tx);
        self.rendezvous_send(deadline, cmd).await?;
        Self::await_reply(deadline, reply_rx).await
    }

    async fn rendezvous_send(&self, deadline: Option<Instant>, cmd: Command<M>) -> Result<(), Error> {
        match deadline {
            None => self
                .command_tx
                .send(cmd)
                .await
                .map_err(|_| Error::ExchangeClosed),
            Some(deadline) => tokio::select! {
                biased;
                _ = tokio::time::sleep_until(deadline) => Err(Error::DeadlineElapsed),
                result = self.command_tx.send(cmd) => result.map_err(|_| Error::ExchangeClosed),
            },
        }
    }

    async fn await_reply<T>(
        deadline: Option<Instant>,
        reply_rx: oneshot::Receiver<Result<T, Error>>,
    ) -> Result<T, Error> {
        match deadline {
            None => reply_rx.await.map_err(|_| Error::ExchangeClosed)?,
            Some(deadline) => tokio::select! {
                biased;
                _ = tokio::time::sleep_until(deadline) => Err(Error::DeadlineElapsed),
                result = reply_rx => result.map_err(|_| Error::ExchangeClosed)?,
            },
        }
    }
}

/// Owns the registry and runs the command loop. Produced by [`Exchange::new`] /
/// [`Exchange::with_runtime`]; the owner is expected to spawn [`ExchangeLoop::run`] as their
/// "start" step.
pub struct ExchangeLoop<M, R: Runtime = TokioRuntime> {
    command_rx: async_channel::Receiver<Command<M>>,
    runtime: R,
    registry: HashMap<String, RegistryEntry<M>>,
    stop_reason: Option<Reason>,
    inflight: Inflight,
}

impl<M, R> ExchangeLoop<M, R>
where
    M: Send + 'static,
    R: Runtime,
{
    /// Run until the command channel is closed, then wait for any in-flight helper tasks that
    /// are still draining (defensive; `stop` already drains its own before replying).
    pub async fn run(mut self) {
        while let Ok(cmd) = self.command_rx.recv().await {
            self.dispatch(cmd).await;
        }
        self.inflight.drain().await;
    }

    async fn dispatch(&mut self, cmd: Command<M>) {
        // Every command but `close` is gated by a set stop reason. `StopReason` is a read-only
        // query, exempt from the gate exactly like `Close`.
        if let Command::StopReason { reply } = cmd {
            let _ = reply.send(self.stop_reason.clone());
            return;
        }

        if let Some(reason) = self.stop_reason.clone() {
            match cmd {
                Command::Close { name, reason: close_reason, reply } => {
                    self.handle_close(name, close_reason);
                    let _ = reply.send(Ok(()));
                }
                Command::Open { reply, .. } => Command::fail_open(reply, Error::Stopped(reason)),
                Command::Send { reply, .. } => Command::fail_unit(reply, Error::Stopped(reason)),
                Command::Stop { reply, .. } => Command::fail_unit(reply, Error::Stopped(reason)),
                Command::StopReason { .. } => unreachable!("handled above"),
            }
            return;
        }

        match cmd {
            Command::Open { spec, information, capacity, reply } => {
                let result = self.handle_open(spec, information, capacity);
                let _ = reply.send(result);
            }
            Command::Close { name, reason, reply } => {
                self.handle_close(name, reason);
                let _ = reply.send(Ok(()));
            }
            Command::Send { to, from, lifespan, data, reply } => {
                let result = self.handle_send(to, from, lifespan, data);
                let _ = reply.send(result);
            }
            Command::Stop { reason, reply } => {
                self.handle_stop(reason).await;
                let _ = reply.send(Ok(()));
            }
            Command::StopReason { .. } => unreachable!("handled above"),
        }
    }

    fn handle_open(
        &mut self,
        spec: NameSpec,
        information: HashMap<String, String>,
        capacity: usize,
    ) -> Result<OpenOutcome<M>, Error> {
        let resolved_name = match spec {
            NameSpec::Fixed(name) => name,
            NameSpec::Wildcard { template, random_bytes } => name::resolve(&template, random_bytes),
        };

        if self.registry.contains_key(&resolved_name) {
            return Err(Error::EndpointExists);
        }

        let (tx, rx) = mpsc::channel(capacity.max(1));
        let information = Arc::new(information);
        self.registry.insert(
            resolved_name.clone(),
            RegistryEntry {
                information: information.clone(),
                tx,
            },
        );

        Ok(OpenOutcome {
            name: resolved_name,
            information,
            inbox: rx,
        })
    }

    fn handle_close(&mut self, name: String, reason: Reason) {
        let Some(entry) = self.registry.remove(&name) else {
            return;
        };
        self.spawn_enqueue(entry.tx, Event::Terminal { reason });
    }

    fn handle_send(&mut self, to: String, from: String, lifespan: Lifespan, data: M) -> Result<(), Error> {
        let Some(entry) = self.registry.get(&to) else {
            return Err(Error::EndpointDoesNotExist);
        };
        self.spawn_enqueue(entry.tx.clone(), Event::Message { to, from, lifespan, data });
        Ok(())
    }

    async fn handle_stop(&mut self, reason: Reason) {
        self.stop_reason = Some(reason.clone());
        let entries: Vec<_> = self.registry.drain().collect();
        for (_, entry) in entries {
            self.spawn_enqueue(entry.tx, Event::Terminal { reason: reason.clone() });
        }
        self.inflight.drain().await;
    }

    /// Enqueue on a spawned task rather than inline, so a full inbox cannot stall the command
    /// loop (and thereby every other endpoint). If the receiver has already been dropped the
    /// send simply fails and the task exits; nothing is listening, so there is nothing to do.
    fn spawn_enqueue(&self, tx: mpsc::Sender<Event<M>>, event: Event<M>) {
        self.inflight.spawn(&self.runtime, async move {
            let _ = tx.send(event).await;
        });
    }
}
