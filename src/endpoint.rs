//! The Endpoint handle: a thin wrapper around a name, immutable metadata, and the receiving
//! half of a bounded inbox.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

use crate::error::{Error, Reason};
use crate::exchange::Exchange;
use crate::lifespan::Lifespan;

/// One event delivered through an endpoint's inbox.
#[derive(Debug, Clone)]
pub enum Event<M> {
    Message {
        to: String,
        from: String,
        lifespan: Lifespan,
        data: M,
    },
    /// Enqueued exactly once, as the last event a receiver will ever observe.
    Terminal { reason: Reason },
}

/// A received event, already split out of its envelope for the caller's convenience.
#[derive(Debug, Clone)]
pub enum Received<M> {
    Message {
        to: String,
        from: String,
        lifespan: Lifespan,
        data: M,
    },
    Terminal {
        reason: Reason,
    },
}

/// Handle to a registered mailbox. Endpoints are value-identity: cloning an `Endpoint` yields
/// another handle onto the *same* inbox, since any holder of the same name refers to the same
/// mailbox. Concurrent `receive` calls race for events, each event going to exactly one racer;
/// this is implemented by keeping the inbox receiver behind a `tokio::sync::Mutex`.
pub struct Endpoint<M> {
    name: Arc<str>,
    information: Arc<HashMap<String, String>>,
    exchange: Exchange<M>,
    inbox: Arc<Mutex<mpsc::Receiver<Event<M>>>>,
}

impl<M> Clone for Endpoint<M> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            information: self.information.clone(),
            exchange: self.exchange.clone(),
            inbox: self.inbox.clone(),
        }
    }
}

impl<M> std::fmt::Debug for Endpoint<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint").field("name", &self.name).finish()
    }
}

impl<M> Endpoint<M>
where
    M: Send + 'static,
{
    pub(crate) fn new(
        name: impl Into<Arc<str>>,
        information: Arc<HashMap<String, String>>,
        exchange: Exchange<M>,
        inbox: mpsc::Receiver<Event<M>>,
    ) -> Self {
        Self {
            name: name.into(),
            information,
            exchange,
            inbox: Arc::new(Mutex::new(inbox)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn information(&self) -> &HashMap<String, String> {
        &self.information
    }

    /// The exchange this endpoint is registered with. Lets a holder (e.g. a bridge) ask
    /// questions that are about the exchange rather than this one mailbox, such as
    /// [`Exchange::stop_reason`].
    pub fn exchange(&self) -> &Exchange<M> {
        &self.exchange
    }

    /// Forward a send to this endpoint's exchange with `from` set to this endpoint's name.
    pub async fn send(&self, lifespan: Lifespan, to: &str, data: M) -> Result<(), Error> {
        self.exchange.send(lifespan, to, &self.name, data).await
    }

    pub async fn send_deadline(
        &self,
        deadline: Instant,
        lifespan: Lifespan,
        to: &str,
        data: M,
    ) -> Result<(), Error> {
        self.exchange
            .send_deadline(Some(deadline), lifespan, to, &self.name, data)
            .await
    }

    /// Block on the inbox for the next event.
    pub async fn receive(&self) -> Result<Received<M>, Error> {
        let mut inbox = self.inbox.lock().await;
        match inbox.recv().await {
            Some(Event::Message { to, from, lifespan, data }) => {
                Ok(Received::Message { to, from, lifespan, data })
            }
            Some(Event::Terminal { reason }) => Ok(Received::Terminal { reason }),
            None => Err(Error::ExchangeClosed),
        }
    }

    /// As [`Endpoint::receive`], but gives up once `deadline` elapses.
    pub async fn receive_deadline(&self, deadline: Instant) -> Result<Received<M>, Error> {
        let mut inbox = self.inbox.lock().await;
        tokio::select! {
            biased;
            _ = tokio::time::sleep_until(deadline) => Err(Error::DeadlineElapsed),
            event = inbox.recv() => match event {
                Some(Event::Message { to, from, lifespan, data }) => {
                    Ok(Received::Message { to, from, lifespan, data })
                }
                Some(Event::Terminal { reason }) => Ok(Received::Terminal { reason }),
                None => Err(Error::ExchangeClosed),
            },
        }
    }

    pub async fn close(&self, reason: Reason) -> Result<(), Error> {
        self.exchange.close(&self.name, reason).await
    }
}
