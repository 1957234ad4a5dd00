use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lambo_core::{EnvelopeKind, EventEnvelope, InvokeError, Invoker, ResponseEnvelope};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::config::RuntimeConfig;

/// Pending invocations allowed before `invoke` starts applying backpressure.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Outcome delivered to a waiting `invoke` call.
pub type InvocationResult = Result<ResponseEnvelope, InvokeError>;

/// A queued unit of work, as handed to the function on its next poll.
#[derive(Debug)]
pub struct Invocation {
    pub id: String,
    pub event: EventEnvelope,
}

/// Completion side of an invocation, keyed by id in the correlation table.
struct Outstanding {
    kind: EnvelopeKind,
    completion: oneshot::Sender<InvocationResult>,
}

/// Hands invocations to the single polling function process and routes its
/// results back to the callers waiting on them.
///
/// Any number of tasks may call [`Broker::invoke`] concurrently. Invocations
/// are dequeued strictly in the order they were queued, and the queue is
/// bounded: once full, further callers wait for room rather than being
/// rejected.
///
/// # Locking
///
/// The correlation table sits behind one mutex that is only ever held for an
/// insert, lookup or removal. The queue's own channel synchronisation is the
/// only thing callers and the poller block on.
pub struct Broker {
    sender: mpsc::Sender<Invocation>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<Invocation>>,
    outstanding: Mutex<HashMap<String, Outstanding>>,
    invoke_timeout: Option<Duration>,
}

impl Broker {
    pub fn new(config: &RuntimeConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
            outstanding: Mutex::new(HashMap::new()),
            invoke_timeout: config.invoke_timeout,
        }
    }

    /// Run the function once for `event` and wait for its result.
    ///
    /// Without an invoke timeout this waits for as long as it takes; a
    /// function that never answers leaves the caller suspended until the
    /// returned future is dropped.
    pub async fn invoke(&self, event: EventEnvelope) -> InvocationResult {
        let id = Uuid::new_v4().to_string();
        let kind = event.kind();
        let (completion, result) = oneshot::channel();

        let _registration = self.register(&id, kind, completion);

        let flow = async {
            let queued = self
                .sender
                .send(Invocation {
                    id: id.clone(),
                    event,
                })
                .await;
            if queued.is_err() {
                return Err(InvokeError::Closed);
            }
            tracing::debug!(id = %id, %kind, "Invocation queued");

            match result.await {
                Ok(outcome) => outcome,
                Err(_) => Err(InvokeError::Abandoned),
            }
        };

        let outcome = match self.invoke_timeout {
            Some(limit) => tokio::time::timeout(limit, flow)
                .await
                .unwrap_or(Err(InvokeError::Timeout(limit))),
            None => flow.await,
        };

        match &outcome {
            Ok(_) => tracing::debug!(id = %id, "Invocation succeeded"),
            Err(e) => tracing::debug!(id = %id, error = %e, "Invocation failed"),
        }
        outcome
    }

    /// Wait for the next invocation whose caller is still waiting.
    ///
    /// Only one poller is served at a time. Invocations abandoned by their
    /// caller while queued are discarded here.
    pub async fn next(&self) -> Option<Invocation> {
        let mut receiver = self.receiver.lock().await;
        loop {
            let invocation = receiver.recv().await?;
            if self.table().contains_key(&invocation.id) {
                return Some(invocation);
            }
            tracing::debug!(id = %invocation.id, "Skipping invocation abandoned by its caller");
        }
    }

    /// Kind of the request behind an outstanding invocation.
    pub fn kind_of(&self, id: &str) -> Option<EnvelopeKind> {
        self.table().get(id).map(|entry| entry.kind)
    }

    /// Deliver the result for `id`. Returns `false` when no such invocation
    /// is outstanding.
    pub fn resolve(&self, id: &str, result: InvocationResult) -> bool {
        let Some(entry) = self.table().remove(id) else {
            tracing::warn!(id, "Result for unknown invocation ignored");
            return false;
        };

        if entry.completion.send(result).is_err() {
            tracing::warn!(id, "Caller stopped waiting, result dropped");
        }
        true
    }

    /// Release every waiting caller with `InvokeError::Abandoned`.
    pub fn abandon_outstanding(&self) -> usize {
        let abandoned: Vec<_> = self.table().drain().collect();
        for (id, _) in &abandoned {
            tracing::warn!(id = %id, "Invocation abandoned");
        }
        abandoned.len()
    }

    /// Invocations registered and not yet resolved, queued or in flight.
    pub fn outstanding(&self) -> usize {
        self.table().len()
    }

    /// Invocations sitting in the queue.
    pub fn queue_depth(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    fn register(
        &self,
        id: &str,
        kind: EnvelopeKind,
        completion: oneshot::Sender<InvocationResult>,
    ) -> Registration<'_> {
        self.table()
            .insert(id.to_owned(), Outstanding { kind, completion });
        Registration {
            broker: self,
            id: id.to_owned(),
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Outstanding>> {
        self.outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(&RuntimeConfig::default())
    }
}

impl Invoker for Broker {
    fn invoke<'a>(
        &'a self,
        event: EventEnvelope,
    ) -> Pin<Box<dyn Future<Output = Result<ResponseEnvelope, InvokeError>> + Send + 'a>> {
        Box::pin(Broker::invoke(self, event))
    }
}

/// Removes the correlation entry however `invoke` finishes, including when
/// its future is dropped.
struct Registration<'a> {
    broker: &'a Broker,
    id: String,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.broker.table().remove(&self.id);
    }
}
