use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use log::{debug, info, warn};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::BroadcastError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of one fan-out. Fan-out is best effort, so nothing here is an error.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    /// Queue was full; the new message was discarded for that subscriber.
    pub dropped: usize,
    /// Consumer had gone away; its registration was pruned.
    pub closed: usize,
}

#[derive(Default)]
struct Registry {
    senders: BTreeMap<SubscriberId, mpsc::Sender<String>>,
    closed: bool,
}

/// Fans every published message out to a bounded queue per subscriber.
///
/// Overflow policy is drop-newest: `publish` only ever calls `try_send`, so a
/// stalled consumer loses messages instead of stalling the producer or any
/// other subscriber.
pub struct Broadcaster {
    registry: Mutex<Registry>,
    queue_capacity: usize,
}

impl Broadcaster {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub fn register(&self, id: SubscriberId) -> Result<Subscriber, BroadcastError> {
        let mut registry = self.lock();
        if registry.closed {
            return Err(BroadcastError::Closed);
        }
        if registry.senders.contains_key(&id) {
            return Err(BroadcastError::AlreadyRegistered(id));
        }

        let (tx, rx) = mpsc::channel(self.queue_capacity);
        registry.senders.insert(id, tx);

        info!("Subscriber {} registered ({} active)", id, registry.senders.len());
        Ok(Subscriber { id, rx })
    }

    pub fn register_new(&self) -> Result<Subscriber, BroadcastError> {
        self.register(SubscriberId::new())
    }

    /// Messages already queued stay readable; the subscriber sees end-of-stream
    /// once it has drained them.
    pub fn unregister(&self, id: SubscriberId) -> Result<(), BroadcastError> {
        let mut registry = self.lock();
        match registry.senders.remove(&id) {
            Some(_) => {
                info!("Subscriber {} unregistered ({} active)", id, registry.senders.len());
                Ok(())
            }
            None => Err(BroadcastError::NotRegistered(id)),
        }
    }

    pub fn publish(&self, message: &str) -> PublishReport {
        let mut report = PublishReport::default();
        let mut registry = self.lock();

        registry.senders.retain(|id, tx| match tx.try_send(message.to_string()) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!("Subscriber {} queue full, dropping message", id);
                report.dropped += 1;
                true
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Subscriber {} stopped consuming, removing it", id);
                report.closed += 1;
                false
            }
        });

        debug!(
            "Published to {} subscribers ({} dropped, {} pruned)",
            report.delivered, report.dropped, report.closed
        );
        report
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().senders.len()
    }

    pub fn subscriber_ids(&self) -> Vec<SubscriberId> {
        self.lock().senders.keys().copied().collect()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Releases every queue. Consumption loops drain what is left and exit.
    pub fn close(&self) {
        let mut registry = self.lock();
        let released = registry.senders.len();
        registry.senders.clear();
        registry.closed = true;
        info!("Broadcaster closed, released {} subscriber queues", released);
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Receiving end of one subscriber's queue.
pub struct Subscriber {
    id: SubscriberId,
    rx: mpsc::Receiver<String>,
}

impl Subscriber {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    /// Runs the consumption loop on its own task until the queue is closed and
    /// drained. Resolves to the number of messages handled.
    pub fn spawn<F>(mut self, mut handler: F) -> JoinHandle<usize>
    where
        F: FnMut(&SubscriberId, String) + Send + 'static,
    {
        tokio::spawn(async move {
            let mut handled = 0;
            while let Some(message) = self.rx.recv().await {
                handler(&self.id, message);
                handled += 1;
            }
            info!("Subscriber {} stopped after {} messages", self.id, handled);
            handled
        })
    }
}
