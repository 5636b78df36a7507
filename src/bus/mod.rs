//! Broadcast bus: the only coupling between contexts.
//!
//! A bus fans every published payload out to every *other* handle open on
//! the same channel name. Delivery is best-effort: no ordering, no
//! acknowledgement, at most once per listener. Publishing never fails from
//! the caller's point of view; a closed or broken handle drops the payload.

pub mod message;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

#[derive(Debug, Error)]
pub enum BusError {
    /// The platform has no broadcast transport.
    #[error("broadcast bus unavailable")]
    Unavailable,
}

pub type BusResult<T> = Result<T, BusError>;

/// Publishing half of an open bus handle.
///
/// Shared between the context's actor and anything else that announces on
/// its behalf (e.g. delayed spawn announcements), hence `&self` methods.
pub trait BusChannel: Send + Sync {
    /// Fire-and-forget publish to every other handle on the channel.
    fn publish(&self, payload: Bytes);

    /// Stop receiving and drop all further publishes. Idempotent.
    fn close(&self);

    /// Whether [`BusChannel::close`] has been called.
    fn is_closed(&self) -> bool;
}

/// Result of a successful [`Bus::open`] call.
pub struct Subscription {
    pub channel: Arc<dyn BusChannel>,
    /// Mailbox of payloads published by other handles.
    pub messages: UnboundedReceiver<Bytes>,
}

/// Opens handles on named broadcast channels.
pub trait Bus: Send + Sync {
    /// Open a new handle on `channel`. Fails when the platform has no bus.
    fn open(&self, channel: &str) -> BusResult<Subscription>;
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    channels: HashMap<String, HashMap<u64, UnboundedSender<Bytes>>>,
}

/// In-process bus. Every handle opened on a clone of the same `LocalBus`
/// sees the others' publishes, delivered synchronously into their mailboxes.
#[derive(Clone, Default)]
pub struct LocalBus {
    registry: Arc<Mutex<Registry>>,
}

impl LocalBus {
    /// A bus with no open handles.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open handles on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.registry
            .lock()
            .channels
            .get(channel)
            .map_or(0, HashMap::len)
    }
}

impl Bus for LocalBus {
    fn open(&self, channel: &str) -> BusResult<Subscription> {
        let (tx, rx) = unbounded_channel();
        let id = {
            let mut registry = self.registry.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            registry
                .channels
                .entry(channel.to_string())
                .or_default()
                .insert(id, tx);
            id
        };

        Ok(Subscription {
            channel: Arc::new(LocalChannel {
                registry: Arc::clone(&self.registry),
                name: channel.to_string(),
                id,
                closed: AtomicBool::new(false),
            }),
            messages: rx,
        })
    }
}

struct LocalChannel {
    registry: Arc<Mutex<Registry>>,
    name: String,
    id: u64,
    closed: AtomicBool,
}

impl BusChannel for LocalChannel {
    fn publish(&self, payload: Bytes) {
        if self.is_closed() {
            tracing::debug!(channel = %self.name, "publish on closed handle dropped");
            return;
        }
        let registry = self.registry.lock();
        let Some(subscribers) = registry.channels.get(&self.name) else {
            return;
        };
        for (&id, tx) in subscribers {
            if id != self.id {
                // A receiver that went away is just a listener we lost.
                let _ = tx.send(payload.clone());
            }
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut registry = self.registry.lock();
        if let Some(subscribers) = registry.channels.get_mut(&self.name) {
            subscribers.remove(&self.id);
            if subscribers.is_empty() {
                registry.channels.remove(&self.name);
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for LocalChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// A platform without broadcast support.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableBus;

impl Bus for UnavailableBus {
    fn open(&self, _channel: &str) -> BusResult<Subscription> {
        Err(BusError::Unavailable)
    }
}
