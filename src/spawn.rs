//! Spawn capability, the only sanctioned way to open related contexts.
//!
//! Wraps the platform's [`WindowOpener`] once per mounted context. A
//! successful open schedules a `new_tab` announcement after a short delay,
//! so the spawned context's own first-activation announcement races
//! independently. Receivers count both.
//!
//! Releasing the capability cancels pending announcements and turns it into
//! a plain pass-through to the opener.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::bus::BusChannel;
use crate::bus::message::{MessageKind, PeerMessage};
use crate::host::{OpenedWindow, WindowOpener};
use crate::peer::PeerId;

#[derive(Clone)]
pub struct SpawnCapability {
    inner: Arc<Inner>,
}

struct Inner {
    opener: Arc<dyn WindowOpener>,
    /// `None` when the context runs without a bus.
    channel: Option<Arc<dyn BusChannel>>,
    local: PeerId,
    delay: Duration,
    runtime: Handle,
    released: AtomicBool,
    cancel: CancellationToken,
}

impl SpawnCapability {
    /// Must be called from within a Tokio runtime; announcements are
    /// scheduled on it.
    pub(crate) fn acquire(
        opener: Arc<dyn WindowOpener>,
        channel: Option<Arc<dyn BusChannel>>,
        local: PeerId,
        delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                opener,
                channel,
                local,
                delay,
                runtime: Handle::current(),
                released: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Open `url` and, while the capability is held, announce the spawn.
    pub fn open(&self, url: &str) -> Option<OpenedWindow> {
        let opened = self.inner.opener.open(url)?;

        if self.is_released() {
            return Some(opened);
        }
        let Some(channel) = self.inner.channel.clone() else {
            return Some(opened);
        };

        let local = self.inner.local.clone();
        let delay = self.inner.delay;
        let cancel = self.inner.cancel.clone();
        self.inner.runtime.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(tab = %local, "spawn announcement cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    match PeerMessage::timed(MessageKind::NewTab, local.clone()).encode() {
                        Ok(payload) => channel.publish(payload),
                        Err(e) => tracing::warn!(tab = %local, error = %e, "failed to encode spawn announcement"),
                    }
                }
            }
        });

        tracing::debug!(tab = %self.inner.local, url, "spawned related context");
        Some(opened)
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }

    /// Cancel pending announcements and stop announcing. Idempotent.
    pub(crate) fn release(&self) {
        if !self.inner.released.swap(true, Ordering::SeqCst) {
            self.inner.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Bus, LocalBus};
    use crate::host::NoopOpener;

    fn echo_opener() -> Arc<dyn WindowOpener> {
        Arc::new(|url: &str| {
            Some(OpenedWindow {
                url: url.to_string(),
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn successful_open_announces_after_delay() {
        let bus = LocalBus::new();
        let opener_side = bus.open("c").unwrap();
        let mut observer = bus.open("c").unwrap();

        let spawn = SpawnCapability::acquire(
            echo_opener(),
            Some(opener_side.channel),
            PeerId::from("opener"),
            Duration::from_millis(100),
        );
        assert_eq!(spawn.open("/child").unwrap().url, "/child");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(observer.messages.try_recv().is_err(), "announced too early");

        let payload = observer.messages.recv().await.unwrap();
        let msg = PeerMessage::decode(&payload).unwrap();
        assert_eq!(msg.kind, MessageKind::NewTab);
        assert_eq!(msg.tab_id, PeerId::from("opener"));
        assert!(msg.timestamp.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn refused_open_announces_nothing() {
        let bus = LocalBus::new();
        let opener_side = bus.open("c").unwrap();
        let mut observer = bus.open("c").unwrap();

        let spawn = SpawnCapability::acquire(
            Arc::new(NoopOpener),
            Some(opener_side.channel),
            PeerId::from("opener"),
            Duration::from_millis(100),
        );
        assert!(spawn.open("/child").is_none());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(observer.messages.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn release_cancels_pending_and_passes_through() {
        let bus = LocalBus::new();
        let opener_side = bus.open("c").unwrap();
        let mut observer = bus.open("c").unwrap();

        let spawn = SpawnCapability::acquire(
            echo_opener(),
            Some(opener_side.channel),
            PeerId::from("opener"),
            Duration::from_millis(100),
        );
        spawn.open("/first");
        spawn.release();
        assert!(spawn.is_released());

        // Still opens, never announces.
        assert!(spawn.open("/second").is_some());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(observer.messages.try_recv().is_err());
    }
}
