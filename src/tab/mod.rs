//! Per-context actor.
//!
//! One Tokio task per mounted context owns all of its discovery and focus
//! state. Its inputs are the bus mailbox, the host's listener channel, the
//! one-shot discovery timer and a shutdown token; nothing else mutates the
//! state, so handlers never interleave.
//!
//! Mount: generate the id, open the bus (degrading to single-tab mode when
//! it is unavailable), attach listeners, broadcast `ping`, apply the
//! self-spawn policy, correct the initial focus reading, arm the discovery
//! timer.
//!
//! Unmount, in order: cancel the discovery timer, detach listeners,
//! broadcast `tab_closed` (once), close the bus handle, release the spawn
//! capability.

use std::future::pending;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::bus::message::{MessageKind, PeerMessage};
use crate::bus::{Bus, BusChannel};
use crate::config::TabConfig;
use crate::discovery::DiscoveryState;
use crate::focus::{FocusState, Transition};
use crate::host::{HostEvent, HostEventProvider, SessionStore, WindowOpener};
use crate::peer::PeerId;
use crate::snapshot::Snapshot;
use crate::spawn::SpawnCapability;

#[derive(Debug, Error)]
pub enum TabError {
    /// The host refused to attach focus/visibility/unload listeners.
    #[error("listener registration failed: {0}")]
    Listener(String),
    #[error("tab actor terminated abnormally: {0}")]
    Actor(#[from] tokio::task::JoinError),
}

/// Everything a context needs from its host.
pub struct Platform {
    pub bus: Arc<dyn Bus>,
    pub session: Arc<dyn SessionStore>,
    pub events: Box<dyn HostEventProvider>,
    pub opener: Arc<dyn WindowOpener>,
}

/// Owner's handle to a mounted context.
///
/// Dropping it without [`TabHandle::unmount`] still tears the context down,
/// just without waiting for it.
pub struct TabHandle {
    peer_id: PeerId,
    snapshots: watch::Receiver<Snapshot>,
    spawner: SpawnCapability,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TabHandle {
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver notified on every published snapshot.
    pub fn snapshots(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Wait until the discovery window has elapsed and return the frozen
    /// snapshot, or the last one if the context is already gone.
    pub async fn discovered(&self) -> Snapshot {
        let mut rx = self.snapshots.clone();
        if let Ok(snap) = rx.wait_for(|s| s.discovery_complete).await {
            return snap.clone();
        }
        rx.borrow().clone()
    }

    /// The capability for opening related contexts.
    pub fn spawner(&self) -> SpawnCapability {
        self.spawner.clone()
    }

    /// Tear the context down and wait for the actor to finish.
    pub async fn unmount(mut self) -> Result<(), TabError> {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            task.await?;
        }
        Ok(())
    }
}

impl Drop for TabHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Mount a context on `platform`. Must be called from within a Tokio
/// runtime.
pub fn mount(config: TabConfig, platform: Platform) -> Result<TabHandle, TabError> {
    let Platform {
        bus,
        session,
        mut events,
        opener,
    } = platform;
    let local = PeerId::generate();

    let (channel, messages) = match bus.open(&config.channel) {
        Ok(sub) => (Some(sub.channel), Some(sub.messages)),
        Err(e) => {
            tracing::warn!(tab = %local, error = %e, "bus unavailable, running as a single tab");
            (None, None)
        }
    };

    let registration = match events.register() {
        Ok(reg) => reg,
        Err(e) => {
            if let Some(channel) = &channel {
                channel.close();
            }
            return Err(e);
        }
    };

    let spawner = SpawnCapability::acquire(
        opener,
        channel.clone(),
        local.clone(),
        config.spawn_announce_delay,
    );
    let (snapshots_tx, snapshots_rx) = watch::channel(Snapshot::default());

    let mut actor = Actor {
        local: local.clone(),
        channel,
        discovery: DiscoveryState::new(local.clone()),
        focus: FocusState::new(),
        discovery_complete: false,
        closed_announced: false,
        events,
        spawner: spawner.clone(),
        snapshots: snapshots_tx,
    };

    actor.broadcast(PeerMessage::new(MessageKind::Ping, local.clone()));

    if session.get(&config.visited_key) {
        tracing::debug!(tab = %local, "context seen before, not announcing");
    } else {
        session.set(&config.visited_key);
        actor.broadcast(PeerMessage::timed(MessageKind::NewTab, local.clone()));
    }

    if !registration.has_focus {
        let transition = actor.focus.lose(Instant::now());
        actor.on_focus_transition(transition);
    }

    tracing::info!(tab = %local, channel = %config.channel, "tab mounted");

    let shutdown = CancellationToken::new();
    let task = tokio::spawn(actor.run(
        messages,
        registration.events,
        config,
        shutdown.clone(),
    ));

    Ok(TabHandle {
        peer_id: local,
        snapshots: snapshots_rx,
        spawner,
        shutdown,
        task: Some(task),
    })
}

struct Actor {
    local: PeerId,
    channel: Option<Arc<dyn BusChannel>>,
    discovery: DiscoveryState,
    focus: FocusState,
    discovery_complete: bool,
    closed_announced: bool,
    events: Box<dyn HostEventProvider>,
    spawner: SpawnCapability,
    snapshots: watch::Sender<Snapshot>,
}

impl Actor {
    async fn run(
        mut self,
        mut messages: Option<UnboundedReceiver<Bytes>>,
        events: UnboundedReceiver<HostEvent>,
        config: TabConfig,
        shutdown: CancellationToken,
    ) {
        let mut events = Some(events);
        let mut timer = Box::pin(tokio::time::sleep(config.discovery_window));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                () = &mut timer, if !self.discovery_complete => self.finish_discovery(),
                payload = next(&mut messages) => match payload {
                    Some(payload) => self.on_payload(&payload),
                    None => {
                        tracing::debug!(tab = %self.local, "bus mailbox closed");
                        messages = None;
                    }
                },
                event = next(&mut events) => match event {
                    Some(event) => self.on_host_event(event),
                    None => {
                        tracing::debug!(tab = %self.local, "host listener channel closed");
                        events = None;
                    }
                },
            }
        }

        drop(timer);
        self.teardown();
    }

    fn finish_discovery(&mut self) {
        self.discovery_complete = true;
        tracing::info!(
            tab = %self.local,
            total_tabs = self.discovery.total_tabs(),
            has_reply = self.discovery.has_reply(),
            new_tabs = self.discovery.new_tabs_count(),
            "discovery window elapsed"
        );
        self.publish_snapshot();
    }

    fn on_payload(&mut self, payload: &[u8]) {
        let msg = match PeerMessage::decode(payload) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(tab = %self.local, error = %e, "dropping undecodable bus message");
                return;
            }
        };

        let outcome = self.discovery.handle(&msg);
        if let Some(reply) = outcome.reply {
            self.broadcast(reply);
        }
        if !outcome.changed {
            return;
        }

        // Ping/pong replies are collected silently until the window closes.
        let live = match msg.kind {
            MessageKind::Ping | MessageKind::Pong => self.discovery_complete,
            _ => true,
        };
        if live {
            self.publish_snapshot();
        }
    }

    fn on_host_event(&mut self, event: HostEvent) {
        if event == HostEvent::BeforeUnload {
            self.announce_closed();
            return;
        }
        if let Some(focus_event) = event.focus_event() {
            let transition = self.focus.apply(focus_event, Instant::now());
            self.on_focus_transition(transition);
        }
    }

    fn on_focus_transition(&mut self, transition: Option<Transition>) {
        let kind = match transition {
            Some(Transition::Lost) => MessageKind::FocusLost,
            Some(Transition::Gained) => MessageKind::FocusGained,
            None => return,
        };
        tracing::debug!(
            tab = %self.local,
            ?kind,
            lost_count = self.focus.lost_count(),
            total_loss_ms = self.focus.total_loss().as_millis() as u64,
            "focus transition"
        );
        self.broadcast(PeerMessage::timed(kind, self.local.clone()));
        self.publish_snapshot();
    }

    fn announce_closed(&mut self) {
        if self.closed_announced {
            return;
        }
        self.closed_announced = true;
        self.broadcast(PeerMessage::new(MessageKind::TabClosed, self.local.clone()));
    }

    fn broadcast(&self, msg: PeerMessage) {
        let Some(channel) = &self.channel else {
            return;
        };
        match msg.encode() {
            Ok(payload) => channel.publish(payload),
            Err(e) => tracing::warn!(tab = %self.local, kind = ?msg.kind, error = %e, "failed to encode bus message"),
        }
    }

    fn publish_snapshot(&self) {
        self.snapshots.send_replace(Snapshot::capture(
            &self.discovery,
            &self.focus,
            self.discovery_complete,
        ));
    }

    fn teardown(&mut self) {
        self.events.unregister();
        self.announce_closed();
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
        self.spawner.release();
        tracing::info!(tab = %self.local, "tab unmounted");
    }
}

/// Receive from an optional mailbox; a missing one never yields.
async fn next<T>(rx: &mut Option<UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}
