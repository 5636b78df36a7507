//! Peer discovery and presence.
//!
//! Pure bookkeeping over the message history of one context. The actor in
//! [`crate::tab`] feeds every decoded bus message through
//! [`DiscoveryState::handle`] and performs the returned reply, if any.
//!
//! Every handler is idempotent with respect to the sender's id except the
//! `new_tab` counter, which counts messages. A spawn therefore counts twice
//! when both the opener and the spawned context announce it.

use std::collections::HashSet;

use crate::bus::message::{MessageKind, PeerMessage};
use crate::peer::PeerId;

/// Peers observed on the bus. Never contains the local id.
#[derive(Debug, Clone, Default)]
pub struct PresenceSet {
    peers: HashSet<PeerId>,
}

impl PresenceSet {
    fn insert(&mut self, peer: PeerId) -> bool {
        self.peers.insert(peer)
    }

    fn remove(&mut self, peer: &PeerId) -> bool {
        self.peers.remove(peer)
    }

    /// Whether `peer` has been seen and not yet said goodbye.
    pub fn contains(&self, peer: &PeerId) -> bool {
        self.peers.contains(peer)
    }

    /// Number of known peers, excluding the local context.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Peers plus the local context.
    pub fn total_tabs(&self) -> usize {
        self.peers.len() + 1
    }
}

/// What the caller must do after a message was handled.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Outcome {
    /// Message to publish in response.
    pub reply: Option<PeerMessage>,
    /// Whether anything a snapshot reports changed.
    pub changed: bool,
}

/// Discovery bookkeeping for one context.
#[derive(Debug, Clone)]
pub struct DiscoveryState {
    local: PeerId,
    presence: PresenceSet,
    new_tabs_count: u32,
    has_reply: bool,
}

impl DiscoveryState {
    /// Empty state for the context identified by `local`; messages from
    /// `local` itself are ignored.
    pub fn new(local: PeerId) -> Self {
        Self {
            local,
            presence: PresenceSet::default(),
            new_tabs_count: 0,
            has_reply: false,
        }
    }

    /// Peers currently known to be open.
    pub fn presence(&self) -> &PresenceSet {
        &self.presence
    }

    /// Number of `new_tab` announcements received, duplicates included.
    pub fn new_tabs_count(&self) -> u32 {
        self.new_tabs_count
    }

    /// Whether any `ping` or `pong` from a peer has arrived.
    pub fn has_reply(&self) -> bool {
        self.has_reply
    }

    /// Whether at least one peer is known.
    pub fn has_multiple_instances(&self) -> bool {
        !self.presence.is_empty()
    }

    pub fn has_new_tabs_opened(&self) -> bool {
        self.new_tabs_count > 0
    }

    /// Known peers plus the local context.
    pub fn total_tabs(&self) -> usize {
        self.presence.total_tabs()
    }

    /// Apply one message received from the bus.
    pub fn handle(&mut self, msg: &PeerMessage) -> Outcome {
        if msg.tab_id == self.local {
            return Outcome::default();
        }

        match msg.kind {
            MessageKind::Ping => {
                let inserted = self.presence.insert(msg.tab_id.clone());
                let changed = inserted || !self.has_reply;
                self.has_reply = true;
                Outcome {
                    reply: Some(PeerMessage::new(MessageKind::Pong, self.local.clone())),
                    changed,
                }
            }
            MessageKind::Pong => {
                let inserted = self.presence.insert(msg.tab_id.clone());
                let changed = inserted || !self.has_reply;
                self.has_reply = true;
                Outcome {
                    reply: None,
                    changed,
                }
            }
            MessageKind::NewTab => {
                self.new_tabs_count += 1;
                self.presence.insert(msg.tab_id.clone());
                tracing::debug!(peer = %msg.tab_id, count = self.new_tabs_count, "new tab announced");
                Outcome {
                    reply: None,
                    changed: true,
                }
            }
            MessageKind::TabClosed => Outcome {
                reply: None,
                changed: self.presence.remove(&msg.tab_id),
            },
            MessageKind::FocusLost | MessageKind::FocusGained => {
                tracing::debug!(peer = %msg.tab_id, kind = ?msg.kind, timestamp = ?msg.timestamp, "peer focus change");
                Outcome::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(kind: MessageKind, from: &str) -> PeerMessage {
        PeerMessage::new(kind, PeerId::from(from))
    }

    fn state() -> DiscoveryState {
        DiscoveryState::new(PeerId::from("me"))
    }

    #[test]
    fn fresh_state_is_alone() {
        let s = state();
        assert_eq!(s.total_tabs(), 1);
        assert!(!s.has_multiple_instances());
        assert!(!s.has_reply());
        assert!(!s.has_new_tabs_opened());
    }

    #[test]
    fn ping_is_answered_with_pong_and_records_sender() {
        let mut s = state();
        let out = s.handle(&msg(MessageKind::Ping, "peer"));
        let reply = out.reply.expect("ping must be answered");
        assert_eq!(reply.kind, MessageKind::Pong);
        assert_eq!(reply.tab_id, PeerId::from("me"));
        assert!(out.changed);
        assert!(s.has_reply());
        assert_eq!(s.total_tabs(), 2);
    }

    #[test]
    fn pong_records_sender_without_reply() {
        let mut s = state();
        let out = s.handle(&msg(MessageKind::Pong, "peer"));
        assert_eq!(out.reply, None);
        assert!(s.presence().contains(&PeerId::from("peer")));
        assert!(s.has_multiple_instances());
    }

    #[test]
    fn own_messages_are_ignored() {
        let mut s = state();
        for kind in [
            MessageKind::Ping,
            MessageKind::Pong,
            MessageKind::NewTab,
            MessageKind::TabClosed,
        ] {
            let out = s.handle(&msg(kind, "me"));
            assert_eq!(out, Outcome::default());
        }
        assert!(!s.presence().contains(&PeerId::from("me")));
        assert_eq!(s.total_tabs(), 1);
        assert_eq!(s.new_tabs_count(), 0);
    }

    #[test]
    fn repeated_announcements_are_idempotent_for_presence() {
        let mut s = state();
        s.handle(&msg(MessageKind::Ping, "peer"));
        let out = s.handle(&msg(MessageKind::Pong, "peer"));
        assert!(!out.changed);
        assert_eq!(s.total_tabs(), 2);
    }

    #[test]
    fn new_tab_counts_every_message() {
        let mut s = state();
        s.handle(&msg(MessageKind::NewTab, "child"));
        s.handle(&msg(MessageKind::NewTab, "child"));
        assert_eq!(s.new_tabs_count(), 2);
        assert_eq!(s.total_tabs(), 2);
        assert!(s.has_new_tabs_opened());
        assert!(s.has_multiple_instances());
    }

    #[test]
    fn tab_closed_removes_peer() {
        let mut s = state();
        s.handle(&msg(MessageKind::Pong, "peer"));
        let out = s.handle(&msg(MessageKind::TabClosed, "peer"));
        assert!(out.changed);
        assert_eq!(s.total_tabs(), 1);
        assert!(!s.has_multiple_instances());
    }

    #[test]
    fn tab_closed_for_unknown_peer_is_noop() {
        let mut s = state();
        s.handle(&msg(MessageKind::Pong, "peer"));
        let out = s.handle(&msg(MessageKind::TabClosed, "stranger"));
        assert!(!out.changed);
        assert_eq!(s.total_tabs(), 2);
    }

    #[test]
    fn peer_focus_changes_do_not_touch_presence() {
        let mut s = state();
        let out = s.handle(&PeerMessage::timed(MessageKind::FocusLost, PeerId::from("peer")));
        assert_eq!(out, Outcome::default());
        assert!(s.presence().is_empty());
    }
}
