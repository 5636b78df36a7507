//! The externally observed state of one context.

use std::time::{Duration, SystemTime};

use crate::discovery::DiscoveryState;
use crate::focus::FocusState;

/// Immutable combination of discovery and focus state at one point in time.
///
/// Every field is eventually consistent: peers may still be announcing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub is_currently_focused: bool,
    pub focus_lost_count: u32,
    pub total_focus_loss_time: Duration,
    /// Wall-clock time of the latest loss of focus.
    pub last_focus_lost: Option<SystemTime>,
    /// Wall-clock time of the latest regain of focus.
    pub last_focus_gained: Option<SystemTime>,
    pub has_multiple_instances: bool,
    /// Always at least 1 (this context).
    pub total_tabs: usize,
    pub has_new_tabs_opened: bool,
    pub new_tabs_count: u32,
    /// Whether the initial discovery window has elapsed.
    pub discovery_complete: bool,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::capture(&DiscoveryState::new("".into()), &FocusState::new(), false)
    }
}

impl Snapshot {
    /// Combine the current state of both halves.
    pub fn capture(discovery: &DiscoveryState, focus: &FocusState, discovery_complete: bool) -> Self {
        Self {
            is_currently_focused: focus.is_focused(),
            focus_lost_count: focus.lost_count(),
            total_focus_loss_time: focus.total_loss(),
            last_focus_lost: focus.last_lost_at(),
            last_focus_gained: focus.last_gained_at(),
            has_multiple_instances: discovery.has_multiple_instances(),
            total_tabs: discovery.total_tabs(),
            has_new_tabs_opened: discovery.has_new_tabs_opened(),
            new_tabs_count: discovery.new_tabs_count(),
            discovery_complete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::message::{MessageKind, PeerMessage};
    use crate::peer::PeerId;
    use tokio::time::Instant;

    #[test]
    fn default_is_a_lone_focused_tab() {
        let snap = Snapshot::default();
        assert!(snap.is_currently_focused);
        assert_eq!(snap.total_tabs, 1);
        assert!(!snap.has_multiple_instances);
        assert_eq!(snap.focus_lost_count, 0);
        assert!(!snap.discovery_complete);
    }

    #[test]
    fn capture_reflects_both_halves() {
        let mut discovery = DiscoveryState::new(PeerId::from("me"));
        discovery.handle(&PeerMessage::new(MessageKind::NewTab, PeerId::from("kid")));
        let mut focus = FocusState::new();
        focus.lose(Instant::now());

        let snap = Snapshot::capture(&discovery, &focus, true);
        assert!(!snap.is_currently_focused);
        assert_eq!(snap.focus_lost_count, 1);
        assert!(snap.last_focus_lost.is_some());
        assert!(snap.last_focus_gained.is_none());
        assert_eq!(snap.total_tabs, 2);
        assert!(snap.has_new_tabs_opened);
        assert_eq!(snap.new_tabs_count, 1);
        assert!(snap.discovery_complete);
    }
}
