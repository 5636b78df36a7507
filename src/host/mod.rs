//! Platform seams the context is mounted on.
//!
//! The actor in [`crate::tab`] only talks to the host through these traits.
//! In-process implementations back the tests and the CLI simulation; a real
//! embedding provides its own.

pub mod session;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::focus::FocusEvent;
use crate::tab::TabError;

pub use session::{FileSessionStore, MemorySessionStore, SessionStore};

/// Raw platform event delivered to a registered context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    WindowFocus,
    WindowBlur,
    VisibilityChanged { hidden: bool },
    /// The page is about to unload.
    BeforeUnload,
}

impl HostEvent {
    /// The focus signal this event carries, if any.
    pub fn focus_event(self) -> Option<FocusEvent> {
        match self {
            Self::WindowFocus => Some(FocusEvent::WindowFocus),
            Self::WindowBlur => Some(FocusEvent::WindowBlur),
            Self::VisibilityChanged { hidden: true } => Some(FocusEvent::VisibilityHidden),
            Self::VisibilityChanged { hidden: false } => Some(FocusEvent::VisibilityVisible),
            Self::BeforeUnload => None,
        }
    }
}

/// Result of a successful [`HostEventProvider::register`] call.
pub struct HostRegistration {
    /// Focus, blur, visibility and unload events, in platform order.
    pub events: UnboundedReceiver<HostEvent>,
    /// The platform's own focus reading at registration time.
    pub has_focus: bool,
}

/// Attaches and detaches the global listeners a context needs.
///
/// `register` failing is fatal to the context; there is no fallback for a
/// context that cannot observe its own focus.
pub trait HostEventProvider: Send {
    fn register(&mut self) -> Result<HostRegistration, TabError>;

    /// Detach every listener attached by `register`. After this returns no
    /// further events are delivered.
    fn unregister(&mut self);
}

#[derive(Default)]
struct ListenerSlot {
    sender: Option<UnboundedSender<HostEvent>>,
    has_focus: bool,
    registrations: u32,
}

/// In-process event source. [`HostEvents`] plays the platform side.
pub struct ChannelEventProvider {
    slot: Arc<Mutex<ListenerSlot>>,
}

/// Emits platform events into a [`ChannelEventProvider`].
#[derive(Clone)]
pub struct HostEvents {
    slot: Arc<Mutex<ListenerSlot>>,
}

impl ChannelEventProvider {
    /// A provider for a context that starts with focus.
    pub fn new() -> (Self, HostEvents) {
        Self::with_focus(true)
    }

    pub fn with_focus(has_focus: bool) -> (Self, HostEvents) {
        let slot = Arc::new(Mutex::new(ListenerSlot {
            has_focus,
            ..ListenerSlot::default()
        }));
        (
            Self {
                slot: Arc::clone(&slot),
            },
            HostEvents { slot },
        )
    }
}

impl HostEventProvider for ChannelEventProvider {
    fn register(&mut self) -> Result<HostRegistration, TabError> {
        let mut slot = self.slot.lock();
        if slot.sender.is_some() {
            return Err(TabError::Listener("listeners already registered".into()));
        }
        let (tx, rx) = unbounded_channel();
        slot.sender = Some(tx);
        slot.registrations += 1;
        Ok(HostRegistration {
            events: rx,
            has_focus: slot.has_focus,
        })
    }

    fn unregister(&mut self) {
        self.slot.lock().sender = None;
    }
}

impl HostEvents {
    /// Deliver `event` to the registered listener. Returns `false` when no
    /// listener is attached (the event is lost, as on a real platform).
    pub fn emit(&self, event: HostEvent) -> bool {
        let mut slot = self.slot.lock();
        match event {
            HostEvent::WindowFocus | HostEvent::VisibilityChanged { hidden: false } => {
                slot.has_focus = true;
            }
            HostEvent::WindowBlur | HostEvent::VisibilityChanged { hidden: true } => {
                slot.has_focus = false;
            }
            HostEvent::BeforeUnload => {}
        }
        match &slot.sender {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.slot.lock().sender.is_some()
    }

    /// How many times listeners were attached over the provider's life.
    pub fn registrations(&self) -> u32 {
        self.slot.lock().registrations
    }
}

/// Handle to a context opened through a [`WindowOpener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedWindow {
    pub url: String,
}

/// The platform's window-opening primitive. `None` means the platform
/// refused (e.g. a popup blocker).
pub trait WindowOpener: Send + Sync {
    fn open(&self, url: &str) -> Option<OpenedWindow>;
}

/// Opener for hosts that cannot open windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopOpener;

impl WindowOpener for NoopOpener {
    fn open(&self, _url: &str) -> Option<OpenedWindow> {
        None
    }
}

impl<F> WindowOpener for F
where
    F: Fn(&str) -> Option<OpenedWindow> + Send + Sync,
{
    fn open(&self, url: &str) -> Option<OpenedWindow> {
        self(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_events_map_to_focus_events() {
        assert_eq!(HostEvent::WindowBlur.focus_event(), Some(FocusEvent::WindowBlur));
        assert_eq!(
            HostEvent::VisibilityChanged { hidden: true }.focus_event(),
            Some(FocusEvent::VisibilityHidden)
        );
        assert_eq!(
            HostEvent::VisibilityChanged { hidden: false }.focus_event(),
            Some(FocusEvent::VisibilityVisible)
        );
        assert_eq!(HostEvent::BeforeUnload.focus_event(), None);
    }

    #[tokio::test]
    async fn events_flow_only_while_registered() {
        let (mut provider, host) = ChannelEventProvider::new();
        assert!(!host.emit(HostEvent::WindowBlur), "nothing registered yet");

        let mut reg = provider.register().unwrap();
        assert!(!reg.has_focus, "platform reading follows emitted events");
        assert!(host.emit(HostEvent::WindowFocus));
        assert_eq!(reg.events.recv().await, Some(HostEvent::WindowFocus));

        provider.unregister();
        assert!(!host.is_listening());
        assert!(!host.emit(HostEvent::WindowBlur));
        assert_eq!(reg.events.recv().await, None);
    }

    #[test]
    fn double_registration_is_refused() {
        let (mut provider, host) = ChannelEventProvider::new();
        let _reg = provider.register().unwrap();
        assert!(matches!(provider.register(), Err(TabError::Listener(_))));
        assert_eq!(host.registrations(), 1);
    }

    #[test]
    fn closures_are_openers() {
        let opener = |url: &str| {
            Some(OpenedWindow {
                url: url.to_string(),
            })
        };
        assert_eq!(opener.open("/x").unwrap().url, "/x");
        assert_eq!(NoopOpener.open("/x"), None);
    }
}
