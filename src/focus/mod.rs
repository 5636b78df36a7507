//! Focus accounting state machine.
//!
//! Two states, `Focused` (assumed at mount) and `Unfocused`. Window
//! focus/blur and document visibility both route through [`FocusState::lose`]
//! and [`FocusState::regain`]; platforms fire these redundantly and in
//! varying order, so a transition into the current state is a no-op.
//!
//! Durations are measured on `tokio::time::Instant`, which follows paused
//! test time. Transition timestamps are also reported on the wall clock,
//! derived from an anchor taken when the state is created.

use std::time::{Duration, SystemTime};

use tokio::time::Instant;

/// Maps monotonic instants onto the wall clock.
#[derive(Debug, Clone, Copy)]
struct WallClock {
    instant: Instant,
    system: SystemTime,
}

impl WallClock {
    fn now() -> Self {
        Self {
            instant: Instant::now(),
            system: SystemTime::now(),
        }
    }

    fn at(&self, instant: Instant) -> SystemTime {
        match instant.checked_duration_since(self.instant) {
            Some(ahead) => self.system + ahead,
            None => {
                let behind = self.instant.duration_since(instant);
                self.system.checked_sub(behind).unwrap_or(SystemTime::UNIX_EPOCH)
            }
        }
    }
}

/// Platform signal that feeds the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusEvent {
    WindowFocus,
    WindowBlur,
    VisibilityVisible,
    VisibilityHidden,
}

/// A genuine state change, reported so the caller can announce it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Lost,
    Gained,
}

/// Focus bookkeeping for one context.
#[derive(Debug, Clone)]
pub struct FocusState {
    clock: WallClock,
    focused: bool,
    lost_count: u32,
    total_loss: Duration,
    last_lost: Option<Instant>,
    last_gained: Option<Instant>,
    /// Start of the in-progress loss interval; only set while unfocused.
    loss_started: Option<Instant>,
}

impl Default for FocusState {
    fn default() -> Self {
        Self {
            clock: WallClock::now(),
            focused: true,
            lost_count: 0,
            total_loss: Duration::ZERO,
            last_lost: None,
            last_gained: None,
            loss_started: None,
        }
    }
}

impl FocusState {
    /// A focused state with nothing recorded yet.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Number of genuine focused-to-unfocused transitions.
    pub fn lost_count(&self) -> u32 {
        self.lost_count
    }

    /// Sum of completed loss intervals. An in-progress loss is not included.
    pub fn total_loss(&self) -> Duration {
        self.total_loss
    }

    /// Monotonic time of the latest loss.
    pub fn last_lost(&self) -> Option<Instant> {
        self.last_lost
    }

    /// Monotonic time of the latest regain.
    pub fn last_gained(&self) -> Option<Instant> {
        self.last_gained
    }

    /// Wall-clock time of the latest loss.
    pub fn last_lost_at(&self) -> Option<SystemTime> {
        self.last_lost.map(|t| self.clock.at(t))
    }

    /// Wall-clock time of the latest regain.
    pub fn last_gained_at(&self) -> Option<SystemTime> {
        self.last_gained.map(|t| self.clock.at(t))
    }

    /// Feed one platform signal; returns the transition it caused, if any.
    pub fn apply(&mut self, event: FocusEvent, now: Instant) -> Option<Transition> {
        match event {
            FocusEvent::WindowBlur | FocusEvent::VisibilityHidden => self.lose(now),
            FocusEvent::WindowFocus | FocusEvent::VisibilityVisible => self.regain(now),
        }
    }

    /// Enter `Unfocused`. A no-op when already unfocused.
    pub fn lose(&mut self, now: Instant) -> Option<Transition> {
        if !self.focused {
            return None;
        }
        self.focused = false;
        self.lost_count += 1;
        self.last_lost = Some(now);
        self.loss_started = Some(now);
        Some(Transition::Lost)
    }

    /// Enter `Focused`, closing the open loss interval. A no-op when
    /// already focused.
    pub fn regain(&mut self, now: Instant) -> Option<Transition> {
        if self.focused {
            return None;
        }
        self.focused = true;
        self.last_gained = Some(now);
        if let Some(started) = self.loss_started.take() {
            self.total_loss += now.saturating_duration_since(started);
        }
        Some(Transition::Gained)
    }
}
