//! Per-context configuration.
//!
//! Every tab of the same application must agree on `channel` and
//! `visited_key`; the timings only shape local behavior.

use std::time::Duration;

/// Broadcast channel shared by every tab of the application.
pub const DEFAULT_CHANNEL: &str = "interview-check";

/// Session-store key recording that this context has been seen before.
pub const DEFAULT_VISITED_KEY: &str = "app_visited";

/// How long initial ping/pong replies are collected before the first
/// snapshot is frozen.
pub const DEFAULT_DISCOVERY_WINDOW: Duration = Duration::from_millis(500);

/// Delay between a successful spawn and the opener's `new_tab` broadcast.
pub const DEFAULT_SPAWN_ANNOUNCE_DELAY: Duration = Duration::from_millis(100);

/// Settings for one mounted context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabConfig {
    /// Bus channel name; contexts only see peers on the same channel.
    pub channel: String,
    /// Session-store key of the "seen before" flag.
    pub visited_key: String,
    /// Time from mount until the first snapshot is frozen.
    pub discovery_window: Duration,
    /// Delay before a spawn is announced on the bus.
    pub spawn_announce_delay: Duration,
}

impl Default for TabConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_string(),
            visited_key: DEFAULT_VISITED_KEY.to_string(),
            discovery_window: DEFAULT_DISCOVERY_WINDOW,
            spawn_announce_delay: DEFAULT_SPAWN_ANNOUNCE_DELAY,
        }
    }
}

impl TabConfig {
    /// Override the bus channel name.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Override the session flag key.
    pub fn with_visited_key(mut self, key: impl Into<String>) -> Self {
        self.visited_key = key.into();
        self
    }

    /// Override the discovery window.
    pub fn with_discovery_window(mut self, window: Duration) -> Self {
        self.discovery_window = window;
        self
    }

    /// Override the spawn announcement delay.
    pub fn with_spawn_announce_delay(mut self, delay: Duration) -> Self {
        self.spawn_announce_delay = delay;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_shipped_protocol() {
        let config = TabConfig::default();
        assert_eq!(config.channel, "interview-check");
        assert_eq!(config.visited_key, "app_visited");
        assert_eq!(config.discovery_window, Duration::from_millis(500));
        assert_eq!(config.spawn_announce_delay, Duration::from_millis(100));
    }

    #[test]
    fn setters_override_fields() {
        let config = TabConfig::default()
            .with_channel("other")
            .with_visited_key("seen")
            .with_discovery_window(Duration::from_millis(50));
        assert_eq!(config.channel, "other");
        assert_eq!(config.visited_key, "seen");
        assert_eq!(config.discovery_window, Duration::from_millis(50));
        assert_eq!(config.spawn_announce_delay, DEFAULT_SPAWN_ANNOUNCE_DELAY);
    }
}
