//! tabsense: serverless detection of co-open application contexts.
//!
//! Each mounted context ("tab") runs a small actor that discovers its peers
//! over a broadcast bus with a ping/pong presence protocol, accounts for the
//! time it spends out of focus, and publishes a [`Snapshot`] of both on every
//! change.

pub mod bus;
pub mod config;
pub mod device;
pub mod discovery;
pub mod focus;
pub mod host;
pub mod peer;
pub mod snapshot;
pub mod spawn;
pub mod tab;

pub use config::TabConfig;
pub use peer::PeerId;
pub use snapshot::Snapshot;
pub use tab::{Platform, TabError, TabHandle, mount};
