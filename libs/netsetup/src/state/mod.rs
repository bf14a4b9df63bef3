//! Persisted per-network configuration progress.
//!
//! This module provides:
//! - [`PodIfaceState`], the progress marker of one network
//! - [`PodIfaceStateCache`], the contract the orchestrator persists through
//! - [`StateStore`], a SQLite implementation of that contract
//!
//! The store is the recovery anchor after a controller restart: a freshly
//! constructed orchestrator reads it to learn which networks were already
//! started or finished.

mod store;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use store::{StateStore, StateStoreError};

/// Progress of a network through the plug procedure.
///
/// Only ever advances `Pending -> Started -> Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PodIfaceState {
    /// Not plugged yet (also the state of a missing record).
    Pending,
    /// Configuration began; the network cannot be plugged again.
    Started,
    /// Configuration completed.
    Finished,
}

impl PodIfaceState {
    /// Stable string form used for persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Started => "started",
            Self::Finished => "finished",
        }
    }

    /// Parse the persisted string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "started" => Some(Self::Started),
            "finished" => Some(Self::Finished),
            _ => None,
        }
    }
}

impl fmt::Display for PodIfaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable per-network progress record, keyed by network name.
pub trait PodIfaceStateCache {
    /// Read the state of a network; a missing record reads as `Pending`.
    fn read(&self, network_name: &str) -> Result<PodIfaceState, StateStoreError>;

    /// Persist the state of a network.
    fn write(&self, network_name: &str, state: PodIfaceState) -> Result<(), StateStoreError>;

    /// Remove the record of a network. Removing a missing record succeeds.
    fn delete(&self, network_name: &str) -> Result<(), StateStoreError>;
}

impl<T: PodIfaceStateCache + ?Sized> PodIfaceStateCache for &T {
    fn read(&self, network_name: &str) -> Result<PodIfaceState, StateStoreError> {
        (**self).read(network_name)
    }

    fn write(&self, network_name: &str, state: PodIfaceState) -> Result<(), StateStoreError> {
        (**self).write(network_name, state)
    }

    fn delete(&self, network_name: &str) -> Result<(), StateStoreError> {
        (**self).delete(network_name)
    }
}
