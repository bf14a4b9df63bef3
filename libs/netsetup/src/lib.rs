//! Crash-safe network setup for VM launchers.
//!
//! The live state of a VM's networks lives inside the network namespace of
//! its launcher process. This library plugs each network exactly once and
//! unplugs networks removed from the VM spec, persisting per-network
//! progress so a restarted controller never configures a network twice.
//!
//! ## Architecture
//!
//! ```text
//! ConfigState
//! ├── PodIfaceStateCache   (durable Pending/Started/Finished per network)
//! ├── NsExecutor           (scoped entry into the launcher namespace)
//! ├── IfaceNameClassifier  (ordinal secondary interface detection)
//! └── caller callbacks     (pre-run, discover, configure, cleanup)
//! ```
//!
//! ## Modules
//!
//! - `config_state`: The plug/unplug orchestrator
//! - `error`: Tagged error taxonomy (transient, critical, aggregate)
//! - `netns`: Network namespace executor
//! - `state`: Local SQLite state persistence

pub mod config;
pub mod config_state;
pub mod error;
pub mod naming;
pub mod netns;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use config::{Config, InvalidVmId};
pub use config_state::{ConfigState, PodIfaceNameByNetwork};
pub use error::{AggregateError, ErrorClass, NetSetupError};
pub use naming::{IfaceNameClassifier, OrdinalNameClassifier};
pub use netns::{NamespaceError, NetNsExecutor, NsExecutor};
pub use state::{PodIfaceState, PodIfaceStateCache, StateStore, StateStoreError};
pub use types::{InterfaceState, NetworkAttachment, PodNic, SpecInterface};
