//! One-time plug and best-effort unplug of VM networks.
//!
//! [`ConfigState`] guarantees that the configuration step of a network runs
//! at most once, even across controller restarts:
//!
//! ```text
//! Pending ──discover all──> Started ──configure all──> Finished
//!    ^                                                    │
//!    └──────────────── unplug (cleanup + delete) ─────────┘
//! ```
//!
//! Discovery may be repeated freely. Once `Started` is durably recorded a
//! network can never be plugged again; any failure past that point is
//! critical.

use std::collections::HashMap;

use tracing::{debug, error, info, warn};

use crate::error::{AggregateError, NetSetupError};
use crate::naming::{IfaceNameClassifier, OrdinalNameClassifier};
use crate::netns::NsExecutor;
use crate::state::{PodIfaceState, PodIfaceStateCache};
use crate::types::{NetworkAttachment, SpecInterface};

/// Network name to pod interface name.
pub type PodIfaceNameByNetwork = HashMap<String, String>;

/// Orchestrates plug and unplug of the networks of one VM.
///
/// Calls on one instance must be serialized by the caller.
pub struct ConfigState<S, N, C = OrdinalNameClassifier> {
    cache: S,
    ns: N,
    classifier: C,
    launcher_pid: i32,
    /// `None` until seeded, recorded by a plug, or discovered by an unplug.
    pod_iface_name_by_network: Option<PodIfaceNameByNetwork>,
}

impl<S, N> ConfigState<S, N>
where
    S: PodIfaceStateCache,
    N: NsExecutor,
{
    /// Create an orchestrator with no known bindings.
    pub fn new(cache: S, ns: N, launcher_pid: i32) -> Self {
        Self {
            cache,
            ns,
            classifier: OrdinalNameClassifier,
            launcher_pid,
            pod_iface_name_by_network: None,
        }
    }

    /// Create an orchestrator seeded with already known bindings.
    pub fn with_pod_iface_map(
        cache: S,
        ns: N,
        launcher_pid: i32,
        pod_iface_name_by_network: PodIfaceNameByNetwork,
    ) -> Self {
        Self {
            pod_iface_name_by_network: Some(pod_iface_name_by_network),
            ..Self::new(cache, ns, launcher_pid)
        }
    }
}

impl<S, N, C> ConfigState<S, N, C>
where
    S: PodIfaceStateCache,
    N: NsExecutor,
    C: IfaceNameClassifier,
{
    /// Replace the interface name classifier.
    pub fn with_classifier<C2>(self, classifier: C2) -> ConfigState<S, N, C2>
    where
        C2: IfaceNameClassifier,
    {
        ConfigState {
            cache: self.cache,
            ns: self.ns,
            classifier,
            launcher_pid: self.launcher_pid,
            pod_iface_name_by_network: self.pod_iface_name_by_network,
        }
    }

    /// The persisted state store.
    pub fn cache(&self) -> &S {
        &self.cache
    }

    /// Pod interface bound to a network, if known.
    pub fn pod_iface_name(&self, network_name: &str) -> Option<&str> {
        self.pod_iface_name_by_network
            .as_ref()?
            .get(network_name)
            .map(String::as_str)
    }

    /// Plug the pending networks among `nics`.
    ///
    /// - `pre_run` may filter, reorder or replace the pending attachments;
    ///   its output is authoritative for the rest of the call.
    /// - `discover` captures the current pod network status of each
    ///   attachment and may run any number of times.
    /// - `configure` mutates the pod network and runs at most once per
    ///   network, ever.
    ///
    /// Finished networks are skipped. A network already started by an
    /// earlier attempt fails the whole call with a critical error before any
    /// callback runs.
    pub fn run<T, P, D, F>(
        &mut self,
        nics: Vec<T>,
        pre_run: P,
        discover: D,
        configure: F,
    ) -> Result<(), NetSetupError>
    where
        T: NetworkAttachment,
        P: FnOnce(Vec<T>) -> anyhow::Result<Vec<T>>,
        D: FnMut(&mut T) -> anyhow::Result<()>,
        F: FnMut(&mut T) -> anyhow::Result<()>,
    {
        let mut pending = Vec::with_capacity(nics.len());
        for nic in nics {
            match self.cache.read(nic.network_name())? {
                PodIfaceState::Pending => pending.push(nic),
                PodIfaceState::Started => {
                    return Err(NetSetupError::RestartRejected {
                        network: nic.network_name().to_string(),
                    });
                }
                PodIfaceState::Finished => {
                    debug!(network = %nic.network_name(), "Network already configured, skipping");
                }
            }
        }

        if pending.is_empty() {
            return Ok(());
        }

        let cache = &self.cache;
        let bindings = &mut self.pod_iface_name_by_network;
        self.ns.run(move || {
            let nics = pre_run(pending)?;

            let bindings = bindings.get_or_insert_with(HashMap::new);
            for nic in &nics {
                bindings
                    .entry(nic.network_name().to_string())
                    .or_insert_with(|| nic.pod_interface_name().to_string());
            }

            plug(cache, nics, discover, configure)
        })
    }

    /// Clean up the networks marked absent in `spec_interfaces`.
    ///
    /// Bindings are discovered once per instance with `discover_bindings`
    /// when none are known. Networks bound to ordinal secondary interfaces
    /// and networks never plugged are left alone. Every candidate is
    /// attempted; failures are returned together as an aggregate and leave
    /// the network's record in place so the next call retries it.
    pub fn unplug_networks<D, F>(
        &mut self,
        spec_interfaces: &[SpecInterface],
        discover_bindings: D,
        mut cleanup: F,
    ) -> Result<(), NetSetupError>
    where
        D: FnOnce() -> anyhow::Result<PodIfaceNameByNetwork>,
        F: FnMut(&str, i32) -> anyhow::Result<()>,
    {
        if self.pod_iface_name_by_network.is_none() {
            let bindings = &mut self.pod_iface_name_by_network;
            self.ns.run(|| {
                let discovered = discover_bindings()?;
                debug!(count = discovered.len(), "Discovered pod interface bindings");
                *bindings = Some(discovered);
                Ok(())
            })?;
        }

        let networks = self.networks_to_unplug(spec_interfaces)?;
        if networks.is_empty() {
            return Ok(());
        }

        let cache = &self.cache;
        let launcher_pid = self.launcher_pid;
        self.ns.run(|| {
            let mut errors = Vec::new();

            for network in &networks {
                if let Err(e) = cleanup(network.as_str(), launcher_pid) {
                    warn!(network = %network, error = %e, "Failed to clean up network");
                    errors.push(NetSetupError::Cleanup {
                        network: network.clone(),
                        source: e.into(),
                    });
                } else if let Err(e) = cache.delete(network) {
                    warn!(network = %network, error = %e, "Failed to delete network state");
                    errors.push(NetSetupError::DeleteState {
                        network: network.clone(),
                        source: e,
                    });
                } else {
                    info!(network = %network, "Network unplugged");
                }
            }

            match AggregateError::from_errors(errors) {
                Some(aggregate) => Err(NetSetupError::Aggregate(aggregate)),
                None => Ok(()),
            }
        })
    }

    fn networks_to_unplug(
        &self,
        spec_interfaces: &[SpecInterface],
    ) -> Result<Vec<String>, NetSetupError> {
        let mut networks = Vec::new();

        for iface in spec_interfaces.iter().filter(|iface| iface.is_absent()) {
            if let Some(pod_iface) = self.pod_iface_name(&iface.name) {
                if self.classifier.is_ordinal_secondary(pod_iface) {
                    debug!(
                        network = %iface.name,
                        pod_iface = %pod_iface,
                        "Ordinal secondary interface, left to hot-unplug"
                    );
                    continue;
                }
            }

            if self.cache.read(&iface.name)? == PodIfaceState::Pending {
                debug!(network = %iface.name, "Network never plugged, nothing to unplug");
                continue;
            }

            networks.push(iface.name.clone());
        }

        Ok(networks)
    }
}

/// Discover every attachment, mark all started, configure every attachment,
/// mark all finished.
fn plug<S, T, D, F>(
    cache: &S,
    mut nics: Vec<T>,
    mut discover: D,
    mut configure: F,
) -> Result<(), NetSetupError>
where
    S: PodIfaceStateCache,
    T: NetworkAttachment,
    D: FnMut(&mut T) -> anyhow::Result<()>,
    F: FnMut(&mut T) -> anyhow::Result<()>,
{
    // Discovery records the pod network before configuration mutates it,
    // so it must finish for the whole batch first.
    for nic in nics.iter_mut() {
        discover(nic)?;
    }

    for nic in &nics {
        cache
            .write(nic.network_name(), PodIfaceState::Started)
            .map_err(|source| NetSetupError::MarkStarted {
                network: nic.network_name().to_string(),
                source,
            })?;
    }

    for nic in nics.iter_mut() {
        if let Err(e) = configure(nic) {
            error!(network = %nic.network_name(), error = %e, "Failed to configure pod network");
            return Err(NetSetupError::Configure {
                network: nic.network_name().to_string(),
                source: e.into(),
            });
        }
    }

    for nic in &nics {
        cache
            .write(nic.network_name(), PodIfaceState::Finished)
            .map_err(|source| NetSetupError::MarkFinished {
                network: nic.network_name().to_string(),
                source,
            })?;
    }

    info!(count = nics.len(), "Pod networks configured");
    Ok(())
}
