//! Attachments and desired interfaces handled by the orchestrator.

use serde::{Deserialize, Serialize};

/// A network paired with the pod interface backing it.
///
/// Callers implement this for their own per-NIC type so the discovery and
/// configuration callbacks receive everything they need.
pub trait NetworkAttachment {
    /// Name of the network in the VM spec.
    fn network_name(&self) -> &str;

    /// Name of the backing interface inside the launcher pod.
    fn pod_interface_name(&self) -> &str;
}

/// Plain attachment with no extra data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodNic {
    /// Network name.
    pub network_name: String,
    /// Pod interface name.
    pub pod_interface_name: String,
}

impl PodNic {
    /// Create a new attachment.
    pub fn new(network_name: &str, pod_interface_name: &str) -> Self {
        Self {
            network_name: network_name.to_string(),
            pod_interface_name: pod_interface_name.to_string(),
        }
    }
}

impl NetworkAttachment for PodNic {
    fn network_name(&self) -> &str {
        &self.network_name
    }

    fn pod_interface_name(&self) -> &str {
        &self.pod_interface_name
    }
}

/// Desired presence of an interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceState {
    /// The interface should exist.
    #[default]
    Present,
    /// The interface should be removed.
    Absent,
}

/// An interface as declared in the VM's desired spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecInterface {
    /// Network name.
    pub name: String,
    /// Desired presence.
    #[serde(default)]
    pub state: InterfaceState,
}

impl SpecInterface {
    /// An interface that should exist.
    pub fn present(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: InterfaceState::Present,
        }
    }

    /// An interface marked for removal.
    pub fn absent(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: InterfaceState::Absent,
        }
    }

    /// Returns true if the interface is marked for removal.
    pub fn is_absent(&self) -> bool {
        self.state == InterfaceState::Absent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_interface_state_defaults_to_present() {
        let iface: SpecInterface = serde_json::from_str(r#"{"name":"blue"}"#).unwrap();

        assert_eq!(iface, SpecInterface::present("blue"));
        assert!(!iface.is_absent());
    }

    #[test]
    fn test_spec_interface_absent() {
        let iface: SpecInterface =
            serde_json::from_str(r#"{"name":"blue","state":"absent"}"#).unwrap();

        assert!(iface.is_absent());
    }
}
