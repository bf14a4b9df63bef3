//! Pod interface naming schemes.
//!
//! Every network attached to a VM is backed by an interface inside the
//! launcher pod. This library decides those names:
//! - The primary network always uses `eth0`
//! - Secondary networks use a hashed name (`pod<11 hex chars>`)
//! - Older pods use ordinal secondary names (`net1`, `net2`, ...)
//!
//! Ordinal names are removed by a separate hot-unplug path, so callers need
//! to recognise them from the name alone.

use std::collections::{BTreeMap, HashSet};

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Naming scheme errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameSchemeError {
    /// The same network name was declared twice.
    #[error("duplicate network name: {0}")]
    DuplicateNetwork(String),

    /// More than one network claims the primary interface.
    #[error("multiple primary networks: {first} and {second}")]
    MultiplePrimary { first: String, second: String },
}

/// Name of the primary pod interface.
pub const PRIMARY_POD_INTERFACE_NAME: &str = "eth0";

/// Prefix of ordinal secondary interface names.
const ORDINAL_PREFIX: &str = "net";

/// Prefix of hashed secondary interface names.
const HASHED_PREFIX: &str = "pod";

/// Number of hex characters of the network hash kept in the name.
///
/// `pod` + 11 characters stays below IFNAMSIZ (15).
const HASHED_SUFFIX_LEN: usize = 11;

// ============================================================================
// Interface names
// ============================================================================

/// Ordinal secondary interface name for a 1-based position.
pub fn ordinal_secondary_interface_name(index: usize) -> String {
    format!("{}{}", ORDINAL_PREFIX, index)
}

/// Returns true if `name` follows the ordinal secondary convention.
///
/// The name must be `net` followed by an integer: `net1` and `net12`
/// qualify, `net`, `netA` and `eth0` do not.
pub fn is_ordinal_secondary_interface_name(name: &str) -> bool {
    name.strip_prefix(ORDINAL_PREFIX)
        .map(|suffix| suffix.parse::<i64>().is_ok())
        .unwrap_or(false)
}

/// Hashed pod interface name for a network.
pub fn hashed_interface_name(network_name: &str) -> String {
    let digest = Sha256::digest(network_name.as_bytes());
    let encoded = hex::encode(digest);
    format!("{}{}", HASHED_PREFIX, &encoded[..HASHED_SUFFIX_LEN])
}

// ============================================================================
// Networks and schemes
// ============================================================================

/// Where a VM network comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkSource {
    /// The pod's own network.
    Pod,

    /// A Multus network attachment.
    Multus {
        /// Whether this attachment replaces the pod network.
        default: bool,
    },
}

/// A network declared in the VM spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmNetwork {
    /// Network name, unique within the VM.
    pub name: String,

    /// Network source.
    pub source: NetworkSource,
}

impl VmNetwork {
    /// Create a pod network.
    pub fn pod(name: &str) -> Self {
        Self {
            name: name.to_string(),
            source: NetworkSource::Pod,
        }
    }

    /// Create a Multus network.
    pub fn multus(name: &str, default: bool) -> Self {
        Self {
            name: name.to_string(),
            source: NetworkSource::Multus { default },
        }
    }

    /// Returns true if this network is bound to the primary pod interface.
    pub fn is_primary(&self) -> bool {
        matches!(
            self.source,
            NetworkSource::Pod | NetworkSource::Multus { default: true }
        )
    }
}

/// Mapping of network name to pod interface name.
pub type NameScheme = BTreeMap<String, String>;

/// Build a scheme where secondaries use hashed names.
pub fn hashed_name_scheme(networks: &[VmNetwork]) -> Result<NameScheme, NameSchemeError> {
    build_scheme(networks, |network, _| hashed_interface_name(&network.name))
}

/// Build a scheme where secondaries use `net1..netN` in declaration order.
pub fn ordinal_name_scheme(networks: &[VmNetwork]) -> Result<NameScheme, NameSchemeError> {
    build_scheme(networks, |_, position| {
        ordinal_secondary_interface_name(position)
    })
}

/// Build the scheme that matches interfaces already present in the pod.
///
/// Pods created with ordinal names keep them for their whole lifetime, so
/// the ordinal scheme is chosen as soon as one ordinal name is observed.
pub fn name_scheme_from_pod_interfaces<S: AsRef<str>>(
    networks: &[VmNetwork],
    pod_interface_names: &[S],
) -> Result<NameScheme, NameSchemeError> {
    let ordinal = pod_interface_names
        .iter()
        .any(|name| is_ordinal_secondary_interface_name(name.as_ref()));

    if ordinal {
        ordinal_name_scheme(networks)
    } else {
        hashed_name_scheme(networks)
    }
}

/// Assign names; `secondary_name` receives the 1-based secondary position.
fn build_scheme<F>(
    networks: &[VmNetwork],
    secondary_name: F,
) -> Result<NameScheme, NameSchemeError>
where
    F: Fn(&VmNetwork, usize) -> String,
{
    let mut scheme = NameScheme::new();
    let mut seen = HashSet::new();
    let mut primary: Option<&str> = None;
    let mut position = 0;

    for network in networks {
        if !seen.insert(network.name.as_str()) {
            return Err(NameSchemeError::DuplicateNetwork(network.name.clone()));
        }

        let name = if network.is_primary() {
            if let Some(first) = primary {
                return Err(NameSchemeError::MultiplePrimary {
                    first: first.to_string(),
                    second: network.name.clone(),
                });
            }
            primary = Some(&network.name);
            PRIMARY_POD_INTERFACE_NAME.to_string()
        } else {
            position += 1;
            secondary_name(network, position)
        };

        scheme.insert(network.name.clone(), name);
    }

    Ok(scheme)
}
