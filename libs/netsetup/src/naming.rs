//! Classification of pod interface names.

use vmnet_namescheme::is_ordinal_secondary_interface_name;

/// Decides whether a bound pod interface name uses the ordinal convention.
///
/// Networks bound to ordinal names are removed by a separate path and are
/// never unplugged by the orchestrator.
pub trait IfaceNameClassifier {
    fn is_ordinal_secondary(&self, pod_interface_name: &str) -> bool;
}

/// Classifier following the `net<N>` naming convention.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrdinalNameClassifier;

impl IfaceNameClassifier for OrdinalNameClassifier {
    fn is_ordinal_secondary(&self, pod_interface_name: &str) -> bool {
        is_ordinal_secondary_interface_name(pod_interface_name)
    }
}
