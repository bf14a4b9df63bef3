//! Error taxonomy for network setup.
//!
//! Every error carries an explicit [`ErrorClass`]; callers branch on
//! [`NetSetupError::class`] and never on the wrapped cause.

use std::fmt;

use thiserror::Error;

use crate::netns::NamespaceError;
use crate::state::StateStoreError;

/// Boxed cause kept inside critical and aggregated errors.
pub type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// How the caller should treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Nothing was durably started; re-running is safe.
    Transient,

    /// A network is poisoned and must not be retried automatically.
    Critical,

    /// Independent per-network unplug failures.
    Aggregate,
}

/// Network setup errors.
#[derive(Debug, Error)]
pub enum NetSetupError {
    /// A strategy callback failed before anything was marked started.
    #[error(transparent)]
    Callback(#[from] anyhow::Error),

    /// The persisted state store failed before anything was marked started.
    #[error(transparent)]
    Store(#[from] StateStoreError),

    /// Entering or leaving the target namespace failed.
    #[error(transparent)]
    Namespace(#[from] NamespaceError),

    /// Writing the started marker failed partway through a batch.
    ///
    /// Earlier networks of the batch may already be durably started.
    #[error("failed to mark configuration as started for {network}: {source}")]
    MarkStarted {
        network: String,
        #[source]
        source: StateStoreError,
    },

    /// A network was found started by an earlier attempt.
    #[error("network {network} preparation cannot be restarted")]
    RestartRejected { network: String },

    /// Configuring a network failed after it was marked started.
    #[error("failed to configure pod network {network}: {source}")]
    Configure {
        network: String,
        #[source]
        source: BoxedCause,
    },

    /// Writing the finished marker failed.
    #[error("failed to mark configuration as finished for {network}: {source}")]
    MarkFinished {
        network: String,
        #[source]
        source: StateStoreError,
    },

    /// Cleaning up an unplugged network failed.
    #[error("failed to clean up network {network}: {source}")]
    Cleanup {
        network: String,
        #[source]
        source: BoxedCause,
    },

    /// Removing the persisted state of a cleaned up network failed.
    #[error("failed to delete state of network {network}: {source}")]
    DeleteState {
        network: String,
        #[source]
        source: StateStoreError,
    },

    /// One or more unplug failures.
    #[error("{0}")]
    Aggregate(AggregateError),
}

impl NetSetupError {
    /// Classification of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::RestartRejected { .. } | Self::Configure { .. } | Self::MarkFinished { .. } => {
                ErrorClass::Critical
            }
            Self::Aggregate(_) => ErrorClass::Aggregate,
            Self::Callback(_)
            | Self::Store(_)
            | Self::Namespace(_)
            | Self::MarkStarted { .. }
            | Self::Cleanup { .. }
            | Self::DeleteState { .. } => ErrorClass::Transient,
        }
    }

    /// Returns true if the error must not be retried automatically.
    pub fn is_critical(&self) -> bool {
        self.class() == ErrorClass::Critical
    }

    /// Stable reason code for logs and status reporting.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Callback(_) => "callback_failed",
            Self::Store(_) => "state_store_failed",
            Self::Namespace(_) => "namespace_failed",
            Self::MarkStarted { .. } => "mark_started_failed",
            Self::RestartRejected { .. } => "restart_rejected",
            Self::Configure { .. } => "configure_failed",
            Self::MarkFinished { .. } => "mark_finished_failed",
            Self::Cleanup { .. } => "cleanup_failed",
            Self::DeleteState { .. } => "delete_state_failed",
            Self::Aggregate(_) => "unplug_failed",
        }
    }
}

/// A list of independent failures.
#[derive(Debug)]
pub struct AggregateError {
    errors: Vec<NetSetupError>,
}

impl AggregateError {
    /// Bundle `errors`, or `None` when there is nothing to report.
    pub fn from_errors(errors: Vec<NetSetupError>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self { errors })
        }
    }

    /// The bundled errors, in the order they occurred.
    pub fn errors(&self) -> &[NetSetupError] {
        &self.errors
    }

    /// Number of bundled errors.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Always false; an aggregate is never built empty.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [only] = self.errors.as_slice() {
            return write!(f, "{}", only);
        }

        write!(f, "[")?;
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", err)?;
        }
        write!(f, "]")
    }
}

impl std::error::Error for AggregateError {}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn cleanup_err(network: &str) -> NetSetupError {
        NetSetupError::Cleanup {
            network: network.to_string(),
            source: anyhow::anyhow!("device busy").into(),
        }
    }

    #[rstest]
    #[case(NetSetupError::RestartRejected { network: "blue".into() }, ErrorClass::Critical)]
    #[case(
        NetSetupError::Configure { network: "blue".into(), source: anyhow::anyhow!("x").into() },
        ErrorClass::Critical
    )]
    #[case(
        NetSetupError::MarkFinished {
            network: "blue".into(),
            source: StateStoreError::Invalid("x".into()),
        },
        ErrorClass::Critical
    )]
    #[case(
        NetSetupError::MarkStarted {
            network: "blue".into(),
            source: StateStoreError::Invalid("x".into()),
        },
        ErrorClass::Transient
    )]
    #[case(NetSetupError::Callback(anyhow::anyhow!("discover")), ErrorClass::Transient)]
    #[case(NetSetupError::Store(StateStoreError::Invalid("x".into())), ErrorClass::Transient)]
    fn test_error_class(#[case] err: NetSetupError, #[case] class: ErrorClass) {
        assert_eq!(err.class(), class);
        assert_eq!(err.is_critical(), class == ErrorClass::Critical);
    }

    #[test]
    fn test_aggregate_empty_is_none() {
        assert!(AggregateError::from_errors(Vec::new()).is_none());
    }

    #[test]
    fn test_aggregate_display_single() {
        let agg = AggregateError::from_errors(vec![cleanup_err("blue")]).unwrap();

        assert_eq!(agg.to_string(), "failed to clean up network blue: device busy");
    }

    #[test]
    fn test_aggregate_display_many() {
        let agg =
            AggregateError::from_errors(vec![cleanup_err("blue"), cleanup_err("red")]).unwrap();
        let err = NetSetupError::Aggregate(agg);

        assert_eq!(err.class(), ErrorClass::Aggregate);
        assert_eq!(
            err.to_string(),
            "[failed to clean up network blue: device busy, failed to clean up network red: device busy]"
        );
    }

    #[test]
    fn test_callback_error_is_unmodified() {
        let err = NetSetupError::from(anyhow::anyhow!("link eth0 not found"));

        assert_eq!(err.to_string(), "link eth0 not found");
        assert_eq!(err.reason_code(), "callback_failed");
    }
}
