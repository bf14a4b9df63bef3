//! Running work inside the launcher's network namespace.
//!
//! The live state of a VM's networks lives in the network namespace of its
//! launcher process. [`NetNsExecutor`] switches the calling thread into that
//! namespace for the duration of one unit of work and always switches back,
//! including when the work fails or panics.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use nix::sched::{setns, CloneFlags};
use thiserror::Error;
use tracing::{debug, error};

use crate::error::NetSetupError;

/// Network namespace of the calling thread.
const CURRENT_THREAD_NETNS: &str = "/proc/thread-self/ns/net";

/// Errors from namespace switching.
#[derive(Debug, Error)]
pub enum NamespaceError {
    #[error("failed to open namespace {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to enter network namespace of pid {pid}: {source}")]
    Enter {
        pid: i32,
        #[source]
        source: nix::Error,
    },

    #[error("failed to restore original network namespace: {0}")]
    Restore(#[source] nix::Error),
}

/// Switches the calling thread into the namespace behind a file.
type SwitchNamespace = fn(&File) -> nix::Result<()>;

fn enter_netns(ns: &File) -> nix::Result<()> {
    setns(ns, CloneFlags::CLONE_NEWNET)
}

/// Runs a unit of work with a target namespace active.
pub trait NsExecutor {
    /// Activate the namespace, run `work`, restore the previous namespace.
    ///
    /// Returns the error of `work` if it failed, otherwise any error from
    /// activating or restoring the namespace.
    fn run<F>(&self, work: F) -> Result<(), NetSetupError>
    where
        F: FnOnce() -> Result<(), NetSetupError>;
}

impl<T: NsExecutor> NsExecutor for &T {
    fn run<F>(&self, work: F) -> Result<(), NetSetupError>
    where
        F: FnOnce() -> Result<(), NetSetupError>,
    {
        (**self).run(work)
    }
}

/// Executor entering the network namespace of a process.
#[derive(Debug, Clone)]
pub struct NetNsExecutor {
    pid: i32,
    switch: SwitchNamespace,
}

impl NetNsExecutor {
    /// Create an executor for the namespace of `pid`.
    pub fn new(pid: i32) -> Self {
        Self {
            pid,
            switch: enter_netns,
        }
    }

    /// Process whose namespace is entered.
    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// Path of the target namespace.
    pub fn target_path(&self) -> PathBuf {
        PathBuf::from(format!("/proc/{}/ns/net", self.pid))
    }
}

impl NsExecutor for NetNsExecutor {
    fn run<F>(&self, work: F) -> Result<(), NetSetupError>
    where
        F: FnOnce() -> Result<(), NetSetupError>,
    {
        let original = open_namespace(Path::new(CURRENT_THREAD_NETNS))?;
        let target = open_namespace(&self.target_path())?;

        let guard = NetNsGuard::enter(original, &target, self.pid, self.switch)?;
        debug!(pid = self.pid, "Entered launcher network namespace");

        let result = work();

        match (result, guard.restore()) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(e), Ok(())) => Err(e),
            (Ok(()), Err(restore_err)) => {
                error!(
                    pid = self.pid,
                    error = %restore_err,
                    "Failed to leave launcher network namespace"
                );
                Err(restore_err.into())
            }
            (Err(e), Err(restore_err)) => {
                error!(
                    pid = self.pid,
                    error = %restore_err,
                    "Failed to leave launcher network namespace"
                );
                Err(e)
            }
        }
    }
}

fn open_namespace(path: &Path) -> Result<File, NamespaceError> {
    File::open(path).map_err(|source| NamespaceError::Open {
        path: path.to_path_buf(),
        source,
    })
}

/// Holds the namespace to return to while a target namespace is active.
///
/// Dropping the guard without [`NetNsGuard::restore`] (e.g. on unwind)
/// still switches back.
struct NetNsGuard {
    original: Option<File>,
    switch: SwitchNamespace,
}

impl NetNsGuard {
    fn enter(
        original: File,
        target: &File,
        pid: i32,
        switch: SwitchNamespace,
    ) -> Result<Self, NamespaceError> {
        switch(target).map_err(|source| NamespaceError::Enter { pid, source })?;

        Ok(Self {
            original: Some(original),
            switch,
        })
    }

    fn restore(mut self) -> Result<(), NamespaceError> {
        match self.original.take() {
            Some(original) => (self.switch)(&original).map_err(NamespaceError::Restore),
            None => Ok(()),
        }
    }
}

impl Drop for NetNsGuard {
    fn drop(&mut self) {
        if let Some(original) = self.original.take() {
            if let Err(e) = (self.switch)(&original) {
                error!(error = %e, "Failed to restore network namespace on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::panic::{self, AssertUnwindSafe};

    use nix::errno::Errno;

    use crate::error::ErrorClass;

    thread_local! {
        static SWITCHES: Cell<u32> = const { Cell::new(0) };
    }

    /// Counts namespace switches made by the current thread.
    fn record_switch() -> u32 {
        SWITCHES.with(|switches| {
            switches.set(switches.get() + 1);
            switches.get()
        })
    }

    fn switches() -> u32 {
        SWITCHES.with(Cell::get)
    }

    fn switch_ok(_: &File) -> nix::Result<()> {
        record_switch();
        Ok(())
    }

    fn enter_fails(_: &File) -> nix::Result<()> {
        record_switch();
        Err(Errno::EPERM)
    }

    fn restore_fails(_: &File) -> nix::Result<()> {
        match record_switch() {
            1 => Ok(()),
            _ => Err(Errno::EINVAL),
        }
    }

    /// Executor targeting our own namespace with a recorded switch.
    fn executor(switch: SwitchNamespace) -> NetNsExecutor {
        SWITCHES.with(|switches| switches.set(0));
        NetNsExecutor {
            pid: std::process::id() as i32,
            switch,
        }
    }

    fn configure_failed() -> NetSetupError {
        NetSetupError::Configure {
            network: "blue".to_string(),
            source: "failed to attach tap to bridge".into(),
        }
    }

    #[test]
    fn test_target_path() {
        let executor = NetNsExecutor::new(4242);

        assert_eq!(executor.pid(), 4242);
        assert_eq!(executor.target_path(), PathBuf::from("/proc/4242/ns/net"));
    }

    #[test]
    fn test_missing_process_fails_before_work() {
        let executor = NetNsExecutor::new(i32::MAX);
        let mut ran = false;

        let err = executor
            .run(|| {
                ran = true;
                Ok(())
            })
            .unwrap_err();

        assert!(!ran);
        assert!(matches!(
            err,
            NetSetupError::Namespace(NamespaceError::Open { .. })
        ));
        assert!(!err.is_critical());
    }

    #[test]
    fn test_work_runs_between_enter_and_restore() {
        let mut seen = 0;

        executor(switch_ok)
            .run(|| {
                seen = switches();
                Ok(())
            })
            .unwrap();

        assert_eq!(seen, 1);
        assert_eq!(switches(), 2);
    }

    #[test]
    fn test_work_error_returned_after_restore() {
        let err = executor(switch_ok)
            .run(|| Err(configure_failed()))
            .unwrap_err();

        assert_eq!(switches(), 2);
        assert!(matches!(err, NetSetupError::Configure { .. }));
        assert!(err.is_critical());
    }

    #[test]
    fn test_restore_failure_is_transient() {
        let err = executor(restore_fails).run(|| Ok(())).unwrap_err();

        assert_eq!(switches(), 2);
        assert!(matches!(
            err,
            NetSetupError::Namespace(NamespaceError::Restore(Errno::EINVAL))
        ));
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[test]
    fn test_work_error_wins_over_restore_failure() {
        let err = executor(restore_fails)
            .run(|| Err(configure_failed()))
            .unwrap_err();

        assert_eq!(switches(), 2);
        assert!(matches!(err, NetSetupError::Configure { .. }));
        assert_eq!(err.class(), ErrorClass::Critical);
    }

    #[test]
    fn test_enter_failure_skips_work() {
        let mut ran = false;

        let err = executor(enter_fails)
            .run(|| {
                ran = true;
                Ok(())
            })
            .unwrap_err();

        assert!(!ran);
        assert_eq!(switches(), 1);
        assert!(matches!(
            err,
            NetSetupError::Namespace(NamespaceError::Enter { .. })
        ));
    }

    #[test]
    fn test_panicking_work_still_restores() {
        let executor = executor(switch_ok);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            executor.run(|| -> Result<(), NetSetupError> { panic!("configure panicked") })
        }));

        assert!(outcome.is_err());
        assert_eq!(switches(), 2);
    }
}
