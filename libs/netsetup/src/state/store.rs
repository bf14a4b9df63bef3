//! SQLite-based store for per-network configuration progress.
//!
//! One database per VM, living next to the VM's other runtime state so it
//! survives controller restarts.

use std::fs;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::debug;

use super::{PodIfaceState, PodIfaceStateCache};
use crate::config::{Config, InvalidVmId};

/// Errors from state store operations.
#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid state: {0}")]
    Invalid(String),

    #[error(transparent)]
    VmId(#[from] InvalidVmId),
}

/// SQLite state store.
pub struct StateStore {
    conn: Connection,
}

impl StateStore {
    /// Open or create a state store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StateStoreError> {
        let conn = Connection::open(path)?;

        // Every write must reach disk before configuration proceeds
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")?;

        let store = Self { conn };
        store.init_schema()?;

        Ok(store)
    }

    /// Open the store of a VM under the configured state directory.
    pub fn open_for_vm(config: &Config, vm_id: &str) -> Result<Self, StateStoreError> {
        let path = config.state_db_path(vm_id)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        debug!(vm_id = %vm_id, path = %path.display(), "Opening network state store");
        Self::open(path)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StateStoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<(), StateStoreError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS pod_iface_state (
                network_name TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;

        debug!("Network state store schema initialized");
        Ok(())
    }

    /// List all records, ordered by network name.
    pub fn list(&self) -> Result<Vec<(String, PodIfaceState)>, StateStoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT network_name, state FROM pod_iface_state ORDER BY network_name")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for (network, raw) in rows {
            records.push((network, parse_state(&raw)?));
        }

        Ok(records)
    }
}

fn parse_state(raw: &str) -> Result<PodIfaceState, StateStoreError> {
    PodIfaceState::parse(raw).ok_or_else(|| StateStoreError::Invalid(raw.to_string()))
}

impl PodIfaceStateCache for StateStore {
    fn read(&self, network_name: &str) -> Result<PodIfaceState, StateStoreError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT state FROM pod_iface_state WHERE network_name = ?1",
                params![network_name],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(raw) => parse_state(&raw),
            None => Ok(PodIfaceState::Pending),
        }
    }

    fn write(&self, network_name: &str, state: PodIfaceState) -> Result<(), StateStoreError> {
        let now = chrono::Utc::now().timestamp();
        self.conn.execute(
            r#"
            INSERT INTO pod_iface_state (network_name, state, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(network_name) DO UPDATE SET
                state = excluded.state,
                updated_at = excluded.updated_at
            "#,
            params![network_name, state.as_str(), now],
        )?;
        Ok(())
    }

    fn delete(&self, network_name: &str) -> Result<(), StateStoreError> {
        self.conn.execute(
            "DELETE FROM pod_iface_state WHERE network_name = ?1",
            params![network_name],
        )?;
        Ok(())
    }
}
