// src/core/store.rs

//! Durable per-host and per-cluster state on the local filesystem (C2).
//!
//! All multi-step updates are serialized by one process-wide mutex; the
//! service is single-instance, so file locking beyond that is unnecessary.
//! Writes go through a temp-file-then-rename so a crash never leaves a
//! half-written ack or cluster file.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::warn;

use crate::core::types::{AckRecord, ClusterOp, ClusterState};

pub struct StateStore {
    base_dir: PathBuf,
    mutex: Mutex<()>,
}

impl StateStore {
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            mutex: Mutex::new(()),
        }
    }

    fn cluster_dir(&self, cluster: &str) -> PathBuf {
        self.base_dir.join(cluster)
    }

    fn ack_path(&self, cluster: &str, fqdn: &str) -> PathBuf {
        self.cluster_dir(cluster).join(format!("{fqdn}.json"))
    }

    fn cluster_state_path(&self, cluster: &str) -> PathBuf {
        self.base_dir.join(format!("{cluster}.json"))
    }

    pub fn load_ack(&self, cluster: &str, fqdn: &str) -> Option<AckRecord> {
        read_json(&self.ack_path(cluster, fqdn))
    }

    pub fn save_ack(&self, ack: &AckRecord) -> std::io::Result<()> {
        let dir = self.cluster_dir(&ack.found_cluster);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.json", ack.requesting_fqdn));
        write_json_atomic(&path, ack)
    }

    pub fn delete_ack(&self, cluster: &str, fqdn: &str) -> std::io::Result<()> {
        let path = self.ack_path(cluster, fqdn);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn load_cluster(&self, cluster: &str) -> Option<ClusterState> {
        read_json(&self.cluster_state_path(cluster))
    }

    pub fn save_cluster(&self, cluster: &str, state: &ClusterState) -> std::io::Result<()> {
        write_json_atomic(&self.cluster_state_path(cluster), state)
    }

    /// Atomic read-modify-write of a cluster's restarting-set and counter
    /// under the global mutex. `add` inserts `fqdn` and increments the
    /// counter; `remove` deletes it and decrements, floored at 0.
    ///
    /// Returns the resulting state. `remove` against a cluster with no
    /// persisted state is an invariant violation (the caller is expected to
    /// have admitted the host through `add` first) and returns `None`.
    pub fn modify_cluster(
        &self,
        cluster: &str,
        fqdn: &str,
        op: ClusterOp,
    ) -> std::io::Result<Option<ClusterState>> {
        let _guard = self.mutex.lock();
        self.modify_cluster_locked(cluster, fqdn, op)
    }

    /// The body of [`Self::modify_cluster`], for callers that already hold
    /// the global mutex (the cluster-cap check in C4 via
    /// [`Self::with_lock`]). Calling this without the mutex held is unsound.
    fn modify_cluster_locked(
        &self,
        cluster: &str,
        fqdn: &str,
        op: ClusterOp,
    ) -> std::io::Result<Option<ClusterState>> {
        let mut state = match self.load_cluster(cluster) {
            Some(state) => state,
            None => match op {
                ClusterOp::Add => ClusterState::empty(),
                ClusterOp::Remove => return Ok(None),
            },
        };

        match op {
            ClusterOp::Add => {
                state.current_restarting_servers.insert(fqdn.to_string());
                state.current_ongoing_restarts += 1;
                state.last_restart_request_timestamp = chrono::Utc::now();
            }
            ClusterOp::Remove => {
                state.current_restarting_servers.remove(fqdn);
                state.current_ongoing_restarts = state.current_ongoing_restarts.saturating_sub(1);
                state.last_successful_restart_timestamp = chrono::Utc::now();
            }
        }

        self.save_cluster(cluster, &state)?;
        Ok(Some(state))
    }

    /// Runs `f` with the global mutex held, for callers (the cluster-cap
    /// check in C4) that need to inspect then conditionally mutate state in
    /// one atomic step. `f` receives a [`LockedStore`] handle rather than
    /// `&Self`, so it can only reach the lock-safe variant of
    /// `modify_cluster` and cannot re-enter the (non-reentrant) mutex.
    pub fn with_lock<T>(&self, f: impl FnOnce(LockedStore<'_>) -> T) -> T {
        let _guard = self.mutex.lock();
        f(LockedStore { store: self })
    }
}

/// A `StateStore` accessed while the global mutex is already held. Exposes
/// the read paths plus the lock-assuming mutation, so callers can inspect
/// then conditionally mutate in one atomic step without a re-entrant lock.
pub struct LockedStore<'a> {
    store: &'a StateStore,
}

impl LockedStore<'_> {
    pub fn load_cluster(&self, cluster: &str) -> Option<ClusterState> {
        self.store.load_cluster(cluster)
    }

    pub fn modify_cluster(
        &self,
        cluster: &str,
        fqdn: &str,
        op: ClusterOp,
    ) -> std::io::Result<Option<ClusterState>> {
        self.store.modify_cluster_locked(cluster, fqdn, op)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read state file");
            return None;
        }
    };
    match serde_json::from_str(&data) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to parse state file, treating as absent");
            None
        }
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer(&mut tmp, value)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ack(cluster: &str, fqdn: &str) -> AckRecord {
        AckRecord {
            timestamp: chrono::Utc::now(),
            go_ahead: false,
            unknown_host: false,
            ask_again_in: String::new(),
            request_id: "abc12345".to_string(),
            found_cluster: cluster.to_string(),
            requesting_fqdn: fqdn.to_string(),
            message: String::new(),
            reported_uptime: "1h".to_string(),
        }
    }

    #[tokio::test]
    async fn round_trips_ack_record() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().to_path_buf());
        let record = ack("foobar-server", "host-a.domain.tld");
        store.save_ack(&record).unwrap();
        let loaded = store.load_ack("foobar-server", "host-a.domain.tld").unwrap();
        assert_eq!(loaded.request_id, "abc12345");
    }

    #[tokio::test]
    async fn modify_cluster_add_then_remove_restores_zero() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().to_path_buf());
        let state = store
            .modify_cluster("foobar-server", "host-a.domain.tld", ClusterOp::Add)
            .unwrap()
            .unwrap();
        assert_eq!(state.current_ongoing_restarts, 1);
        assert!(state.current_restarting_servers.contains("host-a.domain.tld"));

        let state = store
            .modify_cluster("foobar-server", "host-a.domain.tld", ClusterOp::Remove)
            .unwrap()
            .unwrap();
        assert_eq!(state.current_ongoing_restarts, 0);
        assert!(state.current_restarting_servers.is_empty());
    }

    #[tokio::test]
    async fn remove_on_missing_cluster_state_is_none() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().to_path_buf());
        let result = store
            .modify_cluster("ghost-cluster", "host-a.domain.tld", ClusterOp::Remove)
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn cluster_state_round_trips_structurally_equal() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().to_path_buf());
        let mut state = ClusterState::empty();
        state.current_ongoing_restarts = 2;
        state.current_restarting_servers.insert("a".to_string());
        state.current_restarting_servers.insert("b".to_string());
        store.save_cluster("foobar-server", &state).unwrap();
        let loaded = store.load_cluster("foobar-server").unwrap();
        assert_eq!(loaded.current_ongoing_restarts, state.current_ongoing_restarts);
        assert_eq!(
            loaded.current_restarting_servers,
            state.current_restarting_servers
        );
    }
}
