// tests/recovery.rs

//! Covers startup recovery (C7): a cluster state file left behind by a
//! previous process run is turned back into a running completion watcher,
//! without double-counting the cluster's ongoing-restarts counter.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use goahead::core::context::EngineContext;
use goahead::core::recovery::recover_sleeping_watchers;
use goahead::core::registry::ClusterRegistry;
use goahead::core::store::StateStore;
use goahead::core::types::{ClusterSetting, ClusterState, Response};
use tempfile::TempDir;

fn setting() -> ClusterSetting {
    ClusterSetting {
        enabled: true,
        name_pattern: "^recovered-.*".to_string(),
        blacklist_name_pattern: vec![],
        allowed_parallel_restarts: 3,
        minimum_uptime: Duration::from_secs(0),
        reboot_completion_check: "/bin/true".to_string(),
        reboot_completion_check_interval: Duration::from_millis(5),
        reboot_completion_check_offset: Duration::from_millis(5),
        reboot_completion_check_consecutive_successes: 1,
        reboot_completion_actions: vec![],
        reboot_goahead_actions: vec![],
        reboot_goahead_checks: vec![],
        reboot_goahead_checks_exit_code_for_reboot: 0,
    }
}

#[tokio::test]
async fn recovers_a_sleeping_watcher_without_touching_the_counter() {
    let dir = TempDir::new().unwrap();
    let fqdn = "recovered-host-01.domain.tld";

    let mut clusters = HashMap::new();
    clusters.insert("recovered-cluster".to_string(), setting());
    let registry = ClusterRegistry::new(clusters);
    let store = StateStore::new(dir.path().to_path_buf());

    let mut restarting = HashSet::new();
    restarting.insert(fqdn.to_string());
    let persisted_state = ClusterState {
        last_restart_request_timestamp: Utc::now(),
        last_successful_restart_timestamp: Utc::now(),
        current_ongoing_restarts: 1,
        current_restarting_servers: restarting,
    };
    store.save_cluster("recovered-cluster", &persisted_state).unwrap();

    let mut ack = Response::base("recoveredid".to_string(), fqdn.to_string(), "4h".to_string());
    ack.found_cluster = "recovered-cluster".to_string();
    store.save_ack(&ack).unwrap();

    let ctx = Arc::new(EngineContext::new(registry, store, 5));
    recover_sleeping_watchers(&ctx);

    // Recovery must not re-increment the counter; the file is authoritative.
    let state = ctx.store.load_cluster("recovered-cluster").unwrap();
    assert_eq!(state.current_ongoing_restarts, 1);

    // The watcher was spawned and is now sleeping through its offset.
    assert!(goahead::core::inquire::is_sleeping(&ctx, fqdn));

    // It eventually completes and releases the slot.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let state = ctx.store.load_cluster("recovered-cluster").unwrap();
    assert_eq!(state.current_ongoing_restarts, 0);
}
