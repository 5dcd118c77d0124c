// tests/property_cluster_cap.rs

//! Property test for the central cap invariant: regardless of admission
//! order, a cluster's `current_ongoing_restarts` never exceeds its
//! `allowed_parallel_restarts`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use goahead::core::context::EngineContext;
use goahead::core::engine::decide;
use goahead::core::registry::ClusterRegistry;
use goahead::core::store::StateStore;
use goahead::core::types::{ClusterSetting, Mode, Request};
use proptest::prelude::*;
use tempfile::TempDir;

fn setting(cap: u32) -> ClusterSetting {
    ClusterSetting {
        enabled: true,
        name_pattern: "^capped-.*".to_string(),
        blacklist_name_pattern: vec![],
        allowed_parallel_restarts: cap,
        minimum_uptime: Duration::from_secs(0),
        reboot_completion_check: "/bin/true".to_string(),
        // Long enough that no watcher completes mid-test and releases a
        // slot, which would let this property pass for the wrong reason.
        reboot_completion_check_interval: Duration::from_secs(60),
        reboot_completion_check_offset: Duration::from_secs(60),
        reboot_completion_check_consecutive_successes: 1,
        reboot_completion_actions: vec![],
        reboot_goahead_actions: vec![],
        reboot_goahead_checks: vec![],
        reboot_goahead_checks_exit_code_for_reboot: 0,
    }
}

async fn admit_all(cap: u32, host_count: u32) -> u32 {
    let dir = TempDir::new().unwrap();
    let mut clusters = HashMap::new();
    clusters.insert("capped-cluster".to_string(), setting(cap));
    let registry = ClusterRegistry::new(clusters);
    let store = StateStore::new(dir.path().to_path_buf());
    let ctx = Arc::new(EngineContext::new(registry, store, 5));

    for i in 0..host_count {
        let fqdn = format!("capped-host-{i:03}.domain.tld");
        let first = decide(
            &ctx,
            Request {
                fqdn: fqdn.clone(),
                uptime: "2h".to_string(),
                request_id: String::new(),
            },
            Mode::Request,
        )
        .await
        .unwrap();
        decide(
            &ctx,
            Request {
                fqdn,
                uptime: "2h".to_string(),
                request_id: first.request_id,
            },
            Mode::Request,
        )
        .await
        .unwrap();
    }

    ctx.store
        .load_cluster("capped-cluster")
        .map(|state| state.current_ongoing_restarts)
        .unwrap_or(0)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    #[test]
    fn ongoing_restarts_never_exceeds_the_cap(cap in 1u32..6, host_count in 1u32..20) {
        let ongoing = tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(admit_all(cap, host_count));
        prop_assert!(ongoing <= cap);
    }
}
