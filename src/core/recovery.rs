// src/core/recovery.rs

//! Startup recovery (C7): re-creates sleeping watchers for hosts recorded
//! as still restarting, restoring the per-host invariant after a crash or
//! restart without double-counting — the persisted state file is the
//! source of truth, so no counters are modified here.

use std::sync::Arc;

use tracing::info;

use crate::core::context::EngineContext;
use crate::core::types::Request;
use crate::core::watcher;

pub fn recover_sleeping_watchers(ctx: &Arc<EngineContext>) {
    let cluster_names: Vec<String> = ctx.registry.names().cloned().collect();

    for cluster in cluster_names {
        let Some(state) = ctx.store.load_cluster(&cluster) else {
            continue;
        };
        if state.current_restarting_servers.is_empty() {
            continue;
        }
        let Some(setting) = ctx.registry.get(&cluster) else {
            continue;
        };

        info!(
            cluster = %cluster,
            count = state.current_restarting_servers.len(),
            "found previously existing cluster state, resuming completion watchers"
        );

        for fqdn in state.current_restarting_servers.iter() {
            let ack = ctx
                .store
                .load_ack(&cluster, fqdn)
                .unwrap_or_else(|| crate::core::types::Response::base(
                    "recovered".to_string(),
                    fqdn.clone(),
                    String::new(),
                ));
            let request = Request {
                fqdn: fqdn.clone(),
                uptime: ack.reported_uptime.clone(),
                request_id: ack.request_id.clone(),
            };
            info!(fqdn = %fqdn, cluster = %cluster, "restarting cluster checker after recovery");
            watcher::spawn_watcher(ctx.clone(), cluster.clone(), fqdn.clone(), setting.clone(), request);
        }
    }
}
