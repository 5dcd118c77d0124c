// src/core/watcher.rs

//! The completion watcher (C5): one asynchronous worker per admitted
//! restart, tracking a host from grant through observed reboot completion.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::core::command::{self, substitutions};
use crate::core::context::EngineContext;
use crate::core::metrics::{COMPLETIONS_TOTAL, ONGOING_RESTARTS, SLEEPING_WATCHERS};
use crate::core::types::{ClusterOp, ClusterSetting, Request};

/// Spawns the watcher task for an admitted `(cluster, fqdn)` restart and
/// registers it in the sleeping-watchers map. Returns immediately; the
/// watcher runs to completion on its own task with no external cancellation
/// (§4.5: a stuck remote host is polled until it recovers).
pub fn spawn_watcher(
    ctx: Arc<EngineContext>,
    cluster: String,
    fqdn: String,
    setting: ClusterSetting,
    request: Request,
) {
    let (tx, rx) = oneshot::channel();
    ctx.sleeping.insert(fqdn.clone(), tx);
    SLEEPING_WATCHERS.inc();
    tokio::spawn(run_watcher(ctx, cluster, fqdn, setting, request, rx));
}

async fn run_watcher(
    ctx: Arc<EngineContext>,
    cluster: String,
    fqdn: String,
    setting: ClusterSetting,
    original_request: Request,
    hand_off_rx: oneshot::Receiver<Request>,
) {
    let active_request = offset_phase(&ctx, &fqdn, &setting, original_request, hand_off_rx).await;
    polling_phase(&ctx, &cluster, &fqdn, &setting).await;
    completion_phase(&ctx, &cluster, &fqdn, &setting, &active_request).await;
}

/// Waits up to `reboot_completion_check_offset`, interruptible by a
/// hand-off from the inquire coordinator carrying the request that
/// evidenced the reboot (e.g. an observed uptime drop).
async fn offset_phase(
    ctx: &Arc<EngineContext>,
    fqdn: &str,
    setting: &ClusterSetting,
    original_request: Request,
    hand_off_rx: oneshot::Receiver<Request>,
) -> Request {
    let request = tokio::select! {
        handed_off = hand_off_rx => {
            match handed_off {
                Ok(request) => request,
                Err(_) => original_request,
            }
        }
        _ = sleep(setting.reboot_completion_check_offset) => {
            // Timed out without a hand-off; stop listening for one.
            ctx.sleeping.remove(fqdn);
            original_request
        }
    };
    SLEEPING_WATCHERS.dec();
    request
}

/// Repeatedly runs `reboot_completion_check` until it has exited 0 for
/// `reboot_completion_check_consecutive_successes` attempts in a row.
async fn polling_phase(ctx: &Arc<EngineContext>, cluster: &str, fqdn: &str, setting: &ClusterSetting) {
    let subs = substitutions(fqdn, cluster, "");
    let mut successful_checks = 0u32;
    loop {
        let cmd = command::substitute(&setting.reboot_completion_check, &subs);
        match command::run(&cmd, ctx.command_timeout_secs, true).await {
            Ok(result) => {
                if result.exit_code == 0 {
                    successful_checks += 1;
                    info!(
                        fqdn = %fqdn, cluster = %cluster,
                        "completion check succeeded ({successful_checks}/{})",
                        setting.reboot_completion_check_consecutive_successes
                    );
                    if successful_checks >= setting.reboot_completion_check_consecutive_successes {
                        break;
                    }
                } else {
                    successful_checks = 0;
                }
            }
            Err(e) => {
                warn!(fqdn = %fqdn, cluster = %cluster, error = %e, "completion check command failed");
                successful_checks = 0;
            }
        }
        sleep(setting.reboot_completion_check_interval).await;
    }
    info!(fqdn = %fqdn, cluster = %cluster, "fqdn seems to have successfully rebooted");
}

/// Runs completion actions, releases the cluster-cap slot, and replaces the
/// AckRecord with a completion record.
async fn completion_phase(
    ctx: &Arc<EngineContext>,
    cluster: &str,
    fqdn: &str,
    setting: &ClusterSetting,
    request: &Request,
) {
    let subs = substitutions(fqdn, cluster, &request.uptime);
    command::run_all(&setting.reboot_completion_actions, &subs, ctx.command_timeout_secs).await;

    match ctx.store.modify_cluster(cluster, fqdn, ClusterOp::Remove) {
        Ok(Some(state)) => {
            ONGOING_RESTARTS
                .with_label_values(&[cluster])
                .set(state.current_ongoing_restarts as f64);
        }
        Ok(None) => {
            // §7: a `remove` against a cluster with no persisted state is an
            // InvariantViolation (bug indicator), logged fatal rather than as
            // a transient warning.
            error!(fqdn = %fqdn, cluster = %cluster, "invariant violation: cluster state missing on completion");
        }
        Err(e) => {
            warn!(fqdn = %fqdn, cluster = %cluster, error = %e, "failed to persist cluster state after completion");
        }
    }
    COMPLETIONS_TOTAL.inc();

    let mut completion_ack = crate::core::types::Response::base(
        request.request_id.clone(),
        fqdn.to_string(),
        request.uptime.clone(),
    );
    completion_ack.found_cluster = cluster.to_string();
    completion_ack.go_ahead = false;
    completion_ack.unknown_host = false;
    completion_ack.message = format!(
        "fqdn: {fqdn} seems to have successfully rebooted in cluster {cluster} at {}",
        completion_ack.timestamp
    );
    if let Err(e) = ctx.store.save_ack(&completion_ack) {
        warn!(fqdn = %fqdn, cluster = %cluster, error = %e, "failed to persist completion ack record");
    }
}
