// src/core/engine.rs

//! The decision engine (C4): the endpoint-agnostic entry point that
//! selects a cluster, applies blacklist / minimum-uptime / prior-state /
//! cluster-cap rules, and produces a response.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::info;

use crate::core::command::{self, substitutions};
use crate::core::context::EngineContext;
use crate::core::durfmt::go_duration_string;
use crate::core::errors::EngineError;
use crate::core::inquire;
use crate::core::metrics::{DECISIONS_TOTAL, ONGOING_RESTARTS};
use crate::core::registry::Selection;
use crate::core::types::{ClusterOp, ClusterSetting, Mode, Request, Response};
use crate::core::watcher;

/// Generates an 8-character alphanumeric token to identify a request,
/// echoed by clients on follow-up calls.
pub fn generate_request_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}

/// The main entry point: given a request and a mode, produces a response.
/// `request.fqdn` and `request.uptime` must be non-empty and `uptime` must
/// parse as a duration, or this fails with [`EngineError::BadRequest`].
pub async fn decide(
    ctx: &Arc<EngineContext>,
    request: Request,
    mode: Mode,
) -> Result<Response, EngineError> {
    if request.fqdn.trim().is_empty() || request.uptime.trim().is_empty() {
        return Err(EngineError::bad_request(
            "Invalid request payload. Need at least fqdn and uptime fields!",
        ));
    }
    let uptime: Duration = humantime::parse_duration(&request.uptime).map_err(|_| {
        EngineError::bad_request(format!(
            "Can not convert value {} of your uptime to a duration. Valid time units are 300ms, 1.5h or 2h45m.",
            request.uptime
        ))
    })?;

    let mut response = Response::base(
        generate_request_id(),
        request.fqdn.clone(),
        request.uptime.clone(),
    );
    let mode_label = match mode {
        Mode::Request => "request",
        Mode::Inquire => "inquire",
    };

    match ctx.registry.select(&request.fqdn) {
        Selection::Matched { name } => {
            let setting = ctx
                .registry
                .get(&name)
                .expect("selected cluster must exist in registry")
                .clone();
            response.unknown_host = false;
            response.found_cluster = name.clone();

            match mode {
                Mode::Inquire => handle_inquire(ctx, &request, &name, &setting, &mut response).await,
                Mode::Request => {
                    handle_request(ctx, &request, uptime, &name, &setting, &mut response).await
                }
            }
        }
        Selection::Blacklisted { message } => {
            response.unknown_host = true;
            response.message = message;
            persist_unknown(ctx, &mut response);
        }
        Selection::Unknown => {
            response.message = format!("FQDN {} did not match any known cluster", request.fqdn);
            persist_unknown(ctx, &mut response);
        }
    }

    let outcome = if response.unknown_host {
        "unknown_host"
    } else if response.go_ahead {
        "go_ahead"
    } else {
        "denied"
    };
    DECISIONS_TOTAL.with_label_values(&[mode_label, outcome]).inc();

    Ok(response)
}

fn persist_unknown(ctx: &Arc<EngineContext>, response: &mut Response) {
    response.found_cluster = "unknown".to_string();
    if let Err(e) = ctx.store.save_ack(response) {
        tracing::warn!(error = %e, "failed to persist ack record for unknown host");
    }
}

async fn handle_request(
    ctx: &Arc<EngineContext>,
    request: &Request,
    uptime: Duration,
    cluster_name: &str,
    setting: &ClusterSetting,
    response: &mut Response,
) {
    if uptime < setting.minimum_uptime {
        check_ack_file_inquire(ctx, request, cluster_name, response);
        response.message = format!(
            "Configured minimum uptime for cluster: {} was not reached by client's uptime: {}",
            go_duration_string(setting.minimum_uptime),
            request.uptime
        );
        response.ask_again_in = go_duration_string(setting.minimum_uptime);
        return;
    }

    let fqdn_go_ahead = check_ack_file(ctx, request, cluster_name, response);
    if !fqdn_go_ahead {
        return;
    }

    match check_cluster_state(ctx, cluster_name, &request.fqdn, setting) {
        CapOutcome::AlreadyRestarting => {
            // Idempotent retry: the fqdn is already admitted, so no counter
            // advance, no goahead actions, and no second watcher.
            response.go_ahead = true;
            response.ask_again_in = "0s".to_string();
            response.message = "You should already be restarting!".to_string();
        }
        CapOutcome::Denied(message) => {
            response.go_ahead = false;
            response.message = message;
        }
        CapOutcome::Admitted => {
            response.go_ahead = true;
            response.ask_again_in = "0s".to_string();

            let subs = substitutions(&request.fqdn, cluster_name, &request.uptime);
            command::run_all(&setting.reboot_goahead_actions, &subs, ctx.command_timeout_secs).await;

            watcher::spawn_watcher(
                ctx.clone(),
                cluster_name.to_string(),
                request.fqdn.clone(),
                setting.clone(),
                request.clone(),
            );
        }
    }
}

/// `checkAckFile`: reject-on-mismatch, persist-on-empty-id policy (see
/// the source ambiguity note this spec resolves in favor of).
fn check_ack_file(
    ctx: &Arc<EngineContext>,
    request: &Request,
    cluster_name: &str,
    response: &mut Response,
) -> bool {
    if let Some(ack) = ctx.store.load_ack(cluster_name, &request.fqdn) {
        if !request.request_id.is_empty() {
            if request.request_id == ack.request_id {
                return true;
            }
            response.message = format!(
                "Found mismatching request_id in request: {} and found on middle-ware: {}",
                request.request_id, ack.request_id
            );
            return false;
        }
    }

    // No ack on record, or the client echoed no request_id: persist a
    // fresh ack carrying this response's freshly generated request_id.
    if let Err(e) = ctx.store.save_ack(response) {
        tracing::warn!(error = %e, "failed to persist ack record");
    }
    response.message = format!("No previous request file found for fqdn: {}", request.fqdn);
    false
}

/// Outcome of [`check_cluster_state`]'s cluster-cap gate.
enum CapOutcome {
    /// The fqdn is already a member of `current_restarting_servers`: an
    /// idempotent retry, not a new admission.
    AlreadyRestarting,
    /// Newly admitted: the counter was incremented and the fqdn added.
    Admitted,
    /// Refused, carrying the denial message.
    Denied(String),
}

/// `checkClusterState`: the cluster-wide concurrency gate, run under the
/// state store's global mutex.
fn check_cluster_state(
    ctx: &Arc<EngineContext>,
    cluster_name: &str,
    fqdn: &str,
    setting: &ClusterSetting,
) -> CapOutcome {
    ctx.store.with_lock(|store| {
        let state = store.load_cluster(cluster_name);
        if let Some(state) = &state {
            if state.current_restarting_servers.contains(fqdn) {
                return CapOutcome::AlreadyRestarting;
            }
            if state.current_ongoing_restarts >= setting.allowed_parallel_restarts {
                let mut hosts: Vec<&String> = state.current_restarting_servers.iter().collect();
                hosts.sort();
                let csv = hosts
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(",");
                return CapOutcome::Denied(format!(
                    "Denied restart request as the current_ongoing_restarts of cluster {cluster_name} is larger than the allowed_parallel_restarts: {} >= {} Currently restarting hosts: {csv}",
                    state.current_ongoing_restarts, setting.allowed_parallel_restarts
                ));
            }
        }

        match store.modify_cluster(cluster_name, fqdn, ClusterOp::Add) {
            Ok(Some(state)) => {
                ONGOING_RESTARTS
                    .with_label_values(&[cluster_name])
                    .set(state.current_ongoing_restarts as f64);
                CapOutcome::Admitted
            }
            Ok(None) => CapOutcome::Admitted,
            Err(e) => {
                tracing::warn!(error = %e, "failed to persist cluster state on admission");
                CapOutcome::Denied(format!("Internal error persisting cluster state: {e}"))
            }
        }
    })
}

async fn handle_inquire(
    ctx: &Arc<EngineContext>,
    request: &Request,
    cluster_name: &str,
    setting: &ClusterSetting,
    response: &mut Response,
) {
    check_ack_file_inquire(ctx, request, cluster_name, response);

    response.message = check_checks_inquire(ctx, request, cluster_name, setting)
        .await
        .unwrap_or_else(|| "No reason to restart".to_string());
    response.go_ahead = false;
}

/// `checkAckFileInquire`: detects an uptime drop (or a stored `go_ahead`)
/// indicating the reboot has already occurred, and hands off a sleeping
/// watcher if one exists. Side-effecting only; does not influence the
/// inquire response's message (that is [`check_checks_inquire`]'s job).
///
/// `response` is the in-progress response for this call, already carrying
/// its freshly generated `request_id`; when no ack is on file yet, that is
/// what gets persisted (mirroring `checkAckFileInquire`'s else-branch,
/// which saves `res` rather than re-deriving an id from the request).
fn check_ack_file_inquire(ctx: &Arc<EngineContext>, request: &Request, cluster_name: &str, response: &Response) {
    match ctx.store.load_ack(cluster_name, &request.fqdn) {
        Some(ack) => {
            let reported_shorter = match (
                humantime::parse_duration(&request.uptime),
                humantime::parse_duration(&ack.reported_uptime),
            ) {
                (Ok(new_uptime), Ok(old_uptime)) => new_uptime < old_uptime,
                _ => false,
            };

            if reported_shorter || ack.go_ahead {
                if inquire::hand_off(ctx, &request.fqdn, request.clone()) {
                    info!(fqdn = %request.fqdn, cluster = %cluster_name, "interrupting sleeping reboot completion check");
                }
            } else {
                let mut updated = ack;
                updated.reported_uptime = request.uptime.clone();
                if let Err(e) = ctx.store.save_ack(&updated) {
                    tracing::warn!(error = %e, "failed to persist updated ack during inquire");
                }
            }
        }
        None => {
            let mut fresh = response.clone();
            fresh.found_cluster = cluster_name.to_string();
            if let Err(e) = ctx.store.save_ack(&fresh) {
                tracing::warn!(error = %e, "failed to persist fresh ack during inquire");
            }
        }
    }
}

/// `checkChecksInquire`: runs each `reboot_goahead_checks` command
/// (tolerating failure). If any exit code matches
/// `reboot_goahead_checks_exit_code_for_reboot`, the inquire response
/// should carry a `YesInquireToRestart:` message.
async fn check_checks_inquire(
    ctx: &Arc<EngineContext>,
    request: &Request,
    cluster_name: &str,
    setting: &ClusterSetting,
) -> Option<String> {
    let subs = substitutions(&request.fqdn, cluster_name, &request.uptime);
    for check in &setting.reboot_goahead_checks {
        let cmd = command::substitute(check, &subs);
        match command::run(&cmd, ctx.command_timeout_secs, true).await {
            Ok(result) if result.exit_code == setting.reboot_goahead_checks_exit_code_for_reboot => {
                return Some(format!(
                    "YesInquireToRestart: goahead check result of {cmd} is {}",
                    result.exit_code
                ));
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, command = %cmd, "goahead check command failed");
            }
        }
    }
    None
}
