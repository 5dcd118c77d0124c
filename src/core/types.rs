// src/core/types.rs

//! The data model shared by the decision engine, state store, and HTTP layer:
//! requests, responses, per-cluster static configuration, and the two
//! persisted record shapes.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inbound request payload, shared by both the request and inquire paths.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub fqdn: String,
    pub uptime: String,
    #[serde(default)]
    pub request_id: String,
}

/// Operating mode of [`crate::core::engine::DecisionEngine::decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Request,
    Inquire,
}

/// Response payload, also the on-disk shape of an [`AckRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub go_ahead: bool,
    #[serde(default)]
    pub unknown_host: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ask_again_in: String,
    pub request_id: String,
    pub found_cluster: String,
    pub requesting_fqdn: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    pub reported_uptime: String,
}

impl Response {
    /// The base response every decision starts from, before cluster
    /// selection narrows `found_cluster` and `unknown_host`.
    pub fn base(request_id: String, requesting_fqdn: String, reported_uptime: String) -> Self {
        Self {
            timestamp: Utc::now(),
            go_ahead: false,
            unknown_host: true,
            ask_again_in: String::new(),
            request_id,
            found_cluster: "unknown".to_string(),
            requesting_fqdn,
            message: String::new(),
            reported_uptime,
        }
    }
}

/// Per-cluster static configuration, one entry per cluster name in a
/// cluster-settings YAML document.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterSetting {
    #[serde(default)]
    pub enabled: bool,
    pub name_pattern: String,
    #[serde(default)]
    pub blacklist_name_pattern: Vec<String>,
    pub allowed_parallel_restarts: u32,
    #[serde(with = "humantime_serde")]
    pub minimum_uptime: Duration,
    pub reboot_completion_check: String,
    #[serde(with = "humantime_serde")]
    pub reboot_completion_check_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub reboot_completion_check_offset: Duration,
    pub reboot_completion_check_consecutive_successes: u32,
    #[serde(default)]
    pub reboot_completion_actions: Vec<String>,
    #[serde(default)]
    pub reboot_goahead_actions: Vec<String>,
    #[serde(default)]
    pub reboot_goahead_checks: Vec<String>,
    #[serde(default)]
    pub reboot_goahead_checks_exit_code_for_reboot: i32,
}

/// Per-cluster persistent counters, `{state_dir}/{cluster}.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterState {
    #[serde(default = "Utc::now")]
    pub last_restart_request_timestamp: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub last_successful_restart_timestamp: DateTime<Utc>,
    pub current_ongoing_restarts: u32,
    pub current_restarting_servers: HashSet<String>,
}

impl ClusterState {
    pub fn empty() -> Self {
        let now = Utc::now();
        Self {
            last_restart_request_timestamp: now,
            last_successful_restart_timestamp: now,
            current_ongoing_restarts: 0,
            current_restarting_servers: HashSet::new(),
        }
    }
}

/// Which direction [`ClusterState`] is being mutated in
/// `StateStore::modify_cluster`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterOp {
    Add,
    Remove,
}

pub type AckRecord = Response;
