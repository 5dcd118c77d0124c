// src/core/registry.rs

//! The immutable, process-lifetime cluster registry (C1).

use std::collections::HashMap;

use regex::Regex;
use tracing::debug;

use crate::core::types::ClusterSetting;

/// Outcome of matching an fqdn against the registry.
pub enum Selection {
    /// Matched cluster `name`, not vetoed by any blacklist pattern.
    Matched { name: String },
    /// Matched at least one cluster's `name_pattern` but every match was
    /// vetoed by a `blacklist_name_pattern`. Carries the veto message.
    Blacklisted { message: String },
    /// No enabled cluster's `name_pattern` matched.
    Unknown,
}

/// Holds per-cluster static configuration, loaded once at startup from the
/// `include_dir` YAML documents and never mutated afterward.
pub struct ClusterRegistry {
    clusters: HashMap<String, ClusterSetting>,
}

impl ClusterRegistry {
    pub fn new(clusters: HashMap<String, ClusterSetting>) -> Self {
        Self { clusters }
    }

    pub fn get(&self, cluster: &str) -> Option<&ClusterSetting> {
        self.clusters.get(cluster)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.clusters.keys()
    }

    /// Selects the first enabled cluster whose `name_pattern` matches `fqdn`
    /// and isn't vetoed by a `blacklist_name_pattern`. Iteration continues
    /// past a veto so a sibling cluster's pattern can still admit the host.
    pub fn select(&self, fqdn: &str) -> Selection {
        let mut veto_message: Option<String> = None;

        for (name, setting) in &self.clusters {
            if !setting.enabled {
                debug!(cluster = %name, "skipping disabled cluster setting");
                continue;
            }
            let Ok(pattern) = Regex::new(&setting.name_pattern) else {
                continue;
            };
            if !pattern.is_match(fqdn) {
                continue;
            }

            let mut vetoed = false;
            for blacklist in &setting.blacklist_name_pattern {
                if let Ok(veto) = Regex::new(blacklist) {
                    if veto.is_match(fqdn) {
                        debug!(cluster = %name, pattern = %blacklist, "blacklist pattern matched, vetoing");
                        veto_message = Some(format!(
                            "Found matching blacklist name pattern: {blacklist} for FQDN: {fqdn} Preventing restart!"
                        ));
                        vetoed = true;
                        break;
                    }
                }
            }
            if vetoed {
                continue;
            }

            return Selection::Matched { name: name.clone() };
        }

        match veto_message {
            Some(message) => Selection::Blacklisted { message },
            None => Selection::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setting(name_pattern: &str, enabled: bool, blacklist: Vec<&str>) -> ClusterSetting {
        ClusterSetting {
            enabled,
            name_pattern: name_pattern.to_string(),
            blacklist_name_pattern: blacklist.into_iter().map(String::from).collect(),
            allowed_parallel_restarts: 2,
            minimum_uptime: std::time::Duration::from_secs(0),
            reboot_completion_check: "/bin/true".to_string(),
            reboot_completion_check_interval: std::time::Duration::from_secs(0),
            reboot_completion_check_offset: std::time::Duration::from_secs(0),
            reboot_completion_check_consecutive_successes: 1,
            reboot_completion_actions: vec![],
            reboot_goahead_actions: vec![],
            reboot_goahead_checks: vec![],
            reboot_goahead_checks_exit_code_for_reboot: 0,
        }
    }

    #[test]
    fn unknown_host_when_no_pattern_matches() {
        let mut clusters = HashMap::new();
        clusters.insert("foobar-server".to_string(), setting("^foobar-server-.*", true, vec![]));
        let registry = ClusterRegistry::new(clusters);
        assert!(matches!(
            registry.select("unknown.domain.tld"),
            Selection::Unknown
        ));
    }

    #[test]
    fn disabled_cluster_is_skipped() {
        let mut clusters = HashMap::new();
        clusters.insert("foobar-server".to_string(), setting(".*", false, vec![]));
        let registry = ClusterRegistry::new(clusters);
        assert!(matches!(
            registry.select("foobar-server-aa07.domain.tld"),
            Selection::Unknown
        ));
    }

    #[test]
    fn blacklist_pattern_vetoes_a_match() {
        let mut clusters = HashMap::new();
        clusters.insert(
            "vetoing".to_string(),
            setting(".*", true, vec!["^blocked-.*"]),
        );
        let registry = ClusterRegistry::new(clusters);
        assert!(matches!(
            registry.select("blocked-host.domain.tld"),
            Selection::Blacklisted { .. }
        ));
    }
}
