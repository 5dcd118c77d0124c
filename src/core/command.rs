// src/core/command.rs

//! Executes templated shell commands with a timeout (C3).

use std::collections::HashMap;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::{Instant, timeout};
use tracing::warn;

use crate::core::errors::EngineError;
use crate::core::metrics::COMMAND_LATENCY_SECONDS;

/// The closed set of placeholders accepted by [`substitute`].
pub const PLACEHOLDER_FQDN: &str = "{:%fqdn%:}";
pub const PLACEHOLDER_HOSTNAME: &str = "{:%hostname%:}";
pub const PLACEHOLDER_CLUSTER: &str = "{:%cluster%:}";
pub const PLACEHOLDER_UPTIME: &str = "{:%uptime%:}";

/// Result of running a command: its exit code and captured combined output.
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub exit_code: i32,
    pub output: String,
}

/// Builds the placeholder substitution map for a given fqdn/cluster/uptime,
/// deriving `hostname` as the first label of `fqdn`.
pub fn substitutions(fqdn: &str, cluster: &str, uptime: &str) -> HashMap<&'static str, String> {
    let hostname = fqdn.split('.').next().unwrap_or(fqdn).to_string();
    HashMap::from([
        (PLACEHOLDER_FQDN, fqdn.to_string()),
        (PLACEHOLDER_HOSTNAME, hostname),
        (PLACEHOLDER_CLUSTER, cluster.to_string()),
        (PLACEHOLDER_UPTIME, uptime.to_string()),
    ])
}

/// Replaces every known placeholder in `template` with its substitution.
pub fn substitute(template: &str, subs: &HashMap<&'static str, String>) -> String {
    let mut out = template.to_string();
    for (placeholder, value) in subs {
        out = out.replace(placeholder, value);
    }
    out
}

/// Runs a single already-substituted command template through the shell
/// word-splitter, with a timeout. When `tolerate_failure` is false and the
/// command fails to spawn or times out, the failure is surfaced as
/// [`EngineError::CommandFailed`]; otherwise failures are reported only via
/// a nonzero `exit_code`.
pub async fn run(command: &str, timeout_secs: u64, tolerate_failure: bool) -> Result<ExecResult, EngineError> {
    let words = match shell_words::split(command) {
        Ok(words) if !words.is_empty() => words,
        Ok(_) => {
            return Err(EngineError::CommandFailed(format!(
                "empty command template: '{command}'"
            )));
        }
        Err(e) => {
            let msg = format!("failed to parse command '{command}': {e}");
            if tolerate_failure {
                warn!("{msg}");
                return Ok(ExecResult {
                    exit_code: 1,
                    output: msg,
                });
            }
            return Err(EngineError::CommandFailed(msg));
        }
    };

    let (program, args) = (words[0].clone(), words[1..].to_vec());
    let mut child = Command::new(&program);
    child.args(&args);
    child.kill_on_drop(true);

    let started = Instant::now();
    let run_future = child.output();
    let outcome = timeout(Duration::from_secs(timeout_secs), run_future).await;
    COMMAND_LATENCY_SECONDS.observe(started.elapsed().as_secs_f64());

    match outcome {
        Ok(Ok(output)) => {
            let combined = format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            let exit_code = output.status.code().unwrap_or(1);
            Ok(ExecResult {
                exit_code,
                output: combined,
            })
        }
        Ok(Err(e)) => {
            let msg = format!("command '{command}' failed to spawn: {e}");
            if tolerate_failure {
                warn!("{msg}");
                Ok(ExecResult {
                    exit_code: 1,
                    output: msg,
                })
            } else {
                Err(EngineError::CommandFailed(msg))
            }
        }
        Err(_) => {
            let msg = format!("command '{command}' timed out after {timeout_secs}s");
            if tolerate_failure {
                warn!("{msg}");
                Ok(ExecResult {
                    exit_code: 1,
                    output: msg,
                })
            } else {
                Err(EngineError::CommandFailed(msg))
            }
        }
    }
}

/// Runs every template in `templates` through [`run`] (tolerating failure),
/// substituting placeholders first. Used for goahead/completion actions
/// where the caller does not inspect individual exit codes.
pub async fn run_all(templates: &[String], subs: &HashMap<&'static str, String>, timeout_secs: u64) {
    for template in templates {
        let command = substitute(template, subs);
        if let Err(e) = run(&command, timeout_secs, true).await {
            warn!(error = %e, command = %command, "action command failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitute_replaces_all_known_placeholders() {
        let subs = substitutions("host-a.example.tld", "foobar-server", "2h31m");
        let out = substitute(
            "echo {:%fqdn%:} {:%hostname%:} {:%cluster%:} {:%uptime%:}",
            &subs,
        );
        assert_eq!(out, "echo host-a.example.tld host-a foobar-server 2h31m");
    }

    #[tokio::test]
    async fn run_reports_real_exit_code() {
        let result = run("/bin/sh -c 'exit 7'", 5, true).await.unwrap();
        assert_eq!(result.exit_code, 7);
    }

    #[tokio::test]
    async fn run_surfaces_fatal_error_when_intolerant() {
        let result = run("/no/such/binary-goahead-test", 5, false).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn run_tolerates_spawn_failure_when_requested() {
        let result = run("/no/such/binary-goahead-test", 5, true).await.unwrap();
        assert_eq!(result.exit_code, 1);
    }
}
