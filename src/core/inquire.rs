// src/core/inquire.rs

//! The "am I still expected to reboot?" primitives (C6): detecting that a
//! sleeping completion watcher should be woken early.

use tracing::info;

use crate::core::context::EngineContext;
use crate::core::metrics::HAND_OFFS_TOTAL;
use crate::core::types::Request;

/// True if a completion watcher is currently in its offset sleep for `fqdn`.
pub fn is_sleeping(ctx: &EngineContext, fqdn: &str) -> bool {
    ctx.sleeping.contains_key(fqdn)
}

/// Atomically removes the sleeping entry for `fqdn`, if any, and wakes its
/// watcher with `request` so it begins the polling phase immediately.
/// Silent (returns `false`) if no sleeping entry exists.
pub fn hand_off(ctx: &EngineContext, fqdn: &str, request: Request) -> bool {
    match ctx.sleeping.remove(fqdn) {
        Some((_, sender)) => {
            info!(fqdn = %fqdn, "interrupting sleeping reboot completion check");
            HAND_OFFS_TOTAL.inc();
            // The receiving watcher may have just timed out and dropped its
            // end of the channel; a failed send means phase 2 already began
            // with the original request, which is an acceptable race.
            let _ = sender.send(request);
            true
        }
        None => false,
    }
}
