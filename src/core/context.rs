// src/core/context.rs

//! Bundles the process-lifetime engine state (registry, state store,
//! sleeping watchers) behind one value passed explicitly into handlers and
//! watchers, rather than reached for through ambient globals.

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::core::registry::ClusterRegistry;
use crate::core::store::StateStore;
use crate::core::types::Request;

/// The sleeping-watchers map: one entry per FQDN currently in the offset
/// phase of its completion watcher, holding the hand-off channel.
pub type SleepingWatchers = DashMap<String, oneshot::Sender<Request>>;

pub struct EngineContext {
    pub registry: ClusterRegistry,
    pub store: StateStore,
    pub sleeping: SleepingWatchers,
    pub command_timeout_secs: u64,
}

impl EngineContext {
    pub fn new(registry: ClusterRegistry, store: StateStore, command_timeout_secs: u64) -> Self {
        Self {
            registry,
            store,
            sleeping: DashMap::new(),
            command_timeout_secs,
        }
    }
}
