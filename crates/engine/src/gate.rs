// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Global and per-server concurrency gating.
//!
//! A job must hold one global slot and one slot of its server for its
//! entire lifetime. Acquisition is non-blocking: if either semaphore is
//! exhausted the scheduler skips the repo this cycle. Acquisition order
//! is always global first, then server; the token releases in reverse,
//! and release is tied to drop so a panicking job cannot leak slots.

use parking_lot::Mutex;
use rc_core::ServerKey;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::warn;

struct ServerGate {
    semaphore: Arc<Semaphore>,
    cap: usize,
}

/// Both counting semaphores plus the per-server family.
pub struct ConversionGate {
    global: Arc<Semaphore>,
    global_cap: usize,
    default_server_cap: usize,
    servers: Mutex<HashMap<ServerKey, ServerGate>>,
}

/// Slots held by one job. Field order is drop order: the server slot
/// releases before the global one, the reverse of acquisition.
pub struct SlotToken {
    _server: OwnedSemaphorePermit,
    _global: OwnedSemaphorePermit,
    server_key: ServerKey,
}

impl SlotToken {
    pub fn server_key(&self) -> &ServerKey {
        &self.server_key
    }
}

/// Holder counts for the concurrency monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateSnapshot {
    pub global_in_use: usize,
    pub global_cap: usize,
    /// `(server, in_use, cap)` per known server, sorted by server key.
    pub servers: Vec<(ServerKey, usize, usize)>,
}

impl ConversionGate {
    pub fn new(global_cap: usize, default_server_cap: usize) -> Self {
        Self {
            global: Arc::new(Semaphore::new(global_cap)),
            global_cap,
            default_server_cap,
            servers: Mutex::new(HashMap::new()),
        }
    }

    /// Ensure a server gate exists with the given cap override.
    ///
    /// Called once per cycle from the reloaded store. A cap change
    /// applies only while the server is idle; with jobs in flight the
    /// old cap is kept and a warning names both values, because resizing
    /// a semaphore under its holders would corrupt the accounting.
    pub fn configure_server(&self, key: &ServerKey, cap_override: Option<u32>) {
        let cap = cap_override.map(|c| c as usize).unwrap_or(self.default_server_cap);
        let mut servers = self.servers.lock();
        match servers.get_mut(key) {
            None => {
                servers.insert(
                    key.clone(),
                    ServerGate {
                        semaphore: Arc::new(Semaphore::new(cap)),
                        cap,
                    },
                );
            }
            Some(gate) if gate.cap == cap => {}
            Some(gate) => {
                if gate.semaphore.available_permits() == gate.cap {
                    gate.semaphore = Arc::new(Semaphore::new(cap));
                    gate.cap = cap;
                } else {
                    warn!(
                        server = %key,
                        current_cap = gate.cap,
                        requested_cap = cap,
                        "deferring server cap change while jobs hold slots"
                    );
                }
            }
        }
    }

    /// Try to take one global and one per-server slot. Returns `None`
    /// without waiting when either is exhausted; an acquired global slot
    /// is returned on the way out.
    pub fn try_acquire(&self, key: &ServerKey) -> Option<SlotToken> {
        let global = self.global.clone().try_acquire_owned().ok()?;

        let server_semaphore = {
            let mut servers = self.servers.lock();
            servers
                .entry(key.clone())
                .or_insert_with(|| ServerGate {
                    semaphore: Arc::new(Semaphore::new(self.default_server_cap)),
                    cap: self.default_server_cap,
                })
                .semaphore
                .clone()
        };
        // Dropping `global` here hands the slot straight back.
        let server = server_semaphore.try_acquire_owned().ok()?;

        Some(SlotToken {
            _server: server,
            _global: global,
            server_key: key.clone(),
        })
    }

    pub fn snapshot(&self) -> GateSnapshot {
        let servers = self.servers.lock();
        let mut server_counts: Vec<(ServerKey, usize, usize)> = servers
            .iter()
            .map(|(key, gate)| {
                (
                    key.clone(),
                    gate.cap - gate.semaphore.available_permits(),
                    gate.cap,
                )
            })
            .collect();
        server_counts.sort_by(|a, b| a.0.cmp(&b.0));

        GateSnapshot {
            global_in_use: self.global_cap - self.global.available_permits(),
            global_cap: self.global_cap,
            servers: server_counts,
        }
    }
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
