//! Liveness poller: reconciles pool membership with registry truth.
//!
//! The single place where "who is alive" meets "who services calls". On a
//! fixed interval the poller diffs the registry's worker names against the
//! set it remembers: new names are wrapped into fresh handles and pushed
//! into the pool, vanished names are drained out of the queue. One poll at
//! a time, and the hot dispatch path never waits on any of this.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::cluster::dispatcher::{WorkerHandle, WorkerPool};
use crate::cluster::registry::RegistryState;

/// Runs the reconciliation loop until the shutdown flag flips.
pub async fn run(
    registry: Arc<RegistryState>,
    pool: Arc<WorkerPool>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
) {
    let mut known = BTreeSet::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut shutdown = shutdown;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                reconcile(&registry, &pool, &mut known).await;
            }
            _ = async { let _ = shutdown.wait_for(|raised| *raised).await; } => {
                info!("poller stopped");
                return;
            }
        }
    }
}

/// One reconciliation pass. Exposed separately so tests can tick without
/// the timer.
pub async fn reconcile(
    registry: &RegistryState,
    pool: &WorkerPool,
    known: &mut BTreeSet<String>,
) {
    let current = registry.worker_names();
    for name in current.difference(known) {
        match registry.lookup(name) {
            Some(addr) => {
                info!(%name, %addr, "poller.worker.added");
                pool.release(WorkerHandle::new(name.clone(), addr));
            }
            // unregistered between the snapshot and the lookup; the next
            // pass will not see it anymore
            None => continue,
        }
    }
    for name in known.difference(&current) {
        let dropped = pool.prune(name).await;
        info!(%name, dropped, "poller.worker.retired");
    }
    *known = current;
}
