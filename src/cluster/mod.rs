//! Cluster layer: worker registry, worker service, pool dispatcher,
//! liveness poller and coordinator.
//!
//! Responsibilities are deliberately split: the registry knows who exists,
//! the poller reconciles pool membership with registry truth on a fixed
//! interval, and the dispatcher only ever cycles handles through its FIFO
//! queue; it never consults the registry on the hot path.

pub mod coordinator;
pub mod dispatcher;
pub mod poller;
pub mod proto;
pub mod registry;
pub mod worker;

use tokio::sync::watch;

/// Resolves once the shared shutdown flag flips. Every long-running cluster
/// task selects on this; in-flight work is drained, never cancelled.
pub(crate) async fn flag_raised(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|raised| *raised).await;
}
