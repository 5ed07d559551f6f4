//! Storage engine: type registry, identifier allocation, element store.

mod edge_ops;
mod elements;
mod ids;
mod prop_ops;
mod registry;

pub use edge_ops::EdgeDirection;
pub use elements::ElementStore;
pub use ids::IdAllocator;
pub use registry::TypeRegistry;

use crate::backend::KvBackend;
use crate::error::{GraphError, Result};

/// Attempts an operation against a partition that may still be propagating,
/// waiting for stabilization between tries. Mirrors the bounded retry the
/// backend integration requires after partition creation: transient
/// unavailability is absorbed here, genuine errors pass through.
pub(crate) fn with_stabilize<T>(
    backend: &dyn KvBackend,
    partition: &str,
    mut op: impl FnMut() -> Result<T>,
) -> Result<T> {
    const ATTEMPTS: usize = 5;
    let mut last = None;
    for attempt in 0..ATTEMPTS {
        match op() {
            Ok(value) => return Ok(value),
            Err(GraphError::BackendUnavailable { message: reason }) => {
                tracing::debug!(partition, attempt, %reason, "store.stabilize.retry");
                last = Some(reason);
                if attempt + 1 < ATTEMPTS {
                    backend.await_ready(partition)?;
                }
            }
            Err(err) => return Err(err),
        }
    }
    Err(GraphError::unavailable(last.unwrap_or_else(|| {
        format!("partition {partition} did not stabilize")
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FieldType, KeyType, MemoryBackend, PartitionSpec};

    #[test]
    fn stabilize_retries_transient_unavailability_only() {
        let backend = MemoryBackend::new();
        backend
            .create_partition(PartitionSpec::new("p", KeyType::Int).field("n", FieldType::Int))
            .unwrap();

        let mut failures = 2;
        let value = with_stabilize(&backend, "p", || {
            if failures > 0 {
                failures -= 1;
                Err(GraphError::unavailable("still propagating"))
            } else {
                Ok(7)
            }
        })
        .unwrap();
        assert_eq!(value, 7);

        // a genuine error is not retried
        let mut calls = 0;
        let err = with_stabilize(&backend, "p", || {
            calls += 1;
            Err::<(), _>(GraphError::invalid_argument("bad input"))
        })
        .unwrap_err();
        assert!(matches!(err, GraphError::InvalidArgument { .. }));
        assert_eq!(calls, 1);
    }
}
