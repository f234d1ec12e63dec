//! Topology selection by batch size

use rivalscope_core::{Topology, MANAGED_THRESHOLD};

/// Flat for small batches, managed once the batch outgrows [`MANAGED_THRESHOLD`].
pub fn select(target_count: usize) -> Topology {
    if target_count > MANAGED_THRESHOLD {
        Topology::Managed
    } else {
        Topology::Flat
    }
}
