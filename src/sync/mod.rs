//! Resource synchronization
//!
//! One [`ResourceSynchronizer`] per registered resource type keeps its
//! metric store in step with the cluster through list and watch calls.

mod backoff;
mod synchronizer;

pub use backoff::Backoff;
pub use synchronizer::{
    wait_for_state, ResourceSynchronizer, SyncConfig, SyncState, SynchronizerHandle,
};
