//! Where listeners hand parsed readings off to.

use std::fmt::Debug;

use async_trait::async_trait;
use siterelay_types::Measurement;

/// Destination for readings parsed by a listener.
///
/// Relaying never fails from the caller's point of view: an implementation
/// that cannot deliver a reading logs and drops it.
#[async_trait]
pub trait RelaySink: Send + Sync + Debug {
    async fn relay(&self, measurement: Measurement);
}
