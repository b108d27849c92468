//! Release of host table slots
//!
//! A tracker is created for every reference that names a host slot. It is
//! shared by all clones of the `Value` that adopted the reference, and its
//! `Drop` sends the single release notification for that adoption. Nothing
//! else can release a slot, so a double release is impossible.

use crate::callback;
use crate::runtime::{Reference, Transport};
use std::sync::Arc;

pub(crate) struct Tracker {
    reference: Reference,
    // The release must reach the host that handed the reference out, even if
    // the last clone is dropped on another thread.
    transport: Arc<dyn Transport>,
    // Callback ID held by a wrapper handle, freed with the handle.
    lease: Option<u32>,
}

impl Tracker {
    /// Track `reference` if it names a host slot. Numbers and the reserved
    /// singletons are never tracked.
    pub(crate) fn track(reference: Reference, transport: &Arc<dyn Transport>) -> Option<Arc<Self>> {
        reference.is_tracked().then(|| {
            Arc::new(Self {
                reference,
                transport: transport.clone(),
                lease: None,
            })
        })
    }

    /// Track a wrapper reference that holds callback ID `id`.
    pub(crate) fn track_lease(
        reference: Reference,
        transport: &Arc<dyn Transport>,
        id: u32,
    ) -> Option<Arc<Self>> {
        let tracked = reference.is_tracked().then(|| {
            Arc::new(Self {
                reference,
                transport: transport.clone(),
                lease: Some(id),
            })
        });
        if tracked.is_none() {
            callback::end_lease(id);
        }
        tracked
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        tracing::trace!(reference = ?self.reference, "releasing host reference");
        self.transport.release(self.reference);
        if let Some(id) = self.lease {
            callback::end_lease(id);
        }
    }
}
