//! Serialised entry into the host
//!
//! Only one module thread may be inside the host at a time. Every crossing
//! takes the process-wide boundary lock for its duration. The lock is
//! reentrant: a host call that re-enters the module through `handle_event`
//! runs on the thread that already holds it, and the callback's own
//! crossings nest inside the outer one.

use super::abi::Reference;
use super::transport::Transport;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard, const_reentrant_mutex};
use std::sync::Arc;

static BOUNDARY: ReentrantMutex<()> = const_reentrant_mutex(());

/// Held while the current thread is crossing into the host.
pub(crate) type Entry = ReentrantMutexGuard<'static, ()>;

/// Block until no other thread is inside the host.
pub(crate) fn enter() -> Entry {
    BOUNDARY.lock()
}

/// A transport whose every crossing holds the boundary lock.
pub(crate) struct Serialized {
    inner: Arc<dyn Transport>,
}

impl Serialized {
    pub(crate) fn wrap(inner: Arc<dyn Transport>) -> Arc<dyn Transport> {
        Arc::new(Self { inner })
    }
}

impl Transport for Serialized {
    fn get(&self, target: Reference, property: &str) -> Reference {
        let _entry = enter();
        self.inner.get(target, property)
    }

    fn set(&self, target: Reference, property: &str, value: Reference) {
        let _entry = enter();
        self.inner.set(target, property, value)
    }

    fn delete(&self, target: Reference, property: &str) {
        let _entry = enter();
        self.inner.delete(target, property)
    }

    fn index(&self, target: Reference, index: usize) -> Reference {
        let _entry = enter();
        self.inner.index(target, index)
    }

    fn set_index(&self, target: Reference, index: usize, value: Reference) {
        let _entry = enter();
        self.inner.set_index(target, index, value)
    }

    fn length(&self, target: Reference) -> usize {
        let _entry = enter();
        self.inner.length(target)
    }

    fn invoke(&self, this: Reference, callee: Reference, args: &[Reference]) -> (Reference, bool) {
        let _entry = enter();
        self.inner.invoke(this, callee, args)
    }

    fn construct(&self, callee: Reference, args: &[Reference]) -> (Reference, bool) {
        let _entry = enter();
        self.inner.construct(callee, args)
    }

    fn instance_of(&self, target: Reference, constructor: Reference) -> bool {
        let _entry = enter();
        self.inner.instance_of(target, constructor)
    }

    fn string_val(&self, value: &str) -> Reference {
        let _entry = enter();
        self.inner.string_val(value)
    }

    fn prepare_string(&self, target: Reference) -> (Reference, usize) {
        let _entry = enter();
        self.inner.prepare_string(target)
    }

    fn load_string(&self, prepared: Reference, buf: &mut [u8]) {
        let _entry = enter();
        self.inner.load_string(prepared, buf)
    }

    fn copy_bytes_to_module(&self, dst: &mut [u8], src: Reference) -> Option<usize> {
        let _entry = enter();
        self.inner.copy_bytes_to_module(dst, src)
    }

    fn copy_bytes_to_host(&self, dst: Reference, src: &[u8]) -> Option<usize> {
        let _entry = enter();
        self.inner.copy_bytes_to_host(dst, src)
    }

    fn release(&self, target: Reference) {
        let _entry = enter();
        self.inner.release(target)
    }

    fn make_wrapper(&self, id: u32) -> Reference {
        let _entry = enter();
        self.inner.make_wrapper(id)
    }

    fn take_pending_event(&self) -> Reference {
        let _entry = enter();
        self.inner.take_pending_event()
    }
}
