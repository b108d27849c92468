//! The boundary transport and the per-thread installed host
//!
//! `Transport` is the only way the module talks to the host: one method per
//! crossing, raw references in, raw references out. It is implemented by the
//! wasm import glue (`stubs::WasmTransport`) and by the in-process
//! `sim::SimulatedHost`.

use super::abi::Reference;
use super::boundary::Serialized;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

/// One method per boundary crossing.
///
/// Implementations must be reentrant: `invoke` and `construct` may call back
/// into the module (through `callback::handle_event`) before they return, and
/// that nested call may issue further crossings on the same transport.
///
/// Implementations need not serialise crossings themselves: `install` wraps
/// the transport so that only one thread is inside the host at a time.
pub trait Transport: Send + Sync {
    /// `target[property]`
    fn get(&self, target: Reference, property: &str) -> Reference;

    /// `target[property] = value`
    fn set(&self, target: Reference, property: &str, value: Reference);

    /// `delete target[property]`
    fn delete(&self, target: Reference, property: &str);

    /// `target[index]`
    fn index(&self, target: Reference, index: usize) -> Reference;

    /// `target[index] = value`
    fn set_index(&self, target: Reference, index: usize, value: Reference);

    /// `target.length`
    fn length(&self, target: Reference) -> usize;

    /// `callee.apply(this, args)`. Returns the result, or the thrown value
    /// with `false`.
    fn invoke(&self, this: Reference, callee: Reference, args: &[Reference]) -> (Reference, bool);

    /// `new callee(...args)`. Returns the result, or the thrown value with
    /// `false`.
    fn construct(&self, callee: Reference, args: &[Reference]) -> (Reference, bool);

    /// `target instanceof constructor`
    fn instance_of(&self, target: Reference, constructor: Reference) -> bool;

    /// Copy a module string into a new host string.
    fn string_val(&self, value: &str) -> Reference;

    /// Render `target` as a host string and stage its UTF-8 bytes. Returns a
    /// reference to the staged bytes and their length; the caller releases
    /// the staged reference after `load_string`.
    fn prepare_string(&self, target: Reference) -> (Reference, usize);

    /// Copy staged string bytes into `buf`.
    fn load_string(&self, prepared: Reference, buf: &mut [u8]);

    /// Copy from a host byte array into module memory. Returns the number of
    /// bytes copied, or None if `src` is not a byte array.
    fn copy_bytes_to_module(&self, dst: &mut [u8], src: Reference) -> Option<usize>;

    /// Copy module memory into a host byte array. Returns the number of bytes
    /// copied, or None if `dst` is not a byte array.
    fn copy_bytes_to_host(&self, dst: Reference, src: &[u8]) -> Option<usize>;

    /// The module no longer holds `target`; the host may reuse its slot once
    /// every handed-out copy has been released.
    fn release(&self, target: Reference);

    /// Produce a host function that calls back into the module with `id`.
    fn make_wrapper(&self, id: u32) -> Reference;

    /// Read and clear the pending-call descriptor staged by the host before
    /// it entered the module. Returns null if nothing is staged.
    fn take_pending_event(&self) -> Reference;
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<dyn Transport>>> = const { RefCell::new(None) };
}

/// Restores the previously installed transport when dropped.
#[must_use = "the transport is uninstalled when the guard is dropped"]
pub struct HostGuard {
    previous: Option<Arc<dyn Transport>>,
    // Tied to the thread whose slot it restores.
    _thread: PhantomData<*const ()>,
}

impl Drop for HostGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

/// Make `transport` the host for crossings issued from this thread.
///
/// Crossings through the installed transport hold the process-wide boundary
/// lock, so threads with their own hosts still take turns.
pub fn install(transport: Arc<dyn Transport>) -> HostGuard {
    let transport = Serialized::wrap(transport);
    let previous = CURRENT.with(|current| current.borrow_mut().replace(transport));
    HostGuard {
        previous,
        _thread: PhantomData,
    }
}

/// Get the transport for the current thread.
///
/// Values that own a host slot remember the transport that produced them;
/// this is only consulted for reserved references and fresh crossings.
pub fn host() -> Arc<dyn Transport> {
    CURRENT
        .with(|current| current.borrow().clone())
        .unwrap_or_else(default_host)
}

#[cfg(target_arch = "wasm32")]
fn default_host() -> Arc<dyn Transport> {
    use std::sync::OnceLock;
    static WASM: OnceLock<Arc<dyn Transport>> = OnceLock::new();
    WASM.get_or_init(|| Serialized::wrap(Arc::new(super::stubs::WasmTransport)))
        .clone()
}

#[cfg(not(target_arch = "wasm32"))]
fn default_host() -> Arc<dyn Transport> {
    panic!("no host transport installed on this thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedHost;

    #[test]
    fn test_install_restores_previous() {
        let outer = SimulatedHost::new();
        let inner = SimulatedHost::new();

        let _outer_guard = install(outer.clone());
        {
            let _inner_guard = install(inner.clone());
            host().string_val("inner");
        }
        host().string_val("outer");

        assert_eq!(inner.crossings(), 1);
        assert_eq!(outer.crossings(), 1);
    }

    #[test]
    #[cfg(not(target_arch = "wasm32"))]
    #[should_panic(expected = "no host transport installed")]
    fn test_missing_host_panics() {
        host();
    }
}
