//! In-process host
//!
//! `SimulatedHost` implements `Transport` over a small object graph with the
//! built-ins the bridge relies on (`Object`, `Array`, `Error`, `Uint8Array`,
//! `BigInt`, `String`, `Symbol`, `Reflect`). It keeps the protocol honest:
//! references are refcounted table slots that go stale once released, every
//! crossing is counted, and calls into wrapped module functions go through
//! the same staged-descriptor entry point the wasm host uses.
//!
//! The heap lock is never held while native functions or the module entry
//! point run, so both may issue further crossings.

mod builtins;
mod heap;

pub use heap::{EntityId, HostHeap, NativeCtor, NativeFn, PropertyMap};

use crate::runtime::{Reference, Transport};
use heap::{Callable, Kind};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A value on the host side of the boundary.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HostValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Entity(EntityId),
}

/// Configuration for the simulated host.
#[derive(Clone, Copy)]
pub struct HostConfig {
    /// First table index handed out for host entities.
    pub first_index: u32,
    /// Reuse released slot indices.
    pub recycle_slots: bool,
    /// Module entry point called when a wrapped function is invoked.
    pub entry: fn(),
    /// Keep a log of released references for `take_released`.
    pub record_releases: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            first_index: crate::runtime::abi::FIRST_HOST_INDEX,
            recycle_slots: true,
            entry: crate::callback::handle_event,
            record_releases: false,
        }
    }
}

/// An in-process host.
pub struct SimulatedHost {
    heap: Mutex<HostHeap>,
    crossings: AtomicUsize,
    config: HostConfig,
}

impl SimulatedHost {
    /// Create a host with default configuration.
    pub fn new() -> Arc<Self> {
        Self::with_config(HostConfig::default())
    }

    /// Create a host with custom configuration.
    pub fn with_config(config: HostConfig) -> Arc<Self> {
        Arc::new(Self {
            heap: Mutex::new(HostHeap::new(&config)),
            crossings: AtomicUsize::new(0),
            config,
        })
    }

    /// Run `f` with the host heap locked. `f` must not cross the boundary.
    pub fn with_heap<R>(&self, f: impl FnOnce(&mut HostHeap) -> R) -> R {
        f(&mut self.heap.lock())
    }

    /// Define `global[name]` as a native function.
    pub fn define_function<F>(&self, name: &str, f: F)
    where
        F: Fn(&SimulatedHost, HostValue, &[HostValue]) -> Result<HostValue, HostValue>
            + Send
            + Sync
            + 'static,
    {
        self.with_heap(|heap| {
            let function = heap.new_function(name, f);
            let global = HostValue::Entity(heap.well_known.global);
            heap.set_prop(global, name, function);
        });
    }

    /// Number of boundary crossings so far, releases included.
    pub fn crossings(&self) -> usize {
        self.crossings.load(Ordering::SeqCst)
    }

    /// Create a host that logs every release, for `take_released`.
    pub fn recording() -> Arc<Self> {
        Self::with_config(HostConfig {
            record_releases: true,
            ..HostConfig::default()
        })
    }

    /// References released by the module since the last call, in order.
    /// Always empty unless `record_releases` is set.
    pub fn take_released(&self) -> Vec<Reference> {
        self.with_heap(|heap| heap.take_released())
    }

    /// Number of releases so far.
    pub fn release_count(&self) -> usize {
        self.with_heap(|heap| heap.releases())
    }

    /// Number of entities the host is keeping alive.
    pub fn entity_count(&self) -> usize {
        self.with_heap(|heap| heap.entity_count())
    }

    /// Number of table slots the module still holds.
    pub fn live_references(&self) -> usize {
        self.with_heap(|heap| heap.live_slots())
    }

    /// `callee.apply(this, args)` on the host side. Calls to wrapped module
    /// functions re-enter the module.
    pub fn call_function(
        &self,
        callee: HostValue,
        this: HostValue,
        args: &[HostValue],
    ) -> Result<HostValue, HostValue> {
        let callable = self.callable(callee)?;
        match callable {
            Callable::Native {
                call: Some(call), ..
            } => call(self, this, args),
            Callable::Native { name, .. } => {
                Err(self.with_heap(|heap| {
                    heap.new_error(&format!("{} cannot be called without new", name))
                }))
            }
            Callable::Wrapper(id) => Ok(self.dispatch(id, this, args)),
        }
    }

    /// `new callee(...args)` on the host side.
    pub fn construct_value(
        &self,
        callee: HostValue,
        args: &[HostValue],
    ) -> Result<HostValue, HostValue> {
        match self.callable(callee)? {
            Callable::Native {
                construct: Some(construct),
                ..
            } => construct(self, args),
            Callable::Native { name, .. } => Err(self.with_heap(|heap| {
                heap.new_error(&format!("{} is not a constructor", name))
            })),
            Callable::Wrapper(_) => {
                Err(self.with_heap(|heap| heap.new_error("wrapped function is not a constructor")))
            }
        }
    }

    fn callable(&self, callee: HostValue) -> Result<Callable, HostValue> {
        self.with_heap(|heap| {
            if let HostValue::Entity(id) = callee {
                if let Kind::Function(callable) = &heap.entity(id).kind {
                    return Ok(callable.clone());
                }
            }
            let shown = heap.to_display_string(callee);
            Err(heap.new_error(&format!("{} is not a function", shown)))
        })
    }

    /// Call wrapped module function `id`: stage `{ id, this, args }`, enter
    /// the module and read back `result`.
    pub fn dispatch(&self, id: u32, this: HostValue, args: &[HostValue]) -> HostValue {
        self.enter_module(HostValue::Number(id as f64), this, args)
    }

    /// `dispatch` with an arbitrary staged `id`.
    pub(crate) fn enter_module(
        &self,
        id: HostValue,
        this: HostValue,
        args: &[HostValue],
    ) -> HostValue {
        let event = self.with_heap(|heap| {
            let class = heap.well_known.object;
            let event = heap.alloc(Kind::Object, Some(class));
            let target = HostValue::Entity(event);
            let args = heap.new_array(args.to_vec());
            heap.set_prop(target, "id", id);
            heap.set_prop(target, "this", this);
            heap.set_prop(target, "args", args);
            heap.pending_event = Some(event);
            event
        });
        tracing::trace!(?id, "entering module");
        (self.config.entry)();
        self.with_heap(|heap| {
            if heap.pending_event == Some(event) {
                heap.pending_event = None;
            }
            heap.get_prop(HostValue::Entity(event), "result")
        })
    }

    fn cross(&self, what: &'static str) {
        self.crossings.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(what, "crossing");
    }

    fn decode_all(&self, refs: &[Reference]) -> Vec<HostValue> {
        self.with_heap(|heap| refs.iter().map(|r| heap.decode(*r)).collect())
    }

    fn complete(&self, outcome: Result<HostValue, HostValue>) -> (Reference, bool) {
        self.with_heap(|heap| match outcome {
            Ok(value) => (heap.encode(value), true),
            Err(thrown) => (heap.encode(thrown), false),
        })
    }
}

impl Transport for SimulatedHost {
    fn get(&self, target: Reference, property: &str) -> Reference {
        self.cross("get");
        self.with_heap(|heap| {
            let target = heap.decode(target);
            let value = heap.get_prop(target, property);
            heap.encode(value)
        })
    }

    fn set(&self, target: Reference, property: &str, value: Reference) {
        self.cross("set");
        self.with_heap(|heap| {
            let target = heap.decode(target);
            let value = heap.decode(value);
            heap.set_prop(target, property, value);
        });
    }

    fn delete(&self, target: Reference, property: &str) {
        self.cross("delete");
        self.with_heap(|heap| {
            let target = heap.decode(target);
            heap.delete_prop(target, property);
        });
    }

    fn index(&self, target: Reference, index: usize) -> Reference {
        self.cross("index");
        self.with_heap(|heap| {
            let target = heap.decode(target);
            let value = heap.get_index(target, index);
            heap.encode(value)
        })
    }

    fn set_index(&self, target: Reference, index: usize, value: Reference) {
        self.cross("set_index");
        self.with_heap(|heap| {
            let target = heap.decode(target);
            let value = heap.decode(value);
            heap.set_index(target, index, value);
        });
    }

    fn length(&self, target: Reference) -> usize {
        self.cross("length");
        self.with_heap(|heap| {
            let target = heap.decode(target);
            heap.length(target)
        })
    }

    fn invoke(&self, this: Reference, callee: Reference, args: &[Reference]) -> (Reference, bool) {
        self.cross("invoke");
        let (this, callee) = self.with_heap(|heap| (heap.decode(this), heap.decode(callee)));
        let args = self.decode_all(args);
        let outcome = self.call_function(callee, this, &args);
        self.complete(outcome)
    }

    fn construct(&self, callee: Reference, args: &[Reference]) -> (Reference, bool) {
        self.cross("construct");
        let callee = self.with_heap(|heap| heap.decode(callee));
        let args = self.decode_all(args);
        let outcome = self.construct_value(callee, &args);
        self.complete(outcome)
    }

    fn instance_of(&self, target: Reference, constructor: Reference) -> bool {
        self.cross("instance_of");
        self.with_heap(|heap| {
            let target = heap.decode(target);
            let constructor = heap.decode(constructor);
            heap.instance_of(target, constructor)
        })
    }

    fn string_val(&self, value: &str) -> Reference {
        self.cross("string_val");
        self.with_heap(|heap| {
            let s = heap.new_string(value);
            heap.encode(s)
        })
    }

    fn prepare_string(&self, target: Reference) -> (Reference, usize) {
        self.cross("prepare_string");
        self.with_heap(|heap| {
            let target = heap.decode(target);
            let bytes = heap.to_display_string(target).into_bytes();
            let len = bytes.len();
            let staged = heap.stage_bytes(bytes);
            (heap.encode(staged), len)
        })
    }

    fn load_string(&self, prepared: Reference, buf: &mut [u8]) {
        self.cross("load_string");
        self.with_heap(|heap| {
            let prepared = heap.decode(prepared);
            if let Some(bytes) = heap.bytes_mut(prepared) {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
            }
        });
    }

    fn copy_bytes_to_module(&self, dst: &mut [u8], src: Reference) -> Option<usize> {
        self.cross("copy_bytes_to_module");
        self.with_heap(|heap| {
            let src = heap.decode(src);
            let bytes = heap.bytes_mut(src)?;
            let n = bytes.len().min(dst.len());
            dst[..n].copy_from_slice(&bytes[..n]);
            Some(n)
        })
    }

    fn copy_bytes_to_host(&self, dst: Reference, src: &[u8]) -> Option<usize> {
        self.cross("copy_bytes_to_host");
        self.with_heap(|heap| {
            let dst = heap.decode(dst);
            let bytes = heap.bytes_mut(dst)?;
            let n = bytes.len().min(src.len());
            bytes[..n].copy_from_slice(&src[..n]);
            Some(n)
        })
    }

    fn release(&self, target: Reference) {
        self.cross("release");
        self.with_heap(|heap| heap.release(target));
    }

    fn make_wrapper(&self, id: u32) -> Reference {
        self.cross("make_wrapper");
        self.with_heap(|heap| {
            let wrapper = heap.new_wrapper(id);
            heap.encode(wrapper)
        })
    }

    fn take_pending_event(&self) -> Reference {
        self.cross("take_pending_event");
        self.with_heap(|heap| match heap.pending_event.take() {
            Some(event) => heap.encode(HostValue::Entity(event)),
            None => Reference::NULL,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::install;
    use crate::value::Value;

    #[test]
    fn test_every_crossing_is_counted() {
        let host = SimulatedHost::new();
        let _guard = install(host.clone());

        let s = Value::from("x");
        assert_eq!(host.crossings(), 1);
        drop(s);
        assert_eq!(host.crossings(), 2);
    }

    #[test]
    fn test_repeated_rendering_keeps_memory_flat() {
        let host = SimulatedHost::new();
        let _guard = install(host.clone());

        assert_eq!(Value::from("x").to_string(), "x");
        let entities = host.entity_count();
        for _ in 0..1000 {
            assert_eq!(Value::from("x").to_string(), "x");
        }
        assert_eq!(host.entity_count(), entities);
        assert_eq!(host.live_references(), 0);
        assert!(host.release_count() >= 2000);
        assert!(host.take_released().is_empty());
    }

    #[test]
    fn test_recording_host_drains_its_log() {
        let host = SimulatedHost::recording();
        let _guard = install(host.clone());

        let reference = Value::from("logged").reference();
        assert_eq!(host.take_released(), vec![reference]);
        assert!(host.take_released().is_empty());
        assert_eq!(host.release_count(), 1);
    }

    #[test]
    fn test_custom_first_index() {
        let host = SimulatedHost::with_config(HostConfig {
            first_index: 1000,
            ..HostConfig::default()
        });
        let _guard = install(host.clone());

        assert_eq!(Value::from("x").reference().index(), 1000);
    }

    #[test]
    fn test_custom_entry_point() {
        fn entry() {
            crate::runtime::host().take_pending_event();
        }
        let host = SimulatedHost::with_config(HostConfig {
            entry,
            ..HostConfig::default()
        });
        let _guard = install(host.clone());

        // The entry point drained the event without answering it.
        let result = host.dispatch(1, HostValue::Undefined, &[]);
        assert_eq!(result, HostValue::Undefined);
        assert!(host.with_heap(|heap| heap.pending_event.is_none()));
    }

    #[test]
    fn test_calling_non_function_throws() {
        let host = SimulatedHost::new();
        let outcome = host.call_function(HostValue::Number(1.0), HostValue::Undefined, &[]);
        let thrown = outcome.unwrap_err();
        let message = host.with_heap(|heap| {
            let message = heap.get_prop(thrown, "message");
            heap.to_display_string(message)
        });
        assert_eq!(message, "1 is not a function");
    }
}
