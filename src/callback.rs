//! Module functions callable from the host
//!
//! `Function::wrap` registers a callback under a fresh numeric ID and asks
//! the host for a function bound to that ID. When the host calls it, the
//! host stages a pending-call descriptor and enters the module through
//! `handle_event`, which runs the callback and writes the result back.
//!
//! Host calls are synchronous and may nest: while the module waits on an
//! `invoke`, the host can re-enter `handle_event`, and that callback can
//! issue further crossings. The registry lock is therefore only held to
//! insert, remove or clone a callback, never while one runs.

use crate::facade::Object;
use crate::runtime::boundary;
use crate::runtime::host;
use crate::value::Value;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// A module function exposed to the host: `(this, args) -> result`.
pub type Callback = dyn Fn(Value, &[Value]) -> Value + Send + Sync;

/// ID the host stages when it has lost track of the module. Never assigned.
pub const DEADLOCK_ID: u32 = 0;

struct Registry {
    funcs: BTreeMap<u32, Arc<Callback>>,
    // IDs whose module-side wrapper handle is still alive. The host may call
    // such a wrapper after its callback is released, so the ID stays taken.
    leased: BTreeSet<u32>,
    next_id: u32,
}

impl Registry {
    const fn new() -> Self {
        Self {
            funcs: BTreeMap::new(),
            leased: BTreeSet::new(),
            next_id: DEADLOCK_ID + 1,
        }
    }

    fn in_use(&self, id: u32) -> bool {
        self.funcs.contains_key(&id) || self.leased.contains(&id)
    }

    /// Next sequential ID, skipping the sentinel and, once the counter
    /// wraps, any ID still registered or still held by a wrapper.
    ///
    /// # Panics
    /// If every ID is in use.
    fn allocate_id(&mut self) -> u32 {
        let start = self.next_id;
        loop {
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);
            if id != DEADLOCK_ID && !self.in_use(id) {
                return id;
            }
            if self.next_id == start {
                panic!("callback ids exhausted");
            }
        }
    }
}

static REGISTRY: Mutex<Registry> = Mutex::new(Registry::new());

/// Register `callback` and lease its ID until `end_lease`.
pub(crate) fn register(callback: Arc<Callback>) -> u32 {
    let id = {
        let mut registry = REGISTRY.lock();
        let id = registry.allocate_id();
        registry.funcs.insert(id, callback);
        registry.leased.insert(id);
        id
    };
    tracing::debug!(id, "registered callback");
    id
}

pub(crate) fn unregister(id: u32) -> bool {
    let removed = REGISTRY.lock().funcs.remove(&id);
    tracing::debug!(id, removed = removed.is_some(), "released callback");
    // Dropped outside the lock: the callback may own values whose release
    // crosses the boundary.
    removed.is_some()
}

/// The module dropped its last handle to the wrapper for `id`. The ID can be
/// reused once its callback is released as well.
pub(crate) fn end_lease(id: u32) {
    REGISTRY.lock().leased.remove(&id);
}

/// Whether a module-side wrapper for `id` is still alive.
pub(crate) fn is_leased(id: u32) -> bool {
    REGISTRY.lock().leased.contains(&id)
}

fn lookup(id: u32) -> Option<Arc<Callback>> {
    REGISTRY.lock().funcs.get(&id).cloned()
}

/// Whether `id` currently names a registered callback.
pub fn is_registered(id: u32) -> bool {
    REGISTRY.lock().funcs.contains_key(&id)
}

/// The host's entry point into the module.
///
/// Reads the staged descriptor (`id`, `this`, `args`), runs the callback and
/// stores its return value as `result`. A released or malformed ID is
/// reported and the call is dropped. The deadlock sentinel parks the calling
/// thread forever: the host and module disagree about the call state, and
/// returning would let the module run on top of it.
///
/// The boundary lock is held for the whole call, so no other module thread
/// crosses while the callback runs.
pub fn handle_event() {
    let entry = boundary::enter();
    let transport = host();
    let pending = Value::from_reference_on(transport.take_pending_event(), &transport);
    let Some(event) = Object::of(pending) else {
        return;
    };

    let raw = event.get("id");
    let id = match raw.float() {
        Ok(id) if id == 0.0 => {
            drop(event);
            drop(entry);
            deadlock();
        }
        Ok(id) => match callback_id(id) {
            Some(id) => id,
            None => {
                tracing::error!(id, "pending event has an invalid id");
                return;
            }
        },
        Err(err) => {
            tracing::error!(%err, "pending event has no numeric id");
            return;
        }
    };

    let Some(callback) = lookup(id) else {
        tracing::error!(id, "call to released function");
        return;
    };

    let this = event.get("this");
    let args: Vec<Value> = match Object::of(event.get("args")) {
        Some(list) => (0..list.length()).map(|i| list.index(i)).collect(),
        None => Vec::new(),
    };
    tracing::trace!(id, argc = args.len(), "dispatching host call");

    let result = callback(this, &args);
    event.set("result", result);
}

/// A staged id names a callback only if it is an integer in `1..=u32::MAX`.
fn callback_id(raw: f64) -> Option<u32> {
    let in_range = raw.fract() == 0.0 && (1.0..=u32::MAX as f64).contains(&raw);
    in_range.then_some(raw as u32)
}

fn deadlock() -> ! {
    tracing::error!("host signalled a deadlock, parking forever");
    loop {
        std::thread::park();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::{Function, global};
    use crate::runtime::install;
    use crate::sim::{HostValue, SimulatedHost};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_wrapped_function_is_called_by_host() {
        let host = SimulatedHost::new();
        let _guard = install(host.clone());

        let double = Function::wrap(|_, args| {
            let n = args.first().and_then(|a| a.float().ok()).unwrap_or(0.0);
            Value::from(n * 2.0)
        });
        let result = double.invoke(&[Value::from(21)]).unwrap();
        assert_eq!(result.int().unwrap(), 42);
        double.release();
    }

    #[test]
    fn test_callback_sees_this() {
        let host = SimulatedHost::new();
        let _guard = install(host.clone());

        let read_tag = Function::wrap(|this, _| this.get("tag").unwrap_or_default());
        let receiver = global::object_constructor().unwrap().construct(&[]).unwrap();
        receiver.set("tag", "mine").unwrap();

        assert_eq!(read_tag.call_with(&receiver, &[]).unwrap().to_string(), "mine");
        read_tag.release();
    }

    #[test]
    fn test_released_function_is_not_run() {
        let host = SimulatedHost::new();
        let _guard = install(host.clone());

        let ran = Arc::new(AtomicBool::new(false));
        let f = {
            let ran = ran.clone();
            Function::wrap(move |_, _| {
                ran.store(true, Ordering::SeqCst);
                Value::TRUE
            })
        };
        let id = f.id().unwrap();
        f.release();
        assert!(!is_registered(id));

        // The host still holds the wrapper and calls it.
        let result = host.dispatch(id, HostValue::Undefined, &[]);
        assert_eq!(result, HostValue::Undefined);
        assert!(!ran.load(Ordering::SeqCst));

        // Releasing twice is harmless.
        f.release();
    }

    #[test]
    fn test_ids_are_sequential_and_never_zero() {
        let host = SimulatedHost::new();
        let _guard = install(host.clone());

        let a = Function::wrap(|_, _| Value::UNDEFINED);
        let b = Function::wrap(|_, _| Value::UNDEFINED);
        let (a_id, b_id) = (a.id().unwrap(), b.id().unwrap());
        assert_ne!(a_id, DEADLOCK_ID);
        assert_ne!(b_id, DEADLOCK_ID);
        // Other tests register concurrently, so only the order is fixed.
        assert!(b_id > a_id);
        a.release();
        b.release();
    }

    #[test]
    fn test_allocate_id_skips_live_ids_after_wrap() {
        let mut registry = Registry::new();
        let noop: Arc<Callback> = Arc::new(|_, _| Value::UNDEFINED);
        registry.funcs.insert(1, noop.clone());
        registry.next_id = u32::MAX;

        assert_eq!(registry.allocate_id(), u32::MAX);
        // Wraps past the sentinel and the live ID 1.
        assert_eq!(registry.allocate_id(), 2);
    }

    #[test]
    fn test_allocate_id_skips_leased_ids_after_wrap() {
        let mut registry = Registry::new();
        // Callback released, wrapper still held by the module.
        registry.leased.insert(1);
        registry.next_id = u32::MAX;

        assert_eq!(registry.allocate_id(), u32::MAX);
        assert_eq!(registry.allocate_id(), 2);
    }

    #[test]
    fn test_released_id_stays_leased_while_wrapper_lives() {
        let host = SimulatedHost::new();
        let _guard = install(host.clone());

        let f = Function::wrap(|_, _| Value::UNDEFINED);
        let id = f.id().unwrap();
        let kept = f.value().clone();
        f.release();
        assert!(!is_registered(id));
        assert!(is_leased(id));

        drop(f);
        assert!(is_leased(id));
        drop(kept);
        assert!(!is_leased(id));
    }

    #[test]
    fn test_malformed_ids_are_dropped() {
        let host = SimulatedHost::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = std::sync::mpsc::channel();
        let worker = {
            let host = host.clone();
            let ran = ran.clone();
            std::thread::spawn(move || {
                let _guard = install(host.clone());
                let f = {
                    let ran = ran.clone();
                    Function::wrap(move |_, _| {
                        ran.fetch_add(1, Ordering::SeqCst);
                        Value::TRUE
                    })
                };
                for id in [f64::NAN, -1.0, 1.5, f64::INFINITY, 4294967296.0] {
                    let result =
                        host.enter_module(HostValue::Number(id), HostValue::Undefined, &[]);
                    let _ = tx.send(result);
                }
                let result = host.enter_module(
                    HostValue::Bool(true),
                    HostValue::Undefined,
                    &[],
                );
                let _ = tx.send(result);
                f.release();
            })
        };

        // None of them may be mistaken for the deadlock sentinel.
        for _ in 0..6 {
            let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(result, HostValue::Undefined);
        }
        worker.join().unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_callback_id_range() {
        assert_eq!(callback_id(1.0), Some(1));
        assert_eq!(callback_id(u32::MAX as f64), Some(u32::MAX));
        assert_eq!(callback_id(0.5), None);
        assert_eq!(callback_id(-3.0), None);
        assert_eq!(callback_id(f64::NAN), None);
    }

    #[test]
    fn test_concurrent_registration_yields_distinct_ids() {
        let host = SimulatedHost::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let host = host.clone();
                let counter = counter.clone();
                std::thread::spawn(move || {
                    let _guard = install(host);
                    let mut ids = Vec::new();
                    for _ in 0..50 {
                        if fastrand::bool() {
                            std::thread::yield_now();
                        }
                        let counter = counter.clone();
                        let f = Function::wrap(move |_, _| {
                            counter.fetch_add(1, Ordering::SeqCst);
                            Value::UNDEFINED
                        });
                        ids.push(f.id().unwrap());
                        f.release();
                    }
                    ids
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "id {} assigned twice", id);
            }
        }
        assert_eq!(seen.len(), 100);
    }

    #[test]
    fn test_reentrant_callbacks() {
        let host = SimulatedHost::new();
        // callTwice(f) calls f twice from inside one host call.
        host.define_function("callTwice", |host, _, args| {
            let f = args.first().copied().unwrap_or(HostValue::Undefined);
            let first = host.call_function(f, HostValue::Undefined, &[HostValue::Number(1.0)])?;
            let second = host.call_function(f, HostValue::Undefined, &[first])?;
            Ok(second)
        });
        let _guard = install(host.clone());

        // The callback itself crosses back into the host, and registers a
        // new function while the registry is in use by the outer dispatch.
        let step = Function::wrap(|_, args| {
            let n = args.first().and_then(|a| a.float().ok()).unwrap_or(0.0);
            let inner = Function::wrap(|_, _| Value::UNDEFINED);
            inner.release();
            let boxed = crate::value_of(&vec![n]).unwrap();
            Value::from(boxed.index(0).unwrap().float().unwrap() + 10.0)
        });

        let out = global::global()
            .call("callTwice", &[step.value().clone()])
            .unwrap();
        assert_eq!(out.float().unwrap(), 21.0);
        step.release();
    }

    #[test]
    fn test_blocking_work_is_handed_off() {
        let host = SimulatedHost::new();
        let _guard = install(host.clone());

        let (tx, rx) = std::sync::mpsc::channel();
        let start_slow_work = Function::wrap(move |_, _| {
            let tx = tx.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                let _ = tx.send("done");
            });
            Value::UNDEFINED
        });

        start_slow_work.invoke(&[]).unwrap();
        // The host got control back before the work finished.
        assert!(rx.try_recv().is_err());
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "done");
        start_slow_work.release();
    }

    #[test]
    fn test_deadlock_sentinel_parks() {
        let host = SimulatedHost::new();
        let parked = {
            let host = host.clone();
            std::thread::spawn(move || {
                let _guard = install(host.clone());
                host.dispatch(DEADLOCK_ID, HostValue::Undefined, &[]);
            })
        };
        std::thread::sleep(Duration::from_millis(100));
        assert!(!parked.is_finished());
        // The thread is left parked; the process exits around it.
    }

    #[test]
    fn test_no_pending_event_is_a_noop() {
        let host = SimulatedHost::new();
        let _guard = install(host.clone());
        handle_event();
    }
}
