//! Calls into the host
//!
//! Every call is exactly one `invoke` or `construct` crossing, preceded by
//! at most one property lookup when a method has to be resolved by name.
//! Nothing is retried: host calls have side effects, and a retry after an
//! ambiguous failure could run them twice.

use crate::error::{Error, Result};
use crate::facade::{Function, Object};
use crate::runtime::{Reference, Transport};
use crate::value::Value;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Resolved methods by name, shared between clones of an `Object`.
pub(crate) type MethodCache = Arc<Mutex<HashMap<String, Function>>>;

/// An error object thrown by the host.
#[derive(Clone)]
pub struct JsError {
    object: Object,
}

impl JsError {
    /// The thrown object.
    pub fn object(&self) -> &Object {
        &self.object
    }

    /// The thrown object's `message` property.
    pub fn message(&self) -> String {
        self.object.get("message").to_string()
    }
}

impl fmt::Display for JsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host error: {}", self.message())
    }
}

impl fmt::Debug for JsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsError")
            .field("object", &self.object)
            .finish()
    }
}

impl std::error::Error for JsError {}

/// Resolve `method` on `receiver` and call it with `receiver` as `this`.
///
/// The receiver's type is the caller's responsibility.
pub(crate) fn call_method(
    receiver: &Value,
    method: &str,
    cache: Option<&MethodCache>,
    args: &[Value],
) -> Result<Value> {
    let callee = resolve(receiver, method, cache)?;
    invoke(receiver.reference(), callee.value(), args)
}

fn resolve(receiver: &Value, method: &str, cache: Option<&MethodCache>) -> Result<Function> {
    if let Some(cache) = cache {
        let cached = cache.lock().get(method).cloned();
        if let Some(function) = cached {
            return Ok(function);
        }
    }

    let function =
        Function::of(receiver.load(method)).ok_or_else(|| Error::no_such_method(method))?;

    if let Some(cache) = cache {
        cache.lock().insert(method.to_owned(), function.clone());
    }
    Ok(function)
}

/// `callee.apply(this, args)`
///
/// `args` stay borrowed, and therefore alive, until the host has returned.
pub(crate) fn invoke(this: Reference, callee: &Value, args: &[Value]) -> Result<Value> {
    let transport = callee.transport();
    let refs = marshal(args);
    tracing::trace!(callee = ?callee.reference(), argc = refs.len(), "invoke");
    let outcome = transport.invoke(this, callee.reference(), &refs);
    complete(&transport, outcome)
}

/// `new callee(...args)`
pub(crate) fn construct(callee: &Value, args: &[Value]) -> Result<Value> {
    let transport = callee.transport();
    let refs = marshal(args);
    tracing::trace!(callee = ?callee.reference(), argc = refs.len(), "construct");
    let outcome = transport.construct(callee.reference(), &refs);
    complete(&transport, outcome)
}

fn marshal(args: &[Value]) -> Vec<Reference> {
    args.iter().map(Value::reference).collect()
}

/// Adopt the result of a call and turn a failure into `Error::Thrown`.
///
/// # Panics
/// If the host reports a failure whose value is not an object: a host only
/// throws objects, so this means the transport itself is broken.
fn complete(transport: &Arc<dyn Transport>, (result, ok): (Reference, bool)) -> Result<Value> {
    let value = Value::from_reference_on(result, transport);
    if ok {
        return Ok(value);
    }
    match Object::of(value) {
        Some(object) => {
            tracing::debug!(thrown = ?object.value().reference(), "host call threw");
            Err(Error::Thrown(JsError { object }))
        }
        None => panic!("host threw a non-object value"),
    }
}
