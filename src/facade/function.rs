use super::Object;
use crate::call;
use crate::callback::{self, Callback};
use crate::error::Result;
use crate::runtime::{Reference, host};
use crate::value::{Type, Value};
use std::fmt;
use std::sync::Arc;

/// A host function, possibly one that wraps a module callback.
#[derive(Clone)]
pub struct Function {
    value: Value,
    id: Option<u32>,
}

impl Function {
    /// Narrow `value` to a function. Returns None unless its type is
    /// function.
    pub fn of(value: impl Into<Value>) -> Option<Self> {
        let value = value.into();
        (value.type_of() == Type::Function).then_some(Self { value, id: None })
    }

    /// Expose `f` to the host as a callable function.
    ///
    /// `f` receives the host's `this` and the call arguments; its return
    /// value becomes the result of the host call.
    ///
    /// The host is blocked for as long as `f` runs, including any callbacks
    /// it would otherwise deliver. A callback that needs to wait on I/O, a
    /// lock held elsewhere, or anything the host has to make progress on
    /// must hand that work to a separately scheduled thread and return
    /// immediately; blocking inside `f` on such work deadlocks.
    ///
    /// Call `release` once the host will no longer invoke the function.
    pub fn wrap<F>(f: F) -> Self
    where
        F: Fn(Value, &[Value]) -> Value + Send + Sync + 'static,
    {
        let callback: Arc<Callback> = Arc::new(f);
        let id = callback::register(callback);
        let transport = host();
        let wrapper = transport.make_wrapper(id);
        Self {
            value: Value::wrapper_on(wrapper, &transport, id),
            id: Some(id),
        }
    }

    /// Stop serving host calls to this wrapper. Later calls from the host
    /// are reported and ignored. Safe to call while the function is running
    /// and more than once.
    ///
    /// The ID is not handed to another callback until every clone of this
    /// wrapper's value has been dropped as well.
    pub fn release(&self) {
        if let Some(id) = self.id {
            callback::unregister(id);
        }
    }

    /// The callback ID, for functions created by `wrap`.
    pub fn id(&self) -> Option<u32> {
        self.id
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// The function viewed as an object, for property access.
    pub fn as_object(&self) -> Object {
        Object::from_value_unchecked(self.value.clone())
    }

    /// Call the function with `this` undefined.
    pub fn invoke(&self, args: &[Value]) -> Result<Value> {
        call::invoke(Reference::UNDEFINED, &self.value, args)
    }

    /// Call the function with an explicit receiver.
    pub fn call_with(&self, this: &Value, args: &[Value]) -> Result<Value> {
        call::invoke(this.reference(), &self.value, args)
    }

    /// `new self(...args)`
    pub fn construct(&self, args: &[Value]) -> Result<Value> {
        call::construct(&self.value, args)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("reference", &self.value.reference())
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::facade::global;
    use crate::runtime::install;
    use crate::sim::{HostValue, SimulatedHost};

    #[test]
    fn test_of() {
        let host = SimulatedHost::new();
        let _guard = install(host.clone());

        assert!(Function::of(Value::GLOBAL).is_none());
        assert!(Function::of(Value::number(3.0)).is_none());
        assert!(Function::of(global::global().get("Array")).is_some());
    }

    #[test]
    fn test_invoke_passes_arguments() {
        let host = SimulatedHost::new();
        host.define_function("add", |_, _, args| {
            let sum = args
                .iter()
                .map(|a| match a {
                    HostValue::Number(n) => *n,
                    _ => 0.0,
                })
                .sum();
            Ok(HostValue::Number(sum))
        });
        let _guard = install(host.clone());

        let add = Function::of(global::global().get("add")).unwrap();
        let sum = add
            .invoke(&[Value::from(1), Value::from(2), Value::from(3.5)])
            .unwrap();
        assert_eq!(sum.float().unwrap(), 6.5);
    }

    #[test]
    fn test_call_with_receiver() {
        let host = SimulatedHost::new();
        host.define_function("whoami", |host, this, _| {
            Ok(host.with_heap(|heap| heap.get_prop(this, "name")))
        });
        let _guard = install(host.clone());

        let me = global::object_constructor().unwrap().construct(&[]).unwrap();
        me.set("name", "receiver").unwrap();
        let whoami = Function::of(global::global().get("whoami")).unwrap();

        assert_eq!(whoami.call_with(&me, &[]).unwrap().to_string(), "receiver");
        assert!(whoami.invoke(&[]).unwrap().is_undefined());
    }

    #[test]
    fn test_thrown_error_message() {
        let host = SimulatedHost::new();
        host.define_function("explode", |host, _, _| {
            Err(host.with_heap(|heap| heap.new_error("boom")))
        });
        let _guard = install(host.clone());

        let explode = Function::of(global::global().get("explode")).unwrap();
        let before = host.crossings();
        let err = explode.invoke(&[]).unwrap_err();
        assert_eq!(host.crossings(), before + 1, "exactly one round trip");

        match &err {
            Error::Thrown(thrown) => assert_eq!(thrown.message(), "boom"),
            other => panic!("expected a thrown error, got {:?}", other),
        }
        assert_eq!(err.to_string(), "host error: boom");
    }

    #[test]
    #[should_panic(expected = "host threw a non-object value")]
    fn test_non_object_throw_is_fatal() {
        let host = SimulatedHost::new();
        host.define_function("throwNumber", |_, _, _| Err(HostValue::Number(1.0)));
        let _guard = install(host.clone());

        let f = Function::of(global::global().get("throwNumber")).unwrap();
        let _ = f.invoke(&[]);
    }

    #[test]
    fn test_construct() {
        let host = SimulatedHost::new();
        let _guard = install(host.clone());

        let error = global::error_constructor().unwrap();
        let instance = error.construct(&[Value::from("built")]).unwrap();
        assert_eq!(instance.get("message").unwrap().to_string(), "built");
        assert!(instance.instance_of(error.value()));
    }

    #[test]
    fn test_construct_failure() {
        let host = SimulatedHost::new();
        let _guard = install(host.clone());

        // Wrappers are plain functions, not constructors.
        let wrapped = Function::wrap(|_, _| Value::UNDEFINED);
        let err = wrapped.construct(&[]).unwrap_err();
        assert!(matches!(err, Error::Thrown(_)));
        wrapped.release();
    }
}
