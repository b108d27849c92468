use super::{Object, global};
use crate::error::{Error, Result};
use crate::value::Value;
use std::fmt;

/// The host's `Reflect` namespace.
#[derive(Clone)]
pub struct Reflect {
    object: Object,
}

impl Reflect {
    /// Look up `global.Reflect`.
    pub fn new() -> Result<Self> {
        let object =
            Object::of(global().get("Reflect")).ok_or_else(|| Error::no_such_method("Reflect"))?;
        Ok(Self { object })
    }

    pub(crate) fn from_object(object: Object) -> Self {
        Self { object }
    }

    pub fn value(&self) -> &Value {
        self.object.value()
    }

    pub fn into_value(self) -> Value {
        self.object.into_value()
    }

    /// `Reflect.constructor(target)`: the object wrapper of `target`, with
    /// its constructor reachable under `"constructor"`.
    pub fn constructor(&self, target: &Value) -> Result<Object> {
        let wrapped = self.object.call("constructor", std::slice::from_ref(target))?;
        let ty = wrapped.type_of();
        Object::of(wrapped).ok_or_else(|| Error::wrong_type("Reflect.constructor", ty))
    }

    /// `Reflect.get(target, property)`
    pub fn get(&self, target: &Object, property: &str) -> Result<Value> {
        self.get_key(target, &Value::from(property))
    }

    /// `Reflect.get(target, key)` with a key already on the host.
    pub(crate) fn get_key(&self, target: &Object, key: &Value) -> Result<Value> {
        self.object
            .call("get", &[target.value().clone(), key.clone()])
    }
}

impl fmt::Debug for Reflect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Reflect")
    }
}
