use super::Function;
use crate::call::{self, MethodCache};
use crate::error::Result;
use crate::value::Value;
use std::fmt;

/// A host object or function.
///
/// Methods resolved by `call` are cached by name. The cache is shared
/// between clones and only saves the property lookup on repeated calls.
#[derive(Clone)]
pub struct Object {
    value: Value,
    methods: MethodCache,
}

impl Object {
    /// Narrow `value` to an object. Returns None unless its type is object
    /// or function.
    pub fn of(value: impl Into<Value>) -> Option<Self> {
        let value = value.into();
        value
            .type_of()
            .is_object()
            .then(|| Self::from_value_unchecked(value))
    }

    pub(crate) fn from_value_unchecked(value: Value) -> Self {
        Self {
            value,
            methods: MethodCache::default(),
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// `self[property]`
    pub fn get(&self, property: &str) -> Value {
        self.value.load(property)
    }

    /// `self[property] = value`
    pub fn set(&self, property: &str, value: impl Into<Value>) {
        self.value.store(property, &value.into());
    }

    /// `delete self[property]`
    pub fn delete(&self, property: &str) {
        self.value.remove(property);
    }

    /// `self[index]`
    pub fn index(&self, index: usize) -> Value {
        self.value.load_index(index)
    }

    /// `self[index] = value`
    pub fn set_index(&self, index: usize, value: impl Into<Value>) {
        self.value.store_index(index, &value.into());
    }

    /// `self.length`
    pub fn length(&self) -> usize {
        self.value.host_length()
    }

    /// `self instanceof constructor`
    pub fn instance_of(&self, constructor: &Function) -> bool {
        self.value.instance_of(constructor.value())
    }

    /// Call method `method` with `self` as the receiver.
    ///
    /// Fails with `Error::NoSuchMethod` if the property is missing or not a
    /// function, and with `Error::Thrown` if the host throws.
    pub fn call(&self, method: &str, args: &[Value]) -> Result<Value> {
        call::call_method(&self.value, method, Some(&self.methods), args)
    }

    /// `self.hasOwnProperty(property)`
    pub fn has_own_property(&self, property: &str) -> Result<bool> {
        self.call("hasOwnProperty", &[Value::from(property)])?
            .bool()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Object").field(&self.value.reference()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::facade::global;
    use crate::runtime::install;
    use crate::sim::SimulatedHost;

    #[test]
    fn test_of_rejects_non_objects() {
        let host = SimulatedHost::new();
        let _guard = install(host.clone());

        assert!(Object::of(Value::number(1.0)).is_none());
        assert!(Object::of(Value::NULL).is_none());
        assert!(Object::of(Value::from("str")).is_none());
        assert!(Object::of(Value::GLOBAL).is_some());
        assert!(Object::of(global::object_constructor().unwrap()).is_some());
    }

    #[test]
    fn test_missing_method() {
        let host = SimulatedHost::new();
        let _guard = install(host.clone());
        let object = Object::of(
            global::object_constructor()
                .unwrap()
                .construct(&[])
                .unwrap(),
        )
        .unwrap();
        object.set("notCallable", 3);

        let before = host.crossings();
        let err = object.call("frobnicate", &[]).unwrap_err();
        assert!(matches!(&err, Error::NoSuchMethod { method } if method == "frobnicate"));
        assert_eq!(err.to_string(), "no such method frobnicate");
        // Only the property lookup crossed.
        assert_eq!(host.crossings(), before + 1);

        assert!(matches!(
            object.call("notCallable", &[]),
            Err(Error::NoSuchMethod { .. })
        ));
    }

    #[test]
    fn test_method_cache_skips_lookup() {
        let host = SimulatedHost::new();
        let _guard = install(host.clone());
        let object = Object::of(
            global::object_constructor()
                .unwrap()
                .construct(&[])
                .unwrap(),
        )
        .unwrap();
        object.set("a", 1);
        let key = Value::from("a");

        let before = host.crossings();
        assert!(object.call("hasOwnProperty", &[key.clone()]).unwrap().bool().unwrap());
        let first = host.crossings() - before;

        let before = host.crossings();
        assert!(object.call("hasOwnProperty", &[key.clone()]).unwrap().bool().unwrap());
        let second = host.crossings() - before;

        assert_eq!(first, 2, "lookup + invoke");
        assert_eq!(second, 1, "invoke only");
    }

    #[test]
    fn test_has_own_property() {
        let host = SimulatedHost::new();
        let _guard = install(host.clone());
        let object = Object::of(
            global::object_constructor()
                .unwrap()
                .construct(&[])
                .unwrap(),
        )
        .unwrap();
        object.set("present", true);

        assert!(object.has_own_property("present").unwrap());
        assert!(!object.has_own_property("absent").unwrap());
        // Inherited members are not own properties.
        assert!(!object.has_own_property("hasOwnProperty").unwrap());
    }

    #[test]
    fn test_index_and_length() {
        let host = SimulatedHost::new();
        let _guard = install(host.clone());
        let array = Object::of(
            global::array_constructor()
                .unwrap()
                .construct(&[Value::from(2)])
                .unwrap(),
        )
        .unwrap();

        array.set_index(0, "x");
        array.set_index(1, 9);
        array.set_index(2, false);
        assert_eq!(array.length(), 3);
        assert_eq!(array.index(0).to_string(), "x");
        assert_eq!(array.index(1).int().unwrap(), 9);
        assert!(array.index(7).is_undefined());
    }
}
