//! Conversion of module data into host values
//!
//! | Rust                              | Host                 |
//! | --------------------------------- | -------------------- |
//! | `Value` and facades               | itself               |
//! | `()`, `None`                      | null                 |
//! | `bool`                            | boolean              |
//! | integers and floats               | number               |
//! | `&str`, `String`                  | string               |
//! | `Vec<T>`, `[T]`                   | new array            |
//! | `HashMap<String, T>`, `BTreeMap`  | new object           |
//! | `serde_json::Value`               | any of the above     |
//!
//! Scalars convert infallibly through `From`. Containers allocate on the
//! host and go through `ToValue`, which can fail if the host throws.
//! Types outside this table do not implement the traits.

use super::Value;
use crate::error::Result;
use crate::facade::{JsString, global};
use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

/// Conversion into a host value.
pub trait ToValue {
    fn to_value(&self) -> Result<Value>;
}

/// Convert `x` into a host value.
pub fn value_of<T: ToValue + ?Sized>(x: &T) -> Result<Value> {
    x.to_value()
}

// =========================================================================
// Scalars
// =========================================================================

macro_rules! number_conversions {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::number(n as f64)
                }
            }

            impl ToValue for $ty {
                fn to_value(&self) -> Result<Value> {
                    Ok(Value::from(*self))
                }
            }
        )*
    };
}

number_conversions!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        if b { Value::TRUE } else { Value::FALSE }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::NULL
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        JsString::new(s).into_value()
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::from(s.as_str())
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::from(s.as_str())
    }
}

impl From<&Value> for Value {
    fn from(v: &Value) -> Self {
        v.clone()
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::NULL, Into::into)
    }
}

impl ToValue for Value {
    fn to_value(&self) -> Result<Value> {
        Ok(self.clone())
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Result<Value> {
        Ok(Value::from(*self))
    }
}

impl ToValue for () {
    fn to_value(&self) -> Result<Value> {
        Ok(Value::NULL)
    }
}

impl ToValue for str {
    fn to_value(&self) -> Result<Value> {
        Ok(Value::from(self))
    }
}

impl ToValue for String {
    fn to_value(&self) -> Result<Value> {
        Ok(Value::from(self.as_str()))
    }
}

impl<T: ToValue + ?Sized> ToValue for &T {
    fn to_value(&self) -> Result<Value> {
        (**self).to_value()
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Result<Value> {
        match self {
            Some(v) => v.to_value(),
            None => Ok(Value::NULL),
        }
    }
}

// =========================================================================
// Containers
// =========================================================================

impl<T: ToValue> ToValue for [T] {
    fn to_value(&self) -> Result<Value> {
        array_from(self.iter())
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Result<Value> {
        array_from(self.iter())
    }
}

impl<T: ToValue, S: BuildHasher> ToValue for HashMap<String, T, S> {
    fn to_value(&self) -> Result<Value> {
        object_from(self.iter())
    }
}

impl<T: ToValue> ToValue for BTreeMap<String, T> {
    fn to_value(&self) -> Result<Value> {
        object_from(self.iter())
    }
}

impl ToValue for serde_json::Value {
    fn to_value(&self) -> Result<Value> {
        use serde_json::Value as Json;
        match self {
            Json::Null => Ok(Value::NULL),
            Json::Bool(b) => Ok(Value::from(*b)),
            Json::Number(n) => Ok(Value::number(n.as_f64().unwrap_or(f64::NAN))),
            Json::String(s) => Ok(Value::from(s.as_str())),
            Json::Array(items) => array_from(items.iter()),
            Json::Object(entries) => object_from(entries.iter()),
        }
    }
}

/// `new Array(len)`, then filled index by index.
fn array_from<'a, T, I>(items: I) -> Result<Value>
where
    T: ToValue + 'a,
    I: ExactSizeIterator<Item = &'a T>,
{
    let array = global::array_constructor()?.construct(&[Value::from(items.len())])?;
    for (i, item) in items.enumerate() {
        array.set_index(i, item.to_value()?)?;
    }
    Ok(array)
}

/// `new Object()`, then filled key by key.
fn object_from<'a, T, I>(entries: I) -> Result<Value>
where
    T: ToValue + 'a,
    I: Iterator<Item = (&'a String, &'a T)>,
{
    let object = global::object_constructor()?.construct(&[])?;
    for (key, item) in entries {
        object.set(key, item.to_value()?)?;
    }
    Ok(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::install;
    use crate::sim::SimulatedHost;
    use crate::value::Type;
    use serde_json::json;

    #[test]
    fn test_scalars() {
        assert!(Value::from(true).equal(&Value::TRUE));
        assert!(Value::from(()).is_null());
        assert!(Value::from(None::<i32>).is_null());
        assert_eq!(Value::from(7u8).float().unwrap(), 7.0);
        assert_eq!(Value::from(-7i64).int().unwrap(), -7);
        assert_eq!(Value::from(0.0f32).reference(), Value::ZERO.reference());
        assert!(Value::from(f64::NAN).is_nan());
    }

    #[test]
    fn test_sequence_becomes_array() {
        let host = SimulatedHost::new();
        let _guard = install(host.clone());

        let array = value_of(&vec![1, 2, 3]).unwrap();
        assert_eq!(array.type_of(), Type::Object);
        assert_eq!(array.length().unwrap(), 3);
        assert_eq!(array.index(1).unwrap().float().unwrap(), 2.0);
        assert!(array.instance_of(global::array_constructor().unwrap().value()));
    }

    #[test]
    fn test_mapping_becomes_object() {
        let host = SimulatedHost::new();
        let _guard = install(host.clone());

        let mut map = BTreeMap::new();
        map.insert("name".to_string(), "bridge".to_string());
        map.insert("kind".to_string(), "test".to_string());
        let object = value_of(&map).unwrap();

        assert_eq!(object.type_of(), Type::Object);
        assert_eq!(object.get("name").unwrap().to_string(), "bridge");
        assert_eq!(object.get("kind").unwrap().to_string(), "test");
    }

    #[test]
    fn test_nested_json() {
        let host = SimulatedHost::new();
        let _guard = install(host.clone());

        let value = value_of(&json!({
            "id": 4,
            "tags": ["a", "b"],
            "enabled": true,
            "parent": null
        }))
        .unwrap();

        assert_eq!(value.get("id").unwrap().int().unwrap(), 4);
        assert!(value.get("enabled").unwrap().truthy());
        assert!(value.get("parent").unwrap().is_null());
        let tags = value.get("tags").unwrap();
        assert_eq!(tags.length().unwrap(), 2);
        assert_eq!(tags.index(1).unwrap().to_string(), "b");
    }
}
