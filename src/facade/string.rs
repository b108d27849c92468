use crate::call;
use crate::error::Result;
use crate::runtime::host;
use crate::value::{Type, Value};
use std::fmt;

/// A host string.
#[derive(Clone)]
pub struct JsString {
    value: Value,
}

impl JsString {
    /// Copy `s` into a new host string.
    pub fn new(s: &str) -> Self {
        let transport = host();
        let reference = transport.string_val(s);
        Self {
            value: Value::from_reference_on(reference, &transport),
        }
    }

    /// Narrow `value` to a string. Returns None unless its type is string.
    pub fn of(value: impl Into<Value>) -> Option<Self> {
        let value = value.into();
        (value.type_of() == Type::String).then_some(Self { value })
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// `self.indexOf(needle)`: the offset of the first occurrence, or -1.
    pub fn index_of(&self, needle: &JsString) -> Result<i64> {
        // Strings are not objects but still carry methods, so this skips the
        // receiver check `Value::call` would apply.
        call::call_method(&self.value, "indexOf", None, &[needle.value.clone()])?.int()
    }

    /// `self.length`
    pub fn length(&self) -> usize {
        self.value.host_length()
    }
}

impl fmt::Display for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.value, f)
    }
}

impl fmt::Debug for JsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JsString({:?})", self.to_string())
    }
}
