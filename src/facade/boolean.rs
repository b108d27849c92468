use crate::value::{Type, Value};
use std::fmt;

/// A host boolean. Never crosses the boundary.
#[derive(Clone)]
pub struct Boolean {
    value: Value,
}

impl Boolean {
    pub const TRUE: Boolean = Boolean { value: Value::TRUE };
    pub const FALSE: Boolean = Boolean {
        value: Value::FALSE,
    };

    pub fn new(b: bool) -> Self {
        if b { Self::TRUE } else { Self::FALSE }
    }

    /// Narrow `value` to a boolean. Returns None unless its type is boolean.
    pub fn of(value: impl Into<Value>) -> Option<Self> {
        let value = value.into();
        (value.type_of() == Type::Boolean).then_some(Self { value })
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn bool(&self) -> bool {
        self.value.equal(&Value::TRUE)
    }
}

impl From<bool> for Boolean {
    fn from(b: bool) -> Self {
        Self::new(b)
    }
}

impl fmt::Debug for Boolean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Boolean({})", self.bool())
    }
}
