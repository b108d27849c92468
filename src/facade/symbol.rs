use crate::value::{Type, Value};
use std::fmt;

/// A host symbol.
#[derive(Clone)]
pub struct Symbol {
    value: Value,
}

impl Symbol {
    /// Narrow `value` to a symbol. Returns None unless its type is symbol.
    pub fn of(value: impl Into<Value>) -> Option<Self> {
        let value = value.into();
        (value.type_of() == Type::Symbol).then_some(Self { value })
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Symbol").field(&self.value.reference()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::global;
    use crate::runtime::install;
    use crate::sim::SimulatedHost;

    #[test]
    fn test_of() {
        let host = SimulatedHost::new();
        let _guard = install(host.clone());

        let symbol = global::global().call("Symbol", &[Value::from("id")]).unwrap();
        let narrowed = Symbol::of(symbol.clone()).unwrap();
        assert!(narrowed.value().equal(&symbol));
        assert_eq!(narrowed.value().to_string(), "<symbol>");

        assert!(Symbol::of(Value::from("id")).is_none());
        assert!(Symbol::of(Value::GLOBAL).is_none());
    }
}
