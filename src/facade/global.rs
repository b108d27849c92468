//! The host's global object and the constructors the bridge relies on

use super::{Function, Object};
use crate::error::{Error, Result};
use crate::value::Value;

/// The host's global object.
pub fn global() -> Object {
    Object::from_value_unchecked(Value::GLOBAL)
}

/// `global[name]` as a function.
///
/// Fails with `Error::NoSuchMethod` if the global is missing or not callable.
pub fn constructor(name: &str) -> Result<Function> {
    Function::of(global().get(name)).ok_or_else(|| Error::no_such_method(name))
}

/// `Object`
pub fn object_constructor() -> Result<Function> {
    constructor("Object")
}

/// `Array`
pub fn array_constructor() -> Result<Function> {
    constructor("Array")
}

/// `Uint8Array`
pub fn uint8_array_constructor() -> Result<Function> {
    constructor("Uint8Array")
}

/// `BigInt`
pub fn bigint_constructor() -> Result<Function> {
    constructor("BigInt")
}

/// `String`
pub fn string_constructor() -> Result<Function> {
    constructor("String")
}

/// `Error`
pub fn error_constructor() -> Result<Function> {
    constructor("Error")
}
