//! Module-side handles to host values
//!
//! A `Value` is a `Reference` plus, when the reference names a host table
//! slot, a shared lifetime tracker. Cloning a `Value` shares the tracker;
//! the slot is released when the last clone goes away.

pub mod convert;
pub(crate) mod tracker;

pub use convert::{ToValue, value_of};

use crate::error::{Error, Result};
use crate::facade::bigint;
use crate::runtime::{Reference, Transport, TypeFlag, host};
use std::fmt;
use std::sync::Arc;
use tracker::Tracker;

/// The host-side type of a value, as reported by `Value::type_of`.
///
/// Like the host's `typeof`, except that null has its own variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Symbol,
    Object,
    Function,
    BigInt,
}

impl Type {
    /// Objects and functions accept property and index operations.
    pub fn is_object(self) -> bool {
        matches!(self, Type::Object | Type::Function)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Type::Undefined => "undefined",
            Type::Null => "null",
            Type::Boolean => "boolean",
            Type::Number => "number",
            Type::String => "string",
            Type::Symbol => "symbol",
            Type::Object => "object",
            Type::Function => "function",
            Type::BigInt => "bigint",
        })
    }
}

/// A handle to a host value.
#[derive(Clone)]
pub struct Value {
    reference: Reference,
    tracker: Option<Arc<Tracker>>,
}

impl Value {
    pub const UNDEFINED: Value = Value::untracked(Reference::UNDEFINED);
    pub const NULL: Value = Value::untracked(Reference::NULL);
    pub const TRUE: Value = Value::untracked(Reference::TRUE);
    pub const FALSE: Value = Value::untracked(Reference::FALSE);
    pub const NAN: Value = Value::untracked(Reference::NAN);
    pub const ZERO: Value = Value::untracked(Reference::ZERO);
    pub const GLOBAL: Value = Value::untracked(Reference::GLOBAL);

    pub(crate) const fn untracked(reference: Reference) -> Self {
        Self {
            reference,
            tracker: None,
        }
    }

    /// Adopt a reference handed out by the current thread's host.
    ///
    /// If the reference names a host slot, the returned value owns one
    /// release of it.
    pub fn from_reference(reference: Reference) -> Self {
        if !reference.is_tracked() {
            return Self::untracked(reference);
        }
        Self::from_reference_on(reference, &host())
    }

    /// Adopt a reference handed out by `transport`.
    pub(crate) fn from_reference_on(reference: Reference, transport: &Arc<dyn Transport>) -> Self {
        Self {
            reference,
            tracker: Tracker::track(reference, transport),
        }
    }

    /// Adopt a wrapper reference handed out by `transport` for callback `id`.
    /// The ID stays leased until the last clone is dropped.
    pub(crate) fn wrapper_on(
        reference: Reference,
        transport: &Arc<dyn Transport>,
        id: u32,
    ) -> Self {
        Self {
            reference,
            tracker: Tracker::track_lease(reference, transport, id),
        }
    }

    /// A number value. Never crosses the boundary.
    pub fn number(n: f64) -> Self {
        Self::untracked(Reference::number(n))
    }

    /// The raw reference. Only valid while `self` is alive.
    pub fn reference(&self) -> Reference {
        self.reference
    }

    /// The transport this value belongs to: the one that produced it, or the
    /// thread's host for reserved references.
    pub(crate) fn transport(&self) -> Arc<dyn Transport> {
        match &self.tracker {
            Some(tracker) => tracker.transport().clone(),
            None => host(),
        }
    }

    // =========================================================================
    // Type Checking
    // =========================================================================

    /// The host type of this value.
    ///
    /// Only BigInt detection may cross the boundary: big integers carry no
    /// type flag of their own and are recognised by their constructor.
    ///
    /// # Panics
    /// If the reference carries a type flag with no meaning, which means the
    /// encoding shared with the host is broken.
    pub fn type_of(&self) -> Type {
        match self.reference {
            Reference::UNDEFINED => return Type::Undefined,
            Reference::NULL => return Type::Null,
            Reference::TRUE | Reference::FALSE => return Type::Boolean,
            _ => {}
        }
        if self.reference.is_number() {
            return Type::Number;
        }
        match self.reference.flag() {
            Some(TypeFlag::Object) => Type::Object,
            Some(TypeFlag::String) => Type::String,
            Some(TypeFlag::Symbol) => Type::Symbol,
            Some(TypeFlag::Function) => Type::Function,
            Some(TypeFlag::None) if bigint::is_bigint(self) => Type::BigInt,
            _ => panic!("invalid type flag: {}", self.reference.flag_bits()),
        }
    }

    pub fn is_undefined(&self) -> bool {
        self.reference == Reference::UNDEFINED
    }

    pub fn is_null(&self) -> bool {
        self.reference == Reference::NULL
    }

    pub fn is_nan(&self) -> bool {
        self.reference == Reference::NAN
    }

    pub fn is_number(&self) -> bool {
        self.reference.is_number()
    }

    fn require_object(&self, method: &'static str) -> Result<()> {
        let ty = self.type_of();
        if ty.is_object() {
            Ok(())
        } else {
            Err(Error::wrong_type(method, ty))
        }
    }

    // =========================================================================
    // Property Access
    // =========================================================================

    /// `self[property]`. Fails unless `self` is an object or function.
    pub fn get(&self, property: &str) -> Result<Value> {
        self.require_object("Value.get")?;
        Ok(self.load(property))
    }

    /// `self[property] = value`. Fails unless `self` is an object or function.
    pub fn set(&self, property: &str, value: impl Into<Value>) -> Result<()> {
        self.require_object("Value.set")?;
        self.store(property, &value.into());
        Ok(())
    }

    /// `delete self[property]`. Fails unless `self` is an object or function.
    pub fn delete(&self, property: &str) -> Result<()> {
        self.require_object("Value.delete")?;
        self.remove(property);
        Ok(())
    }

    /// `self[index]`. Fails unless `self` is an object or function.
    pub fn index(&self, index: usize) -> Result<Value> {
        self.require_object("Value.index")?;
        Ok(self.load_index(index))
    }

    /// `self[index] = value`. Fails unless `self` is an object or function.
    pub fn set_index(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        self.require_object("Value.set_index")?;
        self.store_index(index, &value.into());
        Ok(())
    }

    /// `self.length`. Fails unless `self` is an object or function.
    pub fn length(&self) -> Result<usize> {
        self.require_object("Value.length")?;
        Ok(self.host_length())
    }

    /// Call method `method` of `self`. Fails without crossing the boundary
    /// unless `self` is an object or function.
    pub fn call(&self, method: &str, args: &[Value]) -> Result<Value> {
        self.require_object("Value.call")?;
        crate::call::call_method(self, method, None, args)
    }

    /// `self instanceof constructor`
    pub fn instance_of(&self, constructor: &Value) -> bool {
        self.transport()
            .instance_of(self.reference, constructor.reference)
    }

    // Unchecked crossings, for facades that established the receiver type.

    pub(crate) fn load(&self, property: &str) -> Value {
        let transport = self.transport();
        let reference = transport.get(self.reference, property);
        Value::from_reference_on(reference, &transport)
    }

    pub(crate) fn store(&self, property: &str, value: &Value) {
        self.transport()
            .set(self.reference, property, value.reference);
    }

    pub(crate) fn remove(&self, property: &str) {
        self.transport().delete(self.reference, property);
    }

    pub(crate) fn load_index(&self, index: usize) -> Value {
        let transport = self.transport();
        let reference = transport.index(self.reference, index);
        Value::from_reference_on(reference, &transport)
    }

    pub(crate) fn store_index(&self, index: usize, value: &Value) {
        self.transport()
            .set_index(self.reference, index, value.reference);
    }

    pub(crate) fn host_length(&self) -> usize {
        self.transport().length(self.reference)
    }

    // =========================================================================
    // Coercions
    // =========================================================================

    /// The number carried by `self`.
    pub fn float(&self) -> Result<f64> {
        self.reference
            .as_number()
            .ok_or_else(|| Error::wrong_type("Value.float", self.type_of()))
    }

    /// The number carried by `self`, truncated toward zero.
    pub fn int(&self) -> Result<i64> {
        self.reference
            .as_number()
            .map(|n| n as i64)
            .ok_or_else(|| Error::wrong_type("Value.int", self.type_of()))
    }

    /// The boolean carried by `self`.
    pub fn bool(&self) -> Result<bool> {
        match self.reference {
            Reference::TRUE => Ok(true),
            Reference::FALSE => Ok(false),
            _ => Err(Error::wrong_type("Value.bool", self.type_of())),
        }
    }

    /// The host's notion of truthiness: `false`, `0`, `-0`, `NaN`, `""`,
    /// `0n`, `null` and `undefined` are falsy, everything else is truthy.
    pub fn truthy(&self) -> bool {
        match self.type_of() {
            Type::Undefined | Type::Null => false,
            Type::Boolean => self.reference == Reference::TRUE,
            Type::Number => self
                .reference
                .as_number()
                .is_some_and(|n| n != 0.0 && !n.is_nan()),
            Type::String => !self.load_string().is_empty(),
            Type::BigInt => self.load_string() != "0",
            Type::Symbol | Type::Object | Type::Function => true,
        }
    }

    /// Identity of the encoded references. NaN is never equal to itself.
    pub fn equal(&self, other: &Value) -> bool {
        self.reference == other.reference && self.reference != Reference::NAN
    }

    /// Render `self` on the host and copy the UTF-8 bytes back.
    fn load_string(&self) -> String {
        let transport = self.transport();
        let (prepared, len) = transport.prepare_string(self.reference);
        // Released when it goes out of scope.
        let prepared = Value::from_reference_on(prepared, &transport);
        let mut buf = vec![0u8; len];
        transport.load_string(prepared.reference, &mut buf);
        String::from_utf8(buf)
            .unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned())
    }
}

/// Strings render as their contents; every other type renders as `<type>`
/// or `<type: value>` so that a stray non-string is visible in output.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.type_of() {
            Type::String => f.write_str(&self.load_string()),
            Type::Undefined => f.write_str("<undefined>"),
            Type::Null => f.write_str("<null>"),
            Type::Boolean => write!(f, "<boolean: {}>", self.load_string()),
            Type::Number => write!(f, "<number: {}>", self.load_string()),
            Type::BigInt => write!(f, "<bigint: {}>", self.load_string()),
            Type::Symbol => f.write_str("<symbol>"),
            Type::Object => f.write_str("<object>"),
            Type::Function => f.write_str("<function>"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({:?})", self.reference)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equal(other)
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::global;
    use crate::runtime::install;
    use crate::sim::SimulatedHost;

    #[test]
    fn test_reserved_types() {
        assert_eq!(Value::UNDEFINED.type_of(), Type::Undefined);
        assert_eq!(Value::NULL.type_of(), Type::Null);
        assert_eq!(Value::TRUE.type_of(), Type::Boolean);
        assert_eq!(Value::FALSE.type_of(), Type::Boolean);
        assert_eq!(Value::NAN.type_of(), Type::Number);
        assert_eq!(Value::ZERO.type_of(), Type::Number);
        assert_eq!(Value::GLOBAL.type_of(), Type::Object);
        assert_eq!(Value::number(2.5).type_of(), Type::Number);
    }

    #[test]
    fn test_host_types() {
        let host = SimulatedHost::new();
        let _guard = install(host.clone());

        assert_eq!(Value::from("hi").type_of(), Type::String);
        let object = global::object_constructor().unwrap();
        assert_eq!(object.value().type_of(), Type::Function);
        let instance = object.construct(&[]).unwrap();
        assert_eq!(instance.type_of(), Type::Object);

        let symbol = global::global()
            .call("Symbol", &[Value::from("tag")])
            .unwrap();
        assert_eq!(symbol.type_of(), Type::Symbol);
        let big = global::global()
            .call("BigInt", &[Value::from(7)])
            .unwrap();
        assert_eq!(big.type_of(), Type::BigInt);
    }

    #[test]
    #[should_panic(expected = "invalid type flag: 6")]
    fn test_undefined_flag_panics() {
        let corrupt = Reference::from_bits(((crate::runtime::abi::NAN_HEAD as u64 | 6) << 32) | 9);
        Value::untracked(corrupt).type_of();
    }

    #[test]
    fn test_property_ops_require_object() {
        let host = SimulatedHost::new();
        let _guard = install(host.clone());
        let before = host.crossings();

        let n = Value::number(1.0);
        assert!(matches!(
            n.get("x"),
            Err(Error::WrongType {
                method: "Value.get",
                ty: Type::Number
            })
        ));
        assert!(matches!(n.set("x", 1), Err(Error::WrongType { .. })));
        assert!(matches!(n.delete("x"), Err(Error::WrongType { .. })));
        assert!(matches!(n.index(0), Err(Error::WrongType { .. })));
        assert!(matches!(n.set_index(0, 1), Err(Error::WrongType { .. })));
        assert!(matches!(
            Value::NULL.length(),
            Err(Error::WrongType {
                method: "Value.length",
                ty: Type::Null
            })
        ));
        assert!(matches!(
            Value::TRUE.call("toString", &[]),
            Err(Error::WrongType { .. })
        ));
        assert_eq!(host.crossings(), before);
    }

    #[test]
    fn test_wrong_type_message() {
        let err = Value::NULL.float().unwrap_err();
        assert_eq!(err.to_string(), "call of Value.float on null");
    }

    #[test]
    fn test_property_roundtrip() {
        let host = SimulatedHost::new();
        let _guard = install(host.clone());

        let object = global::object_constructor()
            .unwrap()
            .construct(&[])
            .unwrap();
        object.set("answer", 42).unwrap();
        assert_eq!(object.get("answer").unwrap().int().unwrap(), 42);

        object.delete("answer").unwrap();
        assert!(object.get("answer").unwrap().is_undefined());
    }

    #[test]
    fn test_truthy() {
        let host = SimulatedHost::new();
        let _guard = install(host.clone());

        assert!(!Value::UNDEFINED.truthy());
        assert!(!Value::NULL.truthy());
        assert!(!Value::FALSE.truthy());
        assert!(Value::TRUE.truthy());
        assert!(!Value::number(0.0).truthy());
        assert!(!Value::number(-0.0).truthy());
        assert!(!Value::number(f64::NAN).truthy());
        assert!(Value::number(-3.0).truthy());
        assert!(!Value::from("").truthy());
        assert!(Value::from("x").truthy());
        assert!(Value::GLOBAL.truthy());
        assert!(global::object_constructor().unwrap().value().truthy());

        let zero = global::global().call("BigInt", &[Value::from(0)]).unwrap();
        let one = global::global().call("BigInt", &[Value::from(1)]).unwrap();
        assert!(!zero.truthy());
        assert!(one.truthy());
    }

    #[test]
    fn test_equality() {
        assert!(Value::number(1.5).equal(&Value::number(1.5)));
        assert!(!Value::number(1.5).equal(&Value::number(2.5)));
        assert!(Value::NULL.equal(&Value::NULL));
        assert!(!Value::NULL.equal(&Value::UNDEFINED));
        assert!(!Value::NAN.equal(&Value::NAN));
        assert!(!Value::number(f64::NAN).equal(&Value::number(f64::NAN)));
        assert_ne!(Value::NAN, Value::NAN);
    }

    #[test]
    fn test_coercions() {
        assert_eq!(Value::number(2.75).float().unwrap(), 2.75);
        assert_eq!(Value::number(-2.75).int().unwrap(), -2);
        assert_eq!(Value::ZERO.float().unwrap(), 0.0);
        assert!(Value::TRUE.bool().unwrap());
        assert!(!Value::FALSE.bool().unwrap());
        assert!(matches!(
            Value::number(1.0).bool(),
            Err(Error::WrongType {
                method: "Value.bool",
                ..
            })
        ));
        assert!(matches!(
            Value::UNDEFINED.int(),
            Err(Error::WrongType {
                method: "Value.int",
                ty: Type::Undefined
            })
        ));
    }

    #[test]
    fn test_display() {
        let host = SimulatedHost::new();
        let _guard = install(host.clone());

        assert_eq!(Value::from("plain").to_string(), "plain");
        assert_eq!(Value::UNDEFINED.to_string(), "<undefined>");
        assert_eq!(Value::NULL.to_string(), "<null>");
        assert_eq!(Value::TRUE.to_string(), "<boolean: true>");
        assert_eq!(Value::number(1.5).to_string(), "<number: 1.5>");
        assert_eq!(Value::number(3.0).to_string(), "<number: 3>");
        assert_eq!(Value::GLOBAL.to_string(), "<object>");
    }

    #[test]
    fn test_string_staging_is_released() {
        let host = SimulatedHost::new();
        let _guard = install(host.clone());

        let s = Value::from("staged");
        let live = host.live_references();
        assert_eq!(s.to_string(), "staged");
        assert_eq!(host.live_references(), live);
    }
}
