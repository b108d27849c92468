use super::{Object, global};
use crate::error::{Error, Result};
use crate::value::Value;
use std::fmt;

/// A host `Uint8Array`, for bulk byte transfer.
#[derive(Clone)]
pub struct Uint8Array {
    object: Object,
}

impl Uint8Array {
    /// `new Uint8Array(len)`
    pub fn new(len: usize) -> Result<Self> {
        let created = global::uint8_array_constructor()?.construct(&[Value::from(len)])?;
        let ty = created.type_of();
        let object =
            Object::of(created).ok_or_else(|| Error::wrong_type("Uint8Array.new", ty))?;
        Ok(Self { object })
    }

    /// Narrow `value` to a byte array. Returns None unless it is an
    /// instance of `Uint8Array`.
    pub fn of(value: impl Into<Value>) -> Option<Self> {
        let object = Object::of(value)?;
        let ctor = global::uint8_array_constructor().ok()?;
        object.instance_of(&ctor).then_some(Self { object })
    }

    pub fn value(&self) -> &Value {
        self.object.value()
    }

    pub fn into_value(self) -> Value {
        self.object.into_value()
    }

    pub fn as_object(&self) -> &Object {
        &self.object
    }

    /// `self.length`
    pub fn length(&self) -> usize {
        self.object.length()
    }

    /// Copy bytes from the host array into `dst`, up to the shorter of the
    /// two lengths. Returns the number of bytes copied.
    pub fn copy_to_module(&self, dst: &mut [u8]) -> usize {
        let value = self.object.value();
        value
            .transport()
            .copy_bytes_to_module(dst, value.reference())
            .unwrap_or(0)
    }

    /// Copy `src` into the host array, up to the shorter of the two lengths.
    /// Returns the number of bytes copied.
    pub fn copy_to_host(&self, src: &[u8]) -> usize {
        let value = self.object.value();
        value
            .transport()
            .copy_bytes_to_host(value.reference(), src)
            .unwrap_or(0)
    }

    /// The whole array as a module-side vector.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.length()];
        let copied = self.copy_to_module(&mut bytes);
        bytes.truncate(copied);
        bytes
    }
}

impl fmt::Debug for Uint8Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Uint8Array")
            .field(&self.value().reference())
            .finish()
    }
}
