//! Typed views over `Value`
//!
//! Each facade holds the same reference as the value it was narrowed from
//! and adds the operations that make sense for that kind of host value.
//! They are thin clients of the bridge: everything goes through get, set,
//! call and construct.

pub(crate) mod bigint;
mod boolean;
mod function;
pub mod global;
mod object;
mod reflect;
mod string;
mod symbol;
mod uint8_array;

pub use bigint::BigInt;
pub use boolean::Boolean;
pub use function::Function;
pub use global::global;
pub use object::Object;
pub use reflect::Reflect;
pub use string::JsString;
pub use symbol::Symbol;
pub use uint8_array::Uint8Array;

/// Conversions shared by every facade: back into a plain `Value`, and use as
/// a call argument.
macro_rules! value_facade {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for crate::value::Value {
                fn from(facade: $ty) -> Self {
                    facade.into_value()
                }
            }

            impl From<&$ty> for crate::value::Value {
                fn from(facade: &$ty) -> Self {
                    facade.value().clone()
                }
            }

            impl AsRef<crate::value::Value> for $ty {
                fn as_ref(&self) -> &crate::value::Value {
                    self.value()
                }
            }

            impl crate::value::ToValue for $ty {
                fn to_value(&self) -> crate::error::Result<crate::value::Value> {
                    Ok(self.value().clone())
                }
            }
        )*
    };
}

value_facade!(BigInt, Boolean, Function, JsString, Object, Reflect, Symbol, Uint8Array);
