//! Value bridge between a compiled module and its scripting host
//!
//! Host values cross the boundary as NaN-boxed 64-bit references. The module
//! holds them as `Value`s, whose lifetime drives release of the host's table
//! slots, and operates on them through a small set of crossings: property
//! access, calls and construction. Module functions are exposed to the host
//! with `Function::wrap` and re-entered through `callback::handle_event`.
//!
//! On `wasm32` the crossings are raw imports from the `hostbridge` module.
//! Elsewhere a `Transport` must be installed per thread, typically the
//! in-process `sim::SimulatedHost`.

pub mod call;
pub mod callback;
pub mod error;
pub mod facade;
pub mod runtime;
pub mod sim;
pub mod value;

pub use call::JsError;
pub use error::{Error, Result};
pub use facade::{
    BigInt, Boolean, Function, JsString, Object, Reflect, Symbol, Uint8Array, global,
};
pub use runtime::{Reference, Transport, install};
pub use value::{ToValue, Type, Value, value_of};
