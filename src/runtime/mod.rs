//! Boundary kernel
//!
//! This module provides the low-level pieces every crossing goes through:
//! - Reference encoding shared with the host (abi.rs)
//! - The transport trait and the per-thread installed host (transport.rs)
//! - The lock that lets one thread at a time into the host (boundary.rs)
//! - Raw wasm imports and the exported re-entry point (stubs.rs)
//!
//! Everything above this layer (values, calls, callbacks) speaks only in
//! `Reference`s and `Transport` calls.

pub mod abi;
pub mod abi_version;
pub(crate) mod boundary;
#[cfg(target_arch = "wasm32")]
pub mod stubs;
pub mod transport;

pub use abi::{Decoded, Reference, TypeFlag};
pub use abi_version::ABI_VERSION;
pub use transport::{HostGuard, Transport, host, install};
