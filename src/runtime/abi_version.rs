//! Boundary protocol version
//!
//! Bump `ABI_VERSION` whenever the reference layout, the reserved indices or
//! the set of imported host functions change. The host glue checks it before
//! instantiating the module.

/// Current version of the reference encoding and import set.
pub const ABI_VERSION: u32 = 1;

/// Name of the protocol, also used as the wasm import module.
pub const ABI_NAME: &str = "hostbridge";

/// Exported as a global so the host glue can read it without a call.
#[unsafe(no_mangle)]
pub static HOSTBRIDGE_ABI_VERSION: u32 = ABI_VERSION;
