//! Raw wasm imports and the exported re-entry point
//!
//! The host glue provides these functions under the `hostbridge` import
//! module. The calling convention is:
//! - All values passed as u64 (NaN-boxed Reference)
//! - Strings and byte buffers passed as (pointer, length) into module memory
//! - Success flags returned as u32 (0 = failure)
//! - Multi-value results written through an out pointer

use super::abi::Reference;
use super::transport::Transport;

#[link(wasm_import_module = "hostbridge")]
unsafe extern "C" {
    fn value_get(target: u64, property: *const u8, property_len: usize) -> u64;
    fn value_set(target: u64, property: *const u8, property_len: usize, value: u64);
    fn value_delete(target: u64, property: *const u8, property_len: usize);
    fn value_index(target: u64, index: usize) -> u64;
    fn value_set_index(target: u64, index: usize, value: u64);
    fn value_length(target: u64) -> usize;
    fn value_invoke(this: u64, callee: u64, argv: *const u64, argc: usize, out: *mut u64) -> u32;
    fn value_new(callee: u64, argv: *const u64, argc: usize, out: *mut u64) -> u32;
    fn value_instance_of(target: u64, constructor: u64) -> u32;
    fn string_val(data: *const u8, len: usize) -> u64;
    fn value_prepare_string(target: u64, out_len: *mut usize) -> u64;
    fn value_load_string(prepared: u64, buf: *mut u8, len: usize);
    fn copy_bytes_to_module(dst: *mut u8, len: usize, src: u64, out_copied: *mut usize) -> u32;
    fn copy_bytes_to_host(dst: u64, src: *const u8, len: usize, out_copied: *mut usize) -> u32;
    fn finalize_ref(target: u64);
    fn make_func_wrapper(id: u32) -> u64;
    fn take_pending_event() -> u64;
}

/// Transport over the raw imports. Stateless: the host owns the table.
pub struct WasmTransport;

// `Reference` is repr(transparent) over u64, so an argument slice can be
// handed to the host as-is.
fn argv(args: &[Reference]) -> *const u64 {
    args.as_ptr().cast::<u64>()
}

impl Transport for WasmTransport {
    fn get(&self, target: Reference, property: &str) -> Reference {
        let bits = unsafe { value_get(target.to_bits(), property.as_ptr(), property.len()) };
        Reference::from_bits(bits)
    }

    fn set(&self, target: Reference, property: &str, value: Reference) {
        unsafe {
            value_set(
                target.to_bits(),
                property.as_ptr(),
                property.len(),
                value.to_bits(),
            )
        }
    }

    fn delete(&self, target: Reference, property: &str) {
        unsafe { value_delete(target.to_bits(), property.as_ptr(), property.len()) }
    }

    fn index(&self, target: Reference, index: usize) -> Reference {
        Reference::from_bits(unsafe { value_index(target.to_bits(), index) })
    }

    fn set_index(&self, target: Reference, index: usize, value: Reference) {
        unsafe { value_set_index(target.to_bits(), index, value.to_bits()) }
    }

    fn length(&self, target: Reference) -> usize {
        unsafe { value_length(target.to_bits()) }
    }

    fn invoke(&self, this: Reference, callee: Reference, args: &[Reference]) -> (Reference, bool) {
        let mut out = 0u64;
        let ok = unsafe {
            value_invoke(
                this.to_bits(),
                callee.to_bits(),
                argv(args),
                args.len(),
                &mut out,
            )
        };
        (Reference::from_bits(out), ok != 0)
    }

    fn construct(&self, callee: Reference, args: &[Reference]) -> (Reference, bool) {
        let mut out = 0u64;
        let ok = unsafe { value_new(callee.to_bits(), argv(args), args.len(), &mut out) };
        (Reference::from_bits(out), ok != 0)
    }

    fn instance_of(&self, target: Reference, constructor: Reference) -> bool {
        unsafe { value_instance_of(target.to_bits(), constructor.to_bits()) != 0 }
    }

    fn string_val(&self, value: &str) -> Reference {
        Reference::from_bits(unsafe { string_val(value.as_ptr(), value.len()) })
    }

    fn prepare_string(&self, target: Reference) -> (Reference, usize) {
        let mut len = 0usize;
        let bits = unsafe { value_prepare_string(target.to_bits(), &mut len) };
        (Reference::from_bits(bits), len)
    }

    fn load_string(&self, prepared: Reference, buf: &mut [u8]) {
        unsafe { value_load_string(prepared.to_bits(), buf.as_mut_ptr(), buf.len()) }
    }

    fn copy_bytes_to_module(&self, dst: &mut [u8], src: Reference) -> Option<usize> {
        let mut copied = 0usize;
        let ok = unsafe {
            copy_bytes_to_module(dst.as_mut_ptr(), dst.len(), src.to_bits(), &mut copied)
        };
        (ok != 0).then_some(copied)
    }

    fn copy_bytes_to_host(&self, dst: Reference, src: &[u8]) -> Option<usize> {
        let mut copied = 0usize;
        let ok = unsafe { copy_bytes_to_host(dst.to_bits(), src.as_ptr(), src.len(), &mut copied) };
        (ok != 0).then_some(copied)
    }

    fn release(&self, target: Reference) {
        unsafe { finalize_ref(target.to_bits()) }
    }

    fn make_wrapper(&self, id: u32) -> Reference {
        Reference::from_bits(unsafe { make_func_wrapper(id) })
    }

    fn take_pending_event(&self) -> Reference {
        Reference::from_bits(unsafe { take_pending_event() })
    }
}

/// The host's only way back into the module. The host stages a pending-call
/// descriptor and then calls this export synchronously.
#[unsafe(no_mangle)]
pub extern "C" fn hostbridge_handle_event() {
    crate::callback::handle_event();
}
