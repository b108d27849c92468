//! Built-in globals of the simulated host

use super::heap::{Callable, EntityId, HostHeap, Kind, NativeCtor, NativeFn};
use super::{HostValue, SimulatedHost};
use std::sync::Arc;

type Outcome = Result<HostValue, HostValue>;

pub(super) fn install(heap: &mut HostHeap) {
    // The global object must be the first entity.
    let global = heap.alloc(Kind::Object, None);
    let object_proto = heap.alloc(Kind::Object, None);
    let string_proto = heap.alloc(Kind::Object, None);
    heap.well_known.global = global;
    heap.well_known.object_proto = object_proto;

    let object = constructor(heap, "Object", Some(Arc::new(object_call)), Some(Arc::new(object_new)));
    let array = constructor(heap, "Array", Some(Arc::new(array_call)), Some(Arc::new(array_new)));
    let error = constructor(heap, "Error", Some(Arc::new(error_call)), Some(Arc::new(error_new)));
    let uint8_array = constructor(heap, "Uint8Array", None, Some(Arc::new(uint8_array_new)));
    let bigint = constructor(heap, "BigInt", Some(Arc::new(bigint_call)), None);
    let string = constructor(heap, "String", Some(Arc::new(string_call)), Some(Arc::new(string_new)));
    constructor(heap, "Symbol", Some(Arc::new(symbol_call)), None);
    heap.well_known.object = object;
    heap.well_known.array = array;
    heap.well_known.error = error;
    heap.well_known.uint8_array = uint8_array;
    heap.well_known.bigint = bigint;
    heap.well_known.string = string;

    let global = HostValue::Entity(global);
    let object_proto = HostValue::Entity(object_proto);
    let string_proto = HostValue::Entity(string_proto);
    heap.set_prop(global, "globalThis", global);
    heap.set_prop(HostValue::Entity(object), "prototype", object_proto);
    heap.set_prop(HostValue::Entity(string), "prototype", string_proto);

    heap.set_prop(object_proto, "constructor", HostValue::Entity(object));
    let has_own_property = heap.new_function("hasOwnProperty", has_own_property);
    heap.set_prop(object_proto, "hasOwnProperty", has_own_property);
    let to_string = heap.new_function("toString", to_string);
    heap.set_prop(object_proto, "toString", to_string);

    let index_of = heap.new_function("indexOf", index_of);
    heap.set_prop(string_proto, "indexOf", index_of);

    let reflect = heap.new_object();
    heap.set_prop(reflect, "constructor", HostValue::Entity(object));
    let reflect_get = heap.new_function("get", reflect_get);
    heap.set_prop(reflect, "get", reflect_get);
    heap.set_prop(global, "Reflect", reflect);
}

/// A native constructor published as `global[name]`.
fn constructor(
    heap: &mut HostHeap,
    name: &str,
    call: Option<NativeFn>,
    construct: Option<NativeCtor>,
) -> EntityId {
    let id = heap.alloc(
        Kind::Function(Callable::Native {
            name: name.to_owned(),
            call,
            construct,
        }),
        None,
    );
    let global = HostValue::Entity(heap.well_known.global);
    heap.set_prop(global, name, HostValue::Entity(id));
    id
}

fn first(args: &[HostValue]) -> HostValue {
    args.first().copied().unwrap_or(HostValue::Undefined)
}

// =========================================================================
// Constructors
// =========================================================================

fn object_call(host: &SimulatedHost, _this: HostValue, args: &[HostValue]) -> Outcome {
    object_new(host, args)
}

/// `Object(x)`: objects are returned as is, big integers get an object
/// wrapper whose constructor is `BigInt`, anything else a fresh object.
fn object_new(host: &SimulatedHost, args: &[HostValue]) -> Outcome {
    host.with_heap(|heap| match first(args) {
        HostValue::Entity(id) => {
            if matches!(heap.entity(id).kind, Kind::BigInt(_)) {
                let bigint = heap.well_known.bigint;
                Ok(HostValue::Entity(heap.alloc(Kind::Object, Some(bigint))))
            } else {
                Ok(HostValue::Entity(id))
            }
        }
        _ => Ok(heap.new_object()),
    })
}

fn array_call(host: &SimulatedHost, _this: HostValue, args: &[HostValue]) -> Outcome {
    array_new(host, args)
}

/// `Array(n)` makes `n` empty slots; any other arguments become the elements.
fn array_new(host: &SimulatedHost, args: &[HostValue]) -> Outcome {
    host.with_heap(|heap| match args {
        [HostValue::Number(n)] => {
            if *n >= 0.0 && n.fract() == 0.0 && *n <= u32::MAX as f64 {
                Ok(heap.new_array(vec![HostValue::Undefined; *n as usize]))
            } else {
                Err(heap.new_error("Invalid array length"))
            }
        }
        _ => Ok(heap.new_array(args.to_vec())),
    })
}

fn error_call(host: &SimulatedHost, _this: HostValue, args: &[HostValue]) -> Outcome {
    error_new(host, args)
}

fn error_new(host: &SimulatedHost, args: &[HostValue]) -> Outcome {
    host.with_heap(|heap| {
        let message = match first(args) {
            HostValue::Undefined => String::new(),
            other => heap.to_display_string(other),
        };
        Ok(heap.new_error(&message))
    })
}

/// `new Uint8Array(len)` or `new Uint8Array(array)`.
fn uint8_array_new(host: &SimulatedHost, args: &[HostValue]) -> Outcome {
    host.with_heap(|heap| {
        let bytes = match first(args) {
            HostValue::Number(n) if n >= 0.0 => vec![0u8; n as usize],
            source @ HostValue::Entity(_) => (0..heap.length(source))
                .map(|i| match heap.get_index(source, i) {
                    HostValue::Number(n) => n as u8,
                    _ => 0,
                })
                .collect(),
            _ => Vec::new(),
        };
        let class = heap.well_known.uint8_array;
        Ok(HostValue::Entity(heap.alloc(Kind::Bytes(bytes), Some(class))))
    })
}

fn bigint_call(host: &SimulatedHost, _this: HostValue, args: &[HostValue]) -> Outcome {
    host.with_heap(|heap| {
        let arg = first(args);
        let n = match arg {
            HostValue::Bool(b) => i128::from(b),
            HostValue::Number(n) if n.is_finite() && n.fract() == 0.0 => n as i128,
            HostValue::Number(n) => {
                let message = format!(
                    "The number {} cannot be converted to a BigInt because it is not an integer",
                    heap.to_display_string(HostValue::Number(n))
                );
                return Err(heap.new_error(&message));
            }
            HostValue::Entity(id) => {
                let parsed = match &heap.entity(id).kind {
                    Kind::BigInt(_) => return Ok(arg),
                    Kind::Str(s) => s
                        .trim()
                        .parse::<i128>()
                        .map_err(|_| format!("Cannot convert {} to a BigInt", s)),
                    _ => Err("Cannot convert value to a BigInt".to_owned()),
                };
                match parsed {
                    Ok(n) => n,
                    Err(message) => return Err(heap.new_error(&message)),
                }
            }
            HostValue::Undefined | HostValue::Null => {
                let message = format!("Cannot convert {} to a BigInt", heap.to_display_string(arg));
                return Err(heap.new_error(&message));
            }
        };
        let class = heap.well_known.bigint;
        Ok(HostValue::Entity(heap.alloc(Kind::BigInt(n), Some(class))))
    })
}

fn string_call(host: &SimulatedHost, _this: HostValue, args: &[HostValue]) -> Outcome {
    string_new(host, args)
}

fn string_new(host: &SimulatedHost, args: &[HostValue]) -> Outcome {
    host.with_heap(|heap| {
        let s = match first(args) {
            HostValue::Undefined if args.is_empty() => String::new(),
            other => heap.to_display_string(other),
        };
        Ok(heap.new_string(&s))
    })
}

fn symbol_call(host: &SimulatedHost, _this: HostValue, args: &[HostValue]) -> Outcome {
    host.with_heap(|heap| {
        let description = match first(args) {
            HostValue::Undefined => String::new(),
            other => heap.to_display_string(other),
        };
        Ok(HostValue::Entity(heap.alloc(Kind::Symbol(description), None)))
    })
}

// =========================================================================
// Prototype methods
// =========================================================================

fn has_own_property(host: &SimulatedHost, this: HostValue, args: &[HostValue]) -> Outcome {
    host.with_heap(|heap| {
        let key = heap.to_display_string(first(args));
        Ok(HostValue::Bool(heap.has_own(this, &key)))
    })
}

fn to_string(host: &SimulatedHost, this: HostValue, _args: &[HostValue]) -> Outcome {
    host.with_heap(|heap| {
        let s = heap.to_display_string(this);
        Ok(heap.new_string(&s))
    })
}

/// Offsets count UTF-16 units, like the host's string indices.
fn index_of(host: &SimulatedHost, this: HostValue, args: &[HostValue]) -> Outcome {
    host.with_heap(|heap| {
        let haystack = heap.to_display_string(this);
        let needle = heap.to_display_string(first(args));
        let offset = haystack
            .find(&needle)
            .map_or(-1.0, |at| haystack[..at].encode_utf16().count() as f64);
        Ok(HostValue::Number(offset))
    })
}

fn reflect_get(host: &SimulatedHost, _this: HostValue, args: &[HostValue]) -> Outcome {
    host.with_heap(|heap| {
        let target = first(args);
        if !matches!(target, HostValue::Entity(_)) {
            return Err(heap.new_error("Reflect.get called on non-object"));
        }
        let key = heap.to_display_string(args.get(1).copied().unwrap_or(HostValue::Undefined));
        Ok(heap.get_prop(target, &key))
    })
}
