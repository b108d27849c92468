use super::{Object, Reflect};
use crate::runtime::{Reference, Transport, TypeFlag};
use crate::value::{Type, Value};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// A host big integer.
#[derive(Clone)]
pub struct BigInt {
    value: Value,
}

impl BigInt {
    /// Narrow `value` to a big integer. Returns None unless its type is
    /// bigint.
    pub fn of(value: impl Into<Value>) -> Option<Self> {
        let value = value.into();
        (value.type_of() == Type::BigInt).then_some(Self { value })
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

impl fmt::Display for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.value, f)
    }
}

impl fmt::Debug for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BigInt").field(&self.value.reference()).finish()
    }
}

/// What big integer detection needs from one host, looked up once per
/// thread and host.
struct Detector {
    transport: Arc<dyn Transport>,
    reflect: Reflect,
    key: Value,
    bigint: Value,
}

impl Detector {
    /// Resolve `Reflect` and `BigInt` on `transport`. Only flags are checked
    /// here, since a full `type_of` could land back in detection.
    fn lookup(transport: &Arc<dyn Transport>) -> Option<Self> {
        let global = |name: &str| {
            Value::from_reference_on(transport.get(Reference::GLOBAL, name), transport)
        };
        let reflect = global("Reflect");
        let bigint = global("BigInt");
        if reflect.reference().flag() != Some(TypeFlag::Object)
            || bigint.reference().flag() != Some(TypeFlag::Function)
        {
            return None;
        }
        let key = Value::from_reference_on(transport.string_val("constructor"), transport);
        Some(Self {
            transport: transport.clone(),
            reflect: Reflect::from_object(Object::from_value_unchecked(reflect)),
            key,
            bigint,
        })
    }
}

thread_local! {
    static DETECTOR: RefCell<Option<Rc<Detector>>> = const { RefCell::new(None) };
}

fn detector_for(transport: &Arc<dyn Transport>) -> Option<Rc<Detector>> {
    let cached = DETECTOR.with(|slot| slot.borrow().clone());
    if let Some(detector) = cached.filter(|detector| {
        std::ptr::addr_eq(Arc::as_ptr(&detector.transport), Arc::as_ptr(transport))
    }) {
        return Some(detector);
    }
    let detector = Rc::new(Detector::lookup(transport)?);
    // The replaced detector is released outside the borrow.
    let previous = DETECTOR.with(|slot| slot.borrow_mut().replace(detector.clone()));
    drop(previous);
    Some(detector)
}

/// Big integers have no type flag of their own. They are recognised by
/// comparing the constructor of their object wrapper with `BigInt`, both
/// looked up on the host `value` came from.
///
/// Any failure along the way means "not a big integer".
pub(crate) fn is_bigint(value: &Value) -> bool {
    let Some(detector) = detector_for(&value.transport()) else {
        return false;
    };
    let Ok(wrapper) = detector.reflect.constructor(value) else {
        return false;
    };
    detector
        .reflect
        .get_key(&wrapper, &detector.key)
        .is_ok_and(|constructor| constructor.equal(&detector.bigint))
}
