//! Host object graph and reference table of the simulated host
//!
//! Entities live for as long as the host does, except staged string bytes,
//! which are freed with their slot. Strings are interned by content. What the
//! module sees is a table slot per entity, refcounted by the number of
//! references handed out and not yet released. A slot index is reused only
//! after every handed-out copy has been released.

use super::{HostConfig, HostValue};
use crate::runtime::{Reference, TypeFlag};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;

/// Identifies an entity in the host's object graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntityId(pub(crate) u32);

/// Native implementation of a host function called as `f.apply(this, args)`.
pub type NativeFn =
    Arc<dyn Fn(&super::SimulatedHost, HostValue, &[HostValue]) -> Result<HostValue, HostValue> + Send + Sync>;

/// Native implementation of `new f(...args)`.
pub type NativeCtor =
    Arc<dyn Fn(&super::SimulatedHost, &[HostValue]) -> Result<HostValue, HostValue> + Send + Sync>;

/// Property storage, in insertion order.
pub type PropertyMap = Vec<(String, HostValue)>;

#[derive(Clone)]
pub(crate) enum Callable {
    Native {
        name: String,
        call: Option<NativeFn>,
        construct: Option<NativeCtor>,
    },
    /// Calls back into the module with this callback ID.
    Wrapper(u32),
}

#[derive(Clone)]
pub(crate) enum Kind {
    Object,
    Array(Vec<HostValue>),
    Bytes(Vec<u8>),
    Str(String),
    Symbol(String),
    BigInt(i128),
    Function(Callable),
}

pub(crate) struct Entity {
    pub(crate) kind: Kind,
    pub(crate) props: PropertyMap,
    /// Constructor the entity was created by, for `instanceof` and the
    /// inherited `constructor` property.
    pub(crate) class: Option<EntityId>,
}

struct Slot {
    entity: EntityId,
    handed_out: u32,
}

/// Entities the built-ins need to find again.
#[derive(Clone, Copy)]
pub(crate) struct WellKnown {
    pub(crate) global: EntityId,
    pub(crate) object_proto: EntityId,
    pub(crate) object: EntityId,
    pub(crate) array: EntityId,
    pub(crate) error: EntityId,
    pub(crate) uint8_array: EntityId,
    pub(crate) bigint: EntityId,
    pub(crate) string: EntityId,
}

/// The simulated host's object graph, reference table and staging area.
pub struct HostHeap {
    entities: Vec<Option<Entity>>,
    vacant: Vec<u32>,
    strings: HashMap<String, EntityId>,
    // Freed when their slot is.
    staged: HashSet<EntityId>,
    ids: HashMap<EntityId, u32>,
    slots: HashMap<u32, Slot>,
    free: Vec<u32>,
    next_index: u32,
    recycle_slots: bool,
    releases: usize,
    release_log: Option<Vec<Reference>>,
    pub(crate) pending_event: Option<EntityId>,
    pub(crate) well_known: WellKnown,
}

impl HostHeap {
    pub(crate) fn new(config: &HostConfig) -> Self {
        let placeholder = EntityId(0);
        let mut heap = Self {
            entities: Vec::new(),
            vacant: Vec::new(),
            strings: HashMap::new(),
            staged: HashSet::new(),
            ids: HashMap::new(),
            slots: HashMap::new(),
            free: Vec::new(),
            next_index: config.first_index,
            recycle_slots: config.recycle_slots,
            releases: 0,
            release_log: config.record_releases.then(Vec::new),
            pending_event: None,
            well_known: WellKnown {
                global: placeholder,
                object_proto: placeholder,
                object: placeholder,
                array: placeholder,
                error: placeholder,
                uint8_array: placeholder,
                bigint: placeholder,
                string: placeholder,
            },
        };
        super::builtins::install(&mut heap);
        heap
    }

    // =========================================================================
    // Entities
    // =========================================================================

    pub(crate) fn alloc(&mut self, kind: Kind, class: Option<EntityId>) -> EntityId {
        let entity = Entity {
            kind,
            props: PropertyMap::new(),
            class,
        };
        match self.vacant.pop() {
            Some(index) => {
                self.entities[index as usize] = Some(entity);
                EntityId(index)
            }
            None => {
                self.entities.push(Some(entity));
                EntityId(self.entities.len() as u32 - 1)
            }
        }
    }

    pub(crate) fn entity(&self, id: EntityId) -> &Entity {
        match self.entities.get(id.0 as usize) {
            Some(Some(entity)) => entity,
            _ => panic!("freed host entity {:?}", id),
        }
    }

    pub(crate) fn entity_mut(&mut self, id: EntityId) -> &mut Entity {
        match self.entities.get_mut(id.0 as usize) {
            Some(Some(entity)) => entity,
            _ => panic!("freed host entity {:?}", id),
        }
    }

    /// Number of entities the host is keeping.
    pub fn entity_count(&self) -> usize {
        self.entities.len() - self.vacant.len()
    }

    fn free_entity(&mut self, id: EntityId) {
        if let Some(slot) = self.entities.get_mut(id.0 as usize) {
            *slot = None;
            self.vacant.push(id.0);
        }
    }

    /// A plain object created by `Object`.
    pub fn new_object(&mut self) -> HostValue {
        let class = self.well_known.object;
        HostValue::Entity(self.alloc(Kind::Object, Some(class)))
    }

    /// An array created by `Array`.
    pub fn new_array(&mut self, items: Vec<HostValue>) -> HostValue {
        let class = self.well_known.array;
        HostValue::Entity(self.alloc(Kind::Array(items), Some(class)))
    }

    /// A host string. Equal strings are the same entity.
    pub fn new_string(&mut self, s: &str) -> HostValue {
        if let Some(&id) = self.strings.get(s) {
            return HostValue::Entity(id);
        }
        let class = self.well_known.string;
        let id = self.alloc(Kind::Str(s.to_owned()), Some(class));
        self.strings.insert(s.to_owned(), id);
        HostValue::Entity(id)
    }

    /// Bytes staged for the module to copy out, freed once released.
    pub(crate) fn stage_bytes(&mut self, bytes: Vec<u8>) -> HostValue {
        let id = self.alloc(Kind::Bytes(bytes), None);
        self.staged.insert(id);
        HostValue::Entity(id)
    }

    /// An `Error` instance with `message` set.
    pub fn new_error(&mut self, message: &str) -> HostValue {
        let class = self.well_known.error;
        let error = HostValue::Entity(self.alloc(Kind::Object, Some(class)));
        let message = self.new_string(message);
        self.set_prop(error, "message", message);
        error
    }

    /// A host function implemented by `call`.
    pub fn new_function<F>(&mut self, name: &str, call: F) -> HostValue
    where
        F: Fn(&super::SimulatedHost, HostValue, &[HostValue]) -> Result<HostValue, HostValue>
            + Send
            + Sync
            + 'static,
    {
        HostValue::Entity(self.alloc(
            Kind::Function(Callable::Native {
                name: name.to_owned(),
                call: Some(Arc::new(call)),
                construct: None,
            }),
            None,
        ))
    }

    pub(crate) fn new_wrapper(&mut self, id: u32) -> HostValue {
        HostValue::Entity(self.alloc(Kind::Function(Callable::Wrapper(id)), None))
    }

    /// The host string held by `value`, if it is one.
    pub fn as_str(&self, value: HostValue) -> Option<&str> {
        match value {
            HostValue::Entity(id) => match &self.entity(id).kind {
                Kind::Str(s) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }

    // =========================================================================
    // Properties
    // =========================================================================

    fn own_prop(&self, id: EntityId, key: &str) -> Option<HostValue> {
        self.entity(id)
            .props
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| *v)
    }

    /// Whether `key` is an own property of `target`, including array indices
    /// and `length`.
    pub fn has_own(&self, target: HostValue, key: &str) -> bool {
        let HostValue::Entity(id) = target else {
            return false;
        };
        if self.own_prop(id, key).is_some() {
            return true;
        }
        match &self.entity(id).kind {
            Kind::Array(items) => {
                key == "length" || key.parse::<usize>().is_ok_and(|i| i < items.len())
            }
            Kind::Bytes(bytes) => {
                key == "length" || key.parse::<usize>().is_ok_and(|i| i < bytes.len())
            }
            Kind::Str(_) => key == "length",
            _ => false,
        }
    }

    /// `target[key]`, following the constructor's prototype and then
    /// `Object.prototype`.
    pub fn get_prop(&self, target: HostValue, key: &str) -> HostValue {
        let HostValue::Entity(id) = target else {
            return HostValue::Undefined;
        };
        if let Some(value) = self.own_prop(id, key) {
            return value;
        }
        let entity = self.entity(id);
        if let Ok(i) = key.parse::<usize>() {
            if !matches!(entity.kind, Kind::Object | Kind::Function(_)) {
                return self.get_index(target, i);
            }
        }
        if key == "length" {
            match &entity.kind {
                Kind::Array(_) | Kind::Bytes(_) | Kind::Str(_) => {
                    return HostValue::Number(self.length(target) as f64);
                }
                _ => {}
            }
        }
        if key == "constructor" {
            if let Some(class) = entity.class {
                return HostValue::Entity(class);
            }
        }
        let proto = entity
            .class
            .and_then(|class| self.own_prop(class, "prototype"));
        if let Some(HostValue::Entity(proto)) = proto {
            if let Some(value) = self.own_prop(proto, key) {
                return value;
            }
        }
        self.own_prop(self.well_known.object_proto, key)
            .unwrap_or(HostValue::Undefined)
    }

    /// `target[key] = value`
    pub fn set_prop(&mut self, target: HostValue, key: &str, value: HostValue) {
        let HostValue::Entity(id) = target else {
            return;
        };
        if let Ok(i) = key.parse::<usize>() {
            if matches!(self.entity(id).kind, Kind::Array(_) | Kind::Bytes(_)) {
                self.set_index(target, i, value);
                return;
            }
        }
        if matches!(self.entity(id).kind, Kind::Str(_)) {
            // Strings are primitives; assignment to them is dropped.
            return;
        }
        let props = &mut self.entity_mut(id).props;
        match props.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => props.push((key.to_owned(), value)),
        }
    }

    /// `delete target[key]`
    pub fn delete_prop(&mut self, target: HostValue, key: &str) {
        if let HostValue::Entity(id) = target {
            self.entity_mut(id).props.retain(|(k, _)| k != key);
        }
    }

    /// `target[index]`
    pub fn get_index(&self, target: HostValue, index: usize) -> HostValue {
        let HostValue::Entity(id) = target else {
            return HostValue::Undefined;
        };
        match &self.entity(id).kind {
            Kind::Array(items) => items.get(index).copied().unwrap_or(HostValue::Undefined),
            Kind::Bytes(bytes) => bytes
                .get(index)
                .map_or(HostValue::Undefined, |b| HostValue::Number(*b as f64)),
            Kind::Object | Kind::Function(_) => {
                self.own_prop(id, &index.to_string()).unwrap_or(HostValue::Undefined)
            }
            _ => HostValue::Undefined,
        }
    }

    /// `target[index] = value`. Arrays grow; byte arrays ignore writes past
    /// their end.
    pub fn set_index(&mut self, target: HostValue, index: usize, value: HostValue) {
        let HostValue::Entity(id) = target else {
            return;
        };
        let entity = self.entity_mut(id);
        match &mut entity.kind {
            Kind::Array(items) => {
                if index >= items.len() {
                    items.resize(index + 1, HostValue::Undefined);
                }
                items[index] = value;
            }
            Kind::Bytes(bytes) => {
                if let (Some(byte), HostValue::Number(n)) = (bytes.get_mut(index), value) {
                    *byte = n as u8;
                }
            }
            Kind::Object | Kind::Function(_) => {
                let key = index.to_string();
                match entity.props.iter_mut().find(|(k, _)| *k == key) {
                    Some(slot) => slot.1 = value,
                    None => entity.props.push((key, value)),
                }
            }
            _ => {}
        }
    }

    /// `target.length`. Strings count UTF-16 units.
    pub fn length(&self, target: HostValue) -> usize {
        let HostValue::Entity(id) = target else {
            return 0;
        };
        match &self.entity(id).kind {
            Kind::Array(items) => items.len(),
            Kind::Bytes(bytes) => bytes.len(),
            Kind::Str(s) => s.encode_utf16().count(),
            _ => match self.own_prop(id, "length") {
                Some(HostValue::Number(n)) if n >= 0.0 => n as usize,
                _ => 0,
            },
        }
    }

    /// `target instanceof constructor`
    pub fn instance_of(&self, target: HostValue, constructor: HostValue) -> bool {
        let (HostValue::Entity(target), HostValue::Entity(constructor)) = (target, constructor)
        else {
            return false;
        };
        let entity = self.entity(target);
        if entity.class == Some(constructor) {
            return true;
        }
        constructor == self.well_known.object
            && matches!(
                entity.kind,
                Kind::Object | Kind::Array(_) | Kind::Bytes(_) | Kind::Function(_)
            )
    }

    pub(crate) fn bytes_mut(&mut self, target: HostValue) -> Option<&mut Vec<u8>> {
        let HostValue::Entity(id) = target else {
            return None;
        };
        match &mut self.entity_mut(id).kind {
            Kind::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// The host's `String(value)`.
    pub fn to_display_string(&self, value: HostValue) -> String {
        match value {
            HostValue::Undefined => "undefined".to_owned(),
            HostValue::Null => "null".to_owned(),
            HostValue::Bool(b) => b.to_string(),
            HostValue::Number(n) => number_to_string(n),
            HostValue::Entity(id) => {
                let entity = self.entity(id);
                match &entity.kind {
                    Kind::Str(s) => s.clone(),
                    Kind::Symbol(description) => format!("Symbol({})", description),
                    Kind::BigInt(n) => n.to_string(),
                    Kind::Array(items) => {
                        let mut out = String::new();
                        for (i, item) in items.iter().enumerate() {
                            if i > 0 {
                                out.push(',');
                            }
                            if !matches!(item, HostValue::Undefined | HostValue::Null) {
                                out.push_str(&self.to_display_string(*item));
                            }
                        }
                        out
                    }
                    Kind::Bytes(bytes) => {
                        let mut out = String::new();
                        for (i, b) in bytes.iter().enumerate() {
                            if i > 0 {
                                out.push(',');
                            }
                            let _ = write!(out, "{}", b);
                        }
                        out
                    }
                    Kind::Function(Callable::Native { name, .. }) => {
                        format!("function {}() {{ [native code] }}", name)
                    }
                    Kind::Function(Callable::Wrapper(_)) => {
                        "function () { [native code] }".to_owned()
                    }
                    Kind::Object if entity.class == Some(self.well_known.error) => {
                        let message = self.get_prop(value, "message");
                        format!("Error: {}", self.to_display_string(message))
                    }
                    Kind::Object => "[object Object]".to_owned(),
                }
            }
        }
    }

    // =========================================================================
    // Reference Table
    // =========================================================================

    /// Hand `value` out to the module. Every call for a slot-backed entity
    /// must be matched by one `release`.
    pub fn encode(&mut self, value: HostValue) -> Reference {
        let id = match value {
            HostValue::Undefined => return Reference::UNDEFINED,
            HostValue::Null => return Reference::NULL,
            HostValue::Bool(b) => return Reference::boolean(b),
            HostValue::Number(n) => return Reference::number(n),
            HostValue::Entity(id) if id == self.well_known.global => return Reference::GLOBAL,
            HostValue::Entity(id) => id,
        };
        let flag = match self.entity(id).kind {
            Kind::Str(_) => TypeFlag::String,
            Kind::Symbol(_) => TypeFlag::Symbol,
            Kind::Function(_) => TypeFlag::Function,
            Kind::BigInt(_) => TypeFlag::None,
            Kind::Object | Kind::Array(_) | Kind::Bytes(_) => TypeFlag::Object,
        };
        let index = match self.ids.get(&id) {
            Some(&index) => index,
            None => {
                let index = self.allocate_index();
                self.ids.insert(id, index);
                self.slots.insert(
                    index,
                    Slot {
                        entity: id,
                        handed_out: 0,
                    },
                );
                index
            }
        };
        if let Some(slot) = self.slots.get_mut(&index) {
            slot.handed_out += 1;
        }
        Reference::predefined(index, flag)
    }

    fn allocate_index(&mut self) -> u32 {
        if self.recycle_slots {
            if let Some(index) = self.free.pop() {
                return index;
            }
        }
        let index = self.next_index;
        self.next_index = self
            .next_index
            .checked_add(1)
            .unwrap_or_else(|| panic!("host reference table exhausted"));
        index
    }

    /// Look up a reference received from the module.
    ///
    /// # Panics
    /// If the reference names a slot that has been released.
    pub fn decode(&self, reference: Reference) -> HostValue {
        match reference {
            Reference::UNDEFINED => return HostValue::Undefined,
            Reference::NULL => return HostValue::Null,
            Reference::TRUE => return HostValue::Bool(true),
            Reference::FALSE => return HostValue::Bool(false),
            Reference::GLOBAL => return HostValue::Entity(self.well_known.global),
            _ => {}
        }
        if let Some(n) = reference.as_number() {
            return HostValue::Number(n);
        }
        match self.slots.get(&reference.index()) {
            Some(slot) => HostValue::Entity(slot.entity),
            None => panic!("stale host reference {:?}", reference),
        }
    }

    /// The module dropped one copy of `reference`.
    pub(crate) fn release(&mut self, reference: Reference) {
        self.releases += 1;
        if let Some(log) = &mut self.release_log {
            log.push(reference);
        }
        let index = reference.index();
        let Some(slot) = self.slots.get_mut(&index) else {
            tracing::warn!(?reference, "release of unknown host reference");
            return;
        };
        slot.handed_out -= 1;
        if slot.handed_out == 0 {
            let entity = slot.entity;
            self.slots.remove(&index);
            self.ids.remove(&entity);
            self.free.push(index);
            if self.staged.remove(&entity) {
                self.free_entity(entity);
            }
        }
    }

    pub(crate) fn releases(&self) -> usize {
        self.releases
    }

    /// Drain the release log. Empty unless the host records releases.
    pub(crate) fn take_released(&mut self) -> Vec<Reference> {
        self.release_log.as_mut().map(std::mem::take).unwrap_or_default()
    }

    /// Number of occupied table slots.
    pub fn live_slots(&self) -> usize {
        self.slots.len()
    }

    /// A slot reference to a fresh object that carries no type flag, as a
    /// host with a corrupt encoder would produce.
    #[cfg(test)]
    pub(crate) fn untagged_reference_to_object(&mut self) -> Reference {
        let object = self.new_object();
        let tagged = self.encode(object);
        Reference::predefined(tagged.index(), TypeFlag::None)
    }
}

/// Numbers print like the host prints them: integers without a fraction,
/// `-0` as `0`.
fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_owned();
    }
    if n.is_infinite() {
        return if n.is_sign_positive() {
            "Infinity"
        } else {
            "-Infinity"
        }
        .to_owned();
    }
    if n == 0.0 {
        return "0".to_owned();
    }
    format!("{}", n)
}
