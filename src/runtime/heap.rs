//! Object arena of the embedded environment.
//!
//! [`ObjectHeap`] stores every foreign object the environment knows about:
//!
//! - **Strings** - UTF-16 code units, as the environment stores text
//! - **Arrays** - single-dimensional arrays with element type tracking
//! - **Objects** - class instances with positional field storage and optional native state
//!
//! # Ownership
//!
//! Objects the host holds on to are pinned with [`ObjectHeap::pin`]. Everything else lives
//! only as long as it is reachable from a pinned object through fields or array elements:
//! [`ObjectHeap::collect`] marks from the pinned set and frees the rest. An engine may
//! therefore keep argument objects, share sub-objects between instances, or drop scratch
//! allocations on the floor.
//!
//! Identifiers are handed out from a monotonically increasing counter and never reused, so a
//! stale [`ObjectRef`] is always detected as [`Error::UseAfterFree`] instead of aliasing a
//! newer object.
//!
//! # Native State
//!
//! A class instance may carry an opaque [`NativeState`] value. Method bodies use it to keep
//! the engine's working data in host types rather than spelling it out as foreign fields.
//! Native state is not traced by the collector, so references kept there do not keep their
//! targets alive. It is cloned together with its object by [`ObjectHeap::clone_deep`] and
//! [`ObjectHeap::clone_shallow`].
//!
//! # Limits
//!
//! The heap enforces a maximum number of live objects. Allocations beyond it fail with
//! [`Error::HeapLimitExceeded`].

use std::{
    any::Any,
    collections::{HashMap, HashSet},
    fmt,
};

use widestring::U16String;

use crate::{
    runtime::{image::ClassId, ForeignValue, ObjectRef, ValueType},
    Error, Result,
};

/// Opaque host-side state attached to a class instance.
///
/// Implemented for every `Clone + Debug + Send` type, so method bodies can store any plain
/// Rust value and downcast it again through [`ObjectHeap::native`].
pub trait NativeState: Any + Send + fmt::Debug {
    /// Clones the state into a new box.
    fn clone_state(&self) -> Box<dyn NativeState>;

    /// Upcast for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to the concrete type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T> NativeState for T
where
    T: Any + Clone + Send + fmt::Debug,
{
    fn clone_state(&self) -> Box<dyn NativeState> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Object stored on the foreign heap.
#[derive(Debug)]
pub enum HeapObject {
    /// An immutable string of UTF-16 code units.
    String(U16String),

    /// A single-dimensional array.
    Array {
        /// Declared element type.
        element_type: ValueType,
        /// Element storage; the length is fixed at allocation.
        elements: Vec<ForeignValue>,
    },

    /// A class instance.
    Object {
        /// Class of the instance within the loaded image.
        class: ClassId,
        /// Field values, in the class's field declaration order.
        fields: Vec<ForeignValue>,
        /// Optional host-side state owned by the instance.
        native: Option<Box<dyn NativeState>>,
    },
}

impl HeapObject {
    /// Returns a short name for the kind of object, used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            HeapObject::String(_) => "string",
            HeapObject::Array { .. } => "array",
            HeapObject::Object { .. } => "object",
        }
    }

    /// Value slots of the object that may hold references.
    fn slots(&self) -> &[ForeignValue] {
        match self {
            HeapObject::String(_) => &[],
            HeapObject::Array { elements, .. } => elements,
            HeapObject::Object { fields, .. } => fields,
        }
    }

    fn slots_mut(&mut self) -> &mut [ForeignValue] {
        match self {
            HeapObject::String(_) => &mut [],
            HeapObject::Array { elements, .. } => elements,
            HeapObject::Object { fields, .. } => fields,
        }
    }

    /// References held by this object, with the slot index they live in.
    fn references(&self) -> Vec<(usize, ObjectRef)> {
        self.slots()
            .iter()
            .enumerate()
            .filter_map(|(slot, value)| value.as_object().map(|reference| (slot, reference)))
            .collect()
    }
}

impl Clone for HeapObject {
    fn clone(&self) -> Self {
        match self {
            HeapObject::String(text) => HeapObject::String(text.clone()),
            HeapObject::Array {
                element_type,
                elements,
            } => HeapObject::Array {
                element_type: element_type.clone(),
                elements: elements.clone(),
            },
            HeapObject::Object {
                class,
                fields,
                native,
            } => HeapObject::Object {
                class: *class,
                fields: fields.clone(),
                native: native.as_ref().map(|state| state.clone_state()),
            },
        }
    }
}

impl fmt::Display for HeapObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapObject::String(text) => write!(f, "\"{}\"", text.to_string_lossy()),
            HeapObject::Array {
                element_type,
                elements,
            } => write!(f, "{element_type}[{}]", elements.len()),
            HeapObject::Object { class, fields, .. } => {
                write!(f, "object of {class} ({} fields)", fields.len())
            }
        }
    }
}

/// Arena of foreign objects addressed by [`ObjectRef`].
#[derive(Debug)]
pub struct ObjectHeap {
    /// Live objects by identifier.
    objects: HashMap<u64, HeapObject>,
    /// Pin counts of the collector roots.
    pins: HashMap<u64, usize>,
    /// Next identifier to hand out; identifiers start at 1 and are never reused.
    next_id: u64,
    /// Maximum number of live objects.
    max_objects: usize,
}

impl ObjectHeap {
    /// Creates an empty heap with the given object limit.
    ///
    /// # Arguments
    ///
    /// * `max_objects` - Maximum number of simultaneously live objects
    #[must_use]
    pub fn new(max_objects: usize) -> Self {
        ObjectHeap {
            objects: HashMap::new(),
            pins: HashMap::new(),
            next_id: 1,
            max_objects,
        }
    }

    fn insert(&mut self, object: HeapObject) -> Result<ObjectRef> {
        if self.objects.len() >= self.max_objects {
            return Err(Error::HeapLimitExceeded {
                live: self.objects.len(),
                limit: self.max_objects,
            });
        }

        let reference = ObjectRef::new(self.next_id);
        self.next_id += 1;
        self.objects.insert(reference.id(), object);
        Ok(reference)
    }

    /// Allocates a string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HeapLimitExceeded`] if the heap is full.
    pub fn alloc_string(&mut self, value: &str) -> Result<ObjectRef> {
        self.insert(HeapObject::String(U16String::from_str(value)))
    }

    /// Allocates an array holding `elements`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Marshal`] if an element does not fit `element_type`, or
    /// [`Error::HeapLimitExceeded`] if the heap is full.
    pub fn alloc_array(
        &mut self,
        element_type: ValueType,
        elements: Vec<ForeignValue>,
    ) -> Result<ObjectRef> {
        if let Some(bad) = elements.iter().find(|value| !element_type.accepts(value)) {
            return Err(marshal_error!(
                "cannot store {} in {}[]",
                bad.kind(),
                element_type
            ));
        }

        self.insert(HeapObject::Array {
            element_type,
            elements,
        })
    }

    /// Allocates a class instance with the given field values and no native state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HeapLimitExceeded`] if the heap is full.
    pub fn alloc_object(&mut self, class: ClassId, fields: Vec<ForeignValue>) -> Result<ObjectRef> {
        self.insert(HeapObject::Object {
            class,
            fields,
            native: None,
        })
    }

    /// Returns the object behind `reference`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UseAfterFree`] if the object no longer exists.
    pub fn get(&self, reference: ObjectRef) -> Result<&HeapObject> {
        self.objects
            .get(&reference.id())
            .ok_or(Error::UseAfterFree { reference })
    }

    /// Returns the object behind `reference` for modification.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UseAfterFree`] if the object no longer exists.
    pub fn get_mut(&mut self, reference: ObjectRef) -> Result<&mut HeapObject> {
        self.objects
            .get_mut(&reference.id())
            .ok_or(Error::UseAfterFree { reference })
    }

    /// Returns `true` if `reference` points to a live object.
    #[must_use]
    pub fn contains(&self, reference: ObjectRef) -> bool {
        self.objects.contains_key(&reference.id())
    }

    /// Number of live objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns `true` if no objects are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Maximum number of live objects.
    #[must_use]
    pub fn max_objects(&self) -> usize {
        self.max_objects
    }

    /// Frees a single object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UseAfterFree`] if the object was already freed.
    pub fn free(&mut self, reference: ObjectRef) -> Result<HeapObject> {
        self.objects
            .remove(&reference.id())
            .ok_or(Error::UseAfterFree { reference })
    }

    /// Makes `reference` a collector root.
    ///
    /// Pins are counted; an object pinned twice stays a root until it is unpinned twice.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UseAfterFree`] if the object no longer exists.
    pub fn pin(&mut self, reference: ObjectRef) -> Result<()> {
        if !self.contains(reference) {
            return Err(Error::UseAfterFree { reference });
        }
        *self.pins.entry(reference.id()).or_insert(0) += 1;
        Ok(())
    }

    /// Drops one pin of `reference`. Returns `false` if it was not pinned.
    ///
    /// The object itself stays until the next [`ObjectHeap::collect`] finds it unreachable.
    pub fn unpin(&mut self, reference: ObjectRef) -> bool {
        let Some(count) = self.pins.get_mut(&reference.id()) else {
            return false;
        };
        *count -= 1;
        if *count == 0 {
            self.pins.remove(&reference.id());
        }
        true
    }

    /// Returns `true` if `reference` is a collector root.
    #[must_use]
    pub fn is_pinned(&self, reference: ObjectRef) -> bool {
        self.pins.contains_key(&reference.id())
    }

    /// Frees every object that no pinned object can reach.
    ///
    /// Returns the number of objects freed.
    pub fn collect(&mut self) -> usize {
        let mut marked = HashSet::with_capacity(self.pins.len());
        let mut pending: Vec<u64> = self.pins.keys().copied().collect();
        while let Some(id) = pending.pop() {
            if !marked.insert(id) {
                continue;
            }
            if let Some(object) = self.objects.get(&id) {
                pending.extend(
                    object
                        .references()
                        .into_iter()
                        .map(|(_, child)| child.id())
                        .filter(|child| !marked.contains(child)),
                );
            }
        }

        let before = self.objects.len();
        self.objects.retain(|id, _| marked.contains(id));
        before - self.objects.len()
    }

    /// Copies `root` and every object reachable from it.
    ///
    /// Shared sub-objects stay shared in the copy and cycles are preserved. Native state is
    /// cloned through [`NativeState::clone_state`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UseAfterFree`] if any object in the graph was freed, or
    /// [`Error::HeapLimitExceeded`] if the copy does not fit.
    pub fn clone_deep(&mut self, root: ObjectRef) -> Result<ObjectRef> {
        let mut copies = HashMap::new();
        self.clone_recursive(root, &mut copies)
    }

    fn clone_recursive(
        &mut self,
        source: ObjectRef,
        copies: &mut HashMap<u64, ObjectRef>,
    ) -> Result<ObjectRef> {
        if let Some(copy) = copies.get(&source.id()) {
            return Ok(*copy);
        }

        let object = self.get(source)?.clone();
        let children = object.references();
        let copy = self.insert(object)?;
        copies.insert(source.id(), copy);

        for (slot, child) in children {
            let child_copy = self.clone_recursive(child, copies)?;
            self.get_mut(copy)?.slots_mut()[slot] = ForeignValue::Object(child_copy);
        }

        Ok(copy)
    }

    /// Copies `reference` alone. Fields and elements of the copy refer to the same objects
    /// as the original.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UseAfterFree`] if the object was freed, or
    /// [`Error::HeapLimitExceeded`] if the copy does not fit.
    pub fn clone_shallow(&mut self, reference: ObjectRef) -> Result<ObjectRef> {
        let object = self.get(reference)?.clone();
        self.insert(object)
    }

    /// Removes every object and pin.
    ///
    /// Identifiers keep counting from where they were, so references taken before the clear
    /// stay invalid.
    pub fn clear(&mut self) {
        self.objects.clear();
        self.pins.clear();
    }

    /// Reads a string as host text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UseAfterFree`] for a freed reference, or [`Error::Marshal`] if the
    /// object is not a string or is not valid UTF-16.
    pub fn string(&self, reference: ObjectRef) -> Result<String> {
        match self.get(reference)? {
            HeapObject::String(text) => String::from_utf16(text.as_slice())
                .map_err(|error| marshal_error!("invalid UTF-16 in {}: {}", reference, error)),
            other => Err(marshal_error!("expected string, found {}", other.kind())),
        }
    }

    /// Returns the elements of an array.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UseAfterFree`] for a freed reference, or [`Error::Marshal`] if the
    /// object is not an array.
    pub fn array(&self, reference: ObjectRef) -> Result<&[ForeignValue]> {
        match self.get(reference)? {
            HeapObject::Array { elements, .. } => Ok(elements),
            other => Err(marshal_error!("expected array, found {}", other.kind())),
        }
    }

    /// Returns the element type of an array.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UseAfterFree`] for a freed reference, or [`Error::Marshal`] if the
    /// object is not an array.
    pub fn array_element_type(&self, reference: ObjectRef) -> Result<&ValueType> {
        match self.get(reference)? {
            HeapObject::Array { element_type, .. } => Ok(element_type),
            other => Err(marshal_error!("expected array, found {}", other.kind())),
        }
    }

    /// Returns the length of an array.
    ///
    /// # Errors
    ///
    /// Same as [`ObjectHeap::array`].
    pub fn array_len(&self, reference: ObjectRef) -> Result<usize> {
        Ok(self.array(reference)?.len())
    }

    /// Returns one array element.
    ///
    /// # Errors
    ///
    /// Same as [`ObjectHeap::array`], plus [`Error::Marshal`] for an index past the end.
    pub fn array_element(&self, reference: ObjectRef, index: usize) -> Result<ForeignValue> {
        let elements = self.array(reference)?;
        elements.get(index).cloned().ok_or_else(|| {
            marshal_error!(
                "index {} out of bounds for array of length {}",
                index,
                elements.len()
            )
        })
    }

    /// Returns the class of an instance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UseAfterFree`] for a freed reference, or [`Error::Marshal`] if the
    /// object is not a class instance.
    pub fn class_of(&self, reference: ObjectRef) -> Result<ClassId> {
        match self.get(reference)? {
            HeapObject::Object { class, .. } => Ok(*class),
            other => Err(marshal_error!("expected object, found {}", other.kind())),
        }
    }

    /// Reads a field by position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UseAfterFree`] for a freed reference, or [`Error::Marshal`] if the
    /// object is not a class instance or has no such field slot.
    pub fn field(&self, reference: ObjectRef, index: usize) -> Result<ForeignValue> {
        match self.get(reference)? {
            HeapObject::Object { fields, .. } => fields
                .get(index)
                .cloned()
                .ok_or_else(|| marshal_error!("field slot {} missing on {}", index, reference)),
            other => Err(marshal_error!("expected object, found {}", other.kind())),
        }
    }

    /// Writes a field by position.
    ///
    /// # Errors
    ///
    /// Same as [`ObjectHeap::field`].
    pub fn set_field(&mut self, reference: ObjectRef, index: usize, value: ForeignValue) -> Result<()> {
        match self.get_mut(reference)? {
            HeapObject::Object { fields, .. } => {
                let slot = fields
                    .get_mut(index)
                    .ok_or_else(|| marshal_error!("field slot {} missing on {}", index, reference))?;
                *slot = value;
                Ok(())
            }
            other => Err(marshal_error!("expected object, found {}", other.kind())),
        }
    }

    /// Borrows the native state of an instance as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UseAfterFree`] for a freed reference, or [`Error::Marshal`] if the
    /// object carries no native state of type `T`.
    pub fn native<T: Any>(&self, reference: ObjectRef) -> Result<&T> {
        match self.get(reference)? {
            HeapObject::Object {
                native: Some(state),
                ..
            } => state.as_any().downcast_ref::<T>().ok_or_else(|| {
                marshal_error!(
                    "native state of {} is not {}",
                    reference,
                    std::any::type_name::<T>()
                )
            }),
            other => Err(marshal_error!("no native state on {}", other.kind())),
        }
    }

    /// Mutably borrows the native state of an instance as `T`.
    ///
    /// # Errors
    ///
    /// Same as [`ObjectHeap::native`].
    pub fn native_mut<T: Any>(&mut self, reference: ObjectRef) -> Result<&mut T> {
        match self.get_mut(reference)? {
            HeapObject::Object {
                native: Some(state),
                ..
            } => state.as_any_mut().downcast_mut::<T>().ok_or_else(|| {
                marshal_error!(
                    "native state of {} is not {}",
                    reference,
                    std::any::type_name::<T>()
                )
            }),
            other => Err(marshal_error!("no native state on {}", other.kind())),
        }
    }

    /// Attaches native state to an instance, replacing any previous state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UseAfterFree`] for a freed reference, or [`Error::Marshal`] if the
    /// object is not a class instance.
    pub fn set_native(&mut self, reference: ObjectRef, state: Box<dyn NativeState>) -> Result<()> {
        match self.get_mut(reference)? {
            HeapObject::Object { native, .. } => {
                *native = Some(state);
                Ok(())
            }
            other => Err(marshal_error!("expected object, found {}", other.kind())),
        }
    }
}

impl Default for ObjectHeap {
    fn default() -> Self {
        Self::new(1 << 20)
    }
}
