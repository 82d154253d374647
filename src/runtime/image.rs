//! Assembly images installed into the embedded environment.
//!
//! An [`AssemblyImage`] is the unit an engine ships as: a named set of classes, each with
//! typed fields and methods whose bodies are host closures. The bridge never looks inside a
//! body; it resolves methods by descriptor and invokes them through a
//! [`CallScope`](super::CallScope).
//!
//! # Building Images
//!
//! ```rust
//! use mtemu_bridge::runtime::{AssemblyImage, ForeignValue};
//!
//! let image = AssemblyImage::builder("engine.dll")
//!     .class("mtemu", "Counter", |class| {
//!         class
//!             .field("value_", "int")
//!             .method(".ctor()", "void", |_ctx| Ok(ForeignValue::Void))
//!             .method("Increment()", "int", |ctx| {
//!                 let this = ctx.this();
//!                 let next = ctx.field_i32(this, "value_")? + 1;
//!                 ctx.set_field(this, "value_", next.into())?;
//!                 Ok(next.into())
//!             })
//!     })
//!     .build()?;
//!
//! assert!(image.class_id("mtemu", "Counter").is_some());
//! # Ok::<(), mtemu_bridge::Error>(())
//! ```
//!
//! # Method Bodies
//!
//! A body receives an [`InvokeContext`] giving access to `this`, the arguments and the heap.
//! It returns either a value of the declared return type or a [`ForeignException`]. Heap and
//! marshalling failures inside a body convert into exceptions through `?`.

use std::{any::Any, collections::HashMap, fmt, sync::Arc};

use crate::{
    runtime::{
        exception::exception_type, ForeignException, ForeignValue, HeapObject, MethodDesc,
        NativeState, ObjectHeap, ObjectRef, ValueType,
    },
    Error, Result,
};

/// Result of a method body.
pub type InvokeResult = std::result::Result<ForeignValue, ForeignException>;

/// Type alias for method bodies.
///
/// Bodies are shared between the image and every environment that loads it, so they must be
/// `Send + Sync`.
pub type MethodBody = Arc<dyn Fn(&mut InvokeContext<'_>) -> InvokeResult + Send + Sync>;

/// Index of a class within its image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub(crate) usize);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({})", self.0)
    }
}

/// Declared instance field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Field type.
    pub ty: ValueType,
}

/// Declared instance method.
#[derive(Clone)]
pub struct MethodDef {
    desc: MethodDesc,
    ret: ValueType,
    body: MethodBody,
}

impl MethodDef {
    /// Method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.desc.name
    }

    /// Parameter types.
    #[must_use]
    pub fn params(&self) -> &[ValueType] {
        &self.desc.params
    }

    /// Declared return type.
    #[must_use]
    pub fn ret(&self) -> &ValueType {
        &self.ret
    }

    /// Name and parameter list.
    #[must_use]
    pub fn desc(&self) -> &MethodDesc {
        &self.desc
    }

    pub(crate) fn body(&self) -> MethodBody {
        Arc::clone(&self.body)
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodDef({} -> {})", self.desc, self.ret)
    }
}

/// A class of the image.
#[derive(Clone, Debug)]
pub struct ClassDef {
    id: ClassId,
    namespace: String,
    name: String,
    fields: Vec<FieldDef>,
    methods: Vec<MethodDef>,
}

impl ClassDef {
    /// Identifier within the image.
    #[must_use]
    pub fn id(&self) -> ClassId {
        self.id
    }

    /// Namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Simple name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `namespace.name`
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    /// Fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Methods in declaration order.
    #[must_use]
    pub fn methods(&self) -> &[MethodDef] {
        &self.methods
    }

    /// Position of the field called `name`.
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    /// Finds the method matching `desc` exactly.
    #[must_use]
    pub fn find_method(&self, desc: &MethodDesc) -> Option<(usize, &MethodDef)> {
        self.methods
            .iter()
            .enumerate()
            .find(|(_, method)| method.desc == *desc)
    }

    /// Field values of a fresh instance.
    #[must_use]
    pub fn default_fields(&self) -> Vec<ForeignValue> {
        self.fields
            .iter()
            .map(|field| field.ty.default_value())
            .collect()
    }
}

/// A loadable set of classes.
#[derive(Debug)]
pub struct AssemblyImage {
    name: String,
    classes: Vec<ClassDef>,
    by_name: HashMap<(String, String), ClassId>,
}

impl AssemblyImage {
    /// Starts building an image with the given assembly name.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ImageBuilder {
        ImageBuilder {
            name: name.into(),
            classes: Vec::new(),
        }
    }

    /// Assembly name, e.g. `engine.dll`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a class by namespace and simple name.
    #[must_use]
    pub fn class_id(&self, namespace: &str, name: &str) -> Option<ClassId> {
        self.by_name
            .get(&(namespace.to_string(), name.to_string()))
            .copied()
    }

    /// Returns the class with the given identifier.
    #[must_use]
    pub fn class(&self, id: ClassId) -> Option<&ClassDef> {
        self.classes.get(id.0)
    }

    /// Finds a class by simple name in any namespace.
    ///
    /// Class-typed values in descriptors use simple names, so an image never declares two
    /// classes with the same simple name.
    #[must_use]
    pub fn class_by_simple_name(&self, name: &str) -> Option<&ClassDef> {
        self.classes.iter().find(|class| class.name == name)
    }

    /// All classes in declaration order.
    #[must_use]
    pub fn classes(&self) -> &[ClassDef] {
        &self.classes
    }

    /// Checks whether `value` conforms to `ty`, including the runtime class of referenced
    /// objects.
    pub(crate) fn conforms(&self, heap: &ObjectHeap, ty: &ValueType, value: &ForeignValue) -> bool {
        if !ty.accepts(value) {
            return false;
        }
        let Some(reference) = value.as_object() else {
            return true;
        };
        let Ok(object) = heap.get(reference) else {
            return false;
        };

        match (ty, object) {
            (ValueType::String, HeapObject::String(_)) => true,
            (ValueType::Array(element), HeapObject::Array { element_type, .. }) => {
                **element == *element_type
            }
            (ValueType::Class(name), HeapObject::Object { class, .. }) => self
                .class(*class)
                .is_some_and(|class_def| class_def.name == *name),
            _ => false,
        }
    }
}

/// Builder for [`AssemblyImage`].
pub struct ImageBuilder {
    name: String,
    classes: Vec<ClassBuilder>,
}

impl ImageBuilder {
    /// Adds a class, configured by `configure`.
    #[must_use]
    pub fn class<F>(mut self, namespace: impl Into<String>, name: impl Into<String>, configure: F) -> Self
    where
        F: FnOnce(ClassBuilder) -> ClassBuilder,
    {
        let builder = ClassBuilder {
            namespace: namespace.into(),
            name: name.into(),
            fields: Vec::new(),
            methods: Vec::new(),
        };
        self.classes.push(configure(builder));
        self
    }

    /// Parses every declaration and produces the image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSignature`] for unparsable descriptors or type names and for
    /// duplicate classes, fields or methods, and [`Error::TypeNotFound`] when a declaration
    /// names a class the image does not define.
    pub fn build(self) -> Result<AssemblyImage> {
        let mut classes = Vec::with_capacity(self.classes.len());
        let mut by_name = HashMap::new();

        for (index, class) in self.classes.into_iter().enumerate() {
            let id = ClassId(index);
            if classes
                .iter()
                .any(|existing: &ClassDef| existing.name == class.name)
            {
                return Err(Error::InvalidSignature(format!(
                    "duplicate class {}.{}",
                    class.namespace, class.name
                )));
            }

            let mut fields: Vec<FieldDef> = Vec::with_capacity(class.fields.len());
            for (name, ty) in class.fields {
                if fields.iter().any(|field| field.name == name) {
                    return Err(Error::InvalidSignature(format!(
                        "duplicate field {}.{}.{}",
                        class.namespace, class.name, name
                    )));
                }
                let ty: ValueType = ty.parse()?;
                if ty == ValueType::Void {
                    return Err(Error::InvalidSignature(format!("void field {name}")));
                }
                fields.push(FieldDef { name, ty });
            }

            let mut methods: Vec<MethodDef> = Vec::with_capacity(class.methods.len());
            for (signature, ret, body) in class.methods {
                let desc: MethodDesc = signature.parse()?;
                if methods.iter().any(|method| method.desc == desc) {
                    return Err(Error::InvalidSignature(format!(
                        "duplicate method {}.{}:{}",
                        class.namespace, class.name, desc
                    )));
                }
                methods.push(MethodDef {
                    desc,
                    ret: ret.parse()?,
                    body,
                });
            }

            by_name.insert((class.namespace.clone(), class.name.clone()), id);
            classes.push(ClassDef {
                id,
                namespace: class.namespace,
                name: class.name,
                fields,
                methods,
            });
        }

        let image = AssemblyImage {
            name: self.name,
            classes,
            by_name,
        };
        image.check_class_references()?;
        Ok(image)
    }
}

impl AssemblyImage {
    fn check_class_references(&self) -> Result<()> {
        fn innermost(ty: &ValueType) -> &ValueType {
            match ty {
                ValueType::Array(element) => innermost(element),
                other => other,
            }
        }

        for class in &self.classes {
            let field_types = class.fields.iter().map(|field| &field.ty);
            let method_types = class
                .methods
                .iter()
                .flat_map(|method| method.params().iter().chain(std::iter::once(method.ret())));

            for ty in field_types.chain(method_types) {
                if let ValueType::Class(name) = innermost(ty) {
                    if self.class_by_simple_name(name).is_none() {
                        return Err(Error::TypeNotFound {
                            namespace: class.namespace.clone(),
                            name: name.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Builder for one class of an [`AssemblyImage`].
pub struct ClassBuilder {
    namespace: String,
    name: String,
    fields: Vec<(String, String)>,
    methods: Vec<(String, String, MethodBody)>,
}

impl ClassBuilder {
    /// Declares an instance field.
    ///
    /// # Arguments
    ///
    /// * `name` - Field name, e.g. `words_`
    /// * `ty` - Field type, e.g. `int[]`
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.fields.push((name.into(), ty.into()));
        self
    }

    /// Declares an instance method.
    ///
    /// # Arguments
    ///
    /// * `signature` - Descriptor, e.g. `AddCommand(int, Command)`
    /// * `ret` - Return type, e.g. `bool`
    /// * `body` - The method implementation
    #[must_use]
    pub fn method<F>(mut self, signature: impl Into<String>, ret: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut InvokeContext<'_>) -> InvokeResult + Send + Sync + 'static,
    {
        self.methods
            .push((signature.into(), ret.into(), Arc::new(body)));
        self
    }
}

/// Everything a method body can reach while it runs.
pub struct InvokeContext<'a> {
    image: &'a AssemblyImage,
    heap: &'a mut ObjectHeap,
    this: ObjectRef,
    args: &'a [ForeignValue],
}

impl<'a> InvokeContext<'a> {
    pub(crate) fn new(
        image: &'a AssemblyImage,
        heap: &'a mut ObjectHeap,
        this: ObjectRef,
        args: &'a [ForeignValue],
    ) -> Self {
        InvokeContext {
            image,
            heap,
            this,
            args,
        }
    }

    /// The instance the method was invoked on.
    #[must_use]
    pub fn this(&self) -> ObjectRef {
        self.this
    }

    /// All arguments.
    #[must_use]
    pub fn args(&self) -> &[ForeignValue] {
        self.args
    }

    /// The loaded image.
    #[must_use]
    pub fn image(&self) -> &AssemblyImage {
        self.image
    }

    /// Shared access to the heap.
    #[must_use]
    pub fn heap(&self) -> &ObjectHeap {
        &*self.heap
    }

    /// Exclusive access to the heap.
    pub fn heap_mut(&mut self) -> &mut ObjectHeap {
        &mut *self.heap
    }

    /// Returns argument `index`.
    ///
    /// # Errors
    ///
    /// `System.ArgumentException` if there is no such argument.
    pub fn arg(&self, index: usize) -> std::result::Result<&ForeignValue, ForeignException> {
        self.args
            .get(index)
            .ok_or_else(|| ForeignException::argument(format!("missing argument {index}")))
    }

    /// Returns `int` argument `index`.
    ///
    /// # Errors
    ///
    /// `System.ArgumentException` if the argument is missing or not an `int`.
    pub fn arg_i32(&self, index: usize) -> std::result::Result<i32, ForeignException> {
        let value = self.arg(index)?;
        value.as_i32().ok_or_else(|| {
            ForeignException::argument(format!("argument {index} is {}, expected int", value.kind()))
        })
    }

    /// Returns `bool` argument `index`.
    ///
    /// # Errors
    ///
    /// `System.ArgumentException` if the argument is missing or not a `bool`.
    pub fn arg_bool(&self, index: usize) -> std::result::Result<bool, ForeignException> {
        let value = self.arg(index)?;
        value.as_bool().ok_or_else(|| {
            ForeignException::argument(format!("argument {index} is {}, expected bool", value.kind()))
        })
    }

    /// Returns reference argument `index`.
    ///
    /// # Errors
    ///
    /// `System.NullReferenceException` for null, `System.ArgumentException` for a scalar.
    pub fn arg_object(&self, index: usize) -> std::result::Result<ObjectRef, ForeignException> {
        match self.arg(index)? {
            ForeignValue::Object(reference) => Ok(*reference),
            ForeignValue::Null => Err(ForeignException::null_reference(format!(
                "argument {index} is null"
            ))),
            other => Err(ForeignException::argument(format!(
                "argument {index} is {}, expected object",
                other.kind()
            ))),
        }
    }

    /// Reads `string` argument `index` as host text.
    ///
    /// # Errors
    ///
    /// As [`InvokeContext::arg_object`], plus `System.InvalidCastException` if the object is
    /// not a string.
    pub fn arg_string(&self, index: usize) -> std::result::Result<String, ForeignException> {
        let reference = self.arg_object(index)?;
        Ok(self.heap.string(reference)?)
    }

    /// Reads `byte[]` argument `index`.
    ///
    /// # Errors
    ///
    /// As [`InvokeContext::arg_object`], plus `System.InvalidCastException` if the object is
    /// not a byte array.
    pub fn arg_bytes(&self, index: usize) -> std::result::Result<Vec<u8>, ForeignException> {
        let reference = self.arg_object(index)?;
        self.bytes(reference)
    }

    /// Borrows the native state of `this` as `T`.
    ///
    /// # Errors
    ///
    /// `System.InvalidCastException` if `this` carries no `T`.
    pub fn native<T: Any>(&self) -> std::result::Result<&T, ForeignException> {
        Ok(self.heap.native::<T>(self.this)?)
    }

    /// Mutably borrows the native state of `this` as `T`.
    ///
    /// # Errors
    ///
    /// `System.InvalidCastException` if `this` carries no `T`.
    pub fn native_mut<T: Any>(&mut self) -> std::result::Result<&mut T, ForeignException> {
        Ok(self.heap.native_mut::<T>(self.this)?)
    }

    /// Attaches native state to `this`.
    ///
    /// # Errors
    ///
    /// `System.InvalidCastException` if `this` is not a class instance.
    pub fn set_native<T: NativeState>(&mut self, state: T) -> std::result::Result<(), ForeignException> {
        Ok(self.heap.set_native(self.this, Box::new(state))?)
    }

    /// Allocates an instance of the class with simple name `class`, with default field
    /// values. No constructor runs.
    ///
    /// # Errors
    ///
    /// `System.InvalidOperationException` for an unknown class, `System.OutOfMemoryException`
    /// if the heap is full.
    pub fn new_object(&mut self, class: &str) -> std::result::Result<ObjectRef, ForeignException> {
        let class_def = self.image.class_by_simple_name(class).ok_or_else(|| {
            ForeignException::invalid_operation(format!("unknown class {class}"))
        })?;
        Ok(self
            .heap
            .alloc_object(class_def.id(), class_def.default_fields())?)
    }

    fn field_slot(
        &self,
        object: ObjectRef,
        name: &str,
    ) -> std::result::Result<(usize, &'a FieldDef), ForeignException> {
        let class = self.heap.class_of(object)?;
        let image = self.image;
        let class_def = image.class(class).ok_or_else(|| {
            ForeignException::invalid_operation(format!("{object} has unknown {class}"))
        })?;
        let index = class_def.field_index(name).ok_or_else(|| {
            ForeignException::new(
                exception_type::BASE,
                format!("{} has no field {name}", class_def.full_name()),
            )
        })?;
        Ok((index, &class_def.fields[index]))
    }

    /// Reads field `name` of `object`.
    ///
    /// # Errors
    ///
    /// `System.Exception` for an unknown field, `System.NullReferenceException` for a freed
    /// object.
    pub fn field(&self, object: ObjectRef, name: &str) -> std::result::Result<ForeignValue, ForeignException> {
        let (index, _) = self.field_slot(object, name)?;
        Ok(self.heap.field(object, index)?)
    }

    /// Reads `int` field `name` of `object`.
    ///
    /// # Errors
    ///
    /// As [`InvokeContext::field`], plus `System.InvalidCastException` for a non-`int` value.
    pub fn field_i32(&self, object: ObjectRef, name: &str) -> std::result::Result<i32, ForeignException> {
        let value = self.field(object, name)?;
        value.as_i32().ok_or_else(|| {
            ForeignException::new(
                exception_type::INVALID_CAST,
                format!("field {name} is {}, expected int", value.kind()),
            )
        })
    }

    /// Reads `bool` field `name` of `object`.
    ///
    /// # Errors
    ///
    /// As [`InvokeContext::field`], plus `System.InvalidCastException` for a non-`bool` value.
    pub fn field_bool(&self, object: ObjectRef, name: &str) -> std::result::Result<bool, ForeignException> {
        let value = self.field(object, name)?;
        value.as_bool().ok_or_else(|| {
            ForeignException::new(
                exception_type::INVALID_CAST,
                format!("field {name} is {}, expected bool", value.kind()),
            )
        })
    }

    /// Writes field `name` of `object`, checking the declared field type.
    ///
    /// # Errors
    ///
    /// As [`InvokeContext::field`], plus `System.InvalidCastException` if `value` does not
    /// fit the field.
    pub fn set_field(
        &mut self,
        object: ObjectRef,
        name: &str,
        value: ForeignValue,
    ) -> std::result::Result<(), ForeignException> {
        let (index, field) = self.field_slot(object, name)?;
        if !self.image.conforms(self.heap, &field.ty, &value) {
            return Err(ForeignException::new(
                exception_type::INVALID_CAST,
                format!("cannot store {} in {name}: {}", value.kind(), field.ty),
            ));
        }
        Ok(self.heap.set_field(object, index, value)?)
    }

    /// Allocates a string.
    ///
    /// # Errors
    ///
    /// `System.OutOfMemoryException` if the heap is full.
    pub fn alloc_string(&mut self, value: &str) -> std::result::Result<ObjectRef, ForeignException> {
        Ok(self.heap.alloc_string(value)?)
    }

    /// Reads a string object.
    ///
    /// # Errors
    ///
    /// `System.InvalidCastException` if `object` is not a string.
    pub fn string(&self, object: ObjectRef) -> std::result::Result<String, ForeignException> {
        Ok(self.heap.string(object)?)
    }

    /// Allocates an `int[]` holding `values`.
    ///
    /// # Errors
    ///
    /// `System.OutOfMemoryException` if the heap is full.
    pub fn alloc_i32_array(&mut self, values: &[i32]) -> std::result::Result<ObjectRef, ForeignException> {
        let elements = values.iter().copied().map(ForeignValue::I32).collect();
        Ok(self.heap.alloc_array(ValueType::Int32, elements)?)
    }

    /// Reads an `int[]` object.
    ///
    /// # Errors
    ///
    /// `System.InvalidCastException` if `object` is not an `int[]`.
    pub fn i32_array(&self, object: ObjectRef) -> std::result::Result<Vec<i32>, ForeignException> {
        self.heap
            .array(object)?
            .iter()
            .map(|value| {
                value.as_i32().ok_or_else(|| {
                    ForeignException::new(exception_type::INVALID_CAST, "expected int[] element")
                })
            })
            .collect()
    }

    /// Allocates a `byte[]` holding `values`.
    ///
    /// # Errors
    ///
    /// `System.OutOfMemoryException` if the heap is full.
    pub fn alloc_bytes(&mut self, values: &[u8]) -> std::result::Result<ObjectRef, ForeignException> {
        let elements = values.iter().copied().map(ForeignValue::U8).collect();
        Ok(self.heap.alloc_array(ValueType::Byte, elements)?)
    }

    /// Reads a `byte[]` object.
    ///
    /// # Errors
    ///
    /// `System.InvalidCastException` if `object` is not a `byte[]`.
    pub fn bytes(&self, object: ObjectRef) -> std::result::Result<Vec<u8>, ForeignException> {
        self.heap
            .array(object)?
            .iter()
            .map(|value| {
                value.as_u8().ok_or_else(|| {
                    ForeignException::new(exception_type::INVALID_CAST, "expected byte[] element")
                })
            })
            .collect()
    }

    /// Deep-copies `this`, including its native state.
    ///
    /// # Errors
    ///
    /// `System.OutOfMemoryException` if the copy does not fit.
    pub fn clone_this(&mut self) -> std::result::Result<ObjectRef, ForeignException> {
        Ok(self.heap.clone_deep(self.this)?)
    }

    /// Copies `this` member-wise: the copy gets its own native state but its fields refer to
    /// the same objects.
    ///
    /// # Errors
    ///
    /// `System.OutOfMemoryException` if the copy does not fit.
    pub fn memberwise_clone_this(&mut self) -> std::result::Result<ObjectRef, ForeignException> {
        Ok(self.heap.clone_shallow(self.this)?)
    }
}
