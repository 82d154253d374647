//! The foreign environment handle.
//!
//! An [`Environment`] is one initialized session of the embedded runtime: the loaded
//! assembly image plus a domain holding the object heap. The handle is cheap to clone; every
//! clone refers to the same session.
//!
//! # Serialization
//!
//! All access to the domain goes through [`Environment::enter`], which holds the
//! environment's single lock for the duration of the closure. One marshal, invoke and
//! unmarshal sequence therefore runs without interleaving with any other call into the same
//! environment.
//!
//! # Object Lifetime
//!
//! Objects allocated in a [`CallScope`], by the host or by a method body, need no explicit
//! release. When the scope ends, every object that no pinned root can reach is collected.
//! [`CallScope::keep`] pins an object the host holds on to, such as an emulator instance, and
//! [`CallScope::release`] drops that pin again.
//!
//! An engine may keep argument objects it receives by storing them in a field of a rooted
//! object; they then live as long as that object references them.
//!
//! # Teardown
//!
//! [`Environment::teardown`] clears the heap and marks the session dead. Every later
//! [`Environment::enter`] fails with [`Error::UseAfterTeardown`].

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use log::{info, trace};

use crate::{
    config::BridgeConfig,
    runtime::{
        exception::exception_type, AssemblyImage, FieldRef, ForeignException, ForeignValue,
        InvokeContext, MethodRef, ObjectHeap, ObjectRef, RuntimeHost, TypeRef, ValueType,
    },
    Error, Result,
};

struct Domain {
    heap: ObjectHeap,
}

struct EnvironmentInner {
    host: Arc<RuntimeHost>,
    image: Arc<AssemblyImage>,
    domain_name: String,
    domain: Mutex<Domain>,
    live: AtomicBool,
}

/// Handle to a live embedded environment.
#[derive(Clone)]
pub struct Environment {
    inner: Arc<EnvironmentInner>,
}

impl Environment {
    /// Initializes the embedded environment on `host`.
    ///
    /// Loads the assembly named by `config.assembly` into a fresh domain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EnvironmentInit`] if the assembly is not installed on `host`, if an
    /// environment is already live on `host`, or if `host` was torn down.
    pub fn initialize(host: &Arc<RuntimeHost>, config: &BridgeConfig) -> Result<Environment> {
        let image = host.assembly(&config.assembly).ok_or_else(|| {
            Error::EnvironmentInit(format!("assembly {} is not installed", config.assembly))
        })?;
        host.acquire()?;

        info!(
            "initialized environment, domain {} with {}",
            config.domain_name,
            image.name()
        );
        Ok(Environment {
            inner: Arc::new(EnvironmentInner {
                host: Arc::clone(host),
                image,
                domain_name: config.domain_name.clone(),
                domain: Mutex::new(Domain {
                    heap: ObjectHeap::new(config.max_heap_objects),
                }),
                live: AtomicBool::new(true),
            }),
        })
    }

    /// Tears the environment down.
    ///
    /// Frees every object and moves the host to its terminal state. Calling it again has no
    /// effect.
    pub fn teardown(&self) {
        if !self.inner.live.swap(false, Ordering::AcqRel) {
            return;
        }

        let freed = {
            let mut domain = self.domain_guard();
            let count = domain.heap.len();
            domain.heap.clear();
            count
        };
        self.inner.host.release();
        info!(
            "tore down environment, domain {} ({} objects freed)",
            self.inner.domain_name, freed
        );
    }

    /// Returns `true` until [`Environment::teardown`] runs.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.inner.live.load(Ordering::Acquire)
    }

    /// Fails with [`Error::UseAfterTeardown`] once the environment is dead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UseAfterTeardown`] after teardown.
    pub fn ensure_live(&self) -> Result<()> {
        if self.is_live() {
            Ok(())
        } else {
            Err(Error::UseAfterTeardown)
        }
    }

    /// The loaded assembly image.
    #[must_use]
    pub fn image(&self) -> Arc<AssemblyImage> {
        Arc::clone(&self.inner.image)
    }

    /// Name of the domain.
    #[must_use]
    pub fn domain_name(&self) -> &str {
        &self.inner.domain_name
    }

    /// Returns `true` if both handles refer to the same session.
    #[must_use]
    pub fn same(&self, other: &Environment) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of live objects on the heap.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UseAfterTeardown`] after teardown or [`Error::LockError`] if the
    /// lock is poisoned.
    pub fn object_count(&self) -> Result<usize> {
        self.ensure_live()?;
        let domain = lock!(self.inner.domain)?;
        Ok(domain.heap.len())
    }

    /// Runs `f` with exclusive access to the environment.
    ///
    /// Unreachable objects are collected when `f` returns, whether it succeeded or not.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UseAfterTeardown`] after teardown, [`Error::LockError`] if the lock
    /// is poisoned, or whatever `f` returns.
    pub fn enter<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut CallScope<'_>) -> Result<R>,
    {
        self.ensure_live()?;
        let mut domain = lock!(self.inner.domain)?;
        // teardown may have completed while we waited for the lock
        self.ensure_live()?;

        let mut scope = CallScope::new(&self.inner.image, &mut domain.heap);
        f(&mut scope)
    }

    fn domain_guard(&self) -> MutexGuard<'_, Domain> {
        match self.inner.domain.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("domain", &self.inner.domain_name)
            .field("assembly", &self.inner.image.name())
            .field("live", &self.is_live())
            .finish()
    }
}

/// One locked sequence of calls into an [`Environment`].
pub struct CallScope<'a> {
    image: &'a AssemblyImage,
    heap: &'a mut ObjectHeap,
}

impl<'a> CallScope<'a> {
    fn new(image: &'a AssemblyImage, heap: &'a mut ObjectHeap) -> Self {
        CallScope { image, heap }
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

    /// Invokes `method` on `this`.
    ///
    /// Arguments are checked against the method's parameter list before the body runs, and
    /// the returned value against its declared return type afterwards.
    ///
    /// # Errors
    ///
    /// - [`Error::ArgumentMismatch`] if `this` is not an instance of the declaring class or
    ///   the arguments do not match the parameters
    /// - [`Error::UseAfterFree`] if `this`, an argument or the returned value refers to a
    ///   freed object
    /// - [`Error::ForeignException`] if the body throws or panics
    /// - [`Error::Marshal`] if the body returns a value of the wrong type
    /// - [`Error::MethodNotFound`] if `method` was not resolved against this image
    pub fn invoke(
        &mut self,
        method: &MethodRef,
        this: ObjectRef,
        args: &[ForeignValue],
    ) -> Result<ForeignValue> {
        let image = self.image;
        let def = image
            .class(method.class)
            .and_then(|class| class.methods().get(method.index))
            .filter(|def| def.desc() == method.desc())
            .ok_or_else(|| Error::MethodNotFound {
                type_name: method.type_name().to_string(),
                signature: method.desc().to_string(),
            })?;

        let class = self.heap.class_of(this)?;
        if class != method.class {
            return Err(Error::ArgumentMismatch {
                method: method.to_string(),
                message: format!("{this} is not an instance of {}", method.type_name()),
            });
        }
        if args.len() != def.params().len() {
            return Err(Error::ArgumentMismatch {
                method: method.to_string(),
                message: format!(
                    "expected {} arguments, got {}",
                    def.params().len(),
                    args.len()
                ),
            });
        }
        for (position, (param, arg)) in def.params().iter().zip(args).enumerate() {
            self.ensure_present(arg)?;
            if !image.conforms(self.heap, param, arg) {
                return Err(Error::ArgumentMismatch {
                    method: method.to_string(),
                    message: format!("argument {position} is {}, expected {param}", arg.kind()),
                });
            }
        }

        trace!("invoke {method} on {this}");
        let body = def.body();
        let outcome = {
            let mut ctx = InvokeContext::new(image, self.heap, this, args);
            panic::catch_unwind(AssertUnwindSafe(|| body(&mut ctx)))
        };

        let value = match outcome {
            Ok(Ok(value)) => value,
            Ok(Err(exception)) => {
                trace!("{method} threw {exception}");
                return Err(Error::ForeignException(exception));
            }
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|text| (*text).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "method body panicked".to_string());
                return Err(Error::ForeignException(ForeignException::new(
                    exception_type::EXECUTION_ENGINE,
                    message,
                )));
            }
        };

        self.ensure_present(&value)?;
        if !image.conforms(self.heap, def.ret(), &value) {
            return Err(marshal_error!(
                "{} returned {}, declared {}",
                method,
                value.kind(),
                def.ret()
            ));
        }
        Ok(value)
    }

    /// Allocates an instance of `ty` and runs `ctor` on it.
    ///
    /// The instance is collected with the scope unless [`CallScope::keep`] is called.
    ///
    /// # Errors
    ///
    /// Same as [`CallScope::invoke`], plus [`Error::TypeNotFound`] if `ty` is unknown to this
    /// image.
    pub fn new_object(
        &mut self,
        ty: &TypeRef,
        ctor: &MethodRef,
        args: &[ForeignValue],
    ) -> Result<ObjectRef> {
        let object = self.alloc_object(ty)?;
        self.invoke(ctor, object, args)?;
        Ok(object)
    }

    /// Allocates an instance of `ty` with default field values, without running a
    /// constructor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] if `ty` is unknown to this image, or
    /// [`Error::HeapLimitExceeded`].
    pub fn alloc_object(&mut self, ty: &TypeRef) -> Result<ObjectRef> {
        let class = self
            .image
            .class(ty.class)
            .ok_or_else(|| Error::TypeNotFound {
                namespace: ty.namespace().to_string(),
                name: ty.name().to_string(),
            })?;
        self.heap.alloc_object(class.id(), class.default_fields())
    }

    /// Allocates a string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HeapLimitExceeded`] if the heap is full.
    pub fn alloc_string(&mut self, value: &str) -> Result<ObjectRef> {
        self.heap.alloc_string(value)
    }

    /// Allocates an array.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Marshal`] if an element does not fit `element_type`, or
    /// [`Error::HeapLimitExceeded`].
    pub fn alloc_array(
        &mut self,
        element_type: ValueType,
        elements: Vec<ForeignValue>,
    ) -> Result<ObjectRef> {
        self.heap.alloc_array(element_type, elements)
    }

    /// Reads a field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UseAfterFree`] or [`Error::Marshal`] if `object` is not an instance
    /// of the field's class.
    pub fn field(&self, object: ObjectRef, field: &FieldRef) -> Result<ForeignValue> {
        self.check_field_owner(object, field)?;
        self.heap.field(object, field.index)
    }

    /// Writes a field, checking the declared field type.
    ///
    /// # Errors
    ///
    /// Same as [`CallScope::field`], plus [`Error::Marshal`] if `value` does not fit.
    pub fn set_field(&mut self, object: ObjectRef, field: &FieldRef, value: ForeignValue) -> Result<()> {
        self.check_field_owner(object, field)?;
        if !self.image.conforms(self.heap, field.ty(), &value) {
            return Err(marshal_error!(
                "cannot store {} in field {}: {}",
                value.kind(),
                field.name(),
                field.ty()
            ));
        }
        self.heap.set_field(object, field.index, value)
    }

    fn check_field_owner(&self, object: ObjectRef, field: &FieldRef) -> Result<()> {
        if self.heap.class_of(object)? == field.class {
            Ok(())
        } else {
            Err(marshal_error!(
                "{} has no field {}",
                object,
                field.name()
            ))
        }
    }

    /// Reads a string object as host text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UseAfterFree`] or [`Error::Marshal`].
    pub fn string(&self, object: ObjectRef) -> Result<String> {
        self.heap.string(object)
    }

    /// Length of an array object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UseAfterFree`] or [`Error::Marshal`].
    pub fn array_len(&self, object: ObjectRef) -> Result<usize> {
        self.heap.array_len(object)
    }

    /// One element of an array object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UseAfterFree`] or [`Error::Marshal`].
    pub fn array_element(&self, object: ObjectRef, index: usize) -> Result<ForeignValue> {
        self.heap.array_element(object, index)
    }

    /// Element type of an array object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UseAfterFree`] or [`Error::Marshal`].
    pub fn array_element_type(&self, object: ObjectRef) -> Result<ValueType> {
        self.heap.array_element_type(object).cloned()
    }

    /// Pins `object` so it outlives the scope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UseAfterFree`] if `object` was already freed.
    pub fn keep(&mut self, object: ObjectRef) -> Result<()> {
        self.heap.pin(object)
    }

    /// Drops the pin taken by [`CallScope::keep`].
    ///
    /// Only the pin is dropped. The object, and whatever it references, is collected at the
    /// end of the scope unless another root still reaches it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UseAfterFree`] if `object` was already freed.
    pub fn release(&mut self, object: ObjectRef) -> Result<()> {
        if !self.heap.contains(object) {
            return Err(Error::UseAfterFree { reference: object });
        }
        self.heap.unpin(object);
        trace!("released {object}");
        Ok(())
    }

    fn ensure_present(&self, value: &ForeignValue) -> Result<()> {
        match value.as_object() {
            Some(reference) if !self.heap.contains(reference) => {
                Err(Error::UseAfterFree { reference })
            }
            _ => Ok(()),
        }
    }
}

impl Drop for CallScope<'_> {
    fn drop(&mut self) {
        let freed = self.heap.collect();
        if freed > 0 {
            trace!("collected {freed} objects");
        }
    }
}
