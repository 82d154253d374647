//! Emulator instances and their lifecycle.
//!
//! An [`Emulator`] couples one [`Environment`], one foreign emulator object and the shared
//! [`MethodCache`]. The first instance created in an environment is its owner. Further
//! instances are made with [`Emulator::try_clone`]; they share the environment and the cache
//! but each owns an independent foreign object.
//!
//! # Ownership
//!
//! - destroying a clone drops its pin on its own foreign object
//! - destroying the owner releases its object and tears the environment down, after which
//!   every remaining clone fails with [`Error::UseAfterTeardown`]
//!
//! [`Emulator::destroy`] consumes the instance, so it cannot be used afterwards. Dropping an
//! instance performs the same release and logs any failure.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::{
    bridge::{
        facade::ExecutionState,
        marshal::{FromForeign, ToForeign},
        methods::{CommandMethods, EmulatorMethods, MethodCache},
    },
    config::BridgeConfig,
    runtime::{Environment, MethodRef, ObjectRef, RuntimeHost},
    Error, Result,
};

/// Whether an instance owns its environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Created the environment and tears it down when destroyed.
    Owner,
    /// Produced by [`Emulator::try_clone`]; releases only its own object.
    Clone,
}

/// A live MT1804 emulator inside the embedded environment.
///
/// # Examples
///
/// ```rust,no_run
/// use mtemu_bridge::{BridgeConfig, Command, Emulator, ResultCode};
///
/// let mut emulator = Emulator::new(BridgeConfig::default())?;
/// emulator.add_command(0, &Command::new(false, 0, vec![0, 0, 0, 0, 0, 0, 0, 0, 0, 0]))?;
///
/// let mut probe = emulator.try_clone()?;
/// if probe.exec_one()? == ResultCode::Ok {
///     println!("probe advanced to {}", probe.pc()?);
/// }
/// probe.destroy()?;
/// emulator.destroy()?;
/// # Ok::<(), mtemu_bridge::Error>(())
/// ```
#[derive(Debug)]
pub struct Emulator {
    env: Environment,
    cache: Arc<MethodCache>,
    object: ObjectRef,
    role: Role,
    pub(crate) state: ExecutionState,
    released: bool,
}

impl Emulator {
    /// Creates the owner instance on the process-wide [`RuntimeHost`].
    ///
    /// Initializes the environment, resolves every method and instantiates the foreign
    /// emulator through its parameterless constructor.
    ///
    /// # Errors
    ///
    /// - [`Error::EnvironmentInit`] if the environment cannot be initialized, including when
    ///   one is already live or was torn down
    /// - [`Error::TypeNotFound`], [`Error::MethodNotFound`], [`Error::FieldNotFound`] if the
    ///   engine does not expose the expected surface
    /// - [`Error::ForeignException`] if the constructor throws
    pub fn new(config: BridgeConfig) -> Result<Self> {
        Self::new_in(&RuntimeHost::global(), config)
    }

    /// Creates the owner instance on `host`.
    ///
    /// If anything after environment initialization fails, the environment is torn down
    /// again before the error is returned.
    ///
    /// # Errors
    ///
    /// Same as [`Emulator::new`].
    pub fn new_in(host: &Arc<RuntimeHost>, config: BridgeConfig) -> Result<Self> {
        let env = Environment::initialize(host, &config)?;
        match Self::bind(&env, &config) {
            Ok((cache, object)) => {
                info!(
                    "created {} instance {} in domain {}",
                    config.emulator_type_name(),
                    object,
                    env.domain_name()
                );
                Ok(Emulator {
                    env,
                    cache: Arc::new(cache),
                    object,
                    role: Role::Owner,
                    state: ExecutionState::Idle,
                    released: false,
                })
            }
            Err(error) => {
                env.teardown();
                Err(error)
            }
        }
    }

    fn bind(env: &Environment, config: &BridgeConfig) -> Result<(MethodCache, ObjectRef)> {
        let cache = MethodCache::resolve(env, config)?;
        let object = env.enter(|scope| {
            let object = scope.new_object(&cache.emulator_type, &cache.ctor, &[])?;
            scope.keep(object)?;
            Ok(object)
        })?;
        Ok((cache, object))
    }

    /// Creates an independent copy through the engine's `Clone()`.
    ///
    /// The copy shares the environment and method cache and starts in this instance's
    /// execution state. Changes to either instance are not visible in the other.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UseAfterTeardown`] if the environment is gone, or
    /// [`Error::ForeignException`] if the engine fails to clone.
    pub fn try_clone(&self) -> Result<Emulator> {
        let method = &self.cache.emulator.clone;
        let object = self.env.enter(|scope| {
            let copy = scope
                .invoke(method, self.object, &[])?
                .as_object()
                .ok_or_else(|| marshal_error!("Clone() returned null"))?;
            if copy == self.object {
                return Err(marshal_error!("Clone() returned the source instance"));
            }
            scope.keep(copy)?;
            Ok(copy)
        })?;

        debug!("cloned {} into {}", self.object, object);
        Ok(Emulator {
            env: self.env.clone(),
            cache: Arc::clone(&self.cache),
            object,
            role: Role::Clone,
            state: self.state,
            released: false,
        })
    }

    /// Exchanges the foreign objects and execution states of `a` and `b`.
    ///
    /// Roles stay with the instances: the owner remains the owner.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EnvironmentMismatch`] if the instances live in different
    /// environments, or [`Error::UseAfterTeardown`].
    pub fn swap(a: &mut Emulator, b: &mut Emulator) -> Result<()> {
        if !a.env.same(&b.env) {
            return Err(Error::EnvironmentMismatch);
        }
        a.env.ensure_live()?;

        std::mem::swap(&mut a.object, &mut b.object);
        std::mem::swap(&mut a.state, &mut b.state);
        debug!("swapped {} and {}", a.object, b.object);
        Ok(())
    }

    /// Releases the instance.
    ///
    /// A clone gives up its own foreign object reference. Objects the engine shares between
    /// instances stay alive while another instance still reaches them. The owner gives up its
    /// reference and tears the environment down.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UseAfterFree`] if the object was already gone, or
    /// [`Error::LockError`]. The environment is torn down by the owner even when releasing
    /// its object fails.
    pub fn destroy(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let object = self.object;
        let freed = if self.env.is_live() {
            self.env.enter(|scope| scope.release(object))
        } else {
            Ok(())
        };

        if self.role == Role::Owner {
            self.env.teardown();
        }
        debug!("released {:?} instance {}", self.role, object);
        freed
    }

    /// Whether this instance was produced by [`Emulator::try_clone`].
    #[must_use]
    pub fn is_clone(&self) -> bool {
        self.role == Role::Clone
    }

    /// Role of this instance.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// The environment this instance lives in.
    #[must_use]
    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// The shared method cache.
    #[must_use]
    pub fn method_cache(&self) -> &Arc<MethodCache> {
        &self.cache
    }

    /// Reference to the foreign emulator object.
    #[must_use]
    pub fn object(&self) -> ObjectRef {
        self.object
    }

    /// Invokes an emulator method with marshalled arguments and unmarshals its result.
    pub(crate) fn invoke<R: FromForeign>(
        &self,
        select: fn(&EmulatorMethods) -> &MethodRef,
        args: &[&dyn ToForeign],
    ) -> Result<R> {
        let cache = &self.cache;
        let method = select(&cache.emulator);
        let object = self.object;
        self.env.enter(|scope| {
            let values = args
                .iter()
                .map(|arg| arg.to_foreign(scope, &cache.records))
                .collect::<Result<Vec<_>>>()?;
            let value = scope.invoke(method, object, &values)?;
            R::from_foreign(scope, &cache.records, value)
        })
    }

    /// Invokes a method of a record object built from `record`.
    pub(crate) fn call_on_record<R: FromForeign>(
        &self,
        record: &dyn ToForeign,
        select: fn(&CommandMethods) -> &MethodRef,
    ) -> Result<R> {
        let cache = &self.cache;
        let method = select(&cache.command);
        self.env.enter(|scope| {
            let receiver = record
                .to_foreign(scope, &cache.records)?
                .as_object()
                .ok_or_else(|| marshal_error!("record marshalled to a non-object"))?;
            let value = scope.invoke(method, receiver, &[])?;
            R::from_foreign(scope, &cache.records, value)
        })
    }
}

impl Drop for Emulator {
    fn drop(&mut self) {
        if let Err(error) = self.release() {
            warn!("releasing emulator {} failed: {}", self.object, error);
        }
    }
}
