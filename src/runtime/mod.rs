//! The embedded execution environment.
//!
//! This module models the foreign runtime the Execution Engine lives in. It provides:
//!
//! - [`RuntimeHost`] - process-wide runtime with installed assemblies and a one-shot lifecycle
//! - [`Environment`] - one live session: loaded image, object heap and the call lock
//! - [`AssemblyImage`] - classes with typed fields and host-implemented method bodies
//! - [`ObjectHeap`] - arena of foreign strings, arrays and class instances
//! - resolution of types, methods and fields into directly invocable handles
//!
//! # Architecture
//!
//! ```text
//! RuntimeHost ──install──> AssemblyImage
//!      │                        │
//!      └──initialize──> Environment ──enter──> CallScope ──invoke──> MethodDef body
//!                           │                      │                      │
//!                      resolve_* ──> MethodRef     └────── ObjectHeap <───┘
//! ```
//!
//! Everything a caller does with the environment happens inside [`Environment::enter`],
//! which serializes access behind a single lock.

mod environment;
mod exception;
mod heap;
mod host;
mod image;
mod resolver;
mod value;

pub use environment::{CallScope, Environment};
pub use exception::{exception_type, ForeignException};
pub use heap::{HeapObject, NativeState, ObjectHeap};
pub use host::{HostState, RuntimeHost};
pub use image::{
    AssemblyImage, ClassBuilder, ClassDef, ClassId, FieldDef, ImageBuilder, InvokeContext,
    InvokeResult, MethodBody, MethodDef,
};
pub use resolver::{
    resolve_field, resolve_method, resolve_method_returning, resolve_type, FieldRef, MethodDesc,
    MethodRef, TypeRef,
};
pub use value::{ForeignValue, ObjectRef, ValueType};
