//! Type, method and field resolution against the loaded assembly image.
//!
//! Resolution turns textual names into handles that can be invoked without any further
//! lookup. Methods are identified by a descriptor of the form `Name(type, type)`, for example
//! `AddCommand(int, Command)` or `.ctor()`, matched exactly on name and parameter list.
//!
//! All lookups happen once, while an emulator instance is being constructed. The resulting
//! [`TypeRef`], [`MethodRef`] and [`FieldRef`] values stay valid for the lifetime of the
//! environment they were resolved in.

use std::{fmt, str::FromStr};

use log::debug;

use crate::{
    runtime::{image::ClassId, Environment, ValueType},
    Error, Result,
};

/// Parsed method descriptor, `Name(param, param)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodDesc {
    /// Method name, e.g. `GetCommand` or `.ctor`.
    pub name: String,
    /// Parameter types in declaration order.
    pub params: Vec<ValueType>,
}

impl MethodDesc {
    /// Creates a descriptor from its parts.
    #[must_use]
    pub fn new(name: impl Into<String>, params: Vec<ValueType>) -> Self {
        MethodDesc {
            name: name.into(),
            params,
        }
    }
}

impl FromStr for MethodDesc {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let invalid = || Error::InvalidSignature(text.to_string());

        let text_trimmed = text.trim();
        let (name, rest) = text_trimmed.split_once('(').ok_or_else(invalid)?;
        let params_text = rest.strip_suffix(')').ok_or_else(invalid)?;

        let name = name.trim();
        let bare = name.strip_prefix('.').unwrap_or(name);
        if bare.is_empty()
            || !bare.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
            || !bare.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(invalid());
        }

        let params = if params_text.trim().is_empty() {
            Vec::new()
        } else {
            params_text
                .split(',')
                .map(|param| param.parse::<ValueType>().map_err(|_| invalid()))
                .collect::<Result<Vec<_>>>()?
        };

        if params.iter().any(|param| *param == ValueType::Void) {
            return Err(invalid());
        }

        Ok(MethodDesc::new(name, params))
    }
}

impl fmt::Display for MethodDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (index, param) in self.params.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        f.write_str(")")
    }
}

/// A resolved class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeRef {
    pub(crate) class: ClassId,
    namespace: String,
    name: String,
}

impl TypeRef {
    /// Class namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Simple class name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `namespace.name`
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    /// Class identifier within the image.
    #[must_use]
    pub fn class_id(&self) -> ClassId {
        self.class
    }
}

/// A resolved, directly invocable method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodRef {
    pub(crate) class: ClassId,
    pub(crate) index: usize,
    type_name: String,
    desc: MethodDesc,
    ret: ValueType,
}

impl MethodRef {
    /// Fully qualified name of the declaring class.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

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

    /// The descriptor this method was resolved with.
    #[must_use]
    pub fn desc(&self) -> &MethodDesc {
        &self.desc
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_name, self.desc)
    }
}

/// A resolved instance field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldRef {
    pub(crate) class: ClassId,
    pub(crate) index: usize,
    name: String,
    ty: ValueType,
}

impl FieldRef {
    /// Field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared field type.
    #[must_use]
    pub fn ty(&self) -> &ValueType {
        &self.ty
    }
}

/// Resolves a class by namespace and simple name.
///
/// # Errors
///
/// Returns [`Error::UseAfterTeardown`] if the environment is dead, or
/// [`Error::TypeNotFound`] if the image has no such class.
pub fn resolve_type(env: &Environment, namespace: &str, name: &str) -> Result<TypeRef> {
    env.ensure_live()?;
    let image = env.image();
    let class = image
        .class_id(namespace, name)
        .ok_or_else(|| Error::TypeNotFound {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })?;

    debug!("resolved type {namespace}.{name} as {class}");
    Ok(TypeRef {
        class,
        namespace: namespace.to_string(),
        name: name.to_string(),
    })
}

/// Resolves a method on `ty` by descriptor, ignoring the return type.
///
/// # Errors
///
/// Returns [`Error::InvalidSignature`] for descriptor text that does not parse,
/// [`Error::MethodNotFound`] if no method matches, or [`Error::UseAfterTeardown`].
pub fn resolve_method(env: &Environment, ty: &TypeRef, signature: &str) -> Result<MethodRef> {
    let desc: MethodDesc = signature.parse()?;
    lookup_method(env, ty, desc, None)
}

/// Resolves a method on `ty` and checks its declared return type.
///
/// A method whose name and parameters match but whose return type differs is reported as
/// missing.
///
/// # Errors
///
/// Same as [`resolve_method`].
pub fn resolve_method_returning(
    env: &Environment,
    ty: &TypeRef,
    signature: &str,
    ret: &ValueType,
) -> Result<MethodRef> {
    let desc: MethodDesc = signature.parse()?;
    lookup_method(env, ty, desc, Some(ret))
}

fn lookup_method(
    env: &Environment,
    ty: &TypeRef,
    desc: MethodDesc,
    expected_ret: Option<&ValueType>,
) -> Result<MethodRef> {
    env.ensure_live()?;
    let image = env.image();
    let not_found = || Error::MethodNotFound {
        type_name: ty.full_name(),
        signature: match expected_ret {
            Some(ret) => format!("{desc} -> {ret}"),
            None => desc.to_string(),
        },
    };

    let class = image.class(ty.class).ok_or_else(not_found)?;
    let (index, method) = class.find_method(&desc).ok_or_else(not_found)?;
    if expected_ret.is_some_and(|ret| ret != method.ret()) {
        return Err(not_found());
    }

    debug!("resolved method {}:{} -> {}", ty.full_name(), desc, method.ret());
    Ok(MethodRef {
        class: ty.class,
        index,
        type_name: ty.full_name(),
        ret: method.ret().clone(),
        desc,
    })
}

/// Resolves an instance field on `ty`.
///
/// # Errors
///
/// Returns [`Error::FieldNotFound`] if the class declares no such field, or
/// [`Error::UseAfterTeardown`].
pub fn resolve_field(env: &Environment, ty: &TypeRef, name: &str) -> Result<FieldRef> {
    env.ensure_live()?;
    let image = env.image();
    let not_found = || Error::FieldNotFound {
        type_name: ty.full_name(),
        field: name.to_string(),
    };

    let class = image.class(ty.class).ok_or_else(not_found)?;
    let index = class.field_index(name).ok_or_else(not_found)?;
    let field = &class.fields()[index];

    debug!("resolved field {}.{}: {}", ty.full_name(), name, field.ty);
    Ok(FieldRef {
        class: ty.class,
        index,
        name: name.to_string(),
        ty: field.ty.clone(),
    })
}
