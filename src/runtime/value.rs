//! Values crossing the boundary into the embedded environment.
//!
//! Everything a method body receives or returns is a [`ForeignValue`]. Scalars are carried
//! inline; strings, arrays and class instances live on the [`ObjectHeap`](super::ObjectHeap)
//! and are referenced through an [`ObjectRef`].
//!
//! [`ValueType`] is the small type language used by method descriptors and field
//! declarations. Its textual form follows the C#-style keywords the engine exposes
//! (`int`, `bool`, `byte`, `string`, `void`, `T[]` and bare class names), so a descriptor
//! such as `AddCommand(int, Command)` can be parsed and compared against the declaration.

use std::{fmt, str::FromStr};

use crate::{Error, Result};

/// Reference to an object allocated on the foreign heap.
///
/// `ObjectRef` is an opaque handle. Identifiers are never reused, so a reference that
/// outlives its object is detected as [`Error::UseAfterFree`] instead of silently aliasing a
/// newer allocation.
///
/// # Equality
///
/// Two `ObjectRef` values are equal if they point to the same heap object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef(pub(crate) u64);

impl ObjectRef {
    /// Creates a new object reference with the given ID.
    ///
    /// This is typically called by the heap when allocating new objects.
    #[must_use]
    pub fn new(id: u64) -> Self {
        ObjectRef(id)
    }

    /// Returns the internal ID of this reference.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({})", self.0)
    }
}

/// A value passed to, or returned from, a foreign method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ForeignValue {
    /// No value (void return).
    Void,
    /// The null reference.
    Null,
    /// A boolean.
    Bool(bool),
    /// A 32-bit signed integer.
    I32(i32),
    /// An unsigned byte.
    U8(u8),
    /// A reference to a heap object (string, array or class instance).
    Object(ObjectRef),
}

impl ForeignValue {
    /// Returns a short name for the kind of value, used in marshalling errors.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ForeignValue::Void => "void",
            ForeignValue::Null => "null",
            ForeignValue::Bool(_) => "bool",
            ForeignValue::I32(_) => "int",
            ForeignValue::U8(_) => "byte",
            ForeignValue::Object(_) => "object",
        }
    }

    /// Returns the integer payload, if this is an `int`.
    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            ForeignValue::I32(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the boolean payload, if this is a `bool`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ForeignValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the byte payload, if this is a `byte`.
    #[must_use]
    pub fn as_u8(&self) -> Option<u8> {
        match self {
            ForeignValue::U8(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the referenced object, if this is a non-null reference.
    #[must_use]
    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            ForeignValue::Object(reference) => Some(*reference),
            _ => None,
        }
    }

    /// Returns `true` for [`ForeignValue::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, ForeignValue::Null)
    }
}

impl From<i32> for ForeignValue {
    fn from(value: i32) -> Self {
        ForeignValue::I32(value)
    }
}

impl From<bool> for ForeignValue {
    fn from(value: bool) -> Self {
        ForeignValue::Bool(value)
    }
}

impl From<u8> for ForeignValue {
    fn from(value: u8) -> Self {
        ForeignValue::U8(value)
    }
}

impl From<ObjectRef> for ForeignValue {
    fn from(value: ObjectRef) -> Self {
        ForeignValue::Object(value)
    }
}

/// Declared type of a parameter, return value, field or array element.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// `void`, only valid as a return type.
    Void,
    /// `bool`
    Bool,
    /// `int`
    Int32,
    /// `byte`
    Byte,
    /// `string`
    String,
    /// Single-dimensional array, `T[]`.
    Array(Box<ValueType>),
    /// A class defined in the loaded image, referenced by its simple name.
    Class(String),
}

impl ValueType {
    /// Shorthand for [`ValueType::Array`].
    #[must_use]
    pub fn array_of(element: ValueType) -> Self {
        ValueType::Array(Box::new(element))
    }

    /// Shorthand for [`ValueType::Class`].
    #[must_use]
    pub fn class(name: impl Into<String>) -> Self {
        ValueType::Class(name.into())
    }

    /// Returns `true` for types whose values live on the heap.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            ValueType::String | ValueType::Array(_) | ValueType::Class(_)
        )
    }

    /// The value a freshly allocated field or array slot of this type holds.
    #[must_use]
    pub fn default_value(&self) -> ForeignValue {
        match self {
            ValueType::Void => ForeignValue::Void,
            ValueType::Bool => ForeignValue::Bool(false),
            ValueType::Int32 => ForeignValue::I32(0),
            ValueType::Byte => ForeignValue::U8(0),
            ValueType::String | ValueType::Array(_) | ValueType::Class(_) => ForeignValue::Null,
        }
    }

    /// Checks whether `value` can be stored in a slot of this type.
    ///
    /// Reference types accept any object reference or null; the concrete class of a
    /// referenced object is checked by the heap accessors that read it.
    #[must_use]
    pub fn accepts(&self, value: &ForeignValue) -> bool {
        match (self, value) {
            (ValueType::Void, ForeignValue::Void) => true,
            (ValueType::Bool, ForeignValue::Bool(_)) => true,
            (ValueType::Int32, ForeignValue::I32(_)) => true,
            (ValueType::Byte, ForeignValue::U8(_)) => true,
            (ty, ForeignValue::Object(_) | ForeignValue::Null) => ty.is_reference(),
            _ => false,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Void => f.write_str("void"),
            ValueType::Bool => f.write_str("bool"),
            ValueType::Int32 => f.write_str("int"),
            ValueType::Byte => f.write_str("byte"),
            ValueType::String => f.write_str("string"),
            ValueType::Array(element) => write!(f, "{element}[]"),
            ValueType::Class(name) => f.write_str(name),
        }
    }
}

impl FromStr for ValueType {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let text = text.trim();
        if let Some(element) = text.strip_suffix("[]") {
            return Ok(ValueType::array_of(element.parse()?));
        }

        match text {
            "void" => Ok(ValueType::Void),
            "bool" => Ok(ValueType::Bool),
            "int" => Ok(ValueType::Int32),
            "byte" => Ok(ValueType::Byte),
            "string" => Ok(ValueType::String),
            name if is_identifier(name) => Ok(ValueType::Class(name.to_string())),
            _ => Err(Error::InvalidSignature(text.to_string())),
        }
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
