//! Conversions between host values and foreign objects.
//!
//! [`ToForeign`] builds the foreign representation of a host value inside a [`CallScope`];
//! [`FromForeign`] reads a foreign value back into an owned host value. Both run inside the
//! same locked scope as the invocation they belong to.
//!
//! # Arrays
//!
//! Variable-length data (command words, memory, map-call codes, raw program bytes) is never
//! assumed to have a particular length. Host to foreign allocates an array of exactly the
//! host length; foreign to host queries the array length first, allocates exactly that and
//! copies element by element.
//!
//! # Lifetimes
//!
//! Values read back are copied out completely, so the host never holds a foreign reference
//! past the scope. Objects built for arguments belong to the environment from then on: the
//! engine may keep them, and whatever it does not keep is collected when the scope ends.

use crate::{
    bridge::methods::RecordLayouts,
    runtime::{CallScope, FieldRef, ForeignValue, ObjectRef, ValueType},
    Result,
};

/// A microinstruction record.
///
/// `words` holds the instruction's field values; its length is owned by the engine and read
/// from the foreign array on every conversion.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Command {
    /// The command marks an address offset rather than an executable instruction.
    pub is_offset: bool,
    /// Address assigned by the engine.
    pub number: i32,
    /// Instruction words.
    pub words: Vec<i32>,
}

impl Command {
    /// Creates a command record.
    #[must_use]
    pub fn new(is_offset: bool, number: i32, words: Vec<i32>) -> Self {
        Command {
            is_offset,
            number,
            words,
        }
    }
}

/// A call-table entry: call code plus two arguments.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Call {
    /// Call code, a key of the map-call table.
    pub code: i32,
    /// First argument.
    pub arg0: i32,
    /// Second argument.
    pub arg1: i32,
}

impl Call {
    /// Creates a call record.
    #[must_use]
    pub fn new(code: i32, arg0: i32, arg1: i32) -> Self {
        Call { code, arg0, arg1 }
    }
}

/// A map-call table entry: a call code bound to a name and a target address.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct MapCall {
    /// Unique call code.
    pub code: i32,
    /// Human-readable name.
    pub name: String,
    /// Target address.
    pub address: i32,
}

impl MapCall {
    /// Creates a map-call entry.
    #[must_use]
    pub fn new(code: i32, name: impl Into<String>, address: i32) -> Self {
        MapCall {
            code,
            name: name.into(),
            address,
        }
    }
}

/// Host values that can be passed into the environment.
pub trait ToForeign {
    /// Builds the foreign representation of `self` inside `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::HeapLimitExceeded`] or [`crate::Error::Marshal`].
    fn to_foreign(&self, scope: &mut CallScope<'_>, layouts: &RecordLayouts) -> Result<ForeignValue>;
}

/// Host values that can be read back from the environment.
pub trait FromForeign: Sized {
    /// Copies `value` into an owned host value.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Marshal`] if `value` does not have the expected shape, or
    /// [`crate::Error::UseAfterFree`] for a dangling reference.
    fn from_foreign(
        scope: &mut CallScope<'_>,
        layouts: &RecordLayouts,
        value: ForeignValue,
    ) -> Result<Self>;
}

impl ToForeign for i32 {
    fn to_foreign(&self, _: &mut CallScope<'_>, _: &RecordLayouts) -> Result<ForeignValue> {
        Ok(ForeignValue::I32(*self))
    }
}

impl ToForeign for bool {
    fn to_foreign(&self, _: &mut CallScope<'_>, _: &RecordLayouts) -> Result<ForeignValue> {
        Ok(ForeignValue::Bool(*self))
    }
}

impl ToForeign for &str {
    fn to_foreign(&self, scope: &mut CallScope<'_>, _: &RecordLayouts) -> Result<ForeignValue> {
        Ok(scope.alloc_string(self)?.into())
    }
}

impl ToForeign for &[u8] {
    fn to_foreign(&self, scope: &mut CallScope<'_>, _: &RecordLayouts) -> Result<ForeignValue> {
        let elements = self.iter().copied().map(ForeignValue::U8).collect();
        Ok(scope.alloc_array(ValueType::Byte, elements)?.into())
    }
}

impl ToForeign for Command {
    fn to_foreign(&self, scope: &mut CallScope<'_>, layouts: &RecordLayouts) -> Result<ForeignValue> {
        let fields = &layouts.command;
        let words = scope.alloc_array(
            ValueType::Int32,
            self.words.iter().copied().map(ForeignValue::I32).collect(),
        )?;
        let object = scope.alloc_object(&fields.ty)?;
        scope.set_field(object, &fields.is_offset, self.is_offset.into())?;
        scope.set_field(object, &fields.number, self.number.into())?;
        scope.set_field(object, &fields.words, words.into())?;
        Ok(object.into())
    }
}

impl ToForeign for Call {
    fn to_foreign(&self, scope: &mut CallScope<'_>, layouts: &RecordLayouts) -> Result<ForeignValue> {
        let fields = &layouts.call;
        let object = scope.alloc_object(&fields.ty)?;
        scope.set_field(object, &fields.code, self.code.into())?;
        scope.set_field(object, &fields.arg0, self.arg0.into())?;
        scope.set_field(object, &fields.arg1, self.arg1.into())?;
        Ok(object.into())
    }
}

impl FromForeign for () {
    fn from_foreign(_: &mut CallScope<'_>, _: &RecordLayouts, value: ForeignValue) -> Result<Self> {
        match value {
            ForeignValue::Void => Ok(()),
            other => Err(marshal_error!("expected void, found {}", other.kind())),
        }
    }
}

impl FromForeign for i32 {
    fn from_foreign(_: &mut CallScope<'_>, _: &RecordLayouts, value: ForeignValue) -> Result<Self> {
        value
            .as_i32()
            .ok_or_else(|| marshal_error!("expected int, found {}", value.kind()))
    }
}

impl FromForeign for bool {
    fn from_foreign(_: &mut CallScope<'_>, _: &RecordLayouts, value: ForeignValue) -> Result<Self> {
        value
            .as_bool()
            .ok_or_else(|| marshal_error!("expected bool, found {}", value.kind()))
    }
}

impl FromForeign for String {
    fn from_foreign(scope: &mut CallScope<'_>, _: &RecordLayouts, value: ForeignValue) -> Result<Self> {
        let object = expect_object(&value, "string")?;
        scope.string(object)
    }
}

impl FromForeign for Vec<i32> {
    fn from_foreign(scope: &mut CallScope<'_>, _: &RecordLayouts, value: ForeignValue) -> Result<Self> {
        let object = expect_object(&value, "int[]")?;
        read_array(scope, object, &ValueType::Int32, ForeignValue::as_i32)
    }
}

impl FromForeign for Vec<u8> {
    fn from_foreign(scope: &mut CallScope<'_>, _: &RecordLayouts, value: ForeignValue) -> Result<Self> {
        let object = expect_object(&value, "byte[]")?;
        read_array(scope, object, &ValueType::Byte, ForeignValue::as_u8)
    }
}

impl FromForeign for Command {
    fn from_foreign(
        scope: &mut CallScope<'_>,
        layouts: &RecordLayouts,
        value: ForeignValue,
    ) -> Result<Self> {
        let fields = &layouts.command;
        let object = expect_object(&value, "Command")?;

        let is_offset = scope.field(object, &fields.is_offset)?;
        let number = scope.field(object, &fields.number)?;
        let words = match scope.field(object, &fields.words)? {
            ForeignValue::Null => Vec::new(),
            ForeignValue::Object(words) => {
                read_array(scope, words, &ValueType::Int32, ForeignValue::as_i32)?
            }
            other => return Err(marshal_error!("expected int[] words, found {}", other.kind())),
        };

        Ok(Command {
            is_offset: is_offset
                .as_bool()
                .ok_or_else(|| marshal_error!("isOffset is {}", is_offset.kind()))?,
            number: number
                .as_i32()
                .ok_or_else(|| marshal_error!("number_ is {}", number.kind()))?,
            words,
        })
    }
}

impl FromForeign for Call {
    fn from_foreign(
        scope: &mut CallScope<'_>,
        layouts: &RecordLayouts,
        value: ForeignValue,
    ) -> Result<Self> {
        let fields = &layouts.call;
        let object = expect_object(&value, "Call")?;

        Ok(Call {
            code: read_i32_field(scope, object, &fields.code)?,
            arg0: read_i32_field(scope, object, &fields.arg0)?,
            arg1: read_i32_field(scope, object, &fields.arg1)?,
        })
    }
}

fn expect_object(value: &ForeignValue, expected: &str) -> Result<ObjectRef> {
    match value {
        ForeignValue::Object(object) => Ok(*object),
        other => Err(marshal_error!("expected {}, found {}", expected, other.kind())),
    }
}

fn read_i32_field(scope: &CallScope<'_>, object: ObjectRef, field: &FieldRef) -> Result<i32> {
    let value = scope.field(object, field)?;
    value
        .as_i32()
        .ok_or_else(|| marshal_error!("{} is {}, expected int", field.name(), value.kind()))
}

/// Copies an array element by element after reading its length.
fn read_array<T>(
    scope: &CallScope<'_>,
    object: ObjectRef,
    element_type: &ValueType,
    convert: fn(&ForeignValue) -> Option<T>,
) -> Result<Vec<T>> {
    let actual = scope.array_element_type(object)?;
    if actual != *element_type {
        return Err(marshal_error!("expected {}[], found {}[]", element_type, actual));
    }

    let len = scope.array_len(object)?;
    let mut values = Vec::with_capacity(len);
    for index in 0..len {
        let element = scope.array_element(object, index)?;
        let value = convert(&element).ok_or_else(|| {
            marshal_error!(
                "element {} of {}[] is {}",
                index,
                element_type,
                element.kind()
            )
        })?;
        values.push(value);
    }
    Ok(values)
}
