//! The method binding cache.
//!
//! [`MethodCache`] holds a resolved handle for every operation the bridge performs, plus the
//! field layouts of the record classes the marshalling layer reads and writes. It is built
//! once when an emulator is created and never changes afterwards; clones of an emulator share
//! the same cache through an `Arc`.
//!
//! If any entry fails to resolve, construction fails as a whole. A cache that exists is
//! therefore complete, and no operation ever performs a lookup at call time.

use log::debug;

use crate::{
    config::BridgeConfig,
    runtime::{
        resolve_field, resolve_method_returning, resolve_type, Environment, FieldRef, MethodRef,
        TypeRef, ValueType,
    },
    Result,
};

method_table! {
    /// Every operation of the emulator class.
    pub struct EmulatorMethods {
        /// `Clone()`
        clone => "Clone()" -> "Emulator",
        /// `Reset()`
        reset => "Reset()" -> "void",
        /// `GetCommand(int)`
        get_command => "GetCommand(int)" -> "Command",
        /// `AddCommand(int, Command)`
        add_command => "AddCommand(int, Command)" -> "bool",
        /// `UpdateCommand(int, Command)`
        update_command => "UpdateCommand(int, Command)" -> "bool",
        /// `RemoveCommand(int)`
        remove_command => "RemoveCommand(int)" -> "bool",
        /// `CommandsCount()`
        commands_count => "CommandsCount()" -> "int",
        /// `LastCommand()`
        last_command => "LastCommand()" -> "Command",
        /// `ExecutedCommand()`
        executed_command => "ExecutedCommand()" -> "Command",
        /// `ExecOne()`
        exec_one => "ExecOne()" -> "int",
        /// `ExecOneCall()`
        exec_one_call => "ExecOneCall()" -> "int",
        /// `ExecAll()`
        exec_all => "ExecAll()" -> "int",
        /// `GetNextIndex()`
        get_next_index => "GetNextIndex()" -> "int",
        /// `GetPrevIndex()`
        get_prev_index => "GetPrevIndex()" -> "int",
        /// `GetCallIndex()`
        get_call_index => "GetCallIndex()" -> "int",
        /// `GetPC()`
        get_pc => "GetPC()" -> "int",
        /// `SetPC(int)`
        set_pc => "SetPC(int)" -> "void",
        /// `GetSP()`
        get_sp => "GetSP()" -> "int",
        /// `SetSP(int)`
        set_sp => "SetSP(int)" -> "void",
        /// `GetStackValue(int)`
        get_stack_value => "GetStackValue(int)" -> "int",
        /// `GetStackLen()`
        get_stack_len => "GetStackLen()" -> "int",
        /// `GetMP()`
        get_mp => "GetMP()" -> "int",
        /// `GetPort()`
        get_port => "GetPort()" -> "int",
        /// `GetMemValue(int)`
        get_mem_value => "GetMemValue(int)" -> "int",
        /// `GetMemLen()`
        get_mem_len => "GetMemLen()" -> "int",
        /// `GetMem()`
        get_mem => "GetMem()" -> "int[]",
        /// `GetRegQ()`
        get_reg_q => "GetRegQ()" -> "int",
        /// `GetRegValue(int)`
        get_reg_value => "GetRegValue(int)" -> "int",
        /// `GetF()`
        get_f => "GetF()" -> "int",
        /// `GetY()`
        get_y => "GetY()" -> "int",
        /// `GetPrevRegQ()`
        get_prev_reg_q => "GetPrevRegQ()" -> "int",
        /// `GetPrevRegA()`
        get_prev_reg_a => "GetPrevRegA()" -> "int",
        /// `GetPrevRegB()`
        get_prev_reg_b => "GetPrevRegB()" -> "int",
        /// `GetR()`
        get_r => "GetR()" -> "int",
        /// `GetS()`
        get_s => "GetS()" -> "int",
        /// `GetZ()`
        get_z => "GetZ()" -> "bool",
        /// `GetF3()`
        get_f3 => "GetF3()" -> "bool",
        /// `GetC4()`
        get_c4 => "GetC4()" -> "bool",
        /// `GetOvr()`
        get_ovr => "GetOvr()" -> "bool",
        /// `GetG()`
        get_g => "GetG()" -> "bool",
        /// `GetP()`
        get_p => "GetP()" -> "bool",
        /// `GetCall(int)`
        get_call => "GetCall(int)" -> "Call",
        /// `AddCall(int, Call)`
        add_call => "AddCall(int, Call)" -> "bool",
        /// `UpdateCall(int, Call)`
        update_call => "UpdateCall(int, Call)" -> "bool",
        /// `RemoveCall(int)`
        remove_call => "RemoveCall(int)" -> "void",
        /// `CallsCount()`
        calls_count => "CallsCount()" -> "int",
        /// `LastCall()`
        last_call => "LastCall()" -> "Call",
        /// `AddMapCall(int, string, int)`
        add_map_call => "AddMapCall(int, string, int)" -> "bool",
        /// `RemoveMapCall(int)`
        remove_map_call => "RemoveMapCall(int)" -> "bool",
        /// `UpdateMapCall(int, string, int)`
        update_map_call => "UpdateMapCall(int, string, int)" -> "bool",
        /// `GetMapCallName(int)`
        get_map_call_name => "GetMapCallName(int)" -> "string",
        /// `GetMapCallAddress(int)`
        get_map_call_address => "GetMapCallAddress(int)" -> "int",
        /// `GetMapCallCodes()`
        get_map_call_codes => "GetMapCallCodes()" -> "int[]",
        /// `OpenRaw(byte[])`
        open_raw => "OpenRaw(byte[])" -> "bool",
        /// `ExportRaw()`
        export_raw => "ExportRaw()" -> "byte[]",
    }
}

method_table! {
    /// Name lookups on command records.
    pub struct CommandMethods {
        /// `GetName()`
        get_name => "GetName()" -> "string",
        /// `GetJumpName()`
        get_jump_name => "GetJumpName()" -> "string",
    }
}

/// Field layout of the command record class.
#[derive(Clone, Debug)]
pub struct CommandFields {
    /// The command class.
    pub ty: TypeRef,
    /// `isOffset: bool`
    pub is_offset: FieldRef,
    /// `number_: int`
    pub number: FieldRef,
    /// `words_: int[]`
    pub words: FieldRef,
}

/// Field layout of the call record class.
#[derive(Clone, Debug)]
pub struct CallFields {
    /// The call class.
    pub ty: TypeRef,
    /// `code_: int`
    pub code: FieldRef,
    /// `arg0_: int`
    pub arg0: FieldRef,
    /// `arg1_: int`
    pub arg1: FieldRef,
}

/// Field layouts of every record class the marshalling layer handles.
#[derive(Clone, Debug)]
pub struct RecordLayouts {
    /// `Command`
    pub command: CommandFields,
    /// `Call`
    pub call: CallFields,
}

impl RecordLayouts {
    /// Resolves the record classes named by `config` and their fields.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TypeNotFound`] or [`crate::Error::FieldNotFound`] for missing
    /// classes or fields, and [`crate::Error::Marshal`] if a field has an unexpected type.
    pub fn resolve(env: &Environment, config: &BridgeConfig) -> Result<Self> {
        let command_ty = resolve_type(env, &config.namespace, &config.command_class)?;
        let call_ty = resolve_type(env, &config.namespace, &config.call_class)?;

        let field = |ty: &TypeRef, name: &str, expected: ValueType| -> Result<FieldRef> {
            let field = resolve_field(env, ty, name)?;
            if *field.ty() != expected {
                return Err(marshal_error!(
                    "{}.{} is {}, expected {}",
                    ty.full_name(),
                    name,
                    field.ty(),
                    expected
                ));
            }
            Ok(field)
        };

        Ok(RecordLayouts {
            command: CommandFields {
                is_offset: field(&command_ty, "isOffset", ValueType::Bool)?,
                number: field(&command_ty, "number_", ValueType::Int32)?,
                words: field(&command_ty, "words_", ValueType::array_of(ValueType::Int32))?,
                ty: command_ty,
            },
            call: CallFields {
                code: field(&call_ty, "code_", ValueType::Int32)?,
                arg0: field(&call_ty, "arg0_", ValueType::Int32)?,
                arg1: field(&call_ty, "arg1_", ValueType::Int32)?,
                ty: call_ty,
            },
        })
    }
}

/// Every resolved handle the bridge uses, built once per environment.
#[derive(Clone, Debug)]
pub struct MethodCache {
    /// The emulator class.
    pub emulator_type: TypeRef,
    /// The emulator's parameterless constructor, `.ctor()`.
    pub ctor: MethodRef,
    /// Emulator operations.
    pub emulator: EmulatorMethods,
    /// Command record operations.
    pub command: CommandMethods,
    /// Record field layouts.
    pub records: RecordLayouts,
}

impl MethodCache {
    /// Resolves every handle against `env`.
    ///
    /// # Errors
    ///
    /// Returns the first resolution failure: [`crate::Error::TypeNotFound`],
    /// [`crate::Error::MethodNotFound`] or [`crate::Error::FieldNotFound`].
    pub fn resolve(env: &Environment, config: &BridgeConfig) -> Result<Self> {
        let emulator_type = resolve_type(env, &config.namespace, &config.emulator_class)?;
        let ctor = resolve_method_returning(env, &emulator_type, ".ctor()", &ValueType::Void)?;
        let emulator = EmulatorMethods::resolve(env, &emulator_type)?;
        let records = RecordLayouts::resolve(env, config)?;
        let command = CommandMethods::resolve(env, &records.command.ty)?;

        let cache = MethodCache {
            emulator_type,
            ctor,
            emulator,
            command,
            records,
        };
        debug!(
            "method cache for {} populated with {} methods",
            cache.emulator_type.full_name(),
            cache.len()
        );
        Ok(cache)
    }

    /// Number of resolved methods, constructor included.
    #[must_use]
    pub fn len(&self) -> usize {
        1 + EmulatorMethods::len() + CommandMethods::len()
    }

    /// Always `false`; a cache that exists is complete.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Looks up a resolved method by logical name, e.g. `exec_one` or `command.get_name`.
    #[must_use]
    pub fn get(&self, logical_name: &str) -> Option<&MethodRef> {
        if logical_name == "ctor" {
            return Some(&self.ctor);
        }
        match logical_name.strip_prefix("command.") {
            Some(name) => self.command.get(name),
            None => self.emulator.get(logical_name),
        }
    }

    /// Logical name and resolved signature of every method, for diagnostics.
    #[must_use]
    pub fn signatures(&self) -> Vec<(String, String)> {
        let mut signatures = Vec::with_capacity(self.len());
        signatures.push(("ctor".to_string(), self.ctor.to_string()));
        for (name, _, _) in EmulatorMethods::SIGNATURES {
            if let Some(method) = self.emulator.get(name) {
                signatures.push(((*name).to_string(), method.to_string()));
            }
        }
        for (name, _, _) in CommandMethods::SIGNATURES {
            if let Some(method) = self.command.get(name) {
                signatures.push((format!("command.{name}"), method.to_string()));
            }
        }
        signatures
    }
}
