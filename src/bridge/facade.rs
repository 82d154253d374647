//! Typed execution and inspection operations on an [`Emulator`].
//!
//! Every operation here is a thin wrapper: it marshals its arguments, invokes the cached
//! method and unmarshals the result. The only host-side logic is the [`ExecutionState`]
//! tracking done by the stepping operations, and a few composite reads
//! ([`Emulator::state`], [`Emulator::stack`], [`Emulator::map_calls`]) built from the
//! primitive ones.
//!
//! [`ResultCode`] values are outcomes of the engine's step machine, not failures. They are
//! returned verbatim on the success channel.

use std::{fs, path::Path};

use bitflags::bitflags;
use log::{debug, trace};
use memmap2::Mmap;
use strum::{Display, EnumIter, FromRepr};

use crate::{
    bridge::{
        emulator::Emulator,
        marshal::{Call, Command, FromForeign, MapCall},
        methods::{EmulatorMethods, RecordLayouts},
    },
    runtime::{CallScope, ForeignValue, MethodRef},
    Error, Result,
};

/// Number of general-purpose registers of the MT1804.
pub const REGISTER_COUNT: usize = 16;

/// Outcome of one execution step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter, FromRepr)]
#[repr(i32)]
pub enum ResultCode {
    /// The step completed and another step is valid.
    Ok = 0,
    /// The program is empty.
    NoCommands = 1,
    /// The current command failed to decode.
    IncorrectCommand = 2,
    /// The engine's iteration bound was reached.
    Loop = 3,
    /// The program has ended.
    End = 4,
}

impl ResultCode {
    /// Decodes the engine's integer encoding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownResultCode`] for values outside `0..=4`.
    pub fn from_code(code: i32) -> Result<Self> {
        ResultCode::from_repr(code).ok_or(Error::UnknownResultCode(code))
    }

    /// The engine's integer encoding.
    #[must_use]
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Whether another step is valid after this outcome.
    #[must_use]
    pub fn is_ok(self) -> bool {
        self == ResultCode::Ok
    }
}

impl FromForeign for ResultCode {
    fn from_foreign(
        scope: &mut CallScope<'_>,
        layouts: &RecordLayouts,
        value: ForeignValue,
    ) -> Result<Self> {
        ResultCode::from_code(i32::from_foreign(scope, layouts, value)?)
    }
}

/// Host-side view of where the step machine stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ExecutionState {
    /// Freshly created, reset or loaded.
    #[default]
    Idle,
    /// The last step returned [`ResultCode::Ok`].
    Stepping,
    /// The last step returned the contained non-`Ok` code.
    Halted(ResultCode),
}

impl ExecutionState {
    fn after(code: ResultCode) -> Self {
        if code.is_ok() {
            ExecutionState::Stepping
        } else {
            ExecutionState::Halted(code)
        }
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    /// ALU status flags
    pub struct StatusFlags: u8 {
        /// Zero
        const Z = 0x01;
        /// Sign, bit 3 of F
        const F3 = 0x02;
        /// Carry out of bit 4
        const C4 = 0x04;
        /// Overflow
        const OVR = 0x08;
        /// Carry generate
        const G = 0x10;
        /// Carry propagate
        const P = 0x20;
    }
}

/// A snapshot of the processor's registers.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ProcessorState {
    /// Program counter.
    pub pc: i32,
    /// Stack pointer.
    pub sp: i32,
    /// Multiplexer value.
    pub mp: i32,
    /// Selected I/O port, as the port index.
    pub port: i32,
    /// General-purpose registers.
    pub registers: [i32; REGISTER_COUNT],
    /// Register Q.
    pub q: i32,
    /// ALU output F.
    pub f: i32,
    /// Output bus Y.
    pub y: i32,
    /// ALU operand R.
    pub r: i32,
    /// ALU operand S.
    pub s: i32,
    /// Q before the last cycle.
    pub prev_q: i32,
    /// Register A before the last cycle.
    pub prev_a: i32,
    /// Register B before the last cycle.
    pub prev_b: i32,
    /// Status flags.
    pub flags: StatusFlags,
}

/// Converts a host index into the engine's `int`.
fn index_arg(method: &str, index: usize) -> Result<i32> {
    i32::try_from(index).map_err(|_| Error::ArgumentMismatch {
        method: method.to_string(),
        message: format!("index {index} does not fit the engine's int"),
    })
}

/// Converts an engine index into a host index; `-1` means none.
fn index_result(index: i32) -> Option<usize> {
    usize::try_from(index).ok()
}

impl Emulator {
    /// Host-side execution state.
    #[must_use]
    pub fn execution_state(&self) -> ExecutionState {
        self.state
    }

    /// Resets the processor and the step machine.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UseAfterTeardown`] or [`Error::ForeignException`].
    pub fn reset(&mut self) -> Result<()> {
        self.invoke::<()>(|m| &m.reset, &[])?;
        self.state = ExecutionState::Idle;
        Ok(())
    }

    /// Command at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ForeignException`] if `index` is out of range.
    pub fn command(&self, index: usize) -> Result<Command> {
        let index = index_arg("GetCommand", index)?;
        self.invoke(|m| &m.get_command, &[&index])
    }

    /// Inserts `command` at `index`. Returns `false` if the engine rejects it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ForeignException`] if `index` is out of range.
    pub fn add_command(&mut self, index: usize, command: &Command) -> Result<bool> {
        let index = index_arg("AddCommand", index)?;
        self.invoke(|m| &m.add_command, &[&index, command])
    }

    /// Replaces the command at `index`. Returns `false` if the engine rejects it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ForeignException`] if `index` is out of range.
    pub fn update_command(&mut self, index: usize, command: &Command) -> Result<bool> {
        let index = index_arg("UpdateCommand", index)?;
        self.invoke(|m| &m.update_command, &[&index, command])
    }

    /// Removes the command at `index`, returning the engine's result unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ForeignException`] if `index` is out of range.
    pub fn remove_command(&mut self, index: usize) -> Result<bool> {
        let index = index_arg("RemoveCommand", index)?;
        self.invoke(|m| &m.remove_command, &[&index])
    }

    /// Number of commands in the program.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UseAfterTeardown`] once the environment is gone.
    pub fn commands_count(&self) -> Result<usize> {
        let count: i32 = self.invoke(|m| &m.commands_count, &[])?;
        usize::try_from(count).map_err(|_| marshal_error!("negative command count {}", count))
    }

    /// Last command of the program.
    pub fn last_command(&self) -> Result<Command> {
        self.invoke(|m| &m.last_command, &[])
    }

    /// Command executed by the most recent step.
    pub fn executed_command(&self) -> Result<Command> {
        self.invoke(|m| &m.executed_command, &[])
    }

    fn step(&mut self, select: fn(&EmulatorMethods) -> &MethodRef) -> Result<ResultCode> {
        let code: ResultCode = self.invoke(select, &[])?;
        self.state = ExecutionState::after(code);
        trace!("step finished with {}", code);
        Ok(code)
    }

    /// Executes exactly one command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownResultCode`] if the engine answers outside the known set, or
    /// [`Error::ForeignException`]. Processor-level conditions are [`ResultCode`]s.
    pub fn exec_one(&mut self) -> Result<ResultCode> {
        self.step(|m| &m.exec_one)
    }

    /// Executes until the current call completes.
    pub fn exec_one_call(&mut self) -> Result<ResultCode> {
        self.step(|m| &m.exec_one_call)
    }

    /// Executes until the program completes or the engine's iteration bound is reached.
    pub fn exec_all(&mut self) -> Result<ResultCode> {
        self.step(|m| &m.exec_all)
    }

    /// Index of the command the next step will execute.
    pub fn next_index(&self) -> Result<Option<usize>> {
        Ok(index_result(self.invoke(|m| &m.get_next_index, &[])?))
    }

    /// Index of the command the previous step executed.
    pub fn prev_index(&self) -> Result<Option<usize>> {
        Ok(index_result(self.invoke(|m| &m.get_prev_index, &[])?))
    }

    /// Index of the call currently executing.
    pub fn call_index(&self) -> Result<Option<usize>> {
        Ok(index_result(self.invoke(|m| &m.get_call_index, &[])?))
    }

    /// Program counter.
    pub fn pc(&self) -> Result<i32> {
        self.invoke(|m| &m.get_pc, &[])
    }

    /// Sets the program counter.
    pub fn set_pc(&mut self, value: i32) -> Result<()> {
        self.invoke(|m| &m.set_pc, &[&value])
    }

    /// Stack pointer.
    pub fn sp(&self) -> Result<i32> {
        self.invoke(|m| &m.get_sp, &[])
    }

    /// Sets the stack pointer.
    pub fn set_sp(&mut self, value: i32) -> Result<()> {
        self.invoke(|m| &m.set_sp, &[&value])
    }

    /// Stack entry at `index`.
    pub fn stack_value(&self, index: usize) -> Result<i32> {
        let index = index_arg("GetStackValue", index)?;
        self.invoke(|m| &m.get_stack_value, &[&index])
    }

    /// Stack capacity.
    pub fn stack_len(&self) -> Result<usize> {
        let len: i32 = self.invoke(|m| &m.get_stack_len, &[])?;
        usize::try_from(len).map_err(|_| marshal_error!("negative stack length {}", len))
    }

    /// Every stack entry, read one by one.
    pub fn stack(&self) -> Result<Vec<i32>> {
        (0..self.stack_len()?)
            .map(|index| self.stack_value(index))
            .collect()
    }

    /// Multiplexer value.
    pub fn mp(&self) -> Result<i32> {
        self.invoke(|m| &m.get_mp, &[])
    }

    /// Selected I/O port, as the port index.
    pub fn port(&self) -> Result<i32> {
        self.invoke(|m| &m.get_port, &[])
    }

    /// Memory cell at `index`.
    pub fn memory_value(&self, index: usize) -> Result<i32> {
        let index = index_arg("GetMemValue", index)?;
        self.invoke(|m| &m.get_mem_value, &[&index])
    }

    /// Memory size in cells.
    pub fn memory_len(&self) -> Result<usize> {
        let len: i32 = self.invoke(|m| &m.get_mem_len, &[])?;
        usize::try_from(len).map_err(|_| marshal_error!("negative memory length {}", len))
    }

    /// The whole memory.
    pub fn memory(&self) -> Result<Vec<i32>> {
        self.invoke(|m| &m.get_mem, &[])
    }

    /// Register Q.
    pub fn reg_q(&self) -> Result<i32> {
        self.invoke(|m| &m.get_reg_q, &[])
    }

    /// General-purpose register at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ForeignException`] if `index` is not below [`REGISTER_COUNT`].
    pub fn reg(&self, index: usize) -> Result<i32> {
        let index = index_arg("GetRegValue", index)?;
        self.invoke(|m| &m.get_reg_value, &[&index])
    }

    /// ALU output F.
    pub fn f(&self) -> Result<i32> {
        self.invoke(|m| &m.get_f, &[])
    }

    /// Output bus Y.
    pub fn y(&self) -> Result<i32> {
        self.invoke(|m| &m.get_y, &[])
    }

    /// Q before the last cycle.
    pub fn prev_reg_q(&self) -> Result<i32> {
        self.invoke(|m| &m.get_prev_reg_q, &[])
    }

    /// Register A before the last cycle.
    pub fn prev_reg_a(&self) -> Result<i32> {
        self.invoke(|m| &m.get_prev_reg_a, &[])
    }

    /// Register B before the last cycle.
    pub fn prev_reg_b(&self) -> Result<i32> {
        self.invoke(|m| &m.get_prev_reg_b, &[])
    }

    /// ALU operand R.
    pub fn r(&self) -> Result<i32> {
        self.invoke(|m| &m.get_r, &[])
    }

    /// ALU operand S.
    pub fn s(&self) -> Result<i32> {
        self.invoke(|m| &m.get_s, &[])
    }

    /// Zero flag.
    pub fn z(&self) -> Result<bool> {
        self.invoke(|m| &m.get_z, &[])
    }

    /// Sign flag.
    pub fn f3(&self) -> Result<bool> {
        self.invoke(|m| &m.get_f3, &[])
    }

    /// Carry flag.
    pub fn c4(&self) -> Result<bool> {
        self.invoke(|m| &m.get_c4, &[])
    }

    /// Overflow flag.
    pub fn ovr(&self) -> Result<bool> {
        self.invoke(|m| &m.get_ovr, &[])
    }

    /// Carry generate flag.
    pub fn g(&self) -> Result<bool> {
        self.invoke(|m| &m.get_g, &[])
    }

    /// Carry propagate flag.
    pub fn p(&self) -> Result<bool> {
        self.invoke(|m| &m.get_p, &[])
    }

    /// All status flags.
    pub fn flags(&self) -> Result<StatusFlags> {
        let mut flags = StatusFlags::empty();
        flags.set(StatusFlags::Z, self.z()?);
        flags.set(StatusFlags::F3, self.f3()?);
        flags.set(StatusFlags::C4, self.c4()?);
        flags.set(StatusFlags::OVR, self.ovr()?);
        flags.set(StatusFlags::G, self.g()?);
        flags.set(StatusFlags::P, self.p()?);
        Ok(flags)
    }

    /// Snapshot of every register and flag.
    ///
    /// The reads are separate invocations; nothing else can step this instance in between
    /// because stepping requires `&mut self`.
    pub fn state(&self) -> Result<ProcessorState> {
        let mut registers = [0; REGISTER_COUNT];
        for (index, register) in registers.iter_mut().enumerate() {
            *register = self.reg(index)?;
        }

        Ok(ProcessorState {
            pc: self.pc()?,
            sp: self.sp()?,
            mp: self.mp()?,
            port: self.port()?,
            registers,
            q: self.reg_q()?,
            f: self.f()?,
            y: self.y()?,
            r: self.r()?,
            s: self.s()?,
            prev_q: self.prev_reg_q()?,
            prev_a: self.prev_reg_a()?,
            prev_b: self.prev_reg_b()?,
            flags: self.flags()?,
        })
    }

    /// Call-table entry at `index`.
    pub fn call(&self, index: usize) -> Result<Call> {
        let index = index_arg("GetCall", index)?;
        self.invoke(|m| &m.get_call, &[&index])
    }

    /// Inserts `call` at `index`. Returns `false` if the engine rejects it, e.g. for an
    /// unmapped code.
    pub fn add_call(&mut self, index: usize, call: &Call) -> Result<bool> {
        let index = index_arg("AddCall", index)?;
        self.invoke(|m| &m.add_call, &[&index, call])
    }

    /// Replaces the call at `index`.
    pub fn update_call(&mut self, index: usize, call: &Call) -> Result<bool> {
        let index = index_arg("UpdateCall", index)?;
        self.invoke(|m| &m.update_call, &[&index, call])
    }

    /// Removes the call at `index`.
    pub fn remove_call(&mut self, index: usize) -> Result<()> {
        let index = index_arg("RemoveCall", index)?;
        self.invoke(|m| &m.remove_call, &[&index])
    }

    /// Number of calls in the call table.
    pub fn calls_count(&self) -> Result<usize> {
        let count: i32 = self.invoke(|m| &m.calls_count, &[])?;
        usize::try_from(count).map_err(|_| marshal_error!("negative call count {}", count))
    }

    /// Last entry of the call table.
    pub fn last_call(&self) -> Result<Call> {
        self.invoke(|m| &m.last_call, &[])
    }

    /// Binds `code` to `name` and `address`. Returns `false` for a duplicate code or name.
    pub fn add_map_call(&mut self, code: i32, name: &str, address: i32) -> Result<bool> {
        self.invoke(|m| &m.add_map_call, &[&code, &name, &address])
    }

    /// Unbinds `code`. Returns `false` if a call still uses it.
    pub fn remove_map_call(&mut self, code: i32) -> Result<bool> {
        self.invoke(|m| &m.remove_map_call, &[&code])
    }

    /// Rebinds `code`.
    pub fn update_map_call(&mut self, code: i32, name: &str, address: i32) -> Result<bool> {
        self.invoke(|m| &m.update_map_call, &[&code, &name, &address])
    }

    /// Name bound to `code`.
    pub fn map_call_name(&self, code: i32) -> Result<String> {
        self.invoke(|m| &m.get_map_call_name, &[&code])
    }

    /// Address bound to `code`.
    pub fn map_call_address(&self, code: i32) -> Result<i32> {
        self.invoke(|m| &m.get_map_call_address, &[&code])
    }

    /// Every bound code, in the engine's order.
    pub fn map_call_codes(&self) -> Result<Vec<i32>> {
        self.invoke(|m| &m.get_map_call_codes, &[])
    }

    /// The entry for `code`, or `None` if it is not bound.
    pub fn map_call(&self, code: i32) -> Result<Option<MapCall>> {
        if !self.map_call_codes()?.contains(&code) {
            return Ok(None);
        }
        Ok(Some(MapCall {
            code,
            name: self.map_call_name(code)?,
            address: self.map_call_address(code)?,
        }))
    }

    /// Every map-call entry.
    pub fn map_calls(&self) -> Result<Vec<MapCall>> {
        self.map_call_codes()?
            .into_iter()
            .map(|code| {
                Ok(MapCall {
                    code,
                    name: self.map_call_name(code)?,
                    address: self.map_call_address(code)?,
                })
            })
            .collect()
    }

    /// The entry named `name`, or `None`.
    pub fn map_call_by_name(&self, name: &str) -> Result<Option<MapCall>> {
        for code in self.map_call_codes()? {
            if self.map_call_name(code)? == name {
                return Ok(Some(MapCall {
                    code,
                    name: name.to_string(),
                    address: self.map_call_address(code)?,
                }));
            }
        }
        Ok(None)
    }

    /// Loads a program from its raw serialized form. Returns `false` if the engine rejects
    /// the data.
    ///
    /// A successful load resets the execution state to [`ExecutionState::Idle`].
    pub fn open_raw(&mut self, data: &[u8]) -> Result<bool> {
        let loaded: bool = self.invoke(|m| &m.open_raw, &[&data])?;
        if loaded {
            self.state = ExecutionState::Idle;
        }
        debug!("open_raw of {} bytes: {}", data.len(), loaded);
        Ok(loaded)
    }

    /// Serializes the program.
    pub fn export_raw(&self) -> Result<Vec<u8>> {
        self.invoke(|m| &m.export_raw, &[])
    }

    /// Loads a program file through [`Emulator::open_raw`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileError`] if the file cannot be opened or mapped.
    pub fn open_file(&mut self, path: impl AsRef<Path>) -> Result<bool> {
        let file = fs::File::open(path.as_ref())?;
        if file.metadata()?.len() == 0 {
            return self.open_raw(&[]);
        }

        let data = unsafe { Mmap::map(&file) }?;
        self.open_raw(&data)
    }

    /// Writes the program to `path` in its raw serialized form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileError`] if the file cannot be written.
    pub fn save_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = self.export_raw()?;
        fs::write(path.as_ref(), data)?;
        Ok(())
    }

    /// Display name of `command`, as computed by the engine.
    pub fn command_name(&self, command: &Command) -> Result<String> {
        self.call_on_record(command, |m| &m.get_name)
    }

    /// Display name of the jump performed by `command`.
    pub fn command_jump_name(&self, command: &Command) -> Result<String> {
        self.call_on_record(command, |m| &m.get_jump_name)
    }
}
