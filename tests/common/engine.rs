//! A stub Execution Engine.
//!
//! Implements the complete method surface the bridge binds against with table bookkeeping, a
//! raw program format and trivial sequencing. It has no ALU. A command's first word selects
//! what a step does:
//!
//! | word 0 | effect                                                    |
//! |--------|-----------------------------------------------------------|
//! | 0      | `R[word1] = word2`, then advance                          |
//! | 1      | jump to command `word1`                                   |
//! | 2      | return: start the next call, or end the program           |
//! | other  | advance                                                   |
//!
//! A command without words fails to decode.

#![allow(dead_code)]

use mtemu_bridge::runtime::{
    exception_type, AssemblyImage, ClassBuilder, ForeignException, ForeignValue, InvokeContext,
    InvokeResult, ObjectRef,
};

pub const NAMESPACE: &str = "mtemu";
pub const ASSEMBLY: &str = "engine.dll";

pub const REGISTERS: usize = 16;
pub const STACK_LEN: usize = 4;
pub const MEM_LEN: usize = 256;
pub const PROGRAM_SIZE: usize = 256;
pub const MAX_AUTO_STEPS: usize = 1000;

pub const OP_LOAD: i32 = 0;
pub const OP_JUMP: i32 = 1;
pub const OP_RETURN: i32 = 2;

const RAW_MAGIC: &[u8; 4] = b"MTRW";
const RAW_VERSION: u8 = 1;

const OK: i32 = 0;
const NO_COMMANDS: i32 = 1;
const INCORRECT_COMMAND: i32 = 2;
const LOOP: i32 = 3;
const END: i32 = 4;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StubCommand {
    pub is_offset: bool,
    pub number: i32,
    pub words: Vec<i32>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StubCall {
    pub code: i32,
    pub arg0: i32,
    pub arg1: i32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StubMapCall {
    pub code: i32,
    pub name: String,
    pub address: i32,
}

/// Native state of one emulator object.
#[derive(Clone, Debug)]
pub struct MtState {
    commands: Vec<StubCommand>,
    calls: Vec<StubCall>,
    map_calls: Vec<StubMapCall>,
    pc: i32,
    prev_pc: i32,
    call_index: i32,
    end: bool,
    sp: i32,
    stack: [i32; STACK_LEN],
    mp: i32,
    port: i32,
    memory: Vec<i32>,
    registers: [i32; REGISTERS],
    q: i32,
    f: i32,
    y: i32,
    r: i32,
    s: i32,
    prev_q: i32,
    prev_a: i32,
    prev_b: i32,
    z: bool,
    f3: bool,
    c4: bool,
    ovr: bool,
    g: bool,
    p: bool,
}

impl MtState {
    fn new() -> Self {
        MtState {
            commands: Vec::new(),
            calls: Vec::new(),
            map_calls: Vec::new(),
            pc: -1,
            prev_pc: -1,
            call_index: 0,
            end: false,
            sp: 0,
            stack: [0; STACK_LEN],
            mp: 0,
            port: 0,
            memory: vec![0; MEM_LEN],
            registers: [0; REGISTERS],
            q: 0,
            f: 0,
            y: 0,
            r: 0,
            s: 0,
            prev_q: 0,
            prev_a: 0,
            prev_b: 0,
            z: false,
            f3: false,
            c4: false,
            ovr: false,
            g: false,
            p: false,
        }
    }

    fn reset(&mut self) {
        let commands = std::mem::take(&mut self.commands);
        let calls = std::mem::take(&mut self.calls);
        let map_calls = std::mem::take(&mut self.map_calls);
        *self = MtState {
            commands,
            calls,
            map_calls,
            ..MtState::new()
        };
    }

    fn index_of(&self, pc: i32) -> i32 {
        if pc >= 0 && (pc as usize) < self.commands.len() {
            pc
        } else {
            -1
        }
    }

    fn address_of(&self, code: i32) -> i32 {
        self.map_calls
            .iter()
            .find(|entry| entry.code == code)
            .map_or(0, |entry| entry.address)
    }

    fn start_call(&mut self, index: usize) {
        let call = self.calls[index];
        self.memory[0] = call.arg0;
        self.memory[1] = call.arg1;
        self.pc = self.address_of(call.code);
        self.call_index = index as i32 + 1;
    }

    fn exec_one(&mut self) -> i32 {
        if self.commands.is_empty() {
            return NO_COMMANDS;
        }
        if self.end {
            return END;
        }
        if self.pc == -1 {
            if self.calls.is_empty() {
                self.pc = 0;
            } else {
                self.start_call(0);
            }
            return OK;
        }

        let Some(command) = self.commands.get(self.pc as usize).cloned() else {
            return INCORRECT_COMMAND;
        };
        let Some(&opcode) = command.words.first() else {
            return INCORRECT_COMMAND;
        };

        self.prev_pc = self.pc;
        self.prev_q = self.q;
        match opcode {
            OP_LOAD => {
                let target = command.words.get(1).copied().unwrap_or(0) as usize % REGISTERS;
                let value = command.words.get(2).copied().unwrap_or(0);
                self.prev_a = self.registers[target];
                self.registers[target] = value;
                self.f = value & 0xF;
                self.y = self.f;
                self.z = self.f == 0;
                self.f3 = self.f & 0x8 != 0;
                self.advance();
            }
            OP_JUMP => {
                self.pc = command.words.get(1).copied().unwrap_or(0);
            }
            OP_RETURN => {
                if (self.call_index as usize) < self.calls.len() && !self.calls.is_empty() {
                    self.start_call(self.call_index as usize);
                } else {
                    self.end = true;
                }
            }
            _ => self.advance(),
        }
        OK
    }

    fn advance(&mut self) {
        self.pc += 1;
        if self.pc as usize >= self.commands.len() {
            self.end = true;
        }
    }

    fn exec_one_call(&mut self) -> i32 {
        let call_index = self.call_index;
        for _ in 0..MAX_AUTO_STEPS {
            let code = self.exec_one();
            if code != OK {
                return code;
            }
            if self.end || self.call_index != call_index {
                return OK;
            }
        }
        LOOP
    }

    fn exec_all(&mut self) -> i32 {
        for _ in 0..MAX_AUTO_STEPS {
            let code = self.exec_one();
            if code != OK {
                return code;
            }
            if self.end {
                return OK;
            }
        }
        LOOP
    }

    fn call_accepted(&self, call: &StubCall) -> bool {
        self.map_calls.iter().any(|entry| entry.code == call.code)
            && (0..=0xff).contains(&call.arg0)
            && (0..=0xff).contains(&call.arg1)
    }

    fn export_raw(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(RAW_MAGIC);
        out.push(RAW_VERSION);

        out.extend_from_slice(&(self.commands.len() as u32).to_le_bytes());
        for command in &self.commands {
            out.push(u8::from(command.is_offset));
            out.extend_from_slice(&command.number.to_le_bytes());
            out.extend_from_slice(&(command.words.len() as u32).to_le_bytes());
            for word in &command.words {
                out.extend_from_slice(&word.to_le_bytes());
            }
        }

        out.extend_from_slice(&(self.calls.len() as u32).to_le_bytes());
        for call in &self.calls {
            out.extend_from_slice(&call.code.to_le_bytes());
            out.extend_from_slice(&call.arg0.to_le_bytes());
            out.extend_from_slice(&call.arg1.to_le_bytes());
        }

        out.extend_from_slice(&(self.map_calls.len() as u32).to_le_bytes());
        for entry in &self.map_calls {
            out.extend_from_slice(&entry.code.to_le_bytes());
            out.extend_from_slice(&entry.address.to_le_bytes());
            out.extend_from_slice(&(entry.name.len() as u32).to_le_bytes());
            out.extend_from_slice(entry.name.as_bytes());
        }
        out
    }

    fn open_raw(&mut self, data: &[u8]) -> bool {
        let Some((commands, calls, map_calls)) = parse_raw(data) else {
            return false;
        };
        *self = MtState {
            commands,
            calls,
            map_calls,
            ..MtState::new()
        };
        true
    }
}

struct RawReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl RawReader<'_> {
    fn take(&mut self, len: usize) -> Option<&[u8]> {
        let end = self.offset.checked_add(len)?;
        let slice = self.data.get(self.offset..end)?;
        self.offset = end;
        Some(slice)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|bytes| bytes[0])
    }

    fn u32(&mut self) -> Option<u32> {
        self.take(4)
            .map(|bytes| u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn i32(&mut self) -> Option<i32> {
        self.take(4)
            .map(|bytes| i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

type RawProgram = (Vec<StubCommand>, Vec<StubCall>, Vec<StubMapCall>);

fn parse_raw(data: &[u8]) -> Option<RawProgram> {
    let mut reader = RawReader { data, offset: 0 };
    if reader.take(4)? != RAW_MAGIC || reader.u8()? != RAW_VERSION {
        return None;
    }

    let mut commands = Vec::new();
    for _ in 0..reader.u32()? {
        let is_offset = reader.u8()? != 0;
        let number = reader.i32()?;
        let mut words = Vec::new();
        for _ in 0..reader.u32()? {
            words.push(reader.i32()?);
        }
        commands.push(StubCommand {
            is_offset,
            number,
            words,
        });
    }

    let mut calls = Vec::new();
    for _ in 0..reader.u32()? {
        calls.push(StubCall {
            code: reader.i32()?,
            arg0: reader.i32()?,
            arg1: reader.i32()?,
        });
    }

    let mut map_calls = Vec::new();
    for _ in 0..reader.u32()? {
        let code = reader.i32()?;
        let address = reader.i32()?;
        let len = reader.u32()? as usize;
        let name = String::from_utf8(reader.take(len)?.to_vec()).ok()?;
        map_calls.push(StubMapCall {
            code,
            name,
            address,
        });
    }

    if reader.offset != data.len() {
        return None;
    }
    Some((commands, calls, map_calls))
}

type Body = fn(&mut InvokeContext<'_>) -> InvokeResult;

fn state<'c>(ctx: &'c InvokeContext<'_>) -> Result<&'c MtState, ForeignException> {
    ctx.native::<MtState>()
}

fn state_mut<'c>(ctx: &'c mut InvokeContext<'_>) -> Result<&'c mut MtState, ForeignException> {
    ctx.native_mut::<MtState>()
}

fn index(ctx: &InvokeContext<'_>, arg: usize, len: usize) -> Result<usize, ForeignException> {
    let value = ctx.arg_i32(arg)?;
    usize::try_from(value)
        .ok()
        .filter(|index| *index < len)
        .ok_or_else(|| {
            ForeignException::argument_out_of_range(format!("index {value} outside 0..{len}"))
        })
}

fn element(ctx: &InvokeContext<'_>, arg: usize, len: usize) -> Result<usize, ForeignException> {
    let value = ctx.arg_i32(arg)?;
    usize::try_from(value)
        .ok()
        .filter(|index| *index < len)
        .ok_or_else(|| {
            ForeignException::new(
                exception_type::INDEX_OUT_OF_RANGE,
                format!("index {value} outside 0..{len}"),
            )
        })
}

fn read_command(ctx: &InvokeContext<'_>, object: ObjectRef) -> Result<StubCommand, ForeignException> {
    let words = match ctx.field(object, "words_")? {
        ForeignValue::Null => Vec::new(),
        ForeignValue::Object(array) => ctx.i32_array(array)?,
        other => {
            return Err(ForeignException::new(
                exception_type::INVALID_CAST,
                format!("words_ holds {}", other.kind()),
            ))
        }
    };
    Ok(StubCommand {
        is_offset: ctx.field_bool(object, "isOffset")?,
        number: ctx.field_i32(object, "number_")?,
        words,
    })
}

fn new_command(ctx: &mut InvokeContext<'_>, command: &StubCommand) -> InvokeResult {
    let object = ctx.new_object("Command")?;
    let words = ctx.alloc_i32_array(&command.words)?;
    ctx.set_field(object, "isOffset", command.is_offset.into())?;
    ctx.set_field(object, "number_", command.number.into())?;
    ctx.set_field(object, "words_", words.into())?;
    Ok(object.into())
}

fn read_call(ctx: &InvokeContext<'_>, object: ObjectRef) -> Result<StubCall, ForeignException> {
    Ok(StubCall {
        code: ctx.field_i32(object, "code_")?,
        arg0: ctx.field_i32(object, "arg0_")?,
        arg1: ctx.field_i32(object, "arg1_")?,
    })
}

fn new_call(ctx: &mut InvokeContext<'_>, call: StubCall) -> InvokeResult {
    let object = ctx.new_object("Call")?;
    ctx.set_field(object, "code_", call.code.into())?;
    ctx.set_field(object, "arg0_", call.arg0.into())?;
    ctx.set_field(object, "arg1_", call.arg1.into())?;
    Ok(object.into())
}

fn opcode_name(command: &StubCommand) -> &'static str {
    match command.words.first() {
        None => "?",
        Some(&OP_LOAD) => "LOAD",
        Some(&OP_JUMP) => "JUMP",
        Some(&OP_RETURN) => "RET",
        Some(_) => "NOP",
    }
}

fn m(signature: &'static str, ret: &'static str, body: Body) -> (&'static str, &'static str, Body) {
    (signature, ret, body)
}

macro_rules! getter {
    ($field:ident) => {
        |ctx| Ok(state(ctx)?.$field.into())
    };
}

fn emulator_methods() -> Vec<(&'static str, &'static str, Body)> {
    vec![
        m(".ctor()", "void", |ctx| {
            ctx.set_native(MtState::new())?;
            Ok(ForeignValue::Void)
        }),
        m("Clone()", "Emulator", |ctx| Ok(ctx.clone_this()?.into())),
        m("Reset()", "void", |ctx| {
            state_mut(ctx)?.reset();
            Ok(ForeignValue::Void)
        }),
        m("GetCommand(int)", "Command", |ctx| {
            let index = index(ctx, 0, state(ctx)?.commands.len())?;
            let command = state(ctx)?.commands[index].clone();
            new_command(ctx, &command)
        }),
        m("AddCommand(int, Command)", "bool", |ctx| {
            let index = index(ctx, 0, state(ctx)?.commands.len() + 1)?;
            let command = read_command(ctx, ctx.arg_object(1)?)?;
            let state = state_mut(ctx)?;
            if state.commands.len() >= PROGRAM_SIZE {
                return Ok(false.into());
            }
            state.commands.insert(index, command);
            Ok(true.into())
        }),
        m("UpdateCommand(int, Command)", "bool", |ctx| {
            let index = index(ctx, 0, state(ctx)?.commands.len())?;
            let command = read_command(ctx, ctx.arg_object(1)?)?;
            state_mut(ctx)?.commands[index] = command;
            Ok(true.into())
        }),
        m("RemoveCommand(int)", "bool", |ctx| {
            let index = index(ctx, 0, state(ctx)?.commands.len())?;
            state_mut(ctx)?.commands.remove(index);
            // the engine reports false even after removing
            Ok(false.into())
        }),
        m("CommandsCount()", "int", |ctx| {
            Ok((state(ctx)?.commands.len() as i32).into())
        }),
        m("LastCommand()", "Command", |ctx| {
            let command = state(ctx)?
                .commands
                .last()
                .cloned()
                .ok_or_else(|| ForeignException::argument_out_of_range("program is empty"))?;
            new_command(ctx, &command)
        }),
        m("ExecutedCommand()", "Command", |ctx| {
            let state = state(ctx)?;
            let command = usize::try_from(state.index_of(state.prev_pc))
                .ok()
                .map(|index| state.commands[index].clone())
                .ok_or_else(|| ForeignException::invalid_operation("no command executed"))?;
            new_command(ctx, &command)
        }),
        m("ExecOne()", "int", |ctx| Ok(state_mut(ctx)?.exec_one().into())),
        m("ExecOneCall()", "int", |ctx| {
            Ok(state_mut(ctx)?.exec_one_call().into())
        }),
        m("ExecAll()", "int", |ctx| Ok(state_mut(ctx)?.exec_all().into())),
        m("GetNextIndex()", "int", |ctx| {
            let state = state(ctx)?;
            let next = if state.end { -1 } else { state.index_of(state.pc) };
            Ok(next.into())
        }),
        m("GetPrevIndex()", "int", |ctx| {
            let state = state(ctx)?;
            Ok(state.index_of(state.prev_pc).into())
        }),
        m("GetCallIndex()", "int", |ctx| {
            Ok((state(ctx)?.call_index - 1).into())
        }),
        m("GetPC()", "int", getter!(pc)),
        m("SetPC(int)", "void", |ctx| {
            let value = ctx.arg_i32(0)?;
            state_mut(ctx)?.pc = value;
            Ok(ForeignValue::Void)
        }),
        m("GetSP()", "int", getter!(sp)),
        m("SetSP(int)", "void", |ctx| {
            let value = ctx.arg_i32(0)?;
            state_mut(ctx)?.sp = value;
            Ok(ForeignValue::Void)
        }),
        m("GetStackValue(int)", "int", |ctx| {
            let index = element(ctx, 0, STACK_LEN)?;
            Ok(state(ctx)?.stack[index].into())
        }),
        m("GetStackLen()", "int", |_ctx| Ok((STACK_LEN as i32).into())),
        m("GetMP()", "int", getter!(mp)),
        m("GetPort()", "int", getter!(port)),
        m("GetMemValue(int)", "int", |ctx| {
            let index = element(ctx, 0, MEM_LEN)?;
            Ok(state(ctx)?.memory[index].into())
        }),
        m("GetMemLen()", "int", |ctx| {
            Ok((state(ctx)?.memory.len() as i32).into())
        }),
        m("GetMem()", "int[]", |ctx| {
            let memory = state(ctx)?.memory.clone();
            Ok(ctx.alloc_i32_array(&memory)?.into())
        }),
        m("GetRegQ()", "int", getter!(q)),
        m("GetRegValue(int)", "int", |ctx| {
            let index = element(ctx, 0, REGISTERS)?;
            Ok(state(ctx)?.registers[index].into())
        }),
        m("GetF()", "int", getter!(f)),
        m("GetY()", "int", getter!(y)),
        m("GetPrevRegQ()", "int", getter!(prev_q)),
        m("GetPrevRegA()", "int", getter!(prev_a)),
        m("GetPrevRegB()", "int", getter!(prev_b)),
        m("GetR()", "int", getter!(r)),
        m("GetS()", "int", getter!(s)),
        m("GetZ()", "bool", getter!(z)),
        m("GetF3()", "bool", getter!(f3)),
        m("GetC4()", "bool", getter!(c4)),
        m("GetOvr()", "bool", getter!(ovr)),
        m("GetG()", "bool", getter!(g)),
        m("GetP()", "bool", getter!(p)),
        m("GetCall(int)", "Call", |ctx| {
            let index = index(ctx, 0, state(ctx)?.calls.len())?;
            let call = state(ctx)?.calls[index];
            new_call(ctx, call)
        }),
        m("AddCall(int, Call)", "bool", |ctx| {
            let index = index(ctx, 0, state(ctx)?.calls.len() + 1)?;
            let call = read_call(ctx, ctx.arg_object(1)?)?;
            let state = state_mut(ctx)?;
            if !state.call_accepted(&call) {
                return Ok(false.into());
            }
            state.calls.insert(index, call);
            Ok(true.into())
        }),
        m("UpdateCall(int, Call)", "bool", |ctx| {
            let index = index(ctx, 0, state(ctx)?.calls.len())?;
            let call = read_call(ctx, ctx.arg_object(1)?)?;
            let state = state_mut(ctx)?;
            if !state.call_accepted(&call) {
                return Ok(false.into());
            }
            state.calls[index] = call;
            Ok(true.into())
        }),
        m("RemoveCall(int)", "void", |ctx| {
            let index = index(ctx, 0, state(ctx)?.calls.len())?;
            state_mut(ctx)?.calls.remove(index);
            Ok(ForeignValue::Void)
        }),
        m("CallsCount()", "int", |ctx| {
            Ok((state(ctx)?.calls.len() as i32).into())
        }),
        m("LastCall()", "Call", |ctx| {
            let call = state(ctx)?
                .calls
                .last()
                .copied()
                .ok_or_else(|| ForeignException::argument_out_of_range("call table is empty"))?;
            new_call(ctx, call)
        }),
        m("AddMapCall(int, string, int)", "bool", |ctx| {
            let code = ctx.arg_i32(0)?;
            let name = ctx.arg_string(1)?;
            let address = ctx.arg_i32(2)?;
            let state = state_mut(ctx)?;
            if state
                .map_calls
                .iter()
                .any(|entry| entry.code == code || entry.name == name)
            {
                return Ok(false.into());
            }
            state.map_calls.push(StubMapCall {
                code,
                name,
                address,
            });
            Ok(true.into())
        }),
        m("RemoveMapCall(int)", "bool", |ctx| {
            let code = ctx.arg_i32(0)?;
            let state = state_mut(ctx)?;
            if state.calls.iter().any(|call| call.code == code) {
                return Ok(false.into());
            }
            let before = state.map_calls.len();
            state.map_calls.retain(|entry| entry.code != code);
            Ok((state.map_calls.len() != before).into())
        }),
        m("UpdateMapCall(int, string, int)", "bool", |ctx| {
            let code = ctx.arg_i32(0)?;
            let name = ctx.arg_string(1)?;
            let address = ctx.arg_i32(2)?;
            let state = state_mut(ctx)?;
            if state
                .map_calls
                .iter()
                .any(|entry| entry.code != code && entry.name == name)
            {
                return Ok(false.into());
            }
            match state.map_calls.iter_mut().find(|entry| entry.code == code) {
                Some(entry) => {
                    entry.name = name;
                    entry.address = address;
                    Ok(true.into())
                }
                None => Ok(false.into()),
            }
        }),
        m("GetMapCallName(int)", "string", |ctx| {
            let code = ctx.arg_i32(0)?;
            let name = state(ctx)?
                .map_calls
                .iter()
                .find(|entry| entry.code == code)
                .map(|entry| entry.name.clone())
                .ok_or_else(|| ForeignException::argument(format!("no map call {code}")))?;
            Ok(ctx.alloc_string(&name)?.into())
        }),
        m("GetMapCallAddress(int)", "int", |ctx| {
            let code = ctx.arg_i32(0)?;
            state(ctx)?
                .map_calls
                .iter()
                .find(|entry| entry.code == code)
                .map(|entry| entry.address.into())
                .ok_or_else(|| ForeignException::argument(format!("no map call {code}")))
        }),
        m("GetMapCallCodes()", "int[]", |ctx| {
            let codes: Vec<i32> = state(ctx)?
                .map_calls
                .iter()
                .map(|entry| entry.code)
                .collect();
            Ok(ctx.alloc_i32_array(&codes)?.into())
        }),
        m("OpenRaw(byte[])", "bool", |ctx| {
            let data = ctx.arg_bytes(0)?;
            Ok(state_mut(ctx)?.open_raw(&data).into())
        }),
        m("ExportRaw()", "byte[]", |ctx| {
            let data = state(ctx)?.export_raw();
            Ok(ctx.alloc_bytes(&data)?.into())
        }),
    ]
}

fn command_class(class: ClassBuilder) -> ClassBuilder {
    class
        .field("isOffset", "bool")
        .field("number_", "int")
        .field("words_", "int[]")
        .method("GetName()", "string", |ctx| {
            let command = read_command(ctx, ctx.this())?;
            let name = format!("{} {}", command.number, opcode_name(&command));
            Ok(ctx.alloc_string(&name)?.into())
        })
        .method("GetJumpName()", "string", |ctx| {
            let command = read_command(ctx, ctx.this())?;
            let name = if command.is_offset {
                "OFFSET".to_string()
            } else {
                match (command.words.first(), command.words.get(1)) {
                    (Some(&OP_JUMP), Some(target)) => format!("JMP {target}"),
                    (Some(&OP_RETURN), _) => "RET".to_string(),
                    _ => "NEXT".to_string(),
                }
            };
            Ok(ctx.alloc_string(&name)?.into())
        })
}

fn call_class(class: ClassBuilder) -> ClassBuilder {
    class
        .field("code_", "int")
        .field("arg0_", "int")
        .field("arg1_", "int")
}

/// The complete engine image.
pub fn engine_image() -> AssemblyImage {
    engine_image_without(&[])
}

/// The engine image with the emulator methods named in `missing` left out.
pub fn engine_image_without(missing: &[&str]) -> AssemblyImage {
    build_image(missing, &[], Vec::new())
}

/// An engine whose `Clone()` always throws.
pub fn engine_image_failing_clone() -> AssemblyImage {
    build_image(
        &[],
        &[],
        vec![m("Clone()", "Emulator", |_ctx| {
            Err(ForeignException::new(
                exception_type::OUT_OF_MEMORY,
                "clone refused",
            ))
        })],
    )
}

/// An engine that works on foreign objects directly instead of copying them:
///
/// - `AddCommand` and `UpdateCommand` keep the argument object in field `held_`
/// - `GetCommand` returns the held object itself
/// - `Clone()` is member-wise, so a clone shares the held object with its source
/// - `GetPC()` allocates a scratch string it never hands out
pub fn engine_image_holding_references() -> AssemblyImage {
    build_image(
        &[],
        &[("held_", "Command")],
        vec![
            m("AddCommand(int, Command)", "bool", hold_command),
            m("UpdateCommand(int, Command)", "bool", hold_command),
            m("GetCommand(int)", "Command", |ctx| {
                let this = ctx.this();
                match ctx.field(this, "held_")? {
                    ForeignValue::Null => Err(ForeignException::argument_out_of_range(
                        "no command held",
                    )),
                    held => Ok(held),
                }
            }),
            m("Clone()", "Emulator", |ctx| {
                Ok(ctx.memberwise_clone_this()?.into())
            }),
            m("GetPC()", "int", |ctx| {
                ctx.alloc_string("scratch")?;
                Ok(state(ctx)?.pc.into())
            }),
        ],
    )
}

fn hold_command(ctx: &mut InvokeContext<'_>) -> InvokeResult {
    let this = ctx.this();
    let command = ctx.arg_object(1)?;
    ctx.set_field(this, "held_", command.into())?;
    Ok(true.into())
}

fn build_image(
    missing: &[&str],
    fields: &[(&str, &str)],
    overrides: Vec<(&'static str, &'static str, Body)>,
) -> AssemblyImage {
    AssemblyImage::builder(ASSEMBLY)
        .class(NAMESPACE, "Emulator", |mut class| {
            for (name, ty) in fields {
                class = class.field(*name, *ty);
            }
            for (signature, ret, body) in emulator_methods() {
                if missing.contains(&signature) {
                    continue;
                }
                let body = overrides
                    .iter()
                    .find(|(replaced, _, _)| *replaced == signature)
                    .map_or(body, |(_, _, replacement)| *replacement);
                class = class.method(signature, ret, body);
            }
            class
        })
        .class(NAMESPACE, "Command", command_class)
        .class(NAMESPACE, "Call", call_class)
        .build()
        .expect("stub engine image is well formed")
}
