//! Shared helpers for the integration tests.

#![allow(dead_code)]

pub mod engine;

use std::sync::Arc;

use mtemu_bridge::{runtime::RuntimeHost, BridgeConfig, Command, Emulator, Result};

pub use engine::{engine_image, OP_JUMP, OP_LOAD, OP_RETURN};

/// A fresh host with the stub engine installed.
pub fn engine_host() -> Arc<RuntimeHost> {
    let host = RuntimeHost::new();
    host.install(engine_image());
    host
}

/// An owner emulator on a fresh host. The host is returned so tests can inspect its state.
pub fn emulator() -> Result<(Arc<RuntimeHost>, Emulator)> {
    let host = engine_host();
    let emulator = Emulator::new_in(&host, BridgeConfig::default())?;
    Ok((host, emulator))
}

/// An owner emulator on a fresh host running the engine that keeps references to foreign
/// objects.
pub fn holding_emulator() -> Result<(Arc<RuntimeHost>, Emulator)> {
    let host = RuntimeHost::new();
    host.install(engine::engine_image_holding_references());
    let emulator = Emulator::new_in(&host, BridgeConfig::default())?;
    Ok((host, emulator))
}

/// `R[register] = value`, then advance.
pub fn load(register: i32, value: i32) -> Command {
    Command::new(false, 0, vec![OP_LOAD, register, value])
}

/// Jump to command `target`.
pub fn jump(target: i32) -> Command {
    Command::new(false, 0, vec![OP_JUMP, target])
}

/// Return from the current call.
pub fn ret() -> Command {
    Command::new(false, 0, vec![OP_RETURN])
}

/// Appends `commands` to the program.
pub fn program(emulator: &mut Emulator, commands: &[Command]) -> Result<()> {
    for command in commands {
        let index = emulator.commands_count()?;
        assert!(emulator.add_command(index, command)?);
    }
    Ok(())
}
