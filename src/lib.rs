// Copyright 2025 mtemu-bridge contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
//#![deny(unsafe_code)]
// - 'bridge/facade.rs' uses mmap to map program files into memory

//! # mtemu-bridge
//!
//! A bridge for driving the MT1804 microprogram Execution Engine, which lives inside an
//! embedded managed environment, from Rust.
//!
//! The engine owns all processor semantics. This crate owns the plumbing around it:
//!
//! - **Environment lifecycle** - one embedded environment per [`runtime::RuntimeHost`],
//!   initialized once and torn down once
//! - **Typed binding** - every engine method is resolved into a [`bridge::MethodCache`] when an
//!   emulator is created, so no call ever looks anything up by name
//! - **Marshalling** - [`Command`], [`Call`] and [`MapCall`] records, text and arrays cross the
//!   boundary as owned Rust values
//! - **Instances** - create, clone, swap and destroy emulators with ownership-checked lifetimes
//! - **Execution control** - stepping with [`ResultCode`] outcomes, registers, flags, stack,
//!   memory and program files
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mtemu_bridge::prelude::*;
//!
//! let mut emulator = Emulator::new(BridgeConfig::default())?;
//! emulator.open_file("program.mtemu")?;
//!
//! loop {
//!     match emulator.exec_one()? {
//!         ResultCode::Ok => println!("pc = {}", emulator.pc()?),
//!         outcome => {
//!             println!("halted: {outcome}");
//!             break;
//!         }
//!     }
//! }
//!
//! let state = emulator.state()?;
//! println!("Q = {:#x}, flags = {:?}", state.q, state.flags);
//! emulator.destroy()?;
//! # Ok::<(), mtemu_bridge::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`runtime`] - the embedded environment: host, assembly images, object heap, resolution
//!   and invocation
//! - [`bridge`] - the typed emulator API built on top of it
//! - [`config`] - where to find the engine
//! - [`Error`] and [`Result`] - error handling
//!
//! ## Hosting an Engine
//!
//! The engine is an [`runtime::AssemblyImage`] installed into a [`runtime::RuntimeHost`]
//! before the first emulator is created. [`Emulator::new`] uses the process-wide host;
//! [`Emulator::new_in`] takes an explicit one, which is what tests and embedders with more than
//! one engine build use.
//!
//! ```rust,no_run
//! use mtemu_bridge::{runtime::{AssemblyImage, RuntimeHost}, BridgeConfig, Emulator};
//!
//! # fn engine_image() -> AssemblyImage { unimplemented!() }
//! let host = RuntimeHost::new();
//! host.install(engine_image());
//!
//! let emulator = Emulator::new_in(&host, BridgeConfig::default())?;
//! let probe = emulator.try_clone()?;
//! assert!(probe.is_clone());
//! # Ok::<(), mtemu_bridge::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! Failures of the bridge itself are [`Error`]s. Outcomes of the engine's step machine are
//! [`ResultCode`]s and never travel on the error channel, so a caller can always tell "the
//! processor halted" from "the bridge malfunctioned".

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use mtemu_bridge::prelude::*;
///
/// let mut emulator = Emulator::new(BridgeConfig::default())?;
/// assert_eq!(emulator.exec_one()?, ResultCode::NoCommands);
/// # Ok::<(), mtemu_bridge::Error>(())
/// ```
pub mod prelude;

/// Bridge configuration
pub mod config;

/// The embedded execution environment
///
/// Hosts assembly images, the foreign object heap and the invoke path. Everything above this
/// layer talks to the engine exclusively through resolved handles.
pub mod runtime;

/// The typed MT1804 emulator API
pub mod bridge;

pub use bridge::{
    Call, Command, Emulator, ExecutionState, MapCall, ProcessorState, ResultCode, Role,
    StatusFlags,
};
pub use config::BridgeConfig;

/// `mtemu-bridge` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always [`Error`].
///
/// # Examples
///
/// ```rust,no_run
/// use mtemu_bridge::{Emulator, Result};
///
/// fn program_size(emulator: &Emulator) -> Result<usize> {
///     emulator.commands_count()
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `mtemu-bridge` Error type
///
/// The main error type for all operations in this crate. See [`Error`] for the variants.
pub use error::Error;
