//! # mtemu-bridge Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! of the bridge. Import it to get quick access to everything needed for driving an
//! emulator.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all bridge operations
pub use crate::Error;

/// The result type used throughout the bridge
pub use crate::Result;

/// Where to find the Execution Engine
pub use crate::BridgeConfig;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Emulator instances
pub use crate::bridge::{Emulator, Role};

/// Step outcomes and host-side execution state
pub use crate::bridge::{ExecutionState, ResultCode};

/// Register snapshots
pub use crate::bridge::{ProcessorState, StatusFlags, REGISTER_COUNT};

// ================================================================================================
// Records
// ================================================================================================

/// Program, call table and map-call records
pub use crate::bridge::{Call, Command, MapCall};

// ================================================================================================
// Embedded Environment
// ================================================================================================

/// Hosting an engine image
pub use crate::runtime::{AssemblyImage, Environment, ForeignException, RuntimeHost};
