//! The embedded runtime host.
//!
//! A [`RuntimeHost`] models the process-wide runtime that environments are created from. It
//! keeps the installed assembly images and enforces the runtime's lifecycle rules:
//!
//! - at most one environment is live at a time
//! - once that environment is torn down the host is finished, and every further
//!   initialization fails
//!
//! [`RuntimeHost::global`] is the process-wide default used by
//! [`Emulator::new`](crate::Emulator::new). Independent hosts from [`RuntimeHost::new`] are
//! useful when several isolated sessions are needed, for example in tests.

use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc, OnceLock,
};

use dashmap::DashMap;
use log::info;
use strum::{Display, FromRepr};

use crate::{runtime::AssemblyImage, Error, Result};

/// Lifecycle state of a [`RuntimeHost`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, FromRepr)]
#[repr(u8)]
pub enum HostState {
    /// No environment has been created yet.
    Uninitialized = 0,
    /// An environment is live.
    Live = 1,
    /// The environment was torn down; the host cannot be used again.
    TornDown = 2,
}

/// Process-wide runtime that hosts one embedded environment.
#[derive(Debug)]
pub struct RuntimeHost {
    state: AtomicU8,
    assemblies: DashMap<String, Arc<AssemblyImage>>,
}

static GLOBAL_HOST: OnceLock<Arc<RuntimeHost>> = OnceLock::new();

impl RuntimeHost {
    /// Creates a fresh, uninitialized host with no assemblies installed.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(RuntimeHost {
            state: AtomicU8::new(HostState::Uninitialized as u8),
            assemblies: DashMap::new(),
        })
    }

    /// The process-wide host.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL_HOST.get_or_init(RuntimeHost::new))
    }

    /// Installs an assembly image, replacing any image with the same name.
    ///
    /// Environments that are already live keep the image they loaded.
    pub fn install(&self, image: AssemblyImage) -> Arc<AssemblyImage> {
        let image = Arc::new(image);
        info!(
            "installed assembly {} ({} classes)",
            image.name(),
            image.classes().len()
        );
        self.assemblies
            .insert(image.name().to_string(), Arc::clone(&image));
        image
    }

    /// Returns the installed image called `name`.
    #[must_use]
    pub fn assembly(&self, name: &str) -> Option<Arc<AssemblyImage>> {
        self.assemblies
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> HostState {
        HostState::from_repr(self.state.load(Ordering::Acquire)).unwrap_or(HostState::TornDown)
    }

    /// Moves the host from `Uninitialized` to `Live`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EnvironmentInit`] if an environment is already live or the host was
    /// torn down.
    pub(crate) fn acquire(&self) -> Result<()> {
        match self.state.compare_exchange(
            HostState::Uninitialized as u8,
            HostState::Live as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(()),
            Err(current) => match HostState::from_repr(current) {
                Some(HostState::Live) => Err(Error::EnvironmentInit(
                    "an environment is already live in this runtime".to_string(),
                )),
                _ => Err(Error::EnvironmentInit(
                    "the runtime was torn down and cannot be re-initialized".to_string(),
                )),
            },
        }
    }

    /// Moves the host to its terminal state.
    pub(crate) fn release(&self) {
        self.state
            .store(HostState::TornDown as u8, Ordering::Release);
    }
}
