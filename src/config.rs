//! Bridge configuration.
//!
//! [`BridgeConfig`] names everything the bridge needs to find the Execution Engine inside the
//! embedded environment: which assembly to load, the domain to create, and the classes that
//! make up the engine's surface.
//!
//! # Example
//!
//! ```rust
//! use mtemu_bridge::BridgeConfig;
//!
//! // The defaults match the stock engine assembly
//! let config = BridgeConfig::default();
//! assert_eq!(config.emulator_type_name(), "mtemu.Emulator");
//!
//! // Or customize
//! let config = BridgeConfig {
//!     max_heap_objects: 4096,
//!     ..Default::default()
//! }
//! .with_assembly("mtemu-next.dll");
//! assert_eq!(config.assembly, "mtemu-next.dll");
//! ```

/// Where and how to find the Execution Engine.
///
/// # Default Configuration
///
/// - assembly `engine.dll`
/// - domain `mtemu`
/// - namespace `mtemu`, classes `Emulator`, `Command` and `Call`
/// - at most 1,048,576 live foreign objects
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Name of the installed assembly image holding the engine.
    pub assembly: String,

    /// Name given to the environment's domain.
    pub domain_name: String,

    /// Namespace of the engine classes.
    pub namespace: String,

    /// Simple name of the emulator class.
    pub emulator_class: String,

    /// Simple name of the command record class.
    pub command_class: String,

    /// Simple name of the call record class.
    pub call_class: String,

    /// Maximum number of simultaneously live foreign objects.
    pub max_heap_objects: usize,
}

impl Default for BridgeConfig {
    /// Creates the configuration for the stock engine assembly.
    ///
    /// See the struct documentation for default values.
    fn default() -> Self {
        Self {
            assembly: "engine.dll".to_string(),
            domain_name: "mtemu".to_string(),
            namespace: "mtemu".to_string(),
            emulator_class: "Emulator".to_string(),
            command_class: "Command".to_string(),
            call_class: "Call".to_string(),
            max_heap_objects: 1 << 20,
        }
    }
}

impl BridgeConfig {
    /// Sets the assembly name.
    #[must_use]
    pub fn with_assembly(mut self, assembly: impl Into<String>) -> Self {
        self.assembly = assembly.into();
        self
    }

    /// Sets the domain name.
    #[must_use]
    pub fn with_domain_name(mut self, domain_name: impl Into<String>) -> Self {
        self.domain_name = domain_name.into();
        self
    }

    /// Sets the namespace of the engine classes.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the emulator class name.
    #[must_use]
    pub fn with_emulator_class(mut self, name: impl Into<String>) -> Self {
        self.emulator_class = name.into();
        self
    }

    /// Sets the command class name.
    #[must_use]
    pub fn with_command_class(mut self, name: impl Into<String>) -> Self {
        self.command_class = name.into();
        self
    }

    /// Sets the call class name.
    #[must_use]
    pub fn with_call_class(mut self, name: impl Into<String>) -> Self {
        self.call_class = name.into();
        self
    }

    /// Sets the heap object limit.
    #[must_use]
    pub fn with_max_heap_objects(mut self, max: usize) -> Self {
        self.max_heap_objects = max;
        self
    }

    /// Fully qualified emulator class name, e.g. `mtemu.Emulator`.
    #[must_use]
    pub fn emulator_type_name(&self) -> String {
        format!("{}.{}", self.namespace, self.emulator_class)
    }
}
