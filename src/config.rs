//! Machine configuration.
//!
//! ```json
//! { "memory_size": 65536, "opcode_policy": "strict" }
//! ```
//!
//! Both fields are optional and fall back to [`MachineConfig::default`].

use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Default memory size: the full 16-bit address space.
pub const DEFAULT_MEMORY_SIZE: usize = 0x1_0000;

/// Smallest memory that can hold one stack word.
pub const MIN_MEMORY_SIZE: usize = 2;

/// Largest memory a 16-bit stack pointer can address.
pub const MAX_MEMORY_SIZE: usize = 0x1_0000;

/// What the CPU does with an opcode byte it does not recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpcodePolicy {
    /// Fail the step with an illegal instruction error.
    #[default]
    Strict,
    /// Skip the byte and carry on with the next fetch.
    Permissive,
}

/// Construction parameters for a [`Cpu`](crate::Cpu).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MachineConfig {
    /// Main memory size in bytes.
    pub memory_size: usize,
    /// Handling of unrecognized opcodes.
    pub opcode_policy: OpcodePolicy,
}

impl MachineConfig {
    /// Default machine that skips unknown opcodes.
    pub fn permissive() -> Self {
        Self {
            opcode_policy: OpcodePolicy::Permissive,
            ..Self::default()
        }
    }

    /// Replace the memory size.
    pub fn with_memory_size(mut self, memory_size: usize) -> Self {
        self.memory_size = memory_size;
        self
    }

    /// Replace the opcode policy.
    pub fn with_opcode_policy(mut self, policy: OpcodePolicy) -> Self {
        self.opcode_policy = policy;
        self
    }

    /// Check that the configuration describes a buildable machine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_MEMORY_SIZE..=MAX_MEMORY_SIZE).contains(&self.memory_size) {
            return Err(ConfigError::MemorySize(self.memory_size));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(source: &str) -> Result<Self, ConfigError> {
        let config: MachineConfig = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as pretty JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            memory_size: DEFAULT_MEMORY_SIZE,
            opcode_policy: OpcodePolicy::Strict,
        }
    }
}

/// Errors that can occur while building a machine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("memory size {0} is outside the supported range 2..=65536")]
    MemorySize(usize),

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
