//! ---
//! vs_section: "03-devices"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Device models, telemetry sources and polling."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
use std::sync::Arc;

use indexmap::IndexMap;

use crate::tables;
use crate::ModelError;

/// One readable register of a device model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Register {
    /// Wire address.
    pub address: u16,
    /// Multiplier turning the raw integer into the physical value.
    pub factor: f64,
    /// Physical unit.
    pub unit: &'static str,
    /// Whether the raw integer is two's complement.
    pub signed: bool,
    /// Decimal places used by the rounder.
    pub round_decimals: u32,
}

impl Register {
    pub const fn new(
        address: u16,
        factor: f64,
        unit: &'static str,
        signed: bool,
        round_decimals: u32,
    ) -> Self {
        Self {
            address,
            factor,
            unit,
            signed,
            round_decimals,
        }
    }

    /// Convert the raw reading into the physical value.
    pub fn decode(&self, raw: RawRegister) -> f64 {
        let integer = if self.signed {
            raw.as_signed() as f64
        } else {
            raw.as_unsigned() as f64
        };
        integer * self.factor
    }
}

/// Integer as read from the wire, with its width in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRegister {
    value: u32,
    bits: u8,
}

impl RawRegister {
    pub fn u8(value: u8) -> Self {
        Self {
            value: value as u32,
            bits: 8,
        }
    }

    pub fn u16(value: u16) -> Self {
        Self {
            value: value as u32,
            bits: 16,
        }
    }

    pub fn u32(value: u32) -> Self {
        Self { value, bits: 32 }
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn as_unsigned(&self) -> u32 {
        self.value
    }

    /// Sign-extend from the register width.
    pub fn as_signed(&self) -> i64 {
        let shift = 64 - u32::from(self.bits);
        ((u64::from(self.value) << shift) as i64) >> shift
    }
}

/// Signal table of one device model.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    tag: String,
    registers: IndexMap<String, Register>,
}

impl Model {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            registers: IndexMap::new(),
        }
    }

    /// Add registers; later entries replace earlier ones with the same name.
    pub fn with_registers<'a>(
        mut self,
        registers: impl IntoIterator<Item = &'a (&'static str, Register)>,
    ) -> Self {
        for (name, register) in registers {
            self.registers.insert((*name).to_owned(), *register);
        }
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn register(&self, name: &str) -> Option<&Register> {
        self.registers.get(name)
    }

    /// Registers in table order.
    pub fn registers(&self) -> impl Iterator<Item = (&str, &Register)> {
        self.registers.iter().map(|(name, reg)| (name.as_str(), reg))
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }
}

/// Maps a model tag to its signal table.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: IndexMap<String, Arc<Model>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with every built-in model.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for model in tables::builtin_models() {
            registry.register(model);
        }
        registry
    }

    /// Add a model, returning the one it replaced.
    pub fn register(&mut self, model: Model) -> Option<Arc<Model>> {
        self.models.insert(model.tag.clone(), Arc::new(model))
    }

    pub fn get(&self, tag: &str) -> Result<Arc<Model>, ModelError> {
        self.models
            .get(tag)
            .cloned()
            .ok_or_else(|| ModelError::UnknownModel(tag.to_owned()))
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}
