//! ---
//! vs_section: "02-dataflow"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Value pipeline: registry, stores, rounding, fan-out."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
use std::collections::HashSet;

use crate::device::Device;

/// Device predicate shared by snapshot queries and subscriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    devices: Option<HashSet<String>>,
}

impl Filter {
    /// Filter passing every device.
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Filter passing only the named devices.
    pub fn devices<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            devices: Some(names.into_iter().map(Into::into).collect()),
        }
    }

    /// Filter passing a single device.
    pub fn device(device: &Device) -> Self {
        Self::devices([device.name()])
    }

    /// Whether the filter admits every device.
    pub fn is_unrestricted(&self) -> bool {
        self.devices.is_none()
    }

    /// Whether `device` passes.
    pub fn matches(&self, device: &Device) -> bool {
        self.matches_name(device.name())
    }

    /// Whether a device with this name passes.
    pub fn matches_name(&self, name: &str) -> bool {
        match &self.devices {
            None => true,
            Some(allowed) => allowed.contains(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrestricted_matches_everything() {
        let filter = Filter::unrestricted();
        assert!(filter.is_unrestricted());
        assert!(filter.matches_name("anything"));
    }

    #[test]
    fn device_set_restricts_names() {
        let filter = Filter::devices(["a", "b"]);
        assert!(filter.matches_name("a"));
        assert!(filter.matches_name("b"));
        assert!(!filter.matches_name("c"));
        assert!(!Filter::devices(Vec::<String>::new()).matches_name("a"));
    }
}
