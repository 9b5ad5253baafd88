//! ---
//! vs_section: "03-devices"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "Device models, telemetry sources and polling."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
//! Victron BMV register list.
use crate::model::{Model, Register};

pub const BMV_700_ESSENTIAL: &str = "bmv-700-essential";
pub const BMV_700: &str = "bmv-700";
pub const BMV_702: &str = "bmv-702";
pub const FTP_CAMERA: &str = "ftp-camera";

const ESSENTIAL: &[(&str, Register)] = &[
    ("MainVoltage", Register::new(0xED8D, 0.01, "V", false, 2)),
    ("Current", Register::new(0xED8F, 0.1, "A", true, 1)),
    ("Power", Register::new(0xED8E, 1.0, "W", true, 0)),
];

const HISTORY: &[(&str, Register)] = &[
    ("Consumed", Register::new(0xEEFF, 0.1, "Ah", true, 1)),
    ("StateOfCharge", Register::new(0x0FFF, 0.01, "%", false, 0)),
    ("TimeToGo", Register::new(0x0FFE, 1.0, "min", false, 0)),
    ("Temperature", Register::new(0xEDEC, 0.01, "K", false, 1)),
    ("DepthOfTheDeepestDischarge", Register::new(0x0300, 0.1, "Ah", true, 0)),
    ("DepthOfTheLastDischarge", Register::new(0x0301, 0.1, "Ah", true, 0)),
    ("DepthOfTheAverageDischarge", Register::new(0x0302, 0.1, "Ah", true, 0)),
    ("NumberOfCycles", Register::new(0x0303, 1.0, "", false, 0)),
    ("NumberOfFullDischarges", Register::new(0x0304, 1.0, "", false, 0)),
    ("CumulativeAmpHours", Register::new(0x0305, 0.1, "Ah", true, 0)),
    ("MainVoltageMinimum", Register::new(0x0306, 0.01, "V", false, 2)),
    ("MainVoltageMaximum", Register::new(0x0307, 0.01, "V", false, 2)),
    // raw unit is seconds
    ("HoursSinceFullCharge", Register::new(0x0308, 24.0 / 86400.0, "h", false, 1)),
    ("NumberOfAutomaticSynchronizations", Register::new(0x0309, 1.0, "", false, 0)),
    ("NumberOfLowMainVoltageAlarms", Register::new(0x030A, 1.0, "", false, 0)),
    ("NumberOfHighMainVoltageAlarms", Register::new(0x030B, 1.0, "", false, 0)),
    ("AmountOfDischargedEnergy", Register::new(0x0310, 0.01, "kWh", false, 1)),
    ("AmountOfChargedEnergy", Register::new(0x0311, 0.01, "kWh", false, 1)),
];

const AUX: &[(&str, Register)] = &[
    ("AuxVoltage", Register::new(0xED7D, 0.01, "V", false, 2)),
    ("MidPointVoltage", Register::new(0x0382, 0.01, "V", false, 2)),
    ("MidPointVoltageDeviation", Register::new(0x0383, 0.1, "%", true, 1)),
    ("AuxVoltageMinimum", Register::new(0x030E, 0.01, "V", true, 2)),
    ("AuxVoltageMaximum", Register::new(0x030F, 0.01, "V", true, 2)),
];

/// Every model shipped with the daemon.
pub fn builtin_models() -> Vec<Model> {
    vec![
        Model::new(BMV_700_ESSENTIAL).with_registers(ESSENTIAL),
        Model::new(BMV_700)
            .with_registers(ESSENTIAL)
            .with_registers(HISTORY),
        Model::new(BMV_702)
            .with_registers(ESSENTIAL)
            .with_registers(HISTORY)
            .with_registers(AUX),
        Model::new(FTP_CAMERA),
    ]
}

#[cfg(test)]
mod tests {
    use crate::model::ModelRegistry;

    use super::*;

    #[test]
    fn builtin_tables_nest() {
        let registry = ModelRegistry::builtin();
        assert_eq!(registry.get(BMV_700_ESSENTIAL).unwrap().len(), 3);
        assert_eq!(registry.get(BMV_700).unwrap().len(), 21);
        assert_eq!(registry.get(BMV_702).unwrap().len(), 26);
        assert!(registry.get(FTP_CAMERA).unwrap().is_empty());
    }

    #[test]
    fn essential_registers_match_wire_list() {
        let model = ModelRegistry::builtin().get(BMV_702).unwrap();
        let current = model.register("Current").unwrap();
        assert_eq!(current.address, 0xED8F);
        assert!(current.signed);
        assert_eq!(current.round_decimals, 1);
        let names: Vec<_> = model.registers().take(3).map(|(name, _)| name).collect();
        assert_eq!(names, vec!["MainVoltage", "Current", "Power"]);
    }
}
