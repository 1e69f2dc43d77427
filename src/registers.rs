//! Known GNFL registers
//!
//! | Register | Block   | Parameter              | Scale |
//! |----------|---------|------------------------|-------|
//! | 0x1001   | running | Mains voltage          | 0.1 V |
//! | 0x1006   | running | Battery voltage        | 0.1 V |
//! | 0x1020   | running | PV voltage             | 0.1 V |
//! | 0x1023   | running | PV charging power      | 1 W   |
//! | 0x1037   | basic   | Inverter-on voltage    | 0.1 V |
//! | 0x1038   | basic   | Inverter-off voltage   | 0.1 V |

/// Block a parameter is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Running,
    Basic,
}

/// A named register with its scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parameter {
    pub name: &'static str,
    pub block: BlockKind,
    pub address: u16,
    /// Multiplier from the raw word to `unit`
    pub coefficient: f32,
    pub unit: &'static str,
}

impl Parameter {
    /// True for settings that can be written back
    pub fn is_setting(&self) -> bool {
        self.block == BlockKind::Basic
    }

    /// Raw word for a value in `unit`, rounded and clamped to u16.
    pub fn to_raw(&self, value: f32) -> u16 {
        let raw = (value / self.coefficient).round();
        raw.clamp(0.0, f32::from(u16::MAX)) as u16
    }
}

pub const MAINS_VOLTAGE: Parameter = Parameter {
    name: "mains_voltage",
    block: BlockKind::Running,
    address: 0x1001,
    coefficient: 0.1,
    unit: "V",
};

pub const BATTERY_VOLTAGE: Parameter = Parameter {
    name: "battery_voltage",
    block: BlockKind::Running,
    address: 0x1006,
    coefficient: 0.1,
    unit: "V",
};

pub const PV_VOLTAGE: Parameter = Parameter {
    name: "pv_voltage",
    block: BlockKind::Running,
    address: 0x1020,
    coefficient: 0.1,
    unit: "V",
};

pub const PV_POWER: Parameter = Parameter {
    name: "pv_power",
    block: BlockKind::Running,
    address: 0x1023,
    coefficient: 1.0,
    unit: "W",
};

pub const INVERTER_ON_VOLTAGE: Parameter = Parameter {
    name: "inverter_on_voltage",
    block: BlockKind::Basic,
    address: 0x1037,
    coefficient: 0.1,
    unit: "V",
};

pub const INVERTER_OFF_VOLTAGE: Parameter = Parameter {
    name: "inverter_off_voltage",
    block: BlockKind::Basic,
    address: 0x1038,
    coefficient: 0.1,
    unit: "V",
};

/// Every known parameter, running block first
pub const ALL: [Parameter; 6] = [
    MAINS_VOLTAGE,
    BATTERY_VOLTAGE,
    PV_VOLTAGE,
    PV_POWER,
    INVERTER_ON_VOLTAGE,
    INVERTER_OFF_VOLTAGE,
];

/// Look a parameter up by name.
pub fn by_name(name: &str) -> Option<&'static Parameter> {
    ALL.iter().find(|p| p.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::DeviceProfile;

    #[test]
    fn test_parameters_live_in_their_block() {
        let profile = DeviceProfile::gnfl();
        for param in ALL.iter() {
            let spec = match param.block {
                BlockKind::Running => profile.running,
                BlockKind::Basic => profile.basic,
            };
            assert!(spec.contains(param.address), "{}", param.name);
        }
    }

    #[test]
    fn test_to_raw() {
        assert_eq!(INVERTER_ON_VOLTAGE.to_raw(26.2), 262);
        assert_eq!(INVERTER_OFF_VOLTAGE.to_raw(23.0), 230);
        assert_eq!(PV_POWER.to_raw(-5.0), 0);
        assert_eq!(BATTERY_VOLTAGE.to_raw(1.0e9), u16::MAX);
    }

    #[test]
    fn test_lookup() {
        assert_eq!(by_name("pv_power").map(|p| p.address), Some(0x1023));
        assert!(by_name("grid_frequency").is_none());
        assert!(INVERTER_ON_VOLTAGE.is_setting());
        assert!(!PV_VOLTAGE.is_setting());
    }
}
