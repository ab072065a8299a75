use crate::constants::{ECU_ID_LEN, KPA_PER_PSI};
use crate::error::MemsError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// ECU generations with incompatible frame layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    /// MEMS 1.9: 0x80 and 0x7D frames, temperatures in Celsius
    #[default]
    Mems19,
    /// MEMS 1.6: 0x80 frame only, temperatures converted to Fahrenheit
    Mems16,
}

impl ProtocolVersion {
    /// Unit the decoded temperatures are reported in
    pub fn temperature_unit(self) -> TemperatureUnit {
        match self {
            ProtocolVersion::Mems19 => TemperatureUnit::Celsius,
            ProtocolVersion::Mems16 => TemperatureUnit::Fahrenheit,
        }
    }

    /// Whether this generation answers the 0x7D data request
    pub fn has_frame_7d(self) -> bool {
        matches!(self, ProtocolVersion::Mems19)
    }
}

impl FromStr for ProtocolVersion {
    type Err = MemsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mems19" | "1.9" => Ok(ProtocolVersion::Mems19),
            "mems16" | "1.6" => Ok(ProtocolVersion::Mems16),
            _ => Err(MemsError::InvalidProtocol(s.to_string())),
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::Mems19 => write!(f, "MEMS 1.9"),
            ProtocolVersion::Mems16 => write!(f, "MEMS 1.6"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

/// Fault bits decoded from the diagnostic trouble code bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaultCodes(pub u8);

impl FaultCodes {
    /// Coolant temperature sensor circuit fault
    pub const COOLANT_SENSOR: u8 = 1 << 0;
    /// Intake air temperature sensor circuit fault
    pub const INTAKE_AIR_SENSOR: u8 = 1 << 1;
    /// Fuel pump circuit fault
    pub const FUEL_PUMP_CIRCUIT: u8 = 1 << 2;
    /// Throttle potentiometer circuit fault
    pub const THROTTLE_POT_CIRCUIT: u8 = 1 << 3;

    /// Derive the fault bits from `dtc0` and `dtc1`
    pub fn from_dtc(dtc0: u8, dtc1: u8) -> Self {
        let mut bits = 0u8;
        if dtc0 & 0x01 != 0 {
            bits |= Self::COOLANT_SENSOR;
        }
        if dtc0 & 0x02 != 0 {
            bits |= Self::INTAKE_AIR_SENSOR;
        }
        if dtc1 & 0x02 != 0 {
            bits |= Self::FUEL_PUMP_CIRCUIT;
        }
        if dtc1 & 0x80 != 0 {
            bits |= Self::THROTTLE_POT_CIRCUIT;
        }
        FaultCodes(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, bit: u8) -> bool {
        self.0 & bit == bit
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Human-readable names of the set faults
    pub fn descriptions(self) -> Vec<&'static str> {
        let table = [
            (Self::COOLANT_SENSOR, "coolant temperature sensor circuit"),
            (Self::INTAKE_AIR_SENSOR, "intake air temperature sensor circuit"),
            (Self::FUEL_PUMP_CIRCUIT, "fuel pump circuit"),
            (Self::THROTTLE_POT_CIRCUIT, "throttle pot circuit"),
        ];
        table
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect()
    }
}

/// Decoded, unit-converted sensor values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub engine_rpm: u16,
    pub temperature_unit: TemperatureUnit,
    pub coolant_temp: f32,
    pub ambient_temp: f32,
    pub intake_air_temp: f32,
    pub fuel_temp: f32,
    pub map_kpa: f32,
    pub battery_voltage: f32,
    pub throttle_pot_voltage: f32,
    pub idle_switch: bool,
    pub park_neutral_switch: bool,
    pub fault_codes: FaultCodes,
    pub iac_position: u8,
    pub idle_error: u16,
    /// Degrees of advance
    pub ignition_advance: f32,
    /// Coil charge time in milliseconds
    pub coil_time_ms: f32,
    // Fields below come from the 0x7D frame and are absent on MEMS 1.6.
    pub lambda_voltage_mv: Option<u16>,
    pub fuel_trim: Option<u8>,
    pub closed_loop: Option<bool>,
    pub idle_base_position: Option<u8>,
}

impl SensorSnapshot {
    /// Manifold absolute pressure in psi
    pub fn map_psi(&self) -> f32 {
        self.map_kpa / KPA_PER_PSI
    }
}

/// Identification bytes returned at the end of the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcuIdentity(pub [u8; ECU_ID_LEN]);

impl fmt::Display for EcuIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex: Vec<String> = self.0.iter().map(|b| format!("{:02X}", b)).collect();
        write!(f, "{}", hex.join(" "))
    }
}

/// Result of driving the IAC valve toward a target position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IacOutcome {
    /// Valve reports the target position
    Reached { position: u8, steps: u32 },
    /// A step command was not acknowledged or returned no position
    StepFailed { position: u8, steps: u32 },
    /// The attempt ceiling was hit before the target was reached
    Exhausted { position: u8, attempts: u32 },
}

impl IacOutcome {
    /// Last position reported by the valve
    pub fn position(&self) -> u8 {
        match *self {
            IacOutcome::Reached { position, .. }
            | IacOutcome::StepFailed { position, .. }
            | IacOutcome::Exhausted { position, .. } => position,
        }
    }

    /// Number of step commands issued
    pub fn steps(&self) -> u32 {
        match *self {
            IacOutcome::Reached { steps, .. } | IacOutcome::StepFailed { steps, .. } => steps,
            IacOutcome::Exhausted { attempts, .. } => attempts,
        }
    }

    pub fn reached(&self) -> bool {
        matches!(self, IacOutcome::Reached { .. })
    }
}
