//! Command opcodes understood by the ECU.
//!
//! Every command is a single byte. The ECU acknowledges a command by echoing
//! it back before any payload is sent.

use crate::error::MemsError;
use serde::{Deserialize, Serialize};

/// General commands used to request data and perform maintenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataCommand {
    /// Request the secondary (0x7D) data frame
    ReqData7D = 0x7D,
    /// Request the primary (0x80) data frame
    ReqData80 = 0x80,
    /// Clear stored fault codes
    ClearFaults = 0xCC,
    /// Ping; also the third handshake byte
    Heartbeat = 0xF4,
}

/// Commands used to test actuators on the car.
///
/// Relays have on/off pairs, but MEMS 1.6 switches them off by itself after
/// less than a second. An "off" sent inside that window is echoed and then
/// ignored by the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ActuatorCommand {
    FuelPumpOn = 0x11,
    FuelPumpOff = 0x01,
    PtcRelayOn = 0x12,
    PtcRelayOff = 0x02,
    AcRelayOn = 0x13,
    AcRelayOff = 0x03,
    TestInjectors = 0xF7,
    FireCoil = 0xF8,
    GetIacPosition = 0xFB,
    OpenIac = 0xFD,
    CloseIac = 0xFE,
}

/// Relays that can be switched from the diagnostic link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relay {
    FuelPump,
    /// Manifold heater (positive temperature coefficient) relay
    Ptc,
    AirCon,
}

/// Direction of a single IAC step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IacDirection {
    Open,
    Close,
}

impl ActuatorCommand {
    /// Command switching `relay` on or off
    pub fn relay(relay: Relay, on: bool) -> Self {
        match (relay, on) {
            (Relay::FuelPump, true) => ActuatorCommand::FuelPumpOn,
            (Relay::FuelPump, false) => ActuatorCommand::FuelPumpOff,
            (Relay::Ptc, true) => ActuatorCommand::PtcRelayOn,
            (Relay::Ptc, false) => ActuatorCommand::PtcRelayOff,
            (Relay::AirCon, true) => ActuatorCommand::AcRelayOn,
            (Relay::AirCon, false) => ActuatorCommand::AcRelayOff,
        }
    }

    /// Single-step command for the IAC valve
    pub fn iac_step(direction: IacDirection) -> Self {
        match direction {
            IacDirection::Open => ActuatorCommand::OpenIac,
            IacDirection::Close => ActuatorCommand::CloseIac,
        }
    }
}

impl From<DataCommand> for u8 {
    fn from(cmd: DataCommand) -> u8 {
        cmd as u8
    }
}

impl From<ActuatorCommand> for u8 {
    fn from(cmd: ActuatorCommand) -> u8 {
        cmd as u8
    }
}

impl TryFrom<u8> for DataCommand {
    type Error = MemsError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x7D => Ok(DataCommand::ReqData7D),
            0x80 => Ok(DataCommand::ReqData80),
            0xCC => Ok(DataCommand::ClearFaults),
            0xF4 => Ok(DataCommand::Heartbeat),
            other => Err(MemsError::UnknownCommand(other)),
        }
    }
}

impl TryFrom<u8> for ActuatorCommand {
    type Error = MemsError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x11 => Ok(ActuatorCommand::FuelPumpOn),
            0x01 => Ok(ActuatorCommand::FuelPumpOff),
            0x12 => Ok(ActuatorCommand::PtcRelayOn),
            0x02 => Ok(ActuatorCommand::PtcRelayOff),
            0x13 => Ok(ActuatorCommand::AcRelayOn),
            0x03 => Ok(ActuatorCommand::AcRelayOff),
            0xF7 => Ok(ActuatorCommand::TestInjectors),
            0xF8 => Ok(ActuatorCommand::FireCoil),
            0xFB => Ok(ActuatorCommand::GetIacPosition),
            0xFD => Ok(ActuatorCommand::OpenIac),
            0xFE => Ok(ActuatorCommand::CloseIac),
            other => Err(MemsError::UnknownCommand(other)),
        }
    }
}
