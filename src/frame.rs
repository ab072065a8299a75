//! Raw data frames and their decoding.
//!
//! Frames are parsed field by field from their documented byte offsets. The
//! 0x80 frame layout is shared by MEMS 1.6 and 1.9, but the two generations
//! report temperatures differently, so a [`RawFrames`] value always carries
//! the generation it was read from.

use crate::constants::{FRAME_7D_LEN, FRAME_80_LEN};
use crate::error::{MemsError, Result};
use crate::types::{FaultCodes, ProtocolVersion, SensorSnapshot};
use serde::{Deserialize, Serialize};

/// Data frame returned in reply to the 0x80 command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Frame80 {
    pub bytes_in_frame: u8,
    pub engine_rpm_hi: u8,
    pub engine_rpm_lo: u8,
    pub coolant_temp: u8,
    pub ambient_temp: u8,
    pub intake_air_temp: u8,
    pub fuel_temp: u8,
    pub map_kpa: u8,
    /// Tenths of a volt
    pub battery_voltage: u8,
    /// 0.02 V per count
    pub throttle_pot: u8,
    pub idle_switch: u8,
    pub unknown_0b: u8,
    pub park_neutral_switch: u8,
    pub dtc0: u8,
    pub dtc1: u8,
    pub idle_setpoint: u8,
    pub idle_hot: u8,
    pub unknown_11: u8,
    pub iac_position: u8,
    pub idle_error_hi: u8,
    pub idle_error_lo: u8,
    pub ignition_advance_offset: u8,
    /// Half degrees, offset by 24 degrees
    pub ignition_advance: u8,
    /// 2 microseconds per count
    pub coil_time_hi: u8,
    pub coil_time_lo: u8,
    pub crankshaft_position: u8,
    pub unknown_1a: u8,
    pub unknown_1b: u8,
}

impl Frame80 {
    pub const LEN: usize = FRAME_80_LEN;

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::LEN {
            return Err(MemsError::InvalidFrameLength {
                frame: "0x80",
                expected: Self::LEN,
                actual: bytes.len(),
            });
        }

        Ok(Frame80 {
            bytes_in_frame: bytes[0],
            engine_rpm_hi: bytes[1],
            engine_rpm_lo: bytes[2],
            coolant_temp: bytes[3],
            ambient_temp: bytes[4],
            intake_air_temp: bytes[5],
            fuel_temp: bytes[6],
            map_kpa: bytes[7],
            battery_voltage: bytes[8],
            throttle_pot: bytes[9],
            idle_switch: bytes[10],
            unknown_0b: bytes[11],
            park_neutral_switch: bytes[12],
            dtc0: bytes[13],
            dtc1: bytes[14],
            idle_setpoint: bytes[15],
            idle_hot: bytes[16],
            unknown_11: bytes[17],
            iac_position: bytes[18],
            idle_error_hi: bytes[19],
            idle_error_lo: bytes[20],
            ignition_advance_offset: bytes[21],
            ignition_advance: bytes[22],
            coil_time_hi: bytes[23],
            coil_time_lo: bytes[24],
            crankshaft_position: bytes[25],
            unknown_1a: bytes[26],
            unknown_1b: bytes[27],
        })
    }

    /// Bytes in wire order
    pub fn as_bytes(&self) -> [u8; FRAME_80_LEN] {
        [
            self.bytes_in_frame,
            self.engine_rpm_hi,
            self.engine_rpm_lo,
            self.coolant_temp,
            self.ambient_temp,
            self.intake_air_temp,
            self.fuel_temp,
            self.map_kpa,
            self.battery_voltage,
            self.throttle_pot,
            self.idle_switch,
            self.unknown_0b,
            self.park_neutral_switch,
            self.dtc0,
            self.dtc1,
            self.idle_setpoint,
            self.idle_hot,
            self.unknown_11,
            self.iac_position,
            self.idle_error_hi,
            self.idle_error_lo,
            self.ignition_advance_offset,
            self.ignition_advance,
            self.coil_time_hi,
            self.coil_time_lo,
            self.crankshaft_position,
            self.unknown_1a,
            self.unknown_1b,
        ]
    }
}

/// Data frame returned in reply to the 0x7D command (MEMS 1.9 only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Frame7D {
    pub bytes_in_frame: u8,
    pub ignition_switch: u8,
    /// Multiply by 0.6 for degrees
    pub throttle_angle: u8,
    pub unknown_03: u8,
    /// Divide by 10 for the ratio
    pub air_fuel_ratio: u8,
    pub dtc2: u8,
    /// 5 mV per count
    pub lambda_voltage: u8,
    pub lambda_frequency: u8,
    pub lambda_duty_cycle: u8,
    pub lambda_status: u8,
    pub closed_loop: u8,
    pub long_term_fuel_trim: u8,
    pub short_term_fuel_trim: u8,
    pub carbon_canister_duty_cycle: u8,
    pub dtc3: u8,
    pub idle_base_position: u8,
    pub unknown_10: u8,
    pub dtc4: u8,
    pub ignition_advance_2: u8,
    pub idle_speed_offset: u8,
    pub idle_error_2: u8,
    /// Bytes 0x15..=0x1F, not yet identified
    pub unknown_tail: [u8; 11],
}

impl Frame7D {
    pub const LEN: usize = FRAME_7D_LEN;

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::LEN {
            return Err(MemsError::InvalidFrameLength {
                frame: "0x7D",
                expected: Self::LEN,
                actual: bytes.len(),
            });
        }

        let mut unknown_tail = [0u8; 11];
        unknown_tail.copy_from_slice(&bytes[21..]);

        Ok(Frame7D {
            bytes_in_frame: bytes[0],
            ignition_switch: bytes[1],
            throttle_angle: bytes[2],
            unknown_03: bytes[3],
            air_fuel_ratio: bytes[4],
            dtc2: bytes[5],
            lambda_voltage: bytes[6],
            lambda_frequency: bytes[7],
            lambda_duty_cycle: bytes[8],
            lambda_status: bytes[9],
            closed_loop: bytes[10],
            long_term_fuel_trim: bytes[11],
            short_term_fuel_trim: bytes[12],
            carbon_canister_duty_cycle: bytes[13],
            dtc3: bytes[14],
            idle_base_position: bytes[15],
            unknown_10: bytes[16],
            dtc4: bytes[17],
            ignition_advance_2: bytes[18],
            idle_speed_offset: bytes[19],
            idle_error_2: bytes[20],
            unknown_tail,
        })
    }

    /// Bytes in wire order
    pub fn as_bytes(&self) -> [u8; FRAME_7D_LEN] {
        let mut bytes = [0u8; FRAME_7D_LEN];
        bytes[..21].copy_from_slice(&[
            self.bytes_in_frame,
            self.ignition_switch,
            self.throttle_angle,
            self.unknown_03,
            self.air_fuel_ratio,
            self.dtc2,
            self.lambda_voltage,
            self.lambda_frequency,
            self.lambda_duty_cycle,
            self.lambda_status,
            self.closed_loop,
            self.long_term_fuel_trim,
            self.short_term_fuel_trim,
            self.carbon_canister_duty_cycle,
            self.dtc3,
            self.idle_base_position,
            self.unknown_10,
            self.dtc4,
            self.ignition_advance_2,
            self.idle_speed_offset,
            self.idle_error_2,
        ]);
        bytes[21..].copy_from_slice(&self.unknown_tail);
        bytes
    }
}

/// Frames from one data read, tagged with the ECU generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum RawFrames {
    Mems19 { frame_80: Frame80, frame_7d: Frame7D },
    Mems16 { frame_80: Frame80 },
}

impl RawFrames {
    pub fn version(&self) -> ProtocolVersion {
        match self {
            RawFrames::Mems19 { .. } => ProtocolVersion::Mems19,
            RawFrames::Mems16 { .. } => ProtocolVersion::Mems16,
        }
    }

    pub fn frame_80(&self) -> &Frame80 {
        match self {
            RawFrames::Mems19 { frame_80, .. } | RawFrames::Mems16 { frame_80 } => frame_80,
        }
    }

    pub fn frame_7d(&self) -> Option<&Frame7D> {
        match self {
            RawFrames::Mems19 { frame_7d, .. } => Some(frame_7d),
            RawFrames::Mems16 { .. } => None,
        }
    }

    /// Decode into a sensor snapshot
    pub fn decode(&self) -> SensorSnapshot {
        decode(self)
    }
}

/// Convert raw frames into physical units. Pure; no I/O.
pub fn decode(frames: &RawFrames) -> SensorSnapshot {
    match frames {
        RawFrames::Mems19 { frame_80, frame_7d } => decode_mems19(frame_80, frame_7d),
        RawFrames::Mems16 { frame_80 } => decode_mems16(frame_80),
    }
}

fn decode_mems19(f80: &Frame80, f7d: &Frame7D) -> SensorSnapshot {
    let mut snapshot = decode_frame_80(f80, ProtocolVersion::Mems19, |raw| raw as f32);
    snapshot.lambda_voltage_mv = Some(f7d.lambda_voltage as u16 * 5);
    snapshot.fuel_trim = Some(f7d.short_term_fuel_trim);
    snapshot.closed_loop = Some(f7d.closed_loop != 0);
    snapshot.idle_base_position = Some(f7d.idle_base_position);
    snapshot
}

fn decode_mems16(f80: &Frame80) -> SensorSnapshot {
    decode_frame_80(f80, ProtocolVersion::Mems16, temperature_to_fahrenheit)
}

fn decode_frame_80(
    frame: &Frame80,
    version: ProtocolVersion,
    temperature: fn(u8) -> f32,
) -> SensorSnapshot {
    SensorSnapshot {
        engine_rpm: u16::from_be_bytes([frame.engine_rpm_hi, frame.engine_rpm_lo]),
        temperature_unit: version.temperature_unit(),
        coolant_temp: temperature(frame.coolant_temp),
        ambient_temp: temperature(frame.ambient_temp),
        intake_air_temp: temperature(frame.intake_air_temp),
        fuel_temp: temperature(frame.fuel_temp),
        map_kpa: frame.map_kpa as f32,
        battery_voltage: frame.battery_voltage as f32 / 10.0,
        throttle_pot_voltage: frame.throttle_pot as f32 * 0.02,
        idle_switch: frame.idle_switch != 0,
        park_neutral_switch: frame.park_neutral_switch != 0,
        fault_codes: FaultCodes::from_dtc(frame.dtc0, frame.dtc1),
        iac_position: frame.iac_position,
        idle_error: u16::from_be_bytes([frame.idle_error_hi, frame.idle_error_lo]),
        ignition_advance: frame.ignition_advance as f32 * 0.5 - 24.0,
        coil_time_ms: u16::from_be_bytes([frame.coil_time_hi, frame.coil_time_lo]) as f32 * 0.002,
        lambda_voltage_mv: None,
        fuel_trim: None,
        closed_loop: None,
        idle_base_position: None,
    }
}

/// MEMS 1.6 reports temperatures offset by 55; convert to Fahrenheit
fn temperature_to_fahrenheit(raw: u8) -> f32 {
    (raw as f32 - 55.0) * 1.8 + 32.0
}
