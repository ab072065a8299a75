//! Protocol constants for MEMS ECU communication.
//!
//! This module defines the handshake bytes, frame sizes, IAC limits and the
//! serial port configuration expected by the ECU.

/// First handshake byte
pub const INIT_CMD_A: u8 = 0xCA;

/// Second handshake byte
pub const INIT_CMD_B: u8 = 0x75;

/// Handshake trigger byte, answered with the ECU identity
pub const INIT_CMD_D: u8 = 0xD0;

/// Number of identity bytes returned after the trigger byte
pub const ECU_ID_LEN: usize = 4;

/// Size of the frame returned for the 0x80 data request
pub const FRAME_80_LEN: usize = 28;

/// Size of the frame returned for the 0x7D data request
pub const FRAME_7D_LEN: usize = 32;

/// Fully-open position of the idle air control valve
pub const IAC_MAXIMUM: u8 = 0xB4;

/// Default ceiling on step commands issued while converging the IAC valve
pub const IAC_MAX_ATTEMPTS: u32 = 300;

/// Close commands sent after the valve reports fully closed
pub const IAC_CLOSE_EXTRA: u32 = 80;

/// Baud rate (9600 bps)
pub const BAUD_RATE: u32 = 9600;

/// Read timeout in milliseconds (inter-byte silence)
pub const TIMEOUT_MS: u64 = 100;

/// Data bits per character
pub const DATA_BITS: serialport::DataBits = serialport::DataBits::Eight;

/// No parity bit
pub const PARITY: serialport::Parity = serialport::Parity::None;

/// Stop bits configuration
pub const STOP_BITS: serialport::StopBits = serialport::StopBits::One;

/// Flow control is disabled on the diagnostic link
pub const FLOW_CONTROL: serialport::FlowControl = serialport::FlowControl::None;

/// How long a relay is held on before the off command is sent
pub const RELAY_HOLD_MS: u64 = 2000;

/// Kilopascals per pound-force per square inch
pub const KPA_PER_PSI: f32 = 6.894_757_3;
