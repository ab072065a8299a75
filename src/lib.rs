//! # MEMS Protocol Library
//!
//! A Rust library for talking to Rover MEMS engine control units over the
//! serial diagnostic link.
//!
//! ## Features
//!
//! - Link initialization handshake with ECU identification
//! - Read and decode live sensor data (RPM, temperatures, voltages, fault codes, ...)
//! - Actuator tests: fuel pump, heater and A/C relays, injectors, ignition coil
//! - Drive the idle air control valve to a target position
//! - Safe to share between threads: one exchange on the wire at a time
//!
//! ## Example
//!
//! ```no_run
//! use mems_protocol::{LinkConfig, Mems};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mems = Mems::open("/dev/ttyUSB0", LinkConfig::default())?;
//!     let id = mems.init_link()?;
//!     println!("ECU: {}", id);
//!     let data = mems.read()?;
//!     println!("Engine speed: {} RPM", data.engine_rpm);
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod command;
pub mod config;
pub mod constants;
pub mod error;
pub mod frame;
pub mod protocol;
pub mod types;

pub use channel::ByteChannel;
pub use command::{ActuatorCommand, DataCommand, IacDirection, Relay};
pub use config::LinkConfig;
pub use error::{MemsError, Result};
pub use frame::{decode, Frame7D, Frame80, RawFrames};
pub use protocol::Mems;
pub use types::*;
