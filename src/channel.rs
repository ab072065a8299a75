//! Byte channel abstraction and serial port setup.
//!
//! The protocol only needs a duplex byte stream whose reads give up after a
//! period of silence. Anything that is `Read + Write + Send` qualifies, which
//! covers `Box<dyn SerialPort>` as well as in-memory simulators.

use crate::config::LinkConfig;
use crate::constants::{DATA_BITS, FLOW_CONTROL, PARITY, STOP_BITS};
use crate::error::Result;
use serialport::SerialPort;
use std::io::{self, Read, Write};

/// Duplex byte stream used to talk to the ECU
pub trait ByteChannel: Read + Write + Send {}

impl<T: Read + Write + Send + ?Sized> ByteChannel for T {}

/// Open and configure a serial port for the MEMS diagnostic link
pub fn open_serial(port_name: &str, config: &LinkConfig) -> Result<Box<dyn ByteChannel>> {
    let port = serialport::new(port_name, config.baud_rate)
        .data_bits(DATA_BITS)
        .parity(PARITY)
        .stop_bits(STOP_BITS)
        .flow_control(FLOW_CONTROL)
        .timeout(config.timeout())
        .open()?;

    port.clear(serialport::ClearBuffer::Input)?;
    Ok(Box::new(port))
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>> {
    Ok(serialport::available_ports()?)
}

/// Read until `buf` is full or the channel goes quiet.
///
/// Returns the number of bytes read. A timeout is channel silence, not an
/// error.
pub(crate) fn read_available(channel: &mut dyn ByteChannel, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match channel.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_silence(&e) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(total)
}

/// Write `buf` with a single write call and return the number of bytes taken
pub(crate) fn write_once(channel: &mut dyn ByteChannel, buf: &[u8]) -> Result<usize> {
    loop {
        match channel.write(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_silence(&e) => return Ok(0),
            Err(e) => return Err(e.into()),
        }
    }
}

fn is_silence(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}
