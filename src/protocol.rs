use crate::channel::{list_ports, open_serial, read_available, write_once, ByteChannel};
use crate::command::{ActuatorCommand, DataCommand, IacDirection, Relay};
use crate::config::LinkConfig;
use crate::constants::*;
use crate::error::{MemsError, Result};
use crate::frame::{Frame7D, Frame80, RawFrames};
use crate::types::*;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

type ChannelSlot = Option<Box<dyn ByteChannel>>;

/// Main MEMS protocol interface.
///
/// A `Mems` owns at most one open channel behind a single lock. Every
/// exchange with the ECU holds that lock from the first byte written to the
/// last byte read, so the value can be shared between threads (for example
/// in an `Arc`) without responses being attributed to the wrong request.
pub struct Mems {
    channel: Mutex<ChannelSlot>,
    config: LinkConfig,
    print_tx: AtomicBool,
    print_rx: AtomicBool,
}

/// Exclusive access to an open channel for the duration of one exchange.
/// Dropping it releases the lock.
struct Session<'a> {
    slot: MutexGuard<'a, ChannelSlot>,
    print_tx: bool,
    print_rx: bool,
}

impl Default for Mems {
    fn default() -> Self {
        Mems::new(LinkConfig::default())
    }
}

impl Mems {
    /// Create an interface with no channel open yet
    pub fn new(config: LinkConfig) -> Self {
        Mems {
            channel: Mutex::new(None),
            config,
            print_tx: false.into(),
            print_rx: false.into(),
        }
    }

    /// Create an interface and open the serial port in one go
    pub fn open(port_name: &str, config: LinkConfig) -> Result<Self> {
        let mems = Mems::new(config);
        mems.connect(port_name)?;
        Ok(mems)
    }

    /// List available serial ports
    pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>> {
        list_ports()
    }

    /// Settings this interface was created with
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Enable/disable debug logging of transmitted and received bytes
    pub fn set_debug_print(&self, tx: bool, rx: bool) {
        self.print_tx.store(tx, Ordering::Relaxed);
        self.print_rx.store(rx, Ordering::Relaxed);
    }

    fn lock(&self) -> MutexGuard<'_, ChannelSlot> {
        self.channel.lock().unwrap_or_else(|poisoned| {
            warn!("Connection lock was poisoned; recovering");
            poisoned.into_inner()
        })
    }

    fn session(&self) -> Result<Session<'_>> {
        let slot = self.lock();
        if slot.is_none() {
            return Err(MemsError::NotConnected);
        }
        Ok(Session {
            slot,
            print_tx: self.print_tx.load(Ordering::Relaxed),
            print_rx: self.print_rx.load(Ordering::Relaxed),
        })
    }

    /// Open the serial port, or succeed immediately if already open
    pub fn connect(&self, port_name: &str) -> Result<()> {
        let config = &self.config;
        self.connect_with(|| {
            info!("Opening {} at {} baud", port_name, config.baud_rate);
            open_serial(port_name, config)
        })
    }

    /// Install a channel produced by `open` unless one is already installed.
    ///
    /// `open` runs under the connection lock and is not called at all when the
    /// connection is already open.
    pub fn connect_with<F>(&self, open: F) -> Result<()>
    where
        F: FnOnce() -> Result<Box<dyn ByteChannel>>,
    {
        let mut slot = self.lock();
        if slot.is_none() {
            *slot = Some(open()?);
        }
        Ok(())
    }

    /// Use an already-configured channel
    pub fn attach<C>(&self, channel: C) -> Result<()>
    where
        C: ByteChannel + 'static,
    {
        self.connect_with(|| Ok(Box::new(channel)))
    }

    /// Close the channel. Does nothing when already closed.
    pub fn disconnect(&self) {
        if self.lock().take().is_some() {
            info!("Disconnected from ECU");
        }
    }

    /// Whether a channel is currently open
    pub fn is_connected(&self) -> bool {
        self.lock().is_some()
    }

    /// Send a single command byte and wait for it to be echoed.
    ///
    /// Returns `Ok(false)` when the byte could not be written, nothing came
    /// back, a different byte came back, or more than the echo arrived. Any
    /// surplus bytes are drained before the lock is released. `Err` is
    /// reserved for channel failures.
    pub fn send_command(&self, cmd: u8) -> Result<bool> {
        let mut session = self.session()?;
        if !session.send_command(cmd)? {
            return Ok(false);
        }

        let surplus = session.drain()?;
        if surplus > 0 {
            warn!(
                "Received {} unexpected bytes after echo of command {:02X}",
                surplus, cmd
            );
            return Ok(false);
        }
        Ok(true)
    }

    /// Run the link-initialization handshake and return the ECU identity.
    ///
    /// The sequence is CA, 75, F4 (followed by one null byte) and D0 (followed
    /// by four identification bytes). It stops at the first step that fails;
    /// callers retry from the beginning.
    pub fn init_link(&self) -> Result<EcuIdentity> {
        let mut session = self.session()?;
        let heartbeat = u8::from(DataCommand::Heartbeat);

        session.handshake_step(INIT_CMD_A)?;
        session.handshake_step(INIT_CMD_B)?;
        session.handshake_step(heartbeat)?;
        if session.read(1)?.len() != 1 {
            warn!("Did not see null terminator for {:02X} command", heartbeat);
            return Err(MemsError::Handshake {
                command: heartbeat,
                stage: "missing null terminator",
            });
        }
        session.handshake_step(INIT_CMD_D)?;

        let response = session.read(ECU_ID_LEN)?;
        if response.len() != ECU_ID_LEN {
            warn!(
                "Received {} of {} bytes after echo of {:02X} command",
                response.len(),
                ECU_ID_LEN,
                INIT_CMD_D
            );
            return Err(MemsError::Handshake {
                command: INIT_CMD_D,
                stage: "short identification response",
            });
        }

        let mut id = [0u8; ECU_ID_LEN];
        id.copy_from_slice(&response);
        let identity = EcuIdentity(id);
        info!("ECU link initialized, identity {}", identity);
        Ok(identity)
    }

    /// Ping the ECU. The echo is followed by a single null byte.
    pub fn heartbeat(&self) -> Result<bool> {
        self.session()?
            .command_with_trailer(DataCommand::Heartbeat.into())
    }

    /// Clear stored fault codes
    pub fn clear_faults(&self) -> Result<bool> {
        self.session()?
            .command_with_trailer(DataCommand::ClearFaults.into())
    }

    /// Request the raw data frames.
    ///
    /// The 0x7D request is only sent once the 0x80 frame has been read in
    /// full, and only on generations that have that frame. Both requests
    /// happen under one lock acquisition.
    pub fn read_raw(&self) -> Result<RawFrames> {
        let mut session = self.session()?;

        session.command(DataCommand::ReqData80.into())?;
        let frame_80 = Frame80::parse(&session.read_exact(Frame80::LEN)?)?;

        if !self.config.protocol.has_frame_7d() {
            return Ok(RawFrames::Mems16 { frame_80 });
        }

        session.command(DataCommand::ReqData7D.into())?;
        let frame_7d = Frame7D::parse(&session.read_exact(Frame7D::LEN)?)?;
        Ok(RawFrames::Mems19 { frame_80, frame_7d })
    }

    /// Read and decode the sensor data
    pub fn read(&self) -> Result<SensorSnapshot> {
        Ok(self.read_raw()?.decode())
    }

    /// Send an actuator command and return the byte that follows the echo.
    ///
    /// Relay "off" commands sent within about a second of the matching "on"
    /// are acknowledged but may have no physical effect on MEMS 1.6; that is
    /// not reported as a failure.
    pub fn test_actuator(&self, cmd: ActuatorCommand) -> Result<u8> {
        self.session()?.command_with_payload(cmd.into())
    }

    /// Switch a relay on or off
    pub fn set_relay(&self, relay: Relay, on: bool) -> Result<u8> {
        self.test_actuator(ActuatorCommand::relay(relay, on))
    }

    /// Fuel pump relay
    pub fn fuel_pump(&self, on: bool) -> Result<u8> {
        self.set_relay(Relay::FuelPump, on)
    }

    /// Manifold heater relay
    pub fn ptc_relay(&self, on: bool) -> Result<u8> {
        self.set_relay(Relay::Ptc, on)
    }

    /// Air conditioning clutch relay
    pub fn ac_relay(&self, on: bool) -> Result<u8> {
        self.set_relay(Relay::AirCon, on)
    }

    /// Switch a relay on, hold it for `hold`, then switch it off.
    /// Returns the payload of the "off" command.
    pub fn cycle_relay(&self, relay: Relay, hold: Duration) -> Result<u8> {
        self.set_relay(relay, true)?;
        thread::sleep(hold);
        self.set_relay(relay, false)
    }

    /// Pulse the fuel injectors
    pub fn test_injectors(&self) -> Result<u8> {
        self.test_actuator(ActuatorCommand::TestInjectors)
    }

    /// Fire the ignition coil once
    pub fn fire_coil(&self) -> Result<u8> {
        self.test_actuator(ActuatorCommand::FireCoil)
    }

    /// Read the current idle air control valve position
    pub fn read_iac_position(&self) -> Result<u8> {
        self.test_actuator(ActuatorCommand::GetIacPosition)
    }

    /// Move the IAC valve by one step; returns the new position
    pub fn step_iac(&self, direction: IacDirection) -> Result<u8> {
        self.test_actuator(ActuatorCommand::iac_step(direction))
    }

    /// Step the IAC valve until it reports `target`.
    ///
    /// The direction is chosen once from the starting position. The valve
    /// moves at most one step per command and the step size is not
    /// guaranteed, so the loop is bounded by `LinkConfig::iac_max_attempts`.
    /// Each step takes the connection lock separately.
    pub fn move_iac(&self, target: u8) -> Result<IacOutcome> {
        let mut position = self.read_iac_position()?;
        if position == target {
            return Ok(IacOutcome::Reached { position, steps: 0 });
        }

        let direction = if target > position && position < IAC_MAXIMUM {
            IacDirection::Open
        } else {
            IacDirection::Close
        };
        debug!(
            "Moving IAC from {:#04x} to {:#04x} ({:?})",
            position, target, direction
        );

        let limit = self.config.iac_max_attempts;
        let mut steps = 0;
        while position != target {
            if steps >= limit {
                warn!(
                    "IAC stopped at {:#04x} after {} attempts (target {:#04x})",
                    position, steps, target
                );
                return Ok(IacOutcome::Exhausted { position, attempts: steps });
            }
            match self.step_iac(direction) {
                Ok(new_position) => {
                    position = new_position;
                    steps += 1;
                }
                Err(e) => {
                    warn!("IAC step failed at {:#04x}: {}", position, e);
                    return Ok(IacOutcome::StepFailed { position, steps });
                }
            }
        }

        Ok(IacOutcome::Reached { position, steps })
    }

    /// Open the IAC valve until it reports the fully-open position
    pub fn open_iac_fully(&self) -> Result<IacOutcome> {
        self.sweep_iac(IacDirection::Open, |position| position >= IAC_MAXIMUM)
    }

    /// Close the IAC valve, then keep sending close commands until the valve
    /// has reported position zero `closed_confirmations` times, as dealer
    /// diagnostic tools do.
    pub fn close_iac_fully(&self, closed_confirmations: u32) -> Result<IacOutcome> {
        let mut remaining = closed_confirmations;
        self.sweep_iac(IacDirection::Close, move |position| {
            if position == 0 {
                remaining = remaining.saturating_sub(1);
            }
            position == 0 && remaining == 0
        })
    }

    // The first step always goes out; an error there is returned as-is since
    // no position is known yet.
    fn sweep_iac<F>(&self, direction: IacDirection, mut done: F) -> Result<IacOutcome>
    where
        F: FnMut(u8) -> bool,
    {
        let limit = self.config.iac_max_attempts;
        let mut position = self.step_iac(direction)?;
        let mut steps = 1;

        while !done(position) {
            if steps >= limit {
                return Ok(IacOutcome::Exhausted { position, attempts: steps });
            }
            match self.step_iac(direction) {
                Ok(new_position) => {
                    position = new_position;
                    steps += 1;
                }
                Err(e) => {
                    warn!("IAC sweep stopped at {:#04x}: {}", position, e);
                    return Ok(IacOutcome::StepFailed { position, steps });
                }
            }
        }

        Ok(IacOutcome::Reached { position, steps })
    }
}

impl Session<'_> {
    fn channel(&mut self) -> Result<&mut (dyn ByteChannel + 'static)> {
        self.slot.as_deref_mut().ok_or(MemsError::NotConnected)
    }

    fn send_command(&mut self, cmd: u8) -> Result<bool> {
        let (print_tx, print_rx) = (self.print_tx, self.print_rx);
        let channel = self.channel()?;

        if print_tx {
            debug!("Sending:  {:02X}", cmd);
        }
        if write_once(channel, &[cmd])? != 1 {
            warn!("Failed to send command {:02X}", cmd);
            return Ok(false);
        }

        let mut echo = [0u8; 1];
        if read_available(channel, &mut echo)? != 1 {
            warn!("Did not receive echo of command {:02X}", cmd);
            return Ok(false);
        }
        if print_rx {
            debug!("Received: {:02X}", echo[0]);
        }
        if echo[0] != cmd {
            warn!(
                "Received one nonmatching byte ({:02X}) in response to command {:02X}",
                echo[0], cmd
            );
            return Ok(false);
        }

        Ok(true)
    }

    /// Read up to `len` bytes, stopping early on silence
    fn read(&mut self, len: usize) -> Result<Vec<u8>> {
        let print_rx = self.print_rx;
        let mut buf = vec![0u8; len];
        let n = read_available(self.channel()?, &mut buf)?;
        buf.truncate(n);

        if print_rx && n > 0 {
            debug!("Received: {}", hex_string(&buf));
        }
        if n < len {
            warn!("Expected {} bytes, got {}", len, n);
        }
        Ok(buf)
    }

    /// Discard bytes until the channel goes quiet; returns how many were dropped
    fn drain(&mut self) -> Result<usize> {
        let print_rx = self.print_rx;
        let mut scratch = [0u8; 32];
        let mut dropped = 0;
        loop {
            let n = read_available(self.channel()?, &mut scratch)?;
            if print_rx && n > 0 {
                debug!("Discarded: {}", hex_string(&scratch[..n]));
            }
            dropped += n;
            if n < scratch.len() {
                return Ok(dropped);
            }
        }
    }

    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>> {
        let buf = self.read(len)?;
        if buf.len() != len {
            return Err(MemsError::ShortRead {
                expected: len,
                actual: buf.len(),
            });
        }
        Ok(buf)
    }

    fn command(&mut self, cmd: u8) -> Result<()> {
        if self.send_command(cmd)? {
            Ok(())
        } else {
            Err(MemsError::CommandRejected { command: cmd })
        }
    }

    fn command_with_payload(&mut self, cmd: u8) -> Result<u8> {
        self.command(cmd)?;
        Ok(self.read_exact(1)?[0])
    }

    fn command_with_trailer(&mut self, cmd: u8) -> Result<bool> {
        Ok(self.send_command(cmd)? && self.read(1)?.len() == 1)
    }

    fn handshake_step(&mut self, cmd: u8) -> Result<()> {
        if self.send_command(cmd)? {
            Ok(())
        } else {
            warn!("Did not see {:02X} command echo", cmd);
            Err(MemsError::Handshake {
                command: cmd,
                stage: "no echo",
            })
        }
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
