//! Simulated ECU channels shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};

pub const IDENTITY: [u8; 4] = [0x99, 0x00, 0x03, 0x03];

/// Frame 0x80 with RPM 0x1020, battery 12.5 V, advance 8 degrees,
/// coolant fault set and IAC position 0x30.
pub fn frame_80_bytes() -> [u8; 28] {
    let mut f = [0u8; 28];
    f[0] = 0x1C;
    f[1] = 0x10;
    f[2] = 0x20;
    f[3] = 88;
    f[4] = 21;
    f[5] = 33;
    f[6] = 40;
    f[7] = 34;
    f[8] = 125;
    f[9] = 40;
    f[10] = 1;
    f[13] = 0x01;
    f[18] = 0x30;
    f[19] = 0x00;
    f[20] = 0x0A;
    f[22] = 64;
    f[23] = 0x03;
    f[24] = 0xE8;
    f[27] = 0x5A;
    f
}

/// Frame 0x7D with lambda 450 mV, closed loop, idle base 0x23
pub fn frame_7d_bytes() -> [u8; 32] {
    let mut f = [0u8; 32];
    f[0] = 0x20;
    f[6] = 90;
    f[10] = 1;
    f[11] = 0x80;
    f[12] = 0x66;
    f[15] = 0x23;
    f[31] = 0x77;
    f
}

/// State of the simulated ECU, inspectable by tests
pub struct EcuState {
    /// Every byte written by the host, in order
    pub written: Vec<u8>,
    pending: VecDeque<u8>,
    pub iac_position: u8,
    /// Positions moved per IAC step command; 0 models a stuck valve
    pub iac_step: u8,
    pub frame_80: Vec<u8>,
    pub frame_7d: Vec<u8>,
    /// Commands the ECU ignores completely
    pub muted: HashSet<u8>,
    /// Commands the ECU echoes but never sends a payload for
    pub no_payload: HashSet<u8>,
    /// Replace every echo with this byte
    pub wrong_echo: Option<u8>,
    /// Number of further step commands answered before the valve goes quiet
    pub iac_steps_before_silence: Option<u32>,
}

#[derive(Clone)]
pub struct SimulatedEcu {
    state: Arc<Mutex<EcuState>>,
}

impl SimulatedEcu {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(EcuState {
                written: Vec::new(),
                pending: VecDeque::new(),
                iac_position: 0x30,
                iac_step: 1,
                frame_80: frame_80_bytes().to_vec(),
                frame_7d: frame_7d_bytes().to_vec(),
                muted: HashSet::new(),
                no_payload: HashSet::new(),
                wrong_echo: None,
                iac_steps_before_silence: None,
            })),
        }
    }

    pub fn with_iac(position: u8, step: u8) -> Self {
        let ecu = Self::new();
        {
            let mut state = ecu.state();
            state.iac_position = position;
            state.iac_step = step;
        }
        ecu
    }

    pub fn state(&self) -> MutexGuard<'_, EcuState> {
        self.state.lock().unwrap()
    }

    pub fn written(&self) -> Vec<u8> {
        self.state().written.clone()
    }

    pub fn count_written(&self, cmd: u8) -> usize {
        self.state().written.iter().filter(|&&b| b == cmd).count()
    }
}

impl EcuState {
    fn respond(&mut self, cmd: u8) {
        if self.muted.contains(&cmd) {
            return;
        }
        self.pending.push_back(self.wrong_echo.unwrap_or(cmd));
        if self.no_payload.contains(&cmd) {
            return;
        }

        match cmd {
            0xF4 | 0xCC | 0xF8 | 0x01..=0x03 | 0x11..=0x13 => self.pending.push_back(0x00),
            0xF7 => self.pending.push_back(0x03),
            0xD0 => self.pending.extend(IDENTITY),
            0x80 => {
                let frame = self.frame_80.clone();
                self.pending.extend(frame);
            }
            0x7D => {
                let frame = self.frame_7d.clone();
                self.pending.extend(frame);
            }
            0xFB => self.pending.push_back(self.iac_position),
            0xFD | 0xFE => {
                if let Some(remaining) = self.iac_steps_before_silence.as_mut() {
                    if *remaining == 0 {
                        return;
                    }
                    *remaining -= 1;
                }
                self.iac_position = if cmd == 0xFD {
                    self.iac_position.saturating_add(self.iac_step).min(0xB4)
                } else {
                    self.iac_position.saturating_sub(self.iac_step)
                };
                self.pending.push_back(self.iac_position);
            }
            _ => {}
        }
    }
}

impl Read for SimulatedEcu {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state();
        if state.pending.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "Operation timed out"));
        }
        let mut n = 0;
        while n < buf.len() {
            match state.pending.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl Write for SimulatedEcu {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state();
        for &b in buf {
            state.written.push(b);
            state.respond(b);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Channel that replays a fixed byte script regardless of what is written
#[derive(Clone)]
pub struct ScriptedChannel {
    rx: Arc<Mutex<VecDeque<u8>>>,
    tx: Arc<Mutex<Vec<u8>>>,
    accept_writes: bool,
}

impl ScriptedChannel {
    pub fn new(rx: &[u8]) -> Self {
        Self {
            rx: Arc::new(Mutex::new(rx.iter().copied().collect())),
            tx: Arc::new(Mutex::new(Vec::new())),
            accept_writes: true,
        }
    }

    /// A channel whose writes transfer nothing
    pub fn refusing_writes(rx: &[u8]) -> Self {
        Self {
            accept_writes: false,
            ..Self::new(rx)
        }
    }

    pub fn written(&self) -> Vec<u8> {
        self.tx.lock().unwrap().clone()
    }

    pub fn unread(&self) -> usize {
        self.rx.lock().unwrap().len()
    }
}

impl Read for ScriptedChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut rx = self.rx.lock().unwrap();
        let mut n = 0;
        while n < buf.len() {
            match rx.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl Write for ScriptedChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.accept_writes {
            return Ok(0);
        }
        self.tx.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
