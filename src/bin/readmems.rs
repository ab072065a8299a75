//! readmems - run one diagnostic command against a MEMS ECU
//!
//! Usage:
//!   readmems /dev/ttyUSB0 read 10
//!   readmems /dev/ttyUSB0 read-raw inf --json
//!   readmems COM3 iac-move --target 0x40
//!
//! Set RUST_LOG to control logging:
//!   RUST_LOG=debug readmems /dev/ttyUSB0 read --trace-io

use chrono::Utc;
use clap::{Parser, ValueEnum};
use log::{error, info};
use mems_protocol::constants::{IAC_CLOSE_EXTRA, RELAY_HOLD_MS};
use mems_protocol::{
    IacOutcome, LinkConfig, Mems, ProtocolVersion, RawFrames, Relay, Result, SensorSnapshot,
};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "readmems", version, about = "Rover MEMS ECU diagnostic tool")]
struct Cli {
    /// Serial device (e.g. /dev/ttyUSB0 or COM3)
    #[arg(required_unless_present = "list_ports")]
    device: Option<String>,

    /// Command to run
    #[arg(required_unless_present = "list_ports")]
    command: Option<EcuCommand>,

    /// Number of times to repeat read commands, or "inf"
    #[arg(value_parser = parse_count, default_value = "1")]
    count: Repeat,

    /// ECU generation (mems19 or mems16)
    #[arg(long, default_value = "mems19", value_parser = parse_protocol)]
    protocol: ProtocolVersion,

    /// Target position for iac-move
    #[arg(long, value_parser = parse_byte, required_if_eq("command", "iac-move"))]
    target: Option<u8>,

    /// Serial read timeout in milliseconds
    #[arg(long, default_value_t = mems_protocol::constants::TIMEOUT_MS)]
    timeout_ms: u64,

    /// Ceiling on IAC step commands
    #[arg(long, default_value_t = mems_protocol::constants::IAC_MAX_ATTEMPTS)]
    iac_attempts: u32,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Log every byte sent and received (at debug level)
    #[arg(long)]
    trace_io: bool,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum EcuCommand {
    Read,
    ReadRaw,
    ReadIac,
    Ptc,
    Fuelpump,
    IacClose,
    IacOpen,
    Ac,
    Coil,
    Injectors,
    Heartbeat,
    ClearFaults,
    IacMove,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Repeat {
    Times(u64),
    Forever,
}

impl Repeat {
    fn allows(self, done: u64) -> bool {
        match self {
            Repeat::Times(n) => done < n,
            Repeat::Forever => true,
        }
    }
}

fn parse_count(s: &str) -> std::result::Result<Repeat, String> {
    if s == "inf" {
        return Ok(Repeat::Forever);
    }
    parse_number(s)
        .map(Repeat::Times)
        .ok_or_else(|| format!("expected a count or \"inf\", got {:?}", s))
}

fn parse_byte(s: &str) -> std::result::Result<u8, String> {
    parse_number(s)
        .and_then(|n| u8::try_from(n).ok())
        .ok_or_else(|| format!("expected a byte value (0-255 or 0x00-0xFF), got {:?}", s))
}

fn parse_protocol(s: &str) -> std::result::Result<ProtocolVersion, String> {
    s.parse().map_err(|e: mems_protocol::MemsError| e.to_string())
}

fn parse_number(s: &str) -> Option<u64> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

fn main() -> ExitCode {
    // Initialize logger with default info level if RUST_LOG is not set
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if cli.list_ports {
        return match Mems::list_ports() {
            Ok(ports) => {
                for port in ports {
                    println!("{} - {:?}", port.port_name, port.port_type);
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Could not list serial ports: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let (Some(device), Some(command)) = (cli.device.clone(), cli.command) else {
        error!("A device and a command are required");
        return ExitCode::FAILURE;
    };

    let config = LinkConfig::default()
        .with_protocol(cli.protocol)
        .with_timeout_ms(cli.timeout_ms)
        .with_iac_max_attempts(cli.iac_attempts);

    info!("Running command: {:?}", command);
    let mems = match Mems::open(&device, config) {
        Ok(mems) => mems,
        Err(e) => {
            error!("Could not open serial device ({}): {}", device, e);
            return ExitCode::from(2);
        }
    };
    mems.set_debug_print(cli.trace_io, cli.trace_io);

    let success = match mems.init_link() {
        Ok(id) => {
            info!("ECU identity: {}", id);
            run(&mems, command, &cli)
        }
        Err(e) => {
            error!("Error sending startup command: {}", e);
            false
        }
    };
    mems.disconnect();

    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    }
}

/// Run the selected command. Returns true if at least one operation succeeded.
fn run(mems: &Mems, command: EcuCommand, cli: &Cli) -> bool {
    match command {
        EcuCommand::Read => repeat(cli.count, || {
            let data = mems.read()?;
            print_snapshot(&data, cli.json);
            Ok(())
        }),
        EcuCommand::ReadRaw => repeat(cli.count, || {
            let frames = mems.read_raw()?;
            print_raw(&frames, cli.json);
            Ok(())
        }),
        EcuCommand::ReadIac => report(mems.read_iac_position().map(|pos| {
            println!("0x{:02X}", pos);
        })),
        EcuCommand::Ptc => report(cycle(mems, Relay::Ptc)),
        EcuCommand::Fuelpump => report(cycle(mems, Relay::FuelPump)),
        EcuCommand::Ac => report(cycle(mems, Relay::AirCon)),
        EcuCommand::Coil => report(mems.fire_coil().map(drop)),
        EcuCommand::Injectors => report(mems.test_injectors().map(drop)),
        EcuCommand::Heartbeat => report_flag(mems.heartbeat()),
        EcuCommand::ClearFaults => report_flag(mems.clear_faults()),
        EcuCommand::IacOpen => report_iac(mems.open_iac_fully(), cli.json),
        EcuCommand::IacClose => report_iac(mems.close_iac_fully(IAC_CLOSE_EXTRA), cli.json),
        EcuCommand::IacMove => match cli.target {
            Some(target) => report_iac(mems.move_iac(target), cli.json),
            None => {
                error!("iac-move needs --target");
                false
            }
        },
    }
}

fn cycle(mems: &Mems, relay: Relay) -> Result<()> {
    mems.cycle_relay(relay, Duration::from_millis(RELAY_HOLD_MS))
        .map(drop)
}

fn repeat<F>(count: Repeat, mut op: F) -> bool
where
    F: FnMut() -> Result<()>,
{
    let mut done = 0;
    let mut any_success = false;
    while count.allows(done) {
        match op() {
            Ok(()) => any_success = true,
            Err(e) => error!("{}", e),
        }
        done += 1;
    }
    any_success
}

fn report(result: Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            error!("{}", e);
            false
        }
    }
}

fn report_flag(result: Result<bool>) -> bool {
    match result {
        Ok(true) => true,
        Ok(false) => {
            error!("ECU did not respond as expected");
            false
        }
        Err(e) => {
            error!("{}", e);
            false
        }
    }
}

fn report_iac(result: Result<IacOutcome>, json: bool) -> bool {
    match result {
        Ok(outcome) => {
            if json {
                print_json(&outcome);
            } else {
                println!(
                    "IAC position: 0x{:02X} after {} steps ({})",
                    outcome.position(),
                    outcome.steps(),
                    match outcome {
                        IacOutcome::Reached { .. } => "reached",
                        IacOutcome::StepFailed { .. } => "step failed",
                        IacOutcome::Exhausted { .. } => "attempt limit reached",
                    }
                );
            }
            outcome.reached()
        }
        Err(e) => {
            error!("{}", e);
            false
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(e) => error!("Could not serialize output: {}", e),
    }
}

fn print_snapshot(data: &SensorSnapshot, json: bool) {
    if json {
        print_json(data);
        return;
    }

    let unit = match data.temperature_unit {
        mems_protocol::TemperatureUnit::Celsius => "C",
        mems_protocol::TemperatureUnit::Fahrenheit => "F",
    };
    println!("{}", Utc::now().format("%Y-%m-%d %H:%M:%S"));
    println!("RPM: {}", data.engine_rpm);
    println!("Coolant (deg {}): {:.0}", unit, data.coolant_temp);
    println!("Ambient (deg {}): {:.0}", unit, data.ambient_temp);
    println!("Intake air (deg {}): {:.0}", unit, data.intake_air_temp);
    println!("Fuel (deg {}): {:.0}", unit, data.fuel_temp);
    println!("MAP (kPa): {:.0} ({:.2} psi)", data.map_kpa, data.map_psi());
    println!("Main voltage: {:.1}", data.battery_voltage);
    println!("Throttle pot voltage: {:.2}", data.throttle_pot_voltage);
    println!("Idle switch: {}", data.idle_switch);
    println!("Park/neutral switch: {}", data.park_neutral_switch);
    println!("Fault codes: {}", data.fault_codes.bits());
    for fault in data.fault_codes.descriptions() {
        println!("  - {}", fault);
    }
    println!("IAC position: {}", data.iac_position);
    println!("Idle error: {}", data.idle_error);
    println!("Ignition advance (deg): {:.1}", data.ignition_advance);
    println!("Coil time (ms): {:.3}", data.coil_time_ms);
    if let Some(mv) = data.lambda_voltage_mv {
        println!("Lambda (mV): {}", mv);
    }
    if let Some(trim) = data.fuel_trim {
        println!("Fuel trim: {}", trim);
    }
    if let Some(closed_loop) = data.closed_loop {
        println!("Closed loop: {}", closed_loop);
    }
    if let Some(pos) = data.idle_base_position {
        println!("Idle base position: {}", pos);
    }
    println!("-------------");
}

fn print_raw(frames: &RawFrames, json: bool) {
    if json {
        print_json(frames);
        return;
    }

    let csv = |bytes: &[u8]| {
        bytes
            .iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
            .join(",")
    };
    println!("{}", csv(&frames.frame_80().as_bytes()));
    if let Some(frame_7d) = frames.frame_7d() {
        println!("{}", csv(&frame_7d.as_bytes()));
    }
}
