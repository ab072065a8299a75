mod common;

use common::{ScriptedChannel, SimulatedEcu, IDENTITY};
use mems_protocol::{EcuIdentity, LinkConfig, Mems, MemsError};
use std::sync::atomic::{AtomicUsize, Ordering};

fn connected(channel: impl mems_protocol::ByteChannel + 'static) -> Mems {
    let mems = Mems::new(LinkConfig::default());
    mems.attach(channel).unwrap();
    mems
}

#[test]
fn send_command_succeeds_on_exact_echo() {
    for cmd in [0x80u8, 0x7D, 0xCC, 0xF4, 0xFB, 0x11, 0xFE] {
        let channel = ScriptedChannel::new(&[cmd]);
        let mems = connected(channel.clone());
        assert!(mems.send_command(cmd).unwrap(), "command {:#04x}", cmd);
        assert_eq!(channel.written(), vec![cmd]);
    }
}

#[test]
fn send_command_fails_on_other_byte() {
    let mems = connected(ScriptedChannel::new(&[0x81]));
    assert!(!mems.send_command(0x80).unwrap());
}

#[test]
fn send_command_fails_on_silence() {
    let mems = connected(ScriptedChannel::new(&[]));
    assert!(!mems.send_command(0x80).unwrap());

    let ecu = SimulatedEcu::new();
    ecu.state().muted.insert(0x80);
    let mems = connected(ecu);
    assert!(!mems.send_command(0x80).unwrap());
}

#[test]
fn send_command_fails_on_short_write() {
    let channel = ScriptedChannel::refusing_writes(&[0x80]);
    let mems = connected(channel.clone());
    assert!(!mems.send_command(0x80).unwrap());
    // Nothing was sent, so the echo byte is never consumed
    assert_eq!(channel.unread(), 1);
}

#[test]
fn send_command_fails_on_surplus_bytes() {
    let channel = ScriptedChannel::new(&[0x80, 0x80]);
    let mems = connected(channel.clone());
    assert!(!mems.send_command(0x80).unwrap());
    assert_eq!(channel.unread(), 0);
}

#[test]
fn surplus_bytes_do_not_leak_into_next_exchange() {
    let ecu = SimulatedEcu::new();
    let mems = connected(ecu.clone());

    // 0xFB is answered with the echo and a position byte
    assert!(!mems.send_command(0xFB).unwrap());
    assert!(mems.heartbeat().unwrap());
    assert_eq!(ecu.written(), vec![0xFB, 0xF4]);
}

#[test]
fn init_link_returns_identity() {
    let ecu = SimulatedEcu::new();
    let mems = connected(ecu.clone());

    let id = mems.init_link().unwrap();
    assert_eq!(id, EcuIdentity(IDENTITY));
    assert_eq!(id.to_string(), "99 00 03 03");
    assert_eq!(ecu.written(), vec![0xCA, 0x75, 0xF4, 0xD0]);
}

#[test]
fn init_link_stops_when_null_terminator_is_missing() {
    let channel = ScriptedChannel::new(&[0xCA, 0x75, 0xF4]);
    let mems = connected(channel.clone());

    let err = mems.init_link().unwrap_err();
    assert!(matches!(err, MemsError::Handshake { command: 0xF4, .. }));
    assert_eq!(channel.written(), vec![0xCA, 0x75, 0xF4]);
}

#[test]
fn init_link_stops_at_first_missing_echo() {
    let ecu = SimulatedEcu::new();
    ecu.state().muted.insert(0x75);
    let mems = connected(ecu.clone());

    let err = mems.init_link().unwrap_err();
    assert!(matches!(err, MemsError::Handshake { command: 0x75, .. }));
    assert_eq!(ecu.written(), vec![0xCA, 0x75]);
}

#[test]
fn init_link_fails_on_short_identity() {
    let channel = ScriptedChannel::new(&[0xCA, 0x75, 0xF4, 0x00, 0xD0, 0x99, 0x00]);
    let mems = connected(channel);

    let err = mems.init_link().unwrap_err();
    assert!(matches!(err, MemsError::Handshake { command: 0xD0, .. }));
}

#[test]
fn init_link_can_be_retried_from_the_start() {
    let ecu = SimulatedEcu::new();
    ecu.state().muted.insert(0xD0);
    let mems = connected(ecu.clone());
    assert!(mems.init_link().is_err());

    ecu.state().muted.clear();
    assert_eq!(mems.init_link().unwrap(), EcuIdentity(IDENTITY));
}

#[test]
fn connect_is_idempotent() {
    let opened = AtomicUsize::new(0);
    let mems = Mems::default();
    for _ in 0..3 {
        mems.connect_with(|| {
            opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(SimulatedEcu::new()))
        })
        .unwrap();
    }
    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert!(mems.is_connected());
}

#[test]
fn attach_keeps_the_first_channel() {
    let first = SimulatedEcu::new();
    let second = SimulatedEcu::new();
    let mems = connected(first.clone());
    mems.attach(second.clone()).unwrap();

    mems.heartbeat().unwrap();
    assert_eq!(first.written(), vec![0xF4]);
    assert!(second.written().is_empty());
}

#[test]
fn disconnect_closes_the_channel() {
    let mems = connected(SimulatedEcu::new());
    assert!(mems.is_connected());

    mems.disconnect();
    assert!(!mems.is_connected());
    assert!(matches!(mems.init_link(), Err(MemsError::NotConnected)));

    mems.attach(SimulatedEcu::new()).unwrap();
    assert!(mems.init_link().is_ok());
}

#[test]
fn heartbeat_and_clear_faults() {
    let ecu = SimulatedEcu::new();
    let mems = connected(ecu.clone());
    assert!(mems.heartbeat().unwrap());
    assert!(mems.clear_faults().unwrap());
    assert_eq!(ecu.written(), vec![0xF4, 0xCC]);

    ecu.state().no_payload.insert(0xCC);
    assert!(!mems.clear_faults().unwrap());
}
