//! Fuzz target for the client driver state machine.
//!
//! Feeds arbitrary interleavings of API calls and transport events into
//! a ClientDriver and checks the structural invariants: no panics, and
//! every transport event is either absorbed or produces effects that
//! can be executed.

#![no_main]

use std::time::{Duration, Instant};

use arbitrary::Arbitrary;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use tether_core::{ClientConfig, ClientDriver, TransportEvent, TransportKind};
use tether_proto::Frame;

#[derive(Arbitrary, Debug)]
enum Step {
    Connect { port: u16 },
    Disconnect,
    Request { id_hint: u8, timeout_ms: u16 },
    Notify { id_hint: u8 },
    StreamReady { generation: u8 },
    HandshakePassed { generation: u8 },
    HandshakeFailed { generation: u8 },
    TransportError { generation: u8 },
    Closed { generation: u8 },
    Response { generation: u8, id: u8, status: u16 },
    Ack { generation: u8, id: u8 },
    Tick { advance_ms: u16 },
}

fuzz_target!(|input: (bool, Vec<Step>)| {
    let (tls, steps) = input;
    let transport = if tls { TransportKind::Tls } else { TransportKind::Plain };
    let config = ClientConfig { transport, ..ClientConfig::default() };
    let Ok(mut driver) = ClientDriver::new(config) else {
        return;
    };

    let base = Instant::now();
    let mut now = base;

    for step in steps {
        let effects = match step {
            Step::Connect { port } => driver.connect("fuzz.local", port).ok(),
            Step::Disconnect => driver.disconnect().ok(),
            Step::Request { id_hint, timeout_ms } => driver
                .request(
                    "fuzz.route",
                    Bytes::from(vec![id_hint]),
                    Some(Duration::from_millis(u64::from(timeout_ms) + 1)),
                    now,
                    |_, _| {},
                )
                .ok(),
            Step::Notify { id_hint } => {
                driver.notify("fuzz.route", Bytes::from(vec![id_hint]), None, now, |_, _| {}).ok()
            },
            Step::StreamReady { generation } => Some(
                driver.handle_transport_event(u64::from(generation), TransportEvent::StreamReady),
            ),
            Step::HandshakePassed { generation } => Some(
                driver
                    .handle_transport_event(u64::from(generation), TransportEvent::HandshakePassed),
            ),
            Step::HandshakeFailed { generation } => Some(driver.handle_transport_event(
                u64::from(generation),
                TransportEvent::HandshakeFailed { reason: "TLS Handshake Error".to_string() },
            )),
            Step::TransportError { generation } => Some(driver.handle_transport_event(
                u64::from(generation),
                TransportEvent::Error { reason: "fuzz error".to_string() },
            )),
            Step::Closed { generation } => {
                Some(driver.handle_transport_event(u64::from(generation), TransportEvent::Closed))
            },
            Step::Response { generation, id, status } => Some(driver.handle_transport_event(
                u64::from(generation),
                TransportEvent::Frame(Frame::response(u32::from(id), status, Bytes::new())),
            )),
            Step::Ack { generation, id } => Some(driver.handle_transport_event(
                u64::from(generation),
                TransportEvent::Frame(Frame::ack(u32::from(id), 0)),
            )),
            Step::Tick { advance_ms } => {
                now += Duration::from_millis(u64::from(advance_ms));
                Some(driver.tick(now))
            },
        };

        if let Some(effects) = effects {
            for dispatch in effects.dispatches {
                dispatch.run();
            }
        }
    }
});
