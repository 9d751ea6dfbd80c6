//! End-to-end routing scenarios over fake hardware.

mod helpers;

use helpers::{input, output, rig, settle_and_check, wait_until};
use ostinato::prelude::*;
use ostinato::{PacketReceived, RouteForwarded};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

fn note_on(note: u8, velocity: u8) -> Vec<u8> {
    vec![0x90, note, velocity]
}

#[test]
fn basic_route_forwards_identical_bytes() {
    let r = rig(vec![
        input("hw:in1", "Input"),
        output("hw:out1", "Output"),
    ]);
    r.engine
        .matrix()
        .upsert(RouteDefinition::new("hw:in1", "hw:out1", RouteFilter::allow_all()).unwrap())
        .unwrap();

    let cancel = CancellationToken::new();
    r.engine.start(&cancel).unwrap();

    r.hardware.inject("hw:in1", &note_on(60, 100));
    wait_until(|| r.hardware.sent().len() == 1);

    let sent = r.hardware.sent();
    assert_eq!(sent[0].0, "hw:out1");
    assert_eq!(sent[0].1, note_on(60, 100));

    wait_until(|| r.engine.message_log().len() == 2);
    let entries = r.engine.message_log().list();
    assert_eq!(entries[0].detail, "IN NoteOn C4 Vel:100");
    assert_eq!(entries[0].endpoint_name, "Input");
    assert_eq!(entries[1].detail, "Routed from Input NoteOn C4 Vel:100");
    assert_eq!(entries[1].endpoint_name, "Output");

    r.engine.stop();
}

#[test]
fn channel_filter_rejects_nonmatching_packet() {
    let r = rig(vec![
        input("hw:in1", "Input"),
        output("hw:out1", "Output"),
    ]);
    let filter = RouteFilter::new([2], []).unwrap();
    r.engine
        .matrix()
        .upsert(RouteDefinition::new("hw:in1", "hw:out1", filter).unwrap())
        .unwrap();

    r.engine.start(&CancellationToken::new()).unwrap();

    // 0x90 = NoteOn channel 1; the filter wants channel 2 only.
    r.hardware.inject("hw:in1", &note_on(60, 100));
    wait_until(|| r.engine.message_log().len() == 1);
    settle_and_check(|| r.hardware.sent().is_empty());

    // Channel 2 passes.
    r.hardware.inject("hw:in1", &[0x91, 60, 100]);
    wait_until(|| r.hardware.sent().len() == 1);

    r.engine.stop();
}

#[test]
fn hot_reroute_switches_target_between_packets() {
    let r = rig(vec![
        input("hw:in1", "Input"),
        output("hw:out1", "Out One"),
        output("hw:out2", "Out Two"),
    ]);
    r.engine
        .matrix()
        .upsert(RouteDefinition::new("hw:in1", "hw:out1", RouteFilter::allow_all()).unwrap())
        .unwrap();
    r.engine.start(&CancellationToken::new()).unwrap();

    r.hardware.inject("hw:in1", &note_on(60, 100));
    wait_until(|| r.hardware.sent_to("hw:out1").len() == 1);

    r.engine
        .matrix()
        .replace_all([
            RouteDefinition::new("hw:in1", "hw:out2", RouteFilter::allow_all()).unwrap()
        ])
        .unwrap();

    r.hardware.inject("hw:in1", &note_on(61, 100));
    wait_until(|| r.hardware.sent_to("hw:out2").len() == 1);

    settle_and_check(|| {
        r.hardware.sent_to("hw:out1").len() == 1
            && r.hardware.sent_to("hw:out2") == vec![note_on(61, 100)]
            && r.hardware.sent().len() == 2
    });
    r.engine.stop();
}

#[test]
fn loopback_send_echoes_one_packet_received() {
    let r = rig(vec![]);
    let bus = r.engine.catalog().create_loopback("Bus A").unwrap();

    let received: Arc<Mutex<Vec<MidiPacket>>> = Arc::new(Mutex::new(Vec::new()));
    let received_clone = Arc::clone(&received);
    let _sub = r
        .engine
        .session()
        .subscribe_packets(move |PacketReceived(packet)| {
            received_clone.lock().push(packet.clone());
        });

    r.engine.start(&CancellationToken::new()).unwrap();

    let before = chrono::Utc::now();
    r.engine.session().send(&bus.id, &note_on(60, 100)).unwrap();

    settle_and_check(|| received.lock().len() == 1);
    let packets = received.lock();
    assert_eq!(packets[0].source_endpoint_id, bus.id);
    assert_eq!(packets[0].data, note_on(60, 100));
    assert!(packets[0].timestamp >= before);
    drop(packets);

    // No routes configured, so nothing leaves the loopback.
    assert!(r.hardware.sent().is_empty());
    r.engine.stop();
}

#[test]
fn reconciliation_follows_inventory_change() {
    let r = rig(vec![input("hw:A", "A"), output("hw:B", "B")]);
    r.engine.start(&CancellationToken::new()).unwrap();
    assert!(r.hardware.input_open("hw:A"));

    r.inventory
        .set(vec![output("hw:B", "B"), input("hw:C", "C")]);
    r.engine.catalog().refresh().unwrap();

    wait_until(|| r.hardware.input_open("hw:C") && !r.hardware.input_open("hw:A"));

    // hw:B stayed an output the whole time; sends still land.
    r.engine
        .matrix()
        .upsert(RouteDefinition::new("hw:C", "hw:B", RouteFilter::allow_all()).unwrap())
        .unwrap();
    r.hardware.inject("hw:C", &note_on(72, 40));
    wait_until(|| r.hardware.sent_to("hw:B").len() == 1);
    r.engine.stop();
}

#[test]
fn per_source_fifo_order_is_preserved() {
    let r = rig(vec![input("hw:in1", "Input"), output("hw:out1", "Output")]);
    r.engine
        .matrix()
        .upsert(RouteDefinition::new("hw:in1", "hw:out1", RouteFilter::allow_all()).unwrap())
        .unwrap();
    r.engine.start(&CancellationToken::new()).unwrap();

    let expected: Vec<Vec<u8>> = (0..100u8).map(|i| note_on(i, 1 + i)).collect();
    for bytes in &expected {
        r.hardware.inject("hw:in1", bytes);
    }

    wait_until(|| r.hardware.sent_to("hw:out1").len() == expected.len());
    assert_eq!(r.hardware.sent_to("hw:out1"), expected);
    r.engine.stop();
}

#[test]
fn disabled_route_never_dispatches() {
    let r = rig(vec![input("hw:in1", "Input"), output("hw:out1", "Output")]);
    r.engine
        .matrix()
        .upsert(
            RouteDefinition::new("hw:in1", "hw:out1", RouteFilter::allow_all())
                .unwrap()
                .disabled(),
        )
        .unwrap();
    r.engine.start(&CancellationToken::new()).unwrap();

    r.hardware.inject("hw:in1", &note_on(60, 100));
    wait_until(|| r.engine.message_log().len() == 1);
    settle_and_check(|| r.hardware.sent().is_empty());
    r.engine.stop();
}

#[test]
fn fanout_reaches_every_matching_target() {
    let r = rig(vec![
        input("hw:in1", "Input"),
        output("hw:out1", "One"),
        output("hw:out2", "Two"),
    ]);
    r.engine
        .matrix()
        .replace_all([
            RouteDefinition::new("hw:in1", "hw:out1", RouteFilter::allow_all()).unwrap(),
            RouteDefinition::new("hw:in1", "hw:out2", RouteFilter::allow_all()).unwrap(),
        ])
        .unwrap();
    r.engine.start(&CancellationToken::new()).unwrap();

    r.hardware.inject("hw:in1", &note_on(64, 80));
    wait_until(|| r.hardware.sent().len() == 2);
    assert_eq!(r.hardware.sent_to("hw:out1").len(), 1);
    assert_eq!(r.hardware.sent_to("hw:out2").len(), 1);
    r.engine.stop();
}

#[test]
fn forwarded_event_carries_route_identity() {
    let r = rig(vec![input("hw:in1", "Input"), output("hw:out1", "Output")]);
    let route = RouteDefinition::new("hw:in1", "hw:out1", RouteFilter::allow_all()).unwrap();
    let route_id = route.id.clone();
    r.engine.matrix().upsert(route).unwrap();

    let forwarded: Arc<Mutex<Vec<RouteForwarded>>> = Arc::new(Mutex::new(Vec::new()));
    let forwarded_clone = Arc::clone(&forwarded);
    let _sub = r.engine.subscribe_forwarded(move |event| {
        forwarded_clone.lock().push(event.clone());
    });

    r.engine.start(&CancellationToken::new()).unwrap();
    r.hardware.inject("hw:in1", &note_on(60, 100));

    wait_until(|| forwarded.lock().len() == 1);
    let events = forwarded.lock();
    assert_eq!(events[0].route_id, route_id);
    assert_eq!(events[0].source, "hw:in1");
    assert_eq!(events[0].target, "hw:out1");
    drop(events);
    r.engine.stop();
}

#[test]
fn traffic_counters_track_both_directions() {
    let r = rig(vec![input("hw:in1", "Input"), output("hw:out1", "Output")]);
    r.engine
        .matrix()
        .upsert(RouteDefinition::new("hw:in1", "hw:out1", RouteFilter::allow_all()).unwrap())
        .unwrap();
    r.engine.start(&CancellationToken::new()).unwrap();

    r.hardware.inject("hw:in1", &note_on(60, 100));
    wait_until(|| r.hardware.sent().len() == 1);

    let inbound = r.engine.traffic().peek("hw:in1");
    assert!(inbound.messages_per_second > 0.0);
    assert_eq!(inbound.active_channels, vec![1]);

    let outbound = r.engine.traffic().peek("hw:out1");
    assert!(outbound.bytes_per_second > 0.0);
    r.engine.stop();
}

#[test]
fn stop_is_clean_and_restartable() {
    let r = rig(vec![input("hw:in1", "Input"), output("hw:out1", "Output")]);
    r.engine
        .matrix()
        .upsert(RouteDefinition::new("hw:in1", "hw:out1", RouteFilter::allow_all()).unwrap())
        .unwrap();

    let cancel = CancellationToken::new();
    r.engine.start(&cancel).unwrap();
    r.engine.stop();
    assert_eq!(r.engine.session().state(), SessionState::Stopped);
    assert!(!r.hardware.input_open("hw:in1"));

    r.engine.start(&CancellationToken::new()).unwrap();
    assert_eq!(r.engine.session().state(), SessionState::Running);
    r.hardware.inject("hw:in1", &note_on(60, 100));
    wait_until(|| !r.hardware.sent().is_empty());
    r.engine.stop();
}

#[test]
fn watcher_drives_reconciliation_without_explicit_refresh() {
    let dir = tempfile::TempDir::new().unwrap();
    let hardware = Arc::new(helpers::FakeHardware::new());
    let inventory = Arc::new(helpers::FakeInventory::new(vec![input("hw:A", "A")]));
    let engine = EngineBuilder::default()
        .with_provider(Arc::clone(&hardware) as Arc<dyn ostinato::PortProvider>)
        .with_enumerator(Arc::clone(&inventory) as Arc<dyn ostinato::HardwareEnumerator>)
        .with_loopback_store(dir.path().join("loopbacks.json"))
        .with_debounce(Duration::from_millis(5))
        .with_watch_interval(Some(Duration::from_millis(10)))
        .build();

    engine.start(&CancellationToken::new()).unwrap();
    assert!(hardware.input_open("hw:A"));

    inventory.set(vec![input("hw:A", "A"), input("hw:D", "D")]);
    wait_until(|| hardware.input_open("hw:D"));

    inventory.set(vec![input("hw:D", "D")]);
    wait_until(|| !hardware.input_open("hw:A"));
    engine.stop();
}
