//! Socket adapter tests through the public API
//!
//! The adapter is driven both directly and through a reactor, with a real
//! TCP socket where descriptor identity matters.

use mqtt_reactor::config::AdapterSection;
use mqtt_reactor::testing::{ManualReactor, MockMqttClient, MockSocket, ReactorEvent};
use mqtt_reactor::transport::{Descriptor, SocketRef};
use mqtt_reactor::{MqttPrimitive, MqttStatus, SocketAdapter, SocketCallbacks, INVALID_DESCRIPTOR};
use std::net::{TcpListener, TcpStream};
use std::os::fd::AsRawFd;
use std::rc::Rc;
use std::time::Duration;

type Adapter = SocketAdapter<MockMqttClient, ManualReactor>;

fn adapter_with(
    settings: AdapterSection,
) -> (Rc<MockMqttClient>, Rc<ManualReactor>, Rc<Adapter>) {
    let client = Rc::new(MockMqttClient::new());
    let reactor = Rc::new(ManualReactor::new());
    let adapter = SocketAdapter::new(Rc::downgrade(&client), Rc::clone(&reactor), settings);
    client.set_socket_callbacks(Some(adapter.clone() as Rc<dyn SocketCallbacks>));
    (client, reactor, adapter)
}

#[test]
fn test_real_tcp_socket_descriptor() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let stream = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let expected = stream.as_raw_fd();
    let (_client, reactor, adapter) = adapter_with(AdapterSection::default());

    let sock: SocketRef = Rc::new(stream);
    adapter.on_socket_open(&sock);

    assert_eq!(adapter.descriptor(), expected);
    assert_eq!(reactor.reader_fds(), vec![expected]);

    adapter.on_socket_close(&sock);
    assert_eq!(adapter.descriptor(), INVALID_DESCRIPTOR);
}

#[test]
fn test_adapter_does_not_keep_socket_alive() {
    let (_client, _reactor, adapter) = adapter_with(AdapterSection::default());
    let sock: SocketRef = Rc::new(MockSocket::new(5));

    adapter.on_socket_open(&sock);
    assert_eq!(Rc::strong_count(&sock), 1);

    drop(sock);
    assert!(!adapter.has_socket());
    assert_eq!(adapter.descriptor(), INVALID_DESCRIPTOR);
}

#[test]
fn test_custom_interval_and_prefix() {
    let settings = AdapterSection {
        maintenance_interval_ms: 250,
        log_prefix: "edge-gateway".to_string(),
    };
    let (client, reactor, adapter) = adapter_with(settings);
    client.open_socket(4);

    assert_eq!(adapter.maintenance_interval(), Duration::from_millis(250));
    assert_eq!(adapter.log_prefix(), "edge-gateway");

    reactor.advance(Duration::from_millis(249));
    assert_eq!(client.misc_calls(), 1);
    reactor.advance(Duration::from_millis(1));
    assert_eq!(client.misc_calls(), 2);
}

#[test]
fn test_housekeeping_runs_on_open_then_every_interval() {
    let (client, reactor, _adapter) = adapter_with(AdapterSection::default());
    client.open_socket(4);
    assert_eq!(client.misc_calls(), 1);

    reactor.advance(Duration::from_millis(1499));
    assert_eq!(client.misc_calls(), 1);

    reactor.advance(Duration::from_millis(1));
    assert_eq!(client.misc_calls(), 2);
}

#[test]
fn test_close_events_carry_live_descriptor() {
    let (client, reactor, _adapter) = adapter_with(AdapterSection::default());
    client.open_socket(17);
    client.block_writes();
    reactor.clear_events();

    client.close_socket();

    let events = reactor.events();
    assert_eq!(
        &events[..2],
        &[ReactorEvent::RemoveReader(17), ReactorEvent::RemoveWriter(17)]
    );
    assert!(matches!(events.last(), Some(ReactorEvent::Cancel(_))));
    assert!(!events.contains(&ReactorEvent::RemoveReader(INVALID_DESCRIPTOR)));
}

#[test]
fn test_every_failure_status_stops_the_timer() {
    let failures = [
        MqttStatus::Again,
        MqttStatus::NoMem,
        MqttStatus::Protocol,
        MqttStatus::NoConn,
        MqttStatus::ConnLost,
        MqttStatus::KeepAlive,
        MqttStatus::Unknown,
    ];

    for status in failures {
        let (client, reactor, adapter) = adapter_with(AdapterSection::default());
        client.open_socket(4);
        client.queue_misc_status(status);

        reactor.advance(Duration::from_secs(30));

        assert_eq!(client.misc_calls(), 2, "status {status}");
        assert_eq!(adapter.last_maintenance_failure(), Some(status));
        assert_eq!(reactor.timer_count(), 0);
    }
}

#[test]
fn test_deactivate_is_idempotent() {
    let (client, reactor, adapter) = adapter_with(AdapterSection::default());
    client.open_socket(4);
    client.block_writes();

    adapter.deactivate();
    let calls = reactor.registration_calls();
    adapter.deactivate();

    assert_eq!(reactor.registration_calls(), calls);
    assert_eq!(reactor.reader_count(), 0);
    assert_eq!(reactor.writer_count(), 0);
    assert_eq!(reactor.timer_count(), 0);
}

#[test]
fn test_unregister_write_without_registration() {
    let (client, reactor, adapter) = adapter_with(AdapterSection::default());
    client.open_socket(4);

    client.unblock_writes();

    assert!(!reactor.is_writing(&adapter));
    assert!(reactor.is_reading(&adapter));
}

#[test]
fn test_adapter_survives_reactor_shutdown() {
    let (client, reactor, adapter) = adapter_with(AdapterSection::default());
    client.open_socket(4);

    reactor.shutdown("stopping");

    assert!(adapter.has_socket());
    assert_eq!(adapter.descriptor(), 4);
    client.close_socket();
    assert!(!adapter.is_active());
}

#[test]
fn test_callback_sink_is_object_safe() {
    let (client, reactor, adapter) = adapter_with(AdapterSection::default());
    let sink: Rc<dyn SocketCallbacks> = adapter.clone();
    let sock: SocketRef = Rc::new(MockSocket::new(8));

    sink.on_socket_open(&sock);
    sink.on_socket_register_write(&sock);
    assert!(reactor.is_writing(&adapter));
    sink.on_socket_unregister_write(&sock);
    sink.on_socket_close(&sock);

    assert!(!adapter.is_active());
    assert_eq!(client.read_calls(), 0);
}
