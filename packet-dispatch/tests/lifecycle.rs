use dispatch_test_utils::{
    inbound, init_tracing, outbound, wait_until, RecordingListener, RecordingTransport,
    TimeoutRecorder,
};
use packet_dispatch::{
    ConnectionId, Direction, DispatchConfig, DispatchError, InterceptionBridge,
    ListeningWhitelist, PacketDispatcher, PacketListener, PacketType,
};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn dispatcher(config: DispatchConfig) -> (PacketDispatcher, Arc<RecordingTransport>) {
    init_tracing();
    let transport = Arc::new(RecordingTransport::default());
    let dispatcher = PacketDispatcher::new(config, transport.clone()).expect("dispatcher");
    (dispatcher, transport)
}

fn short_timeout() -> DispatchConfig {
    DispatchConfig {
        packet_timeout_ms: 30,
        ..DispatchConfig::default()
    }
}

fn sending(owner: &str, packet_type: u32) -> Arc<RecordingListener> {
    Arc::new(
        RecordingListener::new(owner)
            .sending(ListeningWhitelist::of([PacketType::new(packet_type)])),
    )
}

#[derive(Default)]
struct RecordingBridge {
    calls: Mutex<Vec<(bool, Direction, BTreeSet<PacketType>)>>,
}

impl InterceptionBridge for RecordingBridge {
    fn bridge(&self, direction: Direction, types: &BTreeSet<PacketType>) {
        self.calls.lock().push((true, direction, types.clone()));
    }

    fn unbridge(&self, direction: Direction, types: &BTreeSet<PacketType>) {
        self.calls.lock().push((false, direction, types.clone()));
    }
}

#[test]
fn expired_packet_is_offered_once_then_dropped() {
    let (dispatcher, transport) = dispatcher(short_timeout());
    dispatcher
        .register_listener(sending("stalled", 1), false)
        .expect("register");
    let recorder = Arc::new(TimeoutRecorder::new(ListeningWhitelist::of([PacketType::new(1)])));
    assert_eq!(dispatcher.register_timeout_listener(recorder.clone()), Ok(true));
    assert_eq!(dispatcher.register_timeout_listener(recorder.clone()), Ok(false));

    let connection = ConnectionId::new();
    dispatcher
        .enqueue(outbound(connection, 1, b"late"))
        .expect("enqueue");
    thread::sleep(Duration::from_millis(60));

    dispatcher.tick(0, true);
    dispatcher.tick(1, true);

    assert_eq!(recorder.offered(), vec![1]);
    assert!(transport.is_empty());
    assert_eq!(dispatcher.buffered(Direction::Outbound), 0);
    dispatcher.shutdown();
}

#[test]
fn timeout_listener_can_keep_a_packet_alive() {
    let (dispatcher, transport) = dispatcher(short_timeout());
    let listener: Arc<dyn PacketListener> = sending("stalled", 1);
    dispatcher
        .register_listener(listener.clone(), false)
        .expect("register");
    let recorder = Arc::new(
        TimeoutRecorder::new(ListeningWhitelist::of([PacketType::new(1)]))
            .extending(Duration::from_secs(30)),
    );
    dispatcher
        .register_timeout_listener(recorder.clone())
        .expect("timeout listener");

    dispatcher
        .enqueue(outbound(ConnectionId::new(), 1, b"late"))
        .expect("enqueue");
    thread::sleep(Duration::from_millis(60));

    dispatcher.tick(0, true);
    assert_eq!(recorder.offered(), vec![1]);
    assert_eq!(dispatcher.buffered(Direction::Outbound), 1);

    assert!(dispatcher.unregister_listener(&listener));
    assert_eq!(transport.indices(), vec![1]);
    assert_eq!(recorder.offered(), vec![1]);
}

#[test]
fn shutdown_sends_everything_still_buffered() {
    let (dispatcher, transport) = dispatcher(DispatchConfig::default());
    let pool = dispatcher
        .register_listener(sending("stalled", 1), false)
        .expect("register");

    let connection = ConnectionId::new();
    for _ in 0..3 {
        dispatcher
            .enqueue(outbound(connection, 1, b"x"))
            .expect("enqueue");
    }
    let remote = ConnectionId::new();
    thread::scope(|scope| {
        scope.spawn(|| {
            dispatcher
                .enqueue(inbound(remote, 9, b"in"))
                .expect("enqueue");
        });
    });
    assert!(transport.is_empty());

    dispatcher.shutdown();

    let mut indices = transport.indices();
    indices.sort_unstable();
    assert_eq!(indices, vec![1, 2, 3, 4]);
    assert!(pool.is_cancelled());
    assert!(dispatcher.is_shut_down());
    assert!(dispatcher.listeners().is_empty());
    assert_eq!(
        dispatcher
            .enqueue(outbound(connection, 1, b"x"))
            .map(|_| ()),
        Err(DispatchError::ShutDown)
    );

    dispatcher.shutdown();
    assert_eq!(transport.len(), 4);
}

#[test]
fn removed_connection_discards_its_packets() {
    let (dispatcher, transport) = dispatcher(DispatchConfig::default());
    dispatcher
        .register_listener(sending("stalled", 1), false)
        .expect("register");

    let connection = ConnectionId::new();
    dispatcher
        .enqueue(outbound(connection, 1, b"x"))
        .expect("enqueue");
    assert_eq!(dispatcher.connection_count(), 1);

    assert!(dispatcher.remove_connection(connection));
    assert!(!dispatcher.remove_connection(connection));
    dispatcher.shutdown();

    assert!(transport.is_empty());
}

#[test]
fn preassigned_tokens_are_used_once() {
    let (dispatcher, transport) = dispatcher(DispatchConfig::default());
    let connection = ConnectionId::new();
    let token = dispatcher.create_token(Direction::Outbound, connection);

    let queued = dispatcher
        .enqueue(outbound(connection, 1, b"x").with_token(token.clone()))
        .expect("enqueue");
    assert!(Arc::ptr_eq(&queued, &token));
    assert!(token.is_transmitted());
    assert_eq!(transport.indices(), vec![token.sending_index()]);

    assert_eq!(
        dispatcher
            .enqueue(outbound(connection, 1, b"x").with_token(token))
            .map(|_| ()),
        Err(DispatchError::AlreadyQueued)
    );
}

#[test]
fn token_stamped_for_another_stream_is_rejected() {
    let (dispatcher, transport) = dispatcher(DispatchConfig::default());
    let connection = ConnectionId::new();

    let inbound_token = dispatcher.create_token(Direction::Inbound, connection);
    assert_eq!(
        dispatcher
            .enqueue(outbound(connection, 1, b"x").with_token(inbound_token.clone()))
            .map(|_| ()),
        Err(DispatchError::TokenMismatch)
    );
    let elsewhere = dispatcher.create_token(Direction::Outbound, ConnectionId::new());
    assert_eq!(
        dispatcher
            .enqueue(outbound(connection, 1, b"x").with_token(elsewhere.clone()))
            .map(|_| ()),
        Err(DispatchError::TokenMismatch)
    );
    assert!(!inbound_token.is_queued());
    assert!(!elsewhere.is_queued());
    assert_eq!(dispatcher.buffered(Direction::Outbound), 0);
    assert_eq!(dispatcher.connection_count(), 0);

    dispatcher
        .enqueue(inbound(connection, 1, b"in").with_token(inbound_token.clone()))
        .expect("enqueue");
    assert_eq!(transport.indices(), vec![inbound_token.sending_index()]);
    assert_eq!(transport.transmitted()[0].direction, Direction::Inbound);
}

#[test]
fn full_listener_queue_drops_the_packet() {
    let config = DispatchConfig {
        worker_queue_capacity: 1,
        ..DispatchConfig::default()
    };
    let (dispatcher, transport) = dispatcher(config);
    dispatcher
        .register_listener(sending("stalled", 1), false)
        .expect("register");

    let connection = ConnectionId::new();
    dispatcher
        .enqueue(outbound(connection, 1, b"kept"))
        .expect("enqueue");
    dispatcher
        .enqueue(outbound(connection, 1, b"dropped"))
        .expect("enqueue");

    assert_eq!(dispatcher.in_flight(Direction::Outbound), 1);
    dispatcher.shutdown();
    assert_eq!(transport.payloads(), vec![b"kept".to_vec()]);
}

#[test]
fn unregister_all_removes_every_listener_of_an_owner() {
    let (dispatcher, _transport) = dispatcher(DispatchConfig::default());
    dispatcher
        .register_listener(sending("plugin", 1), false)
        .expect("register");
    dispatcher
        .register_listener(sending("plugin", 2), false)
        .expect("register");
    dispatcher
        .register_listener(sending("other", 3), false)
        .expect("register");

    assert_eq!(dispatcher.unregister_all("plugin"), 2);
    assert_eq!(
        dispatcher.listened_types(Direction::Outbound),
        BTreeSet::from([PacketType::new(3)])
    );
    assert_eq!(dispatcher.listeners().len(), 1);
}

#[test]
fn auto_bridged_types_are_unbridged_when_their_last_listener_leaves() {
    init_tracing();
    let bridge = Arc::new(RecordingBridge::default());
    let transport = Arc::new(RecordingTransport::default());
    let dispatcher = PacketDispatcher::builder(DispatchConfig::default(), transport)
        .interception_bridge(bridge.clone())
        .build()
        .expect("dispatcher");

    let first: Arc<dyn PacketListener> = sending("first", 1);
    let second: Arc<dyn PacketListener> = sending("second", 1);
    dispatcher.register_listener(first.clone(), true).expect("register");
    dispatcher.register_listener(second.clone(), true).expect("register");

    assert!(dispatcher.unregister_listener(&first));
    assert!(dispatcher.unregister_listener(&second));

    let types = BTreeSet::from([PacketType::new(1)]);
    assert_eq!(
        *bridge.calls.lock(),
        vec![
            (true, Direction::Outbound, types.clone()),
            (true, Direction::Outbound, types.clone()),
            (false, Direction::Outbound, types),
        ]
    );
}

#[test]
fn config_is_read_from_json() {
    let json = r#"{ "maximum_concurrency": 2, "sending_delta": 100 }"#;
    let config = DispatchConfig::from_json_str(json).expect("config");
    assert_eq!(config.maximum_concurrency, 2);
    assert_eq!(config.worker_queue_capacity, DispatchConfig::default().worker_queue_capacity);

    let (dispatcher, transport) = dispatcher(config);
    dispatcher
        .enqueue(outbound(ConnectionId::new(), 1, b"x"))
        .expect("enqueue");
    assert!(wait_until(WAIT, || transport.len() == 1));

    assert!(matches!(
        DispatchConfig::from_json_str(r#"{ "maximum_concurrency": 0 }"#),
        Err(DispatchError::InvalidConfig(_))
    ));
}
