//! Scenario tests against a scripted in-process broker.
//!
//! A plain std TcpListener plays the server side of the wire dialog, so
//! the whole client stack (io loop, parser, codec, state machine,
//! recovery) is exercised without a real broker.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use warren::{
    BasicProperties, BackoffStrategy, Connection, ConnectionProperties, Delivery, ErrorKind,
    RecoveryConfig, options::*,
};

const FRAME_END: u8 = 0xCE;

fn frame(frame_type: u8, channel: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 8);
    out.push(frame_type);
    out.extend_from_slice(&channel.to_be_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out.push(FRAME_END);
    out
}

fn method(class_id: u16, method_id: u16, fields: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(fields.len() + 4);
    payload.extend_from_slice(&class_id.to_be_bytes());
    payload.extend_from_slice(&method_id.to_be_bytes());
    payload.extend_from_slice(fields);
    payload
}

fn shortstr(s: &str) -> Vec<u8> {
    let mut out = vec![s.len() as u8];
    out.extend_from_slice(s.as_bytes());
    out
}

fn longstr(s: &str) -> Vec<u8> {
    let mut out = (s.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(s.as_bytes());
    out
}

fn connection_start(major: u8, minor: u8) -> Vec<u8> {
    let mut fields = vec![major, minor];
    fields.extend_from_slice(&[0, 0, 0, 0]); // empty server properties
    fields.extend(longstr("PLAIN AMQPLAIN"));
    fields.extend(longstr("en_US"));
    frame(1, 0, &method(10, 10, &fields))
}

fn connection_tune(channel_max: u16, frame_max: u32, heartbeat: u16) -> Vec<u8> {
    let mut fields = channel_max.to_be_bytes().to_vec();
    fields.extend_from_slice(&frame_max.to_be_bytes());
    fields.extend_from_slice(&heartbeat.to_be_bytes());
    frame(1, 0, &method(10, 30, &fields))
}

fn connection_open_ok() -> Vec<u8> {
    frame(1, 0, &method(10, 41, &shortstr("")))
}

fn connection_close(code: u16, text: &str) -> Vec<u8> {
    let mut fields = code.to_be_bytes().to_vec();
    fields.extend(shortstr(text));
    fields.extend_from_slice(&[0, 0, 0, 0]);
    frame(1, 0, &method(10, 50, &fields))
}

fn connection_close_ok() -> Vec<u8> {
    frame(1, 0, &method(10, 51, &[]))
}

fn connection_blocked(reason: &str) -> Vec<u8> {
    frame(1, 0, &method(10, 60, &shortstr(reason)))
}

fn channel_open_ok(channel: u16) -> Vec<u8> {
    frame(1, channel, &method(20, 11, &[0, 0, 0, 0]))
}

fn consume_ok(channel: u16, tag: &str) -> Vec<u8> {
    frame(1, channel, &method(60, 21, &shortstr(tag)))
}

fn deliver(channel: u16, tag: &str, delivery_tag: u64, body: &[u8]) -> Vec<u8> {
    let mut fields = shortstr(tag);
    fields.extend_from_slice(&delivery_tag.to_be_bytes());
    fields.push(0); // not redelivered
    fields.extend(shortstr("logs"));
    fields.extend(shortstr("info"));
    let mut out = frame(1, channel, &method(60, 60, &fields));

    let mut header = 60u16.to_be_bytes().to_vec();
    header.extend_from_slice(&0u16.to_be_bytes());
    header.extend_from_slice(&(body.len() as u64).to_be_bytes());
    header.extend_from_slice(&0u16.to_be_bytes()); // no properties
    out.extend(frame(2, channel, &header));
    out.extend(frame(3, channel, body));
    out
}

struct ServerFrame {
    frame_type: u8,
    channel: u16,
    payload: Vec<u8>,
}

impl ServerFrame {
    fn class_method(&self) -> (u16, u16) {
        (
            u16::from_be_bytes([self.payload[0], self.payload[1]]),
            u16::from_be_bytes([self.payload[2], self.payload[3]]),
        )
    }
}

fn read_frame(stream: &mut TcpStream) -> ServerFrame {
    let mut header = [0u8; 7];
    stream.read_exact(&mut header).expect("frame header");
    let frame_type = header[0];
    let channel = u16::from_be_bytes([header[1], header[2]]);
    let size = u32::from_be_bytes([header[3], header[4], header[5], header[6]]) as usize;
    let mut payload = vec![0u8; size + 1];
    stream.read_exact(&mut payload).expect("frame payload");
    assert_eq!(payload.pop(), Some(FRAME_END));
    ServerFrame {
        frame_type,
        channel,
        payload,
    }
}

fn expect_method(stream: &mut TcpStream, class_id: u16, method_id: u16) -> ServerFrame {
    loop {
        let frame = read_frame(stream);
        if frame.frame_type == 8 {
            // interleaved heartbeats are fine
            continue;
        }
        assert_eq!(frame.frame_type, 1, "expected a method frame");
        assert_eq!(
            frame.class_method(),
            (class_id, method_id),
            "unexpected method"
        );
        return frame;
    }
}

/// Plays the server side of the handshake up to open-ok.
fn serve_handshake(stream: &mut TcpStream, heartbeat: u16) {
    let mut protocol_header = [0u8; 8];
    stream.read_exact(&mut protocol_header).expect("protocol header");
    assert_eq!(&protocol_header, b"AMQP\x00\x00\x09\x01");
    stream.write_all(&connection_start(0, 9)).unwrap();
    expect_method(stream, 10, 11); // start-ok
    stream
        .write_all(&connection_tune(2047, 131_072, heartbeat))
        .unwrap();
    expect_method(stream, 10, 31); // tune-ok
    expect_method(stream, 10, 40); // open
    stream.write_all(&connection_open_ok()).unwrap();
}

fn broker<F>(script: F) -> (thread::JoinHandle<()>, ConnectionProperties)
where
    F: FnOnce(TcpListener) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    let handle = thread::spawn(move || script(listener));
    let properties = ConnectionProperties {
        hosts: vec!["127.0.0.1".to_string()],
        port: Some(port),
        ..Default::default()
    };
    (handle, properties)
}

fn accept(listener: &TcpListener) -> TcpStream {
    let (stream, _) = listener.accept().expect("accept");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .expect("read timeout");
    stream
}

fn wait_until(what: &str, mut predicate: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !predicate() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn handshake_channel_open_and_clean_disconnect() {
    let (server, properties) = broker(|listener| {
        let mut stream = accept(&listener);
        serve_handshake(&mut stream, 0);
        expect_method(&mut stream, 20, 10); // channel.open
        stream.write_all(&channel_open_ok(1)).unwrap();
        expect_method(&mut stream, 10, 50); // connection.close
        stream.write_all(&connection_close_ok()).unwrap();
    });

    let connection = Connection::connect(properties, RecoveryConfig::disabled()).expect("connect");
    assert!(connection.status().ready());
    assert_eq!(connection.configuration().channel_max(), 2047);
    assert_eq!(connection.configuration().frame_max(), 131_072);

    let channel = connection.create_channel().expect("channel");
    assert_eq!(channel.id(), 1);
    assert!(channel.status().connected());

    connection.disconnect().expect("disconnect");
    assert!(connection.status().disconnected());
    server.join().unwrap();
}

#[test]
fn bad_server_version_is_terminal() {
    let (server, properties) = broker(|listener| {
        let mut stream = accept(&listener);
        let mut protocol_header = [0u8; 8];
        stream.read_exact(&mut protocol_header).unwrap();
        stream.write_all(&connection_start(1, 0)).unwrap();
        // client drops the transport on us
        let mut junk = [0u8; 64];
        let _ = stream.read(&mut junk);
    });

    let err = Connection::connect(properties, RecoveryConfig::default()).unwrap_err();
    assert!(
        matches!(err.kind(), ErrorKind::BadServerVersion(1, 0)),
        "unexpected error: {}",
        err
    );
    server.join().unwrap();
}

#[test]
fn transport_end_before_ready_reads_as_authentication_failure() {
    let (server, properties) = broker(|listener| {
        let mut stream = accept(&listener);
        let mut protocol_header = [0u8; 8];
        stream.read_exact(&mut protocol_header).unwrap();
        stream.write_all(&connection_start(0, 9)).unwrap();
        expect_method(&mut stream, 10, 11);
        // no tune: drop the connection the way brokers do on bad creds
    });

    let err = Connection::connect(properties, RecoveryConfig::default()).unwrap_err();
    assert!(
        matches!(err.kind(), ErrorKind::AuthenticationFailure),
        "unexpected error: {}",
        err
    );
    server.join().unwrap();
}

#[test]
fn outbound_heartbeats_are_emitted_when_idle() {
    let (server, mut properties) = broker(|listener| {
        let mut stream = accept(&listener);
        serve_handshake(&mut stream, 1);
        let frame = read_frame(&mut stream);
        assert_eq!(frame.frame_type, 8, "expected a heartbeat frame");
        assert_eq!(frame.channel, 0);
    });
    properties.heartbeat = 1;

    let connection = Connection::connect(properties, RecoveryConfig::disabled()).expect("connect");
    server.join().unwrap();
    connection.end();
}

#[test]
fn blocked_then_server_close_goes_terminal() {
    let (server, properties) = broker(|listener| {
        let mut stream = accept(&listener);
        serve_handshake(&mut stream, 0);
        stream.write_all(&connection_blocked("low on memory")).unwrap();
        thread::sleep(Duration::from_millis(100));
        stream
            .write_all(&connection_close(320, "CONNECTION_FORCED"))
            .unwrap();
        // the client acknowledges best-effort before tearing down
        let mut junk = [0u8; 64];
        let _ = stream.read(&mut junk);
    });

    let connection = Connection::connect(properties, RecoveryConfig::disabled()).expect("connect");
    wait_until("blocked", || connection.status().blocked());
    assert_eq!(
        connection.status().blocked_reason().as_deref(),
        Some("low on memory")
    );
    wait_until("terminal failure", || connection.status().failed());
    server.join().unwrap();
}

#[test]
fn reconnect_restores_channels_and_consumers() {
    let (server, mut properties) = broker(|listener| {
        // first session: handshake, channel, consumer, then die
        {
            let mut stream = accept(&listener);
            serve_handshake(&mut stream, 0);
            expect_method(&mut stream, 20, 10);
            stream.write_all(&channel_open_ok(1)).unwrap();
            let consume = expect_method(&mut stream, 60, 20);
            let tag = consume_tag(&consume.payload);
            stream.write_all(&consume_ok(1, &tag)).unwrap();
        }
        // second session: the client replays channel and consumer
        let mut stream = accept(&listener);
        serve_handshake(&mut stream, 0);
        expect_method(&mut stream, 20, 10);
        stream.write_all(&channel_open_ok(1)).unwrap();
        let consume = expect_method(&mut stream, 60, 20);
        let tag = consume_tag(&consume.payload);
        assert_eq!(tag, "tag-1", "resubscription must reuse the tag");
        stream.write_all(&consume_ok(1, &tag)).unwrap();
        stream
            .write_all(&deliver(1, &tag, 7, b"after the outage"))
            .unwrap();
        expect_method(&mut stream, 10, 50); // clean shutdown from the test
        stream.write_all(&connection_close_ok()).unwrap();
    });
    properties.heartbeat = 0;
    let recovery = RecoveryConfig {
        reconnect: true,
        backoff_strategy: BackoffStrategy::Linear,
        backoff_time: Duration::from_millis(50),
        exponential_limit: Duration::from_secs(1),
    };

    let connection = Connection::connect(properties, recovery).expect("connect");
    let channel = connection.create_channel().expect("channel");
    let (deliveries_tx, deliveries_rx) = flume::unbounded::<Delivery>();
    channel
        .basic_consume(
            "logs-queue",
            "tag-1",
            BasicConsumeOptions::default(),
            Default::default(),
            Arc::new(move |delivery: Delivery| {
                let _ = deliveries_tx.send(delivery);
            }),
        )
        .expect("consume");

    // the broker dropped us; recovery re-opens the channel, replays the
    // consumer and the delivery proves the round trip
    let delivery = deliveries_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("delivery after reconnect");
    assert_eq!(delivery.data, b"after the outage");
    assert_eq!(delivery.consumer_tag.as_deref(), Some("tag-1"));
    assert_eq!(delivery.delivery_tag, 7);
    assert!(connection.status().ready());
    assert!(channel.status().connected());

    connection.disconnect().expect("disconnect");
    server.join().unwrap();
}

/// Extracts the consumer tag from a basic.consume payload.
fn consume_tag(payload: &[u8]) -> String {
    // class(2) method(2) ticket(2) queue(shortstr) tag(shortstr)
    let queue_len = payload[6] as usize;
    let tag_at = 7 + queue_len;
    let tag_len = payload[tag_at] as usize;
    String::from_utf8(payload[tag_at + 1..tag_at + 1 + tag_len].to_vec()).unwrap()
}

#[test]
fn publish_chunks_large_bodies_on_the_wire() {
    let (server, properties) = broker(|listener| {
        let mut stream = accept(&listener);
        serve_handshake(&mut stream, 0);
        expect_method(&mut stream, 20, 10);
        stream.write_all(&channel_open_ok(1)).unwrap();
        expect_method(&mut stream, 60, 40); // basic.publish
        let header = read_frame(&mut stream);
        assert_eq!(header.frame_type, 2);
        let body_size = u64::from_be_bytes(header.payload[4..12].try_into().unwrap());
        assert_eq!(body_size, 300_000);
        let mut seen = 0u64;
        let mut sizes = Vec::new();
        while seen < body_size {
            let body = read_frame(&mut stream);
            assert_eq!(body.frame_type, 3);
            sizes.push(body.payload.len());
            seen += body.payload.len() as u64;
        }
        assert_eq!(sizes, vec![131_064, 131_064, 37_872]);
        expect_method(&mut stream, 10, 50);
        stream.write_all(&connection_close_ok()).unwrap();
    });

    let connection = Connection::connect(properties, RecoveryConfig::disabled()).expect("connect");
    connection
        .publish(
            "rk",
            vec![9u8; 300_000],
            BasicPublishOptions::default(),
            BasicProperties::default(),
        )
        .expect("publish");
    connection.disconnect().expect("disconnect");
    server.join().unwrap();
}
