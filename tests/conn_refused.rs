use warren::{Connection, ConnectionProperties, ErrorKind, RecoveryConfig};

#[test]
fn connection_refused_surfaces_an_io_error() {
    // grab a port the kernel considers free, then close it again
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);

    let properties = ConnectionProperties {
        hosts: vec!["127.0.0.1".to_string()],
        port: Some(port),
        ..Default::default()
    };
    let res = Connection::connect(properties, RecoveryConfig::disabled());
    assert!(res.is_err());
    let err = res.unwrap_err();
    assert!(err.is_io_error(), "unexpected error: {}", err);
    if let ErrorKind::IOError(e) = err.kind() {
        assert_eq!(e.kind(), std::io::ErrorKind::ConnectionRefused);
    } else {
        unreachable!();
    }
}
