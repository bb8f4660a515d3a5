//! Process-wide environment injection
//!
//! Kept in its own test binary: the environment is global state and every
//! other test assumes none is active.

#![cfg(feature = "event-loop")]

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use netstreams_core::{
    tcp_client_with, tcp_server_on, tcp_server_with, Channel, Environment, EndpointSpec,
    EndpointKind,
};

fn echo(mut channel: Channel) {
    tokio::spawn(async move {
        while let Some(message) = channel.recv().await {
            let _ = channel.send(message).await;
        }
    });
}

#[tokio::test]
async fn test_environment_injected_at_build() {
    assert!(!Environment::is_active());
    let before = tcp_server_on(0).unwrap();
    assert!(before.environment().is_none());

    let env = Environment::initialize("integration", Handle::current());
    assert!(Environment::is_active());

    // Every constructor shape picks it up
    let by_port = tcp_server_on(0).unwrap();
    let by_callback = tcp_server_with(|spec| spec.listen_port(0)).unwrap();
    let by_spec = EndpointSpec::new(EndpointKind::UdpServer).listen_port(0).build().unwrap();
    for endpoint in [&by_port, &by_callback, &by_spec] {
        let attached = endpoint.environment().expect("environment injected");
        assert!(Arc::ptr_eq(attached, &env));
    }

    // An explicit environment wins over the process-wide one
    let private = Arc::new(Environment::new("private", Handle::current()));
    let explicit = tcp_server_with(|spec| spec.listen_port(0).env(Arc::clone(&private))).unwrap();
    assert_eq!(explicit.environment().map(|e| e.name()), Some("private"));

    // Endpoints spawn their tasks on the attached environment
    let mut server = tcp_server_with(|spec| spec.listen_port(0).handler(echo)).unwrap();
    let addr = server.start().await.unwrap();
    let mut client = tcp_client_with(|spec| spec.connect_port(addr.port())).unwrap();
    let mut channel = client.connect().await.unwrap();
    channel.send("via environment").await.unwrap();
    let echoed = tokio::time::timeout(Duration::from_secs(5), channel.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(echoed, b"via environment");

    let terminated = Environment::terminate().expect("environment was active");
    assert_eq!(terminated.name(), "integration");
    assert!(!Environment::is_active());
    assert!(Environment::current().is_none());

    let after = tcp_server_on(0).unwrap();
    assert!(after.environment().is_none());
}
