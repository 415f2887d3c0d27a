//! Integration tests for the full chat flow.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rfchat::bluetooth::{
    ConnectionManager, ConnectionState, MemoryEther, PeerAddress, StaticAuthorizer, TcpTransport,
};
use rfchat::chat::{ChatSession, EndReason, Message, Role, SessionEvent};
use rfchat::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

const BOUND: Duration = Duration::from_secs(2);

async fn memory_pair() -> (Arc<ConnectionManager>, Arc<ConnectionManager>) {
    let ether = MemoryEther::new();
    let server_radio = Arc::new(ether.radio("00:00:00:00:00:01", "server"));
    let client_radio = Arc::new(ether.radio("00:00:00:00:00:02", "client"));
    let target = server_radio.address();

    let listener = Arc::new(ConnectionManager::new(
        server_radio,
        Arc::new(StaticAuthorizer::granted()),
    ));
    let dialer = Arc::new(ConnectionManager::new(
        client_radio,
        Arc::new(StaticAuthorizer::granted()),
    ));
    connect(listener, dialer, target).await
}

async fn connect(
    listener: Arc<ConnectionManager>,
    dialer: Arc<ConnectionManager>,
    target: PeerAddress,
) -> (Arc<ConnectionManager>, Arc<ConnectionManager>) {
    listener.start_listening().await.unwrap();
    let accept = {
        let listener = listener.clone();
        tokio::spawn(async move { listener.accept_one().await })
    };
    dialer.dial(&target).await.unwrap();
    timeout(BOUND, accept).await.unwrap().unwrap().unwrap();

    assert_eq!(listener.state(), ConnectionState::Established);
    assert_eq!(dialer.state(), ConnectionState::Established);
    (listener, dialer)
}

fn sessions(
    listener: Arc<ConnectionManager>,
    dialer: Arc<ConnectionManager>,
) -> (ChatSession, ChatSession) {
    (
        ChatSession::start(listener, Role::Server).unwrap(),
        ChatSession::start(dialer, Role::Client).unwrap(),
    )
}

/// Wait until `expected` is appended, failing after a bound.
async fn expect_message(events: &mut UnboundedReceiver<SessionEvent>, expected: Message) {
    let found = timeout(BOUND, async {
        while let Some(event) = events.recv().await {
            if let SessionEvent::MessageAppended(message) = event {
                if message == expected {
                    return true;
                }
            }
        }
        false
    })
    .await
    .unwrap();
    assert!(found, "never saw {}", expected);
}

async fn expect_end(events: &mut UnboundedReceiver<SessionEvent>) -> EndReason {
    timeout(BOUND, async {
        while let Some(event) = events.recv().await {
            if let SessionEvent::Ended(reason) = event {
                return Some(reason);
            }
        }
        None
    })
    .await
    .unwrap()
    .unwrap()
}

#[tokio::test]
async fn test_ping_puts_literal_on_the_wire() {
    let (listener, dialer) = memory_pair().await;
    let client = ChatSession::start(dialer, Role::Client).unwrap();

    client.send_ping().await.unwrap();

    // Read the raw bytes straight from the manager, no session on this side.
    let bytes = timeout(BOUND, listener.receive()).await.unwrap().unwrap();
    assert_eq!(bytes, b"Ping\n");
}

#[tokio::test]
async fn test_ping_pong_round_trip() {
    let (listener, dialer) = memory_pair().await;
    let (mut server, mut client) = sessions(listener, dialer);
    let mut server_events = server.take_event_receiver().unwrap();
    let mut client_events = client.take_event_receiver().unwrap();

    client.send_ping().await.unwrap();
    expect_message(&mut server_events, Message::new(Role::Client, "Ping")).await;

    server.send_pong().await.unwrap();
    expect_message(&mut client_events, Message::new(Role::Server, "Pong")).await;

    server.send_text("hello there").await.unwrap();
    expect_message(&mut client_events, Message::new(Role::Server, "hello there")).await;

    assert_eq!(
        server.transcript(),
        vec![
            Message::new(Role::Client, "Ping"),
            Message::new(Role::Server, "Pong"),
            Message::new(Role::Server, "hello there"),
        ]
    );
    assert_eq!(server.transcript(), client.transcript());
}

#[tokio::test]
async fn test_end_propagates_bye() {
    let (listener, dialer) = memory_pair().await;
    let (mut server, mut client) = sessions(listener.clone(), dialer.clone());
    let mut server_events = server.take_event_receiver().unwrap();
    let mut client_events = client.take_event_receiver().unwrap();

    client.end().await.unwrap();
    assert_eq!(expect_end(&mut client_events).await, EndReason::LocalBye);
    assert_eq!(expect_end(&mut server_events).await, EndReason::RemoteBye);

    timeout(BOUND, server.wait_ended()).await.unwrap();
    assert!(!server.is_connected());
    assert_eq!(listener.state(), ConnectionState::Closed);
    assert_eq!(dialer.state(), ConnectionState::Closed);
    assert_eq!(server.transcript().last(), Some(&Message::new(Role::Client, "Bye")));

    assert!(matches!(server.send_pong().await, Err(Error::NotConnected)));
    assert!(matches!(listener.send(b"late\n").await, Err(Error::NotConnected)));
    assert!(matches!(client.send_ping().await, Err(Error::NotConnected)));
}

#[tokio::test]
async fn test_peer_drop_without_bye() {
    let (listener, dialer) = memory_pair().await;
    let mut client = ChatSession::start(dialer.clone(), Role::Client).unwrap();
    let mut events = client.take_event_receiver().unwrap();

    listener.close();

    assert_eq!(expect_end(&mut events).await, EndReason::PeerDisconnected);
    assert!(!client.is_connected());
    assert_eq!(dialer.state(), ConnectionState::Closed);
    assert!(client.transcript().is_empty());
}

#[tokio::test]
async fn test_concurrent_sends_keep_frames_intact() {
    const TASKS: usize = 4;
    const PER_TASK: usize = 25;

    let (listener, dialer) = memory_pair().await;
    let (mut server, client) = sessions(listener, dialer);
    let mut server_events = server.take_event_receiver().unwrap();
    let client = Arc::new(client);

    let mut handles = Vec::new();
    for task in 0..TASKS {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            for n in 0..PER_TASK {
                client.send_text(&format!("t{}-{}", task, n)).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let last = Message::new(Role::Client, format!("t0-{}", PER_TASK - 1));
    timeout(BOUND, async {
        while server.transcript().len() < TASKS * PER_TASK {
            server_events.recv().await;
        }
    })
    .await
    .unwrap();

    let received = server.transcript();
    assert!(received.contains(&last));
    // Wire order and local record order agree.
    assert_eq!(received, client.transcript());

    // Every frame arrives whole and each sender's order survives.
    let mut next: HashMap<usize, usize> = HashMap::new();
    for message in &received {
        assert_eq!(message.origin, Role::Client);
        let (task, n) = message.text[1..].split_once('-').unwrap();
        let task: usize = task.parse().unwrap();
        let n: usize = n.parse().unwrap();
        let expected = next.entry(task).or_insert(0);
        assert_eq!(n, *expected);
        *expected += 1;
    }
    assert!(next.values().all(|count| *count == PER_TASK));
}

#[tokio::test]
async fn test_transcript_only_grows() {
    let (listener, dialer) = memory_pair().await;
    let (mut server, client) = sessions(listener, dialer);
    let mut server_events = server.take_event_receiver().unwrap();

    let mut previous = server.transcript();
    for text in ["Ping", "one", "two", "Pong"] {
        client.send_text(text).await.unwrap();
        expect_message(&mut server_events, Message::new(Role::Client, text)).await;
        server.send_pong().await.unwrap();

        let current = server.transcript();
        assert!(current.len() > previous.len());
        assert_eq!(&current[..previous.len()], &previous[..]);
        previous = current;
    }
}

#[tokio::test]
async fn test_accept_cancelled_by_close() {
    let ether = MemoryEther::new();
    let radio = Arc::new(ether.radio("00:00:00:00:00:01", "server"));
    let listener = Arc::new(ConnectionManager::new(
        radio,
        Arc::new(StaticAuthorizer::granted()),
    ));
    listener.start_listening().await.unwrap();

    let accept = {
        let listener = listener.clone();
        tokio::spawn(async move { listener.accept_one().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    listener.close();

    let result = timeout(BOUND, accept).await.unwrap().unwrap();
    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(listener.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_tcp_loopback_chat() {
    let bind = "127.0.0.1:0".parse().unwrap();
    let listener = Arc::new(ConnectionManager::new(
        Arc::new(TcpTransport::new(bind)),
        Arc::new(StaticAuthorizer::granted()),
    ));
    let dialer = Arc::new(ConnectionManager::new(
        Arc::new(TcpTransport::new(bind)),
        Arc::new(StaticAuthorizer::granted()),
    ));

    listener.start_listening().await.unwrap();
    let target = listener.listening_address().unwrap();
    let accept = {
        let listener = listener.clone();
        tokio::spawn(async move { listener.accept_one().await })
    };
    dialer.dial(&target).await.unwrap();
    timeout(BOUND, accept).await.unwrap().unwrap().unwrap();

    let (mut server, mut client) = sessions(listener, dialer);
    let mut server_events = server.take_event_receiver().unwrap();
    let mut client_events = client.take_event_receiver().unwrap();

    client.send_ping().await.unwrap();
    expect_message(&mut server_events, Message::new(Role::Client, "Ping")).await;
    server.send_pong().await.unwrap();
    expect_message(&mut client_events, Message::new(Role::Server, "Pong")).await;

    server.end().await.unwrap();
    assert_eq!(expect_end(&mut client_events).await, EndReason::RemoteBye);
    assert_eq!(
        client.transcript(),
        vec![
            Message::new(Role::Client, "Ping"),
            Message::new(Role::Server, "Pong"),
            Message::new(Role::Server, "Bye"),
        ]
    );
}
