//! Connection lifecycle: registration, nick retries, loops, and wire
//! behavior, driven over an in-memory stream against a scripted server.

mod common;

use std::time::Duration;

use common::{connected_client, wait_until, RecordingHandler, TestServer};
use slirc_client::{ClientError, ConnectionSettings, Event, IrcClient};

#[tokio::test]
async fn registration_completes_on_004() {
    let (client, server) = connected_client().await;
    assert!(client.is_connected());
    assert_eq!(client.nick(), "slirc");
    assert_eq!(client.server().as_deref(), Some("test.example"));
    server.close();
}

#[tokio::test]
async fn nick_collision_with_auto_retry() {
    let (mut server, stream) = TestServer::pair();
    let client = IrcClient::new();
    client.set_name("Foo");
    client.set_auto_nick_change(true);

    let connect = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .connect_over(ConnectionSettings::new("test.example"), stream)
                .await
        })
    };

    assert_eq!(server.recv_line().await, "NICK Foo");
    assert_eq!(server.recv_line().await, "USER slirc 8 * :slirc-client user");

    server
        .send_line(":srv 433 * Foo :Nickname is already in use.")
        .await;
    assert_eq!(server.recv_line().await, "NICK Foo2");

    server
        .send_line(":srv 433 * Foo2 :Nickname is already in use.")
        .await;
    assert_eq!(server.recv_line().await, "NICK Foo3");

    server.send_line(":srv 004 Foo3 srv test-1 iow ov").await;
    connect.await.unwrap().unwrap();

    assert_eq!(client.nick(), "Foo3");
    assert!(client.is_connected());
    server.close();
}

#[tokio::test]
async fn nick_collision_without_auto_retry_fails() {
    let (mut server, stream) = TestServer::pair();
    let client = IrcClient::new();
    client.set_name("Foo");

    let connect = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .connect_over(ConnectionSettings::new("test.example"), stream)
                .await
        })
    };

    server.recv_line().await; // NICK
    server.recv_line().await; // USER
    server
        .send_line(":srv 433 * Foo :Nickname is already in use.")
        .await;

    let err = connect.await.unwrap().unwrap_err();
    assert!(matches!(err, ClientError::NickAlreadyInUse(_)));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn fatal_registration_numeric_fails() {
    let (mut server, stream) = TestServer::pair();
    let client = IrcClient::new();

    let connect = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .connect_over(ConnectionSettings::new("test.example"), stream)
                .await
        })
    };

    server.recv_line().await;
    server.recv_line().await;
    server
        .send_line(":srv 465 * :You are banned from this server")
        .await;

    let err = connect.await.unwrap().unwrap_err();
    assert!(matches!(err, ClientError::Irc(_)));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn numeric_439_is_ignored_during_registration() {
    let (mut server, stream) = TestServer::pair();
    let client = IrcClient::new();

    let connect = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .connect_over(ConnectionSettings::new("test.example"), stream)
                .await
        })
    };

    server.recv_line().await;
    server.recv_line().await;
    server
        .send_line(":srv 439 * :Please wait while we process your connection.")
        .await;
    server.send_line(":srv 004 slirc srv test-1 iow ov").await;

    connect.await.unwrap().unwrap();
    assert!(client.is_connected());
    server.close();
}

#[tokio::test]
async fn password_is_sent_before_nick() {
    let (mut server, stream) = TestServer::pair();
    let client = IrcClient::new();
    let mut settings = ConnectionSettings::new("test.example");
    settings.password = Some("hunter2".into());

    let connect = {
        let client = client.clone();
        tokio::spawn(async move { client.connect_over(settings, stream).await })
    };

    assert_eq!(server.recv_line().await, "PASS hunter2");
    assert_eq!(server.recv_line().await, "NICK slirc");
    server.recv_line().await; // USER
    server.send_line(":srv 004 slirc srv test-1 iow ov").await;
    connect.await.unwrap().unwrap();
    server.close();
}

#[tokio::test]
async fn connect_while_connected_is_rejected() {
    let (client, server) = connected_client().await;

    let (_second_server, stream) = TestServer::pair();
    let err = client
        .connect_over(ConnectionSettings::new("elsewhere.example"), stream)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::AlreadyConnected));
    server.close();
}

#[tokio::test]
async fn connect_event_reaches_handlers() {
    let (mut server, stream) = TestServer::pair();
    let client = IrcClient::new();
    let recorder = RecordingHandler::new();
    client.add_handler(recorder.clone());

    let connect = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .connect_over(ConnectionSettings::new("test.example"), stream)
                .await
        })
    };
    server.accept_registration().await;
    connect.await.unwrap().unwrap();

    let connects = recorder.filtered(|e| matches!(e, Event::Connect));
    assert_eq!(connects.len(), 1);
    server.close();
}

#[tokio::test]
async fn server_close_emits_disconnect() {
    let (client, server) = connected_client().await;
    let recorder = RecordingHandler::new();
    client.add_handler(recorder.clone());

    server.close();

    assert!(wait_until(|| !client.is_connected()).await);
    assert!(
        wait_until(|| recorder
            .filtered(|e| matches!(e, Event::Disconnect))
            .len()
            == 1)
        .await
    );
}

#[tokio::test]
async fn dispose_suppresses_disconnect_event() {
    let (client, server) = connected_client().await;
    let recorder = RecordingHandler::new();
    client.add_handler(recorder.clone());

    client.dispose().await;
    assert!(!client.is_connected());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(recorder
        .filtered(|e| matches!(e, Event::Disconnect))
        .is_empty());
    server.close();
}

#[tokio::test]
async fn outbound_lines_are_truncated_to_512_bytes() {
    let (client, mut server) = connected_client().await;

    client.send_message("#c", &"x".repeat(600));

    let bytes = server.recv_line_bytes().await;
    assert_eq!(bytes.len(), 512);
    assert!(bytes.ends_with(b"\r\n"));
    assert!(bytes.starts_with(b"PRIVMSG #c :"));
    server.close();
}

#[tokio::test]
async fn queued_sends_preserve_order_with_priority_jump() {
    let (mut server, stream) = TestServer::pair();
    let client = IrcClient::new();
    // A long delay keeps the sender asleep while the queue is staged.
    client.set_message_delay(200);

    let connect = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .connect_over(ConnectionSettings::new("test.example"), stream)
                .await
        })
    };
    server.accept_registration().await;
    connect.await.unwrap().unwrap();

    client.send_message("#c", "first");
    client.send_message("#c", "second");
    client.send_priority_message("#c", "urgent");

    assert_eq!(server.recv_line().await, "PRIVMSG #c :urgent");
    assert_eq!(server.recv_line().await, "PRIVMSG #c :first");
    assert_eq!(server.recv_line().await, "PRIVMSG #c :second");
    server.close();
}

#[tokio::test]
async fn ctcp_version_gets_default_reply() {
    let (client, mut server) = connected_client().await;
    client.set_version("Test-1");

    server
        .send_line(":x!u@h PRIVMSG slirc :\u{1}VERSION\u{1}")
        .await;

    assert_eq!(
        server.recv_line().await,
        "NOTICE x :\u{1}VERSION Test-1\u{1}"
    );
    server.close();
}

#[tokio::test]
async fn ctcp_ping_echoes_token() {
    let (client, mut server) = connected_client().await;

    server
        .send_line(":x!u@h PRIVMSG slirc :\u{1}PING 1234567890\u{1}")
        .await;

    assert_eq!(
        server.recv_line().await,
        "NOTICE x :\u{1}PING 1234567890\u{1}"
    );
    drop(client);
    server.close();
}

#[tokio::test]
async fn server_ping_gets_pong() {
    let (client, mut server) = connected_client().await;

    server.send_line("PING :irc.example.net").await;

    assert_eq!(server.recv_line().await, "PONG :irc.example.net");
    drop(client);
    server.close();
}

#[tokio::test]
async fn ctcp_finger_gets_configured_reply() {
    let (client, mut server) = connected_client().await;
    client.set_finger("busy hacking");

    server
        .send_line(":x!u@h PRIVMSG slirc :\u{1}FINGER\u{1}")
        .await;

    assert_eq!(
        server.recv_line().await,
        "NOTICE x :\u{1}FINGER busy hacking\u{1}"
    );
    server.close();
}

#[tokio::test]
async fn removed_default_handler_answers_nothing() {
    let (client, mut server) = connected_client().await;
    let recorder = RecordingHandler::new();
    client.add_handler(recorder.clone());
    assert!(client.remove_default_handler());

    server
        .send_line(":x!u@h PRIVMSG slirc :\u{1}VERSION\u{1}")
        .await;

    // The event still reaches remaining handlers, but no reply is sent.
    assert!(wait_until(|| recorder
        .filtered(|e| matches!(e, Event::Version { .. }))
        .len()
        == 1)
    .await);

    client.send_message("#c", "sentinel");
    assert_eq!(server.recv_line().await, "PRIVMSG #c :sentinel");
    server.close();
}

#[tokio::test]
async fn registration_lines_reach_the_dispatcher() {
    let (mut server, stream) = TestServer::pair();
    let client = IrcClient::new();
    let recorder = RecordingHandler::new();
    client.add_handler(recorder.clone());

    let connect = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .connect_over(ConnectionSettings::new("test.example"), stream)
                .await
        })
    };
    server.recv_line().await;
    server.recv_line().await;
    server.send_line(":srv 001 slirc :Welcome").await;
    server.send_line(":srv 004 slirc srv test-1 iow ov").await;
    connect.await.unwrap().unwrap();

    let responses = recorder.filtered(|e| matches!(e, Event::ServerResponse { .. }));
    assert_eq!(responses.len(), 2);
    assert!(matches!(&responses[0], Event::ServerResponse { code: 1, .. }));
    server.close();
}

#[tokio::test]
async fn queue_compaction_drops_duplicates() {
    let client = IrcClient::new();
    // Not connected: the sender loop is not running, so the queue holds.
    for _ in 0..3 {
        client.send_message("#c", "same thing");
    }
    client.send_message("#c", "different");
    assert_eq!(client.outgoing_queue_len(), 4);

    client.compact_outgoing_queue(true);
    assert!(wait_until(|| client.outgoing_queue_len() == 2).await);

    client.compact_outgoing_queue(false);
}

#[tokio::test]
async fn empty_raw_queue_line_is_invalid() {
    let (client, server) = connected_client().await;
    assert!(matches!(
        client.send_raw_line_via_queue(""),
        Err(ClientError::InvalidArgument(_))
    ));
    server.close();
}
