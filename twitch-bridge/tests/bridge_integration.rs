//! End-to-end bridge tests against an in-process fake IRC server.
//!
//! Covers the full path: handshake (PASS/NICK/001/JOIN), inbound ingestion
//! into history and the live event feed, keepalive, outbound relay, hot
//! config enablement, and deterministic shutdown.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

use twitch_bridge::{BridgeConfig, BridgeState, ChatBridge};

const WAIT: Duration = Duration::from_secs(5);

/// A minimal IRC server double: accepts connections, completes registration,
/// forwards every line the client sends, and writes injected lines back.
struct FakeServer {
    addr: String,
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<String>,
}

async fn start_server() -> FakeServer {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (from_tx, from_client) = mpsc::unbounded_channel::<String>();
    let (to_client, mut to_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let (reader, mut writer) = stream.into_split();
            let mut reader = BufReader::new(reader);
            let mut line = String::new();

            // Registration: consume lines until NICK, then confirm.
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        let trimmed = line.trim_end().to_string();
                        let is_nick = trimmed.starts_with("NICK");
                        let _ = from_tx.send(trimmed);
                        if is_nick {
                            let _ = writer
                                .write_all(b":tmi.twitch.tv 001 somechannel :Welcome, GLHF!\r\n")
                                .await;
                            break;
                        }
                    }
                }
            }

            // Session: forward client lines, write injected lines.
            loop {
                line.clear();
                tokio::select! {
                    result = reader.read_line(&mut line) => {
                        match result {
                            Ok(0) | Err(_) => break,
                            Ok(_) => {
                                let _ = from_tx.send(line.trim_end().to_string());
                            }
                        }
                    }
                    injected = to_rx.recv() => {
                        match injected {
                            Some(text) => {
                                if writer
                                    .write_all(format!("{text}\r\n").as_bytes())
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                            }
                            None => return,
                        }
                    }
                }
            }
        }
    });

    FakeServer {
        addr,
        from_client,
        to_client,
    }
}

fn config_for(server: &FakeServer) -> BridgeConfig {
    BridgeConfig {
        server_addr: server.addr.clone(),
        channel: Some("somechannel".to_string()),
        auth_token: Some("secret".to_string()),
    }
}

/// Wait until the client has sent a line matching `pred`, returning it.
async fn wait_for_line<F>(server: &mut FakeServer, pred: F) -> String
where
    F: Fn(&str) -> bool,
{
    timeout(WAIT, async {
        loop {
            let line = server.from_client.recv().await.expect("server closed");
            if pred(&line) {
                return line;
            }
        }
    })
    .await
    .expect("timed out waiting for client line")
}

#[tokio::test]
async fn handshake_authenticates_and_joins_channel() {
    let mut server = start_server().await;
    let bridge = ChatBridge::spawn(config_for(&server));

    wait_for_line(&mut server, |l| l == "PASS oauth:secret").await;
    wait_for_line(&mut server, |l| l == "NICK somechannel").await;
    wait_for_line(&mut server, |l| l == "JOIN #somechannel").await;

    bridge.shutdown().await;
}

#[tokio::test]
async fn inbound_chat_reaches_history_and_event_feed() {
    let mut server = start_server().await;
    let bridge = ChatBridge::spawn(config_for(&server));
    wait_for_line(&mut server, |l| l.starts_with("JOIN")).await;

    let mut events = bridge.events();
    server
        .to_client
        .send(":alice!alice@alice.tmi.twitch.tv PRIVMSG #somechannel :hello world".to_string())
        .unwrap();

    let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(event.username, "alice");
    assert_eq!(event.content, "hello world");
    assert_eq!(bridge.recent(10), vec!["alice: hello world"]);

    // Control lines never reach the store or the feed.
    server
        .to_client
        .send(":bob!bob@host JOIN #somechannel".to_string())
        .unwrap();
    server
        .to_client
        .send(":carol!carol@host PRIVMSG #somechannel :second".to_string())
        .unwrap();
    let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(event.username, "carol");
    assert_eq!(
        bridge.recent(10),
        vec!["alice: hello world", "carol: second"]
    );

    bridge.shutdown().await;
}

#[tokio::test]
async fn event_subscribers_fan_out_independently() {
    let mut server = start_server().await;
    let bridge = ChatBridge::spawn(config_for(&server));
    wait_for_line(&mut server, |l| l.starts_with("JOIN")).await;

    let mut first = bridge.events();
    let mut second = bridge.events();
    server
        .to_client
        .send(":alice!a@h PRIVMSG #somechannel :fan out".to_string())
        .unwrap();

    let a = timeout(WAIT, first.recv()).await.unwrap().unwrap();
    let b = timeout(WAIT, second.recv()).await.unwrap().unwrap();
    assert_eq!(a.content, "fan out");
    assert_eq!(b.content, "fan out");

    bridge.shutdown().await;
}

#[tokio::test]
async fn outbound_send_is_relayed_with_channel_header() {
    let mut server = start_server().await;
    let bridge = ChatBridge::spawn(config_for(&server));
    wait_for_line(&mut server, |l| l.starts_with("JOIN")).await;

    bridge.send("hi chat").unwrap();
    let sent = wait_for_line(&mut server, |l| l.starts_with("PRIVMSG")).await;
    assert_eq!(sent, "PRIVMSG #somechannel :hi chat");

    bridge.shutdown().await;
}

#[tokio::test]
async fn server_ping_is_answered_with_pong() {
    let mut server = start_server().await;
    let bridge = ChatBridge::spawn(config_for(&server));
    wait_for_line(&mut server, |l| l.starts_with("JOIN")).await;

    server
        .to_client
        .send("PING :tmi.twitch.tv".to_string())
        .unwrap();
    let pong = wait_for_line(&mut server, |l| l.starts_with("PONG")).await;
    assert_eq!(pong, "PONG :tmi.twitch.tv");

    bridge.shutdown().await;
}

#[tokio::test]
async fn credentials_supplied_after_start_take_effect() {
    let mut server = start_server().await;

    // No credentials at startup: the bridge parks in Disabled and accepts
    // sends without ever touching the network.
    let bridge = ChatBridge::spawn(BridgeConfig {
        server_addr: server.addr.clone(),
        ..Default::default()
    });
    let mut states = bridge.state_changes();
    timeout(WAIT, async {
        while *states.borrow() != BridgeState::Disabled {
            states.changed().await.unwrap();
        }
    })
    .await
    .unwrap();
    bridge.send("dropped silently").unwrap();

    bridge.update_config(config_for(&server));
    wait_for_line(&mut server, |l| l.starts_with("JOIN")).await;

    bridge.shutdown().await;
}

#[tokio::test]
async fn removing_credentials_disables_a_live_bridge() {
    let mut server = start_server().await;
    let bridge = ChatBridge::spawn(config_for(&server));
    wait_for_line(&mut server, |l| l.starts_with("JOIN")).await;

    let mut states = bridge.state_changes();
    bridge.update_config(BridgeConfig {
        server_addr: server.addr.clone(),
        ..Default::default()
    });
    timeout(WAIT, async {
        while *states.borrow() != BridgeState::Disabled {
            states.changed().await.unwrap();
        }
    })
    .await
    .unwrap();

    // Still callable while disabled.
    bridge.send("accepted but dropped").unwrap();

    bridge.shutdown().await;
}

#[tokio::test]
async fn shutdown_is_deterministic_and_terminal() {
    let mut server = start_server().await;
    let bridge = ChatBridge::spawn(config_for(&server));
    wait_for_line(&mut server, |l| l.starts_with("JOIN")).await;

    let states = bridge.state_changes();
    bridge.shutdown().await;
    assert_eq!(*states.borrow(), BridgeState::Stopped);
}

#[tokio::test]
async fn clear_history_is_immediately_observable() {
    let mut server = start_server().await;
    let bridge = ChatBridge::spawn(config_for(&server));
    wait_for_line(&mut server, |l| l.starts_with("JOIN")).await;

    let mut events = bridge.events();
    server
        .to_client
        .send(":alice!a@h PRIVMSG #somechannel :to be cleared".to_string())
        .unwrap();
    timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(bridge.recent(5).len(), 1);

    bridge.clear_history();
    assert!(bridge.recent(5).is_empty());

    bridge.shutdown().await;
}
