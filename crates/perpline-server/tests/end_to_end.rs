//! End-to-end tests: a fake realtime server feeds the change-feed bridge,
//! clients talk to the gateway over real WebSockets.

use futures_util::{SinkExt, StreamExt};
use perpline_bridge::Table;
use perpline_server::{AppConfig, Application, AppResult};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{accept_async, connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const ACCOUNT_A: &str = "0x00000000000000000000000000000000000000000000000000000000000000aa";
const ACCOUNT_B: &str = "0x00000000000000000000000000000000000000000000000000000000000000bb";

/// Answers every `phx_join` with an ok reply and forwards pushed frames
/// to every connected bridge.
struct FakeRealtime {
    addr: SocketAddr,
    push: broadcast::Sender<String>,
    joins: Arc<AtomicUsize>,
}

impl FakeRealtime {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (push, _) = broadcast::channel::<String>(64);
        let joins = Arc::new(AtomicUsize::new(0));

        let push_tx = push.clone();
        let join_count = joins.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_bridge(stream, push_tx.subscribe(), join_count.clone()));
            }
        });

        Self { addr, push, joins }
    }

    fn url(&self) -> String {
        format!("ws://{}/realtime/v1/websocket", self.addr)
    }

    fn push(&self, table: &str, kind: &str, record: Value) {
        let frame = json!({
            "topic": format!("realtime:public:{table}"),
            "event": "postgres_changes",
            "payload": {
                "data": {
                    "table": table,
                    "type": kind,
                    "record": record,
                    "commit_timestamp": "2024-05-01T00:00:00Z"
                }
            },
            "ref": null
        });
        let _ = self.push.send(frame.to_string());
    }
}

async fn serve_bridge(
    stream: TcpStream,
    mut outbound: broadcast::Receiver<String>,
    joins: Arc<AtomicUsize>,
) {
    let Ok(ws) = accept_async(stream).await else {
        return;
    };
    let (mut write, mut read) = ws.split();
    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let frame: Value = serde_json::from_str(&text).unwrap();
                    if frame["event"] == "phx_join" {
                        joins.fetch_add(1, Ordering::SeqCst);
                        let reply = json!({
                            "topic": frame["topic"],
                            "event": "phx_reply",
                            "payload": { "status": "ok", "response": { "postgres_changes": [] } },
                            "ref": frame["ref"]
                        });
                        if write.send(Message::Text(reply.to_string())).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(_)) => {}
                _ => break,
            },
            frame = outbound.recv() => match frame {
                Ok(text) => {
                    if write.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
        }
    }
}

struct Running {
    app: Arc<Application>,
    addr: SocketAddr,
    handle: JoinHandle<AppResult<()>>,
}

async fn start_app(feed_url: Option<String>, max_connections: usize) -> Running {
    let mut config = AppConfig::default();
    config.price.base_url = "http://127.0.0.1:1".to_string();
    config.price.timeout_ms = 500;
    config.upstream.api_base_url = "http://127.0.0.1:1".to_string();
    config.upstream.timeout_ms = 500;
    config.gateway.max_connections = max_connections;
    if let Some(url) = feed_url {
        config.change_feed.enabled = true;
        config.change_feed.url = url;
        config.change_feed.api_key = "test-key".to_string();
    }

    let app = Arc::new(Application::new(config).unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let runner = app.clone();
    let handle = tokio::spawn(async move { runner.run_with_listener(listener).await });
    Running { app, addr, handle }
}

async fn wait_streaming(app: &Application) {
    let bridge = app.context().bridge.clone().unwrap();
    timeout(Duration::from_secs(5), async {
        while ![Table::Positions, Table::PriceHistory, Table::AprHistory]
            .iter()
            .all(|t| bridge.states().is_streaming(*t))
        {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("change feed never reached streaming");
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws
}

async fn next_json(ws: &mut Client) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for message")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send(ws: &mut Client, message: Value) {
    ws.send(Message::Text(message.to_string())).await.unwrap();
}

async fn assert_silent(ws: &mut Client) {
    let result = timeout(Duration::from_millis(300), next_json(ws)).await;
    assert!(result.is_err(), "unexpected message: {:?}", result.ok());
}

fn position(id: &str, owner: &str) -> Value {
    json!({
        "id": id,
        "user_address": owner,
        "pair": "BTC_USD",
        "is_long": true,
        "size": "500",
        "collateral": "10",
        "entry_price": "65000",
        "status": "active"
    })
}

#[tokio::test]
async fn test_price_insert_reaches_subscribed_clients_only() {
    let feed = FakeRealtime::start().await;
    let running = start_app(Some(feed.url()), 100).await;
    wait_streaming(&running.app).await;
    assert_eq!(feed.joins.load(Ordering::SeqCst), 3);

    let mut subscriber = connect(running.addr).await;
    let welcome = next_json(&mut subscriber).await;
    assert_eq!(welcome["type"], "welcome");
    assert!(welcome["clientId"].is_string());

    send(&mut subscriber, json!({ "type": "subscribe", "channel": "prices" })).await;
    assert_eq!(next_json(&mut subscriber).await["type"], "subscribed");
    assert_eq!(next_json(&mut subscriber).await["type"], "prices_snapshot");

    let mut bystander = connect(running.addr).await;
    assert_eq!(next_json(&mut bystander).await["type"], "welcome");

    feed.push(
        "price_history",
        "INSERT",
        json!({ "symbol": "APT", "price": "8.50" }),
    );

    let update = next_json(&mut subscriber).await;
    assert_eq!(update["type"], "price_update");
    assert_eq!(update["data"]["symbol"], "APT");
    assert_eq!(update["data"]["price"], 8.5);
    assert_eq!(update["data"]["change24h"], 0.0);
    assert_silent(&mut bystander).await;

    running.app.shutdown_token().cancel();
    let result = timeout(Duration::from_secs(10), running.handle).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_portfolio_updates_are_account_scoped() {
    let feed = FakeRealtime::start().await;
    let running = start_app(Some(feed.url()), 100).await;
    wait_streaming(&running.app).await;

    let mut client = connect(running.addr).await;
    next_json(&mut client).await;

    send(&mut client, json!({ "type": "subscribe", "channel": "portfolio" })).await;
    assert_eq!(next_json(&mut client).await["type"], "subscribed");

    send(&mut client, json!({ "type": "auth", "userId": ACCOUNT_A })).await;
    let auth = next_json(&mut client).await;
    assert_eq!(auth["type"], "auth_success");
    assert_eq!(auth["userId"], ACCOUNT_A);

    send(&mut client, json!({ "type": "subscribe", "channel": "portfolio" })).await;
    assert_eq!(next_json(&mut client).await["type"], "subscribed");
    // trading API is unreachable: the snapshot falls back to an empty list
    let snapshot = next_json(&mut client).await;
    assert_eq!(snapshot["type"], "portfolio_snapshot");
    assert_eq!(snapshot["data"], json!([]));

    feed.push("positions", "UPDATE", position("pos-b", ACCOUNT_B));
    feed.push("positions", "UPDATE", position("pos-a", ACCOUNT_A));

    let update = next_json(&mut client).await;
    assert_eq!(update["type"], "position_update");
    assert_eq!(update["data"]["positionId"], "pos-a");
    assert_eq!(update["data"]["leverage"], 50.0);
    assert_silent(&mut client).await;

    running.app.shutdown_token().cancel();
    let _ = timeout(Duration::from_secs(10), running.handle).await;
}

#[tokio::test]
async fn test_protocol_errors_and_ping() {
    let running = start_app(None, 100).await;
    let mut client = connect(running.addr).await;
    next_json(&mut client).await;

    ws_send_raw(&mut client, "not json").await;
    assert_eq!(next_json(&mut client).await["type"], "error");

    send(&mut client, json!({ "type": "teleport" })).await;
    let error = next_json(&mut client).await;
    assert_eq!(error["type"], "error");
    assert!(error["error"].as_str().unwrap().contains("teleport"));

    send(&mut client, json!({ "type": "ping" })).await;
    assert_eq!(next_json(&mut client).await["type"], "pong");

    running.app.shutdown_token().cancel();
    let _ = timeout(Duration::from_secs(10), running.handle).await;
}

async fn ws_send_raw(ws: &mut Client, text: &str) {
    ws.send(Message::Text(text.to_string())).await.unwrap();
}

#[tokio::test]
async fn test_connection_limit_returns_503() {
    let running = start_app(None, 1).await;
    let mut first = connect(running.addr).await;
    assert_eq!(next_json(&mut first).await["type"], "welcome");

    match connect_async(format!("ws://{}/ws", running.addr)).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 503),
        other => panic!("expected 503, got {:?}", other.map(|(_, r)| r.status())),
    }

    running.app.shutdown_token().cancel();
    let _ = timeout(Duration::from_secs(10), running.handle).await;
}

#[tokio::test]
async fn test_shutdown_closes_clients() {
    let running = start_app(None, 100).await;
    let mut client = connect(running.addr).await;
    next_json(&mut client).await;
    assert_eq!(running.app.context().gateway.connection_count(), 1);

    running.app.shutdown_token().cancel();
    let result = timeout(Duration::from_secs(10), running.handle).await.unwrap().unwrap();
    assert!(result.is_ok());

    let closed = timeout(Duration::from_secs(5), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());
    assert_eq!(running.app.context().gateway.connection_count(), 0);
}
