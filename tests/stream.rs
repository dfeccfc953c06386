use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tesla_stream::ws::{ConnectRequest, ConnectionState, StreamClient, StreamError, StreamOptions};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
    time::timeout,
};
use tokio_tungstenite::{
    accept_async,
    tungstenite::{
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
    WebSocketStream,
};

type ServerSide = WebSocketStream<TcpStream>;

const WAIT: Duration = Duration::from_secs(5);

async fn listen() -> (TcpListener, url::Url) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}/streaming/", listener.local_addr().unwrap())
        .parse()
        .unwrap();
    (listener, endpoint)
}

fn options(endpoint: url::Url) -> StreamOptions {
    StreamOptions {
        endpoint,
        handshake_timeout: Duration::from_secs(2),
        steady_health_window: Duration::from_secs(15),
        reconnect_delay: Duration::from_millis(50),
    }
}

async fn accept(listener: &TcpListener) -> ServerSide {
    let (stream, _) = timeout(WAIT, listener.accept())
        .await
        .expect("client never connected")
        .unwrap();
    accept_async(stream).await.unwrap()
}

async fn next_frame(ws: &mut ServerSide) -> Message {
    loop {
        let frame = timeout(WAIT, ws.next())
            .await
            .expect("no frame from client")
            .expect("client stream ended")
            .unwrap();
        if !matches!(frame, Message::Ping(_) | Message::Pong(_)) {
            return frame;
        }
    }
}

async fn next_json(ws: &mut ServerSide) -> Value {
    match next_frame(ws).await {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("expect text frame, got {:?}", other),
    }
}

async fn send_json(ws: &mut ServerSide, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

/// Read until client close frame arrives, then let our reply flush.
async fn finish_close(ws: &mut ServerSide) {
    assert!(matches!(next_frame(ws).await, Message::Close(_)));
    let _ = timeout(WAIT, async { while let Some(Ok(_)) = ws.next().await {} }).await;
}

async fn wait_state(client: &StreamClient, expected: ConnectionState) {
    timeout(WAIT, client.wait_state(|s| s == expected))
        .await
        .unwrap_or_else(|_| panic!("state never became {:?}", expected))
        .unwrap();
}

fn hello() -> Value {
    json!({"msg_type": "control:hello", "connection_timeout": 30000})
}

#[tokio::test]
async fn test_subscribe_stream_then_close() {
    let (listener, endpoint) = listen().await;
    let (data_tx, mut data_rx) = mpsc::unbounded_channel();

    let client = StreamClient::builder()
        .options(options(endpoint))
        .on_stream_data(move |values| {
            let _ = data_tx.send(values.to_vec());
        })
        .build();

    client
        .connect(ConnectRequest::new("1234", "secret").columns(["shift_state", "speed"]))
        .unwrap();

    let mut ws = accept(&listener).await;
    assert_eq!(
        next_json(&mut ws).await,
        json!({
            "msg_type": "data:subscribe_oauth",
            "token": "secret",
            "value": "shift_state,speed",
            "tag": "1234",
        })
    );

    send_json(&mut ws, hello()).await;
    wait_state(&client, ConnectionState::Connected).await;
    assert!(client.is_connected());

    send_json(
        &mut ws,
        json!({"msg_type": "data:update", "tag": "1234", "value": "1700000000,P,0"}),
    )
    .await;
    let values = timeout(WAIT, data_rx.recv()).await.unwrap().unwrap();
    assert_eq!(values, vec!["1700000000", "P", "0"]);

    client.close().unwrap();
    assert_eq!(
        next_json(&mut ws).await,
        json!({"msg_type": "data:unsubscribe", "tag": "1234"})
    );
    finish_close(&mut ws).await;

    wait_state(&client, ConnectionState::Closed).await;
    assert!(client.is_closed());

    // closed by caller, so no reconnect
    assert!(timeout(Duration::from_millis(300), listener.accept())
        .await
        .is_err());
}

#[tokio::test]
async fn test_reconnect_after_server_drop() {
    let (listener, endpoint) = listen().await;
    let client = StreamClient::builder().options(options(endpoint)).build();

    client.connect(ConnectRequest::new("1234", "secret")).unwrap();

    let mut ws = accept(&listener).await;
    let first = next_json(&mut ws).await;
    send_json(&mut ws, hello()).await;
    wait_state(&client, ConnectionState::Connected).await;

    drop(ws);

    let mut ws = accept(&listener).await;
    let second = next_json(&mut ws).await;
    assert_eq!(first, second);
    assert_eq!(second["tag"], "1234");
    assert_eq!(second["token"], "secret");
    assert_eq!(client.state(), ConnectionState::Connecting);

    send_json(&mut ws, hello()).await;
    wait_state(&client, ConnectionState::Connected).await;
}

#[tokio::test]
async fn test_server_close_gets_close_reply_then_reconnect() {
    let (listener, endpoint) = listen().await;
    let client = StreamClient::builder().options(options(endpoint)).build();

    client.connect(ConnectRequest::new("1234", "secret")).unwrap();

    let mut ws = accept(&listener).await;
    next_json(&mut ws).await;

    ws.send(Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "bye".into(),
    })))
    .await
    .unwrap();

    let reply = next_frame(&mut ws).await;
    assert!(matches!(reply, Message::Close(_)), "got {:?}", reply);

    // server side close is unsolicited, so client comes back
    let mut ws = accept(&listener).await;
    assert_eq!(next_json(&mut ws).await["tag"], "1234");
}

#[tokio::test]
async fn test_resubscribe_after_vehicle_disconnected() {
    let (listener, endpoint) = listen().await;
    let client = StreamClient::builder().options(options(endpoint)).build();

    client
        .connect(ConnectRequest::new("1234", "secret").columns(["shift_state"]))
        .unwrap();

    let mut ws = accept(&listener).await;
    let subscribe = next_json(&mut ws).await;
    send_json(&mut ws, hello()).await;
    // vehicle is driving, so the short resubscribe profile applies
    send_json(
        &mut ws,
        json!({"msg_type": "data:update", "tag": "1234", "value": "1700000000,D"}),
    )
    .await;
    send_json(
        &mut ws,
        json!({
            "msg_type": "data:error",
            "tag": "1234",
            "error_type": "vehicle_disconnected",
            "value": "",
        }),
    )
    .await;

    assert_eq!(next_json(&mut ws).await, subscribe);
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_client_error_reports_and_reconnects() {
    let (listener, endpoint) = listen().await;
    let (error_tx, mut error_rx) = mpsc::unbounded_channel();

    let client = StreamClient::builder()
        .options(options(endpoint))
        .on_error(move |err| {
            if let StreamError::Client { message } = err {
                let _ = error_tx.send(message.clone());
            }
        })
        .build();

    client.connect(ConnectRequest::new("1234", "bad")).unwrap();

    let mut ws = accept(&listener).await;
    next_json(&mut ws).await;
    send_json(
        &mut ws,
        json!({
            "msg_type": "data:error",
            "tag": "1234",
            "error_type": "client_error",
            "value": "Can't validate token. ",
        }),
    )
    .await;

    let message = timeout(WAIT, error_rx.recv()).await.unwrap().unwrap();
    assert_eq!(message, "Can't validate token. ");

    // no unsubscribe before close frame
    finish_close(&mut ws).await;

    let mut ws = accept(&listener).await;
    assert_eq!(next_json(&mut ws).await["token"], "bad");
}

#[tokio::test]
async fn test_disconnect_when_never_connected() {
    let (listener, endpoint) = listen().await;
    let client = StreamClient::builder().options(options(endpoint)).build();

    assert_eq!(client.state(), ConnectionState::Idle);
    assert!(client.is_closed());

    client.disconnect(false, true).unwrap();
    wait_state(&client, ConnectionState::Closed).await;
    assert!(!client.is_closing());

    // nothing to reconnect to
    assert!(timeout(Duration::from_millis(300), listener.accept())
        .await
        .is_err());
}
