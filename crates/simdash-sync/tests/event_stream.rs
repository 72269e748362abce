use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use simdash_core::socketio::{event_frame, CREATED_EVENT, STATUS_EVENT};
use simdash_core::{SimulationId, SimulationStatus, StatusEvent};
use simdash_sync::{EventStream, StreamHandle, StreamNotice, StreamOptions, Subscription};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use url::Url;

const OPEN_FRAME: &str =
    r#"0{"sid":"s1","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

async fn listen() -> (TcpListener, Url) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let url = Url::parse(&format!(
        "ws://{addr}/socket.io/?EIO=4&transport=websocket"
    ))
    .expect("url");
    (listener, url)
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (tcp, _) = listener.accept().await.expect("accept");
    accept_async(tcp).await.expect("websocket handshake")
}

async fn send(ws: &mut WebSocketStream<TcpStream>, frame: impl Into<String>) {
    ws.send(Message::Text(frame.into())).await.expect("server send");
}

async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> String {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return text,
            Some(Ok(_)) => continue,
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}

/// Runs the Engine.IO open and namespace connect from the server side.
async fn handshake(ws: &mut WebSocketStream<TcpStream>) {
    send(ws, OPEN_FRAME).await;
    assert_eq!(next_text(ws).await, "40");
    send(ws, r#"40{"sid":"n1"}"#).await;
}

async fn recv(subscription: &mut Subscription) -> Option<StreamNotice> {
    tokio::time::timeout(Duration::from_secs(5), subscription.recv())
        .await
        .expect("notice within timeout")
}

fn connect(url: Url) -> StreamHandle {
    EventStream::connect(StreamOptions::new(url))
}

#[tokio::test]
async fn decodes_events_and_answers_pings() {
    let (listener, url) = listen().await;
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        handshake(&mut ws).await;
        send(&mut ws, "2").await;
        assert_eq!(next_text(&mut ws).await, "3");
        send(
            &mut ws,
            event_frame(STATUS_EVENT, &json!({"id": 2, "estado": "'2'"})),
        )
        .await;
        send(&mut ws, event_frame("heartbeat", &json!({}))).await;
        send(
            &mut ws,
            event_frame(
                CREATED_EVENT,
                &json!({
                    "id": 9,
                    "sim_name": "plate-9",
                    "n_transmitter": 1,
                    "n_receiver": 1,
                    "emitters_pitch": 0.5,
                    "receivers_pitch": 0.5,
                    "sensor_distance": 10,
                    "sensor_edge_margin": 1.0,
                    "typical_mesh_size": 0.1,
                    "plate_thickness": 4,
                    "plate_length": 13.0,
                    "porosity": 0.1,
                    "attenuation": 1,
                    "p_status": "Not started"
                }),
            ),
        )
        .await;
        assert_eq!(next_text(&mut ws).await, "41");
    });

    let handle = connect(url);
    let mut subscription = handle.subscribe();

    assert_eq!(recv(&mut subscription).await, Some(StreamNotice::Connected));
    assert_eq!(
        recv(&mut subscription).await,
        Some(StreamNotice::Status(StatusEvent::new(
            SimulationId(2),
            SimulationStatus::Finished
        )))
    );
    match recv(&mut subscription).await {
        Some(StreamNotice::Announced(record)) => {
            assert_eq!(record.id, SimulationId(9));
            assert!(record.params.attenuation.enabled());
        }
        other => panic!("expected announced record, got {other:?}"),
    }

    handle.shutdown().await;
    server.await.expect("server task");
    assert_eq!(recv(&mut subscription).await, None);
}

#[tokio::test]
async fn dropping_a_subscription_keeps_the_connection() {
    let (listener, url) = listen().await;
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        handshake(&mut ws).await;
        release_rx.await.expect("release");
        send(
            &mut ws,
            event_frame(STATUS_EVENT, &json!({"id": "4", "status": 1, "progress": 12.4})),
        )
        .await;
        assert_eq!(next_text(&mut ws).await, "41");
    });

    let handle = connect(url);
    let detail_listener = handle.subscribe();
    let mut list_listener = handle.subscribe();
    assert_eq!(recv(&mut list_listener).await, Some(StreamNotice::Connected));

    drop(detail_listener);
    assert_eq!(handle.subscriber_count(), 1);
    release_tx.send(()).expect("server waiting");

    assert_eq!(
        recv(&mut list_listener).await,
        Some(StreamNotice::Status(
            StatusEvent::new(SimulationId(4), SimulationStatus::Running).with_progress(12)
        ))
    );
    assert!(!handle.is_finished());
    handle.shutdown().await;
    server.await.expect("server task");
}

#[tokio::test]
async fn server_close_is_reported_without_reconnect() {
    let (listener, url) = listen().await;
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        handshake(&mut ws).await;
        ws.close(None).await.expect("close");
    });

    let handle = connect(url);
    let mut subscription = handle.subscribe();
    assert_eq!(recv(&mut subscription).await, Some(StreamNotice::Connected));
    assert!(matches!(
        recv(&mut subscription).await,
        Some(StreamNotice::Disconnected { .. })
    ));
    server.await.expect("server task");

    tokio::time::timeout(Duration::from_secs(5), async {
        while !handle.is_finished() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection task exits");
}

#[tokio::test]
async fn unreachable_server_reports_disconnect() {
    let (listener, url) = listen().await;
    drop(listener);
    let handle = connect(url);
    let mut subscription = handle.subscribe();
    assert!(matches!(
        recv(&mut subscription).await,
        Some(StreamNotice::Disconnected { .. })
    ));
}
