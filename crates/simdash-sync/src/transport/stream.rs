//! Live status feed over Socket.IO.
//!
//! One connection task per view fans decoded events out to any number of
//! subscribers. Subscribers come and go independently; the connection lives
//! until the owning [`StreamHandle`] is shut down or dropped.

use futures_util::{SinkExt, StreamExt};
use simdash_core::socketio::{
    self, EnginePacket, SocketPacket, StreamMessage, DEFAULT_NAMESPACE,
};
use simdash_core::{Simulation, StatusEvent};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use super::TransportError;
use crate::config::ClientConfig;

const DEFAULT_CHANNEL_CAPACITY: usize = 256;
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

#[derive(Debug, Clone, PartialEq)]
pub enum StreamNotice {
    Connected,
    Disconnected { reason: String },
    Status(StatusEvent),
    Announced(Simulation),
}

#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub url: Url,
    /// Reconnect with capped exponential backoff after a drop. Off by
    /// default: a dropped connection stops updates until the view remounts.
    pub reconnect: bool,
    pub capacity: usize,
}

impl StreamOptions {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            reconnect: false,
            capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            reconnect: config.stream_reconnect,
            ..Self::new(config.events_url.clone())
        }
    }
}

pub struct EventStream;

impl EventStream {
    /// Spawns the connection task. Must be called inside a tokio runtime.
    pub fn connect(options: StreamOptions) -> StreamHandle {
        let (notices, _) = broadcast::channel(options.capacity.max(1));
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(stream_loop(options, notices.clone(), stop_rx));
        StreamHandle {
            notices,
            stop: Some(stop_tx),
            task: Some(task),
        }
    }
}

/// Owns the connection for the lifetime of a view.
pub struct StreamHandle {
    notices: broadcast::Sender<StreamNotice>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl StreamHandle {
    /// Registers a new listener. Only notices published after this call are
    /// delivered to it.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.notices.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.notices.receiver_count()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(JoinHandle::is_finished).unwrap_or(true)
    }

    /// Disconnects from the namespace, closes the socket and waits for the
    /// connection task to exit.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(event = "stream_task_join_error", error = %err);
            }
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// One listener on the stream. Dropping it unsubscribes only this listener.
pub struct Subscription {
    rx: broadcast::Receiver<StreamNotice>,
}

impl Subscription {
    /// Next notice, or `None` once the handle and its connection task are
    /// both gone.
    pub async fn recv(&mut self) -> Option<StreamNotice> {
        loop {
            match self.rx.recv().await {
                Ok(notice) => return Some(notice),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(event = "stream_subscriber_lagged", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Pumps notices into an mpsc channel until either side closes.
    pub async fn forward<T>(mut self, tx: mpsc::Sender<T>)
    where
        T: From<StreamNotice> + Send + 'static,
    {
        while let Some(notice) = self.recv().await {
            if tx.send(T::from(notice)).await.is_err() {
                break;
            }
        }
    }
}

enum ConnectionEnd {
    Stopped,
    Lost(TransportError),
}

async fn stream_loop(
    options: StreamOptions,
    notices: broadcast::Sender<StreamNotice>,
    mut stop: oneshot::Receiver<()>,
) {
    let mut backoff = Duration::from_secs(1);
    loop {
        let (socket, connected_at) = tokio::select! {
            connect = connect_async(options.url.as_str()) => match connect {
                Ok((socket, _)) => (socket, Instant::now()),
                Err(err) => {
                    let err = TransportError::Stream(format!("connect failed: {err}"));
                    warn!(event = "stream_connect_error", url = %options.url, error = %err);
                    publish(&notices, StreamNotice::Disconnected { reason: err.to_string() });
                    if !options.reconnect || !wait_backoff(&mut stop, &mut backoff).await {
                        return;
                    }
                    continue;
                }
            },
            _ = &mut stop => return,
        };

        match run_connection(socket, &notices, &mut stop).await {
            ConnectionEnd::Stopped => {
                info!(event = "stream_closed");
                return;
            }
            ConnectionEnd::Lost(err) => {
                warn!(event = "stream_lost", error = %err);
                publish(&notices, StreamNotice::Disconnected { reason: err.to_string() });
                if connected_at.elapsed() > MAX_BACKOFF {
                    backoff = Duration::from_secs(1);
                }
                if !options.reconnect || !wait_backoff(&mut stop, &mut backoff).await {
                    return;
                }
            }
        }
    }
}

/// Sleeps for the current backoff unless a stop arrives first. Returns
/// `false` when stopped.
async fn wait_backoff(stop: &mut oneshot::Receiver<()>, backoff: &mut Duration) -> bool {
    let delay = *backoff;
    *backoff = next_backoff(delay);
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = stop => false,
    }
}

fn next_backoff(current: Duration) -> Duration {
    let next = current + current;
    if next > MAX_BACKOFF {
        MAX_BACKOFF
    } else {
        next
    }
}

fn publish(notices: &broadcast::Sender<StreamNotice>, notice: StreamNotice) {
    if notices.send(notice).is_err() {
        debug!(event = "stream_no_subscribers");
    }
}

async fn run_connection(
    mut socket: Socket,
    notices: &broadcast::Sender<StreamNotice>,
    stop: &mut oneshot::Receiver<()>,
) -> ConnectionEnd {
    let mut deadline = Instant::now() + HANDSHAKE_TIMEOUT;
    let mut heartbeat: Option<Duration> = None;

    loop {
        let frame = tokio::select! {
            frame = socket.next() => frame,
            _ = tokio::time::sleep_until(deadline) => {
                let _ = socket.close(None).await;
                return ConnectionEnd::Lost(TransportError::Stream(
                    "no ping from server within the heartbeat window".to_string(),
                ));
            }
            _ = &mut *stop => {
                let _ = socket
                    .send(Message::Text(socketio::disconnect_frame(DEFAULT_NAMESPACE)))
                    .await;
                let _ = socket.close(None).await;
                return ConnectionEnd::Stopped;
            }
        };

        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => {
                return ConnectionEnd::Lost(TransportError::Stream(
                    "server closed the connection".to_string(),
                ));
            }
            Some(Ok(_)) => continue,
            Some(Err(err)) => return ConnectionEnd::Lost(TransportError::Stream(err.to_string())),
        };

        if let Some(window) = heartbeat {
            deadline = Instant::now() + window;
        }

        let packet = match socketio::decode_engine_packet(&text) {
            Ok(packet) => packet,
            Err(err) => {
                warn!(event = "stream_frame_decode_error", error = %err);
                continue;
            }
        };

        match packet {
            EnginePacket::Open(open) => {
                let window = Duration::from_millis(open.ping_interval_ms + open.ping_timeout_ms);
                if !window.is_zero() {
                    heartbeat = Some(window);
                    deadline = Instant::now() + window;
                }
                debug!(event = "stream_open", sid = %open.sid);
                let connect = socketio::connect_frame(DEFAULT_NAMESPACE);
                if let Err(err) = socket.send(Message::Text(connect)).await {
                    return ConnectionEnd::Lost(TransportError::Stream(err.to_string()));
                }
            }
            EnginePacket::Ping(probe) => {
                if let Err(err) = socket.send(Message::Text(socketio::pong_frame(&probe))).await {
                    return ConnectionEnd::Lost(TransportError::Stream(err.to_string()));
                }
            }
            EnginePacket::Close => {
                return ConnectionEnd::Lost(TransportError::Stream(
                    "server sent close".to_string(),
                ));
            }
            EnginePacket::Message(message) => {
                if let Some(end) = handle_socket_packet(message, notices) {
                    return end;
                }
            }
            EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {}
        }
    }
}

fn handle_socket_packet(
    packet: SocketPacket,
    notices: &broadcast::Sender<StreamNotice>,
) -> Option<ConnectionEnd> {
    match packet {
        SocketPacket::Connect { namespace, .. } if namespace == DEFAULT_NAMESPACE => {
            info!(event = "stream_connected");
            publish(notices, StreamNotice::Connected);
        }
        SocketPacket::ConnectError { payload, .. } => {
            let reason = payload
                .map(|value| value.to_string())
                .unwrap_or_else(|| "namespace refused".to_string());
            return Some(ConnectionEnd::Lost(TransportError::Stream(reason)));
        }
        SocketPacket::Disconnect { namespace } if namespace == DEFAULT_NAMESPACE => {
            return Some(ConnectionEnd::Lost(TransportError::Stream(
                "server disconnected the namespace".to_string(),
            )));
        }
        SocketPacket::Event { name, args, .. } => match socketio::stream_message(&name, &args) {
            Ok(StreamMessage::Status(event)) => publish(notices, StreamNotice::Status(event)),
            Ok(StreamMessage::Announced(record)) => {
                publish(notices, StreamNotice::Announced(record))
            }
            Ok(StreamMessage::Ignored { event }) => {
                debug!(event = "stream_event_ignored", name = %event);
            }
            Err(err) => warn!(event = "stream_event_decode_error", error = %err),
        },
        other => debug!(event = "stream_packet_ignored", packet = ?other),
    }
    None
}
