//! Socket.IO transport over a blocking WebSocket.
//!
//! One worker thread owns the socket. It connects, joins the namespace with
//! the bearer token, answers pings, forwards validated events into the sink,
//! writes queued frames, and reconnects with backoff after any failure.
//! The caller's thread never waits on the network.
//!
//! Frames queued while no connection is up are discarded, never replayed.

use super::backoff::Backoff;
use super::transport::{ConnectRequest, EventSink, Transport, TransportEvent};
use crate::config::ReconnectPolicy;
use crate::error::{CourierError, Result};
use courier_protocol::packet::{EnginePacket, Handshake, SocketPacket, ENGINE_PROTOCOL_VERSION};
use courier_protocol::{parse_inbound, OutboundEvent, MAX_PAYLOAD_BYTES};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tungstenite::http::Uri;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Builds the Engine.IO WebSocket endpoint from an http(s) or ws(s) base URL.
pub fn socket_url(base_url: &str) -> Result<String> {
    let trimmed = base_url.trim().trim_end_matches('/');
    let (scheme, rest) = if let Some(rest) = trimmed.strip_prefix("https://") {
        ("wss://", rest)
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        ("ws://", rest)
    } else if let Some(rest) = trimmed.strip_prefix("wss://") {
        ("wss://", rest)
    } else if let Some(rest) = trimmed.strip_prefix("ws://") {
        ("ws://", rest)
    } else {
        return Err(CourierError::TransportConnect {
            reason: format!("unsupported socket url: {}", base_url),
        });
    };
    if rest.is_empty() {
        return Err(CourierError::TransportConnect {
            reason: format!("socket url has no host: {}", base_url),
        });
    }
    Ok(format!(
        "{}{}/socket.io/?EIO={}&transport=websocket",
        scheme, rest, ENGINE_PROTOCOL_VERSION
    ))
}

/// Opens the TCP connection under `timeout` per resolved address, so an
/// unreachable host fails in bounded time instead of the OS connect timeout.
fn open_tcp(url: &str, timeout: Duration) -> std::result::Result<TcpStream, String> {
    let uri: Uri = url.parse().map_err(|err| format!("invalid socket url: {}", err))?;
    let host = uri
        .host()
        .ok_or_else(|| format!("socket url has no host: {}", url))?
        .trim_start_matches('[')
        .trim_end_matches(']');
    let port = uri
        .port_u16()
        .unwrap_or(if uri.scheme_str() == Some("wss") { 443 } else { 80 });

    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|err| format!("failed to resolve {}: {}", host, err))?;
    let mut last_error = format!("no addresses for {}", host);
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream
                    .set_read_timeout(Some(timeout))
                    .and_then(|_| stream.set_write_timeout(Some(timeout)))
                    .map_err(|err| format!("failed to set socket timeouts: {}", err))?;
                return Ok(stream);
            }
            Err(err) => last_error = format!("connect to {} failed: {}", addr, err),
        }
    }
    Err(last_error)
}

enum Command {
    Emit(String),
    Close,
}

struct Worker {
    commands: Sender<Command>,
    shutdown: Arc<AtomicBool>,
    namespace: String,
}

pub struct SocketIoTransport {
    policy: ReconnectPolicy,
    worker: Option<Worker>,
}

impl SocketIoTransport {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            worker: None,
        }
    }
}

impl Transport for SocketIoTransport {
    fn open(&mut self, request: ConnectRequest, sink: EventSink) -> Result<()> {
        self.close();

        let url = socket_url(&request.base_url)?;
        let (commands, command_rx) = channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let namespace = request.namespace.clone();

        let context = WorkerContext {
            url,
            request,
            sink,
            commands: command_rx,
            shutdown: Arc::clone(&shutdown),
            backoff: Backoff::new(self.policy.clone()),
        };
        thread::Builder::new()
            .name("courier-tracking".to_string())
            .spawn(move || context.run())
            .map_err(|err| CourierError::TransportConnect {
                reason: format!("failed to spawn tracking worker: {}", err),
            })?;

        self.worker = Some(Worker {
            commands,
            shutdown,
            namespace,
        });
        Ok(())
    }

    fn emit(&mut self, event: &OutboundEvent) -> Result<()> {
        let worker = self
            .worker
            .as_ref()
            .ok_or_else(|| CourierError::TransportDisconnected {
                reason: "transport is closed".to_string(),
            })?;
        let payload = event.payload()?;
        let frame = SocketPacket::event(&worker.namespace, event.name(), payload).to_frame();
        worker
            .commands
            .send(Command::Emit(frame))
            .map_err(|_| CourierError::TransportDisconnected {
                reason: "tracking worker exited".to_string(),
            })
    }

    fn close(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown.store(true, Ordering::SeqCst);
            let _ = worker.commands.send(Command::Close);
        }
    }
}

impl Drop for SocketIoTransport {
    fn drop(&mut self) {
        self.close();
    }
}

enum Exit {
    Shutdown,
    Lost(String),
}

struct WorkerContext {
    url: String,
    request: ConnectRequest,
    sink: EventSink,
    commands: Receiver<Command>,
    shutdown: Arc<AtomicBool>,
    backoff: Backoff,
}

impl WorkerContext {
    fn stopped(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn run(mut self) {
        let mut attempt: u32 = 0;
        while !self.stopped() {
            attempt = attempt.saturating_add(1);
            self.sink.send(TransportEvent::Connecting { attempt });

            match self.establish() {
                Ok((mut socket, handshake)) => {
                    self.backoff.reset();
                    self.discard_queued();
                    tracing::info!(
                        driver_id = %self.request.driver_id,
                        namespace = %self.request.namespace,
                        "Tracking channel connected"
                    );
                    self.sink.send(TransportEvent::Connected);
                    let liveness = Duration::from_millis(
                        handshake
                            .ping_interval
                            .saturating_add(handshake.ping_timeout),
                    );
                    match self.serve(&mut socket, liveness) {
                        Exit::Shutdown => {
                            self.leave(&mut socket);
                            return;
                        }
                        Exit::Lost(reason) => {
                            tracing::warn!(reason = %reason, "Tracking channel lost");
                            self.sink.send(TransportEvent::Disconnected { reason });
                        }
                    }
                }
                Err(reason) => {
                    if self.stopped() {
                        return;
                    }
                    tracing::warn!(reason = %reason, attempt, "Tracking channel connect failed");
                    self.sink.send(TransportEvent::Errored { reason });
                }
            }

            if self.stopped() {
                return;
            }
            match self.backoff.next_delay() {
                Some(delay) => {
                    tracing::debug!(delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
                    self.sleep(delay);
                }
                None => {
                    self.sink.send(TransportEvent::Closed {
                        reason: "reconnect attempts exhausted".to_string(),
                    });
                    return;
                }
            }
        }
    }

    /// Sleeps in slices so a close request is honoured promptly.
    fn sleep(&mut self, delay: Duration) {
        let deadline = Instant::now() + delay;
        while !self.stopped() {
            self.discard_queued();
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }

    /// Drops frames queued while disconnected; notices close requests.
    fn discard_queued(&mut self) {
        loop {
            match self.commands.try_recv() {
                Ok(Command::Emit(_)) => {}
                Ok(Command::Close) | Err(TryRecvError::Disconnected) => {
                    self.shutdown.store(true, Ordering::SeqCst);
                    return;
                }
                Err(TryRecvError::Empty) => return,
            }
        }
    }

    fn establish(&mut self) -> std::result::Result<(Socket, Handshake), String> {
        let stream = open_tcp(&self.url, HANDSHAKE_TIMEOUT)?;
        self.discard_queued();
        if self.stopped() {
            return Err("closed while connecting".to_string());
        }
        let (mut socket, _response) =
            tungstenite::client_tls(self.url.as_str(), stream).map_err(|err| err.to_string())?;
        set_read_timeout(&mut socket, HANDSHAKE_TIMEOUT)?;

        let handshake = match read_engine_packet(&mut socket)? {
            EnginePacket::Open(handshake) => handshake,
            other => return Err(format!("expected open packet, got {:?}", other)),
        };

        self.discard_queued();
        if self.stopped() {
            return Err("closed while connecting".to_string());
        }
        let connect = SocketPacket::Connect {
            namespace: self.request.namespace.clone(),
            data: Some(serde_json::json!({ "token": self.request.token })),
        };
        socket
            .send(Message::Text(connect.to_frame()))
            .map_err(|err| err.to_string())?;

        loop {
            match read_engine_packet(&mut socket)? {
                EnginePacket::Ping(data) => {
                    socket
                        .send(Message::Text(EnginePacket::Pong(data).encode()))
                        .map_err(|err| err.to_string())?;
                }
                EnginePacket::Message(text) => match SocketPacket::decode(&text) {
                    Ok(SocketPacket::Connect { namespace, .. })
                        if namespace == self.request.namespace =>
                    {
                        break;
                    }
                    Ok(SocketPacket::ConnectError { data, .. }) => {
                        let message = data
                            .as_ref()
                            .and_then(|value| value.get("message"))
                            .and_then(|value| value.as_str())
                            .unwrap_or("connection refused")
                            .to_string();
                        return Err(format!("namespace connect refused: {}", message));
                    }
                    Ok(_) => {}
                    Err(info) => return Err(info.to_string()),
                },
                EnginePacket::Close => return Err("server closed during handshake".to_string()),
                _ => {}
            }
        }

        set_read_timeout(&mut socket, POLL_INTERVAL)?;
        Ok((socket, handshake))
    }

    fn serve(&mut self, socket: &mut Socket, liveness: Duration) -> Exit {
        let mut ping_deadline = Instant::now() + liveness;
        loop {
            if self.stopped() {
                return Exit::Shutdown;
            }

            loop {
                match self.commands.try_recv() {
                    Ok(Command::Emit(frame)) => {
                        if let Err(err) = socket.send(Message::Text(frame)) {
                            return Exit::Lost(err.to_string());
                        }
                    }
                    Ok(Command::Close) | Err(TryRecvError::Disconnected) => {
                        self.shutdown.store(true, Ordering::SeqCst);
                        return Exit::Shutdown;
                    }
                    Err(TryRecvError::Empty) => break,
                }
            }

            match socket.read() {
                Ok(Message::Text(text)) if text.len() > MAX_PAYLOAD_BYTES => {
                    tracing::warn!(bytes = text.len(), "Dropping oversized frame");
                }
                Ok(Message::Text(text)) => match EnginePacket::decode(&text) {
                    Ok(EnginePacket::Ping(data)) => {
                        ping_deadline = Instant::now() + liveness;
                        if let Err(err) = socket.send(Message::Text(EnginePacket::Pong(data).encode())) {
                            return Exit::Lost(err.to_string());
                        }
                    }
                    Ok(EnginePacket::Message(payload)) => {
                        if let Some(exit) = self.dispatch(&payload) {
                            return exit;
                        }
                    }
                    Ok(EnginePacket::Close) => return Exit::Lost("server closed session".to_string()),
                    Ok(_) => {}
                    Err(info) => {
                        tracing::warn!(code = %info.code, message = %info.message, "Dropping malformed frame");
                    }
                },
                Ok(Message::Close(_)) => return Exit::Lost("server closed connection".to_string()),
                Ok(_) => {}
                Err(tungstenite::Error::Io(err))
                    if matches!(
                        err.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) => {}
                Err(err) => return Exit::Lost(err.to_string()),
            }

            if Instant::now() >= ping_deadline {
                return Exit::Lost("ping timeout".to_string());
            }
        }
    }

    fn dispatch(&mut self, text: &str) -> Option<Exit> {
        match SocketPacket::decode(text) {
            Ok(SocketPacket::Event {
                namespace,
                name,
                payload,
                ..
            }) if namespace == self.request.namespace => match parse_inbound(&name, payload) {
                Ok(event) => {
                    tracing::debug!(event = %name, "Inbound event");
                    self.sink.send(TransportEvent::Inbound(event));
                }
                Err(info) if info.code == "unknown_event" => {
                    tracing::debug!(event = %name, "Ignoring unhandled event");
                }
                Err(info) => {
                    tracing::warn!(event = %name, code = %info.code, message = %info.message, "Dropping invalid event");
                }
            },
            Ok(SocketPacket::Disconnect { namespace }) if namespace == self.request.namespace => {
                return Some(Exit::Lost("server disconnected namespace".to_string()));
            }
            Ok(_) => {}
            Err(info) => {
                tracing::warn!(code = %info.code, message = %info.message, "Dropping malformed packet");
            }
        }
        None
    }

    /// Leaves the namespace and closes the socket; errors are irrelevant here.
    fn leave(&mut self, socket: &mut Socket) {
        let disconnect = SocketPacket::Disconnect {
            namespace: self.request.namespace.clone(),
        };
        let _ = socket.send(Message::Text(disconnect.to_frame()));
        let _ = socket.close(None);
        let _ = socket.flush();
        tracing::info!(driver_id = %self.request.driver_id, "Tracking channel closed");
    }
}

fn set_read_timeout(socket: &mut Socket, timeout: Duration) -> std::result::Result<(), String> {
    let result = match socket.get_mut() {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(Some(timeout)),
        MaybeTlsStream::Rustls(stream) => stream.sock.set_read_timeout(Some(timeout)),
        _ => Ok(()),
    };
    result.map_err(|err| format!("failed to set read timeout: {}", err))
}

fn read_engine_packet(socket: &mut Socket) -> std::result::Result<EnginePacket, String> {
    loop {
        match socket.read() {
            Ok(Message::Text(text)) => {
                return EnginePacket::decode(&text).map_err(|info| info.to_string())
            }
            Ok(Message::Close(_)) => return Err("server closed during handshake".to_string()),
            Ok(_) => {}
            Err(tungstenite::Error::Io(err))
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                return Err("handshake timed out".to_string())
            }
            Err(err) => return Err(err.to_string()),
        }
    }
}
