use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio_util::bytes::Bytes;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;

use super::config::ServerConfig;
use super::events::{DisconnectReason, ServerEvent};
use super::peers::{PeerInfo, PeerTable};
use crate::dispatch::{Dispatch, Engine};
use crate::error::Error;
use crate::glow::{Element, InvocationResult, Root, TreePath, Value};
use crate::subscribers::{PeerId, PeerSink};
use crate::tree::Tree;

/// Executes function invocations on behalf of peers.
pub trait InvocationHandler: Send + Sync {
    fn invoke(&self, path: &TreePath, arguments: &[Value]) -> Result<Vec<Value>, String>;
}

struct RejectInvocations;

impl InvocationHandler for RejectInvocations {
    fn invoke(&self, path: &TreePath, _arguments: &[Value]) -> Result<Vec<Value>, String> {
        Err(format!("no handler for function {}", path))
    }
}

pub fn frame_codec(max_frame_length: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(max_frame_length)
        .new_codec()
}

/// Opens a framed client connection to a tree server.
pub async fn connect(addr: impl ToSocketAddrs) -> io::Result<Framed<TcpStream, LengthDelimitedCodec>> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(Framed::new(
        stream,
        frame_codec(super::config::DEFAULT_MAX_FRAME_LENGTH),
    ))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Shared {
    config: ServerConfig,
    engine: Mutex<Engine>,
    peers: Mutex<PeerTable>,
    handler: RwLock<Arc<dyn InvocationHandler>>,
    events: mpsc::UnboundedSender<ServerEvent>,
    next_peer: AtomicU64,
    shutdown: CancellationToken,
}

impl Shared {
    fn emit(&self, event: ServerEvent) {
        let _ = self.events.send(event);
    }

    fn publish(&self, dispatch: &Dispatch, origin: Option<SocketAddr>) {
        for event in &dispatch.events {
            self.emit(ServerEvent::from_tree(event.clone(), origin));
        }
    }

    fn send(&self, peer: PeerId, message: Root) {
        let peers = lock(&self.peers);
        if !peers.deliver(peer, &message) {
            log::debug!("Reply to {} dropped, peer is gone", peer);
        }
    }

    /// Runs `operation` with the engine and peer table locked, so that
    /// resolving, mutating and fanning out happen as one step.
    fn with_engine<F>(&self, operation: F) -> Result<Dispatch, Error>
    where
        F: FnOnce(&mut Engine, &PeerTable) -> Result<Dispatch, Error>,
    {
        let mut engine = lock(&self.engine);
        let peers = lock(&self.peers);
        operation(&mut engine, &peers)
    }

    fn handle_frame(&self, peer: PeerId, addr: SocketAddr, frame: &[u8]) {
        let request = match Root::decode(frame) {
            Ok(request) => request,
            Err(e) => {
                log::warn!("Undecodable message from {}: {}", addr, e);
                self.emit(ServerEvent::Error {
                    addr: Some(addr),
                    message: format!("Decode error: {}", e),
                });
                return;
            }
        };

        let result = {
            let mut engine = lock(&self.engine);
            let peers = lock(&self.peers);
            engine
                .handle_request(peer, &request, &*peers)
                .map_err(|e| (e, engine.tree().minimal_snapshot()))
        };

        let dispatch = match result {
            Ok(dispatch) => dispatch,
            Err((e, snapshot)) => {
                log::warn!("Request from {} rejected: {}", addr, e);
                self.emit(ServerEvent::Error {
                    addr: Some(addr),
                    message: e.to_string(),
                });
                self.send(peer, snapshot);
                return;
            }
        };

        log::debug!(
            "Request from {} on {}",
            addr,
            dispatch.path.as_ref().map(ToString::to_string).unwrap_or_default()
        );
        self.emit(ServerEvent::RequestReceived {
            peer,
            addr,
            path: dispatch.path.clone(),
        });
        self.publish(&dispatch, Some(addr));

        if let Some(pending) = dispatch.invocation {
            let handler = Arc::clone(&self.handler.read().unwrap_or_else(PoisonError::into_inner));
            let id = pending.invocation.id.unwrap_or_default();
            let result = match handler.invoke(&pending.path, &pending.invocation.arguments) {
                Ok(values) => InvocationResult::success(id, values),
                Err(message) => {
                    log::warn!("Invocation {} on {} failed: {}", id, pending.path, message);
                    InvocationResult::failure(id)
                }
            };
            self.emit(ServerEvent::Invoked {
                path: pending.path,
                invocation_id: pending.invocation.id,
                success: result.success,
            });
            self.send(peer, Root::InvocationResult(result));
        }

        if let Some(reply) = dispatch.reply {
            self.send(peer, reply);
        }
    }
}

/// Accepts peers and serves the shared tree to them.
pub struct TreeServer {
    listener: TcpListener,
    shared: Arc<Shared>,
    events: Option<mpsc::UnboundedReceiver<ServerEvent>>,
}

impl TreeServer {
    pub async fn bind(config: ServerConfig, tree: Tree) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr()).await?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            config,
            engine: Mutex::new(Engine::new(tree)),
            peers: Mutex::new(PeerTable::default()),
            handler: RwLock::new(Arc::new(RejectInvocations)),
            events: events_tx,
            next_peer: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        });

        let server = Self {
            listener,
            shared,
            events: Some(events_rx),
        };
        server.shared.emit(ServerEvent::Listening {
            addr: server.local_addr()?,
        });
        Ok(server)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Takes the event receiver. Events are buffered until it is taken.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<ServerEvent>> {
        self.events.take()
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub async fn run(self) -> io::Result<()> {
        log::info!("Serving tree on {}", self.local_addr()?);
        loop {
            tokio::select! {
                _ = self.shared.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let shared = Arc::clone(&self.shared);
                        tokio::spawn(serve_peer(shared, stream, addr));
                    }
                    Err(e) => {
                        self.shared.emit(ServerEvent::Error {
                            addr: None,
                            message: format!("Accept failed: {}", e),
                        });
                    }
                },
            }
        }
        log::info!("Tree server stopped");
        Ok(())
    }
}

async fn serve_peer(shared: Arc<Shared>, stream: TcpStream, addr: SocketAddr) {
    let peer = PeerId(shared.next_peer.fetch_add(1, Ordering::Relaxed));
    if let Err(e) = stream.set_nodelay(true) {
        log::debug!("Could not set TCP_NODELAY for {}: {}", addr, e);
    }
    let framed = Framed::new(stream, frame_codec(shared.config.max_frame_length));
    let (mut sink, mut frames) = framed.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Root>();

    lock(&shared.peers).insert(peer, addr, outbound_tx);
    log::info!("{} connected from {}", peer, addr);
    shared.emit(ServerEvent::ConnectionOpened { peer, addr });

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if let Err(e) = sink.send(Bytes::from(message.encode())).await {
                log::debug!("Write to {} failed: {}", addr, e);
                break;
            }
        }
    });

    let reason = loop {
        let frame = tokio::select! {
            _ = shared.shutdown.cancelled() => break DisconnectReason::Shutdown,
            frame = frames.next() => frame,
        };
        match frame {
            Some(Ok(frame)) => shared.handle_frame(peer, addr, &frame),
            Some(Err(e)) => {
                shared.emit(ServerEvent::Error {
                    addr: Some(addr),
                    message: format!("Stream error: {}", e),
                });
                break DisconnectReason::Error;
            }
            None => break DisconnectReason::Closed,
        }
    };

    lock(&shared.peers).remove(peer);
    writer.abort();
    log::info!("{} {}", peer, reason.as_str());
    shared.emit(ServerEvent::ConnectionClosed { peer, addr, reason });
}

/// Cloneable control surface of a running server.
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<Shared>,
}

impl ServerHandle {
    pub fn set_invocation_handler(&self, handler: impl InvocationHandler + 'static) {
        *self
            .shared
            .handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(handler);
    }

    fn operate<F>(&self, operation: F) -> Result<Dispatch, Error>
    where
        F: FnOnce(&mut Engine, &PeerTable) -> Result<Dispatch, Error>,
    {
        let dispatch = self.shared.with_engine(operation)?;
        self.shared.publish(&dispatch, None);
        Ok(dispatch)
    }

    pub fn matrix_connect(&self, path: &str, target: u32, sources: Vec<u32>) -> Result<Dispatch, Error> {
        let path: TreePath = path.parse()?;
        self.operate(|engine, peers| engine.matrix_connect(&path, target, sources, peers))
    }

    pub fn matrix_disconnect(&self, path: &str, target: u32, sources: Vec<u32>) -> Result<Dispatch, Error> {
        let path: TreePath = path.parse()?;
        self.operate(|engine, peers| engine.matrix_disconnect(&path, target, sources, peers))
    }

    pub fn matrix_set(&self, path: &str, target: u32, sources: Vec<u32>) -> Result<Dispatch, Error> {
        let path: TreePath = path.parse()?;
        self.operate(|engine, peers| engine.matrix_set(&path, target, sources, peers))
    }

    pub fn set_value(&self, path: &str, value: Value) -> Result<Dispatch, Error> {
        let path: TreePath = path.parse()?;
        self.operate(|engine, peers| engine.set_value(&path, value, peers))
    }

    pub fn replace_element(&self, path: &str, element: Element) -> Result<Dispatch, Error> {
        let path: TreePath = path.parse()?;
        self.operate(|engine, peers| engine.replace_element(&path, element, peers))
    }

    pub fn peers(&self) -> Vec<PeerInfo> {
        lock(&self.shared.peers).infos()
    }

    /// Number of elements in the served tree.
    pub fn element_count(&self) -> usize {
        lock(&self.shared.engine).tree().len()
    }

    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.shared.shutdown.is_cancelled()
    }
}
