//! The abstract best-effort message bus the consensus core depends on, plus its concrete
//! realization: one encoded line per short-lived TCP connection, acked with `OK` as a pure
//! flow-control signal.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};

use crate::error::PaxosError;
use crate::message::Message;

/// Invoked exactly once per message the transport receives.
pub type Handler = Arc<dyn Fn(Message) + Send + Sync>;

/// The capability the consensus core actually depends on. Tests substitute an in-process
/// implementation that can delay and reorder; node wiring supplies [`TcpTransport`].
pub trait Transport: Send + Sync {
    /// Begins listening. Every received message is delivered exactly once to `handler`.
    fn start(&self, handler: Handler) -> Result<(), PaxosError>;

    /// Delivers one message to one peer.
    fn send(&self, peer_id: &str, msg: &Message) -> Result<(), PaxosError>;

    /// Best-effort send to every configured peer except self. Per-peer failures are logged and
    /// swallowed.
    fn broadcast(&self, msg: &Message);

    /// Stops accepting new connections and tears down the worker pool. Idempotent.
    fn close(&self);
}

const WORKER_POOL_SIZE: usize = 8;
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A fixed-size pool of worker threads draining a channel of inbound connections, the classic
/// `mpsc`-backed thread pool shape.
struct WorkerPool {
    sender: Option<mpsc::Sender<TcpStream>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    fn new(size: usize, handler: Handler) -> Self {
        let (sender, receiver) = mpsc::channel::<TcpStream>();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..size)
            .map(|_| {
                let receiver = receiver.clone();
                let handler = handler.clone();
                thread::spawn(move || loop {
                    let stream = receiver.lock().unwrap().recv();
                    match stream {
                        Ok(stream) => handle_connection(stream, &handler),
                        Err(_) => break,
                    }
                })
            })
            .collect();

        WorkerPool {
            sender: Some(sender),
            workers,
        }
    }

    fn submit(&self, stream: TcpStream) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(stream);
        }
    }

    fn shutdown(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn handle_connection(mut stream: TcpStream, handler: &Handler) {
    let reader_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(e) => {
            warn!("could not clone connection for reading: {}", e);
            return;
        }
    };
    let mut reader = BufReader::new(reader_stream);
    let mut line = String::new();

    match reader.read_line(&mut line) {
        Ok(0) => {
            // Peer connected and closed without writing a line. Tolerated, nothing to do.
        }
        Ok(_) => {
            let trimmed = line.trim_end_matches(['\n', '\r']);
            match Message::decode(trimmed) {
                Ok(msg) => handler(msg),
                Err(e) => warn!("dropping malformed message: {}", e),
            }
            let _ = stream.write_all(b"OK\n");
        }
        Err(e) => warn!("error reading inbound connection: {}", e),
    }
}

/// Concrete realization of [`Transport`] over plain TCP sockets.
pub struct TcpTransport {
    self_id: String,
    peers: HashMap<String, SocketAddr>,
    closed: Arc<AtomicBool>,
    accept_thread: Mutex<Option<JoinHandle<()>>>,
    pool: Mutex<Option<Arc<Mutex<WorkerPool>>>>,
}

impl TcpTransport {
    pub fn new(self_id: impl Into<String>, peers: HashMap<String, SocketAddr>) -> Self {
        TcpTransport {
            self_id: self_id.into(),
            peers,
            closed: Arc::new(AtomicBool::new(false)),
            accept_thread: Mutex::new(None),
            pool: Mutex::new(None),
        }
    }

    fn self_addr(&self) -> Result<SocketAddr, PaxosError> {
        self.peers.get(&self.self_id).copied().ok_or_else(|| {
            PaxosError::TransportStart(format!("self id '{}' has no configured address", self.self_id))
        })
    }
}

impl Transport for TcpTransport {
    fn start(&self, handler: Handler) -> Result<(), PaxosError> {
        let addr = self.self_addr()?;
        let listener = TcpListener::bind(addr)
            .map_err(|e| PaxosError::TransportStart(format!("binding {}: {}", addr, e)))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| PaxosError::TransportStart(e.to_string()))?;

        let pool = Arc::new(Mutex::new(WorkerPool::new(WORKER_POOL_SIZE, handler)));
        *self.pool.lock().unwrap() = Some(pool.clone());

        let closed = self.closed.clone();
        let self_id = self.self_id.clone();
        let accept_handle = thread::spawn(move || {
            while !closed.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, _)) => pool.lock().unwrap().submit(stream),
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(ACCEPT_POLL_INTERVAL);
                    }
                    Err(e) => {
                        if !closed.load(Ordering::SeqCst) {
                            warn!("[{}] accept error: {}", self_id, e);
                        }
                        thread::sleep(ACCEPT_POLL_INTERVAL);
                    }
                }
            }
        });

        *self.accept_thread.lock().unwrap() = Some(accept_handle);
        Ok(())
    }

    fn send(&self, peer_id: &str, msg: &Message) -> Result<(), PaxosError> {
        let addr = self
            .peers
            .get(peer_id)
            .ok_or_else(|| PaxosError::UnknownPeer(peer_id.to_string()))?;

        let mut stream = TcpStream::connect(addr).map_err(|e| PaxosError::PeerUnreachable {
            peer: peer_id.to_string(),
            reason: e.to_string(),
        })?;

        let line = format!("{}\n", msg.encode());
        stream
            .write_all(line.as_bytes())
            .map_err(|e| PaxosError::PeerUnreachable {
                peer: peer_id.to_string(),
                reason: e.to_string(),
            })?;

        let mut reader = BufReader::new(&stream);
        let mut ack = String::new();
        // The ack is a pure backpressure signal; we only care that the round trip completed.
        reader.read_line(&mut ack).map_err(|e| PaxosError::PeerUnreachable {
            peer: peer_id.to_string(),
            reason: e.to_string(),
        })?;

        debug!("sent {:?} to {}", msg.msg_type, peer_id);
        Ok(())
    }

    fn broadcast(&self, msg: &Message) {
        for peer_id in self.peers.keys() {
            if peer_id == &self.self_id {
                continue;
            }
            if let Err(e) = self.send(peer_id, msg) {
                warn!("peer '{}' unreachable during broadcast: {}", peer_id, e);
            }
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = self.accept_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
        if let Some(pool) = self.pool.lock().unwrap().take() {
            pool.lock().unwrap().shutdown();
        }
    }
}
