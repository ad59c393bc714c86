use std::io;
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use may::coroutine::JoinHandle;
use may::net::TcpListener;
use tracing::{debug, error, info};

use crate::config::ServerConfig;
use crate::server::dispatcher::Dispatcher;
use crate::server::service::{Connection, ConnectionService};
use crate::server::worker_pool::{WorkerPool, WorkerPoolConfig};

/// Handle to a running acceptor and its worker pool
pub struct ServerHandle {
    addr: SocketAddr,
    acceptor: JoinHandle<()>,
    pool: WorkerPool<Connection>,
}

impl ServerHandle {
    /// Wait for the server to be ready to accept connections
    ///
    /// Polls the server address by attempting TCP connections until successful.
    ///
    /// # Errors
    ///
    /// Returns `TimedOut` error if the server doesn't become ready within ~250ms (50 attempts × 5ms).
    pub fn wait_ready(&self) -> io::Result<()> {
        for _ in 0..50 {
            if TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn pool(&self) -> &WorkerPool<Connection> {
        &self.pool
    }

    /// Stop accepting connections.
    ///
    /// Requests already handed to a worker run to completion; the workers
    /// exit once the queue is closed.
    pub fn stop(self) {
        // SAFETY: may::CoroutineHandle::coroutine().cancel() is marked unsafe by the may runtime.
        // The handle is valid because we own it, and cancelling the acceptor is
        // the intended way to end `accept_loop`.
        unsafe {
            self.acceptor.coroutine().cancel();
        }
        if self.acceptor.join().is_err() {
            debug!(addr = %self.addr, "Acceptor ended by cancellation");
        }
        // Dropping `pool` releases the last sender once the acceptor is gone.
    }

    /// Block until the acceptor coroutine finishes.
    ///
    /// # Errors
    ///
    /// Returns an error if the acceptor panicked.
    pub fn join(self) -> std::thread::Result<()> {
        self.acceptor.join()
    }
}

/// A SmartScript-capable HTTP server with guarded start/stop.
pub struct SmartHttpServer {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
    running: Mutex<Option<ServerHandle>>,
}

impl SmartHttpServer {
    /// Build a server from a validated configuration.
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let dispatcher = Arc::new(Dispatcher::from_config(&config)?);
        Ok(Self {
            config,
            dispatcher,
            running: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    fn running(&self) -> MutexGuard<'_, Option<ServerHandle>> {
        // A panic while holding the lock cannot leave the Option half-written.
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Bind the listener and start accepting connections.
    ///
    /// Calling `start` on a running server returns the bound address and
    /// does nothing else.
    pub fn start(&self) -> io::Result<SocketAddr> {
        let mut running = self.running();
        if let Some(handle) = running.as_ref() {
            debug!(addr = %handle.addr, "Server already running");
            return Ok(handle.addr);
        }

        let listener = TcpListener::bind((self.config.address.as_str(), self.config.port))?;
        let addr = listener.local_addr()?;

        let service = ConnectionService::new(&self.config, Arc::clone(&self.dispatcher));
        // SAFETY: WorkerPool::new spawns may coroutines. The handler only uses
        // may sockets and does not rely on thread-local state.
        let pool = unsafe {
            WorkerPool::new(
                "connections",
                WorkerPoolConfig::from_server_config(&self.config),
                move |connection: Connection| service.handle(connection),
            )
        };

        let acceptor_pool = pool.clone();
        // SAFETY: may::coroutine::Builder::spawn() is unsafe in the may runtime.
        // The acceptor owns its listener and pool sender, and is cancelled
        // through its JoinHandle in `ServerHandle::stop`.
        let acceptor = unsafe {
            may::coroutine::Builder::new()
                .name("smarthttp-acceptor".to_string())
                .stack_size(self.config.stack_size)
                .spawn(move || accept_loop(listener, acceptor_pool))
        }?;

        info!(
            %addr,
            document_root = %self.dispatcher.document_root().display(),
            workers = self.config.worker_threads,
            "Server started"
        );
        *running = Some(ServerHandle {
            addr,
            acceptor,
            pool,
        });
        Ok(addr)
    }

    /// Stop the server. Stopping a server that is not running does nothing.
    pub fn stop(&self) {
        let handle = self.running().take();
        if let Some(handle) = handle {
            let addr = handle.addr;
            handle.stop();
            info!(%addr, "Server stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running().is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running().as_ref().map(ServerHandle::addr)
    }

    /// Wait until the running server accepts connections.
    pub fn wait_ready(&self) -> io::Result<()> {
        match self.running().as_ref() {
            Some(handle) => handle.wait_ready(),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "server not started")),
        }
    }

    /// Block until the acceptor exits, which only happens after `stop`
    /// from another thread or an unrecoverable listener error.
    pub fn join(&self) {
        let handle = self.running().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Acceptor coroutine panicked");
            }
        }
    }
}

impl Drop for SmartHttpServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(listener: TcpListener, pool: WorkerPool<Connection>) {
    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                let connection = Connection::new(stream, Some(peer));
                debug!(connection_id = %connection.id, %peer, "Accepted connection");
                if pool.dispatch(connection).is_err() {
                    error!("Worker pool closed, acceptor exiting");
                    return;
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
                may::coroutine::yield_now();
            }
        }
    }
}
