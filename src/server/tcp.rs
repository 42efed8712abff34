//! # Servidor TCP
//! src/server/tcp.rs
//!
//! El thread principal solo acepta: cada conexión se convierte en un `Job` y
//! va a la cola; los workers del pool hacen el resto.
//!
//! ```text
//! accept ─► Job ─► WorkerPool::submit ─► JobQueue ─► worker ─► ConnectionHandler
//! ```
//!
//! El accept se hace con `poll` de 100 ms para notar el shutdown sin
//! depender de que llegue una conexión.

use crate::config::Config;
use crate::error::{Result, ServerError};
use crate::jobs::{Job, JobQueue};
use crate::metrics::MetricsCollector;
use crate::resolver::PathResolver;
use crate::server::connection::ConnectionHandler;
use crate::server::io::{wait_readable, Readiness};
use crate::workers::{Handler, PoolConfig, PoolStats, WorkerPool};
use std::io::{self, ErrorKind};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Cada cuánto el loop de accept revisa el flag de shutdown
pub const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Pausa tras un accept fallido (EMFILE, ENFILE, ...): el listener sigue
/// readable y sin ella el loop gira sin descanso
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(1);

/// Socket de escucha en modo non-blocking
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    /// Bind sobre `addr` (std ya activa `SO_REUSEADDR`)
    pub fn bind(addr: &str) -> Result<Self> {
        let bind_err = |source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        };

        let inner = TcpListener::bind(addr).map_err(bind_err)?;
        inner.set_nonblocking(true).map_err(bind_err)?;

        Ok(Self { inner })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Espera hasta `timeout` por una conexión
    ///
    /// El socket aceptado queda non-blocking y con `TCP_NODELAY`. `Ok(None)`
    /// si no llegó nada.
    pub fn accept_timeout(&self, timeout: Duration) -> io::Result<Option<TcpStream>> {
        match wait_readable(self.inner.as_raw_fd(), Some(timeout)) {
            Readiness::Ready => {}
            Readiness::TimedOut => return Ok(None),
            Readiness::Failed => return Err(io::Error::last_os_error()),
        }

        match self.inner.accept() {
            Ok((stream, peer)) => {
                stream.set_nonblocking(true)?;
                stream.set_nodelay(true)?;
                debug!(%peer, "connection accepted");
                Ok(Some(stream))
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Señal de apagado compartible (p. ej. con el handler de SIGINT)
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Contexto del servidor: listener, cola, pool y métricas
pub struct Server {
    listener: Listener,
    queue: Arc<JobQueue>,
    pool: WorkerPool,
    metrics: MetricsCollector,
    shutdown: ShutdownHandle,
    keepalive_timeout: Duration,
}

impl Server {
    /// Valida la configuración, resuelve el root, hace bind y arranca el pool
    pub fn new(config: &Config) -> Result<Self> {
        config.validate().map_err(ServerError::Config)?;

        let resolver = Arc::new(PathResolver::new(&config.root)?);
        let listener = Listener::bind(&config.address())?;

        let metrics = MetricsCollector::new();
        let connections = Arc::new(ConnectionHandler::new(
            Arc::clone(&resolver),
            config.keepalive_max_requests,
            metrics.clone(),
        ));
        let handler: Handler = Arc::new(move |job: Job| connections.handle(job));

        let queue = Arc::new(JobQueue::new(config.queue_capacity));
        let pool = WorkerPool::new(Arc::clone(&queue), handler, PoolConfig::from_config(config))?;

        info!(
            addr = %listener.local_addr()?,
            root = %resolver.root().display(),
            min_threads = config.min_threads,
            max_threads = config.max_threads,
            "server ready"
        );

        Ok(Self {
            listener,
            queue,
            pool,
            metrics,
            shutdown: ShutdownHandle::default(),
            keepalive_timeout: Duration::from_millis(config.keepalive_timeout_ms),
        })
    }

    /// Dirección real de escucha (útil con puerto 0)
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn metrics(&self) -> MetricsCollector {
        self.metrics.clone()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Loop de accept hasta que se pida el shutdown
    ///
    /// Al salir cierra el listener, hace join de los workers, libera la cola
    /// (cerrando los sockets pendientes) y registra las estadísticas finales.
    pub fn run(self) -> Result<()> {
        let Server {
            listener,
            queue,
            pool,
            metrics,
            shutdown,
            keepalive_timeout,
        } = self;

        info!(addr = %listener.local_addr()?, "accepting connections");

        while !shutdown.is_shutdown() {
            let stream = match next_stream(listener.accept_timeout(ACCEPT_POLL)) {
                Some(stream) => stream,
                None => continue,
            };

            // Toda conexión entra como persistente; el request decide después
            let job = Job::new(stream, true, keepalive_timeout);
            if let Err(job) = pool.submit(job) {
                drop(job);
                error!("worker pool stopped while accepting");
                break;
            }
        }

        info!("shutting down");
        drop(listener);

        pool.shutdown();
        let stats = pool.stats();
        drop(pool);

        let pending = queue.size_approx();
        drop(queue);
        if pending > 0 {
            debug!(pending, "closed queued connections");
        }

        info!(
            metrics = %metrics.to_json(),
            pool = %serde_json::to_string(&stats).unwrap_or_default(),
            "final stats"
        );

        Ok(())
    }
}

/// Resultado de un accept → conexión, o `None` tras loguear y esperar
/// `ACCEPT_ERROR_BACKOFF` si falló
fn next_stream(accepted: io::Result<Option<TcpStream>>) -> Option<TcpStream> {
    match accepted {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "accept failed");
            thread::sleep(ACCEPT_ERROR_BACKOFF);
            None
        }
    }
}
