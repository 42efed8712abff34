//! # Estructura de Job
//! src/jobs/job.rs
//!
//! Un job representa una conexión aceptada más sus metadatos de
//! planificación. El socket viaja con el job: quien lo desencola es el
//! único dueño del descriptor hasta que lo cierra.

use std::net::TcpStream;
use std::os::fd::OwnedFd;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Reloj monotónico del proceso en milisegundos
///
/// Todas las marcas de tiempo de jobs y del pool usan esta base.
pub fn now_ms() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_millis() as u64
}

/// Conexión aceptada esperando un worker
#[derive(Debug)]
pub struct Job {
    /// Socket del cliente (se cierra al hacer drop del job)
    socket: OwnedFd,

    /// Momento en que el dispatcher encoló el job (ver `now_ms`)
    pub enqueued_at_ms: u64,

    /// Si la conexión puede atender más de un request
    pub keep_alive: bool,

    /// Tiempo máximo de inactividad entre requests
    pub timeout: Duration,
}

impl Job {
    /// Crea un job a partir de un stream recién aceptado
    pub fn new(stream: TcpStream, keep_alive: bool, timeout: Duration) -> Self {
        Self::from_fd(OwnedFd::from(stream), now_ms(), keep_alive, timeout)
    }

    pub fn from_fd(socket: OwnedFd, enqueued_at_ms: u64, keep_alive: bool, timeout: Duration) -> Self {
        Self {
            socket,
            enqueued_at_ms,
            keep_alive,
            timeout,
        }
    }

    /// Milisegundos que el job pasó en la cola hasta `now`
    pub fn wait_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.enqueued_at_ms)
    }

    /// Entrega el socket como `TcpStream`, consumiendo el job
    pub fn into_stream(self) -> TcpStream {
        TcpStream::from(self.socket)
    }

    /// Consume el job sin cerrar el socket (lo usa la cola al publicar un slot)
    pub(crate) fn into_parts(self) -> (OwnedFd, u64, bool, Duration) {
        (self.socket, self.enqueued_at_ms, self.keep_alive, self.timeout)
    }
}
