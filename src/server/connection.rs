//! # Manejo de Conexiones
//! src/server/connection.rs
//!
//! Atiende una conexión de principio a fin: espera datos, parsea, despacha y
//! repite mientras la conexión siga siendo persistente.
//!
//! ## Loop por conexión
//!
//! ```text
//! ┌─► poll(POLLIN, timeout) ── timeout / error ──► cerrar
//! │       │
//! │   read (un solo read, 8 KiB) ── EOF / error ──► cerrar
//! │       │
//! │   parse ── error ──► cerrar
//! │       │
//! │   método ≠ GET/HEAD → 405
//! │   path inseguro     → 403
//! │   archivo           → 200 / 404 / 500
//! │       │
//! └── keep-alive && requests < máximo
//! ```

use crate::http::{Method, Request, StatusCode};
use crate::jobs::Job;
use crate::metrics::MetricsCollector;
use crate::resolver::{PathResolver, Resolution};
use crate::server::files::{send_error, serve_file};
use crate::server::io::{wait_readable, Readiness};
use std::io::{self, ErrorKind, Read, Write};
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Tamaño del buffer de lectura (se reserva un byte)
pub const READ_BUFFER_SIZE: usize = 8192;

/// Requests por conexión por defecto
pub const DEFAULT_MAX_REQUESTS: usize = 100;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Lógica por conexión que ejecutan los workers
pub struct ConnectionHandler {
    resolver: Arc<PathResolver>,
    max_requests: usize,
    metrics: MetricsCollector,
}

impl ConnectionHandler {
    pub fn new(resolver: Arc<PathResolver>, max_requests: usize, metrics: MetricsCollector) -> Self {
        Self {
            resolver,
            max_requests: max_requests.max(1),
            metrics,
        }
    }

    /// Atiende el job completo; el socket se cierra al terminar
    pub fn handle(&self, job: Job) {
        let keep_alive = job.keep_alive;
        let timeout = job.timeout;
        let mut stream = job.into_stream();

        self.metrics.record_connection();
        let served = self.serve(&mut stream, keep_alive, timeout);
        debug!(requests = served, "connection closed");
    }

    /// Loop de requests sobre cualquier stream; retorna cuántos se atendieron
    ///
    /// Con `keep_alive` la espera entre requests está acotada por `timeout`;
    /// sin él se espera indefinidamente por el primero.
    pub fn serve<S>(&self, stream: &mut S, keep_alive: bool, timeout: Duration) -> usize
    where
        S: Read + Write + AsRawFd,
    {
        let wait = keep_alive.then_some(timeout);
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut pending = 0;
        let mut served = 0;

        while served < self.max_requests {
            let len = if pending > 0 {
                std::mem::take(&mut pending)
            } else {
                match read_request(stream, &mut buf, wait) {
                    Some(n) => n,
                    None => break,
                }
            };

            let mut request = match Request::parse(&buf[..len]) {
                Ok(request) => request,
                Err(e) => {
                    debug!(error = %e, "malformed request");
                    break;
                }
            };

            served += 1;
            if served == self.max_requests {
                request.disable_keep_alive();
            }

            let started = Instant::now();
            let status = match self.dispatch(stream, &request) {
                Ok(status) => status,
                Err(e) => {
                    debug!(error = %e, "write failed");
                    break;
                }
            };

            self.metrics.record_request(status, started.elapsed());
            debug!(
                method = request.method().as_str(),
                path = request.path(),
                status = status.as_u16(),
                "request served"
            );

            if !request.keep_alive() {
                break;
            }

            pending = pipelined_remainder(&mut buf, len, &request);
        }

        served
    }

    /// Elige la respuesta para un request y la envía
    fn dispatch<S>(&self, stream: &mut S, request: &Request) -> io::Result<StatusCode>
    where
        S: Write + AsRawFd,
    {
        let keep_alive = request.keep_alive();
        // HEAD nunca lleva body, tampoco en los errores
        let send_body = *request.method() != Method::HEAD;

        if !request.method().is_supported() {
            return send_error(stream, StatusCode::MethodNotAllowed, keep_alive, send_body);
        }

        match self.resolver.resolve(request.file_path()) {
            Resolution::Rejected => {
                debug!(path = request.path(), "path outside root");
                send_error(stream, StatusCode::Forbidden, keep_alive, send_body)
            }
            Resolution::Safe(path) => serve_file(stream, &path, keep_alive, send_body),
        }
    }
}

/// Espera datos y hace una sola lectura
///
/// `None` cierra la conexión: timeout, error de poll, EOF o error de read.
fn read_request<S>(stream: &mut S, buf: &mut [u8], wait: Option<Duration>) -> Option<usize>
where
    S: Read + AsRawFd,
{
    let limit = buf.len() - 1;

    loop {
        match wait_readable(stream.as_raw_fd(), wait) {
            Readiness::Ready => {}
            Readiness::TimedOut => {
                debug!("idle timeout");
                return None;
            }
            Readiness::Failed => return None,
        }

        match stream.read(&mut buf[..limit]) {
            Ok(0) => return None,
            Ok(n) => return Some(n),
            Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => continue,
            Err(e) => {
                debug!(error = %e, "read failed");
                return None;
            }
        }
    }
}

/// Mueve al inicio del buffer los bytes que siguen al request ya atendido
///
/// Solo se conservan si contienen un head completo; un resto incompleto se
/// descarta. Retorna cuántos bytes quedaron pendientes.
fn pipelined_remainder(buf: &mut [u8], len: usize, request: &Request) -> usize {
    if !request.head_complete() {
        return 0;
    }

    let consumed = request.head_len().saturating_add(request.content_length());
    if consumed >= len {
        return 0;
    }

    let rest = &buf[consumed..len];
    if !rest.windows(HEAD_TERMINATOR.len()).any(|w| w == HEAD_TERMINATOR) {
        return 0;
    }

    buf.copy_within(consumed..len, 0);
    len - consumed
}
