//! # I/O de Sockets No Bloqueantes
//! src/server/io.rs
//!
//! Primitivas sobre sockets en modo non-blocking. Toda escritura sigue la
//! misma disciplina:
//!
//! - `EAGAIN` / `EWOULDBLOCK` → esperar escritura con `poll` (máx. 5 s) y
//!   reintentar
//! - `EINTR` → reintentar de inmediato
//! - cualquier otro error → abortar; se devuelve lo ya transferido o el error
//!   si no se transfirió nada
//! - 0 bytes con datos pendientes → el peer cerró, se corta sin error

use std::fs::File;
use std::io::{self, ErrorKind, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

/// Tope de espera por escritura ante `EAGAIN`
pub const WRITE_WAIT_CAP: Duration = Duration::from_secs(5);

/// Resultado de esperar a que un socket esté listo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
    Failed,
}

/// Espera a que `fd` esté legible; `None` espera indefinidamente
///
/// Las interrupciones por señal se reintentan aquí mismo.
pub fn wait_readable(fd: RawFd, timeout: Option<Duration>) -> Readiness {
    wait_for(fd, libc::POLLIN, timeout)
}

/// Espera a que `fd` acepte más escritura
pub fn wait_writable(fd: RawFd, timeout: Option<Duration>) -> Readiness {
    wait_for(fd, libc::POLLOUT, timeout)
}

fn wait_for(fd: RawFd, events: libc::c_short, timeout: Option<Duration>) -> Readiness {
    let timeout_ms = match timeout {
        Some(t) => t.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
        None => -1,
    };

    loop {
        let mut pfd = libc::pollfd {
            fd,
            events,
            revents: 0,
        };

        // SAFETY: `pfd` es un pollfd válido y vive durante toda la llamada.
        let ready = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };

        match ready {
            0 => return Readiness::TimedOut,
            n if n > 0 => return Readiness::Ready,
            _ => {
                if io::Error::last_os_error().kind() == ErrorKind::Interrupted {
                    continue;
                }
                return Readiness::Failed;
            }
        }
    }
}

/// Escribe `buf` completo respetando la disciplina de reintentos
///
/// Retorna los bytes escritos; puede ser menos que `buf.len()` si el peer
/// cerró a mitad de camino.
pub fn send_buffer<S>(sock: &mut S, buf: &[u8]) -> io::Result<usize>
where
    S: Write + AsRawFd,
{
    let mut total = 0;

    while total < buf.len() {
        match sock.write(&buf[total..]) {
            // El peer ya no recibe: EOF, no es un error
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                wait_writable(sock.as_raw_fd(), Some(WRITE_WAIT_CAP));
            }
            Err(e) => return partial_or(total, e),
        }
    }

    Ok(total)
}

/// Transfiere `count` bytes de `file` (desde `offset`) al socket sin pasar
/// por espacio de usuario (`sendfile(2)`)
///
/// Misma disciplina de reintentos que `send_buffer`. Un `sendfile` que
/// devuelve 0 (fin del archivo o peer cerrado) corta la transferencia.
pub fn send_file<S>(sock: &S, file: &File, offset: u64, count: u64) -> io::Result<u64>
where
    S: AsRawFd,
{
    let out_fd = sock.as_raw_fd();
    let in_fd = file.as_raw_fd();
    let mut off = offset as libc::off_t;
    let mut remaining = count;
    let mut total: u64 = 0;

    while remaining > 0 {
        let chunk = remaining.min(isize::MAX as u64) as usize;

        // SAFETY: ambos descriptores están abiertos durante la llamada y
        // `off` es un off_t válido que el kernel actualiza.
        let sent = unsafe { libc::sendfile(out_fd, in_fd, &mut off, chunk) };

        if sent < 0 {
            let err = io::Error::last_os_error();
            match err.kind() {
                ErrorKind::Interrupted => continue,
                ErrorKind::WouldBlock => {
                    wait_writable(out_fd, Some(WRITE_WAIT_CAP));
                    continue;
                }
                _ => return partial_or(total, err),
            }
        }

        if sent == 0 {
            break;
        }

        total += sent as u64;
        remaining -= sent as u64;
    }

    Ok(total)
}

/// Activa o desactiva `TCP_CORK`
///
/// Con el socket "corked" el head y el body salen en los mismos segmentos;
/// al quitarlo se vacía lo pendiente. Sobre sockets que no son TCP falla
/// sin consecuencias (el llamador lo ignora).
pub fn set_cork(fd: RawFd, enabled: bool) -> io::Result<()> {
    let value: libc::c_int = enabled as libc::c_int;

    // SAFETY: `value` vive durante la llamada y el tamaño es el de un c_int.
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::IPPROTO_TCP,
            libc::TCP_CORK,
            &value as *const libc::c_int as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };

    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn partial_or<T: Default + PartialEq>(total: T, err: io::Error) -> io::Result<T> {
    if total != T::default() {
        Ok(total)
    } else {
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::os::unix::net::UnixStream;
    use std::thread;
    use tempfile::NamedTempFile;

    #[test]
    fn test_wait_readable_times_out() {
        let (a, _b) = UnixStream::pair().unwrap();
        let ready = wait_readable(a.as_raw_fd(), Some(Duration::from_millis(20)));
        assert_eq!(ready, Readiness::TimedOut);
    }

    #[test]
    fn test_wait_readable_ready() {
        let (a, mut b) = UnixStream::pair().unwrap();
        b.write_all(b"x").unwrap();
        assert_eq!(wait_readable(a.as_raw_fd(), None), Readiness::Ready);
    }

    #[test]
    fn test_wait_readable_on_peer_close() {
        // Un peer cerrado se reporta como legible (el read dará 0)
        let (a, b) = UnixStream::pair().unwrap();
        drop(b);
        let ready = wait_readable(a.as_raw_fd(), Some(Duration::from_millis(100)));
        assert_eq!(ready, Readiness::Ready);
    }

    #[test]
    fn test_send_buffer_complete() {
        let (mut a, mut b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();

        let sent = send_buffer(&mut a, b"hello world").unwrap();
        assert_eq!(sent, 11);

        let mut buf = [0u8; 11];
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello world");
    }

    #[test]
    fn test_send_buffer_waits_on_would_block() {
        // Más datos que el buffer del socket: obliga a pasar por EAGAIN + poll
        let (mut a, mut b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        let payload = vec![7u8; 4 * 1024 * 1024];
        let expected = payload.len();

        let reader = thread::spawn(move || {
            let mut received = Vec::new();
            b.read_to_end(&mut received).unwrap();
            received
        });

        let sent = send_buffer(&mut a, &payload).unwrap();
        assert_eq!(sent, expected);
        drop(a);

        let received = reader.join().unwrap();
        assert_eq!(received.len(), expected);
        assert!(received.iter().all(|&b| b == 7));
    }

    #[test]
    fn test_send_buffer_to_closed_peer_fails() {
        let (mut a, b) = UnixStream::pair().unwrap();
        drop(b);
        // EPIPE sin bytes enviados → error
        assert!(send_buffer(&mut a, b"lost").is_err());
    }

    #[test]
    fn test_send_file_range() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();
        let file = File::open(file.path()).unwrap();

        let (a, mut b) = UnixStream::pair().unwrap();
        let sent = send_file(&a, &file, 2, 5).unwrap();
        assert_eq!(sent, 5);
        drop(a);

        let mut received = String::new();
        b.read_to_string(&mut received).unwrap();
        assert_eq!(received, "23456");
    }

    #[test]
    fn test_send_file_stops_at_eof() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"short").unwrap();
        let file = File::open(file.path()).unwrap();

        let (a, _b) = UnixStream::pair().unwrap();
        // Pedir más de lo que hay: sendfile devuelve 0 al llegar al final
        assert_eq!(send_file(&a, &file, 0, 100).unwrap(), 5);
    }

    #[test]
    fn test_cork_on_non_tcp_socket_fails() {
        let (a, _b) = UnixStream::pair().unwrap();
        assert!(set_cork(a.as_raw_fd(), true).is_err());
    }
}
