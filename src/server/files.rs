//! # Servir Archivos
//! src/server/files.rs
//!
//! Dado un path ya validado por el resolver, envía el archivo completo:
//! head con `Content-Type` / `Content-Length` / `Connection`, y luego el body
//! por `sendfile`.

use crate::http::mime::mime_type;
use crate::http::{Response, StatusCode};
use crate::server::io::{self, send_buffer, send_file};
use std::fs::File;
use std::io::Write;
use std::os::fd::AsRawFd;
use std::path::Path;
use tracing::debug;

/// Archivo que se sirve cuando el path es un directorio
pub const INDEX_FILE: &str = "index.html";

/// Sirve `path` por el socket y retorna el status enviado
///
/// - no se puede abrir → 404
/// - `fstat` falla → 500
/// - directorio → se sirve `path/index.html` (recursivo y sin límite de
///   profundidad: un `index.html` que a su vez es directorio sigue bajando)
/// - archivo regular → 200 + body (el body se omite si `send_body` es false,
///   como en HEAD)
///
/// `Err` solo si escribir en el socket falló.
pub fn serve_file<S>(
    sock: &mut S,
    path: &Path,
    keep_alive: bool,
    send_body: bool,
) -> std::io::Result<StatusCode>
where
    S: Write + AsRawFd,
{
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "open failed");
            return send_error(sock, StatusCode::NotFound, keep_alive, send_body);
        }
    };

    let metadata = match file.metadata() {
        Ok(metadata) => metadata,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "fstat failed");
            return send_error(sock, StatusCode::InternalServerError, keep_alive, send_body);
        }
    };

    if metadata.is_dir() {
        drop(file);
        return serve_file(sock, &path.join(INDEX_FILE), keep_alive, send_body);
    }

    let len = metadata.len();
    let mime = mime_type(path);
    let header = Response::file_header(mime.essence_str(), len, keep_alive).to_bytes();

    // Head y body en los mismos segmentos; quitar el cork vacía lo pendiente
    let fd = sock.as_raw_fd();
    let _ = io::set_cork(fd, true);

    let result = send_buffer(sock, &header).and_then(|_| {
        if send_body && len > 0 {
            send_file(sock, &file, 0, len)?;
        }
        Ok(())
    });

    let _ = io::set_cork(fd, false);
    result.map(|_| StatusCode::Ok)
}

/// Envía una respuesta de error con la reason phrase como body
///
/// Con `send_body` en false (HEAD) solo va el head; `Content-Length` sigue
/// anunciando el largo de la phrase.
pub fn send_error<S>(
    sock: &mut S,
    status: StatusCode,
    keep_alive: bool,
    send_body: bool,
) -> std::io::Result<StatusCode>
where
    S: Write + AsRawFd,
{
    let response = Response::error(status, keep_alive);
    let bytes = if send_body {
        response.to_bytes()
    } else {
        response.head_bytes()
    };
    send_buffer(sock, &bytes)?;
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Read;
    use std::os::unix::net::UnixStream;
    use tempfile::TempDir;

    fn serve(path: &Path, keep_alive: bool, send_body: bool) -> (StatusCode, String) {
        let (mut a, mut b) = UnixStream::pair().unwrap();
        let status = serve_file(&mut a, path, keep_alive, send_body).unwrap();
        drop(a);

        let mut out = String::new();
        b.read_to_string(&mut out).unwrap();
        (status, out)
    }

    #[test]
    fn test_serves_regular_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("page.html");
        fs::write(&path, "<h1>hola</h1>").unwrap();

        let (status, out) = serve(&path, true, true);

        assert_eq!(status, StatusCode::Ok);
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.contains("Content-Type: text/html\r\n"));
        assert!(out.contains("Content-Length: 13\r\n"));
        assert!(out.contains("Connection: keep-alive\r\n"));
        assert!(out.ends_with("\r\n\r\n<h1>hola</h1>"));
    }

    #[test]
    fn test_head_omits_body() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "some text").unwrap();

        let (status, out) = serve(&path, false, false);

        assert_eq!(status, StatusCode::Ok);
        assert!(out.contains("Content-Length: 9\r\n"));
        assert!(out.contains("Connection: close\r\n"));
        assert!(out.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_missing_file_is_404() {
        let dir = TempDir::new().unwrap();
        let (status, out) = serve(&dir.path().join("nope.html"), true, true);

        assert_eq!(status, StatusCode::NotFound);
        assert!(out.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(out.ends_with("Not Found"));
    }

    #[test]
    fn test_head_missing_file_keeps_length_without_body() {
        let dir = TempDir::new().unwrap();
        let (status, out) = serve(&dir.path().join("nope.html"), true, false);

        assert_eq!(status, StatusCode::NotFound);
        assert!(out.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(out.contains("Content-Length: 9\r\n"));
        assert!(out.ends_with("\r\n\r\n"));
    }

    fn error_output(status: StatusCode, send_body: bool) -> String {
        let (mut a, mut b) = UnixStream::pair().unwrap();
        assert_eq!(send_error(&mut a, status, true, send_body).unwrap(), status);
        drop(a);

        let mut out = String::new();
        b.read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn test_internal_error_response() {
        let out = error_output(StatusCode::InternalServerError, true);

        assert!(out.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(out.contains("Content-Type: text/plain\r\n"));
        assert!(out.contains("Content-Length: 21\r\n"));
        assert!(out.contains("Connection: keep-alive\r\n"));
        assert!(out.ends_with("\r\n\r\nInternal Server Error"));
    }

    #[test]
    fn test_internal_error_head_only() {
        let out = error_output(StatusCode::InternalServerError, false);

        assert!(out.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(out.contains("Content-Length: 21\r\n"));
        assert!(out.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_directory_serves_index() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.html"), "root index").unwrap();

        let (status, out) = serve(dir.path(), true, true);

        assert_eq!(status, StatusCode::Ok);
        assert!(out.contains("Content-Length: 10\r\n"));
        assert!(out.ends_with("root index"));
    }

    #[test]
    fn test_directory_without_index_is_404() {
        let dir = TempDir::new().unwrap();
        let (status, _) = serve(dir.path(), true, true);
        assert_eq!(status, StatusCode::NotFound);
    }

    #[test]
    fn test_index_that_is_a_directory_recurses() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("index.html");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("index.html"), "nested").unwrap();

        let (status, out) = serve(dir.path(), true, true);
        assert_eq!(status, StatusCode::Ok);
        assert!(out.ends_with("nested"));
    }

    #[test]
    fn test_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.txt");
        fs::write(&path, "").unwrap();

        let (status, out) = serve(&path, true, true);
        assert_eq!(status, StatusCode::Ok);
        assert!(out.contains("Content-Length: 0\r\n"));
        assert!(out.ends_with("\r\n\r\n"));
    }
}
