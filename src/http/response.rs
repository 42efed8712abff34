//! # Construcción de Respuestas HTTP
//!
//! Este módulo construye el head de las respuestas HTTP/1.1 (y el body de
//! las respuestas de error). El body de un archivo nunca pasa por aquí: se
//! transfiere con `sendfile` directamente desde el descriptor.
//!
//! ## Formato de una respuesta
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! Content-Type: text/html\r\n
//! Content-Length: 13\r\n
//! Connection: keep-alive\r\n
//! \r\n
//! <h1>hola</h1>
//! ```
//!
//! ## Ejemplo de uso
//!
//! ```
//! use static_server::http::{Response, StatusCode};
//!
//! let response = Response::new(StatusCode::Ok)
//!     .with_header("Content-Type", "text/plain")
//!     .with_body("Hello");
//!
//! let bytes = response.to_bytes();
//! assert!(bytes.starts_with(b"HTTP/1.1 200 OK\r\n"));
//! ```

use super::StatusCode;

/// Representa una respuesta HTTP/1.1
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,

    /// Headers en orden de inserción (sin duplicados)
    headers: Vec<(String, String)>,

    body: Vec<u8>,
}

impl Response {
    /// Crea una respuesta sin headers ni body
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Agrega un header; si ya existe (sin distinguir mayúsculas), se
    /// sobrescribe en su posición original
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.add_header(name, value);
        self
    }

    /// Versión mutable de `with_header`
    pub fn add_header(&mut self, name: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    /// Establece el body y el header `Content-Length`
    pub fn with_body(mut self, body: &str) -> Self {
        self.body = body.as_bytes().to_vec();
        let len = self.body.len().to_string();
        self.add_header("Content-Length", &len);
        self
    }

    /// Agrega `Connection: keep-alive|close`
    pub fn with_connection(self, keep_alive: bool) -> Self {
        self.with_header("Connection", connection_directive(keep_alive))
    }

    /// Respuesta de error: el body es la reason phrase en texto plano
    ///
    /// # Ejemplo
    /// ```
    /// use static_server::http::{Response, StatusCode};
    ///
    /// let response = Response::error(StatusCode::NotFound, true);
    /// assert_eq!(response.body(), b"Not Found");
    /// ```
    pub fn error(status: StatusCode, keep_alive: bool) -> Self {
        Self::new(status)
            .with_header("Content-Type", "text/plain")
            .with_body(status.reason_phrase())
            .with_connection(keep_alive)
    }

    /// Head de un 200 para un archivo de `len` bytes; el body va aparte
    pub fn file_header(mime: &str, len: u64, keep_alive: bool) -> Self {
        Self::new(StatusCode::Ok)
            .with_header("Content-Type", mime)
            .with_header("Content-Length", &len.to_string())
            .with_connection(keep_alive)
    }

    /// Serializa status line, headers, línea vacía y body
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut result = self.head_bytes();
        result.extend_from_slice(&self.body);
        result
    }

    /// Solo status line, headers y línea vacía (respuestas a HEAD)
    ///
    /// `Content-Length` sigue anunciando el largo del body omitido.
    pub fn head_bytes(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(128 + self.body.len());

        // 1. Status line
        result.extend_from_slice(format!("HTTP/1.1 {}\r\n", self.status).as_bytes());

        // 2. Headers
        for (name, value) in &self.headers {
            result.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }

        // 3. Línea vacía
        result.extend_from_slice(b"\r\n");

        result
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Busca un header sin distinguir mayúsculas
    #[cfg(test)]
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// Valor del header `Connection`
pub fn connection_directive(keep_alive: bool) -> &'static str {
    if keep_alive {
        "keep-alive"
    } else {
        "close"
    }
}
