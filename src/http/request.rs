//! # Parsing de Requests HTTP/1.1
//! src/http/request.rs
//!
//! Parser mínimo para el servidor de archivos. Solo interesa la request line
//! y dos headers: `Connection` y `Content-Length`.
//!
//! ## Formato de un Request
//!
//! ```text
//! GET /index.html HTTP/1.1\r\n
//! Host: localhost:8080\r\n
//! Connection: keep-alive\r\n
//! \r\n
//! ```
//!
//! ## Limitaciones
//!
//! - El head completo debe llegar en un solo `read`; no se reensamblan
//!   headers repartidos en varias lecturas.
//! - Cada token de la request line tiene una longitud máxima fija.
//! - `Content-Length` se parsea como entero pero no se valida más.

use thiserror::Error;

/// Longitud máxima del método
pub const MAX_METHOD_LEN: usize = 7;

/// Longitud máxima del path
pub const MAX_PATH_LEN: usize = 255;

/// Longitud máxima de la versión
pub const MAX_VERSION_LEN: usize = 15;

const CRLF: &[u8] = b"\r\n";

/// Métodos HTTP
///
/// Cualquier método se parsea; solo GET y HEAD se atienden, el resto
/// recibe 405.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    /// GET - Obtener un recurso
    GET,

    /// HEAD - Como GET pero solo retorna headers
    HEAD,

    /// Cualquier otro método (POST, PUT, ...)
    Other(String),
}

impl Method {
    fn from_token(token: &str) -> Self {
        match token {
            "GET" => Method::GET,
            "HEAD" => Method::HEAD,
            other => Method::Other(other.to_string()),
        }
    }

    /// Convierte el método a string
    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::Other(name) => name,
        }
    }

    /// GET y HEAD son los únicos métodos que sirven archivos
    pub fn is_supported(&self) -> bool {
        matches!(self, Method::GET | Method::HEAD)
    }
}

/// Errores que pueden ocurrir durante el parsing
///
/// Cualquiera de ellos termina la conexión.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Buffer vacío (el peer cerró)
    #[error("empty request")]
    Empty,

    /// La request line no termina en CRLF dentro del buffer
    #[error("request line is not CRLF-terminated")]
    MissingLineTerminator,

    /// Faltan tokens en la request line
    #[error("invalid request line format")]
    InvalidRequestLine,

    /// Un token excede su longitud máxima
    #[error("{field} longer than {max} bytes")]
    TokenTooLong { field: &'static str, max: usize },

    /// La request line no es UTF-8
    #[error("request line is not valid UTF-8")]
    InvalidUtf8,
}

/// Un request parseado
///
/// Se parsea de nuevo para cada intercambio de una conexión persistente.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,

    /// Request target tal cual llegó (puede incluir query string)
    path: String,

    /// Versión HTTP declarada ("HTTP/1.1", "HTTP/1.0", ...)
    version: String,

    /// Keep-alive efectivo: default por versión, sobrescrito por `Connection`
    keep_alive: bool,

    content_length: usize,

    /// Bytes consumidos del buffer por la request line y los headers
    head_len: usize,

    /// Si se encontró la línea vacía que cierra los headers
    head_complete: bool,
}

impl Request {
    /// Parsea un request desde los bytes de una sola lectura
    ///
    /// # Ejemplo
    ///
    /// ```
    /// use static_server::http::Request;
    ///
    /// let raw = b"GET /index.html HTTP/1.1\r\nConnection: close\r\n\r\n";
    /// let request = Request::parse(raw).unwrap();
    ///
    /// assert_eq!(request.path(), "/index.html");
    /// assert!(!request.keep_alive());
    /// ```
    pub fn parse(buffer: &[u8]) -> Result<Self, ParseError> {
        if buffer.is_empty() {
            return Err(ParseError::Empty);
        }

        // 1. Request line (debe terminar en CRLF)
        let line_end = find_crlf(buffer, 0).ok_or(ParseError::MissingLineTerminator)?;
        let (method, path, version) = Self::parse_request_line(&buffer[..line_end])?;

        // Solo HTTP/1.1 es persistente por defecto
        let mut request = Request {
            keep_alive: version == "HTTP/1.1",
            method,
            path,
            version,
            content_length: 0,
            head_len: line_end + CRLF.len(),
            head_complete: false,
        };

        // 2. Headers, línea por línea hasta la línea vacía
        request.parse_headers(buffer);

        Ok(request)
    }

    /// Tokeniza `METHOD PATH VERSION`
    fn parse_request_line(line: &[u8]) -> Result<(Method, String, String), ParseError> {
        let line = std::str::from_utf8(line).map_err(|_| ParseError::InvalidUtf8)?;
        let mut tokens = line.split_ascii_whitespace();

        let (method, path, version) = match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(m), Some(p), Some(v)) => (m, p, v),
            _ => return Err(ParseError::InvalidRequestLine),
        };

        check_len("method", method, MAX_METHOD_LEN)?;
        check_len("path", path, MAX_PATH_LEN)?;
        check_len("version", version, MAX_VERSION_LEN)?;

        Ok((Method::from_token(method), path.to_string(), version.to_string()))
    }

    /// Recorre los headers actualizando `keep_alive` y `content_length`
    ///
    /// Se detiene en la primera línea vacía o cuando no queda otra línea
    /// terminada en CRLF.
    fn parse_headers(&mut self, buffer: &[u8]) {
        let mut pos = self.head_len;

        while let Some(end) = find_crlf(buffer, pos) {
            let line = &buffer[pos..end];
            pos = end + CRLF.len();

            if line.is_empty() {
                self.head_complete = true;
                break;
            }

            let Some(colon) = line.iter().position(|&b| b == b':') else {
                continue;
            };
            let name = line[..colon].trim_ascii();
            let value = line[colon + 1..].trim_ascii();

            if name.eq_ignore_ascii_case(b"Connection") {
                if value.eq_ignore_ascii_case(b"close") {
                    self.keep_alive = false;
                } else if value.eq_ignore_ascii_case(b"keep-alive") {
                    self.keep_alive = true;
                }
            } else if name.eq_ignore_ascii_case(b"Content-Length") {
                self.content_length = parse_leading_int(value);
            }
        }

        self.head_len = pos;
    }

    // === Métodos públicos para acceder a los campos ===

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request target completo, con query string si la hay
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path sin query string ni fragmento (lo que se resuelve en disco)
    ///
    /// ```
    /// use static_server::http::Request;
    ///
    /// let request = Request::parse(b"GET /app.js?v=3 HTTP/1.1\r\n\r\n").unwrap();
    /// assert_eq!(request.file_path(), "/app.js");
    /// ```
    pub fn file_path(&self) -> &str {
        let end = self.path.find(['?', '#']).unwrap_or(self.path.len());
        &self.path[..end]
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Fuerza el cierre tras este intercambio (p. ej. al llegar al máximo de
    /// requests por conexión)
    pub fn disable_keep_alive(&mut self) {
        self.keep_alive = false;
    }

    pub fn content_length(&self) -> usize {
        self.content_length
    }

    /// Bytes del buffer que ocupan la request line y los headers
    pub fn head_len(&self) -> usize {
        self.head_len
    }

    /// `true` si los headers terminaron con la línea vacía
    pub fn head_complete(&self) -> bool {
        self.head_complete
    }
}

fn check_len(field: &'static str, token: &str, max: usize) -> Result<(), ParseError> {
    if token.len() > max {
        return Err(ParseError::TokenTooLong { field, max });
    }
    Ok(())
}

/// Posición del próximo CRLF a partir de `from`
fn find_crlf(buffer: &[u8], from: usize) -> Option<usize> {
    buffer
        .get(from..)?
        .windows(CRLF.len())
        .position(|w| w == CRLF)
        .map(|i| from + i)
}

/// Entero al estilo `atoi`: espacios iniciales, signo opcional, dígitos.
/// Basura o negativos dan 0.
fn parse_leading_int(value: &[u8]) -> usize {
    let value = value.trim_ascii_start();
    let (negative, digits) = match value.first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    };

    let mut n: usize = 0;
    for &b in digits.iter().take_while(|b| b.is_ascii_digit()) {
        n = n.saturating_mul(10).saturating_add((b - b'0') as usize);
    }

    if negative {
        0
    } else {
        n
    }
}
