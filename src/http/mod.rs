//! # Módulo HTTP
//!
//! Implementa la parte de HTTP/1.1 que necesita un servidor de archivos
//! estáticos, sin librerías de alto nivel:
//!
//! - Parsing de la request line y de los headers `Connection` /
//!   `Content-Length`
//! - Construcción del head de las respuestas
//! - Códigos de estado y tipos MIME
//!
//! ### Formato de Request
//!
//! ```text
//! GET /path HTTP/1.1\r\n
//! Connection: keep-alive\r\n
//! \r\n
//! ```
//!
//! ### Formato de Response
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! Content-Type: text/html\r\n
//! Content-Length: 13\r\n
//! Connection: keep-alive\r\n
//! \r\n
//! ```
//!
//! No hay chunked encoding ni bodies de request más allá del header
//! `Content-Length`.

pub mod mime;
pub mod request;
pub mod response;
pub mod status;

pub use request::{Method, ParseError, Request};
pub use response::Response;
pub use status::StatusCode;
