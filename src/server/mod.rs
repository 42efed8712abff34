//! # Módulo del Servidor HTTP
//! src/server/mod.rs
//!
//! - `tcp`: listener, loop de accept y contexto `Server`
//! - `connection`: loop de requests de una conexión persistente
//! - `files`: envío de archivos (404 / 500 / índice de directorio)
//! - `io`: escritura y espera sobre sockets non-blocking, `sendfile`

pub mod connection;
pub mod files;
pub mod io;
pub mod tcp;

// Re-exportar para facilitar el uso
pub use connection::ConnectionHandler;
pub use tcp::{Listener, Server, ShutdownHandle};
