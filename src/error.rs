//! # Errores del Servidor
//! src/error.rs
//!
//! Errores fatales de inicialización. Los errores por request nunca llegan
//! aquí: se traducen a un código HTTP o a cerrar la conexión.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Fallos que abortan el arranque del servidor (exit != 0)
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuración inválida (ver `Config::validate`)
    #[error("invalid configuration: {0}")]
    Config(String),

    /// El document root no existe o no se puede canonicalizar
    #[error("invalid document root {}: {source}", path.display())]
    InvalidRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No se pudo abrir el socket de escucha
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// No se pudo crear un thread del pool
    #[error("cannot spawn worker thread: {0}")]
    Spawn(#[source] io::Error),

    /// No se pudo instalar el handler de SIGINT/SIGTERM
    #[error("cannot install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
