//! # Static Server
//! src/lib.rs
//!
//! Servidor HTTP/1.1 de archivos estáticos. Un thread acepta conexiones y
//! las encola en un ring buffer lock-free; un pool de workers que crece con
//! el tiempo de espera las atiende con keep-alive.
//!
//! ## Arquitectura
//!
//! El servidor está dividido en módulos especializados:
//! - `http`: Parsing de requests y construcción de respuestas HTTP/1.1
//! - `jobs`: El `Job` (conexión aceptada) y la cola lock-free
//! - `workers`: Pool adaptativo de workers
//! - `resolver`: Confinamiento de paths al document root
//! - `server`: Listener, loop por conexión y envío de archivos
//! - `metrics`: Recolección de métricas
//! - `config` / `error`: Configuración CLI y errores de inicialización
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use static_server::config::Config;
//! use static_server::server::Server;
//!
//! let config = Config::default();
//! let server = Server::new(&config).expect("Error al iniciar servidor");
//! server.run().expect("Error en el servidor");
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod jobs;
pub mod metrics;
pub mod resolver;
pub mod server;
pub mod workers;

pub use error::{Result, ServerError};
