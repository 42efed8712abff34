//! # Jobs y Cola de Despacho
//! src/jobs/mod.rs
//!
//! Un `Job` es una conexión aceptada esperando worker. La `JobQueue` es el
//! único punto de contacto entre el dispatcher y el pool.

pub mod job;
pub mod queue;

pub use job::{now_ms, Job};
pub use queue::JobQueue;
