//! # Workers
//! src/workers/mod.rs
//!
//! Pool de threads que consume la cola de jobs:
//! - `idle`: cómo espera un worker sin trabajo
//! - `pool`: arranque, escalado por tiempo de espera y shutdown

pub mod idle;
pub mod pool;

pub use idle::IdlePolicy;
pub use pool::{Handler, PoolConfig, PoolStats, WorkerPool};
