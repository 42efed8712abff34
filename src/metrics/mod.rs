//! # Sistema de Métricas
//! src/metrics/mod.rs
//!
//! Recolección y agregación de métricas del servidor:
//! - Contadores de requests por código de estado
//! - Conexiones atendidas
//! - Latencias (p50, p95, p99)
//!
//! El estado del pool (threads, espera promedio) lo reporta `workers::PoolStats`.

pub mod collector;

pub use collector::{MetricsCollector, MetricsSnapshot};
