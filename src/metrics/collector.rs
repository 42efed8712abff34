//! # Collector de Métricas
//! src/metrics/collector.rs
//!
//! Recolecta y agrega métricas del servidor en tiempo real.

use crate::http::StatusCode;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Latencias que se conservan para calcular percentiles
pub const LATENCY_WINDOW: usize = 10_000;

/// Collector de métricas thread-safe
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsData>>,
    start_time: Instant,
}

/// Datos internos de métricas
struct MetricsData {
    /// Contador total de intercambios request/response
    total_requests: u64,

    /// Conexiones atendidas por algún worker
    connections: u64,

    /// Requests por código de estado (ordenado para un JSON estable)
    status_codes: BTreeMap<u16, u64>,

    /// Últimas latencias registradas (en microsegundos)
    latencies: VecDeque<u64>,
}

impl MetricsCollector {
    /// Crea un nuevo collector de métricas
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsData {
                total_requests: 0,
                connections: 0,
                status_codes: BTreeMap::new(),
                latencies: VecDeque::with_capacity(LATENCY_WINDOW),
            })),
            start_time: Instant::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MetricsData> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registra un intercambio completo
    pub fn record_request(&self, status: StatusCode, latency: Duration) {
        let mut data = self.lock();

        data.total_requests += 1;
        *data.status_codes.entry(status.as_u16()).or_insert(0) += 1;

        // Ventana deslizante: se descarta la más antigua
        if data.latencies.len() >= LATENCY_WINDOW {
            data.latencies.pop_front();
        }
        data.latencies.push_back(latency.as_micros() as u64);
    }

    /// Registra una conexión tomada por un worker
    pub fn record_connection(&self) {
        self.lock().connections += 1;
    }

    /// Obtiene un snapshot de las métricas
    pub fn snapshot(&self) -> MetricsSnapshot {
        let data = self.lock();
        let (p50, p95, p99, avg) = calculate_percentiles(&data.latencies);

        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            total_requests: data.total_requests,
            connections: data.connections,
            status_codes: data.status_codes.clone(),
            latency_p50_us: p50,
            latency_p95_us: p95,
            latency_p99_us: p99,
            latency_avg_us: avg,
            latency_samples: data.latencies.len(),
        }
    }

    /// Snapshot en formato JSON
    pub fn to_json(&self) -> String {
        self.snapshot().to_json()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Calcula percentiles de latencia (p50, p95, p99, promedio)
fn calculate_percentiles(latencies: &VecDeque<u64>) -> (u64, u64, u64, u64) {
    if latencies.is_empty() {
        return (0, 0, 0, 0);
    }

    let mut sorted: Vec<u64> = latencies.iter().copied().collect();
    sorted.sort_unstable();

    let len = sorted.len();
    let p50 = sorted[len * 50 / 100];
    let p95 = sorted[len * 95 / 100];
    let p99 = sorted[len * 99 / 100];

    let sum: u64 = sorted.iter().sum();
    let avg = sum / len as u64;

    (p50, p95, p99, avg)
}

/// Snapshot de métricas (para uso externo)
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub total_requests: u64,
    pub connections: u64,
    pub status_codes: BTreeMap<u16, u64>,
    pub latency_p50_us: u64,
    pub latency_p95_us: u64,
    pub latency_p99_us: u64,
    pub latency_avg_us: u64,
    pub latency_samples: usize,
}

impl MetricsSnapshot {
    pub fn to_json(&self) -> String {
        // Un struct de campos simples siempre serializa
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Respuestas con un status dado
    pub fn count(&self, status: StatusCode) -> u64 {
        self.status_codes.get(&status.as_u16()).copied().unwrap_or(0)
    }
}
