//! # Pool Adaptativo de Workers
//! src/workers/pool.rs
//!
//! Workers que consumen la cola de jobs y crecen cuando los jobs esperan
//! demasiado. Nunca se achica.
//!
//! ## Ciclo de un worker
//!
//! ```text
//! ┌─► ¿shutdown? ── sí ──► fin
//! │       │ no
//! │   spin / siesta (IdlePolicy) ── sin job ──┐
//! │       │ job                               │
//! │   wait = now - enqueued_at                │
//! │   EWMA(wait)                              │
//! │   wait > umbral && threads < max → scale_up
//! │   handler(job)                            │
//! └───────┴───────────────────────────────────┘
//! ```
//!
//! ## Escalado
//!
//! Todo el estado de escalado (promedio, último scale-up, handles) vive bajo
//! un único mutex. Un scale-up se concede solo si pasó el cooldown desde el
//! anterior, así que varios workers disparando a la vez producen un único
//! thread nuevo por ventana.

use crate::config::Config;
use crate::error::{Result, ServerError};
use crate::jobs::{now_ms, Job, JobQueue};
use crate::workers::idle::IdlePolicy;
use serde::Serialize;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pausa del productor cuando la cola está llena
const SUBMIT_BACKOFF: Duration = Duration::from_millis(1);

/// Lo que un worker hace con cada job (en el servidor: atender la conexión)
pub type Handler = Arc<dyn Fn(Job) + Send + Sync>;

/// Parámetros del pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_threads: usize,
    pub max_threads: usize,

    /// Factor de suavizado del promedio de espera, en (0, 1]
    pub alpha: f64,

    /// Espera a partir de la cual un worker pide crecer
    pub scale_threshold_ms: u64,

    /// Tiempo mínimo entre dos scale-ups
    pub cooldown_ms: u64,

    pub idle: IdlePolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_threads: 4,
            max_threads: 64,
            alpha: 0.3,
            scale_threshold_ms: 50,
            cooldown_ms: 1000,
            idle: IdlePolicy::default(),
        }
    }
}

impl PoolConfig {
    /// Crea una configuración desde el Config principal
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_threads: config.min_threads,
            max_threads: config.max_threads,
            alpha: config.ewma_alpha,
            scale_threshold_ms: config.scale_threshold_ms,
            cooldown_ms: config.scale_cooldown_ms,
            idle: IdlePolicy::from_config(config),
        }
    }
}

/// Snapshot del estado del pool (diagnóstico)
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub thread_count: usize,
    pub min_threads: usize,
    pub max_threads: usize,
    pub avg_wait_ms: f64,
    pub active_workers: usize,
    pub queue_depth: usize,
    pub scale_ups: u64,
}

/// Estado protegido por el mutex de escalado
struct ScalingState {
    avg_wait_ms: f64,

    /// `None` hasta el primer scale-up (el cooldown no aplica)
    last_scale: Option<u64>,

    /// Handles en orden de arranque; solo crece
    handles: Vec<JoinHandle<()>>,

    scale_ups: u64,
    next_worker_id: usize,
}

/// Estado compartido entre el pool y sus workers
struct Shared {
    queue: Arc<JobQueue>,
    handler: Handler,
    config: PoolConfig,
    scaling: Mutex<ScalingState>,

    /// Copia legible sin lock; solo se modifica con `scaling` tomado
    thread_count: AtomicUsize,

    /// Workers ejecutando un job en este momento
    active_workers: AtomicUsize,

    shutdown: AtomicBool,
}

/// Pool de workers de tamaño creciente entre `min_threads` y `max_threads`
pub struct WorkerPool {
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Arranca `min_threads` workers sobre `queue`
    ///
    /// Si algún thread no se puede crear, los ya arrancados se detienen y se
    /// retorna `ServerError::Spawn`.
    pub fn new(queue: Arc<JobQueue>, handler: Handler, config: PoolConfig) -> Result<Self> {
        if config.min_threads == 0 || config.max_threads < config.min_threads {
            return Err(ServerError::Config(format!(
                "invalid pool bounds: min={} max={}",
                config.min_threads, config.max_threads
            )));
        }

        let min_threads = config.min_threads;
        let shared = Arc::new(Shared {
            queue,
            handler,
            config,
            scaling: Mutex::new(ScalingState {
                avg_wait_ms: 0.0,
                last_scale: None,
                handles: Vec::with_capacity(min_threads),
                scale_ups: 0,
                next_worker_id: 0,
            }),
            thread_count: AtomicUsize::new(0),
            active_workers: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
        });

        let pool = Self { shared };

        for _ in 0..min_threads {
            let spawned = {
                let mut state = pool.shared.lock_scaling();
                Shared::spawn_worker(&pool.shared, &mut state)
            };

            if let Err(e) = spawned {
                pool.shutdown();
                return Err(ServerError::Spawn(e));
            }
        }

        info!(threads = min_threads, "worker pool started");
        Ok(pool)
    }

    /// Encola un job; si la cola está llena pide crecer, duerme 1 ms y
    /// reintenta
    ///
    /// Solo debe llamarse desde un único thread (la cola es de un solo
    /// productor). Devuelve el job únicamente si el pool se está apagando.
    pub fn submit(&self, job: Job) -> std::result::Result<(), Job> {
        let mut job = job;

        loop {
            match self.shared.queue.enqueue(job) {
                Ok(()) => return Ok(()),
                Err(rejected) => {
                    if self.shared.shutdown.load(Ordering::Acquire) {
                        return Err(rejected);
                    }
                    if self.thread_count() < self.shared.config.max_threads {
                        self.scale_up();
                    }
                    thread::sleep(SUBMIT_BACKOFF);
                    job = rejected;
                }
            }
        }
    }

    /// Incorpora una muestra de espera al promedio y lo retorna
    pub fn observe_wait(&self, wait_ms: u64) -> f64 {
        self.shared.observe_wait(wait_ms)
    }

    /// Intenta agregar un worker ahora
    pub fn scale_up(&self) -> bool {
        self.scale_up_at(now_ms())
    }

    /// Intenta agregar un worker como si el reloj marcara `now`
    ///
    /// Retorna `true` si se concedió y el thread arrancó.
    pub fn scale_up_at(&self, now: u64) -> bool {
        Shared::scale_up_at(&self.shared, now)
    }

    pub fn thread_count(&self) -> usize {
        self.shared.thread_count.load(Ordering::Acquire)
    }

    pub fn active_workers(&self) -> usize {
        self.shared.active_workers.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared.lock_scaling();

        PoolStats {
            thread_count: self.thread_count(),
            min_threads: self.shared.config.min_threads,
            max_threads: self.shared.config.max_threads,
            avg_wait_ms: state.avg_wait_ms,
            active_workers: self.active_workers(),
            queue_depth: self.shared.queue.size_approx(),
            scale_ups: state.scale_ups,
        }
    }

    /// Detiene el pool: marca el flag y hace join de todos los workers en
    /// orden de arranque, incluidos los que arranquen mientras tanto
    ///
    /// Los requests en curso terminan normalmente. Es idempotente.
    pub fn shutdown(&self) {
        let first = !self.shared.shutdown.swap(true, Ordering::AcqRel);

        loop {
            let handles = std::mem::take(&mut self.shared.lock_scaling().handles);
            if handles.is_empty() {
                break;
            }

            for handle in handles {
                let name = handle.thread().name().unwrap_or("worker").to_string();
                if handle.join().is_err() {
                    warn!(worker = %name, "worker panicked");
                }
            }
        }

        if first {
            info!(threads = self.thread_count(), "worker pool stopped");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn lock_scaling(&self) -> MutexGuard<'_, ScalingState> {
        // Un worker que entró en pánico no deja el estado a medias: todas las
        // secciones críticas son asignaciones simples
        self.scaling.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn observe_wait(&self, wait_ms: u64) -> f64 {
        let alpha = self.config.alpha;
        let mut state = self.lock_scaling();
        state.avg_wait_ms = alpha * wait_ms as f64 + (1.0 - alpha) * state.avg_wait_ms;
        state.avg_wait_ms
    }

    fn scale_up_at(this: &Arc<Self>, now: u64) -> bool {
        let mut state = this.lock_scaling();

        if this.shutdown.load(Ordering::Acquire) {
            return false;
        }
        if this.thread_count.load(Ordering::Acquire) >= this.config.max_threads {
            return false;
        }
        if let Some(last) = state.last_scale {
            if now.saturating_sub(last) < this.config.cooldown_ms {
                return false;
            }
        }

        match Self::spawn_worker(this, &mut state) {
            Ok(()) => {
                state.last_scale = Some(now);
                state.scale_ups += 1;
                info!(
                    threads = this.thread_count.load(Ordering::Acquire),
                    avg_wait_ms = state.avg_wait_ms,
                    "scaled up worker pool"
                );
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to spawn worker");
                false
            }
        }
    }

    /// Arranca un worker más; se llama con `scaling` tomado
    ///
    /// El contador se incrementa antes del spawn y se revierte si falla.
    fn spawn_worker(this: &Arc<Self>, state: &mut ScalingState) -> io::Result<()> {
        let id = state.next_worker_id;
        this.thread_count.fetch_add(1, Ordering::AcqRel);

        let shared = Arc::clone(this);
        let spawned = thread::Builder::new()
            .name(format!("worker-{}", id))
            .spawn(move || worker_loop(shared, id));

        match spawned {
            Ok(handle) => {
                state.next_worker_id += 1;
                state.handles.push(handle);
                Ok(())
            }
            Err(e) => {
                this.thread_count.fetch_sub(1, Ordering::AcqRel);
                Err(e)
            }
        }
    }
}

/// Loop principal del worker
fn worker_loop(shared: Arc<Shared>, id: usize) {
    debug!(worker = id, "worker started");

    while !shared.shutdown.load(Ordering::Acquire) {
        let Some(job) = shared.config.idle.next_job(&shared.queue) else {
            continue;
        };

        let wait = job.wait_ms(now_ms());
        shared.observe_wait(wait);

        if wait > shared.config.scale_threshold_ms
            && shared.thread_count.load(Ordering::Acquire) < shared.config.max_threads
        {
            Shared::scale_up_at(&shared, now_ms());
        }

        shared.active_workers.fetch_add(1, Ordering::Relaxed);
        (shared.handler)(job);
        shared.active_workers.fetch_sub(1, Ordering::Relaxed);
    }

    debug!(worker = id, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::os::fd::OwnedFd;
    use std::sync::Condvar;
    use std::time::Instant;

    fn dev_null_job(enqueued_at_ms: u64) -> Job {
        let fd = OwnedFd::from(File::open("/dev/null").unwrap());
        Job::from_fd(fd, enqueued_at_ms, true, Duration::from_secs(1))
    }

    fn noop() -> Handler {
        Arc::new(|_job: Job| {})
    }

    fn config(min: usize, max: usize) -> PoolConfig {
        PoolConfig {
            min_threads: min,
            max_threads: max,
            ..PoolConfig::default()
        }
    }

    fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let started = Instant::now();
        while started.elapsed() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn test_starts_min_threads() {
        let pool = WorkerPool::new(Arc::new(JobQueue::new(16)), noop(), config(3, 8)).unwrap();
        assert_eq!(pool.thread_count(), 3);
        pool.shutdown();
    }

    #[test]
    fn test_invalid_bounds() {
        let result = WorkerPool::new(Arc::new(JobQueue::new(16)), noop(), config(4, 2));
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[test]
    fn test_ewma_rises_monotonically_toward_sample() {
        let pool = WorkerPool::new(Arc::new(JobQueue::new(16)), noop(), config(1, 1)).unwrap();

        let first = pool.observe_wait(100);
        assert!((first - 30.0).abs() < 1e-9);

        let mut previous = first;
        for _ in 0..30 {
            let avg = pool.observe_wait(100);
            assert!(avg > previous);
            assert!(avg <= 100.0);
            previous = avg;
        }
        assert!(previous > 99.0);
    }

    #[test]
    fn test_one_scale_up_per_cooldown_window() {
        let pool = Arc::new(
            WorkerPool::new(Arc::new(JobQueue::new(16)), noop(), config(1, 16)).unwrap(),
        );
        let now = 10_000;

        let granted: usize = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || pool.scale_up_at(now))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();

        assert_eq!(granted, 1);
        assert_eq!(pool.thread_count(), 2);

        // Dentro de la ventana: rechazado; al cumplirse: concedido
        assert!(!pool.scale_up_at(now + 999));
        assert!(pool.scale_up_at(now + 1000));
        assert_eq!(pool.thread_count(), 3);
        assert_eq!(pool.stats().scale_ups, 2);

        pool.shutdown();
    }

    #[test]
    fn test_growth_capped_at_max() {
        let pool = WorkerPool::new(Arc::new(JobQueue::new(16)), noop(), config(1, 2)).unwrap();

        assert!(pool.scale_up_at(0));
        assert!(!pool.scale_up_at(50_000));
        assert_eq!(pool.thread_count(), 2);
        pool.shutdown();
    }

    #[test]
    fn test_submit_runs_handler() {
        let done = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&done);
        let handler: Handler = Arc::new(move |_job: Job| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let pool = WorkerPool::new(Arc::new(JobQueue::new(8)), handler, config(2, 4)).unwrap();

        // Más jobs que la capacidad: submit tiene que esperar a los workers
        for _ in 0..50 {
            pool.submit(dev_null_job(now_ms())).unwrap();
        }

        assert!(wait_until(Duration::from_secs(5), || done.load(Ordering::SeqCst) == 50));
        pool.shutdown();
    }

    #[test]
    fn test_full_queue_grows_pool_from_submit() {
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        let done = Arc::new(AtomicUsize::new(0));

        let (handler_gate, counter) = (Arc::clone(&gate), Arc::clone(&done));
        let handler: Handler = Arc::new(move |_job: Job| {
            let (open, cvar) = &*handler_gate;
            let mut open = open.lock().unwrap();
            while !*open {
                open = cvar.wait(open).unwrap();
            }
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // Umbral inalcanzable: solo submit puede pedir crecer
        let pool_config = PoolConfig {
            scale_threshold_ms: u64::MAX,
            ..config(1, 4)
        };
        let pool = Arc::new(
            WorkerPool::new(Arc::new(JobQueue::new(4)), handler, pool_config).unwrap(),
        );

        // Un job bloquea al único worker y 3 llenan la cola; el resto obliga
        // a submit a crecer
        let producer = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                for _ in 0..6 {
                    pool.submit(dev_null_job(now_ms())).unwrap();
                }
            })
        };

        assert!(wait_until(Duration::from_secs(2), || pool.thread_count() > 1));
        assert!(pool.stats().scale_ups >= 1);

        {
            let (open, cvar) = &*gate;
            *open.lock().unwrap() = true;
            cvar.notify_all();
        }
        producer.join().unwrap();

        assert!(wait_until(Duration::from_secs(5), || done.load(Ordering::SeqCst) == 6));
        pool.shutdown();
    }

    #[test]
    fn test_long_wait_triggers_scale_up() {
        let pool = WorkerPool::new(Arc::new(JobQueue::new(16)), noop(), config(1, 4)).unwrap();

        // Encolado "hace" más de 50 ms: la espera supera el umbral
        let enqueued_at = now_ms();
        thread::sleep(Duration::from_millis(60));
        pool.submit(dev_null_job(enqueued_at)).unwrap();

        assert!(wait_until(Duration::from_secs(2), || pool.thread_count() >= 2));
        assert!(pool.stats().avg_wait_ms > 0.0);
        pool.shutdown();
    }

    #[test]
    fn test_shutdown_joins_and_refuses_growth() {
        let queue = Arc::new(JobQueue::new(2));
        let pool = WorkerPool::new(Arc::clone(&queue), noop(), config(2, 4)).unwrap();

        pool.shutdown();
        assert!(pool.is_shutting_down());
        assert!(!pool.scale_up_at(1_000_000));

        // Sin workers la cola se llena y submit devuelve el job
        queue.enqueue(dev_null_job(0)).unwrap();
        assert!(pool.submit(dev_null_job(0)).is_err());

        // Idempotente
        pool.shutdown();
    }

    #[test]
    fn test_stats_serialize() {
        let pool = WorkerPool::new(Arc::new(JobQueue::new(16)), noop(), config(1, 2)).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.min_threads, 1);
        assert_eq!(stats.max_threads, 2);

        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"thread_count\":1"));
        pool.shutdown();
    }

    #[test]
    fn test_pool_config_from_config() {
        let mut cfg = Config::default();
        cfg.min_threads = 2;
        cfg.max_threads = 10;
        cfg.scale_cooldown_ms = 250;

        let pool_config = PoolConfig::from_config(&cfg);
        assert_eq!(pool_config.min_threads, 2);
        assert_eq!(pool_config.max_threads, 10);
        assert_eq!(pool_config.cooldown_ms, 250);
        assert!((pool_config.alpha - 0.3).abs() < 1e-9);
    }
}
