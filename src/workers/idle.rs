//! # Política de Espera de Workers
//! src/workers/idle.rs
//!
//! Un worker sin trabajo primero insiste (spin) y solo después duerme. Con
//! carga sostenida casi nunca llega a dormir; en reposo no quema CPU.

use crate::config::Config;
use crate::jobs::{Job, JobQueue};
use std::thread;
use std::time::Duration;

/// Estrategia de dos fases para esperar jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdlePolicy {
    /// Intentos de `dequeue` antes de dormir
    pub spin_attempts: u32,

    /// Siesta tras agotar los intentos
    pub idle_sleep: Duration,
}

impl Default for IdlePolicy {
    fn default() -> Self {
        Self {
            spin_attempts: 1000,
            idle_sleep: Duration::from_millis(1),
        }
    }
}

impl IdlePolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            spin_attempts: config.spin_attempts,
            idle_sleep: Duration::from_micros(config.idle_sleep_us),
        }
    }

    /// Una ronda de espera: hasta `spin_attempts` intentos con pista de spin
    /// entre ellos y, si la cola siguió vacía, una siesta de `idle_sleep`
    ///
    /// `None` significa que la ronda terminó sin trabajo; el llamador vuelve
    /// a revisar el flag de shutdown antes de la siguiente.
    pub fn next_job(&self, queue: &JobQueue) -> Option<Job> {
        for _ in 0..self.spin_attempts.max(1) {
            if let Some(job) = queue.dequeue() {
                return Some(job);
            }
            std::hint::spin_loop();
        }

        thread::sleep(self.idle_sleep);
        None
    }
}
