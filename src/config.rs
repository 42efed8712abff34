//! # Configuración del Servidor
//! src/config.rs
//!
//! Configuración del servidor de archivos estáticos con soporte para
//! argumentos CLI y variables de entorno.
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./static_server --port 8080 \
//!   --root ./www \
//!   --min-threads 4 \
//!   --max-threads 64 \
//!   --queue-capacity 1024
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! HTTP_PORT=8080 DOC_ROOT=/srv/www ./static_server
//! ```

use clap::Parser;

/// Configuración del servidor HTTP/1.1
#[derive(Debug, Clone, Parser)]
#[command(name = "static_server")]
#[command(about = "Servidor HTTP/1.1 de archivos estáticos con pool adaptativo de workers")]
#[command(version)]
pub struct Config {
    /// Puerto en el que escucha el servidor (0 = efímero)
    #[arg(short, long, default_value = "8080", env = "HTTP_PORT")]
    pub port: u16,

    /// Host/IP en el que escucha
    #[arg(long, default_value = "0.0.0.0", env = "HTTP_HOST")]
    pub host: String,

    /// Document root: solo se sirven archivos debajo de este directorio
    #[arg(short = 'd', long = "root", default_value = "./www", env = "DOC_ROOT")]
    pub root: String,

    // === Workers ===

    /// Threads con los que arranca el pool
    #[arg(short = 't', long = "min-threads", default_value = "4", env = "MIN_THREADS")]
    pub min_threads: usize,

    /// Máximo de threads al que puede crecer el pool
    #[arg(short = 'm', long = "max-threads", default_value = "64", env = "MAX_THREADS")]
    pub max_threads: usize,

    /// Intentos de dequeue antes de dormir
    #[arg(long = "spin-attempts", default_value = "1000", env = "SPIN_ATTEMPTS")]
    pub spin_attempts: u32,

    /// Siesta de un worker ocioso en microsegundos
    #[arg(long = "idle-sleep-us", default_value = "1000", env = "IDLE_SLEEP_US")]
    pub idle_sleep_us: u64,

    // === Escalado ===

    /// Espera en cola (ms) a partir de la cual se pide un worker más
    #[arg(long = "scale-threshold-ms", default_value = "50", env = "SCALE_THRESHOLD_MS")]
    pub scale_threshold_ms: u64,

    /// Tiempo mínimo entre dos scale-ups en milisegundos
    #[arg(long = "scale-cooldown-ms", default_value = "1000", env = "SCALE_COOLDOWN_MS")]
    pub scale_cooldown_ms: u64,

    /// Factor de suavizado del promedio de espera
    #[arg(long = "ewma-alpha", default_value = "0.3", env = "EWMA_ALPHA")]
    pub ewma_alpha: f64,

    // === Cola ===

    /// Capacidad de la cola de conexiones (potencia de dos)
    #[arg(long = "queue-capacity", default_value = "1024", env = "QUEUE_CAPACITY")]
    pub queue_capacity: usize,

    // === Keep-alive ===

    /// Inactividad máxima entre requests de una conexión en milisegundos
    #[arg(long = "keepalive-timeout-ms", default_value = "5000", env = "KEEPALIVE_TIMEOUT_MS")]
    pub keepalive_timeout_ms: u64,

    /// Requests atendidos por conexión antes de cerrarla
    #[arg(long = "keepalive-max-requests", default_value = "100", env = "KEEPALIVE_MAX_REQUESTS")]
    pub keepalive_max_requests: usize,
}

impl Config {
    /// Dirección completa para bind (host:port)
    ///
    /// # Ejemplo
    /// ```rust
    /// use static_server::config::Config;
    ///
    /// let config = Config::default();
    /// assert_eq!(config.address(), "0.0.0.0:8080");
    /// ```
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Valida la configuración
    ///
    /// Retorna errores si hay valores inválidos
    pub fn validate(&self) -> Result<(), String> {
        // Validar workers
        if self.min_threads == 0 {
            return Err("Min threads must be >= 1".to_string());
        }
        if self.max_threads < self.min_threads {
            return Err(format!(
                "Max threads ({}) must be >= min threads ({})",
                self.max_threads, self.min_threads
            ));
        }

        // Validar cola
        if self.queue_capacity < 2 || !self.queue_capacity.is_power_of_two() {
            return Err(format!(
                "Queue capacity must be a power of two >= 2 (got {})",
                self.queue_capacity
            ));
        }

        // Validar keep-alive
        if self.keepalive_timeout_ms == 0 {
            return Err("Keep-alive timeout must be > 0".to_string());
        }
        if self.keepalive_max_requests == 0 {
            return Err("Keep-alive max requests must be >= 1".to_string());
        }

        // Validar escalado
        if self.scale_threshold_ms == 0 {
            return Err("Scale threshold must be > 0".to_string());
        }
        if !(self.ewma_alpha > 0.0 && self.ewma_alpha <= 1.0) {
            return Err(format!("EWMA alpha must be in (0, 1] (got {})", self.ewma_alpha));
        }

        Ok(())
    }

    /// Imprime un resumen de la configuración
    pub fn print_summary(&self) {
        println!("╔══════════════════════════════════════════════════════════════╗");
        println!("║            Static HTTP/1.1 Server Configuration              ║");
        println!("╚══════════════════════════════════════════════════════════════╝");
        println!();
        println!("🌐 Network:");
        println!("   Address:      {}", self.address());
        println!("   Root:         {}", self.root);
        println!();
        println!("👷 Worker Pool:");
        println!("   ┌──────────────┬──────────┬────────────┬─────────────┐");
        println!("   │ Min threads  │ Max      │ Queue Cap  │ Threshold   │");
        println!("   ├──────────────┼──────────┼────────────┼─────────────┤");
        println!(
            "   │ {:^12} │ {:^8} │ {:^10} │ {:>8} ms │",
            self.min_threads, self.max_threads, self.queue_capacity, self.scale_threshold_ms
        );
        println!("   └──────────────┴──────────┴────────────┴─────────────┘");
        println!(
            "   Cooldown:     {} ms (alpha {})",
            self.scale_cooldown_ms, self.ewma_alpha
        );
        println!(
            "   Idle:         {} spins, then {} µs sleep",
            self.spin_attempts, self.idle_sleep_us
        );
        println!();
        println!("🔁 Keep-alive:");
        println!("   Timeout:      {} ms", self.keepalive_timeout_ms);
        println!("   Max requests: {} per connection", self.keepalive_max_requests);
        println!();
        println!("═══════════════════════════════════════════════════════════════");
        println!();
    }
}

impl Default for Config {
    /// Configuración por defecto
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            root: "./www".to_string(),
            min_threads: 4,
            max_threads: 64,
            spin_attempts: 1000,
            idle_sleep_us: 1000,
            scale_threshold_ms: 50,
            scale_cooldown_ms: 1000,
            ewma_alpha: 0.3,
            queue_capacity: 1024,
            keepalive_timeout_ms: 5000,
            keepalive_max_requests: 100,
        }
    }
}
