//! # Static Server - Entry Point
//! src/main.rs
//!
//! Parsea la configuración, instala el logging y el handler de señales, y
//! corre el servidor hasta SIGINT/SIGTERM.

use clap::Parser;
use static_server::config::Config;
use static_server::server::Server;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_thread_names(true)
        .init();

    let config = Config::parse();

    if let Err(e) = config.validate() {
        error!("invalid configuration: {}", e);
        std::process::exit(1);
    }

    config.print_summary();

    if let Err(e) = run(&config) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}

fn run(config: &Config) -> static_server::Result<()> {
    let server = Server::new(config)?;

    let shutdown = server.shutdown_handle();
    ctrlc::set_handler(move || {
        info!("signal received, stopping");
        shutdown.shutdown();
    })?;

    server.run()
}
