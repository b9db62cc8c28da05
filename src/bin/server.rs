//! relayd Server Binary
//!
//! Accepts connections and logs every line they send. Commands are not
//! interpreted; idle connections are closed with a farewell.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use crossbeam::channel::RecvTimeoutError;
use relayd::{inbound_queue, Config, Server};
use tracing_subscriber::{fmt, EnvFilter};

/// How often idle and disconnected endpoints are swept
const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

const IDLE_FAREWELL: &str = "ERROR :Closing Link (Idle timeout)\r\n";

/// relayd Server
#[derive(Parser, Debug)]
#[command(name = "relayd-server")]
#[command(about = "Line-oriented text protocol server")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:6667")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Minutes without input before a connection is closed
    #[arg(short, long, default_value = "5")]
    idle_minutes: u64,

    /// Per-connection outbound queue capacity (0 = unbuffered)
    #[arg(long, default_value = "64")]
    outbound_capacity: usize,

    /// Inbound queue capacity (0 = unbounded)
    #[arg(long, default_value = "1024")]
    inbound_capacity: usize,

    /// Longest accepted input line in bytes
    #[arg(long, default_value = "4096")]
    max_line_length: usize,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,relayd=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("relayd Server v{}", relayd::VERSION);
    tracing::info!("Listen address: {}", args.listen);

    let inbound_capacity = match args.inbound_capacity {
        0 => None,
        n => Some(n),
    };

    // Build config from args
    let config = match Config::builder()
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .idle_minutes(args.idle_minutes)
        .outbound_capacity(args.outbound_capacity)
        .inbound_capacity(inbound_capacity)
        .max_line_length(args.max_line_length)
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let server = match Server::bind(config.clone()) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", config.listen_addr, e);
            std::process::exit(1);
        }
    };

    let (inbound_tx, inbound_rx) = inbound_queue(config.inbound_capacity);

    let acceptor = {
        let server = Arc::clone(&server);
        thread::spawn(move || {
            if let Err(e) = server.run(inbound_tx) {
                tracing::error!("Server error: {}", e);
            }
            server.shutdown();
        })
    };

    // Dispatch: log each line, sweep idle and dead connections periodically
    let mut last_sweep = Instant::now();
    loop {
        match inbound_rx.recv_timeout(SWEEP_INTERVAL) {
            Ok(message) => {
                let endpoint = message.endpoint();
                tracing::info!(
                    "<{}@{}> {}",
                    endpoint.nickname(),
                    endpoint.peer_addr(),
                    message.text()
                );
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if last_sweep.elapsed() >= SWEEP_INTERVAL {
            let reaped = server.reap_idle(IDLE_FAREWELL);
            let pruned = server.prune_finished();
            if reaped > 0 || pruned > 0 {
                tracing::debug!("Swept {} idle and {} disconnected endpoints", reaped, pruned);
            }
            last_sweep = Instant::now();
        }
    }

    let _ = acceptor.join();
    tracing::info!("Server stopped");
}
