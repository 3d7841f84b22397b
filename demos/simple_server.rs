//! Simple SSE server with a clock producer
//!
//! Run with: cargo run --example simple_server [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example simple_server                    # binds to 0.0.0.0:8080
//!   cargo run --example simple_server localhost          # binds to 127.0.0.1:8080
//!   cargo run --example simple_server 127.0.0.1:9000     # binds to 127.0.0.1:9000
//!
//! Tokens are looked up in Redis (`REDIS_HOST`, `REDIS_PASSWORD`). Add one
//! with:
//!
//!   redis-cli SET laravel:api_keys:demo-token demo-user
//!
//! ## Subscribing
//!
//!   curl -N -H 'X-Authorization: demo-token' http://localhost:8080/subscribe/clock
//!
//! Every second an event is published to `/clock/tick`; every ten seconds one
//! goes to `/clock/minute-ish`. Subscribing to `/clock` receives both, while
//! `/clock/tick` receives only the first.
//!
//! ## Status
//!
//!   http://localhost:8080/admin
//!   curl http://localhost:8080/admin/status.json

use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sse_hub::auth::RedisCredentialStore;
use sse_hub::{Broadcaster, ServerConfig, SseMessage, SseServer};

/// Parse bind address from command line argument.
///
/// Accepts formats:
/// - "localhost" -> 127.0.0.1:8080
/// - "localhost:9000" -> 127.0.0.1:9000
/// - "127.0.0.1" -> 127.0.0.1:8080
/// - "0.0.0.0:8080" -> 0.0.0.0:8080
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    const DEFAULT_PORT: u16 = 8080;

    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: simple_server [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:8080)");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  REDIS_HOST      Credential store address (default: localhost:6379)");
    eprintln!("  REDIS_PASSWORD  Credential store password (default: none)");
}

/// Publish the current time until the hub goes away
async fn clock(broadcaster: Broadcaster) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut ticks: u64 = 0;

    loop {
        ticker.tick().await;
        ticks += 1;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let tick = SseMessage::new("/clock/tick", format!("{{\"now\":{}}}", now)).with_event("tick");
        if broadcaster.send(tick).await.is_err() {
            return;
        }

        if ticks % 10 == 0 {
            let msg = SseMessage::new("/clock/minute-ish", format!("{{\"ticks\":{}}}", ticks));
            if broadcaster.send(msg).await.is_err() {
                return;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let bind_addr = match args.get(1) {
        Some(addr_str) => match parse_bind_addr(addr_str) {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => ServerConfig::default().bind_addr,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sse_hub=debug".parse()?)
                .add_directive("simple_server=debug".parse()?),
        )
        .init();

    let config = ServerConfig::with_addr(bind_addr);
    let store = RedisCredentialStore::from_env();

    println!("Starting SSE server on {}", config.bind_addr);
    println!("Credential store: {}", store.config().addr);
    println!();
    println!("curl -N -H 'X-Authorization: <token>' http://{}/subscribe/clock", config.bind_addr);
    println!();

    let server = SseServer::new(config, store);
    tokio::spawn(clock(server.broadcaster()));

    let result = server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            println!("\nShutting down...");
        })
        .await;

    if let Err(e) = result {
        eprintln!("Server error: {}", e);
    }

    Ok(())
}
