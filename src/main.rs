//! siwe-gate application entry point.
//!
//! Bootstraps the server:
//! 1. Load configuration from environment
//! 2. Open the session store (memory or Redis)
//! 3. Build router with API routes, CORS and security headers
//! 4. Spawn the cleanup job
//! 5. Start Axum server
//!
//! Also supports a `keygen` subcommand for generating development wallets.

use siwe_gate::{
    auth::{AppState, AuthService, AuthSettings},
    cleanup::run_cleanup_loop,
    config::{Config, SessionBackend},
    routes,
    siwe::VerifyOptions,
    storage::{MemorySessionStore, RedisSessionStore, SessionStore},
    wallet::LocalWallet,
};
use std::sync::Arc;
use std::time::Duration;

fn print_keygen_usage() {
    eprintln!("Usage: siwe-gate keygen");
    eprintln!();
    eprintln!("Generate a random secp256k1 private key and print it with its address.");
    eprintln!("For development and testing only.");
}

fn keygen() {
    let wallet = LocalWallet::random();
    println!("private_key: {}", wallet.private_key_hex().as_str());
    println!("address:     {}", wallet.address());
}

#[tokio::main]
async fn main() {
    // Check for keygen subcommand
    let args: Vec<String> = std::env::args().collect();
    if args.len() >= 2 && args[1] == "keygen" {
        if args.len() != 2 {
            print_keygen_usage();
            std::process::exit(1);
        }
        keygen();
        return;
    }

    // Initialize tracing with env filter support (RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config from environment
    let config = Config::from_env().expect("Failed to load config");
    tracing::info!(?config, "Starting siwe-gate on {}", config.bind_addr);

    let store: Arc<dyn SessionStore> = match config.session_backend {
        SessionBackend::Memory => Arc::new(MemorySessionStore::new()),
        SessionBackend::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .expect("REDIS_URL is validated for the redis backend");
            Arc::new(
                RedisSessionStore::connect(url)
                    .await
                    .expect("Failed to connect to Redis"),
            )
        }
    };
    tracing::info!(backend = ?config.session_backend, transport = ?config.session_transport, "Session store ready");

    let settings = AuthSettings {
        session_ttl: Duration::from_secs(config.session_ttl_secs),
        nonce_ttl: Duration::from_secs(config.nonce_ttl_secs),
        verify: VerifyOptions {
            expected_domain: config.expected_domain.clone(),
        },
    };
    let auth = Arc::new(AuthService::new(store, settings));

    tokio::spawn(run_cleanup_loop(
        auth.clone(),
        Duration::from_secs(config.cleanup_interval_secs),
    ));

    let bind_addr = config.bind_addr;
    let state = AppState {
        auth,
        config: Arc::new(config),
    };
    let app = routes::app(state);

    // Bind to configured address
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .expect("Failed to bind");
    tracing::info!("Listening on {}", bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
