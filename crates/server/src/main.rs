use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use portcullis_control::{ConfigService, ControlMetrics, DriftWorker, Notifier, ReconcileWorker, VersionManager};
use portcullis_server::acme::AcmeWorker;
use portcullis_server::api::{self, AppState};
use portcullis_server::auth::jwt::JwtManager;
use portcullis_server::auth::{AdminAuthProvider, password};
use portcullis_server::config::PortcullisConfig;
use portcullis_server::sync::SyncWorker;
use portcullis_server::{factory, listener};

/// Portcullis control-plane HTTP server.
#[derive(Parser, Debug)]
#[command(name = "portcullis-server", about = "Control plane for the Portcullis API gateway")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "portcullis.toml")]
    config: String,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Hash a password for use in the auth config. Reads plaintext from stdin.
    HashPassword,
}

#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber from RUST_LOG or default to info.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Some(Commands::HashPassword) = cli.command {
        return run_hash_password();
    }

    // Load configuration from the TOML file, or use defaults if absent.
    let config: PortcullisConfig = if Path::new(&cli.config).exists() {
        let contents = std::fs::read_to_string(&cli.config)?;
        toml::from_str(&contents)?
    } else {
        info!(path = %cli.config, "config file not found, using defaults");
        toml::from_str("")?
    };

    // Leaves first: store, portal repository, data-plane client.
    let store = factory::create_store(&config.store).await?;
    let portal = factory::create_portal(&config.portal).await?;
    let dataplane = factory::create_dataplane(&config.dataplane)?;

    let metrics = Arc::new(ControlMetrics::default());

    // The notifier recovers its sequence high-water mark from the store.
    let notifier = Arc::new(Notifier::new(Arc::clone(&store), Arc::clone(&metrics)).await?);

    let service = Arc::new(ConfigService::new(
        Arc::clone(&store),
        Arc::clone(&notifier),
        Arc::clone(&metrics),
    ));
    let versions = Arc::new(VersionManager::new(
        Arc::clone(&service),
        Arc::clone(&metrics),
    ));

    // Crash recovery: re-apply whatever version is marked active.
    versions.recover().await?;

    let jwt = Arc::new(JwtManager::new(
        &config.portal.jwt.secret,
        &config.portal.jwt.issuer,
        config.portal.jwt.lifetime_seconds,
    ));

    let admin_auth = if config.auth.enabled {
        Some(Arc::new(AdminAuthProvider::new(
            &config.auth,
            Arc::clone(&jwt),
        )))
    } else {
        warn!("admin authentication is DISABLED; do not run like this in production");
        None
    };

    // Background workers.
    let sync_shutdown = if config.background.sync.enabled {
        let worker = SyncWorker::new(
            &config.background.sync.path,
            Duration::from_secs(config.background.sync.poll_interval_seconds),
            Arc::clone(&versions),
        );
        let (_, shutdown) = worker.spawn();
        info!(path = %config.background.sync.path, "gitops sync enabled");
        Some(shutdown)
    } else {
        None
    };

    let (_, reconcile_shutdown) = ReconcileWorker::new(
        Arc::clone(&service),
        Arc::clone(&metrics),
        Duration::from_secs(config.background.reconcile_interval_seconds),
    )
    .spawn();

    let (_, drift_shutdown) = DriftWorker::new(
        portal.applications(),
        Arc::clone(&dataplane),
        Arc::clone(&metrics),
        Duration::from_secs(config.background.drift_interval_seconds),
    )
    .spawn();

    let state = AppState {
        service: Arc::clone(&service),
        versions,
        metrics,
        portal: Arc::clone(&portal),
        dataplane,
        admin_auth,
        jwt,
        min_password_length: config.portal.min_password_length,
    };
    // No handler may outlive the read + write budget from the config.
    let request_budget = Duration::from_secs(
        config.server.read_timeout_seconds + config.server.write_timeout_seconds,
    );
    let app = api::router(state, &config.server.api_prefix, &config.cors)
        .layer(tower_http::timeout::TimeoutLayer::new(request_budget));

    // Resolve the bind address (CLI overrides take precedence).
    let host = cli.host.unwrap_or(config.server.host);
    let port = cli.port.unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");
    let tcp = tokio::net::TcpListener::bind(&addr).await?;

    // Ordered teardown, triggered by SIGINT/SIGTERM: stop ACME, stop the
    // notifier, stop background workers, close the store, then let the
    // HTTP server drain.
    let shutdown_store = Arc::clone(&store);
    let shutdown_notifier = Arc::clone(&notifier);

    if config.tls.enabled {
        // Pin the rustls crypto provider before any TLS config is built.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let cert_path = config
            .tls
            .cert_path
            .clone()
            .ok_or("tls.cert_path is required when TLS is enabled")?;
        let key_path = config
            .tls
            .key_path
            .clone()
            .ok_or("tls.key_path is required when TLS is enabled")?;

        let tls_config = listener::load_server_config(&cert_path, &key_path)?;
        let (tls_tx, tls_rx) = watch::channel(tls_config);

        let acme_shutdown = if config.tls.acme.enabled {
            let worker = AcmeWorker::new(
                cert_path,
                key_path,
                Duration::from_secs(config.tls.acme.renew_check_interval_seconds),
                tls_tx,
            );
            let (_, shutdown) = worker.spawn();
            info!(domains = ?config.tls.acme.domains, "acme renewal watcher enabled");
            Some(shutdown)
        } else {
            None
        };

        info!(address = %addr, "portcullis-server listening (https)");
        let shutdown = async move {
            shutdown_signal().await;
            if let Some(tx) = acme_shutdown {
                let _ = tx.send(()).await;
            }
            shutdown_notifier.shutdown().await;
            if let Some(tx) = sync_shutdown {
                let _ = tx.send(()).await;
            }
            let _ = reconcile_shutdown.send(()).await;
            let _ = drift_shutdown.send(()).await;
            if let Err(e) = shutdown_store.close().await {
                warn!(error = %e, "store close failed");
            }
        };
        listener::serve_tls(tcp, app, tls_rx, shutdown).await?;
    } else {
        info!(address = %addr, "portcullis-server listening (http)");
        let shutdown = async move {
            shutdown_signal().await;
            shutdown_notifier.shutdown().await;
            if let Some(tx) = sync_shutdown {
                let _ = tx.send(()).await;
            }
            let _ = reconcile_shutdown.send(()).await;
            let _ = drift_shutdown.send(()).await;
            if let Err(e) = shutdown_store.close().await {
                warn!(error = %e, "store close failed");
            }
        };
        axum::serve(tcp, app).with_graceful_shutdown(shutdown).await?;
    }

    // Close what remains, bounded by the configured shutdown timeout.
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);
    if tokio::time::timeout(shutdown_timeout, portal.close())
        .await
        .is_err()
    {
        warn!(
            timeout_secs = config.server.shutdown_timeout_seconds,
            "portal repository close timed out"
        );
    }

    info!("portcullis-server shut down");
    Ok(())
}

/// Run the `hash-password` subcommand: read plaintext from stdin, print
/// the argon2 hash to stdout.
fn run_hash_password() -> Result<(), Box<dyn std::error::Error>> {
    let mut plaintext = String::new();
    std::io::Read::read_to_string(&mut std::io::stdin(), &mut plaintext)?;
    let plaintext = plaintext.trim_end_matches('\n');

    let hash = password::hash_password(plaintext)?;
    println!("{hash}");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger the
/// ordered shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
