//! HTTPS/H2 listener built on rustls + hyper-util.

use std::io::BufReader;
use std::sync::Arc;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, warn};

/// Load a rustls server config from PEM certificate and key files.
///
/// ALPN advertises h2 and http/1.1, which is what enables HTTP/2 on the
/// admin surface when TLS is on.
pub fn load_server_config(
    cert_path: &str,
    key_path: &str,
) -> Result<Arc<rustls::ServerConfig>, String> {
    let cert_file = std::fs::File::open(cert_path)
        .map_err(|e| format!("failed to open certificate {cert_path}: {e}"))?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<Result<_, _>>()
        .map_err(|e| format!("failed to parse certificate {cert_path}: {e}"))?;

    let key_file = std::fs::File::open(key_path)
        .map_err(|e| format!("failed to open private key {key_path}: {e}"))?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .map_err(|e| format!("failed to parse private key {key_path}: {e}"))?
        .ok_or_else(|| format!("no private key found in {key_path}"))?;

    let mut config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| format!("invalid certificate/key pair: {e}"))?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}

/// Serve the router over TLS until `shutdown` resolves.
///
/// The TLS config is read from a watch channel per connection, so a
/// renewed certificate (swapped in by the ACME worker) applies to new
/// connections without a restart. In-flight connections drain after
/// shutdown because their tasks simply run to completion.
pub async fn serve_tls(
    listener: TcpListener,
    app: Router,
    tls_rx: watch::Receiver<Arc<rustls::ServerConfig>>,
    shutdown: impl std::future::Future<Output = ()>,
) -> std::io::Result<()> {
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let acceptor = TlsAcceptor::from(tls_rx.borrow().clone());
                let service = TowerToHyperService::new(app.clone());

                tokio::spawn(async move {
                    let tls_stream = match acceptor.accept(stream).await {
                        Ok(tls_stream) => tls_stream,
                        Err(e) => {
                            debug!(%peer, error = %e, "TLS handshake failed");
                            return;
                        }
                    };

                    let io = TokioIo::new(tls_stream);
                    if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                        .serve_connection_with_upgrades(io, service)
                        .await
                    {
                        debug!(%peer, error = %e, "connection error");
                    }
                });
            }
            () = &mut shutdown => {
                warn!("listener shutting down; draining in-flight connections");
                return Ok(());
            }
        }
    }
}
