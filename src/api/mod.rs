//! HTTP surface of the monitor: liveness, on-demand checks and history.

pub mod handlers;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio::time::sleep;

use crate::monitor::Monitor;

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Bound API server. Each connection is served on its own task, so slow
/// `/run-check` requests never hold up other callers or the scheduler.
pub struct ApiServer {
    listener: TcpListener,
    monitor: Monitor,
}

impl ApiServer {
    pub async fn bind(addr: SocketAddr, monitor: Monitor) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(ApiServer { listener, monitor })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `true` is sent on `shutdown` or its sender
    /// is dropped. Open connections are then asked to close once their
    /// current request is answered, and `serve` returns after all of them
    /// have finished, so an in-flight `/run-check` is still recorded.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
        let local_addr = self.local_addr()?;
        tracing::info!("API listening on http://{local_addr}");

        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    let (stream, peer_addr) = match accept_result {
                        Ok(conn) => conn,
                        Err(e) => {
                            pause_after_accept_error(&e).await;
                            continue;
                        }
                    };
                    let monitor = self.monitor.clone();
                    let conn_shutdown = shutdown.clone();

                    connections.spawn(serve_connection(stream, peer_addr, monitor, conn_shutdown));
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    log_connection_exit(joined);
                }
                _ = shutdown_signal(&mut shutdown) => {
                    tracing::info!("API shutting down");
                    break;
                }
            }
        }

        if !connections.is_empty() {
            tracing::info!("Waiting for {} open connection(s) to finish", connections.len());
        }
        while let Some(joined) = connections.join_next().await {
            log_connection_exit(joined);
        }

        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    monitor: Monitor,
    mut shutdown: watch::Receiver<bool>,
) {
    let io = TokioIo::new(stream);
    let svc = service_fn(move |req: Request<Incoming>| {
        let monitor = monitor.clone();
        async move { Ok::<_, Infallible>(handlers::route(req, &monitor).await) }
    });

    let conn = http1::Builder::new().serve_connection(io, svc);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = shutdown_signal(&mut shutdown) => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = result {
        tracing::debug!("Connection from {peer_addr} ended with error: {e}");
    }
}

fn log_connection_exit(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        tracing::error!("Connection task failed: {e}");
    }
}

/// Persistent accept errors (e.g. out of file descriptors) would otherwise
/// spin the loop.
async fn pause_after_accept_error(e: &std::io::Error) {
    tracing::warn!("Failed to accept connection: {e}");
    sleep(ACCEPT_ERROR_BACKOFF).await;
}

async fn shutdown_signal(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
