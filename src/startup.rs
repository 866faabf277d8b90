//! Bounded bind-and-reclaim loop run once before serving.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::reclaim::{PortReclaimer, ReclaimError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Reclaim-and-retry cycles allowed before giving up.
    pub max_attempts: u32,
    /// Fixed pause between a successful reclaim and the next bind.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay: Duration::from_millis(1000),
        }
    }
}

/// Every variant is fatal; the caller decides how to exit.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("port {port} is already in use and max retries ({max_attempts}) have been reached")]
    RetriesExhausted { port: u16, max_attempts: u32 },
    #[error("failed to free port {port}: {source}")]
    Reclaim { port: u16, source: ReclaimError },
    #[error("failed to bind port {port}: {source}")]
    Bind { port: u16, source: io::Error },
}

/// Bind `0.0.0.0:port`, reclaiming the port and retrying on address-in-use.
pub async fn start<R>(
    port: u16,
    policy: &RetryPolicy,
    reclaimer: &R,
) -> Result<TcpListener, StartupError>
where
    R: PortReclaimer + ?Sized,
{
    bind_with_retry(port, policy, reclaimer, |addr| TcpListener::bind(addr)).await
}

/// Retry loop over an arbitrary bind function.
///
/// Only `AddrInUse` is retried. Each retry costs one reclaim; a failed
/// reclaim ends the loop immediately, as does any other bind error. The
/// next bind attempt is the only check that the reclaim actually freed the
/// port.
pub async fn bind_with_retry<R, F, Fut, L>(
    port: u16,
    policy: &RetryPolicy,
    reclaimer: &R,
    mut bind: F,
) -> Result<L, StartupError>
where
    R: PortReclaimer + ?Sized,
    F: FnMut(SocketAddr) -> Fut,
    Fut: Future<Output = io::Result<L>>,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let mut attempt_count: u32 = 0;

    loop {
        match bind(addr).await {
            Ok(listener) => {
                info!("Server is running on http://localhost:{}", port);
                return Ok(listener);
            }
            Err(err) if err.kind() == io::ErrorKind::AddrInUse => {
                if attempt_count >= policy.max_attempts {
                    error!(
                        "Port {} is already in use and max retries ({}) have been reached",
                        port, policy.max_attempts
                    );
                    return Err(StartupError::RetriesExhausted {
                        port,
                        max_attempts: policy.max_attempts,
                    });
                }

                warn!(
                    "Port {} is already in use. Attempting to kill the process (Retry {}/{})",
                    port,
                    attempt_count + 1,
                    policy.max_attempts
                );

                match reclaimer.reclaim(port).await {
                    Ok(pid) => info!("Process {} on port {} killed", pid, port),
                    Err(source) => {
                        error!("Error killing process on port {}: {}", port, source);
                        return Err(StartupError::Reclaim { port, source });
                    }
                }

                tokio::time::sleep(policy.retry_delay).await;
                attempt_count += 1;
            }
            Err(source) => {
                error!("Server error: {}", source);
                return Err(StartupError::Bind { port, source });
            }
        }
    }
}
