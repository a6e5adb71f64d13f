//! Raw TCP transport (port 9100).
//!
//! Open a socket, write the payload, close. Each attempt is one future raced
//! against one deadline, so it resolves exactly once: delivered, failed, or
//! timed out.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::{PrinterTransport, RetryPolicy, SendFailure, SendReport};

/// Write granularity, only used for progress logging on large payloads.
const CHUNK_SIZE: usize = 8192;

#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> Self {
        Self
    }
}

/// One delivery attempt bounded by `timeout` end to end.
async fn attempt(addr: SocketAddr, payload: &[u8], timeout: Duration) -> Result<(), SendFailure> {
    let deliver = async {
        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(|e| SendFailure::connect(addr, &e))?;

        let mut sent = 0usize;
        for chunk in payload.chunks(CHUNK_SIZE) {
            stream
                .write_all(chunk)
                .await
                .map_err(|e| SendFailure::write(addr, &e))?;
            sent += chunk.len();
            debug!(%addr, sent, total = payload.len(), "Payload progress");
        }
        stream
            .flush()
            .await
            .map_err(|e| SendFailure::write(addr, &e))?;

        // The payload is already with the kernel; a failed FIN does not undo
        // delivery.
        if let Err(e) = stream.shutdown().await {
            debug!(%addr, error = %e, "Shutdown after write failed");
        }
        Ok(())
    };

    match tokio::time::timeout(timeout, deliver).await {
        Ok(result) => result,
        Err(_) => Err(SendFailure::timed_out(addr, timeout)),
    }
}

#[async_trait]
impl PrinterTransport for TcpTransport {
    async fn send(&self, addr: SocketAddr, payload: &[u8], policy: &RetryPolicy) -> SendReport {
        let attempts = policy.attempts();
        let started = Instant::now();
        let mut last_failure = None;

        for n in 0..attempts {
            debug!(%addr, attempt = n, bytes = payload.len(), "Connecting to printer");
            match attempt(addr, payload, policy.timeout).await {
                Ok(()) => {
                    info!(
                        %addr,
                        attempt = n,
                        bytes = payload.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Payload delivered"
                    );
                    return SendReport {
                        attempts_used: n,
                        outcome: Ok(()),
                    };
                }
                Err(failure) => {
                    warn!(%addr, attempt = n, error = %failure, "Delivery attempt failed");
                    last_failure = Some(failure);
                    if n + 1 < attempts {
                        let delay = policy.backoff(n);
                        debug!(%addr, delay_ms = delay.as_millis() as u64, "Backing off");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        let failure = last_failure.unwrap_or_else(|| {
            SendFailure::new(super::FailureKind::Network, addr, "no attempt was made")
        });
        warn!(%addr, attempts, error = %failure, "Giving up on printer");
        SendReport {
            attempts_used: attempts,
            outcome: Err(failure),
        }
    }

    async fn probe(&self, addr: SocketAddr, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => {
                debug!(%addr, "Probe connected");
                true
            }
            Ok(Err(e)) => {
                debug!(%addr, error = %e, "Probe failed");
                false
            }
            Err(_) => {
                debug!(%addr, timeout_ms = timeout.as_millis() as u64, "Probe timed out");
                false
            }
        }
    }
}
