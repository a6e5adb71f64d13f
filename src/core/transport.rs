//! Delivery of rendered payloads to label printers.
//!
//! Raw port-9100 printers have no application-level acknowledgment: once the
//! payload has been handed to the socket and the connection closes without an
//! error, the job counts as delivered.

pub mod retry;
pub mod simulated;
pub mod tcp;

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use retry::RetryPolicy;
pub use simulated::SimulatedTransport;
pub use tcp::TcpTransport;

/// Why a single delivery attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    ConnectionRefused,
    HostUnreachable,
    TimedOut,
    WriteError,
    Network,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionRefused => "connection refused",
            Self::HostUnreachable => "host unreachable",
            Self::TimedOut => "timed out",
            Self::WriteError => "write error",
            Self::Network => "generic network error",
        }
    }

    /// Classify an error raised while establishing the connection.
    pub fn from_connect_error(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => Self::ConnectionRefused,
            io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::AddrNotAvailable => Self::HostUnreachable,
            io::ErrorKind::TimedOut => Self::TimedOut,
            _ => Self::Network,
        }
    }

    /// Classify an error raised after the connection was established.
    pub fn from_write_error(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut => Self::TimedOut,
            _ => Self::WriteError,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} ({addr}): {detail}")]
pub struct SendFailure {
    pub kind: FailureKind,
    pub addr: String,
    pub detail: String,
}

impl SendFailure {
    pub fn new(kind: FailureKind, addr: impl ToString, detail: impl Into<String>) -> Self {
        Self {
            kind,
            addr: addr.to_string(),
            detail: detail.into(),
        }
    }

    pub fn connect(addr: SocketAddr, err: &io::Error) -> Self {
        Self::new(FailureKind::from_connect_error(err), addr, err.to_string())
    }

    pub fn write(addr: SocketAddr, err: &io::Error) -> Self {
        Self::new(FailureKind::from_write_error(err), addr, err.to_string())
    }

    pub fn timed_out(addr: SocketAddr, after: Duration) -> Self {
        Self::new(
            FailureKind::TimedOut,
            addr,
            format!("no completion within {}ms", after.as_millis()),
        )
    }
}

/// Outcome of a `send` call including its retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    /// Attempts consumed by failures: 0 for a first-try success, 1 when the
    /// second attempt succeeded, `max_retries` when every attempt failed.
    pub attempts_used: u32,
    pub outcome: Result<(), SendFailure>,
}

impl SendReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[async_trait]
pub trait PrinterTransport: Send + Sync {
    /// Deliver `payload` to `addr`, retrying transient failures per `policy`.
    async fn send(&self, addr: SocketAddr, payload: &[u8], policy: &RetryPolicy) -> SendReport;

    /// Connect-only liveness check. Never writes to the printer.
    async fn probe(&self, addr: SocketAddr, timeout: Duration) -> bool;
}
