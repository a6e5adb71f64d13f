//! In-process transport for dry runs and tests.
//!
//! Nothing touches the network. Deliveries are recorded so they can be
//! inspected, and individual addresses can be marked offline to exercise the
//! failure path.

use async_trait::async_trait;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::info;

use super::{FailureKind, PrinterTransport, RetryPolicy, SendFailure, SendReport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub addr: SocketAddr,
    pub payload: Vec<u8>,
}

#[derive(Default)]
struct SimulatorState {
    offline: HashSet<SocketAddr>,
    deliveries: Vec<Delivery>,
}

#[derive(Clone, Default)]
pub struct SimulatedTransport {
    state: Arc<Mutex<SimulatorState>>,
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every connection to `addr` from now on.
    pub fn set_offline(&self, addr: SocketAddr) {
        self.lock().offline.insert(addr);
    }

    pub fn set_online(&self, addr: SocketAddr) {
        self.lock().offline.remove(&addr);
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.lock().deliveries.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimulatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PrinterTransport for SimulatedTransport {
    async fn send(&self, addr: SocketAddr, payload: &[u8], policy: &RetryPolicy) -> SendReport {
        let mut state = self.lock();
        if state.offline.contains(&addr) {
            return SendReport {
                attempts_used: policy.attempts(),
                outcome: Err(SendFailure::new(
                    FailureKind::ConnectionRefused,
                    addr,
                    "simulated printer is offline",
                )),
            };
        }

        info!(%addr, bytes = payload.len(), "(Simulated) Payload delivered");
        state.deliveries.push(Delivery {
            addr,
            payload: payload.to_vec(),
        });
        SendReport {
            attempts_used: 0,
            outcome: Ok(()),
        }
    }

    async fn probe(&self, addr: SocketAddr, _timeout: Duration) -> bool {
        !self.lock().offline.contains(&addr)
    }
}
