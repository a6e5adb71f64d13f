use std::sync::Arc;
use std::time::Instant;

use crate::config::AppConfig;
use crate::core::transport::{SimulatedTransport, TcpTransport};
use crate::core::{
    Dispatcher, InMemoryJobStore, InMemoryPrinterRegistry, JobStore, PrinterStore,
    PrinterTransport,
};

/// Shared service state handed to every request handler.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub printers: Arc<dyn PrinterStore>,
    pub jobs: Arc<dyn JobStore>,
    pub dispatcher: Dispatcher,
    pub started_at: Instant,
}

impl AppContext {
    /// Build a context with in-memory stores and the transport selected by
    /// `config.simulation`.
    pub fn new(config: AppConfig) -> Self {
        let transport: Arc<dyn PrinterTransport> = if config.simulation {
            Arc::new(SimulatedTransport::new())
        } else {
            Arc::new(TcpTransport::new())
        };
        Self::with_parts(
            config,
            Arc::new(InMemoryPrinterRegistry::new()),
            Arc::new(InMemoryJobStore::new()),
            transport,
        )
    }

    pub fn with_parts(
        config: AppConfig,
        printers: Arc<dyn PrinterStore>,
        jobs: Arc<dyn JobStore>,
        transport: Arc<dyn PrinterTransport>,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            printers.clone(),
            jobs.clone(),
            transport,
            config.retry_policy(),
            config.probe_timeout(),
        );
        Self {
            config: Arc::new(config),
            printers,
            jobs,
            dispatcher,
            started_at: Instant::now(),
        }
    }
}
