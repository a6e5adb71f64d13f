//! Print request pipeline.
//!
//! validate -> resolve printer -> render -> record pending -> transmit ->
//! finalize. Caller errors are rejected before a job exists; once a job is
//! recorded it always reaches a terminal state.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, info, info_span, instrument, warn};

use super::jobs::{self, JobStore};
use super::label::{self, BadgeFields, LabelLayout};
use super::models::{JobPatch, NewPrinter, PrintJob, Printer, PrinterPatch};
use super::registry::PrinterStore;
use super::transport::{PrinterTransport, RetryPolicy, SendFailure};
use crate::error::{BridgeError, StoreError};

/// Which printer a request targets.
#[derive(Debug, Clone)]
pub enum PrinterRef {
    Id(String),
    /// Ad hoc printer, registered on first use.
    Inline { name: Option<String>, address: SocketAddr },
}

#[derive(Debug, Clone)]
pub enum PrintContent {
    Badge(BadgeFields),
    Raw(String),
    /// Diagnostic label, rendered at dispatch time.
    TestLabel,
}

#[derive(Debug, Clone)]
pub struct PrintRequest {
    pub printer: PrinterRef,
    pub content: PrintContent,
}

#[derive(Clone)]
pub struct Dispatcher {
    printers: Arc<dyn PrinterStore>,
    jobs: Arc<dyn JobStore>,
    transport: Arc<dyn PrinterTransport>,
    policy: RetryPolicy,
    probe_timeout: Duration,
    layout: LabelLayout,
}

impl Dispatcher {
    pub fn new(
        printers: Arc<dyn PrinterStore>,
        jobs: Arc<dyn JobStore>,
        transport: Arc<dyn PrinterTransport>,
        policy: RetryPolicy,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            printers,
            jobs,
            transport,
            policy,
            probe_timeout,
            layout: LabelLayout::default(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run a print request to completion.
    ///
    /// Returns the final job on success. A job that ends up `failed` is
    /// reported as [`BridgeError::PrintFailed`] carrying its id.
    pub async fn submit(&self, request: PrintRequest) -> Result<PrintJob, BridgeError> {
        self.validate(&request.content)?;
        let printer = self.resolve_printer(&request.printer)?;
        let payload = self.render(&request.content, &printer)?;

        let job = PrintJob::new(printer.id.clone(), payload);
        let job_id = self.jobs.create(job.clone());
        info!(job_id = %job_id, printer_id = %printer.id, "Print job accepted");

        // Transmission runs in its own task so the job is finalized even if
        // the caller goes away mid-request.
        let this = self.clone();
        let span = info_span!("transmit", job_id = %job_id, printer_id = %printer.id);
        let handle = tokio::spawn(
            async move { this.transmit(job, printer).await }.instrument(span),
        );

        let (job, outcome) = handle
            .await
            .map_err(|e| BridgeError::Internal(format!("transmit task for job {job_id}: {e}")))??;

        match outcome {
            Ok(()) => Ok(job),
            Err(failure) => Err(BridgeError::PrintFailed {
                job_id: job.id,
                failure,
            }),
        }
    }

    fn validate(&self, content: &PrintContent) -> Result<(), BridgeError> {
        match content {
            PrintContent::Badge(fields) => {
                fields.normalize(&self.layout)?;
            }
            PrintContent::Raw(zpl) => label::validate_zpl(zpl)?,
            PrintContent::TestLabel => {}
        }
        Ok(())
    }

    fn resolve_printer(&self, target: &PrinterRef) -> Result<Printer, BridgeError> {
        match target {
            PrinterRef::Id(id) => Ok(self.printers.get(id)?),
            PrinterRef::Inline { name, address } => {
                let name = name
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| address.to_string());
                let (printer, created) =
                    self.printers.register_if_absent(NewPrinter::new(name, *address))?;
                if created {
                    debug!(printer_id = %printer.id, "Inline printer registered");
                }
                Ok(printer)
            }
        }
    }

    fn render(&self, content: &PrintContent, printer: &Printer) -> Result<String, BridgeError> {
        Ok(match content {
            PrintContent::Badge(fields) => label::render_badge(fields, &self.layout)?,
            PrintContent::Raw(zpl) => zpl.clone(),
            PrintContent::TestLabel => {
                label::render_test_label(&printer.name, Utc::now(), &self.layout)
            }
        })
    }

    async fn transmit(
        &self,
        mut job: PrintJob,
        printer: Printer,
    ) -> Result<(PrintJob, Result<(), SendFailure>), BridgeError> {
        self.record(&mut job, JobPatch::sent())?;
        let report = self
            .transport
            .send(printer.socket_addr(), job.payload.as_bytes(), &self.policy)
            .await;
        self.record_reachability(&printer.id, report.is_success());

        let patch = match &report.outcome {
            Ok(()) => JobPatch::succeeded(report.attempts_used),
            Err(failure) => JobPatch::failed(report.attempts_used, failure.to_string()),
        };
        self.record(&mut job, patch)?;

        info!(status = %job.status, retry_count = job.retry_count, "Print job finished");
        Ok((job, report.outcome))
    }

    /// Store `patch` and mirror the result into `job`. If the record was
    /// swept mid-flight the patch is applied to `job` alone, so the caller
    /// still gets the final state.
    fn record(&self, job: &mut PrintJob, patch: JobPatch) -> Result<(), BridgeError> {
        match self.jobs.update(&job.id, patch.clone()) {
            Ok(stored) => *job = stored,
            Err(StoreError::JobNotFound(_)) => {
                warn!(job_id = %job.id, "Job record expired while in flight");
                jobs::merge(job, patch)?;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn record_reachability(&self, printer_id: &str, online: bool) {
        match self
            .printers
            .update(printer_id, PrinterPatch::reachability(online))
        {
            Ok(_) => {}
            Err(StoreError::PrinterNotFound(_)) => {
                debug!(printer_id, "Printer removed before its status could be updated");
            }
            Err(e) => warn!(printer_id, error = %e, "Failed to update printer status"),
        }
    }

    /// Probe every registered printer concurrently and store the results.
    #[instrument(skip(self))]
    pub async fn refresh_statuses(&self) -> Vec<Printer> {
        let mut probes = JoinSet::new();
        for printer in self.printers.list() {
            let transport = self.transport.clone();
            let timeout = self.probe_timeout;
            probes.spawn(async move {
                let online = transport.probe(printer.socket_addr(), timeout).await;
                (printer.id, online)
            });
        }

        while let Some(result) = probes.join_next().await {
            match result {
                Ok((id, online)) => self.record_reachability(&id, online),
                Err(e) => warn!(error = %e, "Probe task failed"),
            }
        }
        self.printers.list()
    }
}
