//! Request handlers for the bridge's JSON API.

use std::net::{IpAddr, SocketAddr};

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{Method, StatusCode, Uri},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::context::AppContext;
use crate::core::{
    BadgeFields, JobId, JobStatus, JobStore, NewPrinter, PrintContent, PrintJob, PrintRequest,
    Printer, PrinterRef, PrinterStore, models::DEFAULT_PRINTER_PORT,
};
use crate::error::{BridgeError, ErrorBody, ErrorCode, StoreError};

type ApiResult<T> = Result<T, BridgeError>;

/// Unwrap a JSON body, turning extractor rejections into the bridge's error
/// shape instead of axum's plain-text default.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| BridgeError::invalid(rejection.body_text()))
}

fn parse_ip(raw: &str) -> ApiResult<IpAddr> {
    raw.trim()
        .parse()
        .map_err(|_| BridgeError::invalid(format!("ipAddress is not a valid IP address: {raw}")))
}

fn printer_port(port: Option<u16>) -> ApiResult<u16> {
    match port.unwrap_or(DEFAULT_PRINTER_PORT) {
        0 => Err(BridgeError::invalid("port must be between 1 and 65535")),
        port => Ok(port),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlinePrinter {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    ip_address: Option<String>,
    #[serde(default)]
    port: Option<u16>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPrinterBody {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    ip_address: Option<String>,
    #[serde(default)]
    port: Option<u16>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgePrintBody {
    #[serde(default)]
    printer_id: Option<String>,
    #[serde(default)]
    printer: Option<InlinePrinter>,
    #[serde(default)]
    badge: Option<BadgeFields>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPrintBody {
    #[serde(default)]
    printer_id: Option<String>,
    #[serde(default)]
    printer: Option<InlinePrinter>,
    #[serde(default)]
    zpl: Option<String>,
}

/// Pick the target printer. An explicit `printerId` wins over inline info.
fn printer_ref(
    printer_id: Option<String>,
    inline: Option<InlinePrinter>,
) -> ApiResult<PrinterRef> {
    if let Some(id) = printer_id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty()) {
        return Ok(PrinterRef::Id(id));
    }
    let Some(inline) = inline else {
        return Err(BridgeError::invalid("printerId or printer is required"));
    };
    let raw_ip = inline
        .ip_address
        .ok_or_else(|| BridgeError::invalid("printer.ipAddress is required"))?;
    let address = SocketAddr::new(parse_ip(&raw_ip)?, printer_port(inline.port)?);
    Ok(PrinterRef::Inline {
        name: inline.name,
        address,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    printer_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<JobId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintResponse {
    job_id: JobId,
    status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    sent_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
    retry_count: u32,
}

impl From<PrintJob> for PrintResponse {
    fn from(job: PrintJob) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            sent_at: job.sent_at,
            completed_at: job.completed_at,
            retry_count: job.retry_count,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    job_id: JobId,
    printer_id: String,
    status: JobStatus,
    retry_count: u32,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sent_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

impl From<PrintJob> for JobResponse {
    fn from(job: PrintJob) -> Self {
        Self {
            job_id: job.id,
            printer_id: job.printer_id,
            status: job.status,
            retry_count: job.retry_count,
            created_at: job.created_at,
            sent_at: job.sent_at,
            completed_at: job.completed_at,
            error_message: job.error_message,
        }
    }
}

pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: ctx.started_at.elapsed().as_secs(),
        printer_count: ctx.printers.len(),
    })
}

pub async fn list_printers(State(ctx): State<AppContext>) -> Json<Vec<Printer>> {
    Json(ctx.dispatcher.refresh_statuses().await)
}

#[instrument(skip_all)]
pub async fn register_printer(
    State(ctx): State<AppContext>,
    payload: Result<Json<RegisterPrinterBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Printer>)> {
    let body = json_body(payload)?;

    let name = body
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| BridgeError::invalid("name is required"))?;
    let raw_ip = body
        .ip_address
        .ok_or_else(|| BridgeError::invalid("ipAddress is required"))?;
    let address = SocketAddr::new(parse_ip(&raw_ip)?, printer_port(body.port)?);

    let mut new_printer = NewPrinter::new(name, address);
    new_printer.id = body.id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty());

    let printer = ctx.printers.add(new_printer)?;
    info!(printer_id = %printer.id, address = %address, "Printer registered");
    Ok((StatusCode::CREATED, Json(printer)))
}

pub async fn remove_printer(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<ActionResponse>> {
    let printer = ctx.printers.remove(&id)?;
    info!(printer_id = %printer.id, "Printer removed");
    Ok(Json(ActionResponse {
        success: true,
        message: format!("Printer {} removed", printer.name),
        job_id: None,
    }))
}

pub async fn print_badge(
    State(ctx): State<AppContext>,
    payload: Result<Json<BadgePrintBody>, JsonRejection>,
) -> ApiResult<Json<PrintResponse>> {
    let body = json_body(payload)?;
    let badge = body
        .badge
        .ok_or_else(|| BridgeError::invalid("badge is required"))?;
    let request = PrintRequest {
        printer: printer_ref(body.printer_id, body.printer)?,
        content: PrintContent::Badge(badge),
    };

    let job = ctx.dispatcher.submit(request).await?;
    Ok(Json(job.into()))
}

pub async fn print_raw(
    State(ctx): State<AppContext>,
    payload: Result<Json<RawPrintBody>, JsonRejection>,
) -> ApiResult<Json<PrintResponse>> {
    let body = json_body(payload)?;
    let zpl = body
        .zpl
        .ok_or_else(|| BridgeError::invalid("zpl is required"))?;
    let request = PrintRequest {
        printer: printer_ref(body.printer_id, body.printer)?,
        content: PrintContent::Raw(zpl),
    };

    let job = ctx.dispatcher.submit(request).await?;
    Ok(Json(job.into()))
}

pub async fn job_status(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobResponse>> {
    let job_id = JobId::parse(&id).ok_or(StoreError::JobNotFound(id))?;
    let job = ctx.jobs.get(&job_id)?;
    Ok(Json(job.into()))
}

pub async fn test_print(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<ActionResponse>> {
    let job = ctx
        .dispatcher
        .submit(PrintRequest {
            printer: PrinterRef::Id(id.clone()),
            content: PrintContent::TestLabel,
        })
        .await?;

    Ok(Json(ActionResponse {
        success: true,
        message: format!("Test label sent to printer {id}"),
        job_id: Some(job.id),
    }))
}

fn route_error(status: StatusCode, error: String) -> impl IntoResponse {
    (
        status,
        Json(ErrorBody {
            error,
            code: ErrorCode::InvalidRequest,
            details: None,
            job_id: None,
        }),
    )
}

pub async fn not_found(method: Method, uri: Uri) -> impl IntoResponse {
    route_error(
        StatusCode::NOT_FOUND,
        format!("No route for {method} {}", uri.path()),
    )
}

pub async fn method_not_allowed(method: Method, uri: Uri) -> impl IntoResponse {
    route_error(
        StatusCode::METHOD_NOT_ALLOWED,
        format!("Method {method} is not allowed on {}", uri.path()),
    )
}
