use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use uuid::Uuid;

/// Raw printing port (JetDirect / ZPL over TCP).
pub const DEFAULT_PRINTER_PORT: u16 = 9100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrinterStatus {
    Online,
    Offline,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Printer {
    pub id: String,
    pub name: String,
    pub ip_address: IpAddr,
    pub port: u16,
    pub status: PrinterStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Printer {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip_address, self.port)
    }
}

/// Input for registering a printer. The id is generated when absent.
#[derive(Debug, Clone)]
pub struct NewPrinter {
    pub id: Option<String>,
    pub name: String,
    pub address: SocketAddr,
}

impl NewPrinter {
    pub fn new(name: impl Into<String>, address: SocketAddr) -> Self {
        Self {
            id: None,
            name: name.into(),
            address,
        }
    }

    pub fn into_printer(self) -> Printer {
        Printer {
            id: self.id.unwrap_or_else(|| Uuid::now_v7().to_string()),
            name: self.name,
            ip_address: self.address.ip(),
            port: self.address.port(),
            status: PrinterStatus::Unknown,
            last_seen: None,
            created_at: Utc::now(),
        }
    }
}

/// Partial printer update. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct PrinterPatch {
    pub name: Option<String>,
    pub address: Option<SocketAddr>,
    pub status: Option<PrinterStatus>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl PrinterPatch {
    /// Patch recording the outcome of a connection to the printer.
    pub fn reachability(online: bool) -> Self {
        if online {
            Self {
                status: Some(PrinterStatus::Online),
                last_seen: Some(Utc::now()),
                ..Default::default()
            }
        } else {
            Self {
                status: Some(PrinterStatus::Offline),
                ..Default::default()
            }
        }
    }

    pub fn apply(self, printer: &mut Printer) {
        if let Some(name) = self.name {
            printer.name = name;
        }
        if let Some(address) = self.address {
            printer.ip_address = address.ip();
            printer.port = address.port();
        }
        if let Some(status) = self.status {
            printer.status = status;
        }
        if let Some(last_seen) = self.last_seen {
            printer.last_seen = Some(last_seen);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Sent,
    Success,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Sent => 1,
            Self::Success | Self::Failed => 2,
        }
    }

    /// Whether a job may move from `self` to `next`. Staying put is allowed
    /// for non-terminal states so counters can be updated in place.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() >= self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintJob {
    pub id: JobId,
    pub printer_id: String,
    pub payload: String,
    pub status: JobStatus,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl PrintJob {
    pub fn new(printer_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            printer_id: printer_id.into(),
            payload: payload.into(),
            status: JobStatus::Pending,
            retry_count: 0,
            created_at: Utc::now(),
            sent_at: None,
            completed_at: None,
            error_message: None,
        }
    }
}

/// Partial job update, merged atomically by the job store.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub retry_count: Option<u32>,
    pub sent_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl JobPatch {
    pub fn sent() -> Self {
        Self {
            status: Some(JobStatus::Sent),
            sent_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn succeeded(retry_count: u32) -> Self {
        Self {
            status: Some(JobStatus::Success),
            retry_count: Some(retry_count),
            completed_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn failed(retry_count: u32, error_message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            retry_count: Some(retry_count),
            completed_at: Some(Utc::now()),
            error_message: Some(error_message.into()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_are_frozen() {
        assert!(!JobStatus::Success.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Success.can_transition_to(JobStatus::Pending));
    }

    #[test]
    fn test_forward_transitions() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Sent));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Sent.can_transition_to(JobStatus::Success));
        assert!(JobStatus::Sent.can_transition_to(JobStatus::Sent));
        assert!(!JobStatus::Sent.can_transition_to(JobStatus::Pending));
    }

    #[test]
    fn test_new_printer_defaults() {
        let addr: SocketAddr = "192.168.1.50:9100".parse().unwrap();
        let printer = NewPrinter::new("Lobby", addr).into_printer();

        assert!(!printer.id.is_empty());
        assert_eq!(printer.port, DEFAULT_PRINTER_PORT);
        assert_eq!(printer.status, PrinterStatus::Unknown);
        assert!(printer.last_seen.is_none());
    }

    #[test]
    fn test_patch_merges_only_supplied_fields() {
        let addr: SocketAddr = "10.0.0.7:9100".parse().unwrap();
        let mut printer = NewPrinter::new("Front Desk", addr).into_printer();

        PrinterPatch::reachability(false).apply(&mut printer);

        assert_eq!(printer.name, "Front Desk");
        assert_eq!(printer.socket_addr(), addr);
        assert_eq!(printer.status, PrinterStatus::Offline);
        assert!(printer.last_seen.is_none());
    }

    #[test]
    fn test_printer_serializes_camel_case() {
        let addr: SocketAddr = "192.168.1.50:9100".parse().unwrap();
        let printer = NewPrinter::new("Lobby", addr).into_printer();
        let json = serde_json::to_value(&printer).unwrap();

        assert_eq!(json["ipAddress"], "192.168.1.50");
        assert_eq!(json["port"], 9100);
        assert_eq!(json["status"], "unknown");
        assert!(json.get("lastSeen").is_none());
    }
}
