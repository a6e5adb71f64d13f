pub mod dispatcher;
pub mod jobs;
pub mod label;
pub mod models;
pub mod registry;
pub mod sweeper;
pub mod transport;

pub use dispatcher::{Dispatcher, PrintContent, PrintRequest, PrinterRef};
pub use jobs::{InMemoryJobStore, JobStore};
pub use label::{BadgeFields, LabelError, LabelLayout};
pub use models::{
    JobId, JobPatch, JobStatus, NewPrinter, PrintJob, Printer, PrinterPatch, PrinterStatus,
};
pub use registry::{InMemoryPrinterRegistry, PrinterStore};
pub use sweeper::spawn_sweeper;
pub use transport::{PrinterTransport, RetryPolicy, SendReport};
