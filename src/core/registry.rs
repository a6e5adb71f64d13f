//! In-memory printer registry.
//!
//! The map lock is only held to look up, insert or remove an entry. Merging a
//! partial update happens under the printer's own mutex, so updates to
//! different printers never contend with each other.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, info};

use super::models::{NewPrinter, Printer, PrinterPatch};
use crate::error::StoreError;

/// Storage seam for printer records.
pub trait PrinterStore: Send + Sync {
    /// All printers, oldest registration first.
    fn list(&self) -> Vec<Printer>;

    fn get(&self, id: &str) -> Result<Printer, StoreError>;

    fn add(&self, printer: NewPrinter) -> Result<Printer, StoreError>;

    fn update(&self, id: &str, patch: PrinterPatch) -> Result<Printer, StoreError>;

    fn remove(&self, id: &str) -> Result<Printer, StoreError>;

    /// Return the printer registered at `printer.address`, registering it if
    /// none exists. The boolean is true when a new record was created.
    fn register_if_absent(&self, printer: NewPrinter) -> Result<(Printer, bool), StoreError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
pub struct InMemoryPrinterRegistry {
    printers: RwLock<HashMap<String, Arc<Mutex<Printer>>>>,
}

impl InMemoryPrinterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: &str) -> Result<Arc<Mutex<Printer>>, StoreError> {
        let map = self.printers.read().unwrap_or_else(PoisonError::into_inner);
        map.get(id)
            .cloned()
            .ok_or_else(|| StoreError::PrinterNotFound(id.to_string()))
    }

    fn snapshot(entry: &Mutex<Printer>) -> Printer {
        entry.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn find_in(
        map: &HashMap<String, Arc<Mutex<Printer>>>,
        address: SocketAddr,
    ) -> Option<Printer> {
        map.values()
            .map(|entry| Self::snapshot(entry))
            .find(|printer| printer.socket_addr() == address)
    }
}

impl PrinterStore for InMemoryPrinterRegistry {
    fn list(&self) -> Vec<Printer> {
        let entries: Vec<_> = {
            let map = self.printers.read().unwrap_or_else(PoisonError::into_inner);
            map.values().cloned().collect()
        };
        let mut printers: Vec<Printer> = entries.iter().map(|e| Self::snapshot(e)).collect();
        printers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        printers
    }

    fn get(&self, id: &str) -> Result<Printer, StoreError> {
        self.entry(id).map(|entry| Self::snapshot(&entry))
    }

    fn add(&self, printer: NewPrinter) -> Result<Printer, StoreError> {
        let printer = printer.into_printer();
        let mut map = self.printers.write().unwrap_or_else(PoisonError::into_inner);
        if map.contains_key(&printer.id) {
            return Err(StoreError::DuplicatePrinter(printer.id));
        }
        map.insert(printer.id.clone(), Arc::new(Mutex::new(printer.clone())));
        info!(printer_id = %printer.id, addr = %printer.socket_addr(), "Printer registered");
        Ok(printer)
    }

    fn update(&self, id: &str, patch: PrinterPatch) -> Result<Printer, StoreError> {
        let entry = self.entry(id)?;
        let mut printer = entry.lock().unwrap_or_else(PoisonError::into_inner);
        patch.apply(&mut printer);
        debug!(printer_id = %id, status = ?printer.status, "Printer updated");
        Ok(printer.clone())
    }

    fn remove(&self, id: &str) -> Result<Printer, StoreError> {
        let removed = {
            let mut map = self.printers.write().unwrap_or_else(PoisonError::into_inner);
            map.remove(id)
        };
        match removed {
            Some(entry) => {
                info!(printer_id = %id, "Printer removed");
                Ok(Self::snapshot(&entry))
            }
            None => Err(StoreError::PrinterNotFound(id.to_string())),
        }
    }

    fn register_if_absent(&self, printer: NewPrinter) -> Result<(Printer, bool), StoreError> {
        if let Some(existing) = {
            let map = self.printers.read().unwrap_or_else(PoisonError::into_inner);
            Self::find_in(&map, printer.address)
        } {
            return Ok((existing, false));
        }

        // Re-check under the write lock: another request may have registered
        // the same address in between.
        let mut map = self.printers.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = Self::find_in(&map, printer.address) {
            return Ok((existing, false));
        }
        let printer = printer.into_printer();
        if map.contains_key(&printer.id) {
            return Err(StoreError::DuplicatePrinter(printer.id));
        }
        map.insert(printer.id.clone(), Arc::new(Mutex::new(printer.clone())));
        info!(printer_id = %printer.id, addr = %printer.socket_addr(), "Printer auto-registered");
        Ok((printer, true))
    }

    fn len(&self) -> usize {
        self.printers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
