use std::collections::HashMap;

use crate::worker::protocol::ConnectionId;

/// Connections admitted but not yet closed. The run may only end once this is
/// empty.
#[derive(Debug, Default)]
pub struct OutstandingLedger {
    pending: HashMap<ConnectionId, u64>,
    total: u64,
}

impl OutstandingLedger {
    pub fn admit(&mut self, id: ConnectionId) {
        let count = self.pending.entry(id).or_insert(0);
        *count = count.saturating_add(1);
        self.total = self.total.saturating_add(1);
    }

    /// Settles one admission of `id`. Returns `false` for an id with nothing
    /// outstanding.
    pub fn close(&mut self, id: &ConnectionId) -> bool {
        let Some(count) = self.pending.get_mut(id) else {
            return false;
        };
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.pending.remove(id);
        }
        self.total = self.total.saturating_sub(1);
        true
    }

    #[must_use]
    pub const fn len(&self) -> u64 {
        self.total
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Open connections per id, for progress display only.
#[derive(Debug, Default)]
pub struct ConcurrencyLedger {
    active: HashMap<ConnectionId, u64>,
    total: u64,
}

impl ConcurrencyLedger {
    pub fn open(&mut self, id: ConnectionId) {
        let count = self.active.entry(id).or_insert(0);
        *count = count.saturating_add(1);
        self.total = self.total.saturating_add(1);
    }

    /// Connections that close without having opened are ignored.
    pub fn close(&mut self, id: &ConnectionId) {
        if let Some(count) = self.active.get_mut(id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.active.remove(id);
            }
            self.total = self.total.saturating_sub(1);
        }
    }

    #[must_use]
    pub const fn active(&self) -> u64 {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, AppResult};

    #[test]
    fn outstanding_entries_disappear_at_zero() -> AppResult<()> {
        let mut ledger = OutstandingLedger::default();
        let id = ConnectionId::new("ws://ledger.test", 1);
        ledger.admit(id.clone());
        ledger.admit(id.clone());
        if !ledger.close(&id) || ledger.is_empty() || ledger.len() != 1 {
            return Err(AppError::validation("Expected one outstanding admission"));
        }
        if !ledger.close(&id) || !ledger.is_empty() {
            return Err(AppError::validation("Expected an empty ledger"));
        }
        if ledger.close(&id) {
            return Err(AppError::validation("Unknown ids must not settle"));
        }
        Ok(())
    }

    #[test]
    fn concurrency_ignores_closes_without_open() -> AppResult<()> {
        let mut ledger = ConcurrencyLedger::default();
        let opened = ConnectionId::new("ws://ledger.test", 1);
        let failed = ConnectionId::new("ws://ledger.test", 2);
        ledger.open(opened.clone());
        ledger.close(&failed);
        if ledger.active() != 1 {
            return Err(AppError::validation("Close without open changed the count"));
        }
        ledger.close(&opened);
        if ledger.active() != 0 {
            return Err(AppError::validation("Expected no active connections"));
        }
        Ok(())
    }
}
