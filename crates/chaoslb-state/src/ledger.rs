//! Ledger — the in-memory record of created host resources.
//!
//! All reads and writes go through a single `RwLock`. The ledger is
//! `Clone` and cheap to share between the reconciler, the teardown task
//! and anything that reports on it.

use std::sync::Arc;

use tokio::sync::{RwLock, RwLockWriteGuard};
use tracing::debug;

use crate::types::*;

/// Contents guarded by the ledger lock.
#[derive(Debug, Default)]
pub struct LedgerContents {
    entries: Vec<LedgerEntry>,
    originals: Vec<OriginalParameter>,
}

impl LedgerContents {
    /// All entries, in recording order.
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Entries of one kind, in recording order.
    pub fn entries_of(&self, kind: EntryKind) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter().filter(move |e| e.kind() == kind)
    }

    pub fn count(&self, kind: EntryKind) -> usize {
        self.entries_of(kind).count()
    }

    pub fn originals(&self) -> &[OriginalParameter] {
        &self.originals
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.originals.is_empty()
    }

    /// Drain everything, leaving the ledger empty.
    pub fn take(&mut self) -> LedgerContents {
        std::mem::take(self)
    }

    fn push(&mut self, entry: LedgerEntry) {
        debug!(%entry, "ledger entry recorded");
        self.entries.push(entry);
    }

    fn capture(&mut self, name: &str, value: &str) -> bool {
        if self.originals.iter().any(|p| p.name == name) {
            return false;
        }
        self.originals.push(OriginalParameter {
            name: name.to_string(),
            previous_value: value.to_string(),
        });
        debug!(%name, %value, "original parameter captured");
        true
    }
}

/// Shared handle to the ledger.
#[derive(Clone, Default)]
pub struct Ledger {
    inner: Arc<RwLock<LedgerContents>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Returns how many entries of that kind the ledger
    /// now holds.
    pub async fn record(&self, entry: LedgerEntry) -> usize {
        let kind = entry.kind();
        let mut contents = self.inner.write().await;
        contents.push(entry);
        contents.count(kind)
    }

    /// Capture the pre-override value of a tunable.
    ///
    /// Only the first capture per name is kept; returns whether this call
    /// stored a value.
    pub async fn capture_parameter(&self, name: &str, value: &str) -> bool {
        self.inner.write().await.capture(name, value)
    }

    /// Snapshot of all entries.
    pub async fn entries(&self) -> Vec<LedgerEntry> {
        self.inner.read().await.entries().to_vec()
    }

    pub async fn count(&self, kind: EntryKind) -> usize {
        self.inner.read().await.count(kind)
    }

    /// Snapshot of captured original parameters.
    pub async fn original_parameters(&self) -> Vec<OriginalParameter> {
        self.inner.read().await.originals().to_vec()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Exclusive access for the duration of a teardown.
    pub async fn lock(&self) -> RwLockWriteGuard<'_, LedgerContents> {
        self.inner.write().await
    }
}
