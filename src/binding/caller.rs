// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CallerId(u64);

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "caller#{}", self.0)
    }
}

/// Which component holds a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerKind {
    Dispatcher,
    NameService,
    ServiceGroup,
}

#[derive(Debug, Default)]
struct Ledger {
    next_id: AtomicU64,
    active: AtomicUsize,
    released: AtomicU64,
}

/// Hands out caller registrations and keeps count of live ones.
///
/// Clones share the same ledger.
#[derive(Debug, Clone, Default)]
pub struct CallerTable {
    ledger: Arc<Ledger>,
}

impl CallerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, kind: CallerKind) -> Caller {
        let id = self.ledger.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.ledger.active.fetch_add(1, Ordering::AcqRel);
        Caller {
            id: CallerId(id),
            kind,
            ledger: Some(self.ledger.clone()),
        }
    }

    /// Registrations not yet released.
    pub fn active(&self) -> usize {
        self.ledger.active.load(Ordering::Acquire)
    }

    /// Total releases since the table was created.
    pub fn released(&self) -> u64 {
        self.ledger.released.load(Ordering::Acquire)
    }
}

/// One live registration. Released exactly once: explicitly through
/// [`Caller::release`] or implicitly on drop.
pub struct Caller {
    id: CallerId,
    kind: CallerKind,
    ledger: Option<Arc<Ledger>>,
}

impl Caller {
    pub fn id(&self) -> CallerId {
        self.id
    }

    pub fn kind(&self) -> CallerKind {
        self.kind
    }

    pub fn release(mut self) {
        self.settle();
    }

    fn settle(&mut self) {
        if let Some(ledger) = self.ledger.take() {
            ledger.active.fetch_sub(1, Ordering::AcqRel);
            ledger.released.fetch_add(1, Ordering::AcqRel);
        }
    }
}

impl Drop for Caller {
    fn drop(&mut self) {
        self.settle();
    }
}

impl fmt::Debug for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Caller")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_counts_track_releases() {
        let table = CallerTable::new();
        let a = table.register(CallerKind::Dispatcher);
        let b = table.register(CallerKind::NameService);

        assert_ne!(a.id(), b.id());
        assert_eq!(table.active(), 2);

        a.release();
        drop(b);
        assert_eq!(table.active(), 0);
        assert_eq!(table.released(), 2);
    }

    #[test]
    fn test_clones_share_the_ledger() {
        let table = CallerTable::new();
        let view = table.clone();
        let _caller = table.register(CallerKind::ServiceGroup);
        assert_eq!(view.active(), 1);
    }
}
