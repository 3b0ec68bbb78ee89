use crate::symbols::Watermark;
use crate::types::TypeDesc;

/// A pending destructor-like call on `storage`, owned by the scope that was
/// open at `watermark`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeferEntry<H> {
    pub watermark: Watermark,
    pub ty: TypeDesc,
    pub storage: H,
}

/// Scope-tagged queue of cleanup calls for class-typed storage.
#[derive(Debug, Clone)]
pub struct DeferLedger<H> {
    entries: Vec<DeferEntry<H>>,
}

impl<H> Default for DeferLedger<H> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<H: Copy + PartialEq> DeferLedger<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a cleanup. Storage that already has one is left alone; returns
    /// whether the entry was added.
    pub fn register(&mut self, watermark: Watermark, ty: TypeDesc, storage: H) -> bool {
        if self.entries.iter().any(|e| e.storage == storage) {
            return false;
        }
        tracing::trace!(watermark = watermark.0, ty = %ty, "defer registered");
        self.entries.push(DeferEntry {
            watermark,
            ty,
            storage,
        });
        true
    }

    /// Entries above `mark`, most recent first, without removing them.
    pub fn pending_above(&self, mark: Watermark) -> impl Iterator<Item = &DeferEntry<H>> {
        self.entries
            .iter()
            .rev()
            .take_while(move |e| e.watermark > mark)
    }

    /// Pop every entry above `mark`, most recent first.
    pub fn drain_to(&mut self, mark: Watermark) -> Vec<DeferEntry<H>> {
        let mut drained = Vec::new();
        while self.entries.last().is_some_and(|e| e.watermark > mark) {
            drained.extend(self.entries.pop());
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn res() -> TypeDesc {
        TypeDesc::class("Res")
    }

    #[test]
    fn test_drain_is_lifo() {
        let mut ledger = DeferLedger::new();
        for (w, storage) in [(1, 10), (2, 20), (3, 30)] {
            ledger.register(Watermark(w), res(), storage);
        }
        let order: Vec<i32> = ledger.drain_to(Watermark(0)).iter().map(|e| e.storage).collect();
        assert_eq!(order, vec![30, 20, 10]);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_drain_stops_at_watermark() {
        let mut ledger = DeferLedger::new();
        ledger.register(Watermark(1), res(), 1);
        ledger.register(Watermark(4), res(), 2);
        ledger.register(Watermark(5), res(), 3);
        let drained = ledger.drain_to(Watermark(4));
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].storage, 3);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_register_is_idempotent_per_storage() {
        let mut ledger = DeferLedger::new();
        assert!(ledger.register(Watermark(2), res(), 42));
        assert!(!ledger.register(Watermark(2), res(), 42));
        assert!(!ledger.register(Watermark(7), res(), 42));
        assert_eq!(ledger.drain_to(Watermark(0)).len(), 1);
    }

    #[test]
    fn test_pending_above_does_not_remove() {
        let mut ledger = DeferLedger::new();
        ledger.register(Watermark(1), res(), 1);
        ledger.register(Watermark(3), res(), 2);
        let pending: Vec<i32> = ledger.pending_above(Watermark(0)).map(|e| e.storage).collect();
        assert_eq!(pending, vec![2, 1]);
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.pending_above(Watermark(3)).count(), 0);
    }
}
