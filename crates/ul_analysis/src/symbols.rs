use crate::types::TypeDesc;

/// Snapshot of a [`SymbolTable`] length, used as a scope boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark(pub usize);

/// A bound name. Sentinel entries have no name and no storage.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedValue<H> {
    pub name: Option<String>,
    pub ty: TypeDesc,
    pub storage: Option<H>,
}

/// Stack of named values, generic over the backend storage handle `H`.
///
/// Shadowing falls out of scanning from the top: the most recent binding of a
/// name wins until the stack is truncated below it.
#[derive(Debug, Clone)]
pub struct SymbolTable<H> {
    entries: Vec<NamedValue<H>>,
}

impl<H> Default for SymbolTable<H> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<H: Copy> SymbolTable<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current length as a watermark, optionally after pushing a sentinel.
    pub fn scope_mark(&mut self, push_sentinel: bool) -> Watermark {
        if push_sentinel {
            self.entries.push(NamedValue {
                name: None,
                ty: TypeDesc::class(""),
                storage: None,
            });
        }
        Watermark(self.entries.len())
    }

    pub fn bind(&mut self, name: impl Into<String>, ty: TypeDesc, storage: H) {
        self.entries.push(NamedValue {
            name: Some(name.into()),
            ty,
            storage: Some(storage),
        });
    }

    /// Index of the innermost binding of `name`.
    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .rposition(|e| e.name.as_deref() == Some(name))
    }

    pub fn get(&self, index: usize) -> Option<&NamedValue<H>> {
        self.entries.get(index)
    }

    /// Look up `name` and return its entry.
    pub fn resolve(&self, name: &str) -> Option<&NamedValue<H>> {
        self.lookup(name).and_then(|i| self.get(i))
    }

    /// Point an existing binding at new storage, or bind it fresh.
    pub fn rebind_or_bind(&mut self, storage: H, name: &str, ty: TypeDesc) {
        match self.lookup(name) {
            Some(index) => {
                let entry = &mut self.entries[index];
                entry.storage = Some(storage);
                entry.ty = ty;
            }
            None => self.bind(name, ty, storage),
        }
    }

    /// Drop every entry above `mark`. Pending defers are the caller's business.
    pub fn truncate(&mut self, mark: Watermark) {
        self.entries.truncate(mark.0);
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
    use crate::types::Prim;

    fn int() -> TypeDesc {
        TypeDesc::builtin("int", Prim::I32)
    }

    fn float() -> TypeDesc {
        TypeDesc::builtin("float", Prim::F32)
    }

    #[test]
    fn test_shadowing_and_unwind() {
        let mut table: SymbolTable<u32> = SymbolTable::new();
        table.bind("x", int(), 1);
        let mark = table.scope_mark(false);
        table.bind("x", float(), 2);

        let inner = table.resolve("x").unwrap();
        assert_eq!(inner.storage, Some(2));
        assert_eq!(inner.ty, float());

        table.truncate(mark);
        let outer = table.resolve("x").unwrap();
        assert_eq!(outer.storage, Some(1));
        assert_eq!(outer.ty, int());
    }

    #[test]
    fn test_lookup_missing_is_none() {
        let mut table: SymbolTable<u32> = SymbolTable::new();
        table.bind("a", int(), 0);
        assert_eq!(table.lookup("b"), None);
        assert_eq!(table.lookup("a"), Some(0));
    }

    #[test]
    fn test_sentinel_raises_watermark() {
        let mut table: SymbolTable<u32> = SymbolTable::new();
        let plain = table.scope_mark(false);
        let with_sentinel = table.scope_mark(true);
        assert_eq!(plain, Watermark(0));
        assert_eq!(with_sentinel, Watermark(1));
        assert_eq!(table.lookup(""), None);
    }

    #[test]
    fn test_rebind_or_bind() {
        let mut table: SymbolTable<u32> = SymbolTable::new();
        table.rebind_or_bind(7, "g", int());
        assert_eq!(table.len(), 1);
        table.rebind_or_bind(8, "g", float());
        assert_eq!(table.len(), 1);
        let entry = table.resolve("g").unwrap();
        assert_eq!(entry.storage, Some(8));
        assert_eq!(entry.ty, float());
    }
}
