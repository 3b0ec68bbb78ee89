//! Lexical scopes and the defer ledger.
//!
//! Every block, branch arm, loop body and function body runs inside
//! [`CodeGenerator::in_scope`], which captures a watermark on entry and
//! unwinds to it on exit, on success and on error alike.

use inkwell::values::PointerValue;
use ul_analysis::{DeferEntry, TypeDesc, Watermark};
use ul_frontend::Location;

use crate::error::{At, CgResult};
use crate::{CodeGenerator, FunctionState};

impl<'ctx> CodeGenerator<'ctx> {
    /// Run `f` in a fresh scope. With `sentinel` a zero-width entry is pushed
    /// first, so the body's defers sit strictly above the enclosing scope.
    pub(crate) fn in_scope<T>(
        &mut self,
        sentinel: bool,
        f: impl FnOnce(&mut Self) -> CgResult<T>,
    ) -> CgResult<T> {
        let mark = self.symbols.scope_mark(false);
        if sentinel {
            self.symbols.scope_mark(true);
        }
        match f(self) {
            Ok(value) => {
                self.unwind_to(mark)?;
                Ok(value)
            }
            Err(e) => {
                self.defers.drain_to(mark);
                self.symbols.truncate(mark);
                Err(e)
            }
        }
    }

    /// Destroy everything registered above `mark`, most recent first, then
    /// drop the names bound above it.
    ///
    /// When the current block is already terminated (the scope ended in a
    /// `return`, which destroyed these already) the entries are retired
    /// without emitting anything.
    pub(crate) fn unwind_to(&mut self, mark: Watermark) -> CgResult<()> {
        let drained = self.defers.drain_to(mark);
        tracing::trace!(mark = mark.0, drained = drained.len(), "unwind scope");
        if !self.block_terminated() {
            for entry in &drained {
                self.emit_destroy(entry)?;
            }
        }
        self.symbols.truncate(mark);
        Ok(())
    }

    /// Emit destroy calls for every pending entry above the function's entry
    /// watermark, leaving the ledger untouched.
    pub(crate) fn emit_pending_defers(&mut self, location: &Location) -> CgResult<()> {
        let entry_mark = self
            .current
            .as_ref()
            .map(|state| state.entry_mark)
            .ok_or_else(|| ul_analysis::SemanticError::invalid("`return` outside of a function"))
            .at(location)?;
        let pending: Vec<DeferEntry<PointerValue<'ctx>>> =
            self.defers.pending_above(entry_mark).cloned().collect();
        for entry in &pending {
            self.emit_destroy(entry)?;
        }
        Ok(())
    }

    /// `Class_destroy(storage)` when the class has a `destroy` method.
    fn emit_destroy(&mut self, entry: &DeferEntry<PointerValue<'ctx>>) -> CgResult<()> {
        let Some(record) = self.classes.of_type(&entry.ty).ok() else {
            return Ok(());
        };
        if !record.has_method("destroy") {
            return Ok(());
        }
        let name = record.method_link_name("destroy");
        let Some(function) = self.module.get_function(&name) else {
            return Ok(());
        };
        self.builder.build_call(function, &[entry.storage.into()], "")?;
        Ok(())
    }

    /// Schedule `storage` for destruction when the current scope exits.
    /// Skipped for non-class types and while emitting an escaping value.
    pub(crate) fn register_defer(&mut self, ty: &TypeDesc, storage: PointerValue<'ctx>) {
        if self.escaping || ty.class_name().is_none() {
            return;
        }
        self.register_owned(ty, storage);
    }

    /// Schedule a named local for destruction, regardless of escaping.
    pub(crate) fn register_owned(&mut self, ty: &TypeDesc, storage: PointerValue<'ctx>) {
        if ty.class_name().is_none() {
            return;
        }
        let watermark = self.symbols.scope_mark(true);
        self.defers.register(watermark, ty.clone(), storage);
    }

    /// Run `f` with `escaping` set, restoring the previous flag afterwards.
    pub(crate) fn while_escaping<T>(&mut self, f: impl FnOnce(&mut Self) -> CgResult<T>) -> CgResult<T> {
        let saved = std::mem::replace(&mut self.escaping, true);
        let result = f(self);
        self.escaping = saved;
        result
    }

    /// Run `f` with a clean function context (no current function, empty
    /// symbol stack and ledger) and restore everything afterwards, including
    /// the builder position. Used to emit one function body while another is
    /// in progress, e.g. when an instantiation is requested mid-body.
    pub(crate) fn detached<T>(&mut self, f: impl FnOnce(&mut Self) -> CgResult<T>) -> CgResult<T> {
        let saved_block = self.builder.get_insert_block();
        let saved_current: Option<FunctionState<'ctx>> = self.current.take();
        let saved_symbols = std::mem::take(&mut self.symbols);
        let saved_defers = std::mem::take(&mut self.defers);
        let saved_escaping = std::mem::replace(&mut self.escaping, false);

        let result = f(self);

        self.current = saved_current;
        self.symbols = saved_symbols;
        self.defers = saved_defers;
        self.escaping = saved_escaping;
        match saved_block {
            Some(block) => self.builder.position_at_end(block),
            None => self.builder.clear_insertion_position(),
        }
        result
    }
}
