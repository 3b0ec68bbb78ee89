use ul_analysis::SemanticError;
use ul_frontend::Location;
use ul_frontend::ast::{Expr, Stmt, VarDef};

use crate::CodeGenerator;
use crate::cast::as_int;
use crate::error::{At, CgResult};

fn stmt_location(stmt: &Stmt) -> &Location {
    match stmt {
        Stmt::Var(var) => &var.location,
        Stmt::If { location, .. }
        | Stmt::While { location, .. }
        | Stmt::Return { location, .. }
        | Stmt::Assign { location, .. } => location,
        Stmt::Block(block) => &block.location,
        Stmt::Expr(expr) => &expr.location,
    }
}

impl<'ctx> CodeGenerator<'ctx> {
    /// Emit a statement list. Code after a terminator goes into a fresh
    /// block with no predecessors so the function stays well-formed.
    pub(crate) fn emit_stmts(&mut self, stmts: &[Stmt]) -> CgResult<()> {
        for stmt in stmts {
            if self.block_terminated() {
                let function = self.current_function(stmt_location(stmt))?;
                let dead = self.context.append_basic_block(function, "dead");
                self.builder.position_at_end(dead);
            }
            self.emit_stmt(stmt)?;
        }
        Ok(())
    }

    pub(crate) fn emit_stmt(&mut self, stmt: &Stmt) -> CgResult<()> {
        match stmt {
            Stmt::Var(var) => self.emit_local(var),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                location,
            } => self.emit_if(cond, then_branch, else_branch.as_deref(), location),
            Stmt::While {
                cond,
                body,
                location,
            } => self.emit_while(cond, body, location),
            Stmt::Return { value, location } => self.emit_return(value.as_ref(), location),
            Stmt::Assign {
                target,
                value,
                location,
            } => self.emit_assign(target, value, location),
            Stmt::Block(block) => self.in_scope(false, |g| g.emit_stmts(&block.stmts)),
            Stmt::Expr(expr) => self.emit_value(expr).map(|_| ()),
        }
    }

    /// `let name: T (= init)?;` The initializer is evaluated before the name
    /// is bound, so it still sees any outer binding of the same name.
    fn emit_local(&mut self, var: &VarDef) -> CgResult<()> {
        let ty = self.resolve_value_type(&var.ty)?;
        let slot = self.entry_alloca(&ty, &var.name, &var.location)?;

        match (ty.class_name(), &var.init) {
            (Some(_), Some(init)) => {
                self.emit_class_into(init, &ty, Some(slot))?;
            }
            (Some(class), None) => {
                let class = class.to_string();
                self.emit_construct(&class, &[], Some(slot), &var.location)?;
            }
            (None, Some(init)) => self.emit_store_into(slot, &ty, init)?,
            (None, None) => {
                let zero = self.registry.zero_value(&ty).at(&var.location)?;
                self.builder.build_store(slot, zero)?;
            }
        }

        tracing::trace!(name = %var.name, ty = %ty, "bind local");
        self.symbols.bind(var.name.clone(), ty.clone(), slot);
        self.register_owned(&ty, slot);
        Ok(())
    }

    fn emit_condition(&mut self, cond: &Expr) -> CgResult<inkwell::values::IntValue<'ctx>> {
        let bool_ty = self.builtin("bool", &cond.location)?;
        let value = self.emit_converted(cond, &bool_ty)?;
        as_int(value, &cond.location)
    }

    fn emit_if(
        &mut self,
        cond: &Expr,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
        location: &Location,
    ) -> CgResult<()> {
        let function = self.current_function(location)?;
        let cond = self.emit_condition(cond)?;

        let then_bb = self.context.append_basic_block(function, "then");
        let else_bb = else_branch.map(|_| self.context.append_basic_block(function, "else"));
        let merge_bb = self.context.append_basic_block(function, "ifcont");
        self.builder
            .build_conditional_branch(cond, then_bb, else_bb.unwrap_or(merge_bb))?;

        self.builder.position_at_end(then_bb);
        self.in_scope(true, |g| g.emit_stmt(then_branch))?;
        if !self.block_terminated() {
            self.builder.build_unconditional_branch(merge_bb)?;
        }

        if let (Some(else_bb), Some(else_branch)) = (else_bb, else_branch) {
            self.builder.position_at_end(else_bb);
            self.in_scope(true, |g| g.emit_stmt(else_branch))?;
            if !self.block_terminated() {
                self.builder.build_unconditional_branch(merge_bb)?;
            }
        }

        self.builder.position_at_end(merge_bb);
        Ok(())
    }

    fn emit_while(&mut self, cond: &Expr, body: &Stmt, location: &Location) -> CgResult<()> {
        let function = self.current_function(location)?;
        let cond_bb = self.context.append_basic_block(function, "while.cond");
        let body_bb = self.context.append_basic_block(function, "while.body");
        let end_bb = self.context.append_basic_block(function, "while.end");

        self.builder.build_unconditional_branch(cond_bb)?;
        self.builder.position_at_end(cond_bb);
        let cond = self.emit_condition(cond)?;
        self.builder.build_conditional_branch(cond, body_bb, end_bb)?;

        self.builder.position_at_end(body_bb);
        self.in_scope(true, |g| g.emit_stmt(body))?;
        if !self.block_terminated() {
            self.builder.build_unconditional_branch(cond_bb)?;
        }

        self.builder.position_at_end(end_bb);
        Ok(())
    }

    /// The value is computed first (as escaping, so its temporaries are not
    /// scheduled), then every live class local is destroyed, then the
    /// function returns. The ledger keeps its entries for the enclosing
    /// scopes' own exits. Destroys deliberately follow the value rather than
    /// precede it, so a returned local is read before it is torn down.
    fn emit_return(&mut self, value: Option<&Expr>, location: &Location) -> CgResult<()> {
        let ret = self
            .current
            .as_ref()
            .map(|state| state.ret.clone())
            .ok_or_else(|| SemanticError::invalid("`return` outside of a function"))
            .at(location)?;

        match value {
            None if ret.is_void() => {
                self.emit_pending_defers(location)?;
                self.builder.build_return(None)?;
            }
            None => return Err(SemanticError::non_castable("void", &ret)).at(location),
            Some(expr) if ret.is_void() => {
                let from = self.type_of(expr)?;
                return Err(SemanticError::non_castable(&from, "void")).at(&expr.location);
            }
            Some(expr) => {
                let value = self.while_escaping(|g| {
                    if ret.class_name().is_some() {
                        let storage = g.emit_class_into(expr, &ret, None)?;
                        g.load(&ret, storage, &expr.location)
                    } else {
                        g.emit_converted(expr, &ret)
                    }
                })?;
                self.emit_pending_defers(location)?;
                self.builder.build_return(Some(&value))?;
            }
        }
        Ok(())
    }

    fn emit_assign(&mut self, target: &Expr, value: &Expr, location: &Location) -> CgResult<()> {
        let ty = self.type_of(target)?;
        if ty.class_name().is_some() {
            let dest = self.address_of(target)?;
            self.emit_class_into(value, &ty, Some(dest))?;
            return Ok(());
        }
        let rhs = self.emit_converted(value, &ty)?;
        let dest = self.address_of(target)?;
        tracing::trace!(at = %location, "assign");
        self.builder.build_store(dest, rhs)?;
        Ok(())
    }
}
