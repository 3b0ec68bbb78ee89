//! Expression emission: rvalues, lvalue addresses and class-typed storage.

use inkwell::module::Linkage;
use inkwell::types::{BasicType, BasicTypeEnum};
use inkwell::values::{BasicValueEnum, PointerValue};
use inkwell::{FloatPredicate, IntPredicate};
use ul_analysis::{SemanticError, TypeDesc};
use ul_frontend::Location;
use ul_frontend::ast::{BinaryOp, Expr, ExprKind, UnaryOp};

use crate::CodeGenerator;
use crate::cast::{as_float, as_int, as_pointer};
use crate::error::{At, CgResult};
use crate::typer::wider;

impl<'ctx> CodeGenerator<'ctx> {
    /// Emit `expr` and return its value, or `None` for a call to a `void`
    /// function.
    pub(crate) fn emit_value(&mut self, expr: &Expr) -> CgResult<Option<BasicValueEnum<'ctx>>> {
        let loc = &expr.location;
        let value: BasicValueEnum<'ctx> = match &expr.kind {
            ExprKind::Int(n) => self.context.i32_type().const_int(*n as u64, true).into(),
            ExprKind::Float(f) => self.context.f32_type().const_float(*f).into(),
            ExprKind::Char(c) => self.context.i8_type().const_int(u64::from(*c), false).into(),
            ExprKind::Bool(b) => self.context.bool_type().const_int(u64::from(*b), false).into(),
            ExprKind::Str(bytes) => self.string_literal(bytes).into(),

            ExprKind::Ident(name) => {
                let (slot, ty) = self
                    .lookup_value(name)
                    .ok_or_else(|| SemanticError::UndeclaredIdentifier(name.clone()))
                    .at(loc)?;
                self.load(&ty, slot, loc)?
            }

            ExprKind::Unary { op, operand } => self.emit_unary(*op, operand, loc)?,
            ExprKind::Binary { op, lhs, rhs } => self.emit_binary(*op, lhs, rhs, loc)?,

            ExprKind::Member { .. } | ExprKind::Index { .. } => {
                let ty = self.type_of(expr)?;
                let addr = self.address_of(expr)?;
                self.load(&ty, addr, loc)?
            }

            ExprKind::Call { callee, args } => {
                let ty = self.type_of(expr)?;
                let Some(value) = self.emit_call(callee, args, loc)? else {
                    return Ok(None);
                };
                // Constructor calls already own a registered temporary.
                if ty.class_name().is_some() && !self.is_type_name(callee) {
                    self.spill_class_result(value, &ty, None, loc)?;
                }
                value
            }

            ExprKind::As { ty, expr: inner } => {
                let to = self.resolve_type(ty)?;
                self.emit_converted(inner, &to)?
            }
            ExprKind::New { ty, expr: inner } => {
                let to = self.resolve_type(ty)?;
                self.while_escaping(|g| g.emit_converted(inner, &to))?
            }

            ExprKind::SizeOf(tref) => {
                let ty = self.resolve_value_type(tref)?;
                let llvm_ty = self.registry.basic_type(&ty).at(loc)?;
                llvm_ty
                    .size_of()
                    .ok_or_else(|| SemanticError::invalid(format!("`{ty}` has no static size")))
                    .at(loc)?
                    .into()
            }
        };
        Ok(Some(value))
    }

    /// Emit `expr`, which must produce a value.
    pub(crate) fn emit_expr(&mut self, expr: &Expr) -> CgResult<BasicValueEnum<'ctx>> {
        self.emit_value(expr)?
            .ok_or_else(|| SemanticError::non_castable("void", "a value"))
            .at(&expr.location)
    }

    /// Emit `expr` converted to `to`.
    pub(crate) fn emit_converted(&mut self, expr: &Expr, to: &TypeDesc) -> CgResult<BasicValueEnum<'ctx>> {
        let from = self.type_of(expr)?;
        let value = self.emit_expr(expr)?;
        self.emit_cast(value, &from, to, &expr.location)
    }

    fn is_type_name(&self, callee: &Expr) -> bool {
        matches!(&callee.kind, ExprKind::Ident(name) if self.types.contains(name))
    }

    /// Private NUL-terminated byte array. Embedded NULs are kept.
    fn string_literal(&self, bytes: &[u8]) -> PointerValue<'ctx> {
        let init = self.context.const_string(bytes, true);
        let global = self.module.add_global(init.get_type(), None, "str");
        global.set_initializer(&init);
        global.set_constant(true);
        global.set_linkage(Linkage::Private);
        global.set_unnamed_addr(true);
        global.as_pointer_value()
    }

    // ---- Operators ----

    fn emit_unary(
        &mut self,
        op: UnaryOp,
        operand: &Expr,
        loc: &Location,
    ) -> CgResult<BasicValueEnum<'ctx>> {
        match op {
            UnaryOp::Neg => {
                let ty = self.type_of(operand)?;
                let value = self.emit_expr(operand)?;
                if ty.is_float() {
                    Ok(self.builder.build_float_neg(as_float(value, loc)?, "neg")?.into())
                } else if ty.is_integer() {
                    Ok(self.builder.build_int_neg(as_int(value, loc)?, "neg")?.into())
                } else {
                    Err(SemanticError::invalid(format!("cannot negate `{ty}`"))).at(loc)
                }
            }
            UnaryOp::Not => {
                let bool_ty = self.builtin("bool", loc)?;
                let value = self.emit_converted(operand, &bool_ty)?;
                Ok(self.builder.build_not(as_int(value, loc)?, "not")?.into())
            }
            UnaryOp::Deref => {
                let ty = self.type_of(operand)?;
                let pointee = ty
                    .pointee()
                    .cloned()
                    .ok_or_else(|| SemanticError::invalid(format!("cannot dereference `{ty}`")))
                    .at(loc)?;
                let ptr = as_pointer(self.emit_expr(operand)?, loc)?;
                self.load(&pointee, ptr, loc)
            }
            UnaryOp::AddrOf => Ok(self.address_of(operand)?.into()),
        }
    }

    fn emit_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        loc: &Location,
    ) -> CgResult<BasicValueEnum<'ctx>> {
        let lt = self.type_of(lhs)?;
        if lt.class_name().is_some() {
            let (value, ret) = self.emit_operator_call(op, lhs, rhs, &lt, loc)?;
            if ret.class_name().is_some() {
                self.spill_class_result(value, &ret, None, loc)?;
            }
            return Ok(value);
        }

        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            let bool_ty = self.builtin("bool", loc)?;
            let l = as_int(self.emit_converted(lhs, &bool_ty)?, loc)?;
            let r = as_int(self.emit_converted(rhs, &bool_ty)?, loc)?;
            let value = if op == BinaryOp::And {
                self.builder.build_and(l, r, "and")?
            } else {
                self.builder.build_or(l, r, "or")?
            };
            return Ok(value.into());
        }

        let rt = self.type_of(rhs)?;
        if lt.is_pointer() || rt.is_pointer() {
            return self.emit_pointer_binary(op, lhs, &lt, rhs, &rt, loc);
        }

        let common = wider(lt, rt);
        let l = self.emit_converted(lhs, &common)?;
        let r = self.emit_converted(rhs, &common)?;
        if common.is_float() {
            self.emit_float_binary(op, l, r, loc)
        } else if common.is_integer() {
            let signed = common.prim().is_some_and(|p| p.is_signed());
            self.emit_int_binary(op, l, r, signed, loc)
        } else {
            Err(SemanticError::invalid(format!(
                "operator `{}` is not defined on `{common}`",
                op.symbol()
            )))
            .at(loc)
        }
    }

    fn emit_float_binary(
        &mut self,
        op: BinaryOp,
        l: BasicValueEnum<'ctx>,
        r: BasicValueEnum<'ctx>,
        loc: &Location,
    ) -> CgResult<BasicValueEnum<'ctx>> {
        let (l, r) = (as_float(l, loc)?, as_float(r, loc)?);
        let b = &self.builder;
        let cmp = |pred| b.build_float_compare(pred, l, r, "fcmp");
        let value: BasicValueEnum<'ctx> = match op {
            BinaryOp::Add => b.build_float_add(l, r, "fadd")?.into(),
            BinaryOp::Sub => b.build_float_sub(l, r, "fsub")?.into(),
            BinaryOp::Mul => b.build_float_mul(l, r, "fmul")?.into(),
            BinaryOp::Div => b.build_float_div(l, r, "fdiv")?.into(),
            BinaryOp::Mod => b.build_float_rem(l, r, "frem")?.into(),
            BinaryOp::Eq => cmp(FloatPredicate::OEQ)?.into(),
            BinaryOp::NotEq => cmp(FloatPredicate::ONE)?.into(),
            BinaryOp::Lt => cmp(FloatPredicate::OLT)?.into(),
            BinaryOp::LtEq => cmp(FloatPredicate::OLE)?.into(),
            BinaryOp::Gt => cmp(FloatPredicate::OGT)?.into(),
            BinaryOp::GtEq => cmp(FloatPredicate::OGE)?.into(),
            other => {
                return Err(SemanticError::invalid(format!(
                    "operator `{}` is not defined on `float`",
                    other.symbol()
                )))
                .at(loc);
            }
        };
        Ok(value)
    }

    fn emit_int_binary(
        &mut self,
        op: BinaryOp,
        l: BasicValueEnum<'ctx>,
        r: BasicValueEnum<'ctx>,
        signed: bool,
        loc: &Location,
    ) -> CgResult<BasicValueEnum<'ctx>> {
        let (l, r) = (as_int(l, loc)?, as_int(r, loc)?);
        let b = &self.builder;
        let cmp = |signed_pred, unsigned_pred| {
            let pred = if signed { signed_pred } else { unsigned_pred };
            b.build_int_compare(pred, l, r, "icmp")
        };
        let value = match op {
            BinaryOp::Add => b.build_int_add(l, r, "add")?,
            BinaryOp::Sub => b.build_int_sub(l, r, "sub")?,
            BinaryOp::Mul => b.build_int_mul(l, r, "mul")?,
            BinaryOp::Div if signed => b.build_int_signed_div(l, r, "sdiv")?,
            BinaryOp::Div => b.build_int_unsigned_div(l, r, "udiv")?,
            BinaryOp::Mod if signed => b.build_int_signed_rem(l, r, "srem")?,
            BinaryOp::Mod => b.build_int_unsigned_rem(l, r, "urem")?,
            BinaryOp::BitAnd => b.build_and(l, r, "band")?,
            BinaryOp::BitOr => b.build_or(l, r, "bor")?,
            BinaryOp::BitXor => b.build_xor(l, r, "bxor")?,
            BinaryOp::Eq => cmp(IntPredicate::EQ, IntPredicate::EQ)?,
            BinaryOp::NotEq => cmp(IntPredicate::NE, IntPredicate::NE)?,
            BinaryOp::Lt => cmp(IntPredicate::SLT, IntPredicate::ULT)?,
            BinaryOp::LtEq => cmp(IntPredicate::SLE, IntPredicate::ULE)?,
            BinaryOp::Gt => cmp(IntPredicate::SGT, IntPredicate::UGT)?,
            BinaryOp::GtEq => cmp(IntPredicate::SGE, IntPredicate::UGE)?,
            BinaryOp::And | BinaryOp::Or => {
                return Err(SemanticError::invalid("logical operators take bool operands")).at(loc);
            }
        };
        Ok(value.into())
    }

    /// `ptr + int` and `ptr - int` step by element; comparisons involving a
    /// pointer compare addresses as unsigned 64-bit integers.
    fn emit_pointer_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        lt: &TypeDesc,
        rhs: &Expr,
        rt: &TypeDesc,
        loc: &Location,
    ) -> CgResult<BasicValueEnum<'ctx>> {
        let offset = match (op, lt.is_pointer(), rt.is_pointer()) {
            (BinaryOp::Add | BinaryOp::Sub, true, false) if rt.is_integer() => Some((lhs, lt, rhs)),
            (BinaryOp::Add, false, true) if lt.is_integer() => Some((rhs, rt, lhs)),
            _ => None,
        };
        if let Some((base, base_ty, index)) = offset {
            let ptr = as_pointer(self.emit_expr(base)?, loc)?;
            let i64_ty = self.builtin("i64", loc)?;
            let mut step = as_int(self.emit_converted(index, &i64_ty)?, loc)?;
            if op == BinaryOp::Sub {
                step = self.builder.build_int_neg(step, "neg")?;
            }
            let elem = self.element_type(base_ty, loc)?;
            // SAFETY: the offset is computed by the program; LLVM only needs a
            // well-typed index here.
            let stepped = unsafe { self.builder.build_in_bounds_gep(elem, ptr, &[step], "ptradd")? };
            return Ok(stepped.into());
        }

        if !op.yields_bool() || matches!(op, BinaryOp::And | BinaryOp::Or) {
            return Err(SemanticError::invalid(format!(
                "operator `{}` is not defined on `{lt}` and `{rt}`",
                op.symbol()
            )))
            .at(loc);
        }
        let addr_ty = self.builtin("u64", loc)?;
        let l = as_int(self.emit_converted(lhs, &addr_ty)?, loc)?;
        let r = as_int(self.emit_converted(rhs, &addr_ty)?, loc)?;
        let pred = match op {
            BinaryOp::Eq => IntPredicate::EQ,
            BinaryOp::NotEq => IntPredicate::NE,
            BinaryOp::Lt => IntPredicate::ULT,
            BinaryOp::LtEq => IntPredicate::ULE,
            BinaryOp::Gt => IntPredicate::UGT,
            _ => IntPredicate::UGE,
        };
        Ok(self.builder.build_int_compare(pred, l, r, "pcmp")?.into())
    }

    /// Backend element type a pointer of type `ptr_ty` steps over; `void*`
    /// steps bytewise.
    fn element_type(&self, ptr_ty: &TypeDesc, loc: &Location) -> CgResult<BasicTypeEnum<'ctx>> {
        match ptr_ty.pointee() {
            Some(inner) if inner.is_void() => Ok(self.context.i8_type().into()),
            Some(inner) => self.registry.basic_type(inner).at(loc),
            None => Err(SemanticError::invalid(format!("`{ptr_ty}` is not a pointer"))).at(loc),
        }
    }

    /// Call the operator method behind `lhs op rhs` for a class-typed `lhs`.
    /// Returns the result together with the method's return type.
    fn emit_operator_call(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        class_ty: &TypeDesc,
        loc: &Location,
    ) -> CgResult<(BasicValueEnum<'ctx>, TypeDesc)> {
        let record = self.classes.of_type(class_ty).at(loc)?;
        let method = record.resolve_binop_method(op).at(loc)?;
        let sig = method.sig.clone();
        let link_name = record.method_link_name(&sig.name);
        sig.check_arity(1).at(loc)?;

        let receiver = self.class_storage(lhs, None)?;
        let arg = self.emit_arg(rhs, &sig.params[0].ty)?;
        let function = self.link_function(&link_name, loc)?;
        let call = self
            .builder
            .build_call(function, &[receiver.into(), arg.into()], "op")?;
        let value = call
            .try_as_basic_value()
            .basic()
            .ok_or_else(|| SemanticError::non_castable("void", "a value"))
            .at(loc)?;
        Ok((value, sig.ret))
    }

    // ---- Addresses ----

    /// Address of an lvalue expression. Class-typed rvalues are materialized
    /// into a temporary so their address can be taken too.
    pub(crate) fn address_of(&mut self, expr: &Expr) -> CgResult<PointerValue<'ctx>> {
        let loc = &expr.location;
        match &expr.kind {
            ExprKind::Ident(name) => self
                .lookup_value(name)
                .map(|(slot, _)| slot)
                .ok_or_else(|| SemanticError::UndeclaredIdentifier(name.clone()))
                .at(loc),

            ExprKind::Member { object, field } => {
                let object_ty = self.type_of(object)?;
                let (base, class) = match object_ty.pointee() {
                    Some(inner) => (as_pointer(self.emit_expr(object)?, loc)?, inner.clone()),
                    None => (self.class_storage(object, None)?, object_ty.clone()),
                };
                let class = self.types.canonicalize(&class);
                let record = self.classes.of_type(&class).at(loc)?;
                let (index, _) = record.member(field).at(loc)?;
                let layout = self.registry.struct_of(&class).at(loc)?;
                Ok(self.builder.build_struct_gep(layout, base, index, field)?)
            }

            ExprKind::Index { target, index } => {
                let target_ty = self.type_of(target)?;
                let elem = self.element_type(&target_ty, loc)?;
                let base = as_pointer(self.emit_expr(target)?, loc)?;
                let i64_ty = self.builtin("i64", loc)?;
                let index = as_int(self.emit_converted(index, &i64_ty)?, loc)?;
                // SAFETY: as for pointer arithmetic, bounds are the program's business.
                Ok(unsafe { self.builder.build_in_bounds_gep(elem, base, &[index], "idx")? })
            }

            ExprKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => as_pointer(self.emit_expr(operand)?, loc),

            _ => {
                let ty = self.type_of(expr)?;
                if ty.class_name().is_some() {
                    return self.class_storage(expr, None);
                }
                if matches!(expr.kind, ExprKind::Call { .. }) {
                    let value = self.emit_expr(expr)?;
                    let slot = self.entry_alloca(&ty, "tmp", loc)?;
                    self.builder.build_store(slot, value)?;
                    return Ok(slot);
                }
                Err(SemanticError::invalid("expression has no address")).at(loc)
            }
        }
    }

    // ---- Class storage ----

    /// Storage holding the class value of `expr`.
    ///
    /// With `dest` the value is built or copied there; otherwise rvalues land
    /// in a temporary registered for destruction and lvalues are used in place.
    pub(crate) fn class_storage(
        &mut self,
        expr: &Expr,
        dest: Option<PointerValue<'ctx>>,
    ) -> CgResult<PointerValue<'ctx>> {
        let loc = &expr.location;
        match &expr.kind {
            ExprKind::Call { callee, args } => {
                let ty = self.type_of(expr)?;
                if let Some(class) = ty.class_name() {
                    if let Some(args) = self.constructor_call_for(expr, class) {
                        let class = class.to_string();
                        return self.emit_construct(&class, args, dest, loc);
                    }
                }
                let value = self
                    .emit_call(callee, args, loc)?
                    .ok_or_else(|| SemanticError::non_castable("void", &ty))
                    .at(loc)?;
                self.spill_class_result(value, &ty, dest, loc)
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lt = self.type_of(lhs)?;
                if lt.class_name().is_none() {
                    return Err(SemanticError::invalid("expression is not a class value")).at(loc);
                }
                let (value, ret) = self.emit_operator_call(*op, lhs, rhs, &lt, loc)?;
                self.spill_class_result(value, &ret, dest, loc)
            }
            ExprKind::As { ty, expr: inner } => {
                let to = self.resolve_type(ty)?;
                self.convert_storage(inner, &to, dest)
            }
            ExprKind::New { ty, expr: inner } => {
                let to = self.resolve_type(ty)?;
                self.while_escaping(|g| g.convert_storage(inner, &to, dest))
            }
            _ => {
                let addr = self.address_of(expr)?;
                match dest {
                    Some(dest) if dest != addr => {
                        let ty = self.type_of(expr)?;
                        let value = self.load(&ty, addr, loc)?;
                        self.builder.build_store(dest, value)?;
                        Ok(dest)
                    }
                    _ => Ok(addr),
                }
            }
        }
    }

    fn convert_storage(
        &mut self,
        inner: &Expr,
        to: &TypeDesc,
        dest: Option<PointerValue<'ctx>>,
    ) -> CgResult<PointerValue<'ctx>> {
        match to.class_name() {
            Some(_) => self.emit_class_into(inner, to, dest),
            None => Err(SemanticError::invalid("expression is not a class value")).at(&inner.location),
        }
    }

    /// Arguments of `expr` when it is a constructor call for `class`: the
    /// callee names the class itself or, for an instance, its generic base.
    pub(crate) fn constructor_call_for<'e>(&self, expr: &'e Expr, class: &str) -> Option<&'e [Expr]> {
        let ExprKind::Call { callee, args } = &expr.kind else {
            return None;
        };
        let ExprKind::Ident(name) = &callee.kind else {
            return None;
        };
        (name == class || self.instance_base(class) == Some(name.as_str())).then_some(args.as_slice())
    }

    /// Build a value of class type `ty` from `init` into `dest` (or a fresh
    /// temporary): a constructor call constructs in place, a value of the
    /// same class is copied and anything else goes through a converting
    /// constructor.
    pub(crate) fn emit_class_into(
        &mut self,
        init: &Expr,
        ty: &TypeDesc,
        dest: Option<PointerValue<'ctx>>,
    ) -> CgResult<PointerValue<'ctx>> {
        let loc = &init.location;
        let class = ty
            .class_name()
            .ok_or_else(|| SemanticError::invalid(format!("`{ty}` is not a class type")))
            .at(loc)?
            .to_string();
        if let Some(args) = self.constructor_call_for(init, &class) {
            return self.emit_construct(&class, args, dest, loc);
        }
        let from = self.type_of(init)?;
        if from.same_as(ty) {
            return self.class_storage(init, dest);
        }
        let value = self.emit_expr(init)?;
        self.convert_into_class(value, &from, &class, dest, loc)
    }

    /// Store `init` converted to `ty` into `slot`.
    pub(crate) fn emit_store_into(
        &mut self,
        slot: PointerValue<'ctx>,
        ty: &TypeDesc,
        init: &Expr,
    ) -> CgResult<()> {
        if ty.class_name().is_some() {
            self.emit_class_into(init, ty, Some(slot))?;
        } else {
            let value = self.emit_converted(init, ty)?;
            self.builder.build_store(slot, value)?;
        }
        Ok(())
    }

    /// Park a class value returned by a call in `dest`, or in a temporary
    /// that the enclosing scope destroys.
    pub(crate) fn spill_class_result(
        &mut self,
        value: BasicValueEnum<'ctx>,
        ty: &TypeDesc,
        dest: Option<PointerValue<'ctx>>,
        loc: &Location,
    ) -> CgResult<PointerValue<'ctx>> {
        let slot = match dest {
            Some(slot) => slot,
            None => {
                let slot = self.entry_alloca(ty, "tmp", loc)?;
                self.register_defer(ty, slot);
                slot
            }
        };
        self.builder.build_store(slot, value)?;
        Ok(slot)
    }
}
