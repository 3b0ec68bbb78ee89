use ul_analysis::{SemanticError, TypeDesc, pointer_of};
use ul_frontend::ast::{BinaryOp, Expr, ExprKind, UnaryOp};

use crate::CodeGenerator;
use crate::error::{At, CgResult};

impl<'ctx> CodeGenerator<'ctx> {
    /// Static type of `expr`, computed without emitting instructions.
    ///
    /// Resolving a type named in the expression may still instantiate a
    /// generic class, which is why this takes `&mut self`.
    pub fn type_of(&mut self, expr: &Expr) -> CgResult<TypeDesc> {
        let loc = &expr.location;
        let ty = match &expr.kind {
            ExprKind::Int(_) => self.builtin("int", loc)?,
            ExprKind::Float(_) => self.builtin("float", loc)?,
            ExprKind::Char(_) => self.builtin("char", loc)?,
            ExprKind::Bool(_) => self.builtin("bool", loc)?,
            ExprKind::Str(_) => pointer_of(self.builtin("char", loc)?),

            ExprKind::Ident(name) => self
                .lookup_value(name)
                .map(|(_, ty)| ty)
                .ok_or_else(|| SemanticError::UndeclaredIdentifier(name.clone()))
                .at(loc)?,

            ExprKind::Unary { op, operand } => match op {
                UnaryOp::Not => self.builtin("bool", loc)?,
                UnaryOp::Neg => self.type_of(operand)?,
                UnaryOp::AddrOf => pointer_of(self.type_of(operand)?),
                UnaryOp::Deref => {
                    let inner = self.type_of(operand)?;
                    self.dereference(&inner).at(loc)?
                }
            },

            ExprKind::Binary { op, lhs, rhs } => self.binary_type(*op, lhs, rhs)?,

            ExprKind::Member { object, field } => {
                let class = self.receiver_class(object)?;
                let record = self.classes.of_type(&class).at(loc)?;
                let (_, member) = record.member(field).at(loc)?;
                member.ty.clone()
            }

            ExprKind::Call { callee, .. } => self.call_type(callee)?,

            ExprKind::Index { target, .. } => {
                let base = self.type_of(target)?;
                self.dereference(&base).at(loc)?
            }

            ExprKind::As { ty, .. } | ExprKind::New { ty, .. } => self.resolve_type(ty)?,

            ExprKind::SizeOf(_) => {
                let handle = self.context.i64_type().into();
                self.registry
                    .resolve_by_backing_handle(&self.types, handle)
                    .at(loc)?
            }
        };
        Ok(self.types.canonicalize(&ty))
    }

    /// Comparison and logical operators yield `bool`; a class operand yields
    /// its operator method's return type; otherwise the wider operand wins,
    /// pointers over everything and the left side on ties.
    fn binary_type(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> CgResult<TypeDesc> {
        let lt = self.type_of(lhs)?;
        let class_operand = lt.class_name().is_some();
        if op.yields_bool() && !(class_operand && op == BinaryOp::Eq) {
            return self.builtin("bool", &lhs.location);
        }
        if class_operand {
            let record = self.classes.of_type(&lt).at(&lhs.location)?;
            let method = record.resolve_binop_method(op).at(&lhs.location)?;
            return Ok(method.sig.ret.clone());
        }
        let rt = self.type_of(rhs)?;
        Ok(wider(lt, rt))
    }

    /// Type of a call: a type name constructs or converts to that type,
    /// anything else returns what its function or method declares.
    fn call_type(&mut self, callee: &Expr) -> CgResult<TypeDesc> {
        let loc = &callee.location;
        match &callee.kind {
            ExprKind::Ident(name) => {
                if let Some(ty) = self.types.lookup(name) {
                    return Ok(self.types.canonicalize(ty));
                }
                self.lookup_function(name)
                    .map(|f| f.ret.clone())
                    .ok_or_else(|| SemanticError::UndeclaredIdentifier(name.clone()))
                    .at(loc)
            }
            ExprKind::Member { object, field } => {
                let class = self.receiver_class(object)?;
                let record = self.classes.of_type(&class).at(loc)?;
                let method = record.find_method(field).at(loc)?;
                Ok(method.sig.ret.clone())
            }
            _ => Err(SemanticError::invalid("expression is not callable")).at(loc),
        }
    }

    /// Class type of a member-access or method-call receiver, looking through
    /// one level of pointer.
    pub(crate) fn receiver_class(&mut self, object: &Expr) -> CgResult<TypeDesc> {
        let ty = self.type_of(object)?;
        let class = match ty.pointee() {
            Some(inner) => inner.clone(),
            None => ty,
        };
        if class.class_name().is_none() {
            return Err(SemanticError::invalid(format!(
                "`{class}` has no members"
            )))
            .at(&object.location);
        }
        Ok(class)
    }

    fn dereference(&self, ty: &TypeDesc) -> Result<TypeDesc, SemanticError> {
        ty.pointee()
            .map(|inner| self.types.canonicalize(inner))
            .ok_or_else(|| SemanticError::invalid(format!("cannot dereference `{ty}`")))
    }
}

/// Operand type an arithmetic operator computes in.
pub(crate) fn wider(lhs: TypeDesc, rhs: TypeDesc) -> TypeDesc {
    if lhs.is_pointer() {
        return lhs;
    }
    if rhs.is_pointer() {
        return rhs;
    }
    if rhs.size_bytes() > lhs.size_bytes() {
        rhs
    } else {
        lhs
    }
}
