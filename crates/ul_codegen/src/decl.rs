//! Top-level declarations: functions, globals, constants and classes.

use inkwell::types::BasicTypeEnum;
use inkwell::values::{BasicValueEnum, FunctionValue};
use ul_analysis::{
    ClassRecord, ConstructorRecord, MemberRecord, MethodRecord, ParamDesc, SemanticError,
    Signature, TypeDesc, pointer_of,
};
use ul_frontend::Location;
use ul_frontend::ast::{
    Block, ClassDef, ConstDef, Decl, Expr, ExprKind, FunctionDef, Param, Program, UnaryOp,
    VarDef,
};

use crate::error::{At, CgResult, CodegenError};
use crate::{CodeGenerator, FunctionState};

impl<'ctx> CodeGenerator<'ctx> {
    /// Compile every declaration of `program` in order.
    ///
    /// The first failure aborts unless `keep_going` is set, in which case
    /// every failing declaration is recorded and reported together.
    pub fn compile_program(&mut self, program: &Program) -> CgResult<()> {
        tracing::debug!(file = %program.file, decls = program.decls.len(), "compiling program");
        let mut errors = Vec::new();
        for decl in &program.decls {
            if let Err(e) = self.compile_decl(decl, false) {
                let e = e.or_at(decl.location());
                if !self.options.keep_going {
                    return Err(e);
                }
                tracing::warn!(error = %e, "declaration failed, continuing");
                errors.push(e);
            }
        }
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(CodegenError::Many(errors)),
        }
    }

    /// One top-level declaration. Declarations pulled in by `@include` only
    /// declare their functions and classes; bodies come from the includer.
    pub(crate) fn compile_decl(&mut self, decl: &Decl, included: bool) -> CgResult<()> {
        match decl {
            Decl::Function(def) => self.emit_function(def, included),
            Decl::Var(var) if !included => self.emit_global(var),
            Decl::Const(def) if !included => self.emit_constant(def),
            Decl::Var(_) | Decl::Const(_) => Err(SemanticError::invalid(
                "included files may only declare functions, classes and interfaces",
            ))
            .at(decl.location()),
            Decl::Class(def) => self.define_class(def, !included),
            Decl::Interface(def) => self.define_interface(def),
            Decl::Include(include) => self.process_include(include),
        }
    }

    // ---- Functions ----

    pub(crate) fn resolve_params(&mut self, params: &[Param]) -> CgResult<Vec<ParamDesc>> {
        params
            .iter()
            .map(|p| {
                Ok(ParamDesc {
                    name: p.name.clone(),
                    ty: self.resolve_value_type(&p.ty)?,
                })
            })
            .collect()
    }

    /// Declare `def` in the module and the function table. A prototype
    /// followed by a definition shares one declaration.
    fn declare_function(&mut self, def: &FunctionDef) -> CgResult<(FunctionValue<'ctx>, Signature)> {
        let sig = Signature {
            name: def.name.clone(),
            params: self.resolve_params(&def.params)?,
            ret: self.resolve_return(def.ret.as_ref())?,
            variadic: false,
        };
        let param_types: Vec<TypeDesc> = sig.params.iter().map(|p| p.ty.clone()).collect();
        let fn_ty = self
            .registry
            .fn_type(&param_types, &sig.ret, false)
            .at(&def.location)?;
        let function = match self.module.get_function(&def.name) {
            Some(existing) if existing.get_type() != fn_ty => {
                return Err(SemanticError::invalid(format!(
                    "`{}` redeclared with a different signature",
                    def.name
                )))
                .at(&def.location);
            }
            Some(existing) => existing,
            None => self.module.add_function(&def.name, fn_ty, None),
        };
        if self.lookup_function(&def.name) != Some(&sig) {
            self.functions.push(sig.clone());
        }
        Ok((function, sig))
    }

    fn emit_function(&mut self, def: &FunctionDef, included: bool) -> CgResult<()> {
        tracing::debug!(function = %def.name, "declaring function");
        let (function, sig) = self.declare_function(def)?;
        match &def.body {
            Some(body) if !included => self.emit_body(function, &sig.params, &sig.ret, body, None),
            _ => Ok(()),
        }
    }

    /// Emit one function body: bind parameters to stack slots, run member
    /// initializers for constructors, emit the statements and close with an
    /// implicit `ret void` (or `unreachable` for a non-void fall-through).
    fn emit_body(
        &mut self,
        function: FunctionValue<'ctx>,
        params: &[ParamDesc],
        ret: &TypeDesc,
        body: &Block,
        initializers: Option<(&str, &[MemberRecord])>,
    ) -> CgResult<()> {
        let name = function.get_name().to_string_lossy().into_owned();
        if function.count_basic_blocks() > 0 {
            return Err(SemanticError::invalid(format!("`{name}` is defined twice"))).at(&body.location);
        }
        tracing::debug!(function = %name, "emitting body");

        self.detached(|g| {
            let entry = g.context.append_basic_block(function, "entry");
            g.builder.position_at_end(entry);
            let entry_mark = g.symbols.scope_mark(false);
            g.current = Some(FunctionState {
                function,
                ret: ret.clone(),
                entry_mark,
            });

            for (i, param) in params.iter().enumerate() {
                let value = function
                    .get_nth_param(i as u32)
                    .ok_or_else(|| SemanticError::invalid(format!("`{name}` lost parameter `{}`", param.name)))
                    .at(&body.location)?;
                value.set_name(&param.name);
                let slot = g.entry_alloca(&param.ty, &param.name, &body.location)?;
                g.builder.build_store(slot, value)?;
                g.symbols.bind(param.name.clone(), param.ty.clone(), slot);
            }

            if let Some((class, members)) = initializers {
                g.emit_member_initializers(class, members, &body.location)?;
            }

            g.emit_stmts(&body.stmts)?;
            g.unwind_to(entry_mark)?;

            if !g.block_terminated() {
                if ret.is_void() {
                    g.builder.build_return(None)?;
                } else {
                    g.builder.build_unreachable()?;
                }
            }
            Ok(())
        })
    }

    /// Store each member's `= expr` initializer through `self`, in member order.
    fn emit_member_initializers(
        &mut self,
        class: &str,
        members: &[MemberRecord],
        location: &Location,
    ) -> CgResult<()> {
        if members.iter().all(|m| m.init.is_none()) {
            return Ok(());
        }
        let (slot, self_ty) = self
            .lookup_value("self")
            .ok_or_else(|| SemanticError::UndeclaredIdentifier("self".into()))
            .at(location)?;
        let this = self.load(&self_ty, slot, location)?;
        let this = crate::cast::as_pointer(this, location)?;
        let layout = self.registry.struct_of(&TypeDesc::class(class)).at(location)?;

        for (index, member) in members.iter().enumerate() {
            if let Some(init) = &member.init {
                let field = self
                    .builder
                    .build_struct_gep(layout, this, index as u32, &member.name)?;
                self.emit_store_into(field, &member.ty, init)?;
            }
        }
        Ok(())
    }

    // ---- Globals ----

    fn emit_global(&mut self, var: &VarDef) -> CgResult<()> {
        tracing::debug!(global = %var.name, "defining global");
        let ty = self.resolve_value_type(&var.ty)?;
        let llvm_ty = self.registry.basic_type(&ty).at(&var.location)?;
        let init = match &var.init {
            None => self.registry.zero_value(&ty).at(&var.location)?,
            Some(expr) => self.const_initializer(expr, llvm_ty, &ty)?,
        };
        let global = self.module.add_global(llvm_ty, None, &var.name);
        global.set_initializer(&init);
        self.globals
            .rebind_or_bind(global.as_pointer_value(), &var.name, ty);
        Ok(())
    }

    /// `let NAME :: literal;` becomes a constant global typed after the literal.
    fn emit_constant(&mut self, def: &ConstDef) -> CgResult<()> {
        tracing::debug!(constant = %def.name, "defining constant");
        let ty = self.type_of(&def.value)?;
        let llvm_ty = self.registry.basic_type(&ty).at(&def.location)?;
        let init = self.const_initializer(&def.value, llvm_ty, &ty)?;
        let global = self.module.add_global(llvm_ty, None, &def.name);
        global.set_initializer(&init);
        global.set_constant(true);
        self.globals
            .rebind_or_bind(global.as_pointer_value(), &def.name, ty);
        Ok(())
    }

    /// Fold a literal (optionally negated) into a constant of `llvm_ty`.
    fn const_initializer(
        &self,
        expr: &Expr,
        llvm_ty: BasicTypeEnum<'ctx>,
        ty: &TypeDesc,
    ) -> CgResult<BasicValueEnum<'ctx>> {
        let (literal, negate) = match &expr.kind {
            ExprKind::Unary {
                op: UnaryOp::Neg,
                operand,
            } => (&operand.kind, true),
            other => (other, false),
        };
        let signed = ty.prim().is_some_and(|p| p.is_signed());
        let value: BasicValueEnum<'ctx> = match (literal, llvm_ty) {
            (ExprKind::Int(n), BasicTypeEnum::IntType(t)) => {
                let n = if negate { n.wrapping_neg() } else { *n };
                t.const_int(n as u64, signed).into()
            }
            (ExprKind::Int(n), BasicTypeEnum::FloatType(t)) => {
                let n = if negate { -(*n as f64) } else { *n as f64 };
                t.const_float(n).into()
            }
            (ExprKind::Float(f), BasicTypeEnum::FloatType(t)) => {
                t.const_float(if negate { -f } else { *f }).into()
            }
            (ExprKind::Float(f), BasicTypeEnum::IntType(t)) => {
                let n = if negate { -f } else { *f } as i64;
                t.const_int(n as u64, signed).into()
            }
            (ExprKind::Char(c), BasicTypeEnum::IntType(t)) if !negate => {
                t.const_int(u64::from(*c), false).into()
            }
            (ExprKind::Bool(b), BasicTypeEnum::IntType(t)) if !negate => {
                t.const_int(u64::from(*b), false).into()
            }
            _ => {
                return Err(SemanticError::invalid(
                    "global initializers must be numeric, character or boolean literals",
                ))
                .at(&expr.location);
            }
        };
        Ok(value)
    }

    // ---- Classes ----

    fn define_class(&mut self, def: &ClassDef, with_bodies: bool) -> CgResult<()> {
        if def.is_generic() {
            return self.define_template(def);
        }
        let declared = self.classes.get(&def.name).is_some_and(|c| !c.is_generic())
            && self
                .registry
                .get_struct(&def.name)
                .is_some_and(|s| !s.is_opaque());
        if !declared {
            return self.define_concrete_class(&def.name, def, with_bodies);
        }
        // Declared by an include earlier; this definition supplies the bodies.
        if with_bodies {
            let record = self.classes.lookup(&def.name).at(&def.location)?.clone();
            self.generate_class_bodies(&record, def)?;
        }
        Ok(())
    }

    /// Lay out a concrete class, declare its constructors and methods and,
    /// with `with_bodies`, emit them. Generic instances come through here too,
    /// with their parameters aliased to the concrete arguments.
    pub(crate) fn define_concrete_class(
        &mut self,
        name: &str,
        def: &ClassDef,
        with_bodies: bool,
    ) -> CgResult<()> {
        tracing::debug!(class = name, "defining class");
        self.registry.declare_struct(name);
        if !self.types.contains(name) {
            self.types.register(TypeDesc::class(name));
        }

        let record = self.build_record(name, def)?;
        let fields: Vec<TypeDesc> = record.members.iter().map(|m| m.ty.clone()).collect();
        self.registry
            .define_struct(name, &fields)
            .at(&def.location)?;
        self.declare_class_functions(&record, &def.location)?;
        self.classes.define(record.clone());

        if with_bodies {
            self.generate_class_bodies(&record, def)?;
        }
        Ok(())
    }

    /// Resolve every member, constructor and method of `def` into a record
    /// named `name`.
    pub(crate) fn build_record(&mut self, name: &str, def: &ClassDef) -> CgResult<ClassRecord> {
        let mut record = ClassRecord::new(name);
        for member in &def.members {
            record.members.push(MemberRecord {
                name: member.var.name.clone(),
                visibility: member.visibility,
                ty: self.resolve_value_type(&member.var.ty)?,
                init: member.var.init.clone(),
            });
        }
        for ctor in def.constructors() {
            record.constructors.push(ConstructorRecord {
                visibility: ctor.visibility,
                params: self.resolve_params(&ctor.def.params)?,
            });
        }
        for method in def.plain_methods() {
            record.methods.push(MethodRecord {
                visibility: method.visibility,
                sig: Signature {
                    name: method.def.name.clone(),
                    params: self.resolve_params(&method.def.params)?,
                    ret: self.resolve_return(method.def.ret.as_ref())?,
                    variadic: false,
                },
            });
        }
        Ok(record)
    }

    /// `Class_i` for constructors and `Class_method` for methods, each taking
    /// the receiver pointer first.
    fn declare_class_functions(&mut self, record: &ClassRecord, location: &Location) -> CgResult<()> {
        let void = self.builtin("void", location)?;
        for (index, ctor) in record.constructors.iter().enumerate() {
            let name = record.constructor_link_name(index);
            if self.module.get_function(&name).is_none() {
                let params: Vec<TypeDesc> = ctor.params.iter().map(|p| p.ty.clone()).collect();
                let fn_ty = self.registry.method_fn_type(&params, &void).at(location)?;
                self.module.add_function(&name, fn_ty, None);
            }
        }
        for method in &record.methods {
            let name = record.method_link_name(&method.sig.name);
            if self.module.get_function(&name).is_none() {
                let params: Vec<TypeDesc> = method.sig.params.iter().map(|p| p.ty.clone()).collect();
                let fn_ty = self
                    .registry
                    .method_fn_type(&params, &method.sig.ret)
                    .at(location)?;
                self.module.add_function(&name, fn_ty, None);
            }
        }
        Ok(())
    }

    fn generate_class_bodies(&mut self, record: &ClassRecord, def: &ClassDef) -> CgResult<()> {
        let receiver = ParamDesc {
            name: "self".into(),
            ty: pointer_of(TypeDesc::class(&record.name)),
        };
        let void = self.builtin("void", &def.location)?;

        for ((index, method), ctor) in def.constructors().enumerate().zip(&record.constructors) {
            let Some(body) = &method.def.body else {
                continue;
            };
            let function = self.link_function(&record.constructor_link_name(index), &method.def.location)?;
            let mut params = vec![receiver.clone()];
            params.extend(ctor.params.iter().cloned());
            self.emit_body(
                function,
                &params,
                &void,
                body,
                Some((record.name.as_str(), record.members.as_slice())),
            )?;
        }

        for (method, resolved) in def.plain_methods().zip(&record.methods) {
            let Some(body) = &method.def.body else {
                continue;
            };
            let function = self.link_function(&record.method_link_name(&resolved.sig.name), &method.def.location)?;
            let mut params = vec![receiver.clone()];
            params.extend(resolved.sig.params.iter().cloned());
            self.emit_body(function, &params, &resolved.sig.ret, body, None)?;
        }
        Ok(())
    }
}
