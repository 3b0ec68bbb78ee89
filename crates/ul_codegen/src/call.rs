//! Calls: free functions, methods, constructors and functional casts.

use inkwell::values::{BasicMetadataValueEnum, BasicValueEnum, PointerValue};
use ul_analysis::{SemanticError, TypeDesc};
use ul_frontend::Location;
use ul_frontend::ast::{Expr, ExprKind};

use crate::CodeGenerator;
use crate::cast::as_pointer;
use crate::error::{At, CgResult};

impl<'ctx> CodeGenerator<'ctx> {
    /// Emit `callee(args)`. Returns `None` when the callee returns `void`.
    ///
    /// Arity is checked before any argument is evaluated, so a mismatched
    /// call leaves no instructions behind.
    pub(crate) fn emit_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        loc: &Location,
    ) -> CgResult<Option<BasicValueEnum<'ctx>>> {
        match &callee.kind {
            ExprKind::Ident(name) => {
                if let Some(ty) = self.types.lookup(name) {
                    let ty = self.types.canonicalize(ty);
                    return self.emit_type_call(name, &ty, args, loc).map(Some);
                }
                self.emit_function_call(name, args, loc)
            }
            ExprKind::Member { object, field } => self.emit_method_call(object, field, args, loc),
            _ => Err(SemanticError::invalid("expression is not callable")).at(loc),
        }
    }

    /// `Class(args)` constructs a temporary; `builtin(x)` is a cast.
    fn emit_type_call(
        &mut self,
        name: &str,
        ty: &TypeDesc,
        args: &[Expr],
        loc: &Location,
    ) -> CgResult<BasicValueEnum<'ctx>> {
        if let Some(class) = ty.class_name() {
            if self.template(class).is_some() {
                return Err(SemanticError::invalid(format!(
                    "generic class `{class}` needs type arguments here"
                )))
                .at(loc);
            }
            let class = class.to_string();
            let slot = self.emit_construct(&class, args, None, loc)?;
            return self.load(ty, slot, loc);
        }
        if args.len() != 1 {
            return Err(SemanticError::ArityMismatch {
                callee: name.to_string(),
                expected: 1,
                found: args.len(),
            })
            .at(loc);
        }
        self.emit_converted(&args[0], ty)
    }

    fn emit_function_call(
        &mut self,
        name: &str,
        args: &[Expr],
        loc: &Location,
    ) -> CgResult<Option<BasicValueEnum<'ctx>>> {
        let sig = self
            .lookup_function(name)
            .cloned()
            .ok_or_else(|| SemanticError::UndeclaredIdentifier(name.to_string()))
            .at(loc)?;
        sig.check_arity(args.len()).at(loc)?;

        let mut values: Vec<BasicMetadataValueEnum<'ctx>> = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let value = match sig.params.get(i) {
                Some(param) => self.emit_arg(arg, &param.ty)?,
                // Variadic tail: passed as is.
                None => self.emit_expr(arg)?,
            };
            values.push(value.into());
        }

        let function = self.link_function(name, loc)?;
        let call = self.builder.build_call(function, &values, "")?;
        Ok(call.try_as_basic_value().basic())
    }

    /// `object.method(args)`: the receiver is passed by address.
    fn emit_method_call(
        &mut self,
        object: &Expr,
        method: &str,
        args: &[Expr],
        loc: &Location,
    ) -> CgResult<Option<BasicValueEnum<'ctx>>> {
        let class = self.receiver_class(object)?;
        let record = self.classes.of_type(&class).at(loc)?;
        let sig = record.find_method(method).at(loc)?.sig.clone();
        let link_name = record.method_link_name(method);
        sig.check_arity(args.len()).at(loc)?;

        let receiver = self.receiver_pointer(object)?;
        let mut values: Vec<BasicMetadataValueEnum<'ctx>> = vec![receiver.into()];
        for (arg, param) in args.iter().zip(&sig.params) {
            values.push(self.emit_arg(arg, &param.ty)?.into());
        }

        let function = self.link_function(&link_name, loc)?;
        let call = self.builder.build_call(function, &values, "")?;
        Ok(call.try_as_basic_value().basic())
    }

    /// Address of a method receiver: a pointer is used as is, a class value
    /// by its storage.
    fn receiver_pointer(&mut self, object: &Expr) -> CgResult<PointerValue<'ctx>> {
        let ty = self.type_of(object)?;
        if ty.is_pointer() {
            as_pointer(self.emit_expr(object)?, &object.location)
        } else {
            self.class_storage(object, None)
        }
    }

    /// Construct `class` from `args` into `dest`, or into a temporary that
    /// is destroyed with the enclosing scope.
    ///
    /// A class without constructors is zero-initialized when called with no
    /// arguments.
    pub(crate) fn emit_construct(
        &mut self,
        class: &str,
        args: &[Expr],
        dest: Option<PointerValue<'ctx>>,
        loc: &Location,
    ) -> CgResult<PointerValue<'ctx>> {
        let class_ty = TypeDesc::class(class);
        let record = self.classes.lookup(class).at(loc)?;
        let has_constructors = !record.constructors.is_empty();

        let slot = match dest {
            Some(slot) => slot,
            None => self.entry_alloca(&class_ty, "tmp", loc)?,
        };

        if !has_constructors && args.is_empty() {
            let zero = self.registry.zero_value(&class_ty).at(loc)?;
            self.builder.build_store(slot, zero)?;
        } else {
            let arg_types = args
                .iter()
                .map(|a| self.type_of(a))
                .collect::<CgResult<Vec<_>>>()?;
            let index = self
                .classes
                .find_matching_constructor(&self.types, class, &arg_types)
                .at(loc)?;
            let record = self.classes.lookup(class).at(loc)?;
            let link_name = record.constructor_link_name(index);
            let params = record.constructors[index].params.clone();

            let mut values: Vec<BasicMetadataValueEnum<'ctx>> = vec![slot.into()];
            for (arg, param) in args.iter().zip(&params) {
                values.push(self.emit_arg(arg, &param.ty)?.into());
            }
            let ctor = self.link_function(&link_name, loc)?;
            self.builder.build_call(ctor, &values, "")?;
        }

        if dest.is_none() {
            self.register_defer(&class_ty, slot);
        }
        Ok(slot)
    }

    /// Evaluate an argument converted to its parameter type. Class-typed
    /// parameters are passed by value.
    pub(crate) fn emit_arg(&mut self, arg: &Expr, param_ty: &TypeDesc) -> CgResult<BasicValueEnum<'ctx>> {
        if param_ty.class_name().is_some() {
            let storage = self.emit_class_into(arg, param_ty, None)?;
            return self.load(param_ty, storage, &arg.location);
        }
        self.emit_converted(arg, param_ty)
    }
}

#[cfg(test)]
mod tests {
    use crate::{CodeGenerator, GeneratorOptions};
    use inkwell::context::Context;
    use ul_analysis::SemanticError;

    fn compile(src: &str) -> Result<String, crate::CodegenError> {
        let context = Context::create();
        let mut generator = CodeGenerator::new(&context, "t", GeneratorOptions::default()).unwrap();
        generator.compile_source("t.ul", src)?;
        assert!(generator.module().verify().is_ok());
        Ok(generator.module().print_to_string().to_string())
    }

    #[test]
    fn test_overloaded_constructor_selection() {
        let ir = compile(
            "class Pair => {\n\
                public a: int;\n\
                public b: int;\n\
                public Pair() => { self.a = 0; self.b = 0; }\n\
                public Pair(a: int, b: int) => { self.a = a; self.b = b; }\n\
             }\n\
             let f(): int => { let p: Pair = Pair(1, 2); let q: Pair; return p.a + q.b; }",
        )
        .unwrap();
        assert!(ir.contains("call void @Pair_1(ptr"), "{ir}");
        assert!(ir.contains("call void @Pair_0(ptr"), "{ir}");
    }

    #[test]
    fn test_no_matching_constructor() {
        let err = compile(
            "class Only => { public v: int; public Only(v: int) => { self.v = v; } }\n\
             let f(): int => { let o: Only; return 0; }",
        )
        .unwrap_err();
        assert!(matches!(err.semantic(), Some(SemanticError::NoMatchingConstructor { .. })), "{err}");
    }

    #[test]
    fn test_method_arity_is_checked() {
        let err = compile(
            "class C => { public v: int; public add(x: int): int => { return self.v + x; } }\n\
             let f(c: C*): int => { return c.add(1, 2); }",
        )
        .unwrap_err();
        assert!(matches!(
            err.semantic(),
            Some(SemanticError::ArityMismatch { expected: 1, found: 2, .. })
        ));
    }

    #[test]
    fn test_functional_cast_arity() {
        let err = compile("let f(): int => { return int(1, 2); }").unwrap_err();
        assert!(matches!(err.semantic(), Some(SemanticError::ArityMismatch { .. })));
    }

    #[test]
    fn test_call_through_value_receiver_and_void_result() {
        let ir = compile(
            "class Log => { public n: int; public hit(): void => { self.n = self.n + 1; } }\n\
             let f(): void => { let l: Log; l.hit(); }",
        )
        .unwrap();
        assert!(ir.contains("call void @Log_hit(ptr %l)"), "{ir}");
    }

    #[test]
    fn test_not_callable() {
        let err = compile("let f(x: int): int => { return x[0](1); }").unwrap_err();
        assert!(err.semantic().is_some(), "{err}");
    }
}
