//! Type resolution and LLVM code generation for Unilang programs.
//!
//! [`CodeGenerator`] walks a parsed [`ast::Program`] declaration by
//! declaration. It resolves types through the [`TypeTable`], instantiates
//! generic classes on demand, binds locals in a watermark-scoped symbol
//! stack and schedules `destroy` calls for class-typed storage in the defer
//! ledger, emitting IR through inkwell as it goes.

pub mod call;
pub mod cast;
pub mod decl;
pub mod error;
pub mod expr;
pub mod generics;
pub mod include;
pub mod intrinsics;
pub mod memory;
pub mod resolve;
pub mod scope;
pub mod stmt;
pub mod typer;
pub mod types;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::values::{BasicValueEnum, FunctionValue, PointerValue};
use ul_analysis::{
    ClassRegistry, DeferLedger, SemanticError, Signature, SymbolTable, TypeDesc, TypeTable,
    Watermark,
};
use ul_frontend::{Location, ast};

use crate::error::At;
use crate::intrinsics::Intrinsics;
use crate::memory::MemoryManager;
use crate::types::TypeRegistry;

pub use error::{CgResult, CodegenError};

/// Knobs for one generator session.
#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    /// Directory that `@include std::...` resolves against.
    pub std_dir: PathBuf,
    /// Directory every other include resolves against.
    pub include_root: PathBuf,
    /// Check interface constraints on generic arguments at instantiation.
    pub strict_interfaces: bool,
    /// Record failing top-level declarations and carry on with the next one.
    pub keep_going: bool,
}

impl GeneratorOptions {
    /// `$UNILANG_STD`, falling back to `$HOME/Documents/Unilang/stdlib`.
    pub fn default_std_dir() -> PathBuf {
        if let Some(dir) = std::env::var_os("UNILANG_STD") {
            return PathBuf::from(dir);
        }
        let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
        home.join("Documents").join("Unilang").join("stdlib")
    }
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            std_dir: Self::default_std_dir(),
            include_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            strict_interfaces: false,
            keep_going: false,
        }
    }
}

/// The function whose body is being emitted.
#[derive(Debug, Clone)]
pub(crate) struct FunctionState<'ctx> {
    pub function: FunctionValue<'ctx>,
    pub ret: TypeDesc,
    /// Symbol stack length at entry; `return` destroys everything above it.
    pub entry_mark: Watermark,
}

/// The main code generator. Owns the LLVM module and builder together with
/// every registry the engine consults.
///
/// Usage:
/// ```ignore
/// let context = Context::create();
/// let mut generator = CodeGenerator::new(&context, "main", GeneratorOptions::default())?;
/// generator.compile_source("main.ul", &source)?;
/// let module = generator.into_module();
/// ```
pub struct CodeGenerator<'ctx> {
    context: &'ctx Context,
    module: Module<'ctx>,
    builder: Builder<'ctx>,
    registry: TypeRegistry<'ctx>,
    memory: MemoryManager<'ctx>,
    options: GeneratorOptions,

    types: TypeTable,
    classes: ClassRegistry,
    /// Declared free functions, builtins first. Later entries shadow earlier ones.
    functions: Vec<Signature>,
    globals: SymbolTable<PointerValue<'ctx>>,
    symbols: SymbolTable<PointerValue<'ctx>>,
    defers: DeferLedger<PointerValue<'ctx>>,
    /// Canonical paths of every file pulled in by `@include`.
    included: HashSet<PathBuf>,

    current: Option<FunctionState<'ctx>>,
    /// Set while emitting a value that leaves its scope (`return`, `@new`);
    /// temporaries created meanwhile get no defer entry.
    escaping: bool,
}

impl<'ctx> CodeGenerator<'ctx> {
    /// Create a generator with the builtin types and functions registered.
    pub fn new(
        context: &'ctx Context,
        module_name: &str,
        options: GeneratorOptions,
    ) -> CgResult<Self> {
        let module = context.create_module(module_name);
        let builder = context.create_builder();
        let mut memory = MemoryManager::new(context);
        let types = TypeTable::with_builtins();
        let functions = Intrinsics::new(context).declare_all(&module, &mut memory, &types)?;

        Ok(Self {
            context,
            module,
            builder,
            registry: TypeRegistry::new(context),
            memory,
            options,
            types,
            classes: ClassRegistry::new(),
            functions,
            globals: SymbolTable::new(),
            symbols: SymbolTable::new(),
            defers: DeferLedger::new(),
            included: HashSet::new(),
            current: None,
            escaping: false,
        })
    }

    /// Parse `source` and compile every declaration in it.
    pub fn compile_source(&mut self, file: impl Into<Arc<str>>, source: &str) -> CgResult<()> {
        let program = ul_frontend::parse_source(file, source)?;
        self.compile_program(&program)
    }

    /// Consume the code generator and return the LLVM module.
    pub fn into_module(self) -> Module<'ctx> {
        self.module
    }

    /// Return a reference to the module (e.g. for verification).
    pub fn module(&self) -> &Module<'ctx> {
        &self.module
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    pub fn options(&self) -> &GeneratorOptions {
        &self.options
    }

    // ---- Shared helpers ----

    pub(crate) fn current_function(&self, location: &Location) -> CgResult<FunctionValue<'ctx>> {
        self.current
            .as_ref()
            .map(|state| state.function)
            .ok_or_else(|| SemanticError::invalid("code outside of a function body"))
            .at(location)
    }

    /// Whether the block under the builder already ends in a terminator.
    pub(crate) fn block_terminated(&self) -> bool {
        self.builder
            .get_insert_block()
            .is_some_and(|bb| bb.get_terminator().is_some())
    }

    /// Stack slot for a value of `ty` in the current function's entry block.
    pub(crate) fn entry_alloca(
        &self,
        ty: &TypeDesc,
        name: &str,
        location: &Location,
    ) -> CgResult<PointerValue<'ctx>> {
        let function = self.current_function(location)?;
        let llvm_ty = self.registry.basic_type(ty).at(location)?;
        Ok(self.memory.build_entry_alloca(function, llvm_ty, name)?)
    }

    /// Load a value of semantic type `ty` from `ptr`.
    pub(crate) fn load(
        &self,
        ty: &TypeDesc,
        ptr: PointerValue<'ctx>,
        location: &Location,
    ) -> CgResult<BasicValueEnum<'ctx>> {
        let llvm_ty = self.registry.basic_type(ty).at(location)?;
        Ok(self.builder.build_load(llvm_ty, ptr, "")?)
    }

    pub(crate) fn lookup_function(&self, name: &str) -> Option<&Signature> {
        self.functions.iter().rev().find(|f| f.name == name)
    }

    /// A function already materialized in the module under `name`.
    pub(crate) fn link_function(
        &self,
        name: &str,
        location: &Location,
    ) -> CgResult<FunctionValue<'ctx>> {
        self.module
            .get_function(name)
            .ok_or_else(|| SemanticError::UndeclaredIdentifier(name.to_string()))
            .at(location)
    }

    /// Storage and type bound to `name`: locals first, then globals.
    pub(crate) fn lookup_value(&self, name: &str) -> Option<(PointerValue<'ctx>, TypeDesc)> {
        self.symbols
            .resolve(name)
            .or_else(|| self.globals.resolve(name))
            .and_then(|entry| entry.storage.map(|s| (s, entry.ty.clone())))
    }

    pub(crate) fn builtin(&self, name: &str, location: &Location) -> CgResult<TypeDesc> {
        self.types.resolve_by_name(name).at(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use ul_frontend::Parser;

    fn options() -> GeneratorOptions {
        GeneratorOptions {
            std_dir: PathBuf::from("/nonexistent/std"),
            include_root: PathBuf::from("/nonexistent"),
            strict_interfaces: false,
            keep_going: false,
        }
    }

    /// Compile `src`, verify the module and return its textual IR.
    fn compile_ok(src: &str) -> String {
        compile_with(src, options())
    }

    fn compile_with(src: &str, options: GeneratorOptions) -> String {
        let context = Context::create();
        let mut generator = CodeGenerator::new(&context, "test", options).unwrap();
        generator
            .compile_source("test.ul", src)
            .unwrap_or_else(|e| panic!("compilation failed: {e}"));
        if let Err(msg) = generator.module().verify() {
            panic!("invalid module: {}\n{}", msg.to_string(), generator.module().print_to_string());
        }
        generator.module().print_to_string().to_string()
    }

    fn compile_err(src: &str) -> CodegenError {
        let context = Context::create();
        let mut generator = CodeGenerator::new(&context, "test", options()).unwrap();
        match generator.compile_source("test.ul", src) {
            Ok(()) => panic!("expected failure:\n{}", generator.module().print_to_string()),
            Err(e) => e,
        }
    }

    fn function_ir(ir_module: &Module<'_>, name: &str) -> String {
        ir_module
            .get_function(name)
            .unwrap_or_else(|| panic!("no function {name}"))
            .print_to_string()
            .to_string()
    }

    fn parse_expr(src: &str) -> ast::Expr {
        Parser::new("expr.ul", src).parse_expr().unwrap()
    }

    #[test]
    fn test_add_function_and_call() {
        let context = Context::create();
        let mut generator = CodeGenerator::new(&context, "test", options()).unwrap();
        generator
            .compile_source(
                "test.ul",
                "let add(a: int, b: int): int => { return a + b; }\n\
                 let main(): int => { return add(2, 3); }",
            )
            .unwrap();
        assert!(generator.module().verify().is_ok());

        let call = parse_expr("add(2, 3)");
        let ty = generator.type_of(&call).unwrap();
        assert_eq!(ty.name(), Some("int"));

        let add = generator.module().get_function("add").unwrap();
        assert_eq!(add.count_params(), 2);
        let main = function_ir(generator.module(), "main");
        assert!(main.contains("call i32 @add(i32 2, i32 3)"), "{main}");
        assert!(!main.contains("destroy"));
    }

    #[test]
    fn test_generic_instances_are_cached() {
        let context = Context::create();
        let mut generator = CodeGenerator::new(&context, "test", options()).unwrap();
        generator
            .compile_source(
                "test.ul",
                "class Box => { @template: T; public val: T; }\n\
                 let first(a: Box<int>*, b: Box<int>*, c: Box<char>*): int => { return a.val; }",
            )
            .unwrap();
        assert!(generator.module().verify().is_ok());

        let names: Vec<&str> = generator
            .classes()
            .instances()
            .iter()
            .map(|i| i.name.as_str())
            .collect();
        assert_eq!(names, vec!["BoxZ0", "BoxZ1"]);

        let ir = generator.module().print_to_string().to_string();
        assert!(ir.contains("%BoxZ0 = type { i32 }"), "{ir}");
        assert!(ir.contains("%BoxZ1 = type { i8 }"), "{ir}");
    }

    const RES: &str = "class Res => {\n\
        public v: int;\n\
        public Res() => { self.v = 0; }\n\
        public destroy() => { }\n\
    }\n";

    #[test]
    fn test_destroy_once_per_exit_path() {
        let src = format!(
            "{RES}let f(c: bool): int => {{\n\
                if c => {{\n\
                    let r: Res;\n\
                    if c => {{ return 1; }}\n\
                }} else => {{\n\
                    let n: int = 2;\n\
                }}\n\
                return 0;\n\
            }}"
        );
        let context = Context::create();
        let mut generator = CodeGenerator::new(&context, "test", options()).unwrap();
        generator.compile_source("test.ul", &src).unwrap();
        assert!(generator.module().verify().is_ok());

        let f = function_ir(generator.module(), "f");
        // One on the early return, one at the end of the branch.
        assert_eq!(f.matches("call void @Res_destroy").count(), 2, "{f}");
        assert_eq!(f.matches("call void @Res_0").count(), 1, "{f}");

        // The sibling branch never sees `r`.
        let else_block = f
            .split("\nelse:")
            .nth(1)
            .and_then(|rest| rest.split("\n\n").next())
            .unwrap();
        assert!(else_block.contains("store i32 2"), "{else_block}");
        assert!(!else_block.contains("@Res_destroy"), "{else_block}");
        assert!(!else_block.contains("@Res_0"), "{else_block}");
    }

    #[test]
    fn test_arity_mismatch_emits_no_call() {
        let context = Context::create();
        let mut generator = CodeGenerator::new(&context, "test", options()).unwrap();
        let err = generator
            .compile_source(
                "test.ul",
                "let three(a: int, b: int, c: int): int => { return a; }\n\
                 let main(): int => { return three(1, 2); }",
            )
            .unwrap_err();
        assert_eq!(
            err.semantic(),
            Some(&SemanticError::ArityMismatch {
                callee: "three".into(),
                expected: 3,
                found: 2
            })
        );
        assert!(err.to_string().starts_with("test.ul:2:"), "{err}");
        let main = function_ir(generator.module(), "main");
        assert!(!main.contains("call"), "{main}");
    }

    #[test]
    fn test_generic_methods_and_constructor() {
        let ir = compile_ok(
            "class Box => {\n\
                @template: T;\n\
                public val: T;\n\
                public Box(v: T) => { self.val = v; }\n\
                public get(): T => { return self.val; }\n\
             }\n\
             let main(): int => {\n\
                let b: Box<int> = Box(41);\n\
                return b.get() + 1;\n\
             }\n\
             let peek(c: Box<char>*): char => { return c.get(); }",
        );
        assert!(ir.contains("define void @BoxZ0_0(ptr"), "{ir}");
        assert!(ir.contains("define i32 @BoxZ0_get(ptr"), "{ir}");
        assert!(ir.contains("define i8 @BoxZ1_get(ptr"), "{ir}");
        assert!(ir.contains("call i32 @BoxZ0_get(ptr"), "{ir}");
        assert!(ir.contains("call i8 @BoxZ1_get(ptr"), "{ir}");
    }

    #[test]
    fn test_nested_generic_instantiation() {
        let context = Context::create();
        let mut generator = CodeGenerator::new(&context, "test", options()).unwrap();
        generator
            .compile_source(
                "test.ul",
                "class Box => { @template: T; public val: T; }\n\
                 let f(b: Box<Box<int>>*): int => { return b.val.val; }",
            )
            .unwrap();
        assert!(generator.module().verify().is_ok());
        let instances = generator.classes().instances();
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].name, "BoxZ0");
        assert_eq!(instances[1].args, vec![TypeDesc::class("BoxZ0")]);
    }

    #[test]
    fn test_operator_method_dispatch() {
        let ir = compile_ok(
            "class V => {\n\
                public x: int;\n\
                public V(x: int) => { self.x = x; }\n\
                public op_add(o: V): V => { return V(self.x + o.x); }\n\
                public destroy() => { }\n\
             }\n\
             let main(): int => {\n\
                let a: V = V(1);\n\
                let b: V = a + a;\n\
                return b.x;\n\
             }",
        );
        assert!(ir.contains("call %V @V_op_add(ptr"), "{ir}");
    }

    #[test]
    fn test_converting_constructor_temporary_is_destroyed() {
        let context = Context::create();
        let mut generator = CodeGenerator::new(&context, "test", options()).unwrap();
        generator
            .compile_source(
                "test.ul",
                "class Meters => {\n\
                    public v: int;\n\
                    public Meters(x: int) => { self.v = x; }\n\
                    public destroy() => { }\n\
                 }\n\
                 let take(m: Meters): int => { return m.v; }\n\
                 let main(): int => { let n: int = take(5); return n; }",
            )
            .unwrap();
        assert!(generator.module().verify().is_ok());
        let main = function_ir(generator.module(), "main");
        assert!(main.contains("call void @Meters_0(ptr"), "{main}");
        assert!(main.contains("call i32 @take(%Meters"), "{main}");
        assert_eq!(main.matches("call void @Meters_destroy").count(), 1, "{main}");
    }

    #[test]
    fn test_while_loop_and_comparisons() {
        let ir = compile_ok(
            "let sum(n: int): int => {\n\
                let i: int = 0;\n\
                let s: int = 0;\n\
                while i < n => { s = s + i; i = i + 1; }\n\
                return s;\n\
             }\n\
             let half(x: u32): u32 => { return x / 2; }\n\
             let scale(x: float): float => { return x * 2.5; }",
        );
        assert!(ir.contains("icmp slt i32"), "{ir}");
        assert!(ir.contains("udiv i32"), "{ir}");
        assert!(ir.contains("fmul float"), "{ir}");
    }

    #[test]
    fn test_pointers_and_heap_builtins() {
        let ir = compile_ok(
            "let main(): int => {\n\
                let p: int* = @as(int*, malloc(@sizeof(int) * 4));\n\
                p[1] = 7;\n\
                let q: int* = p + 1;\n\
                let v: int = *q;\n\
                free(p);\n\
                return v;\n\
             }",
        );
        assert!(ir.contains("call ptr @malloc(i64"), "{ir}");
        assert!(ir.contains("getelementptr"), "{ir}");
        assert!(ir.contains("call void @free(ptr"), "{ir}");
    }

    #[test]
    fn test_variadic_syscall_and_strings() {
        let ir = compile_ok(
            "let main(): int => { return syscall(1, 1, \"hi\\n\", 3); }",
        );
        assert!(ir.contains("call i32 (i32, ...) @syscall(i32 1"), "{ir}");
        assert!(ir.contains("c\"hi\\0A\\00\""), "{ir}");
    }

    #[test]
    fn test_globals_and_constants() {
        let ir = compile_ok(
            "let counter: int = 5;\n\
             let LIMIT :: 10;\n\
             let bump(): int => { counter = counter + LIMIT; return counter; }",
        );
        assert!(ir.contains("@counter = global i32 5"), "{ir}");
        assert!(ir.contains("@LIMIT = constant i32 10"), "{ir}");
    }

    #[test]
    fn test_sizeof_is_i64() {
        let context = Context::create();
        let mut generator = CodeGenerator::new(&context, "test", options()).unwrap();
        let ty = generator.type_of(&parse_expr("@sizeof(int)")).unwrap();
        assert_eq!(ty.name(), Some("i64"));
        let ptr = generator.type_of(&parse_expr("\"abc\"")).unwrap();
        assert_eq!(ptr.to_string(), "char*");
    }

    #[test]
    fn test_functional_cast_and_bool_condition() {
        let ir = compile_ok(
            "let f(x: float): int => { if x => { return int(x); } return 0; }",
        );
        assert!(ir.contains("fptosi float"), "{ir}");
        assert!(ir.contains("fcmp one float"), "{ir}");
    }

    #[test]
    fn test_non_castable_class_to_int() {
        let err = compile_err(
            "class A => { public x: int; }\n\
             let f(a: A): int => { return a; }",
        );
        assert!(matches!(err.semantic(), Some(SemanticError::NonCastable { .. })), "{err}");
    }

    #[test]
    fn test_undeclared_identifier() {
        let err = compile_err("let f(): int => { return y; }");
        assert_eq!(
            err.semantic(),
            Some(&SemanticError::UndeclaredIdentifier("y".into()))
        );
        assert!(err.to_string().starts_with("test.ul:1:"), "{err}");
    }

    #[test]
    fn test_unknown_field_and_method() {
        let err = compile_err(
            "class P => { public x: int; }\n\
             let f(p: P*): int => { return p.z; }",
        );
        assert!(matches!(err.semantic(), Some(SemanticError::UnknownField { .. })));

        let err = compile_err(
            "class P => { public x: int; }\n\
             let f(p: P*): int => { return p.len(); }",
        );
        assert!(matches!(err.semantic(), Some(SemanticError::UnknownMethod { .. })));
    }

    #[test]
    fn test_unknown_type() {
        let err = compile_err("let f(x: Nope): int => { return 0; }");
        assert_eq!(err.semantic(), Some(&SemanticError::UnknownType("Nope".into())));
    }

    #[test]
    fn test_keep_going_collects_every_failure() {
        let context = Context::create();
        let opts = GeneratorOptions {
            keep_going: true,
            ..options()
        };
        let mut generator = CodeGenerator::new(&context, "test", opts).unwrap();
        let err = generator
            .compile_source(
                "test.ul",
                "let a(): int => { return x; }\n\
                 let ok(): int => { return 1; }\n\
                 let b(): int => { return y; }",
            )
            .unwrap_err();
        match err {
            CodegenError::Many(errors) => assert_eq!(errors.len(), 2),
            other => panic!("expected many errors, got {other}"),
        }
        assert!(generator.module().get_function("ok").is_some());
    }

    #[test]
    fn test_strict_interfaces() {
        let src = "interface Show<T> => { let show(self: T*): void; }\n\
                   class Holder => { @template: T: Show; public v: T; }\n\
                   class Num => { public n: int; public show(): void => { } }\n\
                   let f(h: Holder<Num>*): int => { return 0; }";
        let strict = GeneratorOptions {
            strict_interfaces: true,
            ..options()
        };
        compile_with(src, strict.clone());

        let context = Context::create();
        let mut generator = CodeGenerator::new(&context, "test", strict).unwrap();
        let err = generator
            .compile_source(
                "test.ul",
                "interface Show<T> => { let show(self: T*): void; }\n\
                 class Holder => { @template: T: Show; public v: T; }\n\
                 let f(h: Holder<int>*): int => { return 0; }",
            )
            .unwrap_err();
        assert!(matches!(err.semantic(), Some(SemanticError::UnknownMethod { .. })), "{err}");

        // Not enforced by default.
        compile_ok(
            "interface Show<T> => { let show(self: T*): void; }\n\
             class Holder => { @template: T: Show; public v: T; }\n\
             let f(h: Holder<int>*): int => { return 0; }",
        );
    }

    #[test]
    fn test_void_return_mismatch() {
        let err = compile_err("let f(): void => { return 1; }");
        assert!(matches!(err.semantic(), Some(SemanticError::NonCastable { .. })));
        let err = compile_err("let g(): int => { return; }");
        assert!(matches!(err.semantic(), Some(SemanticError::NonCastable { .. })));
    }
}
