use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::values::FunctionValue;
use ul_analysis::{ParamDesc, SemanticResult, Signature, TypeTable, pointer_of};

use crate::memory::MemoryManager;

/// Builtin functions every program can call without declaring them:
/// `syscall`, `malloc` and `free`, all resolved by libc at link time.
pub struct Intrinsics<'ctx> {
    context: &'ctx Context,
}

impl<'ctx> Intrinsics<'ctx> {
    pub fn new(context: &'ctx Context) -> Self {
        Self { context }
    }

    /// Declare all builtins in the module and return their signatures for
    /// the function table.
    pub fn declare_all(
        &self,
        module: &Module<'ctx>,
        memory: &mut MemoryManager<'ctx>,
        table: &TypeTable,
    ) -> SemanticResult<Vec<Signature>> {
        self.declare_syscall(module);
        memory.get_or_declare_malloc(module);
        memory.get_or_declare_free(module);
        builtin_signatures(table)
    }

    /// `syscall(sysno, ...) -> int`
    fn declare_syscall(&self, module: &Module<'ctx>) -> FunctionValue<'ctx> {
        if let Some(f) = module.get_function("syscall") {
            return f;
        }
        let i32_ty = self.context.i32_type();
        let fn_type = i32_ty.fn_type(&[i32_ty.into()], true);
        module.add_function("syscall", fn_type, None)
    }
}

fn param(name: &str, ty: ul_analysis::TypeDesc) -> ParamDesc {
    ParamDesc {
        name: name.to_string(),
        ty,
    }
}

pub fn builtin_signatures(table: &TypeTable) -> SemanticResult<Vec<Signature>> {
    let int = table.resolve_by_name("int")?;
    let u64_ty = table.resolve_by_name("u64")?;
    let void = table.resolve_by_name("void")?;
    let void_ptr = pointer_of(void.clone());

    Ok(vec![
        Signature {
            name: "syscall".into(),
            params: vec![param("sysno", int.clone())],
            ret: int,
            variadic: true,
        },
        Signature {
            name: "malloc".into(),
            params: vec![param("size", u64_ty)],
            ret: void_ptr.clone(),
            variadic: false,
        },
        Signature {
            name: "free".into(),
            params: vec![param("ptr", void_ptr)],
            ret: void,
            variadic: false,
        },
    ])
}
