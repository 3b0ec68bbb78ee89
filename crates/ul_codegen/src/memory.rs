use inkwell::AddressSpace;
use inkwell::builder::BuilderError;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::types::BasicTypeEnum;
use inkwell::values::{FunctionValue, PointerValue};

/// Stack slots and the libc heap primitives behind the `malloc`/`free`
/// builtins.
pub struct MemoryManager<'ctx> {
    context: &'ctx Context,
    /// Cached declaration of libc `malloc`.
    malloc_fn: Option<FunctionValue<'ctx>>,
    /// Cached declaration of libc `free`.
    free_fn: Option<FunctionValue<'ctx>>,
}

impl<'ctx> MemoryManager<'ctx> {
    pub fn new(context: &'ctx Context) -> Self {
        Self {
            context,
            malloc_fn: None,
            free_fn: None,
        }
    }

    // ---- Stack allocation ----

    /// Emit an `alloca` at the top of `function`'s entry block, so slots
    /// created inside loops are not re-allocated on every iteration.
    pub fn build_entry_alloca(
        &self,
        function: FunctionValue<'ctx>,
        ty: BasicTypeEnum<'ctx>,
        name: &str,
    ) -> Result<PointerValue<'ctx>, BuilderError> {
        let tmp = self.context.create_builder();
        match function.get_first_basic_block() {
            Some(entry) => match entry.get_first_instruction() {
                Some(first) => tmp.position_before(&first),
                None => tmp.position_at_end(entry),
            },
            None => {
                let entry = self.context.append_basic_block(function, "entry");
                tmp.position_at_end(entry);
            }
        }
        tmp.build_alloca(ty, name)
    }

    // ---- Heap allocation ----

    /// Ensure `malloc` is declared in the module and return it.
    pub fn get_or_declare_malloc(&mut self, module: &Module<'ctx>) -> FunctionValue<'ctx> {
        if let Some(f) = self.malloc_fn {
            return f;
        }
        let f = module.get_function("malloc").unwrap_or_else(|| {
            let ptr_ty = self.context.ptr_type(AddressSpace::default());
            let fn_type = ptr_ty.fn_type(&[self.context.i64_type().into()], false);
            module.add_function("malloc", fn_type, None)
        });
        self.malloc_fn = Some(f);
        f
    }

    /// Ensure `free` is declared in the module and return it.
    pub fn get_or_declare_free(&mut self, module: &Module<'ctx>) -> FunctionValue<'ctx> {
        if let Some(f) = self.free_fn {
            return f;
        }
        let f = module.get_function("free").unwrap_or_else(|| {
            let ptr_ty = self.context.ptr_type(AddressSpace::default());
            let fn_type = self.context.void_type().fn_type(&[ptr_ty.into()], false);
            module.add_function("free", fn_type, None)
        });
        self.free_fn = Some(f);
        f
    }
}
