use std::collections::HashMap;

use inkwell::AddressSpace;
use inkwell::context::Context;
use inkwell::types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum, FunctionType, StructType};
use inkwell::values::BasicValueEnum;
use ul_analysis::{Prim, SemanticError, SemanticResult, TypeDesc, TypeTable};

/// Maps semantic [`TypeDesc`]s to LLVM types for one context.
///
/// Class layouts are cached by name. A class is declared opaque first and
/// given its body once its members are resolved, so members may point back
/// at their own class.
pub struct TypeRegistry<'ctx> {
    context: &'ctx Context,
    struct_cache: HashMap<String, StructType<'ctx>>,
}

impl<'ctx> TypeRegistry<'ctx> {
    pub fn new(context: &'ctx Context) -> Self {
        Self {
            context,
            struct_cache: HashMap::new(),
        }
    }

    pub fn ptr_type(&self) -> BasicTypeEnum<'ctx> {
        self.context.ptr_type(AddressSpace::default()).into()
    }

    /// Value representation of a type. `void` and unbound generic
    /// parameters have none.
    pub fn basic_type(&self, ty: &TypeDesc) -> SemanticResult<BasicTypeEnum<'ctx>> {
        match ty {
            TypeDesc::Builtin { prim, .. } => self.prim_type(*prim),
            TypeDesc::Pointer(_) => Ok(self.ptr_type()),
            TypeDesc::Class { name } => self
                .struct_cache
                .get(name)
                .map(|s| (*s).into())
                .ok_or_else(|| SemanticError::UnknownType(name.clone())),
            TypeDesc::Alias { target, .. } => self.basic_type(target),
            TypeDesc::Placeholder { name, .. } | TypeDesc::InterfaceMarker { name, .. } => Err(
                SemanticError::invalid(format!("generic parameter `{name}` is not bound here")),
            ),
        }
    }

    fn prim_type(&self, prim: Prim) -> SemanticResult<BasicTypeEnum<'ctx>> {
        let ty = match prim {
            Prim::I8 | Prim::U8 => self.context.i8_type().into(),
            Prim::I16 | Prim::U16 => self.context.i16_type().into(),
            Prim::I32 | Prim::U32 => self.context.i32_type().into(),
            Prim::I64 | Prim::U64 => self.context.i64_type().into(),
            Prim::F32 => self.context.f32_type().into(),
            Prim::Bool => self.context.bool_type().into(),
            Prim::Void => {
                return Err(SemanticError::invalid("`void` has no value representation"));
            }
        };
        Ok(ty)
    }

    /// Build a function type. A `void` return becomes an LLVM void function.
    pub fn fn_type(
        &self,
        params: &[TypeDesc],
        ret: &TypeDesc,
        variadic: bool,
    ) -> SemanticResult<FunctionType<'ctx>> {
        let param_types = params
            .iter()
            .map(|p| self.basic_type(p).map(BasicMetadataTypeEnum::from))
            .collect::<SemanticResult<Vec<_>>>()?;

        if ret.is_void() {
            Ok(self.context.void_type().fn_type(&param_types, variadic))
        } else {
            Ok(self.basic_type(ret)?.fn_type(&param_types, variadic))
        }
    }

    /// Function type of a constructor or method: `self` pointer first.
    pub fn method_fn_type(
        &self,
        params: &[TypeDesc],
        ret: &TypeDesc,
    ) -> SemanticResult<FunctionType<'ctx>> {
        let mut with_self = Vec::with_capacity(params.len() + 1);
        with_self.push(ul_analysis::pointer_of(TypeDesc::class("")));
        with_self.extend_from_slice(params);
        self.fn_type(&with_self, ret, false)
    }

    // ---- Class layouts ----

    /// Declare (or fetch) the opaque struct backing a class.
    pub fn declare_struct(&mut self, name: &str) -> StructType<'ctx> {
        if let Some(&existing) = self.struct_cache.get(name) {
            return existing;
        }
        let st = self.context.opaque_struct_type(name);
        self.struct_cache.insert(name.to_string(), st);
        st
    }

    /// Give a declared class its field list, in member order.
    pub fn define_struct(&mut self, name: &str, fields: &[TypeDesc]) -> SemanticResult<StructType<'ctx>> {
        let st = self.declare_struct(name);
        let field_types = fields
            .iter()
            .map(|f| self.basic_type(f))
            .collect::<SemanticResult<Vec<_>>>()?;
        if st.is_opaque() {
            st.set_body(&field_types, false);
        }
        Ok(st)
    }

    pub fn get_struct(&self, name: &str) -> Option<StructType<'ctx>> {
        self.struct_cache.get(name).copied()
    }

    pub fn struct_of(&self, ty: &TypeDesc) -> SemanticResult<StructType<'ctx>> {
        match ty {
            TypeDesc::Class { name } => self
                .get_struct(name)
                .ok_or_else(|| SemanticError::UnknownType(name.clone())),
            other => Err(SemanticError::invalid(format!("`{other}` is not a class type"))),
        }
    }

    // ---- Constants ----

    /// All-zero value of a type: `0`, `0.0`, `null` or a zeroed aggregate.
    pub fn zero_value(&self, ty: &TypeDesc) -> SemanticResult<BasicValueEnum<'ctx>> {
        let value = match self.basic_type(ty)? {
            BasicTypeEnum::IntType(t) => t.const_zero().into(),
            BasicTypeEnum::FloatType(t) => t.const_zero().into(),
            BasicTypeEnum::PointerType(t) => t.const_null().into(),
            BasicTypeEnum::StructType(t) => t.const_zero().into(),
            BasicTypeEnum::ArrayType(t) => t.const_zero().into(),
            other => {
                return Err(SemanticError::invalid(format!(
                    "no zero value for backend type {other:?}"
                )));
            }
        };
        Ok(value)
    }

    /// Recover the semantic type behind a backend type by scanning the table
    /// from its oldest entry. Transient and `void` entries are skipped.
    pub fn resolve_by_backing_handle(
        &self,
        table: &TypeTable,
        handle: BasicTypeEnum<'ctx>,
    ) -> SemanticResult<TypeDesc> {
        table
            .iter()
            .filter(|t| matches!(t, TypeDesc::Builtin { .. } | TypeDesc::Class { .. }))
            .find(|t| self.basic_type(t).is_ok_and(|b| b == handle))
            .cloned()
            .ok_or_else(|| SemanticError::UnknownType(format!("{handle:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ul_analysis::pointer_of;

    #[test]
    fn test_builtin_lowering() {
        let context = Context::create();
        let registry = TypeRegistry::new(&context);
        let table = TypeTable::with_builtins();
        let get = |n: &str| registry.basic_type(&table.resolve_by_name(n).unwrap()).unwrap();

        assert_eq!(get("int"), context.i32_type().into());
        assert_eq!(get("char"), context.i8_type().into());
        assert_eq!(get("bool"), context.bool_type().into());
        assert_eq!(get("float"), context.f32_type().into());
        assert_eq!(get("u64"), context.i64_type().into());
        assert!(registry.basic_type(&table.resolve_by_name("void").unwrap()).is_err());
        assert_eq!(
            registry.basic_type(&pointer_of(TypeDesc::class("Nope"))).unwrap(),
            registry.ptr_type()
        );
    }

    #[test]
    fn test_self_referential_layout() {
        let context = Context::create();
        let mut registry = TypeRegistry::new(&context);
        let table = TypeTable::with_builtins();
        registry.declare_struct("Node");
        let fields = vec![
            table.resolve_by_name("int").unwrap(),
            pointer_of(TypeDesc::class("Node")),
        ];
        let st = registry.define_struct("Node", &fields).unwrap();
        assert!(!st.is_opaque());
        assert_eq!(st.count_fields(), 2);
    }

    #[test]
    fn test_resolve_by_backing_handle_prefers_oldest() {
        let context = Context::create();
        let registry = TypeRegistry::new(&context);
        let table = TypeTable::with_builtins();
        let i64_ty = registry
            .resolve_by_backing_handle(&table, context.i64_type().into())
            .unwrap();
        assert_eq!(i64_ty.name(), Some("i64"));
        let i32_ty = registry
            .resolve_by_backing_handle(&table, context.i32_type().into())
            .unwrap();
        assert_eq!(i32_ty.name(), Some("int"));
    }

    #[test]
    fn test_void_function_type() {
        let context = Context::create();
        let registry = TypeRegistry::new(&context);
        let table = TypeTable::with_builtins();
        let int = table.resolve_by_name("int").unwrap();
        let void = table.resolve_by_name("void").unwrap();
        let fn_ty = registry.fn_type(&[int.clone(), int], &void, false).unwrap();
        assert!(fn_ty.get_return_type().is_none());
        assert_eq!(fn_ty.count_param_types(), 2);
        let variadic = registry.method_fn_type(&[], &void).unwrap();
        assert_eq!(variadic.count_param_types(), 1);
    }
}
