use ul_analysis::{SemanticError, TypeDesc, pointer_of};
use ul_frontend::ast::TypeRef;

use crate::CodeGenerator;
use crate::error::{At, CgResult};

impl<'ctx> CodeGenerator<'ctx> {
    /// Resolve a syntactic type to its canonical descriptor.
    ///
    /// `Name<args>` instantiates the generic class `Name`; pointer stars wrap
    /// the resolved base. Unknown names fail with `UnknownType`.
    pub fn resolve_type(&mut self, tref: &TypeRef) -> CgResult<TypeDesc> {
        let base = if tref.args.is_empty() {
            self.types.resolve_by_name(&tref.name).at(&tref.location)?
        } else {
            self.instantiate(&tref.name, &tref.args, &tref.location)?
        };
        let mut ty = self.types.canonicalize(&base);
        for _ in 0..tref.ptr_depth {
            ty = pointer_of(ty);
        }
        Ok(ty)
    }

    /// Resolve a declared return type; a missing one means `void`.
    pub(crate) fn resolve_return(&mut self, tref: Option<&TypeRef>) -> CgResult<TypeDesc> {
        match tref {
            Some(tref) => self.resolve_type(tref),
            None => Ok(self.types.resolve_by_name("void")?),
        }
    }

    /// Resolve a type that must have a value representation.
    pub(crate) fn resolve_value_type(&mut self, tref: &TypeRef) -> CgResult<TypeDesc> {
        let ty = self.resolve_type(tref)?;
        if ty.is_void() {
            return Err(SemanticError::invalid("`void` cannot be stored")).at(&tref.location);
        }
        Ok(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GeneratorOptions;
    use inkwell::context::Context;
    use ul_frontend::Location;

    fn tref(name: &str, ptr_depth: usize) -> TypeRef {
        TypeRef {
            ptr_depth,
            ..TypeRef::named(name, Location::builtin())
        }
    }

    #[test]
    fn test_pointer_depth_wraps_base() {
        let context = Context::create();
        let mut generator = CodeGenerator::new(&context, "t", GeneratorOptions::default()).unwrap();
        let ty = generator.resolve_type(&tref("char", 2)).unwrap();
        assert_eq!(ty.to_string(), "char**");
        assert_eq!(ty.pointee().and_then(|p| p.pointee()).and_then(|p| p.name()), Some("char"));
    }

    #[test]
    fn test_unknown_type_is_reported() {
        let context = Context::create();
        let mut generator = CodeGenerator::new(&context, "t", GeneratorOptions::default()).unwrap();
        let err = generator.resolve_type(&tref("Widget", 1)).unwrap_err();
        assert_eq!(err.semantic(), Some(&SemanticError::UnknownType("Widget".into())));
    }

    #[test]
    fn test_missing_return_is_void() {
        let context = Context::create();
        let mut generator = CodeGenerator::new(&context, "t", GeneratorOptions::default()).unwrap();
        assert!(generator.resolve_return(None).unwrap().is_void());
        assert!(generator.resolve_value_type(&tref("void", 0)).is_err());
        assert!(generator.resolve_value_type(&tref("void", 1)).is_ok());
    }
}
