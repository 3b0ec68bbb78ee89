//! Explicit and implicit conversions between semantic types.

use inkwell::values::{BasicValueEnum, FloatValue, IntValue, PointerValue};
use inkwell::{FloatPredicate, IntPredicate};
use ul_analysis::{SemanticError, TypeDesc};
use ul_frontend::Location;

use crate::CodeGenerator;
use crate::error::{At, CgResult};

pub(crate) fn as_pointer<'ctx>(
    value: BasicValueEnum<'ctx>,
    location: &Location,
) -> CgResult<PointerValue<'ctx>> {
    match value {
        BasicValueEnum::PointerValue(p) => Ok(p),
        other => Err(SemanticError::invalid(format!(
            "expected a pointer value, found {}",
            other.get_type()
        )))
        .at(location),
    }
}

pub(crate) fn as_int<'ctx>(
    value: BasicValueEnum<'ctx>,
    location: &Location,
) -> CgResult<IntValue<'ctx>> {
    match value {
        BasicValueEnum::IntValue(i) => Ok(i),
        other => Err(SemanticError::invalid(format!(
            "expected an integer value, found {}",
            other.get_type()
        )))
        .at(location),
    }
}

pub(crate) fn as_float<'ctx>(
    value: BasicValueEnum<'ctx>,
    location: &Location,
) -> CgResult<FloatValue<'ctx>> {
    match value {
        BasicValueEnum::FloatValue(f) => Ok(f),
        other => Err(SemanticError::invalid(format!(
            "expected a float value, found {}",
            other.get_type()
        )))
        .at(location),
    }
}

fn is_unsigned(ty: &TypeDesc) -> bool {
    ty.prim().is_some_and(|p| !p.is_signed())
}

impl<'ctx> CodeGenerator<'ctx> {
    /// Convert `value` of type `from` into type `to`.
    ///
    /// Numeric conversions follow the source signedness, anything becomes
    /// `bool` by comparing against zero, and pointers convert freely among
    /// themselves and to and from integers. A class target goes through one
    /// of its constructors; class sources cannot be converted at all.
    pub(crate) fn emit_cast(
        &mut self,
        value: BasicValueEnum<'ctx>,
        from: &TypeDesc,
        to: &TypeDesc,
        location: &Location,
    ) -> CgResult<BasicValueEnum<'ctx>> {
        let from = self.types.canonicalize(from);
        let to = self.types.canonicalize(to);
        if from.same_as(&to) {
            return Ok(value);
        }
        if from.is_void() || to.is_void() || (from.class_name().is_some() && to.class_name().is_none()) {
            return Err(SemanticError::non_castable(&from, &to)).at(location);
        }

        if let Some(class) = to.class_name() {
            let class = class.to_string();
            let slot = self.convert_into_class(value, &from, &class, None, location)?;
            return self.load(&to, slot, location);
        }

        let target = self.registry.basic_type(&to).at(location)?;
        let b = &self.builder;

        let converted: BasicValueEnum<'ctx> = if to.is_bool() {
            if from.is_float() {
                let f = as_float(value, location)?;
                b.build_float_compare(FloatPredicate::ONE, f, f.get_type().const_zero(), "tobool")?
                    .into()
            } else if from.is_pointer() {
                b.build_is_not_null(as_pointer(value, location)?, "tobool")?.into()
            } else {
                let i = as_int(value, location)?;
                b.build_int_compare(IntPredicate::NE, i, i.get_type().const_zero(), "tobool")?
                    .into()
            }
        } else if to.is_float() {
            let float_ty = target.into_float_type();
            if from.is_float() {
                value
            } else if from.is_integer() {
                let i = as_int(value, location)?;
                if is_unsigned(&from) {
                    b.build_unsigned_int_to_float(i, float_ty, "uitofp")?.into()
                } else {
                    b.build_signed_int_to_float(i, float_ty, "sitofp")?.into()
                }
            } else {
                return Err(SemanticError::non_castable(&from, &to)).at(location);
            }
        } else if to.is_integer() {
            let int_ty = target.into_int_type();
            if from.is_float() {
                let f = as_float(value, location)?;
                if is_unsigned(&to) {
                    b.build_float_to_unsigned_int(f, int_ty, "fptoui")?.into()
                } else {
                    b.build_float_to_signed_int(f, int_ty, "fptosi")?.into()
                }
            } else if from.is_pointer() {
                b.build_ptr_to_int(as_pointer(value, location)?, int_ty, "ptrtoint")?
                    .into()
            } else if from.is_integer() {
                let i = as_int(value, location)?;
                b.build_int_cast_sign_flag(i, int_ty, !is_unsigned(&from), "intcast")?
                    .into()
            } else {
                return Err(SemanticError::non_castable(&from, &to)).at(location);
            }
        } else if to.is_pointer() {
            if from.is_pointer() {
                value
            } else if from.is_integer() {
                let ptr_ty = self.context.ptr_type(inkwell::AddressSpace::default());
                b.build_int_to_ptr(as_int(value, location)?, ptr_ty, "inttoptr")?
                    .into()
            } else {
                return Err(SemanticError::non_castable(&from, &to)).at(location);
            }
        } else {
            return Err(SemanticError::non_castable(&from, &to)).at(location);
        };
        Ok(converted)
    }

    /// Construct an instance of `class` from a single `from` value, through
    /// the converting constructor taking exactly `from` or else the first
    /// one-argument constructor that accepts it.
    ///
    /// Without `dest` the object lands in a fresh temporary that is
    /// destroyed with the enclosing scope.
    pub(crate) fn convert_into_class(
        &mut self,
        value: BasicValueEnum<'ctx>,
        from: &TypeDesc,
        class: &str,
        dest: Option<PointerValue<'ctx>>,
        location: &Location,
    ) -> CgResult<PointerValue<'ctx>> {
        let index = match self.classes.converting_constructor(class, from) {
            Some(index) => index,
            None => self
                .classes
                .find_matching_constructor(&self.types, class, std::slice::from_ref(from))
                .map_err(|_| SemanticError::non_castable(from, class))
                .at(location)?,
        };
        let record = self.classes.lookup(class).at(location)?;
        let link_name = record.constructor_link_name(index);
        let param_ty = record
            .constructors
            .get(index)
            .and_then(|c| c.params.first())
            .map(|p| p.ty.clone())
            .ok_or_else(|| SemanticError::non_castable(from, class))
            .at(location)?;

        let arg = self.emit_cast(value, from, &param_ty, location)?;
        let class_ty = TypeDesc::class(class);
        let slot = match dest {
            Some(slot) => slot,
            None => {
                let slot = self.entry_alloca(&class_ty, "conv", location)?;
                self.register_defer(&class_ty, slot);
                slot
            }
        };
        let ctor = self.link_function(&link_name, location)?;
        self.builder
            .build_call(ctor, &[slot.into(), arg.into()], "")?;
        Ok(slot)
    }
}

#[cfg(test)]
mod tests {
    use crate::{CodeGenerator, GeneratorOptions};
    use inkwell::context::Context;
    use ul_analysis::SemanticError;

    fn ir_of(src: &str) -> String {
        let context = Context::create();
        let mut generator = CodeGenerator::new(&context, "t", GeneratorOptions::default()).unwrap();
        generator.compile_source("t.ul", src).unwrap();
        assert!(generator.module().verify().is_ok());
        generator.module().print_to_string().to_string()
    }

    #[test]
    fn test_numeric_conversions_follow_signedness() {
        let ir = ir_of(
            "let f(a: u8, b: i8, x: float): void => {\n\
                let w: i64 = a;\n\
                let s: i64 = b;\n\
                let y: float = a;\n\
                let z: u32 = x;\n\
             }",
        );
        assert!(ir.contains("zext i8"), "{ir}");
        assert!(ir.contains("sext i8"), "{ir}");
        assert!(ir.contains("uitofp i8"), "{ir}");
        assert!(ir.contains("fptoui float"), "{ir}");
    }

    #[test]
    fn test_conversions_to_bool_and_pointers() {
        let ir = ir_of(
            "let f(p: char*, n: i64): bool => {\n\
                let q: int* = @as(int*, n);\n\
                let m: i64 = @as(i64, p);\n\
                return p;\n\
             }",
        );
        assert!(ir.contains("inttoptr i64"), "{ir}");
        assert!(ir.contains("ptrtoint ptr"), "{ir}");
        assert!(ir.contains("icmp ne ptr"), "{ir}");
    }

    #[test]
    fn test_float_to_pointer_is_rejected() {
        let context = Context::create();
        let mut generator = CodeGenerator::new(&context, "t", GeneratorOptions::default()).unwrap();
        let err = generator
            .compile_source("t.ul", "let f(x: float): void => { let p: char* = x; }")
            .unwrap_err();
        assert!(matches!(err.semantic(), Some(SemanticError::NonCastable { .. })));
    }
}
