//! Generic classes: templates, monomorphized instances and interface
//! constraints.

use ul_analysis::{
    ClassRecord, GenericParam, Instantiation, InstantiationRecord, InterfaceRecord, SemanticError,
    Signature, TypeDesc,
};
use ul_frontend::Location;
use ul_frontend::ast::{ClassDef, InterfaceDef, TypeRef};

use crate::CodeGenerator;
use crate::error::{At, CgResult};

impl<'ctx> CodeGenerator<'ctx> {
    /// Register a generic class as a template. Its members are resolved with
    /// the template parameters standing in as placeholders, but no layout is
    /// materialized until an instantiation asks for one.
    pub(crate) fn define_template(&mut self, def: &ClassDef) -> CgResult<()> {
        tracing::debug!(class = %def.name, params = def.template.len(), "defining template");
        let marker = self.types.fresh_marker();
        for param in &def.template {
            self.types.register(TypeDesc::Placeholder {
                name: param.name.clone(),
                constraint: param.interface.clone(),
                marker,
            });
        }
        if !self.types.contains(&def.name) {
            self.types.register(TypeDesc::class(&def.name));
        }

        let record = self.build_record(&def.name, def);
        self.types.remove_marker(marker);

        let mut record = record?;
        record.generic = def
            .template
            .iter()
            .map(|p| GenericParam {
                name: p.name.clone(),
                interface: p.interface.clone(),
            })
            .collect();
        record.template = Some(def.clone());
        self.classes.define(record);
        Ok(())
    }

    /// Resolve `base<args>` to a concrete class, materializing it the first
    /// time these arguments are seen.
    ///
    /// While the arguments still mention placeholders (inside a template) the
    /// unapplied base class is returned instead.
    pub(crate) fn instantiate(
        &mut self,
        base: &str,
        args: &[TypeRef],
        location: &Location,
    ) -> CgResult<TypeDesc> {
        let concrete = args
            .iter()
            .map(|a| self.resolve_type(a))
            .collect::<CgResult<Vec<_>>>()?;
        if concrete.iter().any(TypeDesc::mentions_placeholder) {
            return Ok(TypeDesc::class(base));
        }

        let template = self.classes.lookup(base).at(location)?;
        if !template.is_generic() {
            return Err(SemanticError::invalid(format!(
                "class `{base}` takes no type arguments"
            )))
            .at(location);
        }
        if template.generic.len() != concrete.len() {
            return Err(SemanticError::ArityMismatch {
                callee: base.to_string(),
                expected: template.generic.len(),
                found: concrete.len(),
            })
            .at(location);
        }
        let params = template.generic.clone();
        let def = template
            .template
            .clone()
            .ok_or_else(|| SemanticError::invalid(format!("template `{base}` has no source")))
            .at(location)?;

        if self.options.strict_interfaces {
            for (param, arg) in params.iter().zip(&concrete) {
                if let Some(interface) = &param.interface {
                    self.check_interface(interface, arg).at(location)?;
                }
            }
        }

        match self.classes.instantiate(base, &concrete) {
            Instantiation::Existing(name) => Ok(TypeDesc::class(name)),
            Instantiation::Poisoned(name) => Err(SemanticError::invalid(format!(
                "`{name}` could not be generated from `{base}`"
            )))
            .at(location),
            Instantiation::Fresh(record) => {
                if let Err(error) = self.materialize_instance(&record, &params, &def) {
                    self.classes.poison(&record.name);
                    return Err(error);
                }
                Ok(TypeDesc::class(record.name))
            }
        }
    }

    /// Build the concrete class for a freshly reserved instantiation.
    ///
    /// Each template parameter is bound to its argument by an alias tagged
    /// with a fresh marker, as is the base name itself (so `Box` inside
    /// `Box`'s own methods means this instance). The aliases are retired
    /// once the class and its bodies have been generated.
    fn materialize_instance(
        &mut self,
        record: &InstantiationRecord,
        params: &[GenericParam],
        def: &ClassDef,
    ) -> CgResult<()> {
        tracing::debug!(base = %record.base, instance = %record.name, "materializing instance");
        self.registry.declare_struct(&record.name);
        self.types.register(TypeDesc::class(&record.name));

        let marker = self.types.fresh_marker();
        for (param, arg) in params.iter().zip(&record.args) {
            self.types.register(TypeDesc::Alias {
                name: param.name.clone(),
                target: Box::new(arg.clone()),
                marker,
            });
        }
        self.types.register(TypeDesc::Alias {
            name: record.base.clone(),
            target: Box::new(TypeDesc::class(&record.name)),
            marker,
        });

        let result = self.detached(|g| g.define_concrete_class(&record.name, def, true));
        self.types.remove_marker(marker);
        result
    }

    /// Every prototype `m` of `interface` with `n` parameters must be met by a
    /// free function `m` taking `n` arguments or a method `m` of `arg` taking
    /// `n - 1` (the receiver fills the first slot).
    fn check_interface(&self, interface: &str, arg: &TypeDesc) -> Result<(), SemanticError> {
        let record = self
            .classes
            .interface(interface)
            .ok_or_else(|| SemanticError::UnknownType(interface.to_string()))?;
        let class = arg.class_name().and_then(|name| self.classes.get(name));

        for proto in &record.prototypes {
            let arity = proto.params.len();
            let free = self
                .functions
                .iter()
                .any(|f| f.name == proto.name && f.params.len() == arity);
            let method = class.is_some_and(|c| {
                c.methods
                    .iter()
                    .any(|m| m.sig.name == proto.name && m.sig.params.len() + 1 == arity)
            });
            if !free && !method {
                return Err(SemanticError::UnknownMethod {
                    class: arg.to_string(),
                    method: proto.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Record an interface's prototypes, reading its type parameter as a
    /// transient interface marker.
    pub(crate) fn define_interface(&mut self, def: &InterfaceDef) -> CgResult<()> {
        tracing::debug!(interface = %def.name, "defining interface");
        let marker = self.types.fresh_marker();
        self.types.register(TypeDesc::InterfaceMarker {
            name: def.type_param.clone(),
            interface: def.name.clone(),
            marker,
        });

        let prototypes = def
            .prototypes
            .iter()
            .map(|proto| {
                Ok(Signature {
                    name: proto.name.clone(),
                    params: self.resolve_params(&proto.params)?,
                    ret: self.resolve_return(proto.ret.as_ref())?,
                    variadic: false,
                })
            })
            .collect::<CgResult<Vec<_>>>();
        self.types.remove_marker(marker);

        self.classes.define_interface(InterfaceRecord {
            name: def.name.clone(),
            type_param: def.type_param.clone(),
            prototypes: prototypes?,
        });
        Ok(())
    }

    /// Base name of the generic behind an instance, e.g. `Box` for `BoxZ0`.
    pub(crate) fn instance_base(&self, class: &str) -> Option<&str> {
        self.classes
            .instances()
            .iter()
            .find(|i| i.name == class)
            .map(|i| i.base.as_str())
    }

    /// The template record behind `name`, if `name` is a generic class.
    pub(crate) fn template(&self, name: &str) -> Option<&ClassRecord> {
        self.classes.get(name).filter(|c| c.is_generic())
    }
}

#[cfg(test)]
mod tests {
    use crate::{CodeGenerator, GeneratorOptions};
    use inkwell::context::Context;
    use ul_analysis::TypeDesc;

    #[test]
    fn test_template_placeholders_are_retired() {
        let context = Context::create();
        let mut generator = CodeGenerator::new(&context, "t", GeneratorOptions::default()).unwrap();
        let before = generator.types().len();
        generator
            .compile_source("t.ul", "class Pair => { @template: A, B; public a: A; public b: B; }")
            .unwrap();
        // Only the template's own class name stays behind.
        assert_eq!(generator.types().len(), before + 1);
        assert!(generator.types().lookup("A").is_none());
        let record = generator.classes().get("Pair").unwrap();
        assert!(record.is_generic());
        assert!(record.members[0].ty.mentions_placeholder());
    }

    #[test]
    fn test_instance_aliases_are_retired() {
        let context = Context::create();
        let mut generator = CodeGenerator::new(&context, "t", GeneratorOptions::default()).unwrap();
        generator
            .compile_source(
                "t.ul",
                "class Pair => { @template: A, B; public a: A; public b: B; }\n\
                 let f(p: Pair<int, char*>*): char* => { return p.b; }",
            )
            .unwrap();
        assert!(generator.module().verify().is_ok());
        assert!(generator.types().lookup("A").is_none());
        assert_eq!(generator.types().lookup("Pair"), Some(&TypeDesc::class("Pair")));
        assert_eq!(generator.classes().instances()[0].name, "PairZ0");
    }

    #[test]
    fn test_wrong_argument_count() {
        let context = Context::create();
        let mut generator = CodeGenerator::new(&context, "t", GeneratorOptions::default()).unwrap();
        let err = generator
            .compile_source(
                "t.ul",
                "class Box => { @template: T; public v: T; }\n\
                 let f(b: Box<int, int>*): int => { return 0; }",
            )
            .unwrap_err();
        assert!(matches!(
            err.semantic(),
            Some(ul_analysis::SemanticError::ArityMismatch { expected: 1, found: 2, .. })
        ));
    }

    #[test]
    fn test_failed_instance_is_not_reused() {
        let context = Context::create();
        let options = GeneratorOptions {
            keep_going: true,
            ..GeneratorOptions::default()
        };
        let mut generator = CodeGenerator::new(&context, "t", options).unwrap();
        let err = generator
            .compile_source(
                "t.ul",
                "class Box => {\n\
                    @template: T;\n\
                    public v: T;\n\
                    public get(): int => { return self.v.x; }\n\
                 }\n\
                 let f(b: Box<int>*): int => { return 0; }\n\
                 let g(b: Box<int>*): int => { return 1; }",
            )
            .unwrap_err();
        let crate::CodegenError::Many(errors) = err else {
            panic!("expected both declarations to fail: {err}");
        };
        assert_eq!(errors.len(), 2);
        assert!(errors[1].to_string().starts_with("t.ul:7:"), "{}", errors[1]);
        assert!(errors[1].to_string().contains("`BoxZ0` could not be generated"), "{}", errors[1]);
        assert!(generator.classes().instances()[0].poisoned);
    }

    #[test]
    fn test_self_referential_instance() {
        let context = Context::create();
        let mut generator = CodeGenerator::new(&context, "t", GeneratorOptions::default()).unwrap();
        generator
            .compile_source(
                "t.ul",
                "class Node => {\n\
                    @template: T;\n\
                    public value: T;\n\
                    public next: Node<T>*;\n\
                    public second(): T => { return self.next.value; }\n\
                 }\n\
                 let f(n: Node<int>*): int => { return n.second(); }",
            )
            .unwrap();
        assert!(generator.module().verify().is_ok());
        assert_eq!(generator.classes().instances().len(), 1);
        let ir = generator.module().print_to_string().to_string();
        assert!(ir.contains("%NodeZ0 = type { i32, ptr }"), "{ir}");
    }
}
