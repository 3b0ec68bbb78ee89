use ul_frontend::ast::{BinaryOp, ClassDef, Expr, Visibility};

use crate::error::{SemanticError, SemanticResult};
use crate::types::{TypeDesc, TypeTable, is_castable};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDesc {
    pub name: String,
    pub ty: TypeDesc,
}

/// A callable signature: free function, interface prototype or method.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub name: String,
    pub params: Vec<ParamDesc>,
    pub ret: TypeDesc,
    pub variadic: bool,
}

impl Signature {
    /// Argument count check; variadic callees accept extra arguments.
    pub fn check_arity(&self, found: usize) -> SemanticResult<()> {
        let expected = self.params.len();
        if found == expected || (self.variadic && found > expected) {
            Ok(())
        } else {
            Err(SemanticError::ArityMismatch {
                callee: self.name.clone(),
                expected,
                found,
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberRecord {
    pub name: String,
    pub visibility: Visibility,
    pub ty: TypeDesc,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstructorRecord {
    pub visibility: Visibility,
    pub params: Vec<ParamDesc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodRecord {
    pub visibility: Visibility,
    pub sig: Signature,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenericParam {
    pub name: String,
    pub interface: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassRecord {
    pub name: String,
    /// Layout order.
    pub members: Vec<MemberRecord>,
    pub constructors: Vec<ConstructorRecord>,
    pub methods: Vec<MethodRecord>,
    /// Placeholders of a generic class; empty for concrete classes.
    pub generic: Vec<GenericParam>,
    /// Source of a generic class, re-read for every instantiation.
    pub template: Option<ClassDef>,
}

impl ClassRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
            constructors: Vec::new(),
            methods: Vec::new(),
            generic: Vec::new(),
            template: None,
        }
    }

    pub fn is_generic(&self) -> bool {
        !self.generic.is_empty()
    }

    pub fn member(&self, name: &str) -> SemanticResult<(u32, &MemberRecord)> {
        self.members
            .iter()
            .enumerate()
            .find(|(_, m)| m.name == name)
            .map(|(i, m)| (i as u32, m))
            .ok_or_else(|| SemanticError::UnknownField {
                class: self.name.clone(),
                field: name.to_string(),
            })
    }

    pub fn find_method(&self, name: &str) -> SemanticResult<&MethodRecord> {
        self.methods
            .iter()
            .find(|m| m.sig.name == name)
            .ok_or_else(|| SemanticError::UnknownMethod {
                class: self.name.clone(),
                method: name.to_string(),
            })
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.iter().any(|m| m.sig.name == name)
    }

    pub fn default_constructor(&self) -> Option<usize> {
        self.constructors.iter().position(|c| c.params.is_empty())
    }

    /// Operator methods dispatched for class-typed left operands.
    pub fn resolve_binop_method(&self, op: BinaryOp) -> SemanticResult<&MethodRecord> {
        let name = match op {
            BinaryOp::Add => "op_add",
            BinaryOp::Sub => "op_sub",
            BinaryOp::Mul => "op_mul",
            BinaryOp::Eq => "op_eq",
            other => {
                return Err(SemanticError::invalid(format!(
                    "operator `{}` is not supported on class `{}`",
                    other.symbol(),
                    self.name
                )));
            }
        };
        self.find_method(name)
    }

    pub fn constructor_link_name(&self, index: usize) -> String {
        format!("{}_{}", self.name, index)
    }

    pub fn method_link_name(&self, method: &str) -> String {
        format!("{}_{}", self.name, method)
    }
}

/// One monomorphized generic class.
#[derive(Debug, Clone, PartialEq)]
pub struct InstantiationRecord {
    pub base: String,
    pub args: Vec<TypeDesc>,
    /// Synthesized class name, `base + "Z" + ordinal`.
    pub name: String,
    /// Materialization failed; the name must not be handed out again.
    pub poisoned: bool,
}

impl InstantiationRecord {
    fn matches(&self, base: &str, args: &[TypeDesc]) -> bool {
        self.base == base
            && self.args.len() == args.len()
            && self.args.iter().zip(args).all(|(a, b)| a.same_as(b))
    }
}

/// Outcome of asking the registry for an instantiation.
#[derive(Debug, Clone, PartialEq)]
pub enum Instantiation {
    /// Already materialized under this name.
    Existing(String),
    /// Reserved now; the caller must materialize it.
    Fresh(InstantiationRecord),
    /// Reserved earlier but never materialized.
    Poisoned(String),
}

impl Instantiation {
    pub fn name(&self) -> &str {
        match self {
            Instantiation::Existing(name) | Instantiation::Poisoned(name) => name,
            Instantiation::Fresh(record) => &record.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceRecord {
    pub name: String,
    pub type_param: String,
    pub prototypes: Vec<Signature>,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ClassRegistry {
    classes: Vec<ClassRecord>,
    instances: Vec<InstantiationRecord>,
    interfaces: Vec<InterfaceRecord>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a class or generic template. A later definition of the same name
    /// shadows the earlier one.
    pub fn define(&mut self, record: ClassRecord) {
        tracing::debug!(class = %record.name, generic = record.is_generic(), "class defined");
        self.classes.push(record);
    }

    pub fn get(&self, name: &str) -> Option<&ClassRecord> {
        self.classes.iter().rev().find(|c| c.name == name)
    }

    pub fn lookup(&self, name: &str) -> SemanticResult<&ClassRecord> {
        self.get(name)
            .ok_or_else(|| SemanticError::UnknownType(name.to_string()))
    }

    /// The class behind a canonical class-typed descriptor.
    pub fn of_type(&self, ty: &TypeDesc) -> SemanticResult<&ClassRecord> {
        match ty {
            TypeDesc::Class { name } => self.lookup(name),
            other => Err(SemanticError::invalid(format!(
                "`{other}` is not a class type"
            ))),
        }
    }

    /// Cached instantiation of `base` with `args`, or a fresh reservation.
    ///
    /// The ordinal is the number of earlier instantiations of `base`. The
    /// reservation is recorded immediately, so a request for the same
    /// arguments made while the fresh one is still being materialized
    /// resolves to the same name.
    pub fn instantiate(&mut self, base: &str, args: &[TypeDesc]) -> Instantiation {
        if let Some(existing) = self.instances.iter().find(|i| i.matches(base, args)) {
            return if existing.poisoned {
                Instantiation::Poisoned(existing.name.clone())
            } else {
                Instantiation::Existing(existing.name.clone())
            };
        }
        let ordinal = self.instances.iter().filter(|i| i.base == base).count();
        let record = InstantiationRecord {
            base: base.to_string(),
            args: args.to_vec(),
            name: format!("{base}Z{ordinal}"),
            poisoned: false,
        };
        tracing::debug!(base, name = %record.name, "instantiation reserved");
        self.instances.push(record.clone());
        Instantiation::Fresh(record)
    }

    /// Mark a reservation whose materialization failed. The ordinal stays
    /// taken so later instances keep their names.
    pub fn poison(&mut self, name: &str) {
        if let Some(record) = self.instances.iter_mut().find(|i| i.name == name) {
            record.poisoned = true;
        }
    }

    pub fn instances(&self) -> &[InstantiationRecord] {
        &self.instances
    }

    pub fn define_interface(&mut self, record: InterfaceRecord) {
        tracing::debug!(interface = %record.name, "interface defined");
        self.interfaces.push(record);
    }

    pub fn interface(&self, name: &str) -> Option<&InterfaceRecord> {
        self.interfaces.iter().rev().find(|i| i.name == name)
    }

    /// Whether `class` has a single-argument constructor taking exactly `from`.
    pub fn has_converting_constructor(&self, class: &str, from: &TypeDesc) -> bool {
        self.converting_constructor(class, from).is_some()
    }

    pub fn converting_constructor(&self, class: &str, from: &TypeDesc) -> Option<usize> {
        let record = self.get(class)?;
        record
            .constructors
            .iter()
            .position(|c| c.params.len() == 1 && c.params[0].ty.same_as(from))
    }

    /// Implicit conversion check used for overload matching: the numeric and
    /// pointer rules plus converting constructors into class types.
    pub fn accepts(&self, table: &TypeTable, expected: &TypeDesc, provided: &TypeDesc) -> bool {
        let expected = table.canonicalize(expected);
        let provided = table.canonicalize(provided);
        if expected.same_as(&provided) {
            return true;
        }
        if let Some(class) = expected.class_name() {
            if self.has_converting_constructor(class, &provided) {
                return true;
            }
        }
        is_castable(&provided, &expected)
    }

    /// First constructor of `class` whose every parameter accepts the
    /// corresponding argument type.
    pub fn find_matching_constructor(
        &self,
        table: &TypeTable,
        class: &str,
        arg_types: &[TypeDesc],
    ) -> SemanticResult<usize> {
        let record = self.lookup(class)?;
        record
            .constructors
            .iter()
            .position(|ctor| {
                ctor.params.len() == arg_types.len()
                    && ctor
                        .params
                        .iter()
                        .zip(arg_types)
                        .all(|(p, a)| self.accepts(table, &p.ty, a))
            })
            .ok_or_else(|| SemanticError::NoMatchingConstructor {
                class: class.to_string(),
                args: arg_types
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}
