use std::fmt;

use crate::error::{SemanticError, SemanticResult};

/// Primitive representation behind a builtin type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prim {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    Bool,
    Void,
}

impl Prim {
    pub fn bits(self) -> u32 {
        match self {
            Prim::Bool => 1,
            Prim::I8 | Prim::U8 => 8,
            Prim::I16 | Prim::U16 => 16,
            Prim::I32 | Prim::U32 | Prim::F32 => 32,
            Prim::I64 | Prim::U64 => 64,
            Prim::Void => 0,
        }
    }

    /// Allocation size in bytes, as the backend reports it.
    pub fn size_bytes(self) -> u64 {
        match self {
            Prim::Void => 0,
            Prim::Bool => 1,
            other => u64::from(other.bits() / 8),
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, Prim::I8 | Prim::I16 | Prim::I32 | Prim::I64)
    }

    pub fn is_float(self) -> bool {
        self == Prim::F32
    }

    /// Integers of any width and signedness, plus `bool`.
    pub fn is_integer(self) -> bool {
        !matches!(self, Prim::F32 | Prim::Void)
    }

    /// Two primitives are interchangeable when they lower to the same backend type.
    pub fn same_repr(self, other: Prim) -> bool {
        self.bits() == other.bits() && self.is_float() == other.is_float()
    }
}

/// Unique tag for transient type-table entries, so entries that share a name
/// across nested instantiations can be retired independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Marker(u32);

/// Semantic type descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDesc {
    Builtin { name: String, prim: Prim },
    Pointer(Box<TypeDesc>),
    Class { name: String },
    /// A name standing for another type, e.g. a placeholder bound to its
    /// concrete argument during one instantiation.
    Alias {
        name: String,
        target: Box<TypeDesc>,
        marker: Marker,
    },
    /// Unresolved generic parameter.
    Placeholder {
        name: String,
        constraint: Option<String>,
        marker: Marker,
    },
    /// The type parameter of an interface while its prototypes are read.
    InterfaceMarker {
        name: String,
        interface: String,
        marker: Marker,
    },
}

impl TypeDesc {
    pub fn builtin(name: &str, prim: Prim) -> Self {
        TypeDesc::Builtin {
            name: name.to_string(),
            prim,
        }
    }

    pub fn class(name: impl Into<String>) -> Self {
        TypeDesc::Class { name: name.into() }
    }

    /// Name under which the descriptor is found in the [`TypeTable`].
    pub fn name(&self) -> Option<&str> {
        match self {
            TypeDesc::Builtin { name, .. }
            | TypeDesc::Class { name }
            | TypeDesc::Alias { name, .. }
            | TypeDesc::Placeholder { name, .. }
            | TypeDesc::InterfaceMarker { name, .. } => Some(name),
            TypeDesc::Pointer(_) => None,
        }
    }

    pub fn marker(&self) -> Option<Marker> {
        match self {
            TypeDesc::Alias { marker, .. }
            | TypeDesc::Placeholder { marker, .. }
            | TypeDesc::InterfaceMarker { marker, .. } => Some(*marker),
            _ => None,
        }
    }

    pub fn prim(&self) -> Option<Prim> {
        match self {
            TypeDesc::Builtin { prim, .. } => Some(*prim),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        self.prim() == Some(Prim::Void)
    }

    pub fn is_bool(&self) -> bool {
        self.prim() == Some(Prim::Bool)
    }

    pub fn is_float(&self) -> bool {
        self.prim().is_some_and(Prim::is_float)
    }

    pub fn is_integer(&self) -> bool {
        self.prim().is_some_and(Prim::is_integer)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, TypeDesc::Pointer(_))
    }

    pub fn class_name(&self) -> Option<&str> {
        match self {
            TypeDesc::Class { name } => Some(name),
            _ => None,
        }
    }

    pub fn pointee(&self) -> Option<&TypeDesc> {
        match self {
            TypeDesc::Pointer(inner) => Some(inner),
            _ => None,
        }
    }

    /// Whether an unresolved generic parameter occurs anywhere inside.
    pub fn mentions_placeholder(&self) -> bool {
        match self {
            TypeDesc::Placeholder { .. } | TypeDesc::InterfaceMarker { .. } => true,
            TypeDesc::Pointer(inner) => inner.mentions_placeholder(),
            TypeDesc::Alias { target, .. } => target.mentions_placeholder(),
            _ => false,
        }
    }

    /// Size in bytes used to pick the wider operand of an arithmetic operator.
    pub fn size_bytes(&self) -> u64 {
        match self {
            TypeDesc::Builtin { prim, .. } => prim.size_bytes(),
            TypeDesc::Pointer(_) => 8,
            TypeDesc::Alias { target, .. } => target.size_bytes(),
            TypeDesc::Class { .. } | TypeDesc::Placeholder { .. } | TypeDesc::InterfaceMarker { .. } => 0,
        }
    }

    /// Structural equality of two canonical descriptors.
    ///
    /// Builtins compare by representation (`int` and `i32` are the same type),
    /// classes by name and pointers by pointee.
    pub fn same_as(&self, other: &TypeDesc) -> bool {
        match (self, other) {
            (TypeDesc::Builtin { prim: a, .. }, TypeDesc::Builtin { prim: b, .. }) => a.same_repr(*b),
            (TypeDesc::Pointer(a), TypeDesc::Pointer(b)) => a.same_as(b),
            (TypeDesc::Class { name: a }, TypeDesc::Class { name: b }) => a == b,
            (TypeDesc::Placeholder { marker: a, .. }, TypeDesc::Placeholder { marker: b, .. })
            | (TypeDesc::InterfaceMarker { marker: a, .. }, TypeDesc::InterfaceMarker { marker: b, .. }) => {
                a == b
            }
            _ => false,
        }
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDesc::Pointer(inner) => write!(f, "{inner}*"),
            TypeDesc::Builtin { name, .. }
            | TypeDesc::Class { name }
            | TypeDesc::Alias { name, .. }
            | TypeDesc::Placeholder { name, .. }
            | TypeDesc::InterfaceMarker { name, .. } => write!(f, "{name}"),
        }
    }
}

/// Wrap `ty` in one level of pointer.
pub fn pointer_of(ty: TypeDesc) -> TypeDesc {
    TypeDesc::Pointer(Box::new(ty))
}

/// Implicit conversions accepted when matching arguments against parameters:
/// identical types, integer to integer, pointer to pointer and float to or
/// from integer. Class conversions need the class registry and are checked there.
pub fn is_castable(from: &TypeDesc, to: &TypeDesc) -> bool {
    if from.same_as(to) {
        return true;
    }
    match (from, to) {
        (TypeDesc::Pointer(_), TypeDesc::Pointer(_)) => true,
        (TypeDesc::Builtin { prim: a, .. }, TypeDesc::Builtin { prim: b, .. }) => {
            (a.is_integer() || a.is_float()) && (b.is_integer() || b.is_float())
        }
        _ => false,
    }
}

/// Order-significant registry of named types.
///
/// Lookups scan from the most recent entry backward, so a later registration
/// shadows an earlier one with the same name.
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    entries: Vec<TypeDesc>,
    next_marker: u32,
}

/// Builtin names in registration order.
pub const BUILTINS: [(&str, Prim); 13] = [
    ("int", Prim::I32),
    ("char", Prim::I8),
    ("i64", Prim::I64),
    ("i32", Prim::I32),
    ("i16", Prim::I16),
    ("i8", Prim::I8),
    ("u64", Prim::U64),
    ("u32", Prim::U32),
    ("u16", Prim::U16),
    ("u8", Prim::U8),
    ("void", Prim::Void),
    ("bool", Prim::Bool),
    ("float", Prim::F32),
];

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        for (name, prim) in BUILTINS {
            table.register(TypeDesc::builtin(name, prim));
        }
        table
    }

    pub fn register(&mut self, ty: TypeDesc) {
        self.entries.push(ty);
    }

    pub fn lookup(&self, name: &str) -> Option<&TypeDesc> {
        self.entries.iter().rev().find(|t| t.name() == Some(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn resolve_by_name(&self, name: &str) -> SemanticResult<TypeDesc> {
        self.lookup(name)
            .cloned()
            .ok_or_else(|| SemanticError::UnknownType(name.to_string()))
    }

    /// Entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeDesc> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn fresh_marker(&mut self) -> Marker {
        self.next_marker += 1;
        Marker(self.next_marker)
    }

    /// Retire every transient entry tagged with `marker`. Returns how many went.
    pub fn remove_marker(&mut self, marker: Marker) -> usize {
        let before = self.entries.len();
        self.entries.retain(|t| t.marker() != Some(marker));
        before - self.entries.len()
    }

    /// Resolve aliases and bound placeholders down to the concrete type.
    ///
    /// A placeholder resolves through the most recent alias registered under
    /// its name; with no such alias in scope it stays as it is.
    pub fn canonicalize(&self, ty: &TypeDesc) -> TypeDesc {
        match ty {
            TypeDesc::Alias { target, .. } => self.canonicalize(target),
            TypeDesc::Pointer(inner) => pointer_of(self.canonicalize(inner)),
            TypeDesc::Placeholder { name, .. } => {
                let bound = self
                    .entries
                    .iter()
                    .rev()
                    .find(|t| matches!(t, TypeDesc::Alias { name: n, .. } if n == name));
                match bound {
                    Some(alias) => self.canonicalize(alias),
                    None => ty.clone(),
                }
            }
            _ => ty.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn int() -> TypeDesc {
        TypeDesc::builtin("int", Prim::I32)
    }

    #[test]
    fn test_builtins_resolve() {
        let table = TypeTable::with_builtins();
        assert_eq!(table.resolve_by_name("int").unwrap(), int());
        assert_eq!(table.resolve_by_name("float").unwrap().prim(), Some(Prim::F32));
        assert_eq!(
            table.resolve_by_name("Nope"),
            Err(SemanticError::UnknownType("Nope".into()))
        );
    }

    #[test]
    fn test_later_registration_shadows() {
        let mut table = TypeTable::with_builtins();
        let marker = table.fresh_marker();
        table.register(TypeDesc::Alias {
            name: "int".into(),
            target: Box::new(TypeDesc::builtin("i64", Prim::I64)),
            marker,
        });
        assert!(matches!(table.resolve_by_name("int").unwrap(), TypeDesc::Alias { .. }));
        assert_eq!(table.remove_marker(marker), 1);
        assert_eq!(table.resolve_by_name("int").unwrap(), int());
    }

    #[test]
    fn test_remove_marker_leaves_same_named_entries() {
        let mut table = TypeTable::new();
        let outer = table.fresh_marker();
        let inner = table.fresh_marker();
        for (marker, prim) in [(outer, Prim::I8), (inner, Prim::I64)] {
            table.register(TypeDesc::Alias {
                name: "T".into(),
                target: Box::new(TypeDesc::builtin("x", prim)),
                marker,
            });
        }
        table.remove_marker(inner);
        let t = table.resolve_by_name("T").unwrap();
        assert_eq!(table.canonicalize(&t).prim(), Some(Prim::I8));
    }

    #[test]
    fn test_canonicalize_placeholder_through_alias() {
        let mut table = TypeTable::with_builtins();
        let marker = table.fresh_marker();
        let placeholder = TypeDesc::Placeholder {
            name: "T".into(),
            constraint: None,
            marker,
        };
        assert_eq!(table.canonicalize(&placeholder), placeholder);

        let bind = table.fresh_marker();
        table.register(TypeDesc::Alias {
            name: "T".into(),
            target: Box::new(int()),
            marker: bind,
        });
        let ptr = pointer_of(placeholder.clone());
        assert_eq!(table.canonicalize(&ptr), pointer_of(int()));
    }

    #[test]
    fn test_canonicalize_is_idempotent() {
        let mut table = TypeTable::with_builtins();
        let marker = table.fresh_marker();
        table.register(TypeDesc::Alias {
            name: "T".into(),
            target: Box::new(pointer_of(int())),
            marker,
        });
        let samples = vec![
            int(),
            pointer_of(pointer_of(int())),
            TypeDesc::class("Box"),
            table.resolve_by_name("T").unwrap(),
            pointer_of(table.resolve_by_name("T").unwrap()),
            TypeDesc::Placeholder {
                name: "U".into(),
                constraint: Some("Show".into()),
                marker,
            },
        ];
        for t in samples {
            let once = table.canonicalize(&t);
            assert_eq!(table.canonicalize(&once), once);
            if let TypeDesc::Pointer(inner) = &t {
                assert_eq!(once, pointer_of(table.canonicalize(inner)));
            }
        }
    }

    #[test]
    fn test_same_as_compares_representation() {
        let table = TypeTable::with_builtins();
        let get = |n: &str| table.resolve_by_name(n).unwrap();
        assert!(get("int").same_as(&get("i32")));
        assert!(get("char").same_as(&get("u8")));
        assert!(!get("int").same_as(&get("float")));
        assert!(!get("int").same_as(&get("i64")));
        assert!(pointer_of(get("int")).same_as(&pointer_of(get("u32"))));
        assert!(!TypeDesc::class("A").same_as(&TypeDesc::class("B")));
    }

    #[test]
    fn test_numeric_cast_symmetry() {
        let table = TypeTable::with_builtins();
        let numeric: Vec<TypeDesc> = table
            .iter()
            .filter(|t| t.is_numeric())
            .cloned()
            .collect();
        for a in &numeric {
            for b in &numeric {
                assert!(is_castable(a, b), "{a} -> {b}");
                assert!(is_castable(b, a), "{b} -> {a}");
            }
        }
        assert!(!is_castable(&int(), &TypeDesc::builtin("void", Prim::Void)));
        assert!(is_castable(&pointer_of(int()), &pointer_of(TypeDesc::class("A"))));
        assert!(!is_castable(&int(), &pointer_of(int())));
    }
}
