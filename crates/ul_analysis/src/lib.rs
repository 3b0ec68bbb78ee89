//! Backend-independent bookkeeping for the Unilang code generator: the type
//! table, the named-value stack, the defer ledger and the class/interface
//! registry. Storage handles are generic so each table can be exercised
//! without an LLVM context.

pub mod classes;
pub mod defer;
pub mod error;
pub mod symbols;
pub mod types;

pub use classes::{
    ClassRecord, ClassRegistry, ConstructorRecord, GenericParam, Instantiation, InstantiationRecord,
    InterfaceRecord, MemberRecord, MethodRecord, ParamDesc, Signature,
};
pub use defer::{DeferEntry, DeferLedger};
pub use error::{SemanticError, SemanticResult};
pub use symbols::{NamedValue, SymbolTable, Watermark};
pub use types::{Marker, Prim, TypeDesc, TypeTable, is_castable, pointer_of};
