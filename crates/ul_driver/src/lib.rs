//! Unilang driver: runs a `.ul` file through parsing, code generation,
//! verification and native emission.

pub mod linker;
pub mod pipeline;

pub use pipeline::{CompileError, CompileOptions, compile_file, compile_to_ir};
pub use ul_codegen::GeneratorOptions;
