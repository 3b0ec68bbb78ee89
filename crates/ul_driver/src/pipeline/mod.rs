mod compile;
mod emit;

pub use compile::{CompileError, CompileOptions, compile_file, compile_to_ir};
pub(crate) use emit::*;
