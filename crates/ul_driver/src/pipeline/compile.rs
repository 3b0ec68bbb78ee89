use std::path::{Path, PathBuf};

use inkwell::OptimizationLevel;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::targets::FileType;
use thiserror::Error;

use ul_codegen::{CodeGenerator, CodegenError, GeneratorOptions};
use ul_frontend::ParseError;

use super::{emit_and_link, optimize, target_machine, write_machine_file};

/// Compilation options.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Optimization level for LLVM passes.
    pub opt_level: OptimizationLevel,
    /// Write LLVM IR text instead of object code.
    pub emit_ir: bool,
    /// Write target assembly instead of object code.
    pub emit_asm: bool,
    /// Output file path.
    pub output: PathBuf,
    pub generator: GeneratorOptions,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            opt_level: OptimizationLevel::Default,
            emit_ir: false,
            emit_asm: false,
            output: PathBuf::from("a.out"),
            generator: GeneratorOptions::default(),
        }
    }
}

/// Errors that can occur during compilation.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(ParseError),

    #[error(transparent)]
    Codegen(CodegenError),

    #[error("module verification failed: {0}")]
    Verify(String),

    #[error("target error: {0}")]
    Target(String),

    #[error("link error: {0}")]
    Link(String),
}

impl From<CodegenError> for CompileError {
    fn from(error: CodegenError) -> Self {
        match error {
            CodegenError::Parse(e) => CompileError::Parse(e),
            other => CompileError::Codegen(other),
        }
    }
}

/// Compile a Unilang source file.
///
/// Stages:
/// 1. Read the source
/// 2. Parse and generate code (includes are pulled in on the way)
/// 3. Verify the module
/// 4. Optimize, then write IR, assembly or an object file
/// 5. Link the object file into an executable
///
/// Nothing is written when an earlier stage fails.
pub fn compile_file(path: &Path, options: &CompileOptions) -> Result<(), CompileError> {
    let source = std::fs::read_to_string(path).map_err(|source| CompileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file = path.display().to_string();

    if options.emit_ir {
        let ir = compile_to_ir(&file, &source, options)?;
        return write_output(&options.output, ir);
    }

    let context = Context::create();
    let module = generate(&context, &file, &source, options)?;
    let machine = target_machine(options.opt_level)?;
    optimize(&module, &machine, options.opt_level)?;

    if options.emit_asm {
        tracing::info!(output = %options.output.display(), "writing assembly");
        return write_machine_file(&machine, &module, FileType::Assembly, &options.output);
    }
    emit_and_link(&module, &machine, &options.output)
}

/// Compile `source` (reported as `file`) to verified, optionally optimized,
/// LLVM IR text.
pub fn compile_to_ir(file: &str, source: &str, options: &CompileOptions) -> Result<String, CompileError> {
    let context = Context::create();
    let module = generate(&context, file, source, options)?;
    if options.opt_level != OptimizationLevel::None {
        let machine = target_machine(options.opt_level)?;
        optimize(&module, &machine, options.opt_level)?;
    }
    Ok(module.print_to_string().to_string())
}

fn generate<'ctx>(
    context: &'ctx Context,
    file: &str,
    source: &str,
    options: &CompileOptions,
) -> Result<Module<'ctx>, CompileError> {
    let module_name = Path::new(file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "main".to_string());

    tracing::info!(file, "generating code");
    let mut generator = CodeGenerator::new(context, &module_name, options.generator.clone())?;
    generator.compile_source(file, source)?;
    let module = generator.into_module();

    module
        .verify()
        .map_err(|e| CompileError::Verify(e.to_string()))?;
    Ok(module)
}

fn write_output(path: &Path, contents: String) -> Result<(), CompileError> {
    tracing::info!(output = %path.display(), "writing IR");
    std::fs::write(path, contents).map_err(|source| CompileError::Io {
        path: path.to_path_buf(),
        source,
    })
}
