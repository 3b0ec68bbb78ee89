use std::ffi::OsString;
use std::path::{Path, PathBuf};

use inkwell::OptimizationLevel;
use inkwell::module::Module;
use inkwell::passes::PassBuilderOptions;
use inkwell::targets::{
    CodeModel, FileType, InitializationConfig, RelocMode, Target, TargetMachine,
};

use super::CompileError;

/// Target machine for the host.
pub(crate) fn target_machine(opt_level: OptimizationLevel) -> Result<TargetMachine, CompileError> {
    Target::initialize_native(&InitializationConfig::default()).map_err(CompileError::Target)?;

    let target_triple = TargetMachine::get_default_triple();
    let target =
        Target::from_triple(&target_triple).map_err(|e| CompileError::Target(e.to_string()))?;

    let cpu = TargetMachine::get_host_cpu_name();
    let features = TargetMachine::get_host_cpu_features();

    target
        .create_target_machine(
            &target_triple,
            cpu.to_str().unwrap_or("generic"),
            features.to_str().unwrap_or(""),
            opt_level,
            RelocMode::PIC,
            CodeModel::Default,
        )
        .ok_or_else(|| CompileError::Target("failed to create target machine".into()))
}

/// Run the standard pass pipeline for `opt_level` over the module.
pub(crate) fn optimize(
    module: &Module<'_>,
    machine: &TargetMachine,
    opt_level: OptimizationLevel,
) -> Result<(), CompileError> {
    let passes = match opt_level {
        OptimizationLevel::None => return Ok(()),
        OptimizationLevel::Less => "default<O1>",
        OptimizationLevel::Default => "default<O2>",
        OptimizationLevel::Aggressive => "default<O3>",
    };
    tracing::info!(passes, "optimizing");
    module
        .run_passes(passes, machine, PassBuilderOptions::create())
        .map_err(|e| CompileError::Target(e.to_string()))
}

pub(crate) fn write_machine_file(
    machine: &TargetMachine,
    module: &Module<'_>,
    file_type: FileType,
    path: &Path,
) -> Result<(), CompileError> {
    machine
        .write_to_file(module, file_type, path)
        .map_err(|e| CompileError::Target(e.to_string()))
}

/// Emit the module to an object file next to `output` and link it into an
/// executable at `output`.
pub(crate) fn emit_and_link(
    module: &Module<'_>,
    machine: &TargetMachine,
    output: &Path,
) -> Result<(), CompileError> {
    let obj_path = object_path(output);
    tracing::info!(object = %obj_path.display(), "writing object file");
    write_machine_file(machine, module, FileType::Object, &obj_path)?;

    let linked = crate::linker::link(&obj_path, output);

    // Clean up the intermediate object file
    let _ = std::fs::remove_file(&obj_path);
    linked
}

fn object_path(output: &Path) -> PathBuf {
    let mut name = OsString::from(output.as_os_str());
    name.push(".o");
    PathBuf::from(name)
}
