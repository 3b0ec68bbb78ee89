use std::path::Path;
use std::process::Command;

use crate::pipeline::CompileError;

/// Link an object file into a native binary using the system C compiler.
///
/// `cc` pulls in libc, which provides `malloc`, `free` and `syscall`.
pub fn link(object_path: &Path, output_path: &Path) -> Result<(), CompileError> {
    tracing::info!(output = %output_path.display(), "linking");
    let status = Command::new("cc")
        .arg(object_path)
        .arg("-o")
        .arg(output_path)
        .status()
        .map_err(|e| CompileError::Link(format!("failed to invoke linker: {e}")))?;

    if !status.success() {
        return Err(CompileError::Link(format!(
            "linker exited with status: {status}"
        )));
    }

    Ok(())
}
