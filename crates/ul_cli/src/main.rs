use std::path::{Path, PathBuf};
use std::process::{self, Command};

use clap::Parser;
use inkwell::OptimizationLevel;
use ul_driver::{CompileOptions, GeneratorOptions, compile_file};

#[derive(Parser, Debug)]
#[command(name = "unilang", about = "Unilang to native compiler")]
struct Cli {
    /// Input `.ul` file to compile.
    input: PathBuf,

    /// Output file path.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Optimization level (0-3).
    #[arg(short = 'O', long = "opt-level", default_value = "0")]
    opt_level: u8,

    /// Emit LLVM IR text instead of a binary.
    #[arg(long)]
    emit_ir: bool,

    /// Emit target assembly instead of a binary.
    #[arg(short = 'S')]
    emit_asm: bool,

    /// Standard library directory for `@include std::...`
    /// (defaults to $UNILANG_STD, then ~/Documents/Unilang/stdlib).
    #[arg(long)]
    std_dir: Option<PathBuf>,

    /// Check interface constraints when instantiating generic classes.
    #[arg(long)]
    strict_interfaces: bool,

    /// Report every failing declaration instead of stopping at the first.
    #[arg(long)]
    keep_going: bool,

    /// Compile and run immediately (binary is cleaned up after).
    #[arg(short, long)]
    run: bool,

    /// Log compiler stages and declarations to stderr.
    #[arg(short, long)]
    verbose: bool,
}

/// Log filter from `UNILANG_LOG`, defaulting to warnings (`debug` with `-v`).
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("UNILANG_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

/// Print one `error:` line per reported failure and exit with status 1.
fn fail(message: impl std::fmt::Display) -> ! {
    for line in message.to_string().lines() {
        eprintln!("error: {line}");
    }
    process::exit(1);
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let opt_level = match cli.opt_level {
        0 => OptimizationLevel::None,
        1 => OptimizationLevel::Less,
        2 => OptimizationLevel::Default,
        _ => OptimizationLevel::Aggressive,
    };

    // Determine output path: explicit -o, or temp file for --run, or build/<name>
    let stem = cli
        .input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "out".to_string());
    let extension = if cli.emit_ir {
        ".ll"
    } else if cli.emit_asm {
        ".s"
    } else {
        ""
    };

    let output = if let Some(ref o) = cli.output {
        o.clone()
    } else if cli.run {
        std::env::temp_dir().join(format!("unilang_run_{stem}_{}", process::id()))
    } else {
        let build_dir = Path::new("build");
        if !build_dir.exists() {
            std::fs::create_dir_all(build_dir)
                .unwrap_or_else(|e| fail(format!("cannot create build directory: {e}")));
        }
        build_dir.join(format!("{stem}{extension}"))
    };

    let mut generator = GeneratorOptions {
        strict_interfaces: cli.strict_interfaces,
        keep_going: cli.keep_going,
        ..GeneratorOptions::default()
    };
    if let Some(dir) = cli.std_dir {
        generator.std_dir = dir;
    }

    let options = CompileOptions {
        opt_level,
        emit_ir: cli.emit_ir,
        emit_asm: cli.emit_asm,
        output: output.clone(),
        generator,
    };

    if !cli.input.exists() {
        fail(format!("file not found: {}", cli.input.display()));
    }

    if let Err(e) = compile_file(&cli.input, &options) {
        fail(e);
    }

    if options.emit_ir || options.emit_asm {
        eprintln!("written to {}", output.display());
    } else if cli.run {
        // Execute the compiled binary and forward its exit code
        let status = Command::new(&output)
            .status()
            .unwrap_or_else(|e| fail(format!("failed to run {}: {e}", output.display())));

        // Clean up temp binary unless user specified -o
        if cli.output.is_none() {
            let _ = std::fs::remove_file(&output);
        }

        process::exit(status.code().unwrap_or(1));
    } else {
        eprintln!("compiled to {}", output.display());
    }
}
