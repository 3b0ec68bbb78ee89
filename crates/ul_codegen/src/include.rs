//! `@include` resolution.

use std::fs;
use std::path::PathBuf;

use ul_analysis::SemanticError;
use ul_frontend::ast::Include;

use crate::CodeGenerator;
use crate::error::{At, CgResult};

impl<'ctx> CodeGenerator<'ctx> {
    /// File an include path refers to: `std::a::b` lives under the standard
    /// library directory, anything else under the include root.
    pub fn include_path(&self, segments: &[String]) -> PathBuf {
        let (mut path, rest) = match segments.split_first() {
            Some((first, rest)) if first == "std" => (self.options.std_dir.clone(), rest),
            _ => (self.options.include_root.clone(), segments),
        };
        path.extend(rest);
        path.set_extension("ul");
        path
    }

    /// Pull in the declarations of an included file, at most once per
    /// resolved path. Functions become external declarations and classes are
    /// registered without bodies.
    pub(crate) fn process_include(&mut self, include: &Include) -> CgResult<()> {
        let shown = include.path.join("::");
        let failure = |reason: String| SemanticError::IncludeFailure {
            path: shown.clone(),
            reason,
        };
        if include.path.is_empty() {
            return Err(failure("empty include path".into())).at(&include.location);
        }

        let path = self.include_path(&include.path);
        let canonical = fs::canonicalize(&path)
            .map_err(|e| failure(format!("{}: {e}", path.display())))
            .at(&include.location)?;
        if !self.included.insert(canonical.clone()) {
            tracing::debug!(path = %canonical.display(), "already included");
            return Ok(());
        }
        tracing::debug!(path = %canonical.display(), "including");

        let source = fs::read_to_string(&canonical)
            .map_err(|e| failure(e.to_string()))
            .at(&include.location)?;
        let program = ul_frontend::parse_source(canonical.display().to_string(), &source)
            .map_err(|e| failure(e.to_string()))
            .at(&include.location)?;

        for decl in &program.decls {
            self.compile_decl(decl, true)
                .map_err(|e| e.or_at(decl.location()))?;
        }
        Ok(())
    }
}
