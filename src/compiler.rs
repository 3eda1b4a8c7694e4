// src/compiler.rs
//! Program sources and the compiler collaborator
//!
//! The compiler turns source text into an [`Artifact`] the loader can
//! open. This crate does not interpret diagnostics; it forwards them to the
//! client as a user-initiated `COMPILER_ERROR`.

use crate::exception::{ExceptionKey, ExceptionRecord};
use crate::loader::Artifact;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// One file of the student's project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSource {
    pub name: String,
    pub contents: String,
}

impl ProgramSource {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }

    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.name).extension().and_then(|ext| ext.to_str())
    }

    /// File name without extension
    pub fn stem(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&self.name)
    }

    /// Whether this file is routed to the compiler
    pub fn is_code(&self, code_extension: &str) -> bool {
        self.extension()
            .map(|ext| ext.eq_ignore_ascii_case(code_extension))
            .unwrap_or(false)
    }
}

/// One compiler message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub file: String,
    pub line: Option<u32>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}: {}", self.file, line, self.message),
            None => write!(f, "{}: {}", self.file, self.message),
        }
    }
}

/// Compiler messages for a failed build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub entries: Vec<Diagnostic>,
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", entry)?;
        }
        Ok(())
    }
}

/// Compilation failure
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("compilation failed with {} diagnostic(s)", .0.entries.len())]
    Diagnostics(Diagnostics),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<CompileError> for ExceptionRecord {
    fn from(err: CompileError) -> Self {
        match err {
            CompileError::Diagnostics(diagnostics) => {
                ExceptionRecord::user(ExceptionKey::CompilerError).with_cause(diagnostics.to_string())
            }
            CompileError::Internal(cause) => {
                ExceptionRecord::internal(ExceptionKey::InternalCompilerException).with_cause(cause)
            }
        }
    }
}

/// Compiler collaborator
pub trait Compiler: Send + Sync {
    fn compile(&self, sources: &[ProgramSource]) -> Result<Artifact, CompileError>;
}
