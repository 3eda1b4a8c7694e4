// src/loader/mod.rs
//! Class loading
//!
//! A compiled [`Artifact`] lists the classes each source file produced.
//! A [`Loader`] turns a class name into a [`LoadedClass`] whose methods
//! can be invoked; the [`EntryPointResolver`] picks the one method that
//! starts the program.
//!
//! Two loaders ship with the crate:
//!
//! - [`RegistryLoader`]: classes registered in-process, used by embedders
//!   that compile to Rust closures and by tests
//! - [`DylibLoader`]: classes exported from a shared library built by the
//!   compiler

pub mod dylib;
pub mod registry;
pub mod resolver;

pub use dylib::{DylibLoader, HostApi};
pub use registry::{ClassDefinition, RegistryLoader};
pub use resolver::{EntryPoint, EntryPointResolver};

use crate::runtime::context::ProgramContext;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Classes produced by one source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledUnit {
    pub source_name: String,
    pub class_names: Vec<String>,
}

impl CompiledUnit {
    pub fn new(source_name: impl Into<String>, class_names: Vec<String>) -> Self {
        Self {
            source_name: source_name.into(),
            class_names,
        }
    }
}

/// Compiler output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifact {
    pub id: String,
    pub units: Vec<CompiledUnit>,
    /// Shared library holding the compiled code, when there is one
    pub library_path: Option<PathBuf>,
}

impl Artifact {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_unit(mut self, unit: CompiledUnit) -> Self {
        self.units.push(unit);
        self
    }

    pub fn with_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

/// Parameter and return types a loader can describe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDescriptor {
    Void,
    Int,
    Bool,
    String,
    StringArray,
    Object(String),
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Void => write!(f, "void"),
            TypeDescriptor::Int => write!(f, "int"),
            TypeDescriptor::Bool => write!(f, "boolean"),
            TypeDescriptor::String => write!(f, "String"),
            TypeDescriptor::StringArray => write!(f, "String[]"),
            TypeDescriptor::Object(name) => write!(f, "{}", name),
        }
    }
}

/// Method signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub name: String,
    pub visibility: Visibility,
    pub is_static: bool,
    pub return_type: TypeDescriptor,
    pub parameters: Vec<TypeDescriptor>,
}

impl MethodDescriptor {
    /// Well-formed entry point signature: `public static void name(String[])`
    pub fn entry(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visibility: Visibility::Public,
            is_static: true,
            return_type: TypeDescriptor::Void,
            parameters: vec![TypeDescriptor::StringArray],
        }
    }

    pub fn is_valid_entry(&self) -> bool {
        self.visibility == Visibility::Public
            && self.is_static
            && self.return_type == TypeDescriptor::Void
            && self.parameters == [TypeDescriptor::StringArray]
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let visibility = match self.visibility {
            Visibility::Public => "public ",
            Visibility::Private => "private ",
        };
        let modifier = if self.is_static { "static " } else { "" };
        let params: Vec<String> = self.parameters.iter().map(|p| p.to_string()).collect();
        write!(
            f,
            "{}{}{} {}({})",
            visibility,
            modifier,
            self.return_type,
            self.name,
            params.join(", ")
        )
    }
}

/// Runs a loaded method on the hosted program's thread
pub trait EntryInvoker: Send + Sync {
    fn invoke(&self, ctx: &mut ProgramContext, args: &[String]) -> anyhow::Result<()>;
}

impl<F> EntryInvoker for F
where
    F: Fn(&mut ProgramContext, &[String]) -> anyhow::Result<()> + Send + Sync,
{
    fn invoke(&self, ctx: &mut ProgramContext, args: &[String]) -> anyhow::Result<()> {
        self(ctx, args)
    }
}

#[derive(Clone)]
pub struct LoadedMethod {
    pub descriptor: MethodDescriptor,
    pub invoker: Arc<dyn EntryInvoker>,
}

impl fmt::Debug for LoadedMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedMethod")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct LoadedClass {
    pub name: String,
    pub methods: Vec<LoadedMethod>,
}

impl LoadedClass {
    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a LoadedMethod> + 'a {
        self.methods.iter().filter(move |m| m.descriptor.name == name)
    }
}

/// Why a class could not be loaded
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LinkageFailure {
    #[error("class not found: {0}")]
    ClassNotFound(String),

    #[error("class {class} depends on missing {missing}")]
    MissingDependency { class: String, missing: String },

    #[error("failed to load class: {0}")]
    LoadFailed(String),
}

/// Class loader collaborator
pub trait Loader: Send + Sync {
    fn load(&self, artifact: &Artifact, class_name: &str) -> Result<LoadedClass, LinkageFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_descriptor_is_valid() {
        let entry = MethodDescriptor::entry("main");
        assert!(entry.is_valid_entry());
        assert_eq!(entry.to_string(), "public static void main(String[])");
    }

    #[test]
    fn test_invalid_entry_descriptors() {
        let mut instance = MethodDescriptor::entry("main");
        instance.is_static = false;
        assert!(!instance.is_valid_entry());

        let mut returns_int = MethodDescriptor::entry("main");
        returns_int.return_type = TypeDescriptor::Int;
        assert!(!returns_int.is_valid_entry());

        let mut no_args = MethodDescriptor::entry("main");
        no_args.parameters.clear();
        assert!(!no_args.is_valid_entry());

        let mut private = MethodDescriptor::entry("main");
        private.visibility = Visibility::Private;
        assert!(!private.is_valid_entry());
    }
}
