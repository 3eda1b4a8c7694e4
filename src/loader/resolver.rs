// src/loader/resolver.rs
//! Entry-point discovery
//!
//! Exactly one method named after the entry symbol may exist across the
//! whole artifact. Zero is "not runnable", two or more is an error even if
//! only one of them has a valid signature.

use crate::exception::{ErrorKind, ExceptionKey, ExceptionRecord};
use crate::loader::{Artifact, EntryInvoker, LinkageFailure, Loader, MethodDescriptor};
use crate::protocol::message::DetailKey;
use crate::runtime::context::ProgramContext;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// The single runnable method of a program
#[derive(Clone)]
pub struct EntryPoint {
    pub class_name: String,
    pub descriptor: MethodDescriptor,
    invoker: Arc<dyn EntryInvoker>,
}

impl EntryPoint {
    /// Run the program on the calling thread
    ///
    /// Errors the program raises without a key, and panics, are reported
    /// as `RUNTIME_ERROR` with the program's own message as cause.
    pub fn invoke(&self, ctx: &mut ProgramContext, args: &[String]) -> anyhow::Result<()> {
        match catch_unwind(AssertUnwindSafe(|| self.invoker.invoke(ctx, args))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(as_program_failure(err)),
            Err(payload) => Err(ExceptionRecord::user(ExceptionKey::RuntimeError)
                .with_cause(panic_message(payload.as_ref()))
                .into()),
        }
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPoint")
            .field("class_name", &self.class_name)
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Host kinds only pass through when a host service raised them
fn as_program_failure(err: anyhow::Error) -> anyhow::Error {
    match err.downcast::<ExceptionRecord>() {
        Ok(record) if record.kind() == ErrorKind::UserInitiated || record.is_host_raised() => record.into(),
        Ok(record) => {
            warn!(
                kind = %record.kind(),
                key = %record.key(),
                "program raised a host failure kind; reporting it as a runtime error"
            );
            ExceptionRecord::user(ExceptionKey::RuntimeError)
                .with_cause(record)
                .into()
        }
        Err(err) => ExceptionRecord::user(ExceptionKey::RuntimeError)
            .with_cause(err)
            .into(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "program panicked".to_string()
    }
}

/// Internal class names use `/` between packages
fn normalize_class_name(name: &str) -> String {
    name.replace('/', ".")
}

/// Finds the entry point of a compiled artifact
pub struct EntryPointResolver {
    loader: Arc<dyn Loader>,
    entry_symbol: String,
}

impl EntryPointResolver {
    pub fn new(loader: Arc<dyn Loader>, entry_symbol: impl Into<String>) -> Self {
        Self {
            loader,
            entry_symbol: entry_symbol.into(),
        }
    }

    pub fn resolve(&self, artifact: &Artifact) -> Result<EntryPoint, ExceptionRecord> {
        let mut candidates = Vec::new();
        let mut not_found: Option<String> = None;

        for unit in &artifact.units {
            let fallback;
            let class_names: &[String] = if unit.class_names.is_empty() {
                // A file that declared nothing usable; try the name it implies
                fallback = [source_stem(&unit.source_name)];
                &fallback
            } else {
                &unit.class_names
            };

            for class_name in class_names {
                let class = match self.loader.load(artifact, class_name) {
                    Ok(class) => class,
                    Err(LinkageFailure::ClassNotFound(name)) => {
                        debug!(class = %name, source = %unit.source_name, "class not loadable");
                        not_found.get_or_insert(name);
                        continue;
                    }
                    Err(LinkageFailure::MissingDependency { class, missing }) => {
                        let missing = normalize_class_name(&missing);
                        warn!(class = %class, missing = %missing, "class has an unresolved dependency");
                        return Err(ExceptionRecord::user(ExceptionKey::InvalidClass)
                            .with_fallback(format!("Class {} could not be found", missing))
                            .with_detail(DetailKey::ClassName, missing));
                    }
                    Err(LinkageFailure::LoadFailed(reason)) => {
                        warn!(class = %class_name, reason = %reason, "class failed to load");
                        return Err(ExceptionRecord::user(ExceptionKey::InvalidClass)
                            .with_detail(DetailKey::ClassName, normalize_class_name(class_name)));
                    }
                };

                for method in class.methods_named(&self.entry_symbol) {
                    candidates.push(EntryPoint {
                        class_name: normalize_class_name(&class.name),
                        descriptor: method.descriptor.clone(),
                        invoker: Arc::clone(&method.invoker),
                    });
                }
            }
        }

        match candidates.len() {
            0 => Err(match not_found {
                Some(name) => ExceptionRecord::user(ExceptionKey::ClassNotFound)
                    .with_detail(DetailKey::ClassName, normalize_class_name(&name)),
                None => ExceptionRecord::user(ExceptionKey::NoEntryPoint),
            }),
            1 => {
                let entry = candidates.remove(0);
                if !entry.descriptor.is_valid_entry() {
                    return Err(ExceptionRecord::user(ExceptionKey::InvalidEntryPointSignature)
                        .with_fallback(format!(
                            "Found {}, expected public static void {}(String[] args)",
                            entry.descriptor, self.entry_symbol
                        ))
                        .with_detail(DetailKey::ClassName, entry.class_name.clone()));
                }
                debug!(class = %entry.class_name, "entry point resolved");
                Ok(entry)
            }
            _ => {
                let classes: Vec<&str> = candidates.iter().map(|c| c.class_name.as_str()).collect();
                Err(ExceptionRecord::user(ExceptionKey::TwoEntryPoints)
                    .with_fallback(format!("Entry points found in: {}", classes.join(", "))))
            }
        }
    }
}

fn source_stem(source_name: &str) -> String {
    Path::new(source_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(source_name)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{ClassDefinition, CompiledUnit, RegistryLoader, TypeDescriptor};

    fn noop(_ctx: &mut ProgramContext, _args: &[String]) -> anyhow::Result<()> {
        Ok(())
    }

    fn artifact(units: &[(&str, &[&str])]) -> Artifact {
        units.iter().fold(Artifact::new("a1"), |artifact, (source, classes)| {
            artifact.with_unit(CompiledUnit::new(
                *source,
                classes.iter().map(|c| c.to_string()).collect(),
            ))
        })
    }

    fn resolve(loader: RegistryLoader, artifact: &Artifact) -> Result<EntryPoint, ExceptionRecord> {
        EntryPointResolver::new(Arc::new(loader), "main").resolve(artifact)
    }

    #[test]
    fn test_single_valid_entry() {
        let loader = RegistryLoader::new()
            .with_class(ClassDefinition::new("Main").with_entry("main", noop))
            .with_class(ClassDefinition::new("Helper"));

        let entry = resolve(loader, &artifact(&[("Main.java", &["Main"]), ("Helper.java", &["Helper"])])).unwrap();
        assert_eq!(entry.class_name, "Main");
    }

    #[test]
    fn test_two_entries_across_files() {
        let loader = RegistryLoader::new()
            .with_class(ClassDefinition::new("A").with_entry("main", noop))
            .with_class(ClassDefinition::new("B").with_entry("main", noop));

        let err = resolve(loader, &artifact(&[("A.java", &["A"]), ("B.java", &["B"])])).unwrap_err();
        assert_eq!(err.key(), ExceptionKey::TwoEntryPoints);
        assert_eq!(err.kind(), ErrorKind::UserInitiated);
    }

    #[test]
    fn test_two_entries_even_when_one_is_invalid() {
        let mut instance = MethodDescriptor::entry("main");
        instance.is_static = false;
        let loader = RegistryLoader::new()
            .with_class(ClassDefinition::new("A").with_entry("main", noop))
            .with_class(ClassDefinition::new("B").with_method(instance, noop));

        let err = resolve(loader, &artifact(&[("A.java", &["A"]), ("B.java", &["B"])])).unwrap_err();
        assert_eq!(err.key(), ExceptionKey::TwoEntryPoints);
    }

    #[test]
    fn test_wrong_signature() {
        let mut descriptor = MethodDescriptor::entry("main");
        descriptor.return_type = TypeDescriptor::Int;
        let loader = RegistryLoader::new().with_class(ClassDefinition::new("Main").with_method(descriptor, noop));

        let err = resolve(loader, &artifact(&[("Main.java", &["Main"])])).unwrap_err();
        assert_eq!(err.key(), ExceptionKey::InvalidEntryPointSignature);
        assert_eq!(err.kind(), ErrorKind::UserInitiated);
    }

    #[test]
    fn test_no_entry_point() {
        let loader = RegistryLoader::new().with_class(ClassDefinition::new("Helper"));
        let err = resolve(loader, &artifact(&[("Helper.java", &["Helper"])])).unwrap_err();
        assert_eq!(err.key(), ExceptionKey::NoEntryPoint);
    }

    #[test]
    fn test_empty_file_is_class_not_found() {
        let loader = RegistryLoader::new();
        let err = resolve(loader, &artifact(&[("Empty.java", &[])])).unwrap_err();
        assert_eq!(err.key(), ExceptionKey::ClassNotFound);
        assert_eq!(err.detail().get(&DetailKey::ClassName).map(String::as_str), Some("Empty"));
    }

    #[test]
    fn test_missing_dependency_is_invalid_class() {
        let loader = RegistryLoader::new().with_class(
            ClassDefinition::new("Main")
                .with_entry("main", noop)
                .depends_on("acm/graphics/GOval"),
        );

        let err = resolve(loader, &artifact(&[("Main.java", &["Main"])])).unwrap_err();
        assert_eq!(err.key(), ExceptionKey::InvalidClass);
        assert_eq!(err.kind(), ErrorKind::UserInitiated);
        assert_eq!(
            err.detail().get(&DetailKey::ClassName).map(String::as_str),
            Some("acm.graphics.GOval")
        );
        assert!(err.cause_message().is_none());
    }

    #[test]
    fn test_entry_in_unusable_file_alongside_valid_one() {
        let loader = RegistryLoader::new().with_class(ClassDefinition::new("Main").with_entry("main", noop));
        let entry = resolve(loader, &artifact(&[("Main.java", &["Main"]), ("Notes.java", &[])])).unwrap();
        assert_eq!(entry.class_name, "Main");
    }

    #[test]
    fn test_program_raised_host_kinds_are_runtime_errors() {
        let failure = as_program_failure(ExceptionRecord::fatal(ExceptionKey::LowDiskSpace).into());
        let record = failure.downcast::<ExceptionRecord>().unwrap();
        assert_eq!(record.kind(), ErrorKind::UserInitiated);
        assert_eq!(record.key(), ExceptionKey::RuntimeError);
        assert_eq!(record.exit_code(), None);

        let failure = as_program_failure(ExceptionRecord::internal(ExceptionKey::InternalException).into());
        assert_eq!(failure.downcast::<ExceptionRecord>().unwrap().key(), ExceptionKey::RuntimeError);
    }

    #[test]
    fn test_host_raised_and_user_records_pass_through() {
        let failure = as_program_failure(ExceptionRecord::fatal(ExceptionKey::LowDiskSpace).raised_by_host().into());
        let record = failure.downcast::<ExceptionRecord>().unwrap();
        assert_eq!(record.kind(), ErrorKind::Fatal);
        assert_eq!(record.exit_code(), Some(50));

        let failure = as_program_failure(ExceptionRecord::user(ExceptionKey::TooManyWrites).into());
        assert_eq!(failure.downcast::<ExceptionRecord>().unwrap().key(), ExceptionKey::TooManyWrites);

        let failure = as_program_failure(anyhow::anyhow!("index out of bounds"));
        let record = failure.downcast::<ExceptionRecord>().unwrap();
        assert_eq!(record.key(), ExceptionKey::RuntimeError);
        assert_eq!(record.cause_message().as_deref(), Some("index out of bounds"));
    }
}
