// src/loader/dylib.rs
//! Classes exported from a compiled shared library
//!
//! Symbol layout for a class `a.b.Main` with entry name `main`:
//!
//! ```text
//! __hosted_class_a_b_Main      marker, present when the class exists
//! a_b_Main__main               entry, fn(*const HostApi, usize, *const *const c_char) -> i32
//! ```
//!
//! A non-zero return status is reported as a runtime error of the hosted
//! program. Console writes go back through [`HostApi::write`].
//!
//! Libraries are bound eagerly, so a reference to a class the program was
//! never linked against fails in `load` instead of in the middle of a run.

use crate::exception::{ExceptionKey, ExceptionRecord};
use crate::loader::{
    Artifact, EntryInvoker, LinkageFailure, LoadedClass, LoadedMethod, Loader, MethodDescriptor,
};
use crate::runtime::context::ProgramContext;
use crate::runtime::output::Console;
use dashmap::DashMap;
use libloading::Library;
use parking_lot::Mutex;
use std::ffi::{c_char, c_void, CString};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const CLASS_MARKER_PREFIX: &str = "__hosted_class_";

/// Callbacks handed to compiled code
#[repr(C)]
pub struct HostApi {
    pub context: *mut c_void,
    /// Write `len` bytes to the console; returns 0 on success
    pub write: unsafe extern "C" fn(context: *mut c_void, bytes: *const u8, len: usize) -> i32,
}

type EntryFn = unsafe extern "C" fn(*const HostApi, usize, *const *const c_char) -> i32;

struct HostCall<'a> {
    console: &'a Console,
    failure: Mutex<Option<anyhow::Error>>,
}

unsafe extern "C" fn host_write(context: *mut c_void, bytes: *const u8, len: usize) -> i32 {
    if context.is_null() || (bytes.is_null() && len > 0) {
        return -1;
    }
    let call = &*(context as *const HostCall<'_>);
    let slice = if len == 0 {
        &[][..]
    } else {
        std::slice::from_raw_parts(bytes, len)
    };

    match call.console.write_bytes(slice) {
        Ok(()) => 0,
        Err(err) => {
            call.failure.lock().get_or_insert(err);
            -1
        }
    }
}

/// Flatten a qualified class name into a symbol fragment
pub fn mangle(class_name: &str) -> String {
    class_name
        .chars()
        .map(|c| match c {
            '.' | '/' | '$' => '_',
            other => other,
        })
        .collect()
}

fn marker_symbol(class_name: &str) -> String {
    format!("{}{}", CLASS_MARKER_PREFIX, mangle(class_name))
}

fn entry_symbol(class_name: &str, entry: &str) -> String {
    format!("{}__{}", mangle(class_name), entry)
}

/// Pull the missing name out of a dynamic linker message
fn undefined_symbol(message: &str) -> Option<String> {
    let (_, rest) = message.split_once("undefined symbol: ")?;
    let name: String = rest
        .chars()
        .take_while(|c| !c.is_whitespace() && *c != ',' && *c != ')')
        .collect();
    (!name.is_empty()).then_some(name)
}

/// Class fragment of a marker or entry/method symbol
fn symbol_class(symbol: &str) -> &str {
    if let Some(class) = symbol.strip_prefix(CLASS_MARKER_PREFIX) {
        return class;
    }
    match symbol.rsplit_once("__") {
        Some((class, _method)) if !class.is_empty() => class,
        _ => symbol,
    }
}

#[cfg(unix)]
unsafe fn open_library(path: &Path) -> Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_LOCAL, RTLD_NOW};
    UnixLibrary::open(Some(path), RTLD_NOW | RTLD_LOCAL).map(Into::into)
}

#[cfg(not(unix))]
unsafe fn open_library(path: &Path) -> Result<Library, libloading::Error> {
    Library::new(path)
}

struct DylibInvoker {
    // Keeps `entry` valid
    _library: Arc<Library>,
    entry: EntryFn,
}

impl EntryInvoker for DylibInvoker {
    fn invoke(&self, ctx: &mut ProgramContext, args: &[String]) -> anyhow::Result<()> {
        let c_args = args
            .iter()
            .map(|arg| CString::new(arg.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ExceptionRecord::user(ExceptionKey::RuntimeError).with_cause(e))?;
        let argv: Vec<*const c_char> = c_args.iter().map(|arg| arg.as_ptr()).collect();

        let call = HostCall {
            console: ctx.console(),
            failure: Mutex::new(None),
        };
        let api = HostApi {
            context: &call as *const HostCall<'_> as *mut c_void,
            write: host_write,
        };

        let status = unsafe { (self.entry)(&api, argv.len(), argv.as_ptr()) };

        if let Some(err) = call.failure.lock().take() {
            return Err(err);
        }
        if status != 0 {
            return Err(ExceptionRecord::user(ExceptionKey::RuntimeError)
                .with_cause(format!("program exited with status {}", status))
                .into());
        }
        Ok(())
    }
}

/// Loader over shared libraries produced by the compiler
pub struct DylibLoader {
    entry_name: String,
    libraries: DashMap<PathBuf, Arc<Library>>,
}

impl DylibLoader {
    pub fn new(entry_name: impl Into<String>) -> Self {
        Self {
            entry_name: entry_name.into(),
            libraries: DashMap::new(),
        }
    }

    fn open(&self, path: &Path, class_name: &str) -> Result<Arc<Library>, LinkageFailure> {
        if let Some(library) = self.libraries.get(path) {
            return Ok(Arc::clone(&library));
        }

        let library = unsafe { open_library(path) }.map_err(|err| {
            let message = err.to_string();
            match undefined_symbol(&message) {
                Some(symbol) => LinkageFailure::MissingDependency {
                    class: class_name.to_string(),
                    missing: symbol_class(&symbol).to_string(),
                },
                None => LinkageFailure::LoadFailed(message),
            }
        })?;

        info!(path = %path.display(), "loaded program library");
        let library = Arc::new(library);
        self.libraries.insert(path.to_path_buf(), Arc::clone(&library));
        Ok(library)
    }

    /// Drop cached libraries
    pub fn unload_all(&self) {
        self.libraries.clear();
    }
}

impl Loader for DylibLoader {
    fn load(&self, artifact: &Artifact, class_name: &str) -> Result<LoadedClass, LinkageFailure> {
        let path = artifact
            .library_path
            .as_deref()
            .ok_or_else(|| LinkageFailure::LoadFailed(format!("artifact {} has no library", artifact.id)))?;
        let library = self.open(path, class_name)?;

        let marker = marker_symbol(class_name);
        if unsafe { library.get::<*const c_void>(marker.as_bytes()) }.is_err() {
            return Err(LinkageFailure::ClassNotFound(class_name.to_string()));
        }

        let mut methods = Vec::new();
        let symbol = entry_symbol(class_name, &self.entry_name);
        match unsafe { library.get::<EntryFn>(symbol.as_bytes()) } {
            Ok(entry) => {
                let entry: EntryFn = *entry;
                methods.push(LoadedMethod {
                    descriptor: MethodDescriptor::entry(self.entry_name.clone()),
                    invoker: Arc::new(DylibInvoker {
                        _library: Arc::clone(&library),
                        entry,
                    }),
                });
            }
            Err(_) => debug!(class = class_name, symbol = %symbol, "class has no entry symbol"),
        }

        Ok(LoadedClass {
            name: class_name.to_string(),
            methods,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mangle() {
        assert_eq!(mangle("Main"), "Main");
        assert_eq!(mangle("acm.program.ConsoleProgram"), "acm_program_ConsoleProgram");
        assert_eq!(mangle("acm/graphics/GOval"), "acm_graphics_GOval");
        assert_eq!(mangle("Outer$Inner"), "Outer_Inner");
    }

    #[test]
    fn test_symbol_names() {
        assert_eq!(marker_symbol("a.b.Main"), "__hosted_class_a_b_Main");
        assert_eq!(entry_symbol("a.b.Main", "main"), "a_b_Main__main");
    }

    #[test]
    fn test_undefined_symbol_parsing() {
        let message = "libprog.so: undefined symbol: acm_graphics_GOval__new";
        assert_eq!(undefined_symbol(message).as_deref(), Some("acm_graphics_GOval__new"));
        assert_eq!(undefined_symbol("file not found"), None);
    }

    #[test]
    fn test_symbol_class() {
        assert_eq!(symbol_class("acm_graphics_GOval__new"), "acm_graphics_GOval");
        assert_eq!(symbol_class("__hosted_class_acm_graphics_GOval"), "acm_graphics_GOval");
        assert_eq!(symbol_class("a_b__Main__main"), "a_b__Main");
        assert_eq!(symbol_class("puts"), "puts");
    }

    #[test]
    fn test_artifact_without_library() {
        let loader = DylibLoader::new("main");
        let err = loader.load(&Artifact::new("a1"), "Main").unwrap_err();
        assert!(matches!(err, LinkageFailure::LoadFailed(_)));
    }

    #[test]
    fn test_missing_library_file() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = Artifact::new("a1").with_library(dir.path().join("libmissing.so"));

        let loader = DylibLoader::new("main");
        let err = loader.load(&artifact, "Main").unwrap_err();
        assert!(matches!(err, LinkageFailure::LoadFailed(_)));
    }

    #[cfg(target_os = "linux")]
    mod linked {
        use super::*;
        use crate::compiler::{CompileError, Compiler, ProgramSource};
        use crate::exception::{ErrorKind, Terminator};
        use crate::loader::{CompiledUnit, EntryPointResolver};
        use crate::protocol::message::{DetailKey, MessageType};
        use crate::protocol::queue::QueueAdapter;
        use crate::runtime::content::LocalContentStore;
        use crate::runtime::executor::SessionExecutor;
        use crate::utils::config::HostConfig;
        use std::process::Command;

        const HEADER: &str = r#"
#include <stddef.h>
#include <stdint.h>
typedef struct {
    void *context;
    int32_t (*write)(void *context, const uint8_t *bytes, size_t len);
} HostApi;
int __hosted_class_Main = 1;
"#;

        const HELLO: &str = r#"
int Main__main(const HostApi *api, size_t argc, const char **argv) {
    return api->write(api->context, (const uint8_t *)"hi\n", 3);
}
"#;

        const UNLINKED: &str = r#"
extern void *acm_graphics_GOval__new(void);
int Main__main(const HostApi *api, size_t argc, const char **argv) {
    return acm_graphics_GOval__new() == NULL;
}
"#;

        /// Build `libprog.so` with the system C compiler, `None` when there is none
        fn build(dir: &Path, body: &str) -> Option<PathBuf> {
            let source = dir.join("prog.c");
            std::fs::write(&source, format!("{}{}", HEADER, body)).unwrap();
            let library = dir.join("libprog.so");
            let status = Command::new("cc")
                .args(["-shared", "-fPIC", "-o"])
                .arg(&library)
                .arg(&source)
                .status()
                .ok()?;
            status.success().then_some(library)
        }

        struct Prebuilt(PathBuf);

        impl Compiler for Prebuilt {
            fn compile(&self, _sources: &[ProgramSource]) -> Result<Artifact, CompileError> {
                Ok(Artifact::new("prebuilt")
                    .with_unit(CompiledUnit::new("Main.java", vec!["Main".to_string()]))
                    .with_library(self.0.clone()))
            }
        }

        struct NoExit;

        impl Terminator for NoExit {
            fn terminate(&self, exit_code: i32) {
                panic!("unexpected termination with {}", exit_code);
            }
        }

        fn executor(library: PathBuf, dir: &Path) -> SessionExecutor {
            SessionExecutor::new(
                HostConfig::default(),
                Arc::new(Prebuilt(library)),
                Arc::new(DylibLoader::new("main")),
            )
            .unwrap()
            .with_store(Arc::new(LocalContentStore::new(dir.join("content"))))
            .with_terminator(Arc::new(NoExit))
        }

        fn sources() -> Vec<ProgramSource> {
            vec![ProgramSource::new("Main.java", "class Main {}")]
        }

        #[test]
        fn test_unresolved_dependency_fails_at_load() {
            let dir = tempfile::tempdir().unwrap();
            let Some(library) = build(dir.path(), UNLINKED) else {
                eprintln!("no C compiler available; skipping");
                return;
            };
            let artifact = Artifact::new("a1")
                .with_unit(CompiledUnit::new("Main.java", vec!["Main".to_string()]))
                .with_library(library);

            let loader = DylibLoader::new("main");
            match loader.load(&artifact, "Main").unwrap_err() {
                LinkageFailure::MissingDependency { class, missing } => {
                    assert_eq!(class, "Main");
                    assert_eq!(missing, "acm_graphics_GOval");
                }
                other => panic!("expected missing dependency, got {:?}", other),
            }

            let err = EntryPointResolver::new(Arc::new(DylibLoader::new("main")), "main")
                .resolve(&artifact)
                .unwrap_err();
            assert_eq!(err.key(), ExceptionKey::InvalidClass);
            assert_eq!(err.kind(), ErrorKind::UserInitiated);
            assert_eq!(
                err.detail().get(&DetailKey::ClassName).map(String::as_str),
                Some("acm_graphics_GOval")
            );
        }

        #[tokio::test]
        async fn test_unresolved_dependency_session_reports_invalid_class() {
            let dir = tempfile::tempdir().unwrap();
            let Some(library) = build(dir.path(), UNLINKED) else {
                eprintln!("no C compiler available; skipping");
                return;
            };
            let executor = executor(library, dir.path());
            let queue = Arc::new(QueueAdapter::new(64));
            let session = executor.create_session(queue.clone());

            let outcome = executor.run(session, sources(), vec![]).await;

            assert_eq!(outcome.failure.unwrap().key, ExceptionKey::InvalidClass);
            assert_eq!(outcome.exit_code, 0);
            let messages = queue.drain();
            let exception = messages
                .iter()
                .find(|m| m.message_type() == MessageType::Exception)
                .unwrap();
            assert_eq!(exception.value(), "INVALID_CLASS");
            assert!(!messages.iter().any(|m| m.value() == "RUNNING"));
            assert_eq!(messages.last().unwrap().value(), "EXITED");
        }

        #[tokio::test]
        async fn test_linked_program_writes_console() {
            let dir = tempfile::tempdir().unwrap();
            let Some(library) = build(dir.path(), HELLO) else {
                eprintln!("no C compiler available; skipping");
                return;
            };
            let executor = executor(library, dir.path());
            let queue = Arc::new(QueueAdapter::new(64));
            let session = executor.create_session(queue.clone());

            let outcome = executor.run(session, sources(), vec![]).await;

            assert!(outcome.is_success());
            let out: String = queue
                .drain()
                .iter()
                .filter(|m| m.message_type() == MessageType::SystemOut)
                .map(|m| m.value().to_string())
                .collect();
            assert_eq!(out, "hi\n");
        }
    }
}
