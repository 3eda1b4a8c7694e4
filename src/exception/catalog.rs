// src/exception/catalog.rs
//! Human-readable text for symbolic keys

use crate::exception::kind::ExceptionKey;
use crate::utils::config::CatalogConfig;
use crate::utils::errors::Result;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use tracing::info;

static BUILTIN: Lazy<HashMap<ExceptionKey, String>> = Lazy::new(|| {
    [
        (ExceptionKey::CompilerError, "Your program has errors and could not be compiled."),
        (ExceptionKey::RuntimeError, "Your program stopped because of an error."),
        (ExceptionKey::NoEntryPoint, "Your program needs a main method to run."),
        (ExceptionKey::TwoEntryPoints, "Your program has more than one main method. Keep only one."),
        (
            ExceptionKey::InvalidEntryPointSignature,
            "Your main method must be declared as public static void main(String[] args).",
        ),
        (ExceptionKey::ClassNotFound, "A class in your program could not be found. Is the file empty?"),
        (ExceptionKey::InvalidClass, "Your program refers to a class that does not exist."),
        (ExceptionKey::TooManyWrites, "Your program tried to write too many files."),
        (ExceptionKey::TooManyUploads, "Your program tried to upload too many files."),
        (ExceptionKey::InvalidFileName, "File names cannot be empty or contain folders."),
        (ExceptionKey::ProgramTimeout, "Your program ran for too long and was stopped."),
        (ExceptionKey::ProgramStopped, "Your program was stopped."),
        (ExceptionKey::ProgramInterrupted, "Your program was interrupted."),
        (ExceptionKey::InternalException, "Something went wrong on our end. Please try again."),
        (
            ExceptionKey::InternalCompilerException,
            "Something went wrong while compiling your program. Please try again.",
        ),
        (
            ExceptionKey::InternalRuntimeException,
            "Something went wrong while running your program. Please try again.",
        ),
        (ExceptionKey::ContentStoreFailure, "Your file could not be saved. Please try again."),
        (ExceptionKey::LowDiskSpace, "The server is low on disk space. Please try again later."),
        (ExceptionKey::OutOfMemory, "The server ran out of memory. Please try again later."),
        (
            ExceptionKey::TempDirectoryCleanupFailed,
            "The server could not clean up after your program. Please try again later.",
        ),
        (ExceptionKey::UnknownError, "An unexpected error occurred."),
    ]
    .into_iter()
    .map(|(key, text)| (key, text.to_string()))
    .collect()
});

/// Key to text lookup
#[derive(Debug, Clone, Default)]
pub struct MessageCatalog {
    entries: HashMap<ExceptionKey, String>,
}

impl MessageCatalog {
    /// Catalog with no entries
    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in English catalog
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN.clone(),
        }
    }

    /// Parse a YAML map of `KEY: text`
    pub fn from_yaml(source: &str) -> Result<Self> {
        let entries: HashMap<ExceptionKey, String> = serde_yaml::from_str(source)?;
        Ok(Self { entries })
    }

    /// Built-in catalog, overlaid with the configured file when present
    pub fn load(config: &CatalogConfig) -> Result<Self> {
        let catalog = Self::builtin();
        match &config.path {
            Some(path) => {
                let source = std::fs::read_to_string(path)?;
                let overlay = Self::from_yaml(&source)?;
                info!(path = %path.display(), entries = overlay.len(), "loaded message catalog overlay");
                Ok(catalog.overlay(overlay))
            }
            None => Ok(catalog),
        }
    }

    /// Entries of `other` replace ours
    pub fn overlay(mut self, other: MessageCatalog) -> Self {
        self.entries.extend(other.entries);
        self
    }

    pub fn insert(&mut self, key: ExceptionKey, text: impl Into<String>) {
        self.entries.insert(key, text.into());
    }

    pub fn lookup(&self, key: ExceptionKey) -> Option<&str> {
        self.entries.get(&key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
