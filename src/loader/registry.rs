// src/loader/registry.rs
//! In-process class registry

use crate::loader::{
    Artifact, EntryInvoker, LinkageFailure, LoadedClass, LoadedMethod, Loader, MethodDescriptor,
};
use crate::runtime::context::ProgramContext;
use dashmap::DashMap;
use std::sync::Arc;

/// A class known to the registry
#[derive(Clone)]
pub struct ClassDefinition {
    name: String,
    methods: Vec<LoadedMethod>,
    dependencies: Vec<String>,
}

impl ClassDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Add a well-formed entry point
    pub fn with_entry<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut ProgramContext, &[String]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.with_method(MethodDescriptor::entry(name), f)
    }

    /// Add a method with an arbitrary signature
    pub fn with_method<F>(mut self, descriptor: MethodDescriptor, f: F) -> Self
    where
        F: Fn(&mut ProgramContext, &[String]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let invoker: Arc<dyn EntryInvoker> = Arc::new(f);
        self.methods.push(LoadedMethod { descriptor, invoker });
        self
    }

    /// Require another class to be present when this one loads
    pub fn depends_on(mut self, class_name: impl Into<String>) -> Self {
        self.dependencies.push(class_name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Loader over classes registered at runtime
#[derive(Default)]
pub struct RegistryLoader {
    classes: DashMap<String, ClassDefinition>,
}

impl RegistryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, class: ClassDefinition) {
        self.classes.insert(class.name.clone(), class);
    }

    pub fn with_class(self, class: ClassDefinition) -> Self {
        self.register(class);
        self
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.classes.contains_key(class_name)
    }
}

impl Loader for RegistryLoader {
    fn load(&self, _artifact: &Artifact, class_name: &str) -> Result<LoadedClass, LinkageFailure> {
        let class = self
            .classes
            .get(class_name)
            .ok_or_else(|| LinkageFailure::ClassNotFound(class_name.to_string()))?;

        if let Some(missing) = class.dependencies.iter().find(|dep| !self.contains(dep)) {
            return Err(LinkageFailure::MissingDependency {
                class: class_name.to_string(),
                missing: missing.clone(),
            });
        }

        Ok(LoadedClass {
            name: class.name.clone(),
            methods: class.methods.clone(),
        })
    }
}
