// src/backends/registry.rs

//! Maps language identifiers to backends.
//!
//! Resolution is a pure lookup: no workspace, no process, no I/O. An
//! identifier that is unknown, or known but not registered, is an
//! `UnsupportedLanguage`.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::backends::csharp::CSharpBackend;
use crate::backends::go::GoBackend;
use crate::backends::python::PythonBackend;
use crate::backends::typescript::TypeScriptBackend;
use crate::backends::{Backend, Toolbox};
use crate::config::Config;
use crate::error::UnsupportedLanguage;
use crate::language::Language;

#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: BTreeMap<Language, Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All four backends, sharing one runner and workspace manager.
    pub fn from_config(config: &Config) -> Self {
        let tools = Arc::new(Toolbox::new(config));
        let rt = &config.runtime;

        let mut registry = Self::new();
        registry.register(Arc::new(PythonBackend::new(tools.clone(), &rt.python)));
        registry.register(Arc::new(TypeScriptBackend::new(tools.clone(), &rt.npx)));
        registry.register(Arc::new(CSharpBackend::new(
            tools.clone(),
            &rt.dotnet,
            &config.csharp_target_framework,
        )));
        registry.register(Arc::new(GoBackend::new(tools, &rt.go, &rt.gofmt)));
        registry
    }

    /// Register `backend` under its own language, replacing any previous one.
    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        self.backends.insert(backend.language(), backend);
    }

    pub fn resolve(&self, identifier: &str) -> Result<Arc<dyn Backend>, UnsupportedLanguage> {
        let language: Language = identifier.parse()?;
        self.backends
            .get(&language)
            .cloned()
            .ok_or_else(|| UnsupportedLanguage::new(identifier))
    }

    /// Registered languages, in catalogue order.
    pub fn languages(&self) -> Vec<Language> {
        self.backends.keys().copied().collect()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("languages", &self.languages())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn registry_in(dir: &std::path::Path) -> BackendRegistry {
        let config = Config {
            workspace_dir: Some(dir.to_path_buf()),
            ..Config::default()
        };
        BackendRegistry::from_config(&config)
    }

    #[test]
    fn resolves_every_language_and_alias() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry_in(tmp.path());

        for (id, lang) in [
            ("python", Language::Python),
            ("py", Language::Python),
            ("TypeScript", Language::TypeScript),
            ("csharp", Language::CSharp),
            ("c#", Language::CSharp),
            ("go", Language::Go),
        ] {
            assert_eq!(registry.resolve(id).unwrap().language(), lang, "{id}");
        }
        assert_eq!(registry.languages(), Language::ALL.to_vec());
    }

    #[test]
    fn unknown_language_is_rejected_without_side_effects() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry_in(tmp.path());

        let err = registry.resolve("cobol").err().unwrap();
        assert_eq!(err.to_string(), "Unsupported language: cobol");
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn known_but_unregistered_language_is_rejected() {
        let err = BackendRegistry::new().resolve("go").err().unwrap();
        assert_eq!(err.identifier(), "go");
    }
}
