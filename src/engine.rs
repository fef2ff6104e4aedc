use crate::declarations::{BuiltinDeclarations, DeprecationWarningMode};
use crate::error::Result;
use crate::item::ItemPool;
use crate::modules::ModuleLoader;
use crate::reader::{check_deprecation, ItemReader};
use crate::resolver::{ProjectResolver, ResolvedProject};
use crate::value::Value;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Everything a resolution pass takes as input: the project file, ranked
/// search paths, profile values and command-line overrides (both keyed as
/// `module.property`), and the deprecation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupParameters {
    pub project_file: PathBuf,
    pub search_paths: Vec<PathBuf>,
    pub profile: BTreeMap<String, Value>,
    pub overridden_values: BTreeMap<String, Value>,
    pub deprecation_mode: DeprecationWarningMode,
}

impl SetupParameters {
    pub fn new(project_file: impl Into<PathBuf>) -> Self {
        Self {
            project_file: project_file.into(),
            search_paths: vec![],
            profile: BTreeMap::new(),
            overridden_values: BTreeMap::new(),
            deprecation_mode: DeprecationWarningMode::default(),
        }
    }

    pub fn with_search_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.search_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_profile_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.profile.insert(key.into(), value);
        self
    }

    pub fn with_overridden_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.overridden_values.insert(key.into(), value);
        self
    }

    pub fn with_deprecation_mode(mut self, mode: DeprecationWarningMode) -> Self {
        self.deprecation_mode = mode;
        self
    }
}

/// The top-level resolution driver. Owns the property declaration registry;
/// the item pool, reader caches and evaluation caches live for exactly one
/// `resolve` call, so independent resolutions never see stale state.
pub struct Engine {
    builtins: BuiltinDeclarations,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            builtins: BuiltinDeclarations::new(),
        }
    }

    pub fn builtins(&self) -> &BuiltinDeclarations {
        &self.builtins
    }

    /// Resolve a project: read and stitch files, load modules, evaluate,
    /// and flatten into per-product property maps. Either the whole
    /// project resolves or the first unrecoverable error is returned.
    pub fn resolve(&mut self, params: &SetupParameters) -> Result<ResolvedProject> {
        tracing::debug!(project = %params.project_file.display(), "resolving project");

        let mut pool = ItemPool::new();
        let mut reader = ItemReader::new(&self.builtins, params.search_paths.clone())?;
        let root = reader.read_file(&mut pool, &params.project_file)?;

        let mut loader = ModuleLoader::new(
            &mut reader,
            &self.builtins,
            &params.profile,
            &params.overridden_values,
        );
        loader.load(&mut pool, root)?;

        check_deprecation(&pool, &self.builtins, params.deprecation_mode)?;

        let resolver = ProjectResolver::new(&pool, &self.builtins, &params.profile);
        let project = resolver.resolve(root)?;
        tracing::debug!(
            products = project.products.len(),
            files = reader.files_read().len(),
            "project resolved"
        );
        Ok(project)
    }
}
