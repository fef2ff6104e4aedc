use crate::declarations::{BuiltinDeclarations, PropertyDeclaration};
use crate::error::{CodeLocation, Error, ErrorKind, Result};
use crate::evaluator::Evaluator;
use crate::item::{ItemId, ItemPool, ItemType, PropValue};
use crate::value::Value;

use std::collections::BTreeMap;

use serde::Serialize;

/// One source file with its tags, as contributed by a group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceArtifact {
    pub file_path: String,
    pub file_tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedGroup {
    pub name: String,
    pub enabled: bool,
    pub prefix: String,
    pub files: Vec<SourceArtifact>,
    /// Module properties the group overrides, as `modules.<name>.<prop>`;
    /// empty for groups without overrides.
    pub module_properties: Value,
    pub location: Option<CodeLocation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedProduct {
    pub name: String,
    pub target_name: String,
    pub product_type: Vec<String>,
    pub enabled: bool,
    pub destination_directory: Option<String>,
    pub dependencies: Vec<String>,
    pub groups: Vec<ResolvedGroup>,
    /// The nested `modules.<name>.<property>` map handed to downstream
    /// consumers.
    pub module_properties: Value,
    /// Evaluated top-level product properties, minus the ones flagged as
    /// not available in the configuration.
    pub product_properties: Value,
    pub location: Option<CodeLocation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedProject {
    pub name: String,
    pub file_path: String,
    pub enabled: bool,
    pub products: Vec<ResolvedProduct>,
    pub project_properties: Value,
}

/// Walks the evaluated item tree into resolved data. Resolution is a pure
/// function of the item pool and parameters; resolving twice yields
/// identical output.
pub struct ProjectResolver<'a> {
    pool: &'a ItemPool,
    builtins: &'a BuiltinDeclarations,
    evaluator: Evaluator<'a>,
    profile: &'a BTreeMap<String, Value>,
}

impl<'a> ProjectResolver<'a> {
    pub fn new(
        pool: &'a ItemPool,
        builtins: &'a BuiltinDeclarations,
        profile: &'a BTreeMap<String, Value>,
    ) -> Self {
        Self {
            pool,
            builtins,
            evaluator: Evaluator::new(pool, builtins),
            profile,
        }
    }

    pub fn evaluator(&self) -> &Evaluator<'a> {
        &self.evaluator
    }

    pub fn resolve(&self, root: ItemId) -> Result<ResolvedProject> {
        let file_path = self
            .pool
            .get(root)
            .file()
            .map(|f| f.file_path.to_string())
            .unwrap_or_default();

        match self.pool.get(root).item_type() {
            ItemType::Project => {
                let name = self
                    .evaluator
                    .string_value(root, "name")?
                    .unwrap_or_else(|| "project".to_string());
                let enabled = self.evaluator.bool_value(root, "condition", true)?;

                let mut products = vec![];
                if enabled {
                    for child in self.pool.get(root).children() {
                        if self.pool.get(*child).item_type() == ItemType::Product {
                            products.push(self.resolve_product(*child)?);
                        }
                    }
                }

                Ok(ResolvedProject {
                    name,
                    file_path,
                    enabled,
                    products,
                    project_properties: self.evaluated_properties(root)?,
                })
            }
            ItemType::Product => {
                // A file with a bare product forms an implicit project.
                let product = self.resolve_product(root)?;
                Ok(ResolvedProject {
                    name: product.name.clone(),
                    file_path,
                    enabled: true,
                    products: vec![product],
                    project_properties: Value::new_object(),
                })
            }
            other => {
                let msg = format!("cannot resolve a project from a {other} item");
                Err(match self.pool.get(root).location() {
                    Some(loc) => Error::at(ErrorKind::UnknownItemType, msg, loc.clone()),
                    None => Error::new(ErrorKind::UnknownItemType, msg),
                })
            }
        }
    }

    fn resolve_product(&self, product: ItemId) -> Result<ResolvedProduct> {
        let ev = &self.evaluator;
        let name = ev.string_value(product, "name")?.unwrap_or_default();
        let enabled = ev.bool_value(product, "condition", true)?;
        let target_name = ev
            .string_value(product, "targetName")?
            .unwrap_or_else(|| name.clone());
        let product_type = ev.string_list_value(product, "type")?.unwrap_or_default();
        let destination_directory = ev.string_value(product, "destinationDirectory")?;

        let mut groups = vec![];
        // The product's own files form an implicit group.
        if let Some(files) = ev.string_list_value(product, "files")? {
            groups.push(ResolvedGroup {
                name: name.clone(),
                enabled,
                prefix: String::new(),
                files: files
                    .into_iter()
                    .map(|file_path| SourceArtifact {
                        file_path,
                        file_tags: vec![],
                    })
                    .collect(),
                module_properties: Value::new_object(),
                location: self.pool.get(product).location().cloned(),
            });
        }
        for child in self.pool.get(product).children() {
            if self.pool.get(*child).item_type() == ItemType::Group {
                groups.push(self.resolve_group(*child)?);
            }
        }

        let dependencies = self
            .pool
            .get(product)
            .modules()
            .iter()
            .map(|m| m.full_name())
            .collect();

        Ok(ResolvedProduct {
            name,
            target_name,
            product_type,
            enabled,
            destination_directory,
            dependencies,
            groups,
            module_properties: self.module_property_map(product)?,
            product_properties: self.evaluated_properties(product)?,
            location: self.pool.get(product).location().cloned(),
        })
    }

    fn resolve_group(&self, group: ItemId) -> Result<ResolvedGroup> {
        let ev = &self.evaluator;
        let name = ev
            .string_value(group, "name")?
            .unwrap_or_else(|| "group".to_string());
        let enabled = ev.bool_value(group, "condition", true)?;
        let prefix = ev.string_value(group, "prefix")?.unwrap_or_default();
        let file_tags = ev.string_list_value(group, "fileTags")?.unwrap_or_default();

        // The prefix applies to the written file names, before they are
        // resolved against the defining file's directory.
        let raw_list = |prop: &str| -> Result<Vec<String>> {
            Ok(match ev.raw_property(group, prop)? {
                Value::Undefined => vec![],
                Value::List(items) => items.iter().map(Value::to_display_string).collect(),
                v => vec![v.to_display_string()],
            })
        };
        let resolve = |f: &str| -> String {
            let combined = format!("{prefix}{f}");
            let path = std::path::Path::new(&combined);
            if path.is_absolute() {
                combined
            } else {
                match self.pool.get(group).file() {
                    Some(fc) => fc.dir_path.join(path).to_string_lossy().into_owned(),
                    None => combined,
                }
            }
        };

        let excluded: Vec<String> = raw_list("excludeFiles")?.iter().map(|f| resolve(f)).collect();
        let files = raw_list("files")?
            .iter()
            .map(|f| resolve(f))
            .filter(|f| !excluded.contains(f))
            .map(|file_path| SourceArtifact {
                file_path,
                file_tags: file_tags.clone(),
            })
            .collect();

        Ok(ResolvedGroup {
            name,
            enabled,
            prefix,
            files,
            module_properties: self.module_property_map(group)?,
            location: self.pool.get(group).location().cloned(),
        })
    }

    /// The flattened, nested `modules.<name>.<property>` map of an item
    /// with module instances (a product, or recursively an instance).
    fn module_property_map(&self, item: ItemId) -> Result<Value> {
        let mut modules = BTreeMap::new();
        for mi in self.pool.get(item).modules() {
            let Some(instance) = mi.item else {
                continue;
            };
            let full_name = mi.full_name();
            let mut module_map = BTreeMap::new();

            for (prop, decl) in self.declared_properties(instance) {
                if decl.flags.not_available_in_config {
                    continue;
                }
                let mut value = self.evaluator.property(instance, &prop)?;

                // Profile contributions append to in-file list values; an
                // override excludes them entirely.
                if decl.property_type.is_list()
                    && !self.pool.get(instance).is_overridden(&prop)
                    && self.has_source_binding(instance, &prop)
                {
                    if let Some(profile_value) =
                        self.profile.get(&format!("{full_name}.{prop}"))
                    {
                        value = append_profile(value, profile_value);
                    }
                }

                if !value.is_undefined() {
                    module_map.insert(prop, value);
                }
            }

            let nested = self.module_property_map(instance)?;
            let nested_empty = nested["modules"]
                .as_object()
                .map(|m| m.is_empty())
                .unwrap_or(true);
            if !nested_empty {
                module_map.insert("modules".to_string(), nested["modules"].clone());
            }

            modules.insert(full_name, Value::from(module_map));
        }

        let mut map = BTreeMap::new();
        map.insert("modules".to_string(), Value::from(modules));
        Ok(Value::from(map))
    }

    /// All declared properties visible on an item: the registry's set for
    /// its type plus declarations picked up along the prototype chain.
    fn declared_properties(&self, item: ItemId) -> Vec<(String, PropertyDeclaration)> {
        let mut out: Vec<(String, PropertyDeclaration)> = vec![];
        let mut seen = std::collections::BTreeSet::new();

        for (name, decl) in self
            .builtins
            .declarations_for_type(self.pool.get(item).item_type())
        {
            if seen.insert(name.clone()) {
                out.push((name.clone(), decl.clone()));
            }
        }
        let mut cur = Some(item);
        while let Some(id) = cur {
            for (name, decl) in self.pool.get(id).declarations() {
                if seen.insert(name.clone()) {
                    out.push((name.clone(), decl.clone()));
                }
            }
            cur = self.pool.get(id).prototype();
        }
        out
    }

    fn has_source_binding(&self, item: ItemId, name: &str) -> bool {
        matches!(
            self.pool.find_property(item, name),
            Ok(Some((_, PropValue::Source(_))))
        )
    }

    /// Evaluate an item's declared properties into a plain map, skipping
    /// the ones not available in the configuration.
    fn evaluated_properties(&self, item: ItemId) -> Result<Value> {
        let mut map = BTreeMap::new();
        for (prop, decl) in self.declared_properties(item) {
            if decl.flags.not_available_in_config {
                continue;
            }
            let value = self.evaluator.property(item, &prop)?;
            if !value.is_undefined() {
                map.insert(prop, value);
            }
        }
        Ok(Value::from(map))
    }
}

fn append_profile(value: Value, profile_value: &Value) -> Value {
    let mut items = match value {
        Value::List(items) => items.as_ref().clone(),
        Value::Undefined => vec![],
        v => vec![v],
    };
    // A profile value identical to the in-file one is a repeated
    // contribution, not an append.
    match profile_value {
        Value::List(more) => {
            if items != **more {
                items.extend(more.iter().cloned());
            }
        }
        v => {
            if items.len() != 1 || items[0] != *v {
                items.push(v.clone());
            }
        }
    }
    Value::from(items)
}

/// The flattened per-configuration view of a product, used to compare
/// products across build configurations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductData {
    pub name: String,
    pub product_type: Vec<String>,
    pub dependencies: Vec<String>,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectData {
    pub name: String,
    pub products: Vec<ProductData>,
}

impl From<&ResolvedProject> for ProjectData {
    fn from(project: &ResolvedProject) -> Self {
        Self {
            name: project.name.clone(),
            products: project
                .products
                .iter()
                .map(|p| ProductData {
                    name: p.name.clone(),
                    product_type: p.product_type.clone(),
                    dependencies: p.dependencies.clone(),
                    enabled: p.enabled,
                })
                .collect(),
        }
    }
}

/// Reduce per-configuration project views into one. Products must agree on
/// name, type and dependency list across configurations; a mismatch fails
/// the reduction.
pub fn reduce_configurations(configurations: &[(String, ProjectData)]) -> Result<ProjectData> {
    let Some(((_, first), rest)) = configurations.split_first() else {
        return Err(Error::new(
            ErrorKind::Evaluation,
            "cannot reduce zero configurations",
        ));
    };

    for (config_name, data) in rest {
        for product in &data.products {
            let Some(reference) = first.products.iter().find(|p| p.name == product.name) else {
                return Err(Error::new(
                    ErrorKind::Evaluation,
                    format!(
                        "product '{}' exists only in configuration '{config_name}'",
                        product.name
                    ),
                ));
            };
            if reference.product_type != product.product_type
                || reference.dependencies != product.dependencies
            {
                return Err(Error::new(
                    ErrorKind::Evaluation,
                    format!(
                        "product '{}' differs between configurations: type or dependencies do not match",
                        product.name
                    ),
                ));
            }
        }
        if data.products.len() != first.products.len() {
            return Err(Error::new(
                ErrorKind::Evaluation,
                format!("configuration '{config_name}' has a different product set"),
            ));
        }
    }

    Ok(first.clone())
}
