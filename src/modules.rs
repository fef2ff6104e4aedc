use crate::declarations::BuiltinDeclarations;
use crate::error::{Error, ErrorKind, Result};
use crate::evaluator::Evaluator;
use crate::item::{ItemId, ItemPool, ItemType, ModuleInstance, PropValue};
use crate::reader::ItemReader;
use crate::value::Value;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use indexmap::IndexMap;

#[derive(Debug, Clone)]
struct DependencySpec {
    name: Vec<String>,
    required: bool,
    failure_message: Option<String>,
}

/// Resolves `Depends` items into module instances: sibling products'
/// `Export` items first, then module files under `<searchPath>/modules/`.
/// Each product gets at most one instance per module name; instances share
/// the module file's item tree through their prototype link.
pub struct ModuleLoader<'r, 'b> {
    reader: &'r mut ItemReader<'b>,
    builtins: &'b BuiltinDeclarations,
    profile: &'r BTreeMap<String, Value>,
    overrides: &'r BTreeMap<String, Value>,
}

impl<'r, 'b> ModuleLoader<'r, 'b> {
    pub fn new(
        reader: &'r mut ItemReader<'b>,
        builtins: &'b BuiltinDeclarations,
        profile: &'r BTreeMap<String, Value>,
        overrides: &'r BTreeMap<String, Value>,
    ) -> Self {
        Self {
            reader,
            builtins,
            profile,
            overrides,
        }
    }

    /// Load modules for every product under `root` (a Project or a bare
    /// Product).
    pub fn load(&mut self, pool: &mut ItemPool, root: ItemId) -> Result<()> {
        let products = match pool.get(root).item_type() {
            ItemType::Project => {
                let children = pool.get(root).children().to_vec();
                let products: Vec<ItemId> = children
                    .into_iter()
                    .filter(|c| pool.get(*c).item_type() == ItemType::Product)
                    .collect();
                for product in &products {
                    pool.get_mut(*product).set_scope(root);
                }
                products
            }
            ItemType::Product => vec![root],
            other => {
                let msg = format!("expected a Project or Product at the project root, got {other}");
                return Err(match pool.get(root).location() {
                    Some(loc) => Error::at(ErrorKind::UnknownItemType, msg, loc.clone()),
                    None => Error::new(ErrorKind::UnknownItemType, msg),
                });
            }
        };

        // Sibling products exporting a module interface, by product name.
        let export_map = {
            let ev = Evaluator::new(pool, self.builtins);
            let mut map: HashMap<String, ItemId> = HashMap::new();
            for product in &products {
                let Some(name) = ev.string_value(*product, "name")? else {
                    continue;
                };
                let export = pool
                    .get(*product)
                    .children()
                    .iter()
                    .find(|c| pool.get(**c).item_type() == ItemType::Export);
                if let Some(export) = export {
                    map.insert(name, *export);
                }
            }
            map
        };
        let product_names: Vec<String> = {
            let ev = Evaluator::new(pool, self.builtins);
            let mut names = vec![];
            for product in &products {
                if let Some(name) = ev.string_value(*product, "name")? {
                    names.push(name);
                }
            }
            names
        };

        for product in products {
            self.load_product(pool, product, &export_map, &product_names)?;
        }
        Ok(())
    }

    fn load_product(
        &mut self,
        pool: &mut ItemPool,
        product: ItemId,
        export_map: &HashMap<String, ItemId>,
        product_names: &[String],
    ) -> Result<()> {
        let specs = self.gather_dependencies(pool, product)?;

        let mut loaded: IndexMap<String, ItemId> = IndexMap::new();
        let mut stack: Vec<String> = vec![];
        for spec in specs {
            self.instantiate(
                pool,
                product,
                product,
                &spec,
                export_map,
                product_names,
                &mut loaded,
                &mut stack,
            )?;
        }

        self.setup_group_instances(pool, product, &loaded)?;
        Ok(())
    }

    /// Evaluate the `Depends` children of an item into dependency specs.
    fn gather_dependencies(&self, pool: &ItemPool, item: ItemId) -> Result<Vec<DependencySpec>> {
        let ev = Evaluator::new(pool, self.builtins);
        let mut specs = vec![];
        for child in pool.get(item).children() {
            if pool.get(*child).item_type() != ItemType::Depends {
                continue;
            }
            if !ev.bool_value(*child, "condition", true)? {
                continue;
            }
            let Some(name) = ev.string_value(*child, "name")? else {
                let msg = "Depends item needs a 'name' property".to_string();
                return Err(match pool.get(*child).location() {
                    Some(loc) => Error::at(ErrorKind::Evaluation, msg, loc.clone()),
                    None => Error::new(ErrorKind::Evaluation, msg),
                });
            };
            let required = ev.bool_value(*child, "required", true)?;
            let failure_message = ev.string_value(*child, "failureMessage")?;

            let submodules = ev.string_list_value(*child, "submodules")?;
            match submodules {
                Some(subs) if !subs.is_empty() => {
                    for sub in subs {
                        let mut full: Vec<String> =
                            name.split('.').map(str::to_string).collect();
                        full.extend(sub.split('.').map(str::to_string));
                        specs.push(DependencySpec {
                            name: full,
                            required,
                            failure_message: failure_message.clone(),
                        });
                    }
                }
                _ => specs.push(DependencySpec {
                    name: name.split('.').map(str::to_string).collect(),
                    required,
                    failure_message,
                }),
            }
        }
        Ok(specs)
    }

    #[allow(clippy::too_many_arguments)]
    fn instantiate(
        &mut self,
        pool: &mut ItemPool,
        product: ItemId,
        requester: ItemId,
        spec: &DependencySpec,
        export_map: &HashMap<String, ItemId>,
        product_names: &[String],
        loaded: &mut IndexMap<String, ItemId>,
        stack: &mut Vec<String>,
    ) -> Result<()> {
        let full_name = spec.name.join(".");

        if let Some(instance) = loaded.get(&full_name).copied() {
            self.attach_instance(pool, requester, &spec.name, instance)?;
            record_module(pool, requester, spec, Some(instance));
            return Ok(());
        }
        if stack.contains(&full_name) {
            return Err(Error::new(
                ErrorKind::Evaluation,
                format!(
                    "cyclic module dependency: {} -> {full_name}",
                    stack.join(" -> ")
                ),
            ));
        }

        let root = match export_map.get(&full_name) {
            Some(export) => Some(*export),
            None => self.find_module_root(pool, &spec.name)?,
        };

        let Some(root) = root else {
            // A product dependency without an Export item contributes no
            // module; it is recorded for build ordering.
            if product_names.contains(&full_name) {
                record_module(pool, requester, spec, None);
                return Ok(());
            }
            if spec.required {
                let mut msg = format!("dependency '{full_name}' not found");
                if let Some(extra) = &spec.failure_message {
                    msg.push_str(": ");
                    msg.push_str(extra);
                }
                return Err(Error::new(ErrorKind::ImportNotFound, msg));
            }
            tracing::debug!(module = %full_name, "optional dependency not found");
            record_module(pool, requester, spec, None);
            return Ok(());
        };

        stack.push(full_name.clone());

        let instance = pool.create(ItemType::Module);
        {
            let file = pool.get(root).file().cloned();
            let location = pool.get(root).location().cloned();
            let it = pool.get_mut(instance);
            it.module_instance = true;
            it.set_prototype(root);
            it.file = file;
            it.location = location;
            it.set_scope(product);
        }

        // Product-side (or module-side) qualified bindings become the
        // instance's own properties, shadowing the module defaults. The
        // product's contribution is absorbed last so it wins over a
        // depending module's.
        self.attach_instance(pool, requester, &spec.name, instance)?;
        if requester != product {
            self.attach_instance(pool, product, &spec.name, instance)?;
        }

        pool.get_mut(instance)
            .set_property("name", PropValue::Variant(Value::from(full_name.clone())));

        self.apply_profile_and_overrides(pool, instance, &full_name);

        // The module's own dependencies, shared per product.
        let sub_specs = self.gather_dependencies(pool, root)?;
        for sub in sub_specs {
            self.instantiate(
                pool,
                product,
                instance,
                &sub,
                export_map,
                product_names,
                loaded,
                stack,
            )?;
        }

        stack.pop();
        loaded.insert(full_name, instance);
        record_module(pool, requester, spec, Some(instance));
        if requester != product {
            // Transitive modules surface on the product as well.
            record_module(pool, product, spec, Some(instance));
        }
        tracing::debug!(module = %spec.name.join("."), "module instantiated");
        Ok(())
    }

    /// Candidate module files live under `<searchPath>/modules/<name/…>/`;
    /// the first file whose root is an enabled Module wins.
    fn find_module_root(&mut self, pool: &mut ItemPool, name: &[String]) -> Result<Option<ItemId>> {
        let rel: PathBuf = {
            let mut p = PathBuf::from("modules");
            for part in name {
                p.push(part);
            }
            p
        };
        for sp in self.reader.search_paths().to_vec() {
            let dir = sp.join(&rel);
            if !dir.is_dir() {
                continue;
            }
            let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)
                .map(|rd| {
                    rd.flatten()
                        .map(|e| e.path())
                        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("brix"))
                        .collect()
                })
                .unwrap_or_default();
            files.sort();
            for file in files {
                let root = self.reader.read_file(pool, &file)?;
                if pool.get(root).item_type() != ItemType::Module {
                    continue;
                }
                let enabled = {
                    let ev = Evaluator::new(pool, self.builtins);
                    ev.bool_value(root, "condition", true)?
                };
                if enabled {
                    return Ok(Some(root));
                }
                tracing::debug!(file = %file.display(), "module candidate disabled");
            }
        }
        Ok(None)
    }

    /// Wire `instance` into the requester's property map under the module's
    /// dotted name, absorbing any override subtree that was parsed there.
    fn attach_instance(
        &mut self,
        pool: &mut ItemPool,
        requester: ItemId,
        name: &[String],
        instance: ItemId,
    ) -> Result<()> {
        let mut holder = requester;
        for part in &name[..name.len() - 1] {
            match pool.get(holder).own_property(part) {
                Some(PropValue::Item(sub)) => holder = *sub,
                None => {
                    let file = pool.get(holder).file().cloned();
                    let sub = pool.create(ItemType::ModulePrefix);
                    pool.get_mut(sub).file = file;
                    pool.get_mut(holder)
                        .set_property(part.clone(), PropValue::Item(sub));
                    holder = sub;
                }
                Some(_) => {
                    return Err(Error::new(
                        ErrorKind::Type,
                        format!("property '{part}' is not a module prefix"),
                    ))
                }
            }
        }

        let last = &name[name.len() - 1];
        if let Some(PropValue::Item(override_item)) = pool.get(holder).own_property(last).cloned() {
            if override_item != instance {
                let overrides = pool.get(override_item).properties().clone();
                for (k, v) in overrides {
                    pool.get_mut(instance).set_property(k, v);
                }
            }
        }
        pool.get_mut(holder)
            .set_property(last.clone(), PropValue::Item(instance));
        Ok(())
    }

    /// Command-line overrides pin a property outright; profile values fill
    /// in where no binding exists. Profile contributions to list properties
    /// that do have a binding are appended when the product map is built.
    fn apply_profile_and_overrides(
        &mut self,
        pool: &mut ItemPool,
        instance: ItemId,
        module_name: &str,
    ) {
        let prefix = format!("{module_name}.");

        for (key, value) in self.profile.range(prefix.clone()..) {
            let Some(prop) = key.strip_prefix(&prefix) else {
                break;
            };
            if prop.contains('.') {
                continue;
            }
            if !pool.has_property(instance, prop) {
                pool.get_mut(instance)
                    .set_property(prop.to_string(), PropValue::Variant(value.clone()));
            }
        }

        for (key, value) in self.overrides.range(prefix.clone()..) {
            let Some(prop) = key.strip_prefix(&prefix) else {
                break;
            };
            if prop.contains('.') {
                continue;
            }
            pool.get_mut(instance)
                .set_property(prop.to_string(), PropValue::Variant(value.clone()));
            pool.get_mut(instance)
                .overridden_properties
                .insert(prop.to_string());
        }
    }

    /// A Group override of a module property gets its own instance whose
    /// prototype and outer item are the product-level instance, so `outer`
    /// refers to the product-level value.
    fn setup_group_instances(
        &mut self,
        pool: &mut ItemPool,
        product: ItemId,
        loaded: &IndexMap<String, ItemId>,
    ) -> Result<()> {
        let groups: Vec<ItemId> = pool
            .get(product)
            .children()
            .iter()
            .copied()
            .filter(|c| pool.get(*c).item_type() == ItemType::Group)
            .collect();

        for group in groups {
            let mut paths = vec![];
            collect_item_paths(pool, group, &mut vec![], &mut paths);
            for (path, override_item) in paths {
                let full_name = path.join(".");
                let Some(product_instance) = loaded.get(&full_name).copied() else {
                    continue;
                };

                let file = pool.get(group).file().cloned();
                let ginst = pool.create(ItemType::Module);
                {
                    let it = pool.get_mut(ginst);
                    it.module_instance = true;
                    it.set_prototype(product_instance);
                    it.set_outer_item(product_instance);
                    it.set_scope(product);
                    it.file = file;
                }
                let overrides = pool.get(override_item).properties().clone();
                for (k, v) in overrides {
                    pool.get_mut(ginst).set_property(k, v);
                }
                self.attach_instance(pool, group, &path, ginst)?;
                pool.get_mut(group).modules.push(ModuleInstance {
                    name: path.clone(),
                    item: Some(ginst),
                    required: true,
                });
            }
        }
        Ok(())
    }
}

fn record_module(
    pool: &mut ItemPool,
    requester: ItemId,
    spec: &DependencySpec,
    instance: Option<ItemId>,
) {
    let already = pool
        .get(requester)
        .modules()
        .iter()
        .any(|m| m.name == spec.name);
    if !already {
        pool.get_mut(requester).modules.push(ModuleInstance {
            name: spec.name.clone(),
            item: instance,
            required: spec.required,
        });
    }
}

/// Leaf item-valued property paths of an item, e.g. `[["cpp"], ["a","b"]]`.
fn collect_item_paths(
    pool: &ItemPool,
    item: ItemId,
    prefix: &mut Vec<String>,
    out: &mut Vec<(Vec<String>, ItemId)>,
) {
    for (name, value) in pool.get(item).properties() {
        if let PropValue::Item(sub) = value {
            prefix.push(name.clone());
            if pool.get(*sub).item_type() == ItemType::ModulePrefix
                && pool
                    .get(*sub)
                    .properties()
                    .values()
                    .any(|v| matches!(v, PropValue::Item(_)))
            {
                collect_item_paths(pool, *sub, prefix, out);
            } else {
                out.push((prefix.clone(), *sub));
            }
            prefix.pop();
        }
    }
}
