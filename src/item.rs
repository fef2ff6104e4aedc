use crate::ast::ExprRef;
use crate::declarations::PropertyDeclaration;
use crate::error::{CodeLocation, Error, ErrorKind, Result};
use crate::value::Value;

use core::fmt;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::rc::Rc;

use indexmap::IndexMap;

/// The closed set of built-in item types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ItemType {
    Artifact,
    Depends,
    Export,
    FileTagger,
    Group,
    Module,
    Probe,
    Product,
    Project,
    Properties,
    PropertyOptions,
    Rule,
    Transformer,
    /// Internal: the target of a qualified binding such as `cpp.defines`.
    ModulePrefix,
}

impl ItemType {
    pub const fn name(&self) -> &'static str {
        match self {
            ItemType::Artifact => "Artifact",
            ItemType::Depends => "Depends",
            ItemType::Export => "Export",
            ItemType::FileTagger => "FileTagger",
            ItemType::Group => "Group",
            ItemType::Module => "Module",
            ItemType::Probe => "Probe",
            ItemType::Product => "Product",
            ItemType::Project => "Project",
            ItemType::Properties => "Properties",
            ItemType::PropertyOptions => "PropertyOptions",
            ItemType::Rule => "Rule",
            ItemType::Transformer => "Transformer",
            ItemType::ModulePrefix => "ModulePrefix",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A script module import recorded for downstream tooling. The resolver
/// checks the files exist; executing them is not this crate's job.
#[derive(Debug, Clone)]
pub struct ScriptImport {
    pub scope_name: String,
    pub file_paths: Vec<PathBuf>,
    pub location: CodeLocation,
}

/// Per-file information shared by all items and values read from one file.
#[derive(Debug)]
pub struct FileContext {
    pub file_path: Rc<str>,
    pub dir_path: PathBuf,
    /// Built-in extensions imported by this file, e.g. "FileInfo".
    pub extensions: Vec<String>,
    pub script_imports: Vec<ScriptImport>,
    /// `id:`-registered items, visible file-wide.
    pub ids: RefCell<IndexMap<String, ItemId>>,
}

pub type FileContextRef = Rc<FileContext>;

impl FileContext {
    pub fn new(
        file_path: impl Into<Rc<str>>,
        dir_path: PathBuf,
        extensions: Vec<String>,
        script_imports: Vec<ScriptImport>,
    ) -> FileContextRef {
        Rc::new(Self {
            file_path: file_path.into(),
            dir_path,
            extensions,
            script_imports,
            ids: RefCell::new(IndexMap::new()),
        })
    }
}

/// A conditional value contributed by a `Properties` overlay block.
#[derive(Debug, Clone)]
pub struct Alternative {
    pub condition: ExprRef,
    pub condition_scope: ItemId,
    pub value: Rc<SourceValue>,
}

/// An unevaluated property binding: the expression, where it came from,
/// and what the evaluator needs to know before running it. `base` and
/// `outer` values are found by walking the owning item's prototype and
/// outer-item links, so the value itself stays immutable and shareable.
#[derive(Debug, Clone)]
pub struct SourceValue {
    pub expr: ExprRef,
    pub file: FileContextRef,
    pub location: CodeLocation,
    /// Statically detected references to the `base`/`outer` pseudo-values.
    pub uses_base: bool,
    pub uses_outer: bool,
    pub alternatives: Vec<Alternative>,
}

impl SourceValue {
    pub fn new(expr: ExprRef, file: FileContextRef, location: CodeLocation) -> Self {
        let uses_base = expr.uses_ident("base");
        let uses_outer = expr.uses_ident("outer");
        Self {
            expr,
            file,
            location,
            uses_base,
            uses_outer,
            alternatives: vec![],
        }
    }
}

/// One property slot on an item.
#[derive(Debug, Clone)]
pub enum PropValue {
    /// An unevaluated expression.
    Source(Rc<SourceValue>),
    /// A nested item, e.g. the target of a qualified binding or a module.
    Item(ItemId),
    /// An already-concrete value, e.g. a command-line override.
    Variant(Value),
}

/// A module dependency instantiated on a product.
#[derive(Debug, Clone)]
pub struct ModuleInstance {
    pub name: Vec<String>,
    pub item: Option<ItemId>,
    pub required: bool,
}

impl ModuleInstance {
    pub fn full_name(&self) -> String {
        self.name.join(".")
    }
}

/// Arena index of an [`Item`]. Prototype/scope/parent links are ids, never
/// owning pointers; the pool owns every item for the life of a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u32);

/// A node of the parsed project tree.
#[derive(Debug)]
pub struct Item {
    pub(crate) id_name: String,
    pub(crate) item_type: ItemType,
    pub(crate) location: Option<CodeLocation>,
    pub(crate) prototype: Option<ItemId>,
    pub(crate) scope: Option<ItemId>,
    pub(crate) outer_item: Option<ItemId>,
    pub(crate) parent: Option<ItemId>,
    pub(crate) children: Vec<ItemId>,
    pub(crate) file: Option<FileContextRef>,
    pub(crate) properties: IndexMap<String, PropValue>,
    pub(crate) declarations: IndexMap<String, PropertyDeclaration>,
    pub(crate) module_instance: bool,
    pub(crate) modules: Vec<ModuleInstance>,
    /// Properties pinned by a command-line override; they exclude profile
    /// and in-file contributions entirely.
    pub(crate) overridden_properties: BTreeSet<String>,
}

impl Item {
    fn new(item_type: ItemType) -> Self {
        Self {
            id_name: String::new(),
            item_type,
            location: None,
            prototype: None,
            scope: None,
            outer_item: None,
            parent: None,
            children: vec![],
            file: None,
            properties: IndexMap::new(),
            declarations: IndexMap::new(),
            module_instance: false,
            modules: vec![],
            overridden_properties: BTreeSet::new(),
        }
    }

    pub fn item_type(&self) -> ItemType {
        self.item_type
    }

    pub fn id_name(&self) -> &str {
        &self.id_name
    }

    pub fn location(&self) -> Option<&CodeLocation> {
        self.location.as_ref()
    }

    pub fn prototype(&self) -> Option<ItemId> {
        self.prototype
    }

    pub fn scope(&self) -> Option<ItemId> {
        self.scope
    }

    pub fn outer_item(&self) -> Option<ItemId> {
        self.outer_item
    }

    pub fn parent(&self) -> Option<ItemId> {
        self.parent
    }

    pub fn children(&self) -> &[ItemId] {
        &self.children
    }

    pub fn file(&self) -> Option<&FileContextRef> {
        self.file.as_ref()
    }

    pub fn is_module_instance(&self) -> bool {
        self.module_instance
    }

    pub fn modules(&self) -> &[ModuleInstance] {
        &self.modules
    }

    pub fn is_overridden(&self, name: &str) -> bool {
        self.overridden_properties.contains(name)
    }

    pub fn properties(&self) -> &IndexMap<String, PropValue> {
        &self.properties
    }

    pub fn declarations(&self) -> &IndexMap<String, PropertyDeclaration> {
        &self.declarations
    }

    pub fn own_property(&self, name: &str) -> Option<&PropValue> {
        self.properties.get(name)
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: PropValue) {
        self.properties.insert(name.into(), value);
    }

    pub fn set_declaration(&mut self, decl: PropertyDeclaration) {
        self.declarations.insert(decl.name.clone(), decl);
    }

    pub fn set_prototype(&mut self, prototype: ItemId) {
        self.prototype = Some(prototype);
    }

    pub fn set_scope(&mut self, scope: ItemId) {
        self.scope = Some(scope);
    }

    pub fn set_outer_item(&mut self, outer: ItemId) {
        self.outer_item = Some(outer);
    }
}

/// Owns every [`Item`] created during one resolution pass.
#[derive(Debug, Default)]
pub struct ItemPool {
    items: Vec<Item>,
}

impl ItemPool {
    pub fn new() -> Self {
        Self { items: vec![] }
    }

    pub fn create(&mut self, item_type: ItemType) -> ItemId {
        let id = ItemId(self.items.len() as u32);
        self.items.push(Item::new(item_type));
        id
    }

    pub fn get(&self, id: ItemId) -> &Item {
        &self.items[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ItemId) -> &mut Item {
        &mut self.items[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn add_child(&mut self, parent: ItemId, child: ItemId) {
        self.get_mut(parent).children.push(child);
        self.get_mut(child).parent = Some(parent);
    }

    /// Walk the prototype chain looking for a property. The chain must be
    /// acyclic; a cycle is an internal invariant violation and fails fast.
    pub fn find_property(&self, id: ItemId, name: &str) -> Result<Option<(ItemId, PropValue)>> {
        let mut visited = BTreeSet::new();
        let mut cur = Some(id);
        while let Some(item_id) = cur {
            if !visited.insert(item_id) {
                return Err(Error::new(
                    ErrorKind::Evaluation,
                    format!("prototype cycle detected while looking up `{name}`"),
                ));
            }
            let item = self.get(item_id);
            if let Some(v) = item.properties.get(name) {
                return Ok(Some((item_id, v.clone())));
            }
            cur = item.prototype;
        }
        Ok(None)
    }

    pub fn has_property(&self, id: ItemId, name: &str) -> bool {
        matches!(self.find_property(id, name), Ok(Some(_)))
    }

    /// Walk the prototype chain for a property declaration.
    pub fn find_declaration(&self, id: ItemId, name: &str) -> Option<&PropertyDeclaration> {
        let mut visited = BTreeSet::new();
        let mut cur = Some(id);
        while let Some(item_id) = cur {
            if !visited.insert(item_id) {
                return None;
            }
            let item = self.get(item_id);
            if let Some(d) = item.declarations.get(name) {
                return Some(d);
            }
            cur = item.prototype;
        }
        None
    }

    /// The nearest enclosing item of the given type, starting at `id`.
    pub fn find_ancestor_of_type(&self, id: ItemId, wanted: ItemType) -> Option<ItemId> {
        let mut cur = Some(id);
        while let Some(item_id) = cur {
            let item = self.get(item_id);
            if item.item_type == wanted {
                return Some(item_id);
            }
            cur = item.parent;
        }
        None
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemId, &Item)> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, item)| (ItemId(i as u32), item))
    }

    /// Deep-copy an item subtree. Source values stay shared (they are
    /// immutable); nested and child items are cloned so the copy can be
    /// reparented and overridden without touching the original.
    pub fn clone_subtree(&mut self, src: ItemId) -> ItemId {
        let cloned = {
            let item = self.get(src);
            Item {
                id_name: item.id_name.clone(),
                item_type: item.item_type,
                location: item.location.clone(),
                prototype: item.prototype,
                scope: item.scope,
                outer_item: item.outer_item,
                parent: None,
                children: item.children.clone(),
                file: item.file.clone(),
                properties: item.properties.clone(),
                declarations: item.declarations.clone(),
                module_instance: item.module_instance,
                modules: item.modules.clone(),
                overridden_properties: item.overridden_properties.clone(),
            }
        };
        let id = ItemId(self.items.len() as u32);
        self.items.push(cloned);

        let children = self.get(id).children.clone();
        let mut new_children = Vec::with_capacity(children.len());
        for child in children {
            let new_child = self.clone_subtree(child);
            self.get_mut(new_child).parent = Some(id);
            new_children.push(new_child);
        }
        self.get_mut(id).children = new_children;

        let props = self.get(id).properties.clone();
        let mut new_props = props;
        for (_, v) in new_props.iter_mut() {
            if let PropValue::Item(sub) = v {
                *sub = self.clone_subtree(*sub);
            }
        }
        self.get_mut(id).properties = new_props;

        id
    }
}
