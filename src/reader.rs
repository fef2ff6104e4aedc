use crate::ast::{
    BindingAst, Expr, ExprRef, FileAst, ImportAst, MemberAst, ObjectAst, PropertyDeclAst,
};
use crate::declarations::{
    BuiltinDeclarations, DeprecationWarningMode, PropertyDeclaration, PropertyType, Version,
};
use crate::error::{Error, ErrorKind, Result};
use crate::extensions;
use crate::item::{
    Alternative, FileContext, FileContextRef, ItemId, ItemPool, ItemType, PropValue, ScriptImport,
    SourceValue,
};
use crate::lexer::{Source, Span};
use crate::parser::Parser;

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Fully qualified prototype name (e.g. `["Utils", "MyProduct"]`) to the
/// file that defines it.
pub type TypeNameMap = HashMap<Vec<String>, PathBuf>;

struct FileState {
    ctx: FileContextRef,
    type_map: TypeNameMap,
}

/// Reads project files into item trees: parse caching, import resolution,
/// prototype collection, and cyclic-import detection. One reader serves one
/// resolution pass; its caches must not outlive it.
pub struct ItemReader<'a> {
    builtins: &'a BuiltinDeclarations,
    search_paths: Vec<PathBuf>,
    ast_cache: HashMap<PathBuf, Rc<FileAst>>,
    item_cache: HashMap<PathBuf, ItemId>,
    dir_cache: HashMap<PathBuf, Rc<Vec<(String, PathBuf)>>>,
    in_progress: BTreeSet<PathBuf>,
    files_read: BTreeSet<PathBuf>,
    undefined_expr: ExprRef,
}

/// Parse an expression that has no backing file, e.g. a built-in default.
pub(crate) fn parse_standalone_expression(name: &str, text: &str) -> Result<ExprRef> {
    let source = Source::from_contents(name.to_string(), text.to_string())?;
    let mut parser = Parser::new(&source)?;
    parser.parse_expression()
}

fn string_literal_value(span: &Span) -> Result<String> {
    let quoted = &span.source.contents()[span.start as usize - 1..span.end as usize + 1];
    serde_json::from_str(quoted).map_err(|e| span.error(ErrorKind::Parse, &e.to_string()))
}

impl<'a> ItemReader<'a> {
    pub fn new(builtins: &'a BuiltinDeclarations, search_paths: Vec<PathBuf>) -> Result<Self> {
        Ok(Self {
            builtins,
            search_paths,
            ast_cache: HashMap::new(),
            item_cache: HashMap::new(),
            dir_cache: HashMap::new(),
            in_progress: BTreeSet::new(),
            files_read: BTreeSet::new(),
            undefined_expr: parse_standalone_expression("<builtin>", "undefined")?,
        })
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    pub fn files_read(&self) -> &BTreeSet<PathBuf> {
        &self.files_read
    }

    /// Read a project file into an item tree. Trees are built once per file
    /// and shared; re-entering a file that is still being built is a cyclic
    /// import and fails.
    pub fn read_file(&mut self, pool: &mut ItemPool, path: &Path) -> Result<ItemId> {
        let abs = std::fs::canonicalize(path).map_err(|e| {
            Error::new(
                ErrorKind::Io,
                format!("cannot open '{}': {e}", path.display()),
            )
        })?;

        if let Some(root) = self.item_cache.get(&abs) {
            return Ok(*root);
        }
        if self.in_progress.contains(&abs) {
            return Err(Error::new(
                ErrorKind::CyclicImport,
                format!("loop detected when importing '{}'", abs.display()),
            ));
        }

        self.in_progress.insert(abs.clone());
        let result = self.read_file_internal(pool, &abs);
        self.in_progress.remove(&abs);

        let root = result?;
        self.item_cache.insert(abs, root);
        Ok(root)
    }

    fn read_file_internal(&mut self, pool: &mut ItemPool, abs: &Path) -> Result<ItemId> {
        let ast = match self.ast_cache.get(abs) {
            Some(ast) => ast.clone(),
            None => {
                let source = Source::from_file(abs)?;
                let ast = Rc::new(Parser::new(&source)?.parse()?);
                self.ast_cache.insert(abs.to_path_buf(), ast.clone());
                ast
            }
        };
        self.files_read.insert(abs.to_path_buf());

        let dir = abs
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        let (type_map, exts, script_imports) = self.handle_imports(&ast.imports, &dir)?;
        let ctx = FileContext::new(
            abs.to_string_lossy().into_owned(),
            dir,
            exts,
            script_imports,
        );
        let state = FileState { ctx, type_map };
        self.visit_object(pool, &state, &ast.root, None)
    }

    fn check_import_version(&self, version: &Option<Span>) -> Result<()> {
        let Some(span) = version else {
            return Ok(());
        };
        let v: Version = span
            .text()
            .parse()
            .map_err(|_| span.error(ErrorKind::Parse, "cannot parse version number in import"))?;
        if v != self.builtins.language_version() {
            return Err(span.error(
                ErrorKind::VersionIncompatibility,
                &format!(
                    "incompatible brix language version {v}. This is version {}",
                    self.builtins.language_version()
                ),
            ));
        }
        Ok(())
    }

    /// Classify and resolve every import of a file, producing the prototype
    /// map, imported extension names, and recorded script imports.
    fn handle_imports(
        &mut self,
        imports: &[ImportAst],
        dir: &Path,
    ) -> Result<(TypeNameMap, Vec<String>, Vec<ScriptImport>)> {
        let mut type_map = TypeNameMap::new();
        let search_paths = self.search_paths.clone();

        // Prototypes from the search paths and the file's own directory are
        // always available; the implicit brix.base import comes first.
        for sp in &search_paths {
            self.collect_prototypes(&sp.join("imports"), None, &mut type_map);
            let base_dir = sp.join("imports").join("brix").join("base");
            if base_dir.is_dir() {
                self.collect_prototypes(&base_dir, None, &mut type_map);
            }
        }
        self.collect_prototypes(dir, None, &mut type_map);

        let mut import_as_names: BTreeSet<String> = BTreeSet::new();
        let mut extension_names: Vec<String> = vec![];
        let mut js_imports: Vec<ScriptImport> = vec![];

        for import in imports {
            let uri: Vec<&str> = import.uri.iter().map(Span::text).collect();
            let is_base = uri == ["brix"] || uri == ["brix", "base"];

            if is_base {
                self.check_import_version(&import.version)?;
            } else if let Some(v) = &import.version {
                tracing::warn!(location = %v.location(), "superfluous version specification");
            }

            if is_base {
                if let Some(alias) = &import.alias {
                    if extensions::has_extension(alias.text()) {
                        return Err(alias.error(
                            ErrorKind::ReservedNameCollision,
                            &format!(
                                "cannot reuse the name of built-in extension '{}'",
                                alias.text()
                            ),
                        ));
                    }
                    return Err(alias.error(
                        ErrorKind::Parse,
                        "import of brix.base must have no 'as <Name>'",
                    ));
                }
                // The base prototypes were already collected above.
                continue;
            }

            if uri.len() == 2 && uri[0] == "brix" && extensions::has_extension(uri[1]) {
                if let Some(alias) = &import.alias {
                    return Err(alias.error(
                        ErrorKind::Parse,
                        &format!(
                            "import of built-in extension '{}' must not have 'as' specifier",
                            uri[1]
                        ),
                    ));
                }
                if extension_names.iter().any(|e| e == uri[1]) {
                    tracing::warn!("built-in extension '{}' already imported", uri[1]);
                } else {
                    extension_names.push(uri[1].to_string());
                }
                continue;
            }

            let (alias_name, alias_span) = match &import.alias {
                Some(a) => (a.text().to_string(), a.clone()),
                None => {
                    if import.file.is_some() {
                        return Err(import
                            .span
                            .error(ErrorKind::Parse, "file imports require 'as <Name>'"));
                    }
                    match import.uri.last() {
                        Some(last) => (last.text().to_string(), last.clone()),
                        None => {
                            return Err(import.span.error(ErrorKind::Parse, "invalid import URI"))
                        }
                    }
                }
            };

            if !import_as_names.insert(alias_name.clone()) {
                return Err(alias_span.error(
                    ErrorKind::DuplicateAlias,
                    "cannot import into the same name more than once",
                ));
            }
            if extensions::has_extension(&alias_name) {
                return Err(alias_span.error(
                    ErrorKind::ReservedNameCollision,
                    &format!("cannot reuse the name of built-in extension '{alias_name}'"),
                ));
            }

            if let Some(file_span) = &import.file {
                let raw = string_literal_value(file_span)?;
                let target = std::fs::canonicalize(dir.join(&raw)).map_err(|_| {
                    file_span.error(
                        ErrorKind::ImportNotFound,
                        &format!("cannot find imported file {raw}"),
                    )
                })?;
                if target.is_dir() {
                    self.collect_prototypes(&target, Some(&alias_name), &mut type_map);
                    self.collect_script_files(
                        &target,
                        &alias_name,
                        file_span,
                        &mut js_imports,
                    );
                } else {
                    match target.extension().and_then(|e| e.to_str()) {
                        Some("js") => js_imports.push(ScriptImport {
                            scope_name: alias_name.clone(),
                            file_paths: vec![target],
                            location: file_span.location(),
                        }),
                        Some("brix") => {
                            type_map.insert(vec![alias_name.clone()], target);
                        }
                        _ => {
                            return Err(file_span.error(
                                ErrorKind::Parse,
                                "can only import .brix and .js files",
                            ))
                        }
                    }
                }
            } else {
                let uri_vec: Vec<String> = uri.iter().map(|s| s.to_string()).collect();
                let mut found = type_map.contains_key(&uri_vec);
                if !found {
                    let import_path: PathBuf = uri_vec.iter().collect();
                    for sp in &search_paths {
                        let d = sp.join("imports").join(&import_path);
                        if d.is_dir() {
                            self.collect_prototypes(&d, Some(&alias_name), &mut type_map);
                            self.collect_script_files(
                                &d,
                                &alias_name,
                                &import.span,
                                &mut js_imports,
                            );
                            found = true;
                            break;
                        }
                    }
                }
                if !found {
                    return Err(import.span.error(
                        ErrorKind::ImportNotFound,
                        &format!("import {} not found", uri_vec.join(".")),
                    ));
                }
            }
        }

        Ok((type_map, extension_names, js_imports))
    }

    /// Register `<alias.>Name -> file` for every .brix file in `dir` whose
    /// stem starts with an uppercase letter. Directory scans are cached.
    fn collect_prototypes(&mut self, dir: &Path, alias: Option<&str>, map: &mut TypeNameMap) {
        let entries = match self.dir_cache.get(dir) {
            Some(e) => e.clone(),
            None => {
                let mut found = vec![];
                if let Ok(rd) = std::fs::read_dir(dir) {
                    for entry in rd.flatten() {
                        let path = entry.path();
                        if path.extension().and_then(|e| e.to_str()) != Some("brix") {
                            continue;
                        }
                        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                            continue;
                        };
                        if !stem.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
                            continue;
                        }
                        found.push((stem.to_string(), path));
                    }
                }
                found.sort();
                let entries = Rc::new(found);
                self.dir_cache.insert(dir.to_path_buf(), entries.clone());
                entries
            }
        };

        for (name, path) in entries.iter() {
            let key = match alias {
                Some(a) => vec![a.to_string(), name.clone()],
                None => vec![name.clone()],
            };
            map.insert(key, path.clone());
        }
    }

    fn collect_script_files(
        &mut self,
        dir: &Path,
        alias: &str,
        span: &Span,
        js_imports: &mut Vec<ScriptImport>,
    ) {
        let mut file_paths = vec![];
        if let Ok(rd) = std::fs::read_dir(dir) {
            for entry in rd.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("js") {
                    file_paths.push(path);
                }
            }
        }
        if !file_paths.is_empty() {
            file_paths.sort();
            js_imports.push(ScriptImport {
                scope_name: alias.to_string(),
                file_paths,
                location: span.location(),
            });
        }
    }

    fn visit_object(
        &mut self,
        pool: &mut ItemPool,
        state: &FileState,
        ast: &ObjectAst,
        parent: Option<ItemId>,
    ) -> Result<ItemId> {
        let full_name: Vec<String> = ast.type_name.iter().map(|s| s.text().to_string()).collect();
        let type_span = &ast.type_name[0];

        // A user-defined prototype wins over nothing; the type of the new
        // item is the (ultimately built-in) type of the prototype's root.
        let proto_file = state.type_map.get(&full_name).cloned();
        let (item_type, proto_root) = match &proto_file {
            Some(pf) => {
                let proto_root = self.read_file(pool, pf)?;
                (pool.get(proto_root).item_type(), Some(proto_root))
            }
            None => {
                if full_name.len() != 1 {
                    return Err(type_span.error(
                        ErrorKind::UnknownItemType,
                        &format!("unknown item type '{}'", full_name.join(".")),
                    ));
                }
                let t = self
                    .builtins
                    .type_for_name(&full_name[0])
                    .map_err(|e| type_span.error(e.kind, &e.message))?;
                (t, None)
            }
        };

        let item = pool.create(item_type);
        {
            let it = pool.get_mut(item);
            it.file = Some(state.ctx.clone());
            it.location = Some(type_span.location());
        }
        if let Some(parent) = parent {
            pool.add_child(parent, item);
        }

        for member in &ast.members {
            match member {
                MemberAst::Child(child) => {
                    self.visit_object(pool, state, child, Some(item))?;
                }
                MemberAst::Decl(decl) => {
                    self.visit_property_decl(pool, state, item, decl)?;
                }
                MemberAst::Binding(binding) => {
                    self.visit_binding(pool, state, item, binding)?;
                }
            }
        }

        if item_type != ItemType::Properties {
            self.setup_alternatives(pool, item)?;
        }

        if let Some(proto_root) = proto_root {
            self.inherit_item(pool, item, proto_root);
        }

        Ok(item)
    }

    fn visit_property_decl(
        &mut self,
        pool: &mut ItemPool,
        state: &FileState,
        item: ItemId,
        ast: &PropertyDeclAst,
    ) -> Result<()> {
        let type_name = ast.type_name.text();
        let Some(ptype) = PropertyType::from_type_name(type_name) else {
            return Err(ast.type_name.error(
                ErrorKind::UnknownPropertyType,
                &format!("unknown type '{type_name}' in property declaration"),
            ));
        };

        let name = ast.name.text().to_string();
        pool.get_mut(item)
            .set_declaration(PropertyDeclaration::new(name.clone(), ptype));

        if let Some(value) = &ast.value {
            if pool.get(item).own_property(&name).is_some() {
                return Err(ast.name.error(
                    ErrorKind::DuplicateBinding,
                    &format!("duplicate binding for '{name}'"),
                ));
            }
            let sv = SourceValue::new(value.clone(), state.ctx.clone(), value.span().location());
            pool.get_mut(item)
                .set_property(name, PropValue::Source(Rc::new(sv)));
        }
        Ok(())
    }

    fn visit_binding(
        &mut self,
        pool: &mut ItemPool,
        state: &FileState,
        item: ItemId,
        ast: &BindingAst,
    ) -> Result<()> {
        let last_span = ast.name.last().expect("qualified id is never empty");

        if ast.name.len() == 1 && last_span.text() == "id" {
            let Expr::Var { span } = ast.value.as_ref() else {
                return Err(last_span
                    .error(ErrorKind::Parse, "id: must be followed by identifier"));
            };
            let id_name = span.text().to_string();
            pool.get_mut(item).id_name = id_name.clone();
            state.ctx.ids.borrow_mut().insert(id_name, item);
            return Ok(());
        }

        let sv = SourceValue::new(
            ast.value.clone(),
            state.ctx.clone(),
            ast.value.span().location(),
        );
        let target = self.target_item_for_binding(pool, state, item, &ast.name)?;

        let name = last_span.text();
        if pool.get(target).own_property(name).is_some() {
            let joined = ast
                .name
                .iter()
                .map(Span::text)
                .collect::<Vec<_>>()
                .join(".");
            return Err(last_span.error(
                ErrorKind::DuplicateBinding,
                &format!("duplicate binding for '{joined}'"),
            ));
        }
        pool.get_mut(target)
            .set_property(name, PropValue::Source(Rc::new(sv)));
        Ok(())
    }

    /// Walk (creating as needed) the nested items a qualified binding like
    /// `cpp.defines` targets.
    fn target_item_for_binding(
        &mut self,
        pool: &mut ItemPool,
        state: &FileState,
        item: ItemId,
        name: &[Span],
    ) -> Result<ItemId> {
        let mut target = item;
        for comp in &name[..name.len() - 1] {
            let comp_name = comp.text();
            match pool.get(target).own_property(comp_name) {
                None => {
                    let sub = pool.create(ItemType::ModulePrefix);
                    pool.get_mut(sub).file = Some(state.ctx.clone());
                    pool.get_mut(sub).location = Some(comp.location());
                    pool.get_mut(target)
                        .set_property(comp_name, PropValue::Item(sub));
                    target = sub;
                }
                Some(PropValue::Item(sub)) => {
                    target = *sub;
                }
                Some(_) => {
                    return Err(comp.error(ErrorKind::Parse, "binding to non-item property"));
                }
            }
        }
        Ok(target)
    }

    /// Convert `Properties` child blocks into conditional alternatives on
    /// the containing item's values and drop the blocks from the tree.
    fn setup_alternatives(&mut self, pool: &mut ItemPool, item: ItemId) -> Result<()> {
        let children = pool.get(item).children().to_vec();
        let mut kept = vec![];
        for child in children {
            if pool.get(child).item_type() == ItemType::Properties {
                self.convert_properties_block(pool, item, child)?;
            } else {
                kept.push(child);
            }
        }
        pool.get_mut(item).children = kept;
        Ok(())
    }

    fn convert_properties_block(
        &mut self,
        pool: &mut ItemPool,
        container: ItemId,
        block: ItemId,
    ) -> Result<()> {
        let condition = match pool.get(block).own_property("condition") {
            Some(PropValue::Source(sv)) => sv.expr.clone(),
            Some(_) => {
                return Err(Error::new(
                    ErrorKind::Parse,
                    "Properties.condition must be a value binding",
                ))
            }
            None => {
                let msg = "Properties.condition must be provided".to_string();
                return Err(match pool.get(block).location() {
                    Some(loc) => Error::at(ErrorKind::Parse, msg, loc.clone()),
                    None => Error::new(ErrorKind::Parse, msg),
                });
            }
        };
        self.apply_properties_block(pool, container, block, container, &condition, true)
    }

    fn apply_properties_block(
        &mut self,
        pool: &mut ItemPool,
        condition_scope: ItemId,
        block: ItemId,
        target: ItemId,
        condition: &ExprRef,
        top: bool,
    ) -> Result<()> {
        let props = pool.get(block).properties().clone();
        for (name, value) in props {
            if top && name == "condition" {
                continue;
            }
            match value {
                PropValue::Source(sv) => {
                    self.apply_alternative(pool, condition_scope, target, &name, condition, sv)?;
                }
                PropValue::Item(sub_block) => {
                    // A qualified value inside the block lands on the
                    // container's matching nested item.
                    let sub_target = match pool.get(target).own_property(&name) {
                        Some(PropValue::Item(sub)) => *sub,
                        _ => {
                            let file = pool.get(sub_block).file().cloned();
                            let sub = pool.create(ItemType::ModulePrefix);
                            pool.get_mut(sub).file = file;
                            pool.get_mut(target)
                                .set_property(name.clone(), PropValue::Item(sub));
                            sub
                        }
                    };
                    self.apply_properties_block(
                        pool,
                        condition_scope,
                        sub_block,
                        sub_target,
                        condition,
                        false,
                    )?;
                }
                PropValue::Variant(_) => {}
            }
        }
        Ok(())
    }

    fn apply_alternative(
        &mut self,
        pool: &mut ItemPool,
        condition_scope: ItemId,
        target: ItemId,
        name: &str,
        condition: &ExprRef,
        value: Rc<SourceValue>,
    ) -> Result<()> {
        let alternative = Alternative {
            condition: condition.clone(),
            condition_scope,
            value: value.clone(),
        };
        let new_value = match pool.get(target).own_property(name) {
            Some(PropValue::Source(existing)) => {
                let mut sv = (**existing).clone();
                sv.alternatives.push(alternative);
                sv
            }
            Some(_) => {
                return Err(Error::at(
                    ErrorKind::Parse,
                    "incompatible value type in unconditional value",
                    value.location.clone(),
                ));
            }
            None => {
                // No unconditional value; fall back to undefined.
                let mut sv = SourceValue::new(
                    self.undefined_expr.clone(),
                    value.file.clone(),
                    value.location.clone(),
                );
                sv.alternatives.push(alternative);
                sv
            }
        };
        pool.get_mut(target)
            .set_property(name, PropValue::Source(Rc::new(new_value)));
        Ok(())
    }

    /// Link a derived item to its file prototype: the prototype chain
    /// carries properties and declarations, the prototype's children are
    /// cloned in front of the derived item's own.
    fn inherit_item(&mut self, pool: &mut ItemPool, dst: ItemId, proto_root: ItemId) {
        let proto_type = pool.get(proto_root).item_type();
        pool.get_mut(dst).item_type = proto_type;
        pool.get_mut(dst).set_prototype(proto_root);

        let base_children = pool.get(proto_root).children().to_vec();
        let mut new_children = Vec::with_capacity(base_children.len());
        for child in base_children {
            let cloned = pool.clone_subtree(child);
            pool.get_mut(cloned).parent = Some(dst);
            new_children.push(cloned);
        }
        new_children.extend(pool.get(dst).children().iter().copied());
        pool.get_mut(dst).children = new_children;

        // Nested item values merge by chaining, so `cpp.x` here and
        // `cpp.y` in the prototype both stay visible.
        let proto_props = pool.get(proto_root).properties().clone();
        for (name, value) in proto_props {
            if let PropValue::Item(proto_sub) = value {
                if let Some(PropValue::Item(dst_sub)) =
                    pool.get(dst).own_property(&name).cloned()
                {
                    pool.get_mut(dst_sub).set_prototype(proto_sub);
                }
            }
        }
    }
}

/// Apply the deprecation policy to every item in the pool: used item types
/// and explicitly bound properties with deprecation metadata.
pub fn check_deprecation(
    pool: &ItemPool,
    builtins: &BuiltinDeclarations,
    mode: DeprecationWarningMode,
) -> Result<()> {
    if mode == DeprecationWarningMode::Off {
        return Ok(());
    }

    for (_, item) in pool.iter() {
        if let Some(info) = builtins.type_deprecation(item.item_type()) {
            builtins.check_deprecation(item.item_type().name(), info, item.location(), mode)?;
        }

        for (name, value) in item.properties() {
            let decl = item
                .declarations()
                .get(name)
                .or_else(|| builtins.declarations_for_type(item.item_type()).get(name));
            let Some(decl) = decl else {
                continue;
            };
            if let Some(info) = &decl.deprecation {
                let location = match value {
                    PropValue::Source(sv) => Some(&sv.location),
                    _ => item.location(),
                };
                builtins.check_deprecation(
                    &format!("{}.{}", item.item_type().name(), name),
                    info,
                    location,
                    mode,
                )?;
            }
        }
    }
    Ok(())
}
