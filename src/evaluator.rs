use crate::ast::{BinOp, Expr, ExprRef, UnaryOp};
use crate::declarations::{BuiltinDeclarations, PropertyDeclaration, PropertyType};
use crate::error::{ErrorKind, Result};
use crate::item::{FileContextRef, ItemId, ItemPool, ItemType, PropValue, SourceValue};
use crate::lexer::Span;
use crate::reader::parse_standalone_expression;
use crate::value::{Number, Value};

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// What an identifier or member path resolves to before it is demanded as
/// a plain value.
enum Target {
    Value(Value),
    Item(ItemId),
    /// A built-in extension object, e.g. `FileInfo`.
    Extension(String),
    /// A function of a built-in extension, e.g. `FileInfo.fileName`.
    ExtensionFn(String, String),
    /// A method on a plain value, e.g. `list.concat`.
    Method(Value, String),
}

struct EvalContext {
    /// The item instance the property is being evaluated for.
    item: ItemId,
    /// The file the expression was written in; carries ids, extension
    /// imports and the directory for path resolution.
    file: Option<FileContextRef>,
    /// `base`/`outer` bindings, present only when the source uses them.
    extra: Vec<(&'static str, Value)>,
    /// Whether the binding was found on a prototype of `item`.
    in_prototype: bool,
}

/// Lazy, memoizing property evaluator with explicit scope-chain identifier
/// resolution. Holds per-(item, property) caches for one resolution pass.
pub struct Evaluator<'a> {
    pool: &'a ItemPool,
    builtins: &'a BuiltinDeclarations,
    cache: RefCell<HashMap<(ItemId, String), Value>>,
    in_progress: RefCell<HashSet<(ItemId, String)>>,
    evaluations: Cell<u64>,
    default_exprs: RefCell<HashMap<&'static str, ExprRef>>,
}

impl<'a> Evaluator<'a> {
    pub fn new(pool: &'a ItemPool, builtins: &'a BuiltinDeclarations) -> Self {
        Self {
            pool,
            builtins,
            cache: RefCell::new(HashMap::new()),
            in_progress: RefCell::new(HashSet::new()),
            evaluations: Cell::new(0),
            default_exprs: RefCell::new(HashMap::new()),
        }
    }

    /// How many source expressions have been run. With memoization each
    /// binding runs at most once per item instance, however often it is
    /// read.
    pub fn evaluation_count(&self) -> u64 {
        self.evaluations.get()
    }

    /// The value of `name` on `item`: the item's own binding, a prototype's
    /// binding, or the declaration's default; `Undefined` when none exists.
    /// Direct reads do not consult the enclosing scope chain; that chain
    /// only serves identifiers inside expressions.
    pub fn property(&self, item: ItemId, name: &str) -> Result<Value> {
        let key = (item, name.to_string());
        if let Some(v) = self.cache.borrow().get(&key) {
            return Ok(v.clone());
        }

        if !self.in_progress.borrow_mut().insert(key.clone()) {
            return Err(crate::error::Error::new(
                ErrorKind::Evaluation,
                format!("property '{name}' depends on its own value"),
            ));
        }
        let result = self.property_uncached(item, name);
        self.in_progress.borrow_mut().remove(&key);

        let value = result?;
        self.cache.borrow_mut().insert(key, value.clone());
        Ok(value)
    }

    fn property_uncached(&self, item: ItemId, name: &str) -> Result<Value> {
        let binding = self.pool.find_property(item, name)?;
        let (value, value_file) = match binding {
            Some((found_on, PropValue::Source(sv))) => {
                let in_prototype = found_on != item;
                let v = self.eval_source_value(item, found_on, name, &sv, in_prototype, true)?;
                (v, Some(sv.file.clone()))
            }
            Some((_, PropValue::Variant(v))) => (v, None),
            Some((_, PropValue::Item(_))) => {
                // Nested items are addressed through member access, not as
                // plain values.
                return Ok(Value::Undefined);
            }
            None => match self.declaration_for(item, name) {
                Some(decl) => match decl.initial_value {
                    Some(source) => {
                        let expr = self.default_expr(source)?;
                        let ctx = EvalContext {
                            item,
                            file: self.pool.get(item).file().cloned(),
                            extra: vec![],
                            in_prototype: true,
                        };
                        self.evaluations.set(self.evaluations.get() + 1);
                        let v = self.eval_expr(&ctx, &expr)?;
                        (v, self.pool.get(item).file().cloned())
                    }
                    None => return Ok(Value::Undefined),
                },
                None => return Ok(Value::Undefined),
            },
        };

        self.convert_to_property_type(item, name, value, value_file.as_ref())
    }

    /// Like [`Evaluator::property`], but without declared-type conversion;
    /// used where the caller combines raw pieces itself (e.g. group file
    /// prefixes). Not cached.
    pub fn raw_property(&self, item: ItemId, name: &str) -> Result<Value> {
        let key = (item, name.to_string());
        if !self.in_progress.borrow_mut().insert(key.clone()) {
            return Err(crate::error::Error::new(
                ErrorKind::Evaluation,
                format!("property '{name}' depends on its own value"),
            ));
        }
        let result = (|| match self.pool.find_property(item, name)? {
            Some((found_on, PropValue::Source(sv))) => {
                let in_prototype = found_on != item;
                self.eval_source_value(item, found_on, name, &sv, in_prototype, true)
            }
            Some((_, PropValue::Variant(v))) => Ok(v),
            Some((_, PropValue::Item(_))) | None => Ok(Value::Undefined),
        })();
        self.in_progress.borrow_mut().remove(&key);
        result
    }

    /// Typed convenience getters in the spirit of the item's declared types.
    pub fn bool_value(&self, item: ItemId, name: &str, default: bool) -> Result<bool> {
        match self.property(item, name)? {
            Value::Undefined => Ok(default),
            v => Ok(v.truthy()),
        }
    }

    pub fn string_value(&self, item: ItemId, name: &str) -> Result<Option<String>> {
        match self.property(item, name)? {
            Value::Undefined => Ok(None),
            Value::String(s) => Ok(Some(s.to_string())),
            v => Ok(Some(v.to_display_string())),
        }
    }

    pub fn string_list_value(&self, item: ItemId, name: &str) -> Result<Option<Vec<String>>> {
        match self.property(item, name)? {
            Value::Undefined => Ok(None),
            Value::List(items) => Ok(Some(
                items.iter().map(Value::to_display_string).collect(),
            )),
            v => Ok(Some(vec![v.to_display_string()])),
        }
    }

    fn default_expr(&self, source: &'static str) -> Result<ExprRef> {
        if let Some(e) = self.default_exprs.borrow().get(source) {
            return Ok(e.clone());
        }
        let expr = parse_standalone_expression("<default>", source)?;
        self.default_exprs
            .borrow_mut()
            .insert(source, expr.clone());
        Ok(expr)
    }

    fn declaration_for(&self, item: ItemId, name: &str) -> Option<PropertyDeclaration> {
        if let Some(d) = self.pool.find_declaration(item, name) {
            return Some(d.clone());
        }
        self.builtins
            .declarations_for_type(self.pool.get(item).item_type())
            .get(name)
            .cloned()
    }

    /// Evaluate one source value for `instance`, honoring `Properties`
    /// alternatives and the `base`/`outer` pseudo-values.
    fn eval_source_value(
        &self,
        instance: ItemId,
        found_on: ItemId,
        name: &str,
        sv: &Rc<SourceValue>,
        in_prototype: bool,
        use_alternatives: bool,
    ) -> Result<Value> {
        let mut chosen: Option<Rc<SourceValue>> = None;
        if use_alternatives {
            for alt in &sv.alternatives {
                let ctx = EvalContext {
                    item: instance,
                    file: Some(alt.value.file.clone()),
                    extra: vec![],
                    in_prototype,
                };
                self.evaluations.set(self.evaluations.get() + 1);
                if self.eval_expr(&ctx, &alt.condition)?.truthy() {
                    chosen = Some(alt.value.clone());
                    break;
                }
            }
        }

        let value = chosen.as_ref().unwrap_or(sv);
        let mut extra: Vec<(&'static str, Value)> = vec![];

        if value.uses_base {
            let base = self.base_value(instance, found_on, name)?;
            extra.push(("base", undefined_to_empty_list(base.unwrap_or(Value::Undefined))));
        }
        if value.uses_outer {
            let outer = if chosen.is_some() {
                // Inside an alternative, `outer` is the unconditional value.
                Some(self.eval_source_value(instance, found_on, name, sv, in_prototype, false)?)
            } else if let Some(outer_item) = self.pool.get(instance).outer_item() {
                Some(self.property(outer_item, name)?)
            } else {
                None
            };
            if let Some(v) = outer {
                extra.push(("outer", undefined_to_empty_list(v)));
            }
        }

        let ctx = EvalContext {
            item: instance,
            file: Some(value.file.clone()),
            extra,
            in_prototype,
        };
        self.evaluations.set(self.evaluations.get() + 1);
        self.eval_expr(&ctx, &value.expr)
    }

    /// The next value of `name` further along the prototype chain, for
    /// `base`. `None` when nothing up the chain binds the property.
    fn base_value(&self, instance: ItemId, found_on: ItemId, name: &str) -> Result<Option<Value>> {
        let Some(proto) = self.pool.get(found_on).prototype() else {
            return Ok(None);
        };
        match self.pool.find_property(proto, name)? {
            Some((on, PropValue::Source(sv))) => Ok(Some(
                self.eval_source_value(instance, on, name, &sv, true, true)?,
            )),
            Some((_, PropValue::Variant(v))) => Ok(Some(v)),
            Some((_, PropValue::Item(_))) | None => Ok(None),
        }
    }

    fn eval_expr(&self, ctx: &EvalContext, expr: &ExprRef) -> Result<Value> {
        match expr.as_ref() {
            Expr::Null { .. } => Ok(Value::Null),
            Expr::Bool { value, .. } => Ok(Value::Bool(*value)),
            Expr::Number { value, .. } => Ok(Value::Number(*value)),
            Expr::String { value, .. } => Ok(Value::String(value.clone())),
            Expr::List { items, .. } => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval_expr(ctx, item)?);
                }
                Ok(Value::from(out))
            }
            Expr::Var { span } => self.target_to_value(self.resolve_ident(ctx, span)?, span),
            Expr::Member { span, .. } | Expr::Index { span, .. } => {
                let target = self.resolve_target(ctx, expr)?;
                self.target_to_value(target, span)
            }
            Expr::Call { span, callee, args } => {
                let mut arg_values = Vec::with_capacity(args.len());
                for arg in args {
                    arg_values.push(self.eval_expr(ctx, arg)?);
                }
                match self.resolve_target(ctx, callee)? {
                    Target::ExtensionFn(ext, fcn) => {
                        crate::extensions::call(&ext, &fcn, &arg_values)
                            .map_err(|msg| span.error(ErrorKind::Evaluation, &msg))
                    }
                    Target::Method(value, method) => {
                        call_value_method(&value, &method, &arg_values, span)
                    }
                    _ => Err(span.error(ErrorKind::Evaluation, "expression is not callable")),
                }
            }
            Expr::Unary { span, op, expr } => {
                let v = self.eval_expr(ctx, expr)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!v.truthy())),
                    UnaryOp::Neg => match v {
                        Value::Number(Number::Int(i)) => Ok(Value::from(-i)),
                        Value::Number(Number::Float(f)) => Ok(Value::from(-f)),
                        _ => Err(span.error(ErrorKind::Type, "cannot negate a non-number")),
                    },
                }
            }
            Expr::Binary { span, op, lhs, rhs } => self.eval_binary(ctx, span, *op, lhs, rhs),
            Expr::Cond {
                cond,
                then_expr,
                else_expr,
                ..
            } => {
                if self.eval_expr(ctx, cond)?.truthy() {
                    self.eval_expr(ctx, then_expr)
                } else {
                    self.eval_expr(ctx, else_expr)
                }
            }
        }
    }

    fn eval_binary(
        &self,
        ctx: &EvalContext,
        span: &Span,
        op: BinOp,
        lhs: &ExprRef,
        rhs: &ExprRef,
    ) -> Result<Value> {
        // && and || short-circuit and yield the deciding operand, so
        // `x || []` works as a default.
        if op == BinOp::And {
            let l = self.eval_expr(ctx, lhs)?;
            return if l.truthy() { self.eval_expr(ctx, rhs) } else { Ok(l) };
        }
        if op == BinOp::Or {
            let l = self.eval_expr(ctx, lhs)?;
            return if l.truthy() { Ok(l) } else { self.eval_expr(ctx, rhs) };
        }

        let l = self.eval_expr(ctx, lhs)?;
        let r = self.eval_expr(ctx, rhs)?;
        match op {
            BinOp::Add => match (&l, &r) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a.add(b))),
                (Value::String(_), _) | (_, Value::String(_)) => Ok(Value::from(format!(
                    "{}{}",
                    l.to_display_string(),
                    r.to_display_string()
                ))),
                _ => Err(span.error(ErrorKind::Type, "invalid operands to `+`")),
            },
            BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
                let (Value::Number(a), Value::Number(b)) = (&l, &r) else {
                    return Err(span.error(ErrorKind::Type, "arithmetic on non-numbers"));
                };
                let n = match op {
                    BinOp::Sub => a.sub(b),
                    BinOp::Mul => a.mul(b),
                    BinOp::Div => a.div(b),
                    BinOp::Mod => a
                        .rem(b)
                        .ok_or_else(|| span.error(ErrorKind::Evaluation, "modulo by zero"))?,
                    _ => unreachable!(),
                };
                Ok(Value::Number(n))
            }
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let ord = match (&l, &r) {
                    (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                    (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                    _ => None,
                };
                let Some(ord) = ord else {
                    return Err(span.error(ErrorKind::Type, "invalid operands to comparison"));
                };
                let result = match op {
                    BinOp::Lt => ord.is_lt(),
                    BinOp::Le => ord.is_le(),
                    BinOp::Gt => ord.is_gt(),
                    BinOp::Ge => ord.is_ge(),
                    _ => unreachable!(),
                };
                Ok(Value::Bool(result))
            }
            BinOp::Eq => Ok(Value::Bool(l == r)),
            BinOp::Ne => Ok(Value::Bool(l != r)),
            BinOp::And | BinOp::Or => unreachable!(),
        }
    }

    /// Resolve a member/index/identifier path without forcing intermediate
    /// items into plain values.
    fn resolve_target(&self, ctx: &EvalContext, expr: &ExprRef) -> Result<Target> {
        match expr.as_ref() {
            Expr::Var { span } => self.resolve_ident(ctx, span),
            Expr::Member {
                span,
                object,
                field,
            } => {
                let object = self.resolve_target(ctx, object)?;
                match object {
                    Target::Item(id) => match self.pool.find_property(id, field.text())? {
                        Some((_, PropValue::Item(sub))) => Ok(Target::Item(sub)),
                        _ => Ok(Target::Value(self.property(id, field.text())?)),
                    },
                    Target::Value(v) => self.value_member(v, field),
                    Target::Extension(ext) => {
                        let name = field.text().to_string();
                        Ok(Target::ExtensionFn(ext, name))
                    }
                    Target::ExtensionFn(ext, fcn) => Err(span.error(
                        ErrorKind::Evaluation,
                        &format!("`{ext}.{fcn}` has no members"),
                    )),
                    Target::Method(..) => {
                        Err(span.error(ErrorKind::Evaluation, "method has no members"))
                    }
                }
            }
            Expr::Index {
                span,
                object,
                index,
            } => {
                let object = match self.resolve_target(ctx, object)? {
                    Target::Value(v) => v,
                    _ => {
                        return Err(
                            span.error(ErrorKind::Evaluation, "cannot index into this expression")
                        )
                    }
                };
                let index = self.eval_expr(ctx, index)?;
                let result = match (&object, &index) {
                    (Value::List(items), Value::Number(n)) => match n.as_i64() {
                        Some(i) if i >= 0 && (i as usize) < items.len() => {
                            items[i as usize].clone()
                        }
                        _ => Value::Undefined,
                    },
                    (Value::Object(map), Value::String(key)) => {
                        map.get(key.as_ref()).cloned().unwrap_or(Value::Undefined)
                    }
                    _ => {
                        return Err(span.error(ErrorKind::Type, "invalid index expression"));
                    }
                };
                Ok(Target::Value(result))
            }
            _ => Ok(Target::Value(self.eval_expr(ctx, expr)?)),
        }
    }

    fn value_member(&self, value: Value, field: &Span) -> Result<Target> {
        let name = field.text();
        match &value {
            Value::Undefined => Err(field.error(
                ErrorKind::Evaluation,
                &format!("cannot read property '{name}' of undefined"),
            )),
            Value::Object(map) => Ok(Target::Value(
                map.get(name).cloned().unwrap_or(Value::Undefined),
            )),
            Value::List(items) => match name {
                "length" => Ok(Target::Value(Value::from(items.len() as i64))),
                "concat" | "contains" | "join" => {
                    Ok(Target::Method(value.clone(), name.to_string()))
                }
                _ => Ok(Target::Value(Value::Undefined)),
            },
            Value::String(s) => match name {
                "length" => Ok(Target::Value(Value::from(s.chars().count() as i64))),
                "toUpperCase" | "toLowerCase" | "startsWith" | "endsWith" => {
                    Ok(Target::Method(value.clone(), name.to_string()))
                }
                _ => Ok(Target::Value(Value::Undefined)),
            },
            _ => Ok(Target::Value(Value::Undefined)),
        }
    }

    fn target_to_value(&self, target: Target, span: &Span) -> Result<Value> {
        match target {
            Target::Value(v) => Ok(v),
            Target::Item(_) => Err(span.error(
                ErrorKind::Evaluation,
                &format!("'{}' is an item, not a value", span.text()),
            )),
            Target::Extension(name) => Err(span.error(
                ErrorKind::Evaluation,
                &format!("extension '{name}' cannot be used as a value"),
            )),
            Target::ExtensionFn(ext, fcn) => Err(span.error(
                ErrorKind::Evaluation,
                &format!("`{ext}.{fcn}` must be called"),
            )),
            Target::Method(_, name) => Err(span.error(
                ErrorKind::Evaluation,
                &format!("`{name}` must be called"),
            )),
        }
    }

    /// The scope walk for an unqualified identifier, innermost first:
    /// `base`/`outer`, the item itself (except own properties of module
    /// instances), the transitive scope chain, the lexical parent, the
    /// `parent`/`product`/`project` pseudo-identifiers, then the file scope
    /// (ids, imported extensions, script-import aliases).
    fn resolve_ident(&self, ctx: &EvalContext, span: &Span) -> Result<Target> {
        let name = span.text();

        if name == "undefined" {
            return Ok(Target::Value(Value::Undefined));
        }
        for (extra_name, value) in &ctx.extra {
            if *extra_name == name {
                return Ok(Target::Value(value.clone()));
            }
        }
        if name == "parent" {
            return Ok(match self.pool.get(ctx.item).parent() {
                Some(p) => Target::Item(p),
                None => Target::Value(Value::Undefined),
            });
        }
        if name == "product" {
            if let Some(p) = self.find_special(ctx.item, ItemType::Product) {
                return Ok(Target::Item(p));
            }
        }
        if name == "project" {
            if let Some(p) = self.find_special(ctx.item, ItemType::Project) {
                return Ok(Target::Item(p));
            }
        }

        // Scope chain.
        let item = self.pool.get(ctx.item);
        let include_self = ctx.in_prototype || !item.is_module_instance();
        let mut scope = if include_self {
            Some(ctx.item)
        } else {
            item.scope()
        };
        while let Some(scope_item) = scope {
            if let Some((_, pv)) = self.pool.find_property(scope_item, name)? {
                return Ok(match pv {
                    PropValue::Item(sub) => Target::Item(sub),
                    _ => Target::Value(self.property(scope_item, name)?),
                });
            }
            scope = self.pool.get(scope_item).scope();
        }

        // One level of lexical parent, for sibling properties of the
        // containing item.
        if let Some(parent) = item.parent() {
            if let Some((_, pv)) = self.pool.find_property(parent, name)? {
                return Ok(match pv {
                    PropValue::Item(sub) => Target::Item(sub),
                    _ => Target::Value(self.property(parent, name)?),
                });
            }
        }

        // File scope.
        if let Some(file) = &ctx.file {
            if let Some(target) = file.ids.borrow().get(name) {
                return Ok(Target::Item(*target));
            }
            if file.extensions.iter().any(|e| e == name) {
                return Ok(Target::Extension(name.to_string()));
            }
            if file.script_imports.iter().any(|si| si.scope_name == name) {
                return Err(span.error(
                    ErrorKind::UndefinedProperty,
                    &format!("script module '{name}' is not available during project resolution"),
                ));
            }
        }

        Err(span.error(
            ErrorKind::UndefinedProperty,
            &format!("'{name}' is not defined"),
        ))
    }

    fn find_special(&self, start: ItemId, wanted: ItemType) -> Option<ItemId> {
        let mut cur = Some(start);
        while let Some(id) = cur {
            if let Some(found) = self.pool.find_ancestor_of_type(id, wanted) {
                return Some(found);
            }
            cur = self.pool.get(id).scope();
        }
        None
    }

    /// Coerce an evaluated value to its declared type; scalars become
    /// one-element lists for list types, relative paths resolve against the
    /// defining file's directory.
    fn convert_to_property_type(
        &self,
        item: ItemId,
        name: &str,
        value: Value,
        file: Option<&FileContextRef>,
    ) -> Result<Value> {
        if value.is_undefined() {
            return Ok(value);
        }
        let Some(decl) = self.declaration_for(item, name) else {
            return Ok(value);
        };

        let resolve_path = |s: String| -> String {
            match file {
                Some(f) if !std::path::Path::new(&s).is_absolute() => {
                    f.dir_path.join(&s).to_string_lossy().into_owned()
                }
                _ => s,
            }
        };

        let converted = match decl.property_type {
            PropertyType::Variant | PropertyType::Verbatim => value,
            PropertyType::Boolean => match value {
                Value::Bool(_) => value,
                v => Value::Bool(v.truthy()),
            },
            PropertyType::Integer => match value {
                Value::Number(_) => value,
                v => {
                    return Err(crate::error::Error::new(
                        ErrorKind::Type,
                        format!("value '{}' for property '{name}' is not a number", v),
                    ))
                }
            },
            PropertyType::String => match value {
                Value::String(_) => value,
                v => Value::from(v.to_display_string()),
            },
            PropertyType::Path => Value::from(resolve_path(value.to_display_string())),
            PropertyType::StringList | PropertyType::PathList => {
                let items = match value {
                    Value::List(items) => items.as_ref().clone(),
                    v => vec![v],
                };
                let mut out = Vec::with_capacity(items.len());
                for v in items {
                    if v.is_undefined() || v.is_null() {
                        continue;
                    }
                    let s = v.to_display_string();
                    out.push(Value::from(if decl.property_type == PropertyType::PathList {
                        resolve_path(s)
                    } else {
                        s
                    }));
                }
                Value::from(out)
            }
        };
        Ok(converted)
    }
}

fn undefined_to_empty_list(v: Value) -> Value {
    if v.is_undefined() {
        Value::new_list()
    } else {
        v
    }
}

fn call_value_method(value: &Value, method: &str, args: &[Value], span: &Span) -> Result<Value> {
    match (value, method) {
        (Value::List(items), "concat") => {
            let mut out = items.as_ref().clone();
            for arg in args {
                match arg {
                    Value::List(more) => out.extend(more.iter().cloned()),
                    v => out.push(v.clone()),
                }
            }
            Ok(Value::from(out))
        }
        (Value::List(items), "contains") => {
            let needle = args
                .first()
                .ok_or_else(|| span.error(ErrorKind::Evaluation, "contains expects an argument"))?;
            Ok(Value::Bool(items.iter().any(|v| v == needle)))
        }
        (Value::List(items), "join") => {
            let sep = match args.first() {
                Some(Value::String(s)) => s.to_string(),
                Some(v) => v.to_display_string(),
                None => ",".to_string(),
            };
            Ok(Value::from(
                items
                    .iter()
                    .map(Value::to_display_string)
                    .collect::<Vec<_>>()
                    .join(&sep),
            ))
        }
        (Value::String(s), "toUpperCase") => Ok(Value::from(s.to_uppercase())),
        (Value::String(s), "toLowerCase") => Ok(Value::from(s.to_lowercase())),
        (Value::String(s), "startsWith") => {
            let prefix = match args.first() {
                Some(Value::String(p)) => p.to_string(),
                _ => return Err(span.error(ErrorKind::Evaluation, "startsWith expects a string")),
            };
            Ok(Value::Bool(s.starts_with(&prefix)))
        }
        (Value::String(s), "endsWith") => {
            let suffix = match args.first() {
                Some(Value::String(p)) => p.to_string(),
                _ => return Err(span.error(ErrorKind::Evaluation, "endsWith expects a string")),
            };
            Ok(Value::Bool(s.ends_with(&suffix)))
        }
        _ => Err(span.error(
            ErrorKind::Evaluation,
            &format!("no method `{method}` on this value"),
        )),
    }
}
