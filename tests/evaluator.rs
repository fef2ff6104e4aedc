use brix::unstable::{Parser, Source};
use brix::{
    BuiltinDeclarations, CodeLocation, ErrorKind, Evaluator, FileContext, FileContextRef,
    ItemPool, ItemType, PropValue, SourceValue, Value,
};

use std::path::PathBuf;
use std::rc::Rc;

/// Builds unevaluated bindings from source text, the way the reader does.
struct SourceValueCreator {
    file: FileContextRef,
}

impl SourceValueCreator {
    fn new() -> Self {
        Self {
            file: FileContext::new("test.brix", PathBuf::new(), vec![], vec![]),
        }
    }

    fn create(&self, code: &str) -> PropValue {
        let source = Source::from_contents("test.brix", code.to_string()).unwrap();
        let expr = Parser::new(&source).unwrap().parse_expression().unwrap();
        PropValue::Source(Rc::new(SourceValue::new(
            expr,
            self.file.clone(),
            CodeLocation::new("test.brix", 1, 1),
        )))
    }
}

fn int(v: i64) -> Value {
    Value::from(v)
}

#[test]
fn item_prototype() {
    let creator = SourceValueCreator::new();
    let mut pool = ItemPool::new();

    let proto = pool.create(ItemType::ModulePrefix);
    pool.get_mut(proto).set_property("x", creator.create("1"));
    pool.get_mut(proto).set_property("y", creator.create("1"));

    let item = pool.create(ItemType::ModulePrefix);
    pool.get_mut(item).set_prototype(proto);
    pool.get_mut(item).set_property("y", creator.create("x + 1"));
    pool.get_mut(item).set_property("z", creator.create("2"));

    let builtins = BuiltinDeclarations::new();
    let evaluator = Evaluator::new(&pool, &builtins);

    assert_eq!(evaluator.property(proto, "x").unwrap(), int(1));
    assert_eq!(evaluator.property(proto, "y").unwrap(), int(1));
    assert!(evaluator.property(proto, "z").unwrap().is_undefined());
    assert_eq!(evaluator.property(item, "x").unwrap(), int(1));
    assert_eq!(evaluator.property(item, "y").unwrap(), int(2));
    assert_eq!(evaluator.property(item, "z").unwrap(), int(2));
}

#[test]
fn item_scope() {
    let creator = SourceValueCreator::new();
    let mut pool = ItemPool::new();

    let scope1 = pool.create(ItemType::ModulePrefix);
    pool.get_mut(scope1).set_property("x", creator.create("1"));

    let scope2 = pool.create(ItemType::ModulePrefix);
    pool.get_mut(scope2).set_scope(scope1);
    pool.get_mut(scope2).set_property("y", creator.create("x + 1"));

    let item = pool.create(ItemType::ModulePrefix);
    pool.get_mut(item).set_scope(scope2);
    pool.get_mut(item).set_property("z", creator.create("x + y"));

    let builtins = BuiltinDeclarations::new();
    let evaluator = Evaluator::new(&pool, &builtins);

    assert_eq!(evaluator.property(scope1, "x").unwrap(), int(1));
    assert_eq!(evaluator.property(scope2, "y").unwrap(), int(2));
    // The scope chain serves identifiers inside expressions, not direct
    // property reads.
    assert!(evaluator.property(scope2, "x").unwrap().is_undefined());
    assert_eq!(evaluator.property(item, "z").unwrap(), int(3));
}

#[test]
fn evaluation_happens_once_per_property() {
    let creator = SourceValueCreator::new();
    let mut pool = ItemPool::new();

    let item = pool.create(ItemType::ModulePrefix);
    pool.get_mut(item).set_property("x", creator.create("1 + 2"));

    let builtins = BuiltinDeclarations::new();
    let evaluator = Evaluator::new(&pool, &builtins);

    assert_eq!(evaluator.evaluation_count(), 0);
    assert_eq!(evaluator.property(item, "x").unwrap(), int(3));
    let after_first = evaluator.evaluation_count();
    assert_eq!(after_first, 1);

    // Repeated reads hit the cache; the expression never runs again.
    for _ in 0..10 {
        assert_eq!(evaluator.property(item, "x").unwrap(), int(3));
    }
    assert_eq!(evaluator.evaluation_count(), after_first);
}

#[test]
fn memoization_is_per_instance() {
    let creator = SourceValueCreator::new();
    let mut pool = ItemPool::new();

    let proto = pool.create(ItemType::ModulePrefix);
    pool.get_mut(proto).set_property("x", creator.create("40 + 2"));
    let a = pool.create(ItemType::ModulePrefix);
    pool.get_mut(a).set_prototype(proto);
    let b = pool.create(ItemType::ModulePrefix);
    pool.get_mut(b).set_prototype(proto);

    let builtins = BuiltinDeclarations::new();
    let evaluator = Evaluator::new(&pool, &builtins);

    assert_eq!(evaluator.property(a, "x").unwrap(), int(42));
    assert_eq!(evaluator.property(b, "x").unwrap(), int(42));
    assert_eq!(evaluator.property(a, "x").unwrap(), int(42));
    // One evaluation per instance; the binding itself is shared.
    assert_eq!(evaluator.evaluation_count(), 2);
}

#[test]
fn undefined_identifier_fails() {
    let creator = SourceValueCreator::new();
    let mut pool = ItemPool::new();

    let item = pool.create(ItemType::ModulePrefix);
    pool.get_mut(item)
        .set_property("x", creator.create("nosuchthing + 1"));

    let builtins = BuiltinDeclarations::new();
    let evaluator = Evaluator::new(&pool, &builtins);

    let err = evaluator.property(item, "x").unwrap_err();
    assert_eq!(err.kind, ErrorKind::UndefinedProperty);
    assert!(err.message.contains("nosuchthing"));
}

#[test]
fn base_appends_to_prototype_value() {
    let creator = SourceValueCreator::new();
    let mut pool = ItemPool::new();

    let proto = pool.create(ItemType::ModulePrefix);
    pool.get_mut(proto)
        .set_property("defines", creator.create(r#"["A"]"#));

    let item = pool.create(ItemType::ModulePrefix);
    pool.get_mut(item).set_prototype(proto);
    pool.get_mut(item)
        .set_property("defines", creator.create(r#"base.concat(["B"])"#));

    let builtins = BuiltinDeclarations::new();
    let evaluator = Evaluator::new(&pool, &builtins);

    assert_eq!(
        evaluator.property(item, "defines").unwrap(),
        Value::from(vec![Value::from("A"), Value::from("B")])
    );
}

#[test]
fn outer_refers_to_the_outer_item() {
    let creator = SourceValueCreator::new();
    let mut pool = ItemPool::new();

    let product_level = pool.create(ItemType::ModulePrefix);
    pool.get_mut(product_level)
        .set_property("defines", creator.create(r#"["BASE"]"#));

    let group_level = pool.create(ItemType::ModulePrefix);
    pool.get_mut(group_level).set_outer_item(product_level);
    pool.get_mut(group_level)
        .set_property("defines", creator.create(r#"outer.concat(["EXTRA"])"#));

    let builtins = BuiltinDeclarations::new();
    let evaluator = Evaluator::new(&pool, &builtins);

    assert_eq!(
        evaluator.property(group_level, "defines").unwrap(),
        Value::from(vec![Value::from("BASE"), Value::from("EXTRA")])
    );
}

#[test]
fn self_referential_binding_is_an_error() {
    let creator = SourceValueCreator::new();
    let mut pool = ItemPool::new();

    let item = pool.create(ItemType::ModulePrefix);
    pool.get_mut(item).set_property("x", creator.create("x + 1"));

    let builtins = BuiltinDeclarations::new();
    let evaluator = Evaluator::new(&pool, &builtins);

    let err = evaluator.property(item, "x").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Evaluation);
}

#[test]
fn declared_types_convert_values() {
    let creator = SourceValueCreator::new();
    let mut pool = ItemPool::new();

    // A Product declares `type` as a string list; a scalar binding becomes
    // a one-element list.
    let product = pool.create(ItemType::Product);
    pool.get_mut(product)
        .set_property("type", creator.create(r#""application""#));
    pool.get_mut(product)
        .set_property("consoleApplication", creator.create("1"));

    let builtins = BuiltinDeclarations::new();
    let evaluator = Evaluator::new(&pool, &builtins);

    assert_eq!(
        evaluator.property(product, "type").unwrap(),
        Value::from(vec![Value::from("application")])
    );
    assert_eq!(
        evaluator.property(product, "consoleApplication").unwrap(),
        Value::Bool(true)
    );
}

#[test]
fn declaration_defaults_apply_when_unbound() {
    let creator = SourceValueCreator::new();
    let mut pool = ItemPool::new();

    let product = pool.create(ItemType::Product);
    pool.get_mut(product)
        .set_property("name", creator.create(r#""tool""#));

    let builtins = BuiltinDeclarations::new();
    let evaluator = Evaluator::new(&pool, &builtins);

    // `targetName` defaults to `name`, evaluated against this instance.
    assert_eq!(
        evaluator.property(product, "targetName").unwrap(),
        Value::from("tool")
    );
    assert_eq!(
        evaluator.property(product, "condition").unwrap(),
        Value::Bool(true)
    );
}

#[test]
fn operators_and_methods() {
    let creator = SourceValueCreator::new();
    let mut pool = ItemPool::new();

    let item = pool.create(ItemType::ModulePrefix);
    let cases = [
        ("a", "1 + 2 * 3", int(7)),
        ("b", "(1 + 2) * 3", int(9)),
        ("c", r#""x" + 1"#, Value::from("x1")),
        ("d", "1 < 2 && 2 <= 2", Value::Bool(true)),
        ("e", r#"false || "fallback""#, Value::from("fallback")),
        ("f", r#"true ? "yes" : "no""#, Value::from("yes")),
        ("g", r#"["a", "b"].contains("b")"#, Value::Bool(true)),
        ("h", r#"["a", "b"].join("-")"#, Value::from("a-b")),
        ("i", r#""abc".toUpperCase()"#, Value::from("ABC")),
        ("j", r#"["a"].length"#, int(1)),
        ("k", "10 % 3", int(1)),
        ("l", r#"1 === 1 && "a" !== "b""#, Value::Bool(true)),
    ];
    for (name, code, _) in &cases {
        pool.get_mut(item).set_property(*name, creator.create(code));
    }

    let builtins = BuiltinDeclarations::new();
    let evaluator = Evaluator::new(&pool, &builtins);
    for (name, code, expected) in &cases {
        assert_eq!(
            &evaluator.property(item, name).unwrap(),
            expected,
            "evaluating `{code}`"
        );
    }
}
