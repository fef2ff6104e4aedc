use anyhow::Result;
use brix::unstable::{Expr, FileAst, MemberAst, Parser, Source};
use brix::ErrorKind;

fn parse(contents: &str) -> Result<FileAst> {
    let source = Source::from_contents("test.brix", contents.to_string())?;
    Ok(Parser::new(&source)?.parse()?)
}

fn parse_err(contents: &str) -> brix::Error {
    let source = Source::from_contents("test.brix", contents.to_string()).unwrap();
    let result = Parser::new(&source).and_then(|mut p| p.parse());
    result.expect_err("expected a parse failure")
}

#[test]
fn file_structure() {
    let ast = parse(
        r#"
import brix.base 1.0
import brix.FileInfo
import "./helpers.brix" as Helpers
import util.collections as Col

Product {
    name: "app"
    property stringList tags: ["a", "b"]
    cpp.defines: ["X"]

    Group {
        files: ["main.c"]
    }
}
"#,
    )
    .unwrap();

    assert_eq!(ast.imports.len(), 4);
    assert_eq!(ast.imports[0].uri.len(), 2);
    assert_eq!(ast.imports[0].version.as_ref().unwrap().text(), "1.0");
    assert!(ast.imports[2].file.is_some());
    assert_eq!(ast.imports[2].alias.as_ref().unwrap().text(), "Helpers");
    assert_eq!(ast.imports[3].alias.as_ref().unwrap().text(), "Col");

    assert_eq!(ast.root.type_name_string(), "Product");
    assert_eq!(ast.root.members.len(), 4);

    match &ast.root.members[2] {
        MemberAst::Binding(b) => {
            let name: Vec<&str> = b.name.iter().map(|s| s.text()).collect();
            assert_eq!(name, vec!["cpp", "defines"]);
        }
        other => panic!("expected a binding, got {other:?}"),
    }
    match &ast.root.members[3] {
        MemberAst::Child(c) => assert_eq!(c.type_name_string(), "Group"),
        other => panic!("expected a child item, got {other:?}"),
    }
}

#[test]
fn property_declarations() {
    let ast = parse("Module { property string x: \"a\"\nproperty bool y }").unwrap();
    match &ast.root.members[0] {
        MemberAst::Decl(d) => {
            assert_eq!(d.type_name.text(), "string");
            assert_eq!(d.name.text(), "x");
            assert!(d.value.is_some());
        }
        other => panic!("expected a declaration, got {other:?}"),
    }
    match &ast.root.members[1] {
        MemberAst::Decl(d) => {
            assert_eq!(d.name.text(), "y");
            assert!(d.value.is_none());
        }
        other => panic!("expected a declaration, got {other:?}"),
    }
}

fn parse_expr(text: &str) -> brix::unstable::ExprRef {
    let source = Source::from_contents("expr".to_string(), text.to_string()).unwrap();
    Parser::new(&source).unwrap().parse_expression().unwrap()
}

#[test]
fn expression_precedence() {
    // 1 + 2 * 3 parses as 1 + (2 * 3).
    let e = parse_expr("1 + 2 * 3");
    let Expr::Binary { lhs, rhs, .. } = e.as_ref() else {
        panic!("expected binary expression");
    };
    assert!(matches!(lhs.as_ref(), Expr::Number { .. }));
    assert!(matches!(rhs.as_ref(), Expr::Binary { .. }));

    // Conditional binds loosest.
    let e = parse_expr("a || b ? 1 : 2");
    assert!(matches!(e.as_ref(), Expr::Cond { .. }));
}

#[test]
fn postfix_chains() {
    let e = parse_expr(r#"a.b[0].concat("x")"#);
    let Expr::Call { callee, args, .. } = e.as_ref() else {
        panic!("expected call");
    };
    assert_eq!(args.len(), 1);
    assert!(matches!(callee.as_ref(), Expr::Member { .. }));
}

#[test]
fn base_and_outer_detection() {
    assert!(parse_expr("base.concat([1])").uses_ident("base"));
    assert!(parse_expr("outer").uses_ident("outer"));
    // A member *named* base is not a use of the pseudo-value.
    assert!(!parse_expr("a.base").uses_ident("base"));
    assert!(!parse_expr("[1, 2]").uses_ident("base"));
}

#[test]
fn missing_colon_is_rejected() {
    let err = parse_err("Product { name \"app\" }");
    assert_eq!(err.kind, ErrorKind::Parse);
    assert!(err.message.contains("expecting `:` or `{`"));
}

#[test]
fn unterminated_item_is_rejected() {
    let err = parse_err("Product { name: \"app\"");
    assert_eq!(err.kind, ErrorKind::Parse);
    assert!(err.message.contains("unterminated item"));
}

#[test]
fn missing_expression_is_rejected() {
    let err = parse_err("Product { x: }");
    assert_eq!(err.kind, ErrorKind::Parse);
    assert!(err.message.contains("expecting expression"));
}

#[test]
fn trailing_garbage_is_rejected() {
    let err = parse_err("Product { }\nProduct { }");
    assert!(err.message.contains("end of file"));
}
