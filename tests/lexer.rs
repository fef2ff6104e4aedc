use anyhow::Result;
use brix::unstable::{Lexer, Source, Token, TokenKind};
use brix::ErrorKind;

fn tokens(contents: &str) -> Result<Vec<Token>> {
    let source = Source::from_contents("test.brix", contents.to_string())?;
    let mut lexer = Lexer::new(&source);
    let mut out = vec![];
    loop {
        let tok = lexer.next_token()?;
        let done = tok.0 == TokenKind::Eof;
        out.push(tok);
        if done {
            break;
        }
    }
    Ok(out)
}

fn texts(contents: &str) -> Vec<String> {
    tokens(contents)
        .unwrap()
        .iter()
        .filter(|t| t.0 != TokenKind::Eof)
        .map(|t| t.1.text().to_string())
        .collect()
}

#[test]
fn idents_numbers_and_symbols() {
    assert_eq!(
        texts("Product { name: \"app\" }"),
        vec!["Product", "{", "name", ":", "app", "}"]
    );
    assert_eq!(texts("a.b_c1 + 2.5e3"), vec!["a", ".", "b_c1", "+", "2.5e3"]);
    assert_eq!(texts("x <= 1 && y !== 2"), vec!["x", "<=", "1", "&&", "y", "!==", "2"]);
    assert_eq!(texts("cond ? a : b"), vec!["cond", "?", "a", ":", "b"]);
}

#[test]
fn comments_are_skipped() {
    assert_eq!(
        texts("a // line comment\n/* block\ncomment */ b"),
        vec!["a", "b"]
    );
}

#[test]
fn string_escapes() {
    let toks = tokens(r#""a\tbA""#).unwrap();
    assert_eq!(toks[0].0, TokenKind::String);
    assert_eq!(toks[0].1.text(), r#"a\tbA"#);
}

#[test]
fn line_and_column_tracking() {
    let toks = tokens("one\n  two").unwrap();
    assert_eq!((toks[0].1.line, toks[0].1.col), (1, 1));
    assert_eq!((toks[1].1.line, toks[1].1.col), (2, 3));
}

#[test]
fn caret_rendering_points_at_token() {
    let toks = tokens("alpha beta").unwrap();
    let msg = toks[1].1.message("error", "something");
    assert!(msg.contains("test.brix:1:7"));
    assert!(msg.contains("alpha beta"));
    assert!(msg.contains('^'));
}

#[test]
fn invalid_number_is_rejected() {
    let source = Source::from_contents("test.brix", "12abc".to_string()).unwrap();
    let mut lexer = Lexer::new(&source);
    let err = lexer.next_token().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Parse);
}

#[test]
fn unterminated_string_is_rejected() {
    let source = Source::from_contents("test.brix", "\"abc\n\"".to_string()).unwrap();
    let mut lexer = Lexer::new(&source);
    let err = lexer.next_token().unwrap_err();
    assert_eq!(err.kind, ErrorKind::Parse);
    assert!(err.message.contains("unterminated string"));
}

#[test]
fn unterminated_comment_is_rejected() {
    let source = Source::from_contents("test.brix", "/* never ends".to_string()).unwrap();
    let mut lexer = Lexer::new(&source);
    let err = lexer.next_token().unwrap_err();
    assert!(err.message.contains("unterminated comment"));
}

#[test]
fn error_location_is_reported() {
    let source = Source::from_contents("test.brix", "ok §".to_string()).unwrap();
    let mut lexer = Lexer::new(&source);
    lexer.next_token().unwrap();
    let err = lexer.next_token().unwrap_err();
    let loc = err.location.expect("lexer errors carry a location");
    assert_eq!(loc.file_path.as_ref(), "test.brix");
    assert_eq!((loc.line, loc.column), (1, 4));
}
