use crate::ast::*;
use crate::error::{ErrorKind, Result};
use crate::lexer::*;
use crate::value::Number;

use core::str::FromStr;

/// Recursive-descent parser for project files: an import list followed by
/// one root object, with a small expression language inside bindings.
#[derive(Clone)]
pub struct Parser<'source> {
    source: Source,
    lexer: Lexer<'source>,
    tok: Token,
}

impl<'source> Parser<'source> {
    pub fn new(source: &'source Source) -> Result<Self> {
        let mut lexer = Lexer::new(source);
        let tok = lexer.next_token()?;
        Ok(Self {
            source: source.clone(),
            lexer,
            tok,
        })
    }

    pub fn token_text(&self) -> &str {
        match self.tok.0 {
            TokenKind::Symbol | TokenKind::Number | TokenKind::Ident | TokenKind::Eof => {
                self.tok.1.text()
            }
            TokenKind::String => "",
        }
    }

    fn next_token(&mut self) -> Result<()> {
        self.tok = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, text: &str, context: &str) -> Result<()> {
        if self.token_text() == text {
            self.next_token()
        } else {
            let msg = format!("expecting `{text}` {context}");
            Err(self
                .source
                .error(self.tok.1.line, self.tok.1.col, ErrorKind::Parse, &msg))
        }
    }

    fn is_ident(&self) -> bool {
        self.tok.0 == TokenKind::Ident
    }

    /// `a.b.c` as a list of component spans.
    fn parse_qualified_id(&mut self, context: &str) -> Result<Vec<Span>> {
        if !self.is_ident() {
            return Err(self.tok.1.error(
                ErrorKind::Parse,
                &format!("expecting identifier {context}"),
            ));
        }
        let mut comps = vec![self.tok.1.clone()];
        self.next_token()?;
        while self.token_text() == "." {
            self.next_token()?;
            if !self.is_ident() {
                return Err(self
                    .tok
                    .1
                    .error(ErrorKind::Parse, "expecting identifier after `.`"));
            }
            comps.push(self.tok.1.clone());
            self.next_token()?;
        }
        Ok(comps)
    }

    pub fn parse(&mut self) -> Result<FileAst> {
        let mut imports = vec![];
        while self.is_ident() && self.token_text() == "import" {
            imports.push(self.parse_import()?);
        }
        let root = Ref::new(self.parse_object()?);
        if self.tok.0 != TokenKind::Eof {
            return Err(self
                .tok
                .1
                .error(ErrorKind::Parse, "expecting end of file after root item"));
        }
        Ok(FileAst { imports, root })
    }

    /// Parse a standalone expression; used by tests and tooling.
    pub fn parse_expression(&mut self) -> Result<ExprRef> {
        let expr = self.parse_expr()?;
        if self.tok.0 != TokenKind::Eof {
            return Err(self
                .tok
                .1
                .error(ErrorKind::Parse, "expecting end of expression"));
        }
        Ok(expr)
    }

    fn parse_import(&mut self) -> Result<ImportAst> {
        let span = self.tok.1.clone();
        self.next_token()?; // import

        let mut uri = vec![];
        let mut file = None;
        let mut version = None;

        match self.tok.0 {
            TokenKind::String => {
                file = Some(self.tok.1.clone());
                self.next_token()?;
            }
            TokenKind::Ident => {
                uri = self.parse_qualified_id("in import")?;
                if self.tok.0 == TokenKind::Number {
                    version = Some(self.tok.1.clone());
                    self.next_token()?;
                }
            }
            _ => {
                return Err(self
                    .tok
                    .1
                    .error(ErrorKind::Parse, "expecting import target"));
            }
        }

        let mut alias = None;
        if self.is_ident() && self.token_text() == "as" {
            self.next_token()?;
            if !self.is_ident() {
                return Err(self
                    .tok
                    .1
                    .error(ErrorKind::Parse, "expecting identifier after `as`"));
            }
            alias = Some(self.tok.1.clone());
            self.next_token()?;
        }

        Ok(ImportAst {
            span,
            uri,
            file,
            version,
            alias,
        })
    }

    fn parse_object(&mut self) -> Result<ObjectAst> {
        let span = self.tok.1.clone();
        let type_name = self.parse_qualified_id("as item type")?;
        self.expect("{", "after item type")?;

        let mut members = vec![];
        loop {
            while self.token_text() == ";" {
                self.next_token()?;
            }
            if self.token_text() == "}" {
                self.next_token()?;
                break;
            }
            if self.tok.0 == TokenKind::Eof {
                return Err(span.error(ErrorKind::Parse, "unterminated item"));
            }
            members.push(self.parse_member()?);
        }

        Ok(ObjectAst {
            span,
            type_name,
            members,
        })
    }

    fn parse_member(&mut self) -> Result<MemberAst> {
        if !self.is_ident() {
            return Err(self
                .tok
                .1
                .error(ErrorKind::Parse, "expecting item member"));
        }

        if self.token_text() == "property" {
            return Ok(MemberAst::Decl(self.parse_property_decl()?));
        }

        // Lookahead decides between a child item (`Name {`) and a binding
        // (`name.path: expr`).
        let name = self.parse_qualified_id("as member name")?;
        match self.token_text() {
            "{" => {
                self.expect("{", "after item type")?;
                let mut members = vec![];
                loop {
                    while self.token_text() == ";" {
                        self.next_token()?;
                    }
                    if self.token_text() == "}" {
                        self.next_token()?;
                        break;
                    }
                    if self.tok.0 == TokenKind::Eof {
                        return Err(name[0].error(ErrorKind::Parse, "unterminated item"));
                    }
                    members.push(self.parse_member()?);
                }
                Ok(MemberAst::Child(Ref::new(ObjectAst {
                    span: name[0].clone(),
                    type_name: name,
                    members,
                })))
            }
            ":" => {
                self.next_token()?;
                let value = self.parse_expr()?;
                Ok(MemberAst::Binding(BindingAst {
                    span: name[0].clone(),
                    name,
                    value,
                }))
            }
            _ => Err(self
                .tok
                .1
                .error(ErrorKind::Parse, "expecting `:` or `{` after member name")),
        }
    }

    fn parse_property_decl(&mut self) -> Result<PropertyDeclAst> {
        let span = self.tok.1.clone();
        self.next_token()?; // property

        if !self.is_ident() {
            return Err(self
                .tok
                .1
                .error(ErrorKind::Parse, "expecting property type"));
        }
        let type_name = self.tok.1.clone();
        self.next_token()?;

        if !self.is_ident() {
            return Err(self
                .tok
                .1
                .error(ErrorKind::Parse, "expecting property name"));
        }
        let name = self.tok.1.clone();
        self.next_token()?;

        let mut value = None;
        if self.token_text() == ":" {
            self.next_token()?;
            value = Some(self.parse_expr()?);
        }

        Ok(PropertyDeclAst {
            span,
            type_name,
            name,
            value,
        })
    }

    fn parse_expr(&mut self) -> Result<ExprRef> {
        self.parse_cond_expr()
    }

    fn parse_cond_expr(&mut self) -> Result<ExprRef> {
        let cond = self.parse_or_expr()?;
        if self.token_text() != "?" {
            return Ok(cond);
        }
        let span = self.tok.1.clone();
        self.next_token()?;
        let then_expr = self.parse_expr()?;
        self.expect(":", "in conditional expression")?;
        let else_expr = self.parse_expr()?;
        Ok(Ref::new(Expr::Cond {
            span,
            cond,
            then_expr,
            else_expr,
        }))
    }

    fn parse_or_expr(&mut self) -> Result<ExprRef> {
        let mut lhs = self.parse_and_expr()?;
        while self.token_text() == "||" {
            let span = self.tok.1.clone();
            self.next_token()?;
            let rhs = self.parse_and_expr()?;
            lhs = Ref::new(Expr::Binary {
                span,
                op: BinOp::Or,
                lhs,
                rhs,
            });
        }
        Ok(lhs)
    }

    fn parse_and_expr(&mut self) -> Result<ExprRef> {
        let mut lhs = self.parse_eq_expr()?;
        while self.token_text() == "&&" {
            let span = self.tok.1.clone();
            self.next_token()?;
            let rhs = self.parse_eq_expr()?;
            lhs = Ref::new(Expr::Binary {
                span,
                op: BinOp::And,
                lhs,
                rhs,
            });
        }
        Ok(lhs)
    }

    fn parse_eq_expr(&mut self) -> Result<ExprRef> {
        let mut lhs = self.parse_rel_expr()?;
        loop {
            let op = match self.token_text() {
                "==" | "===" => BinOp::Eq,
                "!=" | "!==" => BinOp::Ne,
                _ => break,
            };
            let span = self.tok.1.clone();
            self.next_token()?;
            let rhs = self.parse_rel_expr()?;
            lhs = Ref::new(Expr::Binary { span, op, lhs, rhs });
        }
        Ok(lhs)
    }

    fn parse_rel_expr(&mut self) -> Result<ExprRef> {
        let mut lhs = self.parse_add_expr()?;
        loop {
            let op = match self.token_text() {
                "<" => BinOp::Lt,
                "<=" => BinOp::Le,
                ">" => BinOp::Gt,
                ">=" => BinOp::Ge,
                _ => break,
            };
            let span = self.tok.1.clone();
            self.next_token()?;
            let rhs = self.parse_add_expr()?;
            lhs = Ref::new(Expr::Binary { span, op, lhs, rhs });
        }
        Ok(lhs)
    }

    fn parse_add_expr(&mut self) -> Result<ExprRef> {
        let mut lhs = self.parse_mul_expr()?;
        loop {
            let op = match self.token_text() {
                "+" => BinOp::Add,
                "-" => BinOp::Sub,
                _ => break,
            };
            let span = self.tok.1.clone();
            self.next_token()?;
            let rhs = self.parse_mul_expr()?;
            lhs = Ref::new(Expr::Binary { span, op, lhs, rhs });
        }
        Ok(lhs)
    }

    fn parse_mul_expr(&mut self) -> Result<ExprRef> {
        let mut lhs = self.parse_unary_expr()?;
        loop {
            let op = match self.token_text() {
                "*" => BinOp::Mul,
                "/" => BinOp::Div,
                "%" => BinOp::Mod,
                _ => break,
            };
            let span = self.tok.1.clone();
            self.next_token()?;
            let rhs = self.parse_unary_expr()?;
            lhs = Ref::new(Expr::Binary { span, op, lhs, rhs });
        }
        Ok(lhs)
    }

    fn parse_unary_expr(&mut self) -> Result<ExprRef> {
        let op = match self.token_text() {
            "!" => Some(UnaryOp::Not),
            "-" => Some(UnaryOp::Neg),
            _ => None,
        };
        if let Some(op) = op {
            let span = self.tok.1.clone();
            self.next_token()?;
            let expr = self.parse_unary_expr()?;
            return Ok(Ref::new(Expr::Unary { span, op, expr }));
        }
        self.parse_postfix_expr()
    }

    fn parse_postfix_expr(&mut self) -> Result<ExprRef> {
        let mut expr = self.parse_primary_expr()?;
        loop {
            match self.token_text() {
                "." => {
                    let span = self.tok.1.clone();
                    self.next_token()?;
                    if !self.is_ident() {
                        return Err(self
                            .tok
                            .1
                            .error(ErrorKind::Parse, "expecting identifier after `.`"));
                    }
                    let field = self.tok.1.clone();
                    self.next_token()?;
                    expr = Ref::new(Expr::Member {
                        span,
                        object: expr,
                        field,
                    });
                }
                "[" => {
                    let span = self.tok.1.clone();
                    self.next_token()?;
                    let index = self.parse_expr()?;
                    self.expect("]", "after index expression")?;
                    expr = Ref::new(Expr::Index {
                        span,
                        object: expr,
                        index,
                    });
                }
                "(" => {
                    let span = self.tok.1.clone();
                    self.next_token()?;
                    let mut args = vec![];
                    if self.token_text() != ")" {
                        loop {
                            args.push(self.parse_expr()?);
                            if self.token_text() != "," {
                                break;
                            }
                            self.next_token()?;
                        }
                    }
                    self.expect(")", "after call arguments")?;
                    expr = Ref::new(Expr::Call {
                        span,
                        callee: expr,
                        args,
                    });
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary_expr(&mut self) -> Result<ExprRef> {
        let span = self.tok.1.clone();
        match &self.tok.0 {
            TokenKind::Number => {
                let value = Number::from_str(span.text())
                    .map_err(|e| span.error(ErrorKind::Parse, &e.message))?;
                self.next_token()?;
                Ok(Ref::new(Expr::Number { span, value }))
            }
            TokenKind::String => {
                // Token bounds exclude the quotes; decode with them back on.
                let quoted =
                    &span.source.contents()[span.start as usize - 1..span.end as usize + 1];
                let value: String = serde_json::from_str(quoted)
                    .map_err(|e| span.error(ErrorKind::Parse, &e.to_string()))?;
                self.next_token()?;
                Ok(Ref::new(Expr::String {
                    span,
                    value: value.into(),
                }))
            }
            TokenKind::Ident => match span.text() {
                "true" | "false" => {
                    let value = span.text() == "true";
                    self.next_token()?;
                    Ok(Ref::new(Expr::Bool { span, value }))
                }
                "null" => {
                    self.next_token()?;
                    Ok(Ref::new(Expr::Null { span }))
                }
                _ => {
                    self.next_token()?;
                    Ok(Ref::new(Expr::Var { span }))
                }
            },
            TokenKind::Symbol if span.text() == "[" => {
                self.next_token()?;
                let mut items = vec![];
                if self.token_text() != "]" {
                    loop {
                        items.push(self.parse_expr()?);
                        if self.token_text() != "," {
                            break;
                        }
                        self.next_token()?;
                    }
                }
                self.expect("]", "after list elements")?;
                Ok(Ref::new(Expr::List { span, items }))
            }
            TokenKind::Symbol if span.text() == "(" => {
                self.next_token()?;
                let expr = self.parse_expr()?;
                self.expect(")", "after parenthesized expression")?;
                Ok(expr)
            }
            _ => Err(span.error(ErrorKind::Parse, "expecting expression")),
        }
    }
}
