use crate::error::{CodeLocation, Error, ErrorKind, Result};

use core::cmp;
use core::fmt::{self, Debug, Formatter};
use core::iter::Peekable;
use core::str::CharIndices;
use std::rc::Rc;

struct SourceInternal {
    pub file: Rc<str>,
    pub contents: String,
    pub lines: Vec<(u32, u32)>,
}

/// A project file's contents, shared by every span cut from it.
#[derive(Clone)]
pub struct Source {
    src: Rc<SourceInternal>,
}

impl cmp::PartialEq for Source {
    fn eq(&self, other: &Source) -> bool {
        Rc::as_ptr(&self.src) == Rc::as_ptr(&other.src)
    }
}

impl cmp::Eq for Source {}

impl Debug for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::result::Result<(), fmt::Error> {
        self.src.file.fmt(f)
    }
}

impl Source {
    pub fn from_contents(file: impl Into<Rc<str>>, contents: String) -> Result<Source> {
        let file = file.into();
        let max_size = u32::MAX as usize - 2;
        if contents.len() > max_size {
            return Err(Error::new(
                ErrorKind::Io,
                format!("{file} exceeds the maximum project file size {max_size}"),
            ));
        }
        let mut lines = vec![];
        let mut prev_ch = ' ';
        let mut prev_pos = 0u32;
        let mut start = 0u32;
        for (i, ch) in contents.char_indices() {
            if ch == '\n' {
                let end = match prev_ch {
                    '\r' => prev_pos,
                    _ => i as u32,
                };
                lines.push((start, end));
                start = i as u32 + 1;
            }
            prev_ch = ch;
            prev_pos = i as u32;
        }

        if (start as usize) < contents.len() {
            lines.push((start, contents.len() as u32));
        } else if contents.is_empty() {
            lines.push((0, 0));
        } else {
            let s = (contents.len() - 1) as u32;
            lines.push((s, s));
        }
        Ok(Self {
            src: Rc::new(SourceInternal {
                file,
                contents,
                lines,
            }),
        })
    }

    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Source> {
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                return Err(Error::new(
                    ErrorKind::Io,
                    format!("failed to read {}: {e}", path.as_ref().display()),
                ))
            }
        };
        Self::from_contents(path.as_ref().to_string_lossy().into_owned(), contents)
    }

    pub fn file(&self) -> &Rc<str> {
        &self.src.file
    }

    pub fn contents(&self) -> &String {
        &self.src.contents
    }

    pub fn line(&self, idx: u32) -> &str {
        let idx = idx as usize;
        if idx < self.src.lines.len() {
            let (start, end) = self.src.lines[idx];
            &self.src.contents[start as usize..end as usize]
        } else {
            ""
        }
    }

    /// Render a message with the offending line and a caret under the column.
    pub fn message(&self, line: u32, col: u32, kind: &str, msg: &str) -> String {
        if line as usize > self.src.lines.len() {
            return format!("{}: invalid line {} specified", self.src.file, line);
        }

        let line_str = format!("{line}");
        let line_num_width = line_str.len() + 1;
        let col_spaces = col.saturating_sub(1) as usize;

        format!(
            "\n--> {}:{}:{}\n{:<line_num_width$}|\n{:<line_num_width$}| {}\n{:<line_num_width$}| {:<col_spaces$}^\n{}: {}",
            self.src.file,
            line,
            col,
            "",
            line,
            self.line(line - 1),
            "",
            "",
            kind,
            msg
        )
    }

    pub fn error(&self, line: u32, col: u32, kind: ErrorKind, msg: &str) -> Error {
        Error::at(
            kind,
            self.message(line, col, kind.as_str(), msg),
            CodeLocation::new(self.src.file.as_ref(), line, col),
        )
    }
}

/// A region of a [`Source`], carrying its line/column for diagnostics.
#[derive(Clone, PartialEq, Eq)]
pub struct Span {
    pub source: Source,
    pub line: u32,
    pub col: u32,
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn text(&self) -> &str {
        &self.source.contents()[self.start as usize..self.end as usize]
    }

    pub fn location(&self) -> CodeLocation {
        CodeLocation::new(self.source.file().as_ref(), self.line, self.col)
    }

    pub fn message(&self, kind: &str, msg: &str) -> String {
        self.source.message(self.line, self.col, kind, msg)
    }

    pub fn error(&self, kind: ErrorKind, msg: &str) -> Error {
        self.source.error(self.line, self.col, kind, msg)
    }
}

impl Debug for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::result::Result<(), fmt::Error> {
        let t = self.text().escape_debug().to_string();
        let max = 32;
        let (txt, trailer) = if t.len() > max {
            (&t[0..max], "...")
        } else {
            (t.as_str(), "")
        };

        f.write_fmt(format_args!(
            "{}:{}:{}:{}, \"{}{}\"",
            self.line, self.col, self.start, self.end, txt, trailer
        ))
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum TokenKind {
    Symbol,
    String,
    Number,
    Ident,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token(pub TokenKind, pub Span);

#[derive(Clone)]
pub struct Lexer<'source> {
    source: Source,
    iter: Peekable<CharIndices<'source>>,
    line: u32,
    col: u32,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source Source) -> Self {
        Self {
            source: source.clone(),
            iter: source.contents().char_indices().peekable(),
            line: 1,
            col: 1,
        }
    }

    fn peek(&mut self) -> (usize, char) {
        match self.iter.peek() {
            Some((index, chr)) => (*index, *chr),
            _ => (self.source.contents().len(), '\x00'),
        }
    }

    fn peekahead(&mut self, n: usize) -> (usize, char) {
        match self.iter.clone().nth(n) {
            Some((index, chr)) => (index, chr),
            _ => (self.source.contents().len(), '\x00'),
        }
    }

    fn read_ident(&mut self) -> Result<Token> {
        let start = self.peek().0;
        let line = self.line;
        let col = self.col;
        loop {
            let ch = self.peek().1;
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '$' {
                self.iter.next();
            } else {
                break;
            }
        }
        let end = self.peek().0;
        self.col += (end - start) as u32;
        Ok(Token(
            TokenKind::Ident,
            Span {
                source: self.source.clone(),
                line,
                col,
                start: start as u32,
                end: end as u32,
            },
        ))
    }

    fn read_digits(&mut self) {
        while self.peek().1.is_ascii_digit() {
            self.iter.next();
        }
    }

    fn read_number(&mut self) -> Result<Token> {
        let (start, chr) = self.peek();
        let col = self.col;
        self.iter.next();

        // Integer part; a leading 0 takes no further digits.
        if chr != '0' {
            self.read_digits();
        }

        // Fraction part; . must be followed by at least one digit.
        if self.peek().1 == '.' && self.peekahead(1).1.is_ascii_digit() {
            self.iter.next();
            self.read_digits();
        }

        // Exponent part.
        let ch = self.peek().1;
        if ch == 'e' || ch == 'E' {
            self.iter.next();
            if matches!(self.peek().1, '+' | '-') {
                self.iter.next();
            }
            self.read_digits();
        }

        let end = self.peek().0;
        self.col += (end - start) as u32;

        // A valid number cannot be followed by these characters.
        let ch = self.peek().1;
        if ch == '_' || ch == '.' || ch.is_ascii_alphanumeric() {
            return Err(self
                .source
                .error(self.line, self.col, ErrorKind::Parse, "invalid number"));
        }

        Ok(Token(
            TokenKind::Number,
            Span {
                source: self.source.clone(),
                line: self.line,
                col,
                start: start as u32,
                end: end as u32,
            },
        ))
    }

    fn read_string(&mut self) -> Result<Token> {
        let (line, col) = (self.line, self.col);
        self.iter.next();
        self.col += 1;
        let (start, _) = self.peek();
        loop {
            let (offset, ch) = self.peek();
            match ch {
                '"' | '\x00' => {
                    break;
                }
                '\n' => {
                    return Err(self.source.error(
                        line,
                        col,
                        ErrorKind::Parse,
                        "unterminated string",
                    ));
                }
                '\\' => {
                    self.iter.next();
                    let (_, ch) = self.peek();
                    self.iter.next();
                    match ch {
                        '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' => (),
                        'u' => {
                            for _i in 0..4 {
                                let (offset, ch) = self.peek();
                                let col = self.col + (offset - start) as u32;
                                if !ch.is_ascii_hexdigit() {
                                    return Err(self.source.error(
                                        line,
                                        col,
                                        ErrorKind::Parse,
                                        "invalid hex escape sequence",
                                    ));
                                }
                                self.iter.next();
                            }
                        }
                        _ => {
                            let col = self.col + (offset - start) as u32;
                            return Err(self.source.error(
                                line,
                                col,
                                ErrorKind::Parse,
                                "invalid escape sequence",
                            ));
                        }
                    }
                }
                _ => {
                    self.iter.next();
                }
            }
        }

        if self.peek().1 != '"' {
            return Err(self
                .source
                .error(line, col, ErrorKind::Parse, "unmatched \""));
        }

        self.iter.next();
        let end = self.peek().0;
        self.col += (end - start) as u32 + 1;

        // Ensure the escaped contents decode; the parser relies on it.
        if let Err(e) = serde_json::from_str::<String>(&self.source.contents()[start - 1..end]) {
            return Err(self.source.error(
                line,
                col,
                ErrorKind::Parse,
                &format!("cannot decode string literal: {e}"),
            ));
        }

        Ok(Token(
            TokenKind::String,
            Span {
                source: self.source.clone(),
                line,
                col: col + 1,
                start: start as u32,
                end: end as u32 - 1,
            },
        ))
    }

    fn skip_ws(&mut self) -> Result<()> {
        loop {
            match self.peek().1 {
                ' ' => self.col += 1,
                '\t' => self.col += 4,
                '\r' => {
                    if self.peekahead(1).1 != '\n' {
                        return Err(self.source.error(
                            self.line,
                            self.col,
                            ErrorKind::Parse,
                            "\\r must be followed by \\n",
                        ));
                    }
                }
                '\n' => {
                    self.col = 1;
                    self.line += 1;
                }
                '/' if self.peekahead(1).1 == '/' => {
                    self.iter.next();
                    loop {
                        match self.peek().1 {
                            '\n' | '\x00' => break,
                            _ => {
                                self.iter.next();
                            }
                        }
                    }
                    continue;
                }
                '/' if self.peekahead(1).1 == '*' => {
                    let (line, col) = (self.line, self.col);
                    self.iter.next();
                    self.iter.next();
                    self.col += 2;
                    loop {
                        match self.peek().1 {
                            '\x00' => {
                                return Err(self.source.error(
                                    line,
                                    col,
                                    ErrorKind::Parse,
                                    "unterminated comment",
                                ));
                            }
                            '\n' => {
                                self.line += 1;
                                self.col = 1;
                                self.iter.next();
                            }
                            '*' if self.peekahead(1).1 == '/' => {
                                self.iter.next();
                                self.iter.next();
                                self.col += 2;
                                break;
                            }
                            _ => {
                                self.col += 1;
                                self.iter.next();
                            }
                        }
                    }
                    continue;
                }
                _ => break,
            }
            self.iter.next();
        }
        Ok(())
    }

    fn symbol(&mut self, len: u32) -> Result<Token> {
        let (start, _) = self.peek();
        let col = self.col;
        for _ in 0..len {
            self.iter.next();
        }
        self.col += len;
        Ok(Token(
            TokenKind::Symbol,
            Span {
                source: self.source.clone(),
                line: self.line,
                col,
                start: start as u32,
                end: start as u32 + len,
            },
        ))
    }

    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_ws()?;

        let (start, chr) = self.peek();
        let col = self.col;

        match chr {
            // - or . followed by a digit starts a number.
            '-' | '.' if self.peekahead(1).1.is_ascii_digit() => self.read_number(),

            '{' | '}' | '[' | ']' | '(' | ')' | ',' | ';' | '.' | ':' | '?' | '+' | '-' | '*'
            | '/' | '%' => self.symbol(1),

            '&' if self.peekahead(1).1 == '&' => self.symbol(2),
            '|' if self.peekahead(1).1 == '|' => self.symbol(2),

            '=' | '!' if self.peekahead(1).1 == '=' => {
                // == and != plus the strict forms === and !==
                if self.peekahead(2).1 == '=' {
                    self.symbol(3)
                } else {
                    self.symbol(2)
                }
            }
            '!' => self.symbol(1),

            '<' | '>' => {
                if self.peekahead(1).1 == '=' {
                    self.symbol(2)
                } else {
                    self.symbol(1)
                }
            }

            '"' => self.read_string(),

            '\x00' => Ok(Token(
                TokenKind::Eof,
                Span {
                    source: self.source.clone(),
                    line: self.line,
                    col,
                    start: start as u32,
                    end: start as u32,
                },
            )),

            _ if chr.is_ascii_digit() => self.read_number(),
            _ if chr.is_ascii_alphabetic() || chr == '_' || chr == '$' => self.read_ident(),
            _ => Err(self
                .source
                .error(self.line, self.col, ErrorKind::Parse, "invalid character")),
        }
    }
}
