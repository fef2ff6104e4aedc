use core::fmt;
use std::sync::Arc;

/// Classification of everything that can go wrong while resolving a project.
///
/// One unrecoverable error anywhere fails the entire resolution pass; soft
/// conditions (a missing optional property, an empty prototype directory)
/// are represented as "not found" return values instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A file could not be read.
    Io,
    /// The grammar parser could not produce an AST.
    Parse,
    /// A file was re-entered through its own (possibly transitive) imports.
    CyclicImport,
    /// A file import did not resolve to an existing file or directory.
    ImportNotFound,
    /// An item type name is neither built in nor a known prototype.
    UnknownItemType,
    /// A declared property type string is not a known type.
    UnknownPropertyType,
    /// An import alias collides with another alias in the same file.
    DuplicateAlias,
    /// An import alias collides with a built-in extension name.
    ReservedNameCollision,
    /// Two bindings for the same property on one item.
    DuplicateBinding,
    /// An expression read an identifier that resolves to nothing.
    UndefinedProperty,
    /// The explicit base-import version does not match the language version.
    VersionIncompatibility,
    /// A deprecated item or property was used in Error mode.
    Deprecation,
    /// A value did not have the expected type.
    Type,
    /// Expression evaluation failed.
    Evaluation,
}

impl ErrorKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Io => "io error",
            ErrorKind::Parse => "parse error",
            ErrorKind::CyclicImport => "cyclic import",
            ErrorKind::ImportNotFound => "import not found",
            ErrorKind::UnknownItemType => "unknown item type",
            ErrorKind::UnknownPropertyType => "unknown property type",
            ErrorKind::DuplicateAlias => "duplicate import alias",
            ErrorKind::ReservedNameCollision => "reserved name collision",
            ErrorKind::DuplicateBinding => "duplicate binding",
            ErrorKind::UndefinedProperty => "undefined property",
            ErrorKind::VersionIncompatibility => "incompatible language version",
            ErrorKind::Deprecation => "deprecated construct",
            ErrorKind::Type => "type error",
            ErrorKind::Evaluation => "evaluation error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A position in a project file, reported with every diagnostic. Shared
/// across threads, so errors stay `Send + Sync`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CodeLocation {
    pub file_path: Arc<str>,
    pub line: u32,
    pub column: u32,
}

impl CodeLocation {
    pub fn new(file_path: impl Into<Arc<str>>, line: u32, column: u32) -> Self {
        Self {
            file_path: file_path.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for CodeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file_path, self.line, self.column)
    }
}

/// The error type of every public operation in this crate.
///
/// `message` already carries the rendered source context when the error
/// originated in a file; `location` is kept separately so callers can
/// jump to the offending position programmatically.
#[derive(thiserror::Error, Debug, Clone)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    pub location: Option<CodeLocation>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
        }
    }

    pub fn at(kind: ErrorKind, message: impl Into<String>, location: CodeLocation) -> Self {
        Self {
            kind,
            message: message.into(),
            location: Some(location),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
