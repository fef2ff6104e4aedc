// Use README.md as crate documentation.
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]

mod ast;
mod declarations;
mod engine;
mod error;
mod evaluator;
pub mod extensions;
mod item;
mod lexer;
mod lookup;
mod modules;
mod parser;
mod reader;
mod resolver;
mod value;

pub use declarations::{
    BuiltinDeclarations, DeprecationInfo, DeprecationWarningMode, PropertyDeclaration,
    PropertyFlags, PropertyType, Version, LANGUAGE_VERSION,
};
pub use engine::{Engine, SetupParameters};
pub use error::{CodeLocation, Error, ErrorKind, Result};
pub use evaluator::Evaluator;
pub use item::{
    Alternative, FileContext, FileContextRef, Item, ItemId, ItemPool, ItemType, ModuleInstance,
    PropValue, ScriptImport, SourceValue,
};
pub use lookup::{property_value, property_values, MergeType};
pub use modules::ModuleLoader;
pub use reader::{check_deprecation, ItemReader};
pub use resolver::{
    reduce_configurations, ProductData, ProjectData, ProjectResolver, ResolvedGroup,
    ResolvedProduct, ResolvedProject, SourceArtifact,
};
pub use value::{Number, Value};

/// Items in `unstable` are likely to change.
pub mod unstable {
    pub use crate::ast::*;
    pub use crate::lexer::*;
    pub use crate::parser::*;
}
