use crate::error::{CodeLocation, Error, ErrorKind, Result};
use crate::item::ItemType;

use core::fmt;
use core::str::FromStr;

use indexmap::IndexMap;

/// The semantic type of a declared property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    Boolean,
    Integer,
    Path,
    PathList,
    String,
    StringList,
    Variant,
    /// Script source kept as-is, e.g. a rule's prepare script.
    Verbatim,
}

impl PropertyType {
    pub fn from_type_name(name: &str) -> Option<PropertyType> {
        match name {
            "bool" => Some(PropertyType::Boolean),
            "int" => Some(PropertyType::Integer),
            "path" => Some(PropertyType::Path),
            "pathList" => Some(PropertyType::PathList),
            "string" => Some(PropertyType::String),
            "stringList" => Some(PropertyType::StringList),
            "var" | "variant" => Some(PropertyType::Variant),
            "verbatim" => Some(PropertyType::Verbatim),
            _ => None,
        }
    }

    pub const fn is_list(&self) -> bool {
        matches!(self, PropertyType::PathList | PropertyType::StringList)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropertyFlags {
    pub read_only: bool,
    /// Excluded from the per-product configuration map, e.g. file lists.
    pub not_available_in_config: bool,
}

impl PropertyFlags {
    pub const NONE: PropertyFlags = PropertyFlags {
        read_only: false,
        not_available_in_config: false,
    };
    pub const NOT_IN_CONFIG: PropertyFlags = PropertyFlags {
        read_only: false,
        not_available_in_config: true,
    };
}

/// A two-component language/removal version, e.g. `1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::new(ErrorKind::Parse, format!("`{s}` is not a valid version"));
        match s.split_once('.') {
            Some((major, minor)) => {
                let major = major.parse().map_err(|_| invalid())?;
                let minor = minor.parse().map_err(|_| invalid())?;
                Ok(Version { major, minor })
            }
            None => {
                let major = s.parse().map_err(|_| invalid())?;
                Ok(Version { major, minor: 0 })
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeprecationInfo {
    pub removal_version: Version,
    pub message: &'static str,
}

/// What to do when a deprecated item type or property is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum DeprecationWarningMode {
    Off,
    #[default]
    On,
    Error,
    /// Warn only when removal is imminent (the next minor version).
    BeforeRemoval,
}

/// The static schema of one property.
#[derive(Debug, Clone)]
pub struct PropertyDeclaration {
    pub name: String,
    pub property_type: PropertyType,
    pub flags: PropertyFlags,
    /// Default-value source expression, parsed on demand.
    pub initial_value: Option<&'static str>,
    /// Named arguments for callable properties such as `Rule.prepare`.
    pub function_argument_names: Vec<&'static str>,
    pub deprecation: Option<DeprecationInfo>,
}

impl PropertyDeclaration {
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            name: name.into(),
            property_type,
            flags: PropertyFlags::NONE,
            initial_value: None,
            function_argument_names: vec![],
            deprecation: None,
        }
    }

    fn with_flags(mut self, flags: PropertyFlags) -> Self {
        self.flags = flags;
        self
    }

    fn with_initial_value(mut self, source: &'static str) -> Self {
        self.initial_value = Some(source);
        self
    }

    fn with_function_arguments(mut self, args: &[&'static str]) -> Self {
        self.function_argument_names = args.to_vec();
        self
    }

    fn deprecated(mut self, removal_version: Version, message: &'static str) -> Self {
        self.deprecation = Some(DeprecationInfo {
            removal_version,
            message,
        });
        self
    }
}

pub type PropertyDeclarationMap = IndexMap<String, PropertyDeclaration>;

/// The language version accepted by `import brix.base <version>`.
pub const LANGUAGE_VERSION: Version = Version::new(1, 0);

/// The registry of built-in item types and their legal properties.
///
/// Constructed once by the resolution driver and passed by reference;
/// immutable afterwards, so shared reads need no synchronization.
#[derive(Debug)]
pub struct BuiltinDeclarations {
    language_version: Version,
    builtins: IndexMap<ItemType, PropertyDeclarationMap>,
    deprecated_types: IndexMap<ItemType, DeprecationInfo>,
    empty: PropertyDeclarationMap,
}

fn decl_map(decls: Vec<PropertyDeclaration>) -> PropertyDeclarationMap {
    decls.into_iter().map(|d| (d.name.clone(), d)).collect()
}

fn condition_property() -> PropertyDeclaration {
    PropertyDeclaration::new("condition", PropertyType::Boolean).with_initial_value("true")
}

fn name_property() -> PropertyDeclaration {
    PropertyDeclaration::new("name", PropertyType::String)
}

/// The property set shared by module-like items (Module, Export).
fn module_like_properties() -> Vec<PropertyDeclaration> {
    vec![
        condition_property(),
        name_property(),
        PropertyDeclaration::new("setupBuildEnvironment", PropertyType::Verbatim)
            .with_function_arguments(&["project", "product"]),
        PropertyDeclaration::new("setupRunEnvironment", PropertyType::Verbatim)
            .with_function_arguments(&["project", "product"]),
        PropertyDeclaration::new("additionalProductTypes", PropertyType::StringList),
        PropertyDeclaration::new("version", PropertyType::String),
    ]
}

impl Default for BuiltinDeclarations {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltinDeclarations {
    pub fn new() -> Self {
        let mut builtins = IndexMap::new();

        builtins.insert(
            ItemType::Depends,
            decl_map(vec![
                condition_property(),
                name_property(),
                PropertyDeclaration::new("submodules", PropertyType::StringList),
                PropertyDeclaration::new("required", PropertyType::Boolean)
                    .with_initial_value("true"),
                PropertyDeclaration::new("failureMessage", PropertyType::String),
            ]),
        );

        builtins.insert(
            ItemType::Group,
            decl_map(vec![
                condition_property(),
                PropertyDeclaration::new("name", PropertyType::String)
                    .with_flags(PropertyFlags::NOT_IN_CONFIG),
                PropertyDeclaration::new("files", PropertyType::PathList)
                    .with_flags(PropertyFlags::NOT_IN_CONFIG),
                PropertyDeclaration::new("excludeFiles", PropertyType::PathList)
                    .with_flags(PropertyFlags::NOT_IN_CONFIG),
                PropertyDeclaration::new("fileTags", PropertyType::StringList)
                    .with_flags(PropertyFlags::NOT_IN_CONFIG),
                PropertyDeclaration::new("prefix", PropertyType::String)
                    .with_flags(PropertyFlags::NOT_IN_CONFIG),
                PropertyDeclaration::new("overrideTags", PropertyType::Boolean)
                    .with_flags(PropertyFlags::NOT_IN_CONFIG)
                    .with_initial_value("true"),
            ]),
        );

        builtins.insert(
            ItemType::Project,
            decl_map(vec![
                condition_property(),
                name_property(),
                PropertyDeclaration::new("references", PropertyType::PathList),
                PropertyDeclaration::new("moduleSearchPaths", PropertyType::PathList),
            ]),
        );

        builtins.insert(
            ItemType::Product,
            decl_map(vec![
                condition_property(),
                PropertyDeclaration::new("type", PropertyType::StringList),
                name_property(),
                PropertyDeclaration::new("targetName", PropertyType::String)
                    .with_initial_value("name"),
                PropertyDeclaration::new("destinationDirectory", PropertyType::String),
                PropertyDeclaration::new("consoleApplication", PropertyType::Boolean),
                PropertyDeclaration::new("files", PropertyType::PathList)
                    .with_flags(PropertyFlags::NOT_IN_CONFIG),
                PropertyDeclaration::new("excludeFiles", PropertyType::PathList)
                    .with_flags(PropertyFlags::NOT_IN_CONFIG),
                PropertyDeclaration::new("moduleSearchPaths", PropertyType::PathList),
                PropertyDeclaration::new("version", PropertyType::String),
            ]),
        );

        builtins.insert(
            ItemType::FileTagger,
            decl_map(vec![
                PropertyDeclaration::new("patterns", PropertyType::StringList),
                PropertyDeclaration::new("fileTags", PropertyType::StringList),
            ]),
        );

        builtins.insert(
            ItemType::Artifact,
            decl_map(vec![
                condition_property(),
                PropertyDeclaration::new("filePath", PropertyType::Verbatim),
                PropertyDeclaration::new("fileTags", PropertyType::StringList),
                PropertyDeclaration::new("alwaysUpdated", PropertyType::Boolean)
                    .with_initial_value("true"),
            ]),
        );

        builtins.insert(
            ItemType::Rule,
            decl_map(vec![
                condition_property(),
                PropertyDeclaration::new("multiplex", PropertyType::Boolean)
                    .with_initial_value("false"),
                PropertyDeclaration::new("inputs", PropertyType::StringList),
                PropertyDeclaration::new("usings", PropertyType::StringList).deprecated(
                    Version::new(2, 0),
                    "use 'inputsFromDependencies' instead",
                ),
                PropertyDeclaration::new("inputsFromDependencies", PropertyType::StringList),
                PropertyDeclaration::new("explicitlyDependsOn", PropertyType::StringList),
                PropertyDeclaration::new("prepare", PropertyType::Verbatim)
                    .with_function_arguments(&[
                        "project", "product", "inputs", "outputs", "input", "output",
                    ]),
            ]),
        );

        builtins.insert(
            ItemType::Transformer,
            decl_map(vec![
                condition_property(),
                PropertyDeclaration::new("inputs", PropertyType::PathList),
                PropertyDeclaration::new("prepare", PropertyType::Verbatim)
                    .with_function_arguments(&["product", "inputs", "outputs"]),
                PropertyDeclaration::new("explicitlyDependsOn", PropertyType::StringList),
            ]),
        );

        builtins.insert(ItemType::Module, decl_map(module_like_properties()));
        builtins.insert(ItemType::Export, decl_map(module_like_properties()));

        builtins.insert(
            ItemType::PropertyOptions,
            decl_map(vec![
                name_property(),
                PropertyDeclaration::new("allowedValues", PropertyType::Variant),
                PropertyDeclaration::new("description", PropertyType::String),
            ]),
        );

        builtins.insert(
            ItemType::Probe,
            decl_map(vec![
                condition_property(),
                PropertyDeclaration::new("found", PropertyType::Boolean)
                    .with_initial_value("false"),
                PropertyDeclaration::new("configure", PropertyType::Verbatim),
            ]),
        );

        builtins.insert(ItemType::Properties, decl_map(vec![condition_property()]));

        let mut deprecated_types = IndexMap::new();
        deprecated_types.insert(
            ItemType::Transformer,
            DeprecationInfo {
                removal_version: Version::new(2, 0),
                message: "use a Rule without inputs instead",
            },
        );

        Self {
            language_version: LANGUAGE_VERSION,
            builtins,
            deprecated_types,
            empty: IndexMap::new(),
        }
    }

    pub fn language_version(&self) -> Version {
        self.language_version
    }

    pub fn type_for_name(&self, name: &str) -> Result<ItemType> {
        let t = match name {
            "Artifact" => ItemType::Artifact,
            "Depends" => ItemType::Depends,
            "Export" => ItemType::Export,
            "FileTagger" => ItemType::FileTagger,
            "Group" => ItemType::Group,
            "Module" => ItemType::Module,
            "Probe" => ItemType::Probe,
            "Product" => ItemType::Product,
            "Project" => ItemType::Project,
            "Properties" => ItemType::Properties,
            "PropertyOptions" => ItemType::PropertyOptions,
            "Rule" => ItemType::Rule,
            "Transformer" => ItemType::Transformer,
            _ => {
                return Err(Error::new(
                    ErrorKind::UnknownItemType,
                    format!("unknown item type `{name}`"),
                ))
            }
        };
        Ok(t)
    }

    /// The flattened declaration set for a type; empty for types without
    /// declared properties.
    pub fn declarations_for_type(&self, item_type: ItemType) -> &PropertyDeclarationMap {
        self.builtins.get(&item_type).unwrap_or(&self.empty)
    }

    pub const fn is_module_like(item_type: ItemType) -> bool {
        matches!(item_type, ItemType::Module | ItemType::Export)
    }

    pub fn type_deprecation(&self, item_type: ItemType) -> Option<&DeprecationInfo> {
        self.deprecated_types.get(&item_type)
    }

    /// Apply the configured deprecation policy to one deprecated use.
    pub fn check_deprecation(
        &self,
        what: &str,
        info: &DeprecationInfo,
        location: Option<&CodeLocation>,
        mode: DeprecationWarningMode,
    ) -> Result<()> {
        let current = self.language_version;
        let removal = info.removal_version;
        let suffix = if info.message.is_empty() {
            String::new()
        } else {
            format!(" ({})", info.message)
        };

        if current >= removal {
            let msg =
                format!("{what} is no longer supported, it was removed in version {removal}{suffix}");
            return Err(match location {
                Some(loc) => Error::at(ErrorKind::Deprecation, msg, loc.clone()),
                None => Error::new(ErrorKind::Deprecation, msg),
            });
        }

        let msg = format!("{what} is deprecated and will be removed in version {removal}{suffix}");
        match mode {
            DeprecationWarningMode::Off => Ok(()),
            DeprecationWarningMode::Error => Err(match location {
                Some(loc) => Error::at(ErrorKind::Deprecation, msg, loc.clone()),
                None => Error::new(ErrorKind::Deprecation, msg),
            }),
            DeprecationWarningMode::On => {
                match location {
                    Some(loc) => tracing::warn!(location = %loc, "{msg}"),
                    None => tracing::warn!("{msg}"),
                }
                Ok(())
            }
            DeprecationWarningMode::BeforeRemoval => {
                let imminent =
                    removal.major == current.major && removal.minor == current.minor + 1
                        || removal.major == current.major + 1 && removal.minor == 0;
                if imminent {
                    match location {
                        Some(loc) => tracing::warn!(location = %loc, "{msg}"),
                        None => tracing::warn!("{msg}"),
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_lookup() {
        let builtins = BuiltinDeclarations::new();
        assert_eq!(builtins.type_for_name("Product").unwrap(), ItemType::Product);
        let err = builtins.type_for_name("Widget").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownItemType);
    }

    #[test]
    fn module_like_types_share_the_common_set() {
        let builtins = BuiltinDeclarations::new();
        let module = builtins.declarations_for_type(ItemType::Module);
        let export = builtins.declarations_for_type(ItemType::Export);
        assert!(!module.is_empty());
        assert_eq!(
            module.keys().collect::<Vec<_>>(),
            export.keys().collect::<Vec<_>>()
        );
    }

    #[test]
    fn unknown_types_have_no_declarations() {
        let builtins = BuiltinDeclarations::new();
        // Properties only declares its condition.
        let props = builtins.declarations_for_type(ItemType::Properties);
        assert_eq!(props.len(), 1);
    }

    #[test]
    fn version_parsing_and_ordering() {
        let v: Version = "1.0".parse().unwrap();
        assert_eq!(v, Version::new(1, 0));
        assert!(Version::new(1, 1) > v);
        assert!("x.y".parse::<Version>().is_err());
    }

    #[test]
    fn deprecation_modes() {
        let builtins = BuiltinDeclarations::new();
        let info = DeprecationInfo {
            removal_version: Version::new(2, 0),
            message: "",
        };
        assert!(builtins
            .check_deprecation("Rule.usings", &info, None, DeprecationWarningMode::Off)
            .is_ok());
        assert!(builtins
            .check_deprecation("Rule.usings", &info, None, DeprecationWarningMode::On)
            .is_ok());
        let err = builtins
            .check_deprecation("Rule.usings", &info, None, DeprecationWarningMode::Error)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Deprecation);

        // Past the removal version the construct is gone in every mode.
        let gone = DeprecationInfo {
            removal_version: Version::new(1, 0),
            message: "",
        };
        assert!(builtins
            .check_deprecation("Rule.usings", &gone, None, DeprecationWarningMode::Off)
            .is_err());
    }
}
