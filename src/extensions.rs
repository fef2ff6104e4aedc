use crate::value::Value;

use std::collections::BTreeMap;
use std::path::Path;

use lazy_static::lazy_static;

/// A host function exposed to property expressions, e.g. `FileInfo.fileName`.
/// Errors are plain strings; the evaluator attaches the call site.
pub type ExtensionFn = fn(&[Value]) -> core::result::Result<Value, String>;

pub struct Extension {
    functions: BTreeMap<&'static str, ExtensionFn>,
}

impl Extension {
    pub fn function(&self, name: &str) -> Option<ExtensionFn> {
        self.functions.get(name).copied()
    }

    pub fn function_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.functions.keys().copied()
    }
}

fn arg_str<'a>(args: &'a [Value], idx: usize, fcn: &str) -> core::result::Result<&'a str, String> {
    match args.get(idx) {
        Some(Value::String(s)) => Ok(s.as_ref()),
        Some(v) => Err(format!("{fcn}: argument {} is not a string: {v}", idx + 1)),
        None => Err(format!("{fcn} expects at least {} argument(s)", idx + 1)),
    }
}

mod environment {
    use super::*;

    pub fn get_env(args: &[Value]) -> core::result::Result<Value, String> {
        let name = arg_str(args, 0, "getEnv")?;
        Ok(match std::env::var(name) {
            Ok(v) => Value::from(v),
            Err(_) => Value::Undefined,
        })
    }

    pub fn current_env(_args: &[Value]) -> core::result::Result<Value, String> {
        let mut map = std::collections::BTreeMap::new();
        for (k, v) in std::env::vars() {
            map.insert(k, Value::from(v));
        }
        Ok(Value::from(map))
    }
}

mod file {
    use super::*;

    pub fn exists(args: &[Value]) -> core::result::Result<Value, String> {
        let path = arg_str(args, 0, "exists")?;
        Ok(Value::from(Path::new(path).exists()))
    }
}

mod fileinfo {
    use super::*;

    pub fn file_name(args: &[Value]) -> core::result::Result<Value, String> {
        let path = arg_str(args, 0, "fileName")?;
        Ok(Value::from(
            Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        ))
    }

    pub fn base_name(args: &[Value]) -> core::result::Result<Value, String> {
        let path = arg_str(args, 0, "baseName")?;
        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Value::from(
            name.split_once('.').map(|(b, _)| b.to_string()).unwrap_or(name),
        ))
    }

    pub fn complete_base_name(args: &[Value]) -> core::result::Result<Value, String> {
        let path = arg_str(args, 0, "completeBaseName")?;
        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Value::from(
            name.rsplit_once('.').map(|(b, _)| b.to_string()).unwrap_or(name),
        ))
    }

    pub fn suffix(args: &[Value]) -> core::result::Result<Value, String> {
        let path = arg_str(args, 0, "suffix")?;
        Ok(Value::from(
            Path::new(path)
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default(),
        ))
    }

    pub fn path(args: &[Value]) -> core::result::Result<Value, String> {
        let path = arg_str(args, 0, "path")?;
        Ok(Value::from(
            Path::new(path)
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
        ))
    }

    pub fn join_paths(args: &[Value]) -> core::result::Result<Value, String> {
        let mut joined = std::path::PathBuf::new();
        for (i, _) in args.iter().enumerate() {
            joined.push(arg_str(args, i, "joinPaths")?);
        }
        Ok(Value::from(joined.to_string_lossy().into_owned()))
    }

    pub fn is_absolute_path(args: &[Value]) -> core::result::Result<Value, String> {
        let path = arg_str(args, 0, "isAbsolutePath")?;
        Ok(Value::from(Path::new(path).is_absolute()))
    }

    pub fn relative_path(args: &[Value]) -> core::result::Result<Value, String> {
        let base = arg_str(args, 0, "relativePath")?;
        let path = arg_str(args, 1, "relativePath")?;
        match Path::new(path).strip_prefix(base) {
            Ok(rel) => Ok(Value::from(rel.to_string_lossy().into_owned())),
            Err(_) => Ok(Value::from(path)),
        }
    }
}

mod utilities {
    use super::*;

    pub fn host_os(_args: &[Value]) -> core::result::Result<Value, String> {
        let mut os: Vec<Value> = vec![];
        if cfg!(target_os = "linux") {
            os.push(Value::from("linux"));
        }
        if cfg!(target_os = "macos") {
            os.push(Value::from("macos"));
            os.push(Value::from("darwin"));
        }
        if cfg!(target_family = "unix") {
            os.push(Value::from("unix"));
        }
        if cfg!(target_os = "windows") {
            os.push(Value::from("windows"));
        }
        Ok(Value::from(os))
    }

    pub fn version_compare(args: &[Value]) -> core::result::Result<Value, String> {
        let a = arg_str(args, 0, "versionCompare")?;
        let b = arg_str(args, 1, "versionCompare")?;
        let parse = |s: &str| -> Vec<u64> {
            s.split('.').map(|c| c.parse().unwrap_or(0)).collect()
        };
        let (va, vb) = (parse(a), parse(b));
        let ord = va.cmp(&vb) as i64;
        Ok(Value::from(ord))
    }
}

macro_rules! extension_table {
    ($(($fcn_name:literal, $fcn:path)),* $(,)?) => {{
        let mut m: BTreeMap<&'static str, ExtensionFn> = BTreeMap::new();
        $(m.insert($fcn_name, $fcn);)*
        Extension { functions: m }
    }};
}

lazy_static! {
    static ref EXTENSIONS: BTreeMap<&'static str, Extension> = {
        let mut m = BTreeMap::new();
        m.insert(
            "Environment",
            extension_table![
                ("getEnv", environment::get_env),
                ("currentEnv", environment::current_env),
            ],
        );
        m.insert("File", extension_table![("exists", file::exists)]);
        m.insert(
            "FileInfo",
            extension_table![
                ("baseName", fileinfo::base_name),
                ("completeBaseName", fileinfo::complete_base_name),
                ("fileName", fileinfo::file_name),
                ("isAbsolutePath", fileinfo::is_absolute_path),
                ("joinPaths", fileinfo::join_paths),
                ("path", fileinfo::path),
                ("relativePath", fileinfo::relative_path),
                ("suffix", fileinfo::suffix),
            ],
        );
        m.insert(
            "Utilities",
            extension_table![
                ("hostOS", utilities::host_os),
                ("versionCompare", utilities::version_compare),
            ],
        );
        // Host capabilities that only make sense while executing build
        // scripts; they resolve by name but reject calls during resolution.
        for name in ["Process", "PropertyList", "TemporaryDir", "TextFile", "Xml"] {
            m.insert(name, extension_table![]);
        }
        m
    };
}

/// Is `name` one of the built-in extension names? The set is closed and
/// case sensitive.
pub fn has_extension(name: &str) -> bool {
    EXTENSIONS.contains_key(name)
}

pub fn extension(name: &str) -> Option<&'static Extension> {
    EXTENSIONS.get(name)
}

/// Call an extension function, mapping the not-found cases to messages the
/// evaluator attaches to the call site.
pub fn call(ext_name: &str, fcn_name: &str, args: &[Value]) -> core::result::Result<Value, String> {
    let ext = extension(ext_name).ok_or_else(|| format!("no extension named `{ext_name}`"))?;
    match ext.function(fcn_name) {
        Some(f) => f(args),
        None => Err(format!(
            "`{ext_name}.{fcn_name}` is not available during project resolution"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_names_are_a_closed_set() {
        for name in [
            "Environment",
            "File",
            "FileInfo",
            "Process",
            "PropertyList",
            "TemporaryDir",
            "TextFile",
            "Utilities",
            "Xml",
        ] {
            assert!(has_extension(name), "{name} should be registered");
        }
        assert!(!has_extension("fileinfo"));
        assert!(!has_extension("Shell"));
    }

    #[test]
    fn fileinfo_functions() {
        let v = call("FileInfo", "fileName", &[Value::from("/a/b/c.tar.gz")]).unwrap();
        assert_eq!(v, Value::from("c.tar.gz"));
        let v = call("FileInfo", "baseName", &[Value::from("/a/b/c.tar.gz")]).unwrap();
        assert_eq!(v, Value::from("c"));
        let v = call("FileInfo", "completeBaseName", &[Value::from("/a/b/c.tar.gz")]).unwrap();
        assert_eq!(v, Value::from("c.tar"));
        let v = call(
            "FileInfo",
            "joinPaths",
            &[Value::from("/a"), Value::from("b"), Value::from("c")],
        )
        .unwrap();
        assert_eq!(v, Value::from("/a/b/c"));
    }

    #[test]
    fn script_only_extensions_reject_calls() {
        let err = call("TextFile", "readAll", &[]).unwrap_err();
        assert!(err.contains("not available"));
    }

    #[test]
    fn environment_get_env() {
        std::env::set_var("BRIX_EXTENSION_TEST", "on");
        let v = call("Environment", "getEnv", &[Value::from("BRIX_EXTENSION_TEST")]).unwrap();
        assert_eq!(v, Value::from("on"));
        let v = call("Environment", "getEnv", &[Value::from("BRIX_NO_SUCH_VAR")]).unwrap();
        assert!(v.is_undefined());
    }
}
