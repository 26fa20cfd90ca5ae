//! Manifest file handling for centry

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::annotations::{
    Annotation, AnnotationError, annotation_string, namespace_key, parse_annotation,
};
use crate::environment::is_valid_env_name;
use crate::options::option::{CliOption, DefaultValue, OptionType, OptionValue};
use crate::options::set::OptionError;

pub const DEFAULT_DESCRIPTION: &str = "A declarative cli built using centry";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Errors that can occur while loading a manifest
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("manifest file not found (path={})", .0.display())]
    NotFound(PathBuf),
    #[error("manifest file must have a yaml, yml or json extension (path={})", .0.display())]
    UnsupportedExtension(PathBuf),
    #[error("a value must be specified for --centry-file")]
    MissingFileValue,
    #[error("failed to read manifest file (path={}): {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse manifest yaml (path={}): {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to parse manifest json (path={}): {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid manifest: {0}")]
    Validation(String),
}

/// A command backed by a script
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ManifestCommand {
    pub name: String,
    /// Script path relative to the manifest
    pub path: String,
    pub description: String,
    pub help: String,
    pub annotations: BTreeMap<String, String>,
    pub hidden: bool,
}

impl ManifestCommand {
    /// Parsed annotation stored under `<namespace>/<key>`, if present.
    ///
    /// # Errors
    ///
    /// Returns `AnnotationError` if the stored entry does not form a valid annotation.
    pub fn annotation(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Option<Annotation>, AnnotationError> {
        lookup_annotation(&self.annotations, namespace, key)
    }
}

/// A scalar default as written in the manifest
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DefaultScalar {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for DefaultScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultScalar::Bool(value) => write!(f, "{value}"),
            DefaultScalar::Integer(value) => write!(f, "{value}"),
            DefaultScalar::Float(value) => write!(f, "{value}"),
            DefaultScalar::Text(value) => f.write_str(value),
        }
    }
}

impl From<&DefaultScalar> for DefaultValue {
    fn from(scalar: &DefaultScalar) -> Self {
        match scalar {
            DefaultScalar::Bool(value) => DefaultValue::Bool(*value),
            DefaultScalar::Integer(value) => DefaultValue::Integer(*value),
            DefaultScalar::Float(_) | DefaultScalar::Text(_) => {
                DefaultValue::Text(scalar.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ManifestOptionValue {
    pub name: String,
    pub short: Option<String>,
    pub value: String,
}

/// A global option
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ManifestOption {
    #[serde(rename = "type")]
    pub kind: Option<OptionType>,
    pub name: String,
    pub short: Option<String>,
    pub env_name: Option<String>,
    pub values: Vec<ManifestOptionValue>,
    pub default: Option<DefaultScalar>,
    pub required: bool,
    pub description: String,
    pub annotations: BTreeMap<String, String>,
    pub hidden: bool,
}

impl ManifestOption {
    /// Parsed annotation stored under `<namespace>/<key>`, if present.
    ///
    /// # Errors
    ///
    /// Returns `AnnotationError` if the stored entry does not form a valid annotation.
    pub fn annotation(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Option<Annotation>, AnnotationError> {
        lookup_annotation(&self.annotations, namespace, key)
    }
}

impl TryFrom<&ManifestOption> for CliOption {
    type Error = OptionError;

    fn try_from(option: &ManifestOption) -> Result<Self, Self::Error> {
        let kind = option
            .kind
            .ok_or_else(|| OptionError::MissingType(option.name.clone()))?;
        Ok(CliOption {
            kind,
            name: option.name.clone(),
            short: option.short.clone().filter(|s| !s.is_empty()),
            env_name: option.env_name.clone().filter(|s| !s.is_empty()),
            description: option.description.clone(),
            required: option.required,
            hidden: option.hidden,
            internal: false,
            values: option
                .values
                .iter()
                .map(|v| OptionValue {
                    name: v.name.clone(),
                    short: v.short.clone().filter(|s| !s.is_empty()),
                    value: v.value.clone(),
                })
                .collect(),
            default: option.default.as_ref().map(DefaultValue::from).unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: DEFAULT_LOG_LEVEL.to_string(),
            prefix: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ManifestConfig {
    pub name: String,
    pub description: String,
    pub version: String,
    pub log: LogConfig,
    pub environment_prefix: String,
    pub hide_internal_commands: bool,
    pub hide_internal_options: bool,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        ManifestConfig {
            name: String::new(),
            description: DEFAULT_DESCRIPTION.to_string(),
            version: String::new(),
            log: LogConfig::default(),
            environment_prefix: String::new(),
            hide_internal_commands: true,
            hide_internal_options: true,
        }
    }
}

/// Root of a manifest file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Manifest {
    /// Sourced before every command, relative to the manifest
    pub scripts: Vec<String>,
    pub commands: Vec<ManifestCommand>,
    pub options: Vec<ManifestOption>,
    pub config: ManifestConfig,
    /// Absolute path of the manifest file
    #[serde(skip)]
    pub path: PathBuf,
    /// Directory of the manifest file
    #[serde(skip)]
    pub base_path: PathBuf,
}

impl Manifest {
    /// Loads and parses a manifest file, resolving its absolute path and base directory.
    ///
    /// # Errors
    ///
    /// Returns `ManifestError::UnsupportedExtension` for anything but yaml, yml or json,
    /// `ManifestError::NotFound` if the file does not exist, `ManifestError::Read` if it cannot
    /// be read, or `ManifestError::Yaml`/`ManifestError::Json` if parsing fails.
    pub fn from_file(file: &Path) -> Result<Manifest, ManifestError> {
        let extension = file.extension().and_then(|ext| ext.to_str());
        let is_json = match extension {
            Some("yaml" | "yml") => false,
            Some("json") => true,
            _ => return Err(ManifestError::UnsupportedExtension(file.to_path_buf())),
        };
        if !file.exists() {
            return Err(ManifestError::NotFound(file.to_path_buf()));
        }

        let contents = std::fs::read_to_string(file).map_err(|source| ManifestError::Read {
            path: file.to_path_buf(),
            source,
        })?;
        let mut manifest = Self::parse(&contents, is_json, file)?;

        let path = std::fs::canonicalize(file).map_err(|source| ManifestError::Read {
            path: file.to_path_buf(),
            source,
        })?;
        manifest.base_path = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| ManifestError::NotFound(path.clone()))?;
        manifest.path = path;
        debug!(
            "loaded manifest {} (base path: {})",
            manifest.path.display(),
            manifest.base_path.display()
        );
        Ok(manifest)
    }

    fn parse(contents: &str, is_json: bool, file: &Path) -> Result<Manifest, ManifestError> {
        if is_json {
            serde_json::from_str(contents).map_err(|source| ManifestError::Json {
                path: file.to_path_buf(),
                source,
            })
        } else {
            serde_yaml::from_str(contents).map_err(|source| ManifestError::Yaml {
                path: file.to_path_buf(),
                source,
            })
        }
    }

    /// Structural checks the parser cannot express
    ///
    /// # Errors
    ///
    /// Returns `ManifestError::Validation` naming the first violation found.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.config.name.trim().is_empty() {
            return Err(ManifestError::Validation(
                "config.name must not be empty".to_string(),
            ));
        }
        let prefix = &self.config.environment_prefix;
        if !prefix.is_empty() && !is_valid_env_name(prefix) {
            return Err(ManifestError::Validation(format!(
                "config.environmentPrefix \"{prefix}\" is not a valid environment variable name"
            )));
        }

        let mut seen = HashSet::new();
        for (index, command) in self.commands.iter().enumerate() {
            if command.name.trim().is_empty() {
                return Err(ManifestError::Validation(format!(
                    "command at index {index} has an empty name"
                )));
            }
            if command.path.trim().is_empty() {
                return Err(ManifestError::Validation(format!(
                    "command \"{}\" has an empty path",
                    command.name
                )));
            }
            if !seen.insert(command.name.as_str()) {
                return Err(ManifestError::Validation(format!(
                    "command \"{}\" is declared more than once",
                    command.name
                )));
            }
        }

        for (index, option) in self.options.iter().enumerate() {
            if option.name.trim().is_empty() {
                return Err(ManifestError::Validation(format!(
                    "option at index {index} has an empty name"
                )));
            }
        }

        Ok(())
    }
}

fn lookup_annotation(
    annotations: &BTreeMap<String, String>,
    namespace: &str,
    key: &str,
) -> Result<Option<Annotation>, AnnotationError> {
    match annotations.get(&namespace_key(namespace, key)) {
        Some(value) if !value.is_empty() => {
            parse_annotation(&annotation_string(namespace, key, value))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::API_NAMESPACE;

    const MANIFEST: &str = r"
scripts:
  - scripts/init.sh
commands:
  - name: get
    path: commands/get.sh
    description: Gets resources
    annotations:
      centry.api/serve: 'true'
options:
  - name: verbose
    type: bool
    short: V
  - name: count
    type: integer
    default: 3
  - name: mode
    type: select/v2
    values:
      - name: fast
        value: FAST
      - name: slow
config:
  name: app
  version: 1.0.0
  environmentPrefix: APP_
  log:
    level: debug
";

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_from_file_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "centry.yaml", MANIFEST);
        let manifest = Manifest::from_file(&path).unwrap();

        assert_eq!(manifest.scripts, vec!["scripts/init.sh"]);
        assert_eq!(manifest.commands[0].name, "get");
        assert_eq!(manifest.options.len(), 3);
        assert_eq!(manifest.options[2].kind, Some(OptionType::SelectGroup));
        assert_eq!(manifest.config.environment_prefix, "APP_");
        assert_eq!(manifest.config.log.level, "debug");
        assert_eq!(manifest.config.description, DEFAULT_DESCRIPTION);
        assert!(manifest.config.hide_internal_commands);
        assert!(manifest.path.is_absolute());
        assert_eq!(manifest.base_path, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_from_file_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "centry.json",
            r#"{
                "config": {"name": "app", "hideInternalOptions": false},
                "commands": [{"name": "get", "path": "get.sh"}]
            }"#,
        );
        let manifest = Manifest::from_file(&path).unwrap();
        assert_eq!(manifest.config.name, "app");
        assert!(!manifest.config.hide_internal_options);
        assert_eq!(manifest.config.log.level, DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn test_unsupported_extension() {
        match Manifest::from_file(Path::new("centry.toml")) {
            Err(e @ ManifestError::UnsupportedExtension(_)) => assert_eq!(
                e.to_string(),
                "manifest file must have a yaml, yml or json extension (path=centry.toml)"
            ),
            other => panic!("Expected UnsupportedExtension, got: {other:?}"),
        }
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.yml");
        assert!(matches!(
            Manifest::from_file(&path),
            Err(ManifestError::NotFound(_))
        ));
    }

    #[test]
    fn test_invalid_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "centry.yaml", "commands: [");
        assert!(matches!(
            Manifest::from_file(&path),
            Err(ManifestError::Yaml { .. })
        ));
    }

    #[test]
    fn test_unknown_option_type_is_rejected() {
        let result: Result<Manifest, _> =
            serde_yaml::from_str("options:\n  - name: x\n    type: float\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate() {
        let mut manifest: Manifest = serde_yaml::from_str(MANIFEST).unwrap();
        assert!(manifest.validate().is_ok());

        manifest.commands.push(manifest.commands[0].clone());
        match manifest.validate() {
            Err(ManifestError::Validation(message)) => assert!(message.contains("\"get\"")),
            other => panic!("Expected Validation, got: {other:?}"),
        }

        manifest.commands.pop();
        manifest.commands[0].path = String::new();
        assert!(manifest.validate().is_err());

        let unnamed = Manifest::default();
        assert!(unnamed.validate().is_err());
    }

    #[test]
    fn test_environment_prefix_must_be_exportable() {
        let mut manifest: Manifest = serde_yaml::from_str(MANIFEST).unwrap();
        manifest.config.environment_prefix = "X=1;".to_string();
        match manifest.validate() {
            Err(ManifestError::Validation(message)) => {
                assert!(message.contains("config.environmentPrefix"), "{message}");
            }
            other => panic!("Expected Validation, got: {other:?}"),
        }
    }

    #[test]
    fn test_annotation_lookup() {
        let manifest: Manifest = serde_yaml::from_str(MANIFEST).unwrap();
        let annotation = manifest.commands[0]
            .annotation(API_NAMESPACE, "serve")
            .unwrap()
            .unwrap();
        assert!(annotation.is_true());
        assert_eq!(manifest.options[0].annotation(API_NAMESPACE, "serve"), Ok(None));
    }

    #[test]
    fn test_option_conversion() {
        let manifest: Manifest = serde_yaml::from_str(MANIFEST).unwrap();
        let verbose = CliOption::try_from(&manifest.options[0]).unwrap();
        assert_eq!(verbose.kind, OptionType::Bool);
        assert_eq!(verbose.short.as_deref(), Some("V"));

        let count = CliOption::try_from(&manifest.options[1]).unwrap();
        assert_eq!(count.default, DefaultValue::Integer(3));

        let mode = CliOption::try_from(&manifest.options[2]).unwrap();
        assert_eq!(mode.values.len(), 2);
        assert_eq!(mode.values[0].resolved_value(), "FAST");

        let untyped = ManifestOption {
            name: "x".to_string(),
            ..Default::default()
        };
        match CliOption::try_from(&untyped) {
            Err(OptionError::MissingType(name)) => assert_eq!(name, "x"),
            other => panic!("Expected MissingType, got: {other:?}"),
        }
    }
}
