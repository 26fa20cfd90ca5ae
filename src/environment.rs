//! Projection of resolved option values onto environment variables

use std::sync::LazyLock;

use regex::Regex;

use crate::options::flags::ResolvedFlags;
use crate::options::option::{CliOption, OptionType};
use crate::options::set::OptionsSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentVariableType {
    String,
    Bool,
    Integer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: String,
    pub kind: EnvironmentVariableType,
}

impl EnvironmentVariable {
    /// The `export` statement for the generated script. Empty values produce no line.
    /// String values are shell-quoted, booleans and integers are written bare.
    #[must_use]
    pub fn export_line(&self) -> Option<String> {
        if self.value.is_empty() {
            return None;
        }
        let line = match self.kind {
            EnvironmentVariableType::String => format!(
                "export {}='{}'",
                self.name,
                self.value.replace('\'', r"'\''")
            ),
            EnvironmentVariableType::Bool | EnvironmentVariableType::Integer => {
                format!("export {}={}", self.name, self.value)
            }
        };
        Some(line)
    }
}

static ENV_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("environment name pattern is valid")
});

/// Uppercase and replace `.` and `-` with `_`
#[must_use]
pub fn normalize_env_name(name: &str) -> String {
    name.to_uppercase().replace(['.', '-'], "_")
}

/// True when `name` can be exported by a shell without quoting
#[must_use]
pub fn is_valid_env_name(name: &str) -> bool {
    ENV_NAME.is_match(name)
}

/// Canonical variable name of an option: `env_name` or `name`, normalized, with `prefix`
/// prepended unless the option is internal.
#[must_use]
pub fn env_name(option: &CliOption, prefix: &str) -> String {
    let name = normalize_env_name(option.env_name.as_deref().unwrap_or(&option.name));
    if prefix.is_empty() || option.internal {
        name
    } else {
        format!("{prefix}{name}")
    }
}

/// Project every option of `set` onto an environment variable, sorted by name.
///
/// Plain options carry their resolved value, falling back to their default. Select options
/// only produce a variable when selected.
#[must_use]
pub fn project(set: &OptionsSet, flags: &ResolvedFlags, prefix: &str) -> Vec<EnvironmentVariable> {
    let mut vars: Vec<EnvironmentVariable> = set
        .sorted()
        .into_iter()
        .filter_map(|option| project_option(option, flags, prefix))
        .collect();
    vars.sort_by(|a, b| a.name.cmp(&b.name));
    vars
}

fn project_option(
    option: &CliOption,
    flags: &ResolvedFlags,
    prefix: &str,
) -> Option<EnvironmentVariable> {
    let name = env_name(option, prefix);
    let resolved = || {
        flags
            .get(&option.name)
            .map_or_else(|| option.default.to_string(), str::to_string)
    };

    let (value, kind) = match option.kind {
        OptionType::String => (resolved(), EnvironmentVariableType::String),
        OptionType::Bool => (resolved(), EnvironmentVariableType::Bool),
        OptionType::Integer => (resolved(), EnvironmentVariableType::Integer),
        OptionType::Select => {
            if !flags.is_true(&option.name) {
                return None;
            }
            (option.name.clone(), EnvironmentVariableType::String)
        }
        OptionType::SelectGroup => {
            let selected = option.values.iter().find(|v| flags.is_true(&v.name))?;
            (
                selected.resolved_value().to_string(),
                EnvironmentVariableType::String,
            )
        }
    };

    Some(EnvironmentVariable { name, value, kind })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::option::{DefaultValue, OptionValue};

    #[test]
    fn test_normalize_env_name() {
        assert_eq!(normalize_env_name("config.log-level"), "CONFIG_LOG_LEVEL");
        assert_eq!(normalize_env_name("plain"), "PLAIN");
    }

    #[test]
    fn test_valid_env_names() {
        assert!(is_valid_env_name("CONFIG_LOG_LEVEL"));
        assert!(is_valid_env_name("_private2"));
        assert!(!is_valid_env_name(""));
        assert!(!is_valid_env_name("2FAST"));
        assert!(!is_valid_env_name("A;ECHO INJECTED>&2;B"));
        assert!(!is_valid_env_name("A B"));
    }

    #[test]
    fn test_prefix_is_skipped_for_internal_options() {
        let option = CliOption::new("config.log.level", OptionType::String);
        assert_eq!(env_name(&option, "APP_"), "APP_CONFIG_LOG_LEVEL");

        let internal = CliOption {
            internal: true,
            ..CliOption::new("config.log.level", OptionType::String)
        };
        assert_eq!(env_name(&internal, "APP_"), "CONFIG_LOG_LEVEL");
        assert_eq!(env_name(&option, ""), "CONFIG_LOG_LEVEL");
    }

    #[test]
    fn test_env_name_override() {
        let option = CliOption {
            env_name: Some("custom-name".to_string()),
            ..CliOption::new("opt", OptionType::String)
        };
        assert_eq!(env_name(&option, "P_"), "P_CUSTOM_NAME");
    }

    #[test]
    fn test_project_values_and_defaults() {
        let mut set = OptionsSet::new("test");
        set.add(CliOption::new("opt1", OptionType::String)).unwrap();
        set.add(CliOption::new("verbose", OptionType::Bool)).unwrap();
        set.add(CliOption {
            default: DefaultValue::Text("7".to_string()),
            ..CliOption::new("count", OptionType::Integer)
        })
        .unwrap();

        let flags = ResolvedFlags::new().with("opt1", "x");
        let vars = project(&set, &flags, "");
        assert_eq!(
            vars,
            vec![
                EnvironmentVariable {
                    name: "COUNT".to_string(),
                    value: "7".to_string(),
                    kind: EnvironmentVariableType::Integer,
                },
                EnvironmentVariable {
                    name: "OPT1".to_string(),
                    value: "x".to_string(),
                    kind: EnvironmentVariableType::String,
                },
                EnvironmentVariable {
                    name: "VERBOSE".to_string(),
                    value: "false".to_string(),
                    kind: EnvironmentVariableType::Bool,
                },
            ]
        );
    }

    #[test]
    fn test_project_orders_by_variable_name() {
        let mut set = OptionsSet::new("test");
        set.add(CliOption {
            env_name: Some("Z".to_string()),
            ..CliOption::new("a", OptionType::String)
        })
        .unwrap();
        set.add(CliOption::new("b", OptionType::String)).unwrap();

        let flags = ResolvedFlags::new().with("a", "1").with("b", "2");
        let names: Vec<String> = project(&set, &flags, "")
            .into_iter()
            .map(|v| v.name)
            .collect();
        assert_eq!(names, vec!["B", "Z"]);
    }

    #[test]
    fn test_legacy_select_projects_option_name_under_group() {
        let mut set = OptionsSet::new("test");
        for name in ["selectopt1", "selectopt2"] {
            set.add(CliOption {
                env_name: Some("SELECTOPT".to_string()),
                ..CliOption::new(name, OptionType::Select)
            })
            .unwrap();
        }

        let flags = ResolvedFlags::new()
            .with("selectopt1", "false")
            .with("selectopt2", "true");
        let vars = project(&set, &flags, "");
        assert_eq!(vars.len(), 1);
        assert_eq!(vars[0].name, "SELECTOPT");
        assert_eq!(vars[0].value, "selectopt2");

        assert!(project(&set, &ResolvedFlags::new(), "").is_empty());
    }

    #[test]
    fn test_select_group_projects_resolved_value() {
        let mut set = OptionsSet::new("test");
        set.add(CliOption {
            values: vec![
                OptionValue {
                    name: "fast".to_string(),
                    value: "FAST_MODE".to_string(),
                    ..Default::default()
                },
                OptionValue {
                    name: "slow".to_string(),
                    ..Default::default()
                },
            ],
            ..CliOption::new("mode", OptionType::SelectGroup)
        })
        .unwrap();

        let vars = project(&set, &ResolvedFlags::new().with("fast", "true"), "APP_");
        assert_eq!(vars[0].name, "APP_MODE");
        assert_eq!(vars[0].value, "FAST_MODE");

        let vars = project(&set, &ResolvedFlags::new().with("slow", "true"), "");
        assert_eq!(vars[0].value, "slow");
    }

    #[test]
    fn test_export_lines() {
        let var = |value: &str, kind| EnvironmentVariable {
            name: "NAME".to_string(),
            value: value.to_string(),
            kind,
        };
        assert_eq!(
            var("it's here", EnvironmentVariableType::String).export_line(),
            Some(r"export NAME='it'\''s here'".to_string())
        );
        assert_eq!(
            var("true", EnvironmentVariableType::Bool).export_line(),
            Some("export NAME=true".to_string())
        );
        assert_eq!(
            var("12", EnvironmentVariableType::Integer).export_line(),
            Some("export NAME=12".to_string())
        );
        assert_eq!(var("", EnvironmentVariableType::String).export_line(), None);
    }
}
