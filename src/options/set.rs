use std::collections::{BTreeMap, HashSet};

use thiserror::Error;

use crate::environment::{is_valid_env_name, normalize_env_name};
use crate::options::option::{CliOption, DefaultValue, OptionType};

/// Short aliases taken by the built-in `--help` and `--version` flags
pub const RESERVED_SHORTS: [&str; 2] = ["h", "v"];

/// Schema violations rejected by [`OptionsSet::add`]
#[derive(Error, Debug)]
pub enum OptionError {
    #[error("missing option name")]
    MissingName,
    #[error("missing option type for option \"{0}\"")]
    MissingType(String),
    #[error("missing name for a value of option \"{0}\"")]
    MissingValueName(String),
    #[error("select option \"{0}\" must declare at least one value")]
    MissingValues(String),
    #[error("invalid short name \"{short}\" for option \"{name}\" (must be a single character)")]
    InvalidShort { name: String, short: String },
    #[error("the short name \"{short}\" of option \"{name}\" is reserved")]
    ReservedShort { name: String, short: String },
    #[error("invalid environment variable name \"{env_name}\" for option \"{name}\"")]
    InvalidEnvName { name: String, env_name: String },
    #[error("an option with the name \"{0}\" has already been added")]
    DuplicateName(String),
    #[error("an option with the short name \"{short}\" has already been added (option \"{name}\")")]
    DuplicateShort { name: String, short: String },
    #[error("the value \"{value}\" of option \"{option}\" collides with an existing option name")]
    DuplicateValueName { option: String, value: String },
    #[error(
        "the value \"{value}\" of option \"{option}\" uses the short name \"{short}\" which has already been added"
    )]
    DuplicateValueShort {
        option: String,
        value: String,
        short: String,
    },
    #[error("invalid integer default \"{value}\" for option \"{name}\": {source}")]
    InvalidInteger {
        name: String,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("invalid boolean default \"{value}\" for option \"{name}\": {source}")]
    InvalidBool {
        name: String,
        value: String,
        #[source]
        source: std::str::ParseBoolError,
    },
}

/// A named, flat collection of options keyed by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionsSet {
    name: String,
    reserved_shorts: Vec<String>,
    items: BTreeMap<String, CliOption>,
}

impl OptionsSet {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        OptionsSet {
            name: name.into(),
            ..Default::default()
        }
    }

    /// A set whose options may not use the given short aliases
    #[must_use]
    pub fn with_reserved_shorts(name: impl Into<String>, shorts: &[&str]) -> Self {
        OptionsSet {
            name: name.into(),
            reserved_shorts: shorts.iter().map(|s| (*s).to_string()).collect(),
            items: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CliOption> {
        self.items.get(name)
    }

    /// Validate, coerce the default of, and register an option.
    ///
    /// The set is left untouched when an error is returned.
    ///
    /// # Errors
    ///
    /// Returns an `OptionError` naming the violated invariant: missing name or value name,
    /// a select group without values, a normalized environment variable name that is not a
    /// shell identifier, a malformed or reserved short alias, a name or short alias already
    /// taken by another option or select-group value, or a default that cannot be coerced to
    /// the option's type.
    pub fn add(&mut self, mut option: CliOption) -> Result<(), OptionError> {
        self.validate(&option)?;
        option.default = coerce_default(&option)?;
        self.items.insert(option.name.clone(), option);
        Ok(())
    }

    /// Options in ascending name order
    #[must_use]
    pub fn sorted(&self) -> Vec<&CliOption> {
        self.items.values().collect()
    }

    /// True when any option or select-group value uses this flag name
    #[must_use]
    pub fn contains_flag(&self, name: &str) -> bool {
        self.items
            .values()
            .any(|o| o.name == name || o.values.iter().any(|v| v.name == name))
    }

    /// True when any option or select-group value uses this short alias
    #[must_use]
    pub fn contains_short(&self, short: &str) -> bool {
        self.items.values().any(|o| {
            o.short.as_deref() == Some(short)
                || o.values.iter().any(|v| v.short.as_deref() == Some(short))
        })
    }

    fn validate(&self, option: &CliOption) -> Result<(), OptionError> {
        if option.name.trim().is_empty() {
            return Err(OptionError::MissingName);
        }
        if option.kind == OptionType::SelectGroup && option.values.is_empty() {
            return Err(OptionError::MissingValues(option.name.clone()));
        }
        if option.values.iter().any(|v| v.name.trim().is_empty()) {
            return Err(OptionError::MissingValueName(option.name.clone()));
        }
        let env_name = normalize_env_name(option.env_name.as_deref().unwrap_or(&option.name));
        if !is_valid_env_name(&env_name) {
            return Err(OptionError::InvalidEnvName {
                name: option.name.clone(),
                env_name,
            });
        }

        if self.contains_flag(&option.name) {
            return Err(OptionError::DuplicateName(option.name.clone()));
        }
        if let Some(short) = option.short.as_deref() {
            self.check_short(&option.name, short)?;
        }

        let mut own_names = HashSet::from([option.name.as_str()]);
        let mut own_shorts: HashSet<&str> = option.short.as_deref().into_iter().collect();
        for value in &option.values {
            if self.contains_flag(&value.name) || !own_names.insert(&value.name) {
                return Err(OptionError::DuplicateValueName {
                    option: option.name.clone(),
                    value: value.name.clone(),
                });
            }
            if let Some(short) = value.short.as_deref() {
                self.check_short(&value.name, short)
                    .map_err(|e| match e {
                        OptionError::DuplicateShort { .. } => OptionError::DuplicateValueShort {
                            option: option.name.clone(),
                            value: value.name.clone(),
                            short: short.to_string(),
                        },
                        other => other,
                    })?;
                if !own_shorts.insert(short) {
                    return Err(OptionError::DuplicateValueShort {
                        option: option.name.clone(),
                        value: value.name.clone(),
                        short: short.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn check_short(&self, name: &str, short: &str) -> Result<(), OptionError> {
        if short.chars().count() != 1 || short.trim().is_empty() || short == "-" {
            return Err(OptionError::InvalidShort {
                name: name.to_string(),
                short: short.to_string(),
            });
        }
        if self.reserved_shorts.iter().any(|r| r == short) {
            return Err(OptionError::ReservedShort {
                name: name.to_string(),
                short: short.to_string(),
            });
        }
        if self.contains_short(short) {
            return Err(OptionError::DuplicateShort {
                name: name.to_string(),
                short: short.to_string(),
            });
        }
        Ok(())
    }
}

fn coerce_default(option: &CliOption) -> Result<DefaultValue, OptionError> {
    let coerced = match (option.kind, &option.default) {
        (OptionType::Select | OptionType::SelectGroup, _)
        | (OptionType::Bool, DefaultValue::Unset) => DefaultValue::Bool(false),
        (OptionType::Bool, DefaultValue::Bool(value)) => DefaultValue::Bool(*value),
        (OptionType::Bool, DefaultValue::Text(text)) if text.trim().is_empty() => {
            DefaultValue::Bool(false)
        }
        (OptionType::Bool, DefaultValue::Text(text)) => {
            let value = text.trim().to_lowercase().parse::<bool>().map_err(|source| {
                OptionError::InvalidBool {
                    name: option.name.clone(),
                    value: text.clone(),
                    source,
                }
            })?;
            DefaultValue::Bool(value)
        }
        (OptionType::Bool, DefaultValue::Integer(value)) => DefaultValue::Bool(*value != 0),
        (OptionType::Integer, DefaultValue::Unset) => DefaultValue::Integer(0),
        (OptionType::Integer, DefaultValue::Integer(value)) => DefaultValue::Integer(*value),
        (OptionType::Integer, DefaultValue::Text(text)) if text.trim().is_empty() => {
            DefaultValue::Integer(0)
        }
        (OptionType::Integer, DefaultValue::Text(text)) => {
            let value = text.trim().parse::<i64>().map_err(|source| {
                OptionError::InvalidInteger {
                    name: option.name.clone(),
                    value: text.clone(),
                    source,
                }
            })?;
            DefaultValue::Integer(value)
        }
        (OptionType::Integer, DefaultValue::Bool(value)) => {
            DefaultValue::Integer(i64::from(*value))
        }
        (OptionType::String, DefaultValue::Unset) => DefaultValue::Text(String::new()),
        (OptionType::String, other) => DefaultValue::Text(other.to_string()),
    };
    Ok(coerced)
}
