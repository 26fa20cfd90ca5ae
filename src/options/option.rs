use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed set of option kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
pub enum OptionType {
    #[default]
    #[serde(rename = "string")]
    String,
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "integer")]
    Integer,
    /// Legacy select: a boolean flag grouped with its siblings by `env_name`
    #[serde(rename = "select")]
    Select,
    /// Select group: one option whose `values` each become a boolean flag
    #[serde(rename = "select/v2")]
    SelectGroup,
}

impl OptionType {
    /// Lenient conversion used for script annotations: unknown types fall back to `String`.
    #[must_use]
    pub fn from_annotation(text: &str) -> Self {
        text.parse().unwrap_or_default()
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OptionType::String => "string",
            OptionType::Bool => "bool",
            OptionType::Integer => "integer",
            OptionType::Select => "select",
            OptionType::SelectGroup => "select/v2",
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown option type \"{0}\"")]
pub struct UnknownOptionType(pub String);

impl FromStr for OptionType {
    type Err = UnknownOptionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "string" => Ok(OptionType::String),
            "bool" => Ok(OptionType::Bool),
            "integer" => Ok(OptionType::Integer),
            "select" => Ok(OptionType::Select),
            "select/v2" => Ok(OptionType::SelectGroup),
            _ => Err(UnknownOptionType(s.to_string())),
        }
    }
}

/// Default value of an option. Declared defaults arrive as `Text` and are coerced to the
/// option's type when the option is added to a set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DefaultValue {
    #[default]
    Unset,
    Text(String),
    Bool(bool),
    Integer(i64),
}

impl fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Unset => Ok(()),
            DefaultValue::Text(text) => f.write_str(text),
            DefaultValue::Bool(value) => write!(f, "{value}"),
            DefaultValue::Integer(value) => write!(f, "{value}"),
        }
    }
}

/// One member of a select group
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OptionValue {
    pub name: String,
    pub short: Option<String>,
    /// Written to the environment when selected, falls back to `name` when empty
    pub value: String,
}

impl OptionValue {
    #[must_use]
    pub fn resolved_value(&self) -> &str {
        if self.value.is_empty() {
            &self.name
        } else {
            &self.value
        }
    }
}

/// A declared flag
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliOption {
    pub kind: OptionType,
    pub name: String,
    /// Single character alias
    pub short: Option<String>,
    /// Environment variable name override, also the group key of legacy select options
    pub env_name: Option<String>,
    pub description: String,
    pub required: bool,
    pub hidden: bool,
    /// Bookkeeping options are never prefixed when projected to the environment
    pub internal: bool,
    pub values: Vec<OptionValue>,
    pub default: DefaultValue,
}

impl CliOption {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: OptionType) -> Self {
        CliOption {
            kind,
            name: name.into(),
            ..Default::default()
        }
    }

    /// Name of the select group this option belongs to, if it is a select option.
    /// Legacy selects without an `env_name` form a group of their own.
    #[must_use]
    pub fn group_name(&self) -> Option<&str> {
        match self.kind {
            OptionType::Select => Some(self.env_name.as_deref().unwrap_or(&self.name)),
            OptionType::SelectGroup => Some(&self.name),
            OptionType::String | OptionType::Bool | OptionType::Integer => None,
        }
    }
}
