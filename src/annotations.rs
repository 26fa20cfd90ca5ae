//! Annotation mini-language embedded in script comments and manifest maps
//!
//! An annotation reads `<namespace>/<key>=<value>`, where the namespace is a dotted path whose
//! segments may carry a bracketed parameter, e.g. `centry.cmd[get].option[name]/type=bool`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Text value used by boolean annotations
pub const TRUE_STRING: &str = "true";

/// Prefix every annotation namespace starts with
pub const ANNOTATION_PREFIX: &str = "centry";

/// Function metadata (`description`, `help`, `hidden`)
pub const CMD_NAMESPACE: &str = "centry.cmd";

/// Per-function option definitions
pub const CMD_OPTION_NAMESPACE: &str = "centry.cmd.option";

/// HTTP exposure of commands and options
pub const API_NAMESPACE: &str = "centry.api";

static NAMESPACE_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.(\w[\w-]*)\[([0-9A-Za-z_:-]+)\]").expect("namespace parameter pattern is valid")
});

static BRACKET_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\[\]]*\]").expect("bracket group pattern is valid"));

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnnotationError {
    #[error("failed to parse annotation! The text \"{0}\" is not a valid annotation")]
    Malformed(String),
    #[error("failed to parse annotation! The text \"{0}\" has an empty key")]
    EmptyKey(String),
}

/// A parsed `namespace/key=value` annotation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Annotation {
    /// Namespace with every `[param]` group stripped, e.g. `centry.cmd.option`
    pub namespace: String,
    /// Bracket parameters keyed by the segment that carried them
    pub namespace_values: BTreeMap<String, String>,
    pub key: String,
    pub value: String,
}

impl Annotation {
    /// Bracket parameter carried by the given namespace segment
    #[must_use]
    pub fn param(&self, segment: &str) -> Option<&str> {
        self.namespace_values
            .get(segment)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// True when the annotation value is the literal `true`
    #[must_use]
    pub fn is_true(&self) -> bool {
        self.value == TRUE_STRING
    }
}

/// Re-serializes the annotation, putting each parameter back on the segment it belongs to.
impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let namespace = self
            .namespace
            .split('.')
            .map(|segment| match self.namespace_values.get(segment) {
                Some(value) => format!("{segment}[{value}]"),
                None => segment.to_string(),
            })
            .collect::<Vec<_>>()
            .join(".");
        write!(f, "{}", annotation_string(&namespace, &self.key, &self.value))
    }
}

/// Builds a `namespace/key` lookup string
#[must_use]
pub fn namespace_key(namespace: &str, key: &str) -> String {
    format!("{namespace}/{key}")
}

/// Builds a full `namespace/key=value` annotation string
#[must_use]
pub fn annotation_string(namespace: &str, key: &str, value: &str) -> String {
    format!("{}={value}", namespace_key(namespace, key))
}

/// Parse a line of text into an annotation.
///
/// Returns `Ok(None)` when the text is not an annotation at all: it does not start with
/// `centry`, it lacks a `/` or a `=`, or its namespace is not `centry` or `centry.<...>`.
/// Once the text qualifies as an annotation candidate, an `=` inside the namespace, a missing
/// `key=value` pair after the first `/` or an empty key is an error.
///
/// # Errors
///
/// Returns `AnnotationError::Malformed` if the namespace contains `=` or no `key=value` pair
/// follows it, or `AnnotationError::EmptyKey` if the key is empty.
pub fn parse_annotation(text: &str) -> Result<Option<Annotation>, AnnotationError> {
    let text = text.trim();

    if !text.starts_with(ANNOTATION_PREFIX) || !text.contains('/') || !text.contains('=') {
        return Ok(None);
    }

    let Some((namespace_raw, rest)) = text.split_once('/') else {
        return Ok(None);
    };

    let after_prefix = &namespace_raw[ANNOTATION_PREFIX.len()..];
    if !after_prefix.is_empty() && !after_prefix.starts_with(['.', '=']) {
        return Ok(None);
    }

    if namespace_raw.contains('=') {
        return Err(AnnotationError::Malformed(text.to_string()));
    }

    let Some((key, value)) = rest.split_once('=') else {
        return Err(AnnotationError::Malformed(text.to_string()));
    };

    if key.trim().is_empty() {
        return Err(AnnotationError::EmptyKey(text.to_string()));
    }

    Ok(Some(Annotation {
        namespace: cleanup_namespace(namespace_raw),
        namespace_values: extract_namespace_values(namespace_raw),
        key: key.to_string(),
        value: value.to_string(),
    }))
}

fn extract_namespace_values(namespace: &str) -> BTreeMap<String, String> {
    NAMESPACE_PARAM
        .captures_iter(namespace)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect()
}

fn cleanup_namespace(namespace: &str) -> String {
    BRACKET_GROUP.replace_all(namespace, "").into_owned()
}
