//! Function descriptors built from a script's exported names and comment annotations

use std::collections::BTreeMap;

use crate::annotations::{Annotation, CMD_NAMESPACE, CMD_OPTION_NAMESPACE, TRUE_STRING};
use crate::diagnostics::Diagnostics;
use crate::options::option::{CliOption, DefaultValue, OptionType};
use crate::options::set::OptionsSet;

/// Separates the path segments of a namespaced function name, e.g. `get:sub`
pub const NAMESPACE_SEPARATOR: char = ':';

/// One invocable function of a script
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Function {
    /// Namespace qualified name, e.g. `get:sub`
    pub name: String,
    pub description: String,
    pub help: String,
    pub hidden: bool,
    pub options: OptionsSet,
}

impl Function {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Function {
            options: OptionsSet::new(name.clone()),
            name,
            ..Default::default()
        }
    }
}

/// Build one function per exported name, applying the annotations addressed to it.
///
/// Options that fail validation are dropped with a warning; the function keeps the rest.
pub fn build_functions(
    names: &[String],
    annotations: &[Annotation],
    diagnostics: &mut Diagnostics,
) -> Vec<Function> {
    names
        .iter()
        .map(|name| build_function(name, annotations, diagnostics))
        .collect()
}

fn build_function(
    name: &str,
    annotations: &[Annotation],
    diagnostics: &mut Diagnostics,
) -> Function {
    diagnostics.debug(format!("building function \"{name}\""));

    let mut function = Function::new(name);
    let mut options: BTreeMap<&str, CliOption> = BTreeMap::new();

    for annotation in annotations.iter().filter(|a| a.param("cmd") == Some(name)) {
        match annotation.namespace.as_str() {
            CMD_OPTION_NAMESPACE => {
                let Some(option_name) = annotation.param("option") else {
                    continue;
                };
                let option = options
                    .entry(option_name)
                    .or_insert_with(|| CliOption::new(option_name, OptionType::String));
                apply_option_key(option, annotation);
            }
            CMD_NAMESPACE => match annotation.key.as_str() {
                "description" => function.description.clone_from(&annotation.value),
                "help" => function.help.clone_from(&annotation.value),
                "hidden" => function.hidden = annotation.value == TRUE_STRING,
                _ => {}
            },
            _ => {}
        }
    }

    for option in options.into_values() {
        let option_name = option.name.clone();
        let kind = option.kind;
        if let Err(e) = function.options.add(option) {
            diagnostics.warn(format!(
                "dropping option \"{option_name}\" (type={kind}) of function \"{name}\", error: {e}"
            ));
        }
    }

    function
}

fn apply_option_key(option: &mut CliOption, annotation: &Annotation) {
    let value = &annotation.value;
    match annotation.key.as_str() {
        "type" => option.kind = OptionType::from_annotation(value),
        "short" => option.short = Some(value.clone()).filter(|s| !s.is_empty()),
        "envName" => option.env_name = Some(value.clone()).filter(|s| !s.is_empty()),
        "description" => option.description.clone_from(value),
        "default" => option.default = DefaultValue::Text(value.clone()),
        "required" => option.required = value == TRUE_STRING,
        "hidden" => option.hidden = value == TRUE_STRING,
        _ => {}
    }
}

/// Prefix shared by every function nested below a command, e.g. `get:`
#[must_use]
pub fn function_namespace(command: &str) -> String {
    format!("{command}{NAMESPACE_SEPARATOR}")
}

/// True when the function is the command itself or lives in its namespace.
/// Helper functions of a script are never surfaced as commands.
#[must_use]
pub fn is_exposed(function: &str, command: &str) -> bool {
    function == command || function.starts_with(&function_namespace(command))
}

/// Split a namespaced function name into command path segments
#[must_use]
pub fn invocation_path(name: &str) -> Vec<&str> {
    name.split(NAMESPACE_SEPARATOR).collect()
}
