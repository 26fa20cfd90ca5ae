//! Binding of options sets and the command tree to `clap`

use std::collections::HashSet;

use clap::builder::BoolishValueParser;
use clap::{Arg, ArgAction, ArgMatches, ColorChoice, Command as ClapCommand, value_parser};
use log::warn;

use crate::manifest::ManifestConfig;
use crate::options::flags::ResolvedFlags;
use crate::options::option::{CliOption, DefaultValue, OptionType};
use crate::options::set::{OptionsSet, RESERVED_SHORTS};
use crate::tree::CommandNode;

/// Id of the trailing arguments passed on to a script function
pub const ARGS_ID: &str = "centry-trailing-args";

const RESERVED_NAMES: [&str; 2] = ["help", "version"];

fn short_char(short: Option<&str>) -> Option<char> {
    short.and_then(|s| s.chars().next())
}

/// A boolean flag that also accepts an explicit `--name=true|false`
fn bool_arg(name: &str, short: Option<&str>, help: String, hidden: bool) -> Arg {
    let mut arg = Arg::new(name.to_string())
        .long(name.to_string())
        .help(help)
        .hide(hidden)
        .num_args(0..=1)
        .require_equals(true)
        .default_missing_value("true")
        .value_parser(BoolishValueParser::new());
    if let Some(short) = short_char(short) {
        arg = arg.short(short);
    }
    arg
}

fn option_arg(option: &CliOption) -> Vec<Arg> {
    let name = option.name.as_str();
    let short = option.short.as_deref();

    match option.kind {
        OptionType::String | OptionType::Integer => {
            let mut arg = Arg::new(name.to_string())
                .long(name.to_string())
                .help(option.description.clone())
                .hide(option.hidden)
                .action(ArgAction::Set)
                .required(option.required);
            if let Some(short) = short_char(short) {
                arg = arg.short(short);
            }
            if option.kind == OptionType::Integer {
                arg = arg.value_parser(value_parser!(i64)).value_name("INT");
            } else {
                arg = arg.value_name("VALUE");
            }
            let default = option.default.to_string();
            if !option.required && !default.is_empty() {
                arg = arg.default_value(default);
            }
            vec![arg]
        }
        OptionType::Bool => {
            let arg = bool_arg(name, short, option.description.clone(), option.hidden);
            if option.required {
                vec![arg.required(true)]
            } else {
                let default = matches!(option.default, DefaultValue::Bool(true));
                vec![arg.default_value(default.to_string())]
            }
        }
        OptionType::Select => {
            let arg = bool_arg(name, short, option.description.clone(), option.hidden);
            vec![arg.default_value("false")]
        }
        OptionType::SelectGroup => option
            .values
            .iter()
            .map(|value| {
                let help = format!(
                    "{} ({}={})",
                    option.description,
                    option.name,
                    value.resolved_value()
                );
                bool_arg(&value.name, value.short.as_deref(), help, option.hidden)
                    .default_value("false")
            })
            .collect(),
    }
}

/// `clap` arguments for every option of the set, in name order
#[must_use]
pub fn option_args(set: &OptionsSet) -> Vec<Arg> {
    set.sorted().into_iter().flat_map(option_arg).collect()
}

/// The root command carrying the global options
#[must_use]
pub fn root_command(config: &ManifestConfig, globals: &OptionsSet) -> ClapCommand {
    let mut root = ClapCommand::new(config.name.clone())
        .about(config.description.clone())
        .color(ColorChoice::Never)
        .disable_help_subcommand(true)
        .disable_version_flag(true)
        .arg_required_else_help(true)
        .args(option_args(globals).into_iter().map(|arg| arg.global(true)));

    if !config.version.is_empty() {
        root = root.version(config.version.clone()).arg(
            Arg::new("version")
                .short('v')
                .long("version")
                .action(ArgAction::Version)
                .help("Print the version"),
        );
    }
    root
}

/// Build the subcommand for a tree node. Leaves are built by `leaf`, placeholders require one
/// of their children and show help when invoked bare.
pub fn node_command<A>(
    node: &CommandNode<A>,
    leaf: &dyn Fn(&CommandNode<A>, &A) -> ClapCommand,
) -> ClapCommand {
    let command = match &node.action {
        Some(action) => leaf(node, action),
        None => ClapCommand::new(node.name.clone())
            .subcommand_required(true)
            .arg_required_else_help(true),
    };

    let mut command = command
        .about(node.usage.clone())
        .hide(node.hidden)
        .disable_help_subcommand(true);
    if !node.usage_text.is_empty() {
        command = command.override_usage(node.usage_text.clone());
    }
    command.subcommands(node.children.iter().map(|child| node_command(child, leaf)))
}

/// A leaf command running a script function: its own options plus trailing arguments.
///
/// Options whose name or short alias is already taken by a global option are skipped.
#[must_use]
pub fn script_leaf(name: &str, options: &OptionsSet, globals: &OptionsSet) -> ClapCommand {
    let mut taken_names: HashSet<String> =
        RESERVED_NAMES.iter().map(|s| (*s).to_string()).collect();
    let mut taken_shorts: HashSet<char> = RESERVED_SHORTS
        .iter()
        .filter_map(|s| s.chars().next())
        .collect();
    for arg in option_args(globals) {
        taken_names.insert(arg.get_id().to_string());
        taken_shorts.extend(arg.get_short());
    }

    let args = option_args(options).into_iter().filter(|arg| {
        let id = arg.get_id().to_string();
        if taken_names.contains(&id) {
            warn!("option \"{id}\" of command \"{name}\" is shadowed by a global option");
            return false;
        }
        if let Some(short) = arg.get_short()
            && taken_shorts.contains(&short)
        {
            warn!(
                "option \"{id}\" of command \"{name}\" uses the short name \"{short}\" of a global option"
            );
            return false;
        }
        true
    });

    ClapCommand::new(name.to_string()).args(args).arg(
        Arg::new(ARGS_ID)
            .value_name("ARGS")
            .num_args(0..)
            .trailing_var_arg(true)
            .action(ArgAction::Append),
    )
}

/// Read the values of every option of `set` from `matches`
#[must_use]
pub fn resolve_flags(matches: &ArgMatches, set: &OptionsSet) -> ResolvedFlags {
    let mut flags = ResolvedFlags::new();
    for option in set.sorted() {
        match option.kind {
            OptionType::String => {
                if let Ok(Some(value)) = matches.try_get_one::<String>(&option.name) {
                    flags.set(&option.name, value);
                }
            }
            OptionType::Integer => {
                if let Ok(Some(value)) = matches.try_get_one::<i64>(&option.name) {
                    flags.set(&option.name, value.to_string());
                }
            }
            OptionType::Bool | OptionType::Select => {
                if let Ok(Some(value)) = matches.try_get_one::<bool>(&option.name) {
                    flags.set(&option.name, value.to_string());
                }
            }
            OptionType::SelectGroup => {
                for value in &option.values {
                    if let Ok(Some(selected)) = matches.try_get_one::<bool>(&value.name) {
                        flags.set(&value.name, selected.to_string());
                    }
                }
            }
        }
    }
    flags
}

/// Names of the matched subcommands, outermost first, and the matches of the innermost one
#[must_use]
pub fn subcommand_path(matches: &ArgMatches) -> (Vec<String>, &ArgMatches) {
    let mut path = Vec::new();
    let mut current = matches;
    while let Some((name, sub)) = current.subcommand() {
        path.push(name.to_string());
        current = sub;
    }
    (path, current)
}

/// Arguments passed through to the script function
#[must_use]
pub fn trailing_args(matches: &ArgMatches) -> Vec<String> {
    matches
        .try_get_many::<String>(ARGS_ID)
        .ok()
        .flatten()
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}
