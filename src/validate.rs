//! Select-group validation of resolved flags

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::options::flags::ResolvedFlags;
use crate::options::option::OptionType;
use crate::options::set::OptionsSet;

/// Scope an options set is declared at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Global,
    Command,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Global => f.write_str("global"),
            Level::Command => f.write_str("command"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectError {
    #[error(
        "required {level} flag missing for select option group \"{group}\" of command \"{command}\" (one of \" {joined} \" must be provided)",
        joined = .members.join(" | ")
    )]
    MissingRequired {
        level: Level,
        group: String,
        command: String,
        members: Vec<String>,
    },
    #[error(
        "{level} flag specified multiple times for select option group \"{group}\" of command \"{command}\" (only one of \" {joined} \" may be provided, got: {chosen})",
        joined = .members.join(" | "),
        chosen = .selected.join(", ")
    )]
    Ambiguous {
        level: Level,
        group: String,
        command: String,
        members: Vec<String>,
        selected: Vec<String>,
    },
}

#[derive(Default)]
struct Group<'a> {
    required: bool,
    members: Vec<&'a str>,
    selected: Vec<&'a str>,
}

/// Check every select group of `set` against the resolved flags.
///
/// A required group needs exactly one selected member, any group rejects more than one.
/// Groups are checked in name order and the first violation is returned.
///
/// # Errors
///
/// Returns `SelectError::MissingRequired` when a required group has no member selected, or
/// `SelectError::Ambiguous` when a group has more than one member selected.
pub fn validate_options_set(
    flags: &ResolvedFlags,
    set: &OptionsSet,
    command: &str,
    level: Level,
) -> Result<(), SelectError> {
    let mut groups: BTreeMap<&str, Group> = BTreeMap::new();

    for option in set.sorted() {
        let Some(group_name) = option.group_name() else {
            continue;
        };
        let group = groups.entry(group_name).or_default();
        group.required |= option.required;

        match option.kind {
            OptionType::Select => {
                group.members.push(&option.name);
                if flags.is_true(&option.name) {
                    group.selected.push(&option.name);
                }
            }
            OptionType::SelectGroup => {
                for value in &option.values {
                    group.members.push(&value.name);
                    if flags.is_true(&value.name) {
                        group.selected.push(&value.name);
                    }
                }
            }
            OptionType::String | OptionType::Bool | OptionType::Integer => {}
        }
    }

    for (name, group) in groups {
        let members = || group.members.iter().map(|m| (*m).to_string()).collect();
        if group.required && group.selected.is_empty() {
            return Err(SelectError::MissingRequired {
                level,
                group: name.to_string(),
                command: command.to_string(),
                members: members(),
            });
        }
        if group.selected.len() > 1 {
            return Err(SelectError::Ambiguous {
                level,
                group: name.to_string(),
                command: command.to_string(),
                members: members(),
                selected: group.selected.iter().map(|s| (*s).to_string()).collect(),
            });
        }
    }

    Ok(())
}
