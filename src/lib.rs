//! Core implementation of centry
//!
//! Centry builds a nested command line interface from a manifest and a set of bash scripts.
//! Every function a script defines becomes a command, `:` in a function name nests it, and
//! comment annotations declare the function's help and options. Option values reach the script
//! as environment variables.

use std::path::{Path, PathBuf};

use log::debug;

use crate::manifest::{Manifest, ManifestError};

pub mod annotations;
pub mod cli;
pub mod diagnostics;
pub mod environment;
pub mod functions;
pub mod logger;
pub mod manifest;
pub mod options;
pub mod output;
pub mod runtime;
pub mod script;
pub mod serve;
pub mod tree;
pub mod validate;

/// Flag selecting the manifest, removed from the arguments before they are parsed
pub const FILE_FLAG: &str = "--centry-file";
/// Environment variable selecting the manifest when the flag is absent
pub const FILE_VARIABLE: &str = "CENTRY_FILE";
pub const DEFAULT_MANIFEST: &str = "./centry.yaml";

/// Load and validate a manifest file
///
/// # Errors
///
/// Returns `ManifestError` if the file is missing, cannot be parsed, or fails validation.
pub fn load_manifest(path: &Path) -> Result<Manifest, ManifestError> {
    let manifest = Manifest::from_file(path)?;
    manifest.validate()?;
    debug!(
        "loaded manifest \"{}\" with {} commands and {} options",
        manifest.config.name,
        manifest.commands.len(),
        manifest.options.len()
    );
    Ok(manifest)
}

/// Pick the manifest path and return the remaining arguments.
///
/// `--centry-file <path>` and `--centry-file=<path>` take precedence over `env_file`, which
/// takes precedence over `./centry.yaml`.
///
/// # Errors
///
/// Returns `ManifestError::MissingFileValue` if the flag is given without a value.
pub fn resolve_manifest_path(
    args: Vec<String>,
    env_file: Option<String>,
) -> Result<(PathBuf, Vec<String>), ManifestError> {
    let mut file = None;
    let mut remaining = Vec::with_capacity(args.len());
    let mut iter = args.into_iter();

    while let Some(arg) = iter.next() {
        if file.is_none() {
            if arg == FILE_FLAG {
                let value = iter
                    .next()
                    .filter(|v| !v.is_empty())
                    .ok_or(ManifestError::MissingFileValue)?;
                file = Some(value);
                continue;
            }
            if let Some(value) = arg.strip_prefix(FILE_FLAG).and_then(|v| v.strip_prefix('=')) {
                if value.is_empty() {
                    return Err(ManifestError::MissingFileValue);
                }
                file = Some(value.to_string());
                continue;
            }
        }
        remaining.push(arg);
    }

    let path = file
        .or(env_file.filter(|f| !f.is_empty()))
        .unwrap_or_else(|| DEFAULT_MANIFEST.to_string());
    Ok((PathBuf::from(path), remaining))
}
