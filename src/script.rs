//! Script files backing commands, and the interpreter that runs generated source
//!
//! A [`Script`] is asked for the functions it defines and for the annotations in its comments.
//! [`BashScript`] answers the first by sourcing the file in a bash subprocess and listing the
//! declared functions, and the second by reading its `#` comment lines.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command as ProcessCommand, Stdio};

use log::debug;
use thiserror::Error;

use crate::annotations::{Annotation, parse_annotation};
use crate::diagnostics::Diagnostics;
use crate::environment::EnvironmentVariable;
use crate::functions::{Function, build_functions};
use crate::output::Output;

/// Interpreter used for both introspection and execution
pub const BASH_PROGRAM: &str = "bash";

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("failed to start \"{program}\": {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to list the functions of {} (exit code {code}): {stderr}", path.display())]
    Introspection {
        path: PathBuf,
        code: i32,
        stderr: String,
    },
    #[error("failed to capture the output of \"{program}\": {source}")]
    Capture {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read script {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to quote shell words: {0}")]
    Quote(#[from] shlex::QuoteError),
}

/// A script file that declares command functions
pub trait Script {
    fn full_path(&self) -> PathBuf;

    /// Names of every function the script defines
    ///
    /// # Errors
    ///
    /// Returns `ScriptError` if the script cannot be introspected.
    fn function_names(&self) -> Result<Vec<String>, ScriptError>;

    /// Annotations found in the script's comments. Malformed annotations are reported to
    /// `diagnostics` and skipped.
    ///
    /// # Errors
    ///
    /// Returns `ScriptError::Read` if the script cannot be read.
    fn annotations(&self, diagnostics: &mut Diagnostics) -> Result<Vec<Annotation>, ScriptError>;

    /// # Errors
    ///
    /// Returns `ScriptError` if either introspection step fails.
    fn functions(&self, diagnostics: &mut Diagnostics) -> Result<Vec<Function>, ScriptError> {
        let names = self.function_names()?;
        let annotations = self.annotations(diagnostics)?;
        Ok(build_functions(&names, &annotations, diagnostics))
    }
}

#[derive(Debug, Clone)]
pub struct BashScript {
    pub base_path: PathBuf,
    /// Relative to `base_path`
    pub path: PathBuf,
}

impl BashScript {
    #[must_use]
    pub fn new(base_path: impl Into<PathBuf>, path: impl Into<PathBuf>) -> Self {
        BashScript {
            base_path: base_path.into(),
            path: path.into(),
        }
    }
}

impl Script for BashScript {
    fn full_path(&self) -> PathBuf {
        self.base_path.join(&self.path)
    }

    fn function_names(&self) -> Result<Vec<String>, ScriptError> {
        let full_path = self.full_path();
        let quoted = shlex::try_quote(&full_path.to_string_lossy())?.into_owned();
        let output = ProcessCommand::new(BASH_PROGRAM)
            .arg("-c")
            .arg(format!("set -e; source {quoted}; declare -F"))
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ScriptError::Spawn {
                program: BASH_PROGRAM.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(ScriptError::Introspection {
                path: full_path,
                code: output.status.code().unwrap_or(1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(parse_declared_functions(&String::from_utf8_lossy(
            &output.stdout,
        )))
    }

    fn annotations(&self, diagnostics: &mut Diagnostics) -> Result<Vec<Annotation>, ScriptError> {
        let full_path = self.full_path();
        let content = std::fs::read_to_string(&full_path).map_err(|source| ScriptError::Read {
            path: full_path.clone(),
            source,
        })?;
        Ok(parse_comment_annotations(&content, diagnostics))
    }
}

/// Function names from the output of `declare -F`. Attribute flags such as `-fx` vary, the
/// name is always the last word.
fn parse_declared_functions(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().last())
        .map(str::to_string)
        .collect()
}

fn parse_comment_annotations(content: &str, diagnostics: &mut Diagnostics) -> Vec<Annotation> {
    let mut annotations = Vec::new();
    for line in content.lines().filter(|l| l.starts_with('#')) {
        match parse_annotation(line.trim_start_matches('#')) {
            Ok(Some(annotation)) => annotations.push(annotation),
            Ok(None) => {}
            Err(e) => diagnostics.debug(e.to_string()),
        }
    }
    annotations
}

/// Runs generated script source
pub trait Executable {
    /// Run `source` and return its exit status
    ///
    /// # Errors
    ///
    /// Returns `ScriptError::Spawn` if the interpreter cannot be started, or
    /// `ScriptError::Capture` if buffered output cannot be collected.
    fn run(&self, source: &str, output: &Output) -> Result<i32, ScriptError>;
}

#[derive(Debug, Clone)]
pub struct Bash {
    pub program: String,
}

impl Default for Bash {
    fn default() -> Self {
        Bash {
            program: BASH_PROGRAM.to_string(),
        }
    }
}

impl Executable for Bash {
    fn run(&self, source: &str, output: &Output) -> Result<i32, ScriptError> {
        let mut command = ProcessCommand::new(&self.program);
        command.arg("-c").arg(source);
        let spawn_error = |source| ScriptError::Spawn {
            program: self.program.clone(),
            source,
        };
        let capture_error = |source| ScriptError::Capture {
            program: self.program.clone(),
            source,
        };

        // A process killed by a signal has no exit code
        let code = if output.is_buffered() {
            // stdout and stderr share one pipe so the captured text keeps the write order
            let (mut reader, writer) = std::io::pipe().map_err(capture_error)?;
            let stdout = writer.try_clone().map_err(capture_error)?;
            command.stdin(Stdio::null()).stdout(stdout).stderr(writer);
            let mut child = command.spawn().map_err(spawn_error)?;
            // The reader only sees EOF once the parent's copies of the writer are closed
            drop(command);

            let mut captured = Vec::new();
            let read = reader.read_to_end(&mut captured);
            output.append(&captured);
            let status = child.wait().map_err(capture_error)?;
            read.map_err(capture_error)?;
            status.code()
        } else {
            command.status().map_err(spawn_error)?.code()
        };

        debug!("script exited with code {code:?}");
        Ok(code.unwrap_or(1))
    }
}

/// Everything the generated script needs to run one function
#[derive(Debug, Clone, Copy)]
pub struct BashSource<'a> {
    pub base_path: &'a Path,
    pub global_env: &'a [EnvironmentVariable],
    pub command_env: &'a [EnvironmentVariable],
    /// Sourced before the command script, relative to `base_path`
    pub scripts: &'a [String],
    pub script_path: &'a Path,
    pub function: &'a str,
    pub args: &'a [String],
}

/// Generate the bash program that sets up the environment and calls the function.
///
/// # Errors
///
/// Returns `ScriptError::Quote` if a path or argument cannot be shell-quoted (it contains a
/// nul byte).
pub fn generate_bash_source(plan: &BashSource<'_>) -> Result<String, ScriptError> {
    let quote = |text: &str| shlex::try_quote(text).map(std::borrow::Cow::into_owned);

    let mut lines = vec![
        "#!/usr/bin/env bash".to_string(),
        String::new(),
        "# Set working directory".to_string(),
        format!("cd {} || exit 1", quote(&plan.base_path.to_string_lossy())?),
        String::new(),
        "# Set environment variables from global options".to_string(),
    ];
    lines.extend(plan.global_env.iter().filter_map(EnvironmentVariable::export_line));

    lines.push(String::new());
    lines.push("# Set environment variables from options defined by command".to_string());
    lines.extend(plan.command_env.iter().filter_map(EnvironmentVariable::export_line));

    lines.push(String::new());
    lines.push("# Sourcing scripts".to_string());
    for script in plan.scripts {
        lines.push(format!("source {}", quote(script)?));
    }

    lines.push(String::new());
    lines.push("# Sourcing command".to_string());
    lines.push(format!(
        "source {}",
        quote(&plan.script_path.to_string_lossy())?
    ));

    lines.push(String::new());
    lines.push("# Executing command".to_string());
    let mut call = plan.function.to_string();
    if !plan.args.is_empty() {
        call.push(' ');
        call.push_str(&shlex::try_join(plan.args.iter().map(String::as_str))?);
    }
    lines.push(call);

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::EnvironmentVariableType;

    #[test]
    fn test_parse_declared_functions() {
        let output = "declare -f get\ndeclare -f get:sub\n\n\
                      declare -fx exported\ndeclare -f _helper\n";
        assert_eq!(
            parse_declared_functions(output),
            vec!["get", "get:sub", "exported", "_helper"]
        );
    }

    #[test]
    fn test_comment_annotations() {
        let content = "\
#!/usr/bin/env bash
# A plain comment
# centry.cmd[get]/description=Gets stuff
## centry.cmd[get].option[name]/type=string
# centry=broken/annotation
echo 'centry.cmd[get]/help=not a comment'
get() { :; }
";
        let mut diagnostics = Diagnostics::new();
        let annotations = parse_comment_annotations(content, &mut diagnostics);
        assert_eq!(annotations.len(), 2);
        assert_eq!(annotations[0].key, "description");
        assert_eq!(annotations[1].param("option"), Some("name"));
        assert_eq!(diagnostics.at(log::Level::Debug).count(), 1);
    }

    #[test]
    fn test_missing_script_is_a_read_error() {
        let script = BashScript::new("/nonexistent", "missing.sh");
        let mut diagnostics = Diagnostics::new();
        match script.annotations(&mut diagnostics) {
            Err(ScriptError::Read { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/missing.sh"));
            }
            other => panic!("Expected Read error, got: {other:?}"),
        }
    }

    #[test]
    fn test_generate_bash_source() {
        let global_env = vec![
            EnvironmentVariable {
                name: "CENTRY_CONFIG_LOG_LEVEL".to_string(),
                value: "info".to_string(),
                kind: EnvironmentVariableType::String,
            },
            EnvironmentVariable {
                name: "CENTRY_QUIET".to_string(),
                value: "false".to_string(),
                kind: EnvironmentVariableType::Bool,
            },
        ];
        let command_env = vec![
            EnvironmentVariable {
                name: "APP_EMPTY".to_string(),
                value: String::new(),
                kind: EnvironmentVariableType::String,
            },
            EnvironmentVariable {
                name: "APP_OPT1".to_string(),
                value: "it's".to_string(),
                kind: EnvironmentVariableType::String,
            },
        ];
        let scripts = vec!["scripts/init.sh".to_string()];
        let args = vec!["one".to_string(), "two words".to_string()];
        let source = generate_bash_source(&BashSource {
            base_path: Path::new("/srv/app"),
            global_env: &global_env,
            command_env: &command_env,
            scripts: &scripts,
            script_path: Path::new("/srv/app/commands/get.sh"),
            function: "get:sub",
            args: &args,
        })
        .unwrap();

        insta::assert_snapshot!(source, @r#"
        #!/usr/bin/env bash

        # Set working directory
        cd /srv/app || exit 1

        # Set environment variables from global options
        export CENTRY_CONFIG_LOG_LEVEL='info'
        export CENTRY_QUIET=false

        # Set environment variables from options defined by command
        export APP_OPT1='it'\''s'

        # Sourcing scripts
        source scripts/init.sh

        # Sourcing command
        source /srv/app/commands/get.sh

        # Executing command
        get:sub one 'two words'
        "#);
    }

    #[test]
    fn test_call_without_args_has_no_trailing_space() {
        let source = generate_bash_source(&BashSource {
            base_path: Path::new("/tmp"),
            global_env: &[],
            command_env: &[],
            scripts: &[],
            script_path: Path::new("/tmp/a.sh"),
            function: "get",
            args: &[],
        })
        .unwrap();
        assert!(source.ends_with("# Executing command\nget"));
    }

    #[test]
    fn test_buffered_run_captures_output() {
        if ProcessCommand::new(BASH_PROGRAM).arg("-c").arg("true").status().is_err() {
            return;
        }
        let output = Output::buffered();
        let code = Bash::default()
            .run("echo out; echo err >&2; exit 3", &output)
            .unwrap();
        assert_eq!(code, 3);
        assert_eq!(output.captured(), "out\nerr\n");
    }

    #[test]
    fn test_buffered_run_keeps_write_order() {
        if ProcessCommand::new(BASH_PROGRAM).arg("-c").arg("true").status().is_err() {
            return;
        }
        let output = Output::buffered();
        let code = Bash::default()
            .run("echo a; sleep 0.1; echo b >&2; sleep 0.1; echo c", &output)
            .unwrap();
        assert_eq!(code, 0);
        assert_eq!(output.captured(), "a\nb\nc\n");
    }

    #[test]
    fn test_missing_interpreter_is_a_spawn_error() {
        let bash = Bash {
            program: "/nonexistent/bash".to_string(),
        };
        match bash.run("true", &Output::buffered()) {
            Err(ScriptError::Spawn { program, .. }) => assert_eq!(program, "/nonexistent/bash"),
            other => panic!("Expected Spawn, got: {other:?}"),
        }
    }
}
