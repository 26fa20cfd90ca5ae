//! Assembly of the command tree from a manifest, and execution of one command line
//!
//! A [`Runtime`] is built once per invocation: global options are registered, every manifest
//! command's script is introspected, and the resulting functions are merged into one sorted
//! [`CommandTree`]. [`Runtime::execute`] then parses the arguments, validates the select groups
//! at both levels, and runs the generated bash source for the chosen function.

use std::path::{Path, PathBuf};

use clap::error::ErrorKind;
use clap::{Args as _, ArgMatches, Command as ClapCommand, FromArgMatches as _};
use log::{debug, error, warn};
use thiserror::Error;

use crate::annotations::API_NAMESPACE;
use crate::cli;
use crate::diagnostics::Diagnostics;
use crate::environment::{normalize_env_name, project};
use crate::functions::{Function, invocation_path, is_exposed};
use crate::logger;
use crate::manifest::{Manifest, ManifestCommand, ManifestOption};
use crate::options::flags::ResolvedFlags;
use crate::options::option::{CliOption, DefaultValue, OptionType};
use crate::options::set::{OptionsSet, RESERVED_SHORTS};
use crate::output::Output;
use crate::script::{
    Bash, BashScript, BashSource, Executable, Script, ScriptError, generate_bash_source,
};
use crate::serve::{self, ServeArgs, ServeError};
use crate::tree::{CommandNode, CommandTree, InsertOutcome, Placeholder};
use crate::validate::{Level, SelectError, validate_options_set};

/// Overrides the manifest log level for one invocation
pub const LOG_LEVEL_OPTION: &str = "centry-config-log-level";
/// Turns logging off for one invocation
pub const QUIET_OPTION: &str = "centry-quiet";
/// Name of the global options set
pub const GLOBAL_SET: &str = "Global";

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_NOT_FOUND: i32 = 127;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Select(#[from] SelectError),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Serve(#[from] ServeError),
    #[error("invalid arguments for \"{command}\": {source}")]
    Arguments {
        command: String,
        #[source]
        source: clap::Error,
    },
}

/// Who is driving the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Executor {
    /// A user at the command line
    Cli,
    /// A request to the HTTP server
    Api,
}

pub type CommandFilter = Box<dyn Fn(&ManifestCommand) -> bool + Send + Sync>;
pub type OptionFilter = Box<dyn Fn(&ManifestOption) -> bool + Send + Sync>;

/// Execution context of a runtime
pub struct Context {
    pub executor: Executor,
    pub output: Output,
    pub executable: Box<dyn Executable + Send + Sync>,
    /// Commands rejected by the filter are not registered
    pub command_filter: Option<CommandFilter>,
    /// Global options rejected by the filter are not registered
    pub option_filter: Option<OptionFilter>,
}

impl Context {
    #[must_use]
    pub fn cli() -> Self {
        Context {
            executor: Executor::Cli,
            output: Output::Standard,
            executable: Box::new(Bash::default()),
            command_filter: None,
            option_filter: None,
        }
    }

    /// Context for HTTP requests: only commands and options annotated with
    /// `centry.api/serve=true` are exposed
    #[must_use]
    pub fn api(output: Output) -> Self {
        Context {
            executor: Executor::Api,
            output,
            executable: Box::new(Bash::default()),
            command_filter: Some(Box::new(|command| {
                matches!(command.annotation(API_NAMESPACE, "serve"), Ok(Some(a)) if a.is_true())
            })),
            option_filter: Some(Box::new(|option| {
                matches!(option.annotation(API_NAMESPACE, "serve"), Ok(Some(a)) if a.is_true())
            })),
        }
    }

    #[must_use]
    pub fn with_executable(mut self, executable: impl Executable + Send + Sync + 'static) -> Self {
        self.executable = Box::new(executable);
        self
    }

    fn command_enabled(&self, command: &ManifestCommand) -> bool {
        self.command_filter.as_ref().is_none_or(|f| f(command))
    }

    fn option_enabled(&self, option: &ManifestOption) -> bool {
        self.option_filter.as_ref().is_none_or(|f| f(option))
    }
}

/// A function of a manifest command's script
#[derive(Debug, Clone)]
pub struct ScriptCommand {
    pub command: ManifestCommand,
    pub function: Function,
    pub script_path: PathBuf,
}

#[derive(Debug, Clone)]
pub enum Action {
    Script(Box<ScriptCommand>),
    Serve,
}

/// Creates the script backing a manifest command, given the manifest's base path
pub type ScriptFactory<'a> = &'a dyn Fn(&ManifestCommand, &Path) -> Box<dyn Script>;

pub struct Runtime {
    manifest: Manifest,
    context: Context,
    global_options: OptionsSet,
    tree: CommandTree<Action>,
    args: Vec<String>,
    diagnostics: Diagnostics,
}

impl Runtime {
    /// Build the runtime for `args` (without the program name), introspecting every command
    /// script with bash
    #[must_use]
    pub fn new(manifest: Manifest, args: Vec<String>, context: Context) -> Self {
        let bash = |command: &ManifestCommand, base_path: &Path| -> Box<dyn Script> {
            Box::new(BashScript::new(base_path, &command.path))
        };
        Self::with_script_factory(manifest, args, context, &bash)
    }

    #[must_use]
    pub fn with_script_factory(
        mut manifest: Manifest,
        args: Vec<String>,
        context: Context,
        scripts: ScriptFactory<'_>,
    ) -> Self {
        let mut diagnostics = Diagnostics::new();
        apply_version_override(&mut manifest, &mut diagnostics);

        let global_options = create_global_options(&manifest, &context, &mut diagnostics);

        let mut tree = CommandTree::new();
        if context.executor == Executor::Cli {
            tree.push(internal_commands(&manifest));
        }
        register_manifest_commands(&manifest, &context, scripts, &mut tree, &mut diagnostics);
        tree.sort();

        Runtime {
            manifest,
            context,
            global_options,
            tree,
            args,
            diagnostics,
        }
    }

    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    #[must_use]
    pub fn tree(&self) -> &CommandTree<Action> {
        &self.tree
    }

    #[must_use]
    pub fn global_options(&self) -> &OptionsSet {
        &self.global_options
    }

    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// The `clap` command for the whole tree
    #[must_use]
    pub fn command(&self) -> ClapCommand {
        let leaf = |node: &CommandNode<Action>, action: &Action| match action {
            Action::Script(script) => {
                cli::script_leaf(&node.name, &script.function.options, &self.global_options)
            }
            Action::Serve => ServeArgs::augment_args(ClapCommand::new(node.name.clone())),
        };
        cli::root_command(&self.manifest.config, &self.global_options)
            .subcommands(self.tree.roots.iter().map(|node| cli::node_command(node, &leaf)))
    }

    /// Parse the arguments and run the selected command, returning the exit code
    pub fn execute(&mut self) -> i32 {
        let argv = std::iter::once(self.manifest.config.name.clone())
            .chain(self.args.iter().cloned());
        let matches = match self.command().try_get_matches_from(argv) {
            Ok(matches) => matches,
            Err(e) => {
                self.diagnostics.flush();
                return self.report_parse_error(&e);
            }
        };

        let (path, leaf_matches) = cli::subcommand_path(&matches);
        let global_flags = cli::resolve_flags(leaf_matches, &self.global_options);
        if self.context.executor == Executor::Cli {
            self.apply_log_level(&global_flags);
        }
        self.diagnostics.flush();

        if path.is_empty() {
            self.context
                .output
                .write_out(&format!("{}\n", self.command().render_help()));
            return EXIT_SUCCESS;
        }

        let segments: Vec<&str> = path.iter().map(String::as_str).collect();
        let Some(node) = self.tree.find(&segments) else {
            return EXIT_NOT_FOUND;
        };
        let result = match &node.action {
            Some(Action::Script(script)) => {
                self.run_script(script, &path, leaf_matches, &global_flags)
            }
            Some(Action::Serve) => self.serve(leaf_matches),
            None => Ok(EXIT_SUCCESS),
        };

        result.unwrap_or_else(|e| {
            error!("{e}");
            self.context.output.write_err(&format!("{e}\n"));
            EXIT_FAILURE
        })
    }

    fn report_parse_error(&self, err: &clap::Error) -> i32 {
        let text = err.render().to_string();
        match err.kind() {
            ErrorKind::DisplayHelp
            | ErrorKind::DisplayVersion
            | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                self.context.output.write_out(&text);
                EXIT_SUCCESS
            }
            ErrorKind::UnknownArgument | ErrorKind::InvalidSubcommand => {
                self.context.output.write_err(&text);
                EXIT_NOT_FOUND
            }
            _ => {
                self.context.output.write_err(&text);
                EXIT_FAILURE
            }
        }
    }

    fn apply_log_level(&self, flags: &ResolvedFlags) {
        let level = if flags.is_true(QUIET_OPTION) {
            "off"
        } else {
            flags
                .get(LOG_LEVEL_OPTION)
                .unwrap_or(self.manifest.config.log.level.as_str())
        };
        match logger::parse_level(level) {
            Some(level) => logger::set_level(level),
            None => warn!("ignoring unknown log level \"{level}\""),
        }
    }

    fn run_script(
        &self,
        script: &ScriptCommand,
        path: &[String],
        matches: &ArgMatches,
        global_flags: &ResolvedFlags,
    ) -> Result<i32, RuntimeError> {
        let invocation = path.join(" ");
        debug!(
            "executing command \"{}\" (script {}, manifest command \"{}\")",
            script.function.name,
            script.script_path.display(),
            script.command.name
        );

        validate_options_set(global_flags, &self.global_options, &invocation, Level::Global)?;
        let command_flags = cli::resolve_flags(matches, &script.function.options);
        validate_options_set(
            &command_flags,
            &script.function.options,
            &invocation,
            Level::Command,
        )?;

        let prefix = &self.manifest.config.environment_prefix;
        let global_env = project(&self.global_options, global_flags, prefix);
        let command_env = project(&script.function.options, &command_flags, prefix);
        let args = cli::trailing_args(matches);

        let source = generate_bash_source(&BashSource {
            base_path: &self.manifest.base_path,
            global_env: &global_env,
            command_env: &command_env,
            scripts: &self.manifest.scripts,
            script_path: &script.script_path,
            function: &script.function.name,
            args: &args,
        })?;
        debug!("generated bash source\n{source}");

        let code = self.context.executable.run(&source, &self.context.output)?;
        debug!("finished executing command \"{}\" (exit code {code})", script.function.name);
        Ok(code)
    }

    fn serve(&self, matches: &ArgMatches) -> Result<i32, RuntimeError> {
        let args = ServeArgs::from_arg_matches(matches).map_err(|source| RuntimeError::Arguments {
            command: "internal serve".to_string(),
            source,
        })?;
        serve::run(&self.manifest.path, &args)?;
        Ok(EXIT_SUCCESS)
    }
}

/// `<NAME>_VERSION` in the environment replaces the manifest version
fn apply_version_override(manifest: &mut Manifest, diagnostics: &mut Diagnostics) {
    let variable = format!("{}_VERSION", normalize_env_name(&manifest.config.name));
    if let Ok(version) = std::env::var(&variable)
        && !version.is_empty()
    {
        diagnostics.debug(format!(
            "overriding version \"{}\" with \"{version}\" from {variable}",
            manifest.config.version
        ));
        manifest.config.version = version;
    }
}

fn create_global_options(
    manifest: &Manifest,
    context: &Context,
    diagnostics: &mut Diagnostics,
) -> OptionsSet {
    let config = &manifest.config;
    let mut options = OptionsSet::with_reserved_shorts(GLOBAL_SET, &RESERVED_SHORTS);

    let internal = [
        CliOption {
            description: "Overrides the log level".to_string(),
            default: DefaultValue::Text(config.log.level.clone()),
            hidden: config.hide_internal_options,
            internal: true,
            ..CliOption::new(LOG_LEVEL_OPTION, OptionType::String)
        },
        CliOption {
            description: "Disables logging".to_string(),
            hidden: config.hide_internal_options,
            internal: true,
            ..CliOption::new(QUIET_OPTION, OptionType::Bool)
        },
    ];
    for option in internal {
        let name = option.name.clone();
        if let Err(e) = options.add(option) {
            diagnostics.warn(format!("failed to register global option \"{name}\", error: {e}"));
        }
    }

    for declared in manifest.options.iter().filter(|o| context.option_enabled(o)) {
        let result = CliOption::try_from(declared).and_then(|option| options.add(option));
        match result {
            Ok(()) => diagnostics.debug(format!("registered global option \"{}\"", declared.name)),
            Err(e) => diagnostics.warn(format!(
                "failed to register global option \"{}\", error: {e}",
                declared.name
            )),
        }
    }

    options
}

fn internal_commands(manifest: &Manifest) -> CommandNode<Action> {
    let hidden = manifest.config.hide_internal_commands;
    CommandNode::placeholder("internal", "Internal centry commands")
        .hidden(hidden)
        .with_children(vec![
            CommandNode::leaf("serve", Action::Serve)
                .with_usage("Exposes commands over HTTP", "")
                .hidden(hidden),
        ])
}

fn register_manifest_commands(
    manifest: &Manifest,
    context: &Context,
    scripts: ScriptFactory<'_>,
    tree: &mut CommandTree<Action>,
    diagnostics: &mut Diagnostics,
) {
    for command in manifest.commands.iter().filter(|c| context.command_enabled(c)) {
        let script = scripts(command, &manifest.base_path);
        let functions = match script.functions(diagnostics) {
            Ok(functions) => functions,
            Err(e) => {
                diagnostics.error(format!(
                    "failed to parse script functions of command \"{}\", error: {e}",
                    command.name
                ));
                continue;
            }
        };

        let placeholder = Placeholder {
            usage: command.description.clone(),
            usage_text: command.help.clone(),
        };

        for function in functions.into_iter().filter(|f| is_exposed(&f.name, &command.name)) {
            let path: Vec<String> = invocation_path(&function.name)
                .into_iter()
                .map(str::to_string)
                .collect();
            let segments: Vec<&str> = path.iter().map(String::as_str).collect();
            let invocation = path.join(" ");

            let mut resolved = command.clone();
            if !function.description.is_empty() {
                resolved.description.clone_from(&function.description);
            }
            if !function.help.is_empty() {
                resolved.help.clone_from(&function.help);
            }
            let hidden = command.hidden || function.hidden;
            let leaf = CommandNode::leaf(
                function.name.clone(),
                Action::Script(Box::new(ScriptCommand {
                    command: resolved.clone(),
                    function,
                    script_path: script.full_path(),
                })),
            )
            .with_usage(resolved.description, resolved.help)
            .hidden(hidden);

            match tree.insert(&segments, leaf, &placeholder) {
                InsertOutcome::Inserted | InsertOutcome::Promoted => {
                    diagnostics.debug(format!("Registered command \"{invocation}\""));
                }
                InsertOutcome::AlreadyExists => diagnostics.warn(format!(
                    "command \"{invocation}\" is already registered, skipping the one from \"{}\"",
                    command.path
                )),
                InsertOutcome::EmptyPath => {}
            }
        }
    }
}
