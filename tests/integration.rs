use std::path::Path;

use centry::manifest::ManifestError;
use centry::output::Output;
use centry::runtime::{Context, Runtime};
use centry::{load_manifest, resolve_manifest_path};

const MANIFEST: &str = r"
scripts:
  - scripts/init.sh
commands:
  - name: get
    path: commands/get.sh
    description: Gets things
  - name: broken
    path: commands/broken.sh
options:
  - name: stringopt
    type: string
    default: foobar
  - name: dashed-opt
    type: string
  - name: boolopt
    type: bool
config:
  name: centry-test
  version: 1.0.0
  environmentPrefix: ENV_PREFIX_
  log:
    level: error
";

const GET_SCRIPT: &str = r#"#!/usr/bin/env bash

# centry.cmd[get:env]/description=Prints the environment
# centry.cmd[get:env].option[cmdstringopt]/type=string
# centry.cmd[get:env].option[cmdstringopt]/short=c
# centry.cmd[get:env].option[cmdboolopt]/type=bool
# centry.cmd[get:env].option[cmdsel1]/type=select
# centry.cmd[get:env].option[cmdsel1]/envName=CMDSELECTOPT
# centry.cmd[get:env].option[cmdsel2]/type=select
# centry.cmd[get:env].option[cmdsel2]/envName=CMDSELECTOPT
get:env() {
  env | sort
}

# centry.cmd[get:args]/description=Prints the arguments
get:args() {
  echo "args ($*)"
}

get:fail() {
  return 42
}

helper() {
  echo "not a command"
}
"#;

fn bash_available() -> bool {
    std::process::Command::new("bash")
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success())
}

fn write_project(dir: &Path) {
    std::fs::create_dir_all(dir.join("commands")).unwrap();
    std::fs::create_dir_all(dir.join("scripts")).unwrap();
    std::fs::write(dir.join("centry.yaml"), MANIFEST).unwrap();
    std::fs::write(dir.join("commands/get.sh"), GET_SCRIPT).unwrap();
    std::fs::write(dir.join("commands/broken.sh"), "broken() {\n").unwrap();
    std::fs::write(dir.join("scripts/init.sh"), "export INIT_LOADED=yes\n").unwrap();
}

fn build(dir: &Path, args: &[&str]) -> (Runtime, Output) {
    let manifest = load_manifest(&dir.join("centry.yaml")).unwrap();
    let output = Output::buffered();
    let context = Context {
        output: output.clone(),
        ..Context::cli()
    };
    let args = args.iter().map(|s| (*s).to_string()).collect();
    (Runtime::new(manifest, args, context), output)
}

fn execute(dir: &Path, args: &[&str]) -> (i32, String) {
    let (mut runtime, output) = build(dir, args);
    let code = runtime.execute();
    (code, output.captured())
}

#[test]
fn test_options_become_environment_variables() {
    if !bash_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    let (code, output) = execute(
        dir.path(),
        &["--dashed-opt", "dashed", "get", "env", "--cmdsel2", "-c", "it's"],
    );
    assert_eq!(code, 0, "{output}");
    for line in [
        "ENV_PREFIX_STRINGOPT=foobar",
        "ENV_PREFIX_DASHED_OPT=dashed",
        "ENV_PREFIX_BOOLOPT=false",
        "ENV_PREFIX_CMDSELECTOPT=cmdsel2",
        "ENV_PREFIX_CMDSTRINGOPT=it's",
        "ENV_PREFIX_CMDBOOLOPT=false",
        "CENTRY_CONFIG_LOG_LEVEL=error",
        "INIT_LOADED=yes",
    ] {
        assert!(output.lines().any(|l| l == line), "missing {line} in {output}");
    }
    assert!(!output.contains("ENV_PREFIX_CMDSEL1"));
}

#[test]
fn test_arguments_pass_through() {
    if !bash_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    let (code, output) = execute(dir.path(), &["get", "args", "--", "--foo", "bar baz"]);
    assert_eq!(code, 0, "{output}");
    assert_eq!(output.trim(), "args (--foo bar baz)");
}

#[test]
fn test_script_exit_code_is_propagated() {
    if !bash_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    assert_eq!(execute(dir.path(), &["get", "fail"]).0, 42);
}

#[test]
fn test_unknown_command_or_flag() {
    if !bash_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    assert_eq!(execute(dir.path(), &["nope"]).0, 127);
    assert_eq!(execute(dir.path(), &["get", "args", "--nope"]).0, 127);
    assert_eq!(execute(dir.path(), &["helper"]).0, 127);
}

#[test]
fn test_ambiguous_select_is_rejected() {
    if !bash_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    let (code, output) = execute(dir.path(), &["get", "env", "--cmdsel1", "--cmdsel2"]);
    assert_eq!(code, 1);
    assert!(output.contains("select option group \"CMDSELECTOPT\""), "{output}");
    assert!(!output.contains("INIT_LOADED"));
}

#[test]
fn test_help_lists_commands() {
    if !bash_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    let (code, output) = execute(dir.path(), &["--help"]);
    assert_eq!(code, 0);
    assert!(output.contains("Gets things"));
    assert!(!output.contains("broken"));

    let (code, output) = execute(dir.path(), &["get", "--help"]);
    assert_eq!(code, 0);
    assert!(output.contains("Prints the environment"));
    assert!(output.contains("Prints the arguments"));
}

#[test]
fn test_broken_script_is_skipped() {
    if !bash_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    let (runtime, _) = build(dir.path(), &[]);
    assert!(runtime.tree().find(&["broken"]).is_none());
    assert!(runtime.tree().find(&["get", "env"]).is_some());
    assert!(
        runtime
            .diagnostics()
            .at(log::Level::Error)
            .any(|m| m.contains("\"broken\""))
    );
}

#[test]
fn test_manifest_from_file_flag() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    let path = dir.path().join("centry.yaml").to_string_lossy().to_string();
    let args = vec![format!("--centry-file={path}"), "get".to_string()];
    let (resolved, rest) = resolve_manifest_path(args, None).unwrap();
    assert_eq!(rest, vec!["get".to_string()]);

    let manifest = load_manifest(&resolved).unwrap();
    assert_eq!(manifest.config.name, "centry-test");
    assert_eq!(manifest.base_path, std::fs::canonicalize(dir.path()).unwrap());
}

#[test]
fn test_missing_manifest() {
    let dir = tempfile::tempdir().unwrap();
    match load_manifest(&dir.path().join("centry.yaml")) {
        Err(ManifestError::NotFound(path)) => assert!(path.ends_with("centry.yaml")),
        other => panic!("Expected NotFound, got: {other:?}"),
    }
}
