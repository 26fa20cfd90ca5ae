use std::process::ExitCode;

use log::LevelFilter;

use centry::runtime::{Context, Runtime};
use centry::{FILE_VARIABLE, load_manifest, logger, resolve_manifest_path};

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (path, args) = resolve_manifest_path(args, std::env::var(FILE_VARIABLE).ok())?;
    let manifest = load_manifest(&path)?;

    let log = &manifest.config.log;
    logger::init(
        logger::parse_level(&log.level).unwrap_or(LevelFilter::Info),
        &log.prefix,
    );

    let mut runtime = Runtime::new(manifest, args, Context::cli());
    let code = runtime.execute();

    // Codes outside 0..=255 cannot be reported by the process
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}
