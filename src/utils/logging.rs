//! Logging initialization for bspctl

use anyhow::Result;
use env_logger::{Builder, Target};
use log::LevelFilter;
use std::io::Write;

/// Level chosen by the `-q` / `-v` flags
pub fn level_for(verbose: u8, quiet: bool) -> LevelFilter {
    match (quiet, verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    }
}

/// Initialize logging for the CLI. Everything goes to stderr so stdout
/// stays clean for `discover --json`.
pub fn init_cli_logging(verbose: u8, quiet: bool, json: bool) -> Result<()> {
    let level = level_for(verbose, quiet);

    let mut builder = Builder::from_default_env();
    builder.target(Target::Stderr).filter_level(level);

    if json {
        builder.format(|buf, record| {
            let line = serde_json::json!({
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "level": record.level().to_string(),
                "module": record.module_path().unwrap_or("unknown"),
                "message": record.args().to_string(),
                "target": record.target(),
            });
            writeln!(buf, "{}", line)
        });
    } else {
        builder.format_timestamp_secs().format_module_path(false);
    }

    builder.try_init()?;

    log_panics::init();

    log::debug!("bspctl logging initialized with level: {:?}", level);
    Ok(())
}
