//! Config command implementation.

use crate::cli::ConfigArgs;
use crate::config::Config;
use crate::error::Result;
use crate::output::Formatter;
use std::path::Path;

/// Execute the config command.
pub fn execute_config(
    args: ConfigArgs,
    config: &Config,
    config_path: Option<&Path>,
    formatter: &Formatter,
) -> Result<()> {
    if args.show_defaults {
        print!("{}", Config::default().to_toml()?);
        return Ok(());
    }

    match config_path {
        Some(path) if path.exists() => eprintln!("{}", formatter.info(&format!("Loaded {}", path.display()))),
        Some(path) => eprintln!("{}", formatter.info(&format!("{} not found, using defaults", path.display()))),
        None => {}
    }
    print!("{}", config.to_toml()?);
    Ok(())
}
