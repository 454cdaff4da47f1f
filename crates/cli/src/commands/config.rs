//! Effective configuration

use anyhow::Result;
use std::path::Path;

use multiserver_common::Config;

use crate::output::{print_structured, OutputFormat};

pub fn execute(config: &Config, path: &Path, format: OutputFormat) -> Result<()> {
    if format.is_structured() {
        print_structured(config, format);
        return Ok(());
    }

    let source = if path.exists() { "file" } else { "defaults" };
    println!("# {} ({})", path.display(), source);
    println!("# database: {}", config.db_path().display());
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
