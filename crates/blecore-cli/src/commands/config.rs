//! Config command implementation.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::ConfigAction;
use crate::config::Config;
use crate::util::write_line;

pub fn cmd_config(action: &ConfigAction, path: &Path, out: &mut dyn Write) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = Config::load_from(path);
            let content = toml::to_string_pretty(&config).context("Failed to serialize config")?;
            if content.trim().is_empty() {
                write_line(out, &format!("# {} (no settings)", path.display()))?;
            } else {
                write_line(out, &format!("# {}", path.display()))?;
                write_line(out, content.trim_end())?;
            }
        }
        ConfigAction::Path => write_line(out, &path.display().to_string())?,
        ConfigAction::Set { key, value } => {
            let mut config = Config::load_from(path);
            config.set(*key, value)?;
            config.save_to(path)?;
            write_line(out, &format!("Set {:?} = {}", key, value.trim()))?;
        }
        ConfigAction::Unset { key } => {
            let mut config = Config::load_from(path);
            config.unset(*key);
            config.save_to(path)?;
            write_line(out, &format!("Unset {:?}", key))?;
        }
    }
    Ok(())
}
