use std::env;
use std::fs;
use std::path::Path;

use crate::av::DEFAULT_PTS_CACHE_DEPTH;
use crate::error::{EncMuxError, Result};
use crate::format::ogg::page::DEFAULT_FILL_TARGET;

/// Files searched by [`Config::load`], first match wins
const CONFIG_PATHS: [&str; 2] = ["./encmux.toml", "./config.toml"];

/// Tuning of encoders and the Ogg writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Frames a video adapter may have in flight inside the codec
    pub pts_cache_depth: usize,
    /// Body size at which the Ogg page layer closes a page
    pub page_fill_target: usize,
    /// Put every Ogg data packet on a page of its own
    pub flush_every_packet: bool,
    /// First Ogg serial number, random if unset
    pub serial_seed: Option<u32>,
    /// Remove a file created by the muxer when closing it fails
    pub delete_on_error: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pts_cache_depth: DEFAULT_PTS_CACHE_DEPTH,
            page_fill_target: DEFAULT_FILL_TARGET,
            flush_every_packet: false,
            serial_seed: None,
            delete_on_error: true,
        }
    }
}

impl Config {
    /// Defaults, then `ENCMUX_*` environment variables, then the first config
    /// file found in the working directory
    pub fn load() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env()?;

        for path in &CONFIG_PATHS {
            if let Ok(content) = fs::read_to_string(path) {
                log::debug!("loading config from {}", path);
                config.apply_lines(&content)?;
                break;
            }
        }

        Ok(config)
    }

    /// Parses `key = value` lines on top of the defaults
    pub fn from_str_lines(content: &str) -> Result<Self> {
        let mut config = Config::default();
        config.apply_lines(content)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        for key in [
            "pts_cache_depth",
            "page_fill_target",
            "flush_every_packet",
            "serial_seed",
            "delete_on_error",
        ] {
            let name = format!("ENCMUX_{}", key.to_ascii_uppercase());
            if let Ok(value) = env::var(&name) {
                self.set(key, &value)?;
            }
        }
        Ok(())
    }

    fn apply_lines(&mut self, content: &str) -> Result<()> {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('[') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| EncMuxError::Config(format!("expected key = value: {}", line)))?;
            self.set(key.trim(), parse_value(value))?;
        }
        Ok(())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "pts_cache_depth" => {
                let depth: usize = value.parse()?;
                if depth == 0 {
                    return Err(EncMuxError::Config(
                        "pts_cache_depth must be positive".to_string(),
                    ));
                }
                self.pts_cache_depth = depth;
            }
            "page_fill_target" => self.page_fill_target = value.parse()?,
            "flush_every_packet" => self.flush_every_packet = parse_bool(key, value)?,
            "serial_seed" => {
                self.serial_seed = match value {
                    "" | "random" => None,
                    seed => Some(seed.parse()?),
                }
            }
            "delete_on_error" => self.delete_on_error = parse_bool(key, value)?,
            _ => log::warn!("ignoring unknown config key {}", key),
        }
        Ok(())
    }
}

/// Unquotes a value and drops a trailing `# comment`
fn parse_value(raw: &str) -> &str {
    let raw = raw.trim();
    for quote in ['"', '\''] {
        if let Some(rest) = raw.strip_prefix(quote) {
            if let Some(end) = rest.find(quote) {
                return &rest[..end];
            }
        }
    }
    match raw.split_once('#') {
        Some((value, _comment)) => value.trim_end(),
        None => raw,
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(EncMuxError::Config(format!(
            "{}: expected a boolean, got {}",
            key, value
        ))),
    }
}

/// Creates a default config template file if it doesn't exist
pub fn create_default_config_template<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    if !path.as_ref().exists() {
        let template = r#"# encmux configuration
# Remove the leading '#' to change a value.

# Frames a video encoder may keep in flight
# pts_cache_depth = 32

# Ogg page body size in bytes
# page_fill_target = 4096

# One Ogg page per packet
# flush_every_packet = false

# First Ogg serial number, "random" picks one per file
# serial_seed = "random"

# Delete the output file if closing it fails
# delete_on_error = true
"#;
        fs::write(path, template)?;
    }
    Ok(())
}
