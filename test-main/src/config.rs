use std::env::var_os;
use std::ffi::OsStr;
use std::path::Path;
use log::warn;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct Config {
    /// Printed on the first line after startup.
    pub greeting: String,
    /// Startup backlight color, red in bit 0, green in bit 1, blue in bit 2.
    pub backlight: u8,
}

impl Config {
    pub fn try_load() -> Option<Self> {
        let config_str = var_os("CONFIG_FILE");
        let config_str: &OsStr = config_str.as_deref().unwrap_or(OsStr::new("config.json"));
        let config_path = Path::new(config_str);
        if config_path.exists() {
            let file = std::fs::File::open(config_path).ok()?;
            let reader = std::io::BufReader::new(file);
            match serde_json::from_reader(reader) {
                Ok(config) => Some(config),
                Err(err) => {
                    warn!("Ignoring {}: {}", config_path.display(), err);
                    None
                }
            }
        } else {
            None
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            greeting: "Hello, world!".to_string(),
            backlight: 0x7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config: Config = serde_json::from_str(r#"{ "backlight": 4 }"#).unwrap();
        assert_eq!(config.greeting, "Hello, world!");
        assert_eq!(config.backlight, 4);
    }
}
