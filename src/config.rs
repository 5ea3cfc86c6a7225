//! INI-style configuration: optional global `key = value` lines followed by
//! `[Section]` blocks. `#` starts a comment line; values may be double-quoted.

use std::collections::HashMap;
use std::fs;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("error reading config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("[{section}] {key} = {value:?} is not valid")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub globals: HashMap<String, String>,
    pub sections: HashMap<String, HashMap<String, String>>,
}

impl Config {
    /// Reads and parses the file at `path`.
    ///
    /// # Errors
    /// [`ConfigError::Io`] if the file cannot be read.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Ok(Self::parse(&content))
    }

    /// Parses config text. Lines that are neither sections nor assignments are ignored.
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let mut cfg = Self::empty();
        let mut current_section: Option<String> = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current_section = Some(name.trim().to_string());
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim().to_string();
                let value = value.trim().trim_matches('"').to_string();
                match &current_section {
                    None => {
                        cfg.globals.insert(key, value);
                    }
                    Some(sec) => {
                        cfg.sections
                            .entry(sec.clone())
                            .or_default()
                            .insert(key, value);
                    }
                }
            }
        }
        cfg
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|sec| sec.get(key))
            .map(String::as_str)
    }

    #[must_use]
    pub fn get_non_empty(&self, section: &str, key: &str) -> Option<&str> {
        self.get(section, key).filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn get_global(&self, key: &str) -> Option<&str> {
        self.globals.get(key).map(String::as_str)
    }

    /// Section value, then global value, then `default`.
    #[must_use]
    pub fn get_or_default<'a>(&'a self, section: &str, key: &str, default: &'a str) -> &'a str {
        self.get(section, key)
            .or_else(|| self.get_global(key))
            .unwrap_or(default)
    }

    #[must_use]
    pub fn get_non_empty_or_default<'a>(
        &'a self,
        section: &str,
        key: &str,
        default: &'a str,
    ) -> &'a str {
        self.get_non_empty(section, key)
            .or_else(|| self.get_global(key).filter(|s| !s.is_empty()))
            .unwrap_or(default)
    }

    /// Parses a non-empty value. `Ok(None)` when the key is absent or empty.
    ///
    /// # Errors
    /// [`ConfigError::InvalidValue`] when the value does not parse as `T`.
    pub fn get_parsed<T: FromStr>(&self, section: &str, key: &str) -> Result<Option<T>, ConfigError> {
        match self.get_non_empty(section, key) {
            None => Ok(None),
            Some(raw) => raw.parse::<T>().map(Some).map_err(|_| ConfigError::InvalidValue {
                section: section.to_owned(),
                key: key.to_owned(),
                value: raw.to_owned(),
            }),
        }
    }

    /// Accepts `true/false`, `yes/no`, `on/off` and `1/0`.
    ///
    /// # Errors
    /// [`ConfigError::InvalidValue`] for anything else.
    pub fn get_bool(&self, section: &str, key: &str) -> Result<Option<bool>, ConfigError> {
        let Some(raw) = self.get_non_empty(section, key) else {
            return Ok(None);
        };
        match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(Some(true)),
            "false" | "no" | "off" | "0" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidValue {
                section: section.to_owned(),
                key: key.to_owned(),
                value: raw.to_owned(),
            }),
        }
    }

    /// Comma separated list with blanks removed. `None` when the key is absent.
    #[must_use]
    pub fn get_list(&self, section: &str, key: &str) -> Option<Vec<String>> {
        self.get_non_empty(section, key).map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    const SAMPLE: &str = r#"
# global keys
log_filename = "fallback"

[Call]
ring_timeout_ms = 30000
empty =

[Ice]
stun_servers = stun:a.example:3478 , stun:b.example:3478,

[Media]
noise_suppression = off
"#;

    #[test]
    fn parses_sections_globals_and_quotes() {
        let cfg = Config::parse(SAMPLE);
        assert_eq!(cfg.get_global("log_filename"), Some("fallback"));
        assert_eq!(cfg.get("Call", "ring_timeout_ms"), Some("30000"));
        assert_eq!(cfg.get("Call", "empty"), Some(""));
        assert_eq!(cfg.get_non_empty("Call", "empty"), None);
        assert_eq!(
            cfg.get_non_empty_or_default("Logging", "log_filename", "x"),
            "fallback"
        );
    }

    #[test]
    fn typed_getters() {
        let cfg = Config::parse(SAMPLE);
        assert_eq!(cfg.get_parsed::<u64>("Call", "ring_timeout_ms").unwrap(), Some(30_000));
        assert_eq!(cfg.get_parsed::<u64>("Call", "missing").unwrap(), None);
        assert_eq!(cfg.get_bool("Media", "noise_suppression").unwrap(), Some(false));
        assert_eq!(
            cfg.get_list("Ice", "stun_servers").unwrap(),
            vec!["stun:a.example:3478", "stun:b.example:3478"]
        );
    }

    #[test]
    fn invalid_value_reports_location() {
        let cfg = Config::parse("[Call]\nring_timeout_ms = soon\n");
        let err = cfg.get_parsed::<u64>("Call", "ring_timeout_ms").unwrap_err();
        assert_eq!(err.to_string(), "[Call] ring_timeout_ms = \"soon\" is not valid");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = Config::load("/definitely/not/here.conf").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
