//! Read access to the INI configuration.
//!
//! Parsing is delegated to `configparser` (with multiline values enabled);
//! this module only fixes the read contract the scanner, probes and report
//! sinks rely on: plain `get`, defaulted lookups, comma-separated lists and
//! newline-separated multi-values with `#` comments stripped.

use crate::errors::ScanError;
use configparser::ini::Ini;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Config {
    ini: Ini,
}

impl Default for Config {
    fn default() -> Self {
        let mut ini = Ini::new();
        ini.set_multiline(true);
        Config { ini }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScanError> {
        let mut cfg = Self::default();
        cfg.ini.load(path.as_ref()).map_err(|e| {
            ScanError::BadOption("config".into(), path.as_ref().display().to_string(), e)
        })?;
        Ok(cfg)
    }

    pub fn from_str(text: &str) -> Result<Self, ScanError> {
        let mut cfg = Self::default();
        cfg.ini
            .read(text.to_string())
            .map_err(|e| ScanError::BadOption("config".into(), "<inline>".into(), e))?;
        Ok(cfg)
    }

    pub fn get(&self, section: &str, option: &str) -> Option<String> {
        self.ini.get(section, option)
    }

    pub fn getdefault(&self, section: &str, option: &str, default: &str) -> String {
        self.get(section, option)
            .unwrap_or_else(|| default.to_string())
    }

    pub fn getbool(&self, section: &str, option: &str, default: bool) -> bool {
        match self.get(section, option) {
            Some(v) => matches!(v.to_lowercase().as_str(), "1" | "yes" | "true" | "on"),
            None => default,
        }
    }

    pub fn getint(&self, section: &str, option: &str) -> Result<Option<i64>, ScanError> {
        match self.get(section, option) {
            None => Ok(None),
            Some(v) => v.trim().parse::<i64>().map(Some).map_err(|_| {
                ScanError::BadOption(section.to_string(), option.to_string(), v.clone())
            }),
        }
    }

    /// Comma-separated list; empty entries are dropped.
    pub fn getlist(&self, section: &str, option: &str) -> Vec<String> {
        match self.get(section, option) {
            None => vec![],
            Some(v) => v
                .split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect(),
        }
    }

    /// Newline-separated list with `#` line-comments stripped and
    /// comma/whitespace padding removed.
    pub fn getmulti(&self, section: &str, option: &str) -> Vec<String> {
        match self.get(section, option) {
            None => vec![],
            Some(v) => v
                .lines()
                .map(|line| match line.rsplitn(2, " #").last() {
                    Some(stripped) => stripped,
                    None => line,
                })
                .map(|line| line.trim_matches(|c: char| c.is_whitespace() || c == ',').to_string())
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .collect(),
        }
    }

    /// Option names present in a section.
    pub fn options(&self, section: &str) -> Vec<String> {
        match self.ini.get_map_ref().get(&section.to_lowercase()) {
            Some(map) => map.keys().cloned().collect(),
            None => vec![],
        }
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.ini
            .get_map_ref()
            .contains_key(&section.to_lowercase())
    }
}
