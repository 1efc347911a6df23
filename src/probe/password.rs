//! Plaintext password detection: structured `pgpass` parsing plus a
//! heuristic keyword scan.

use super::{Fields, Probe, Recorder};
use crate::config::Config;
use crate::errors::ScanError;
use crate::meta::Item;
use regex::Regex;
use std::io::BufRead;

pub const FORMAT: &str = "{filename_relative}[{line}]: {type} {text_masked}";

const DEFAULT_PATTERN: &str = r"\bpass(?:|wd|word)\b[ \s\t=:]+(?P<password>.*)";
const MASK: &str = "********";

pub struct Password {
    pattern: Regex,
}

impl Password {
    pub fn new(config: &Config) -> Result<Self, ScanError> {
        let pattern = config.getdefault("probe:password", "pattern", DEFAULT_PATTERN);
        let pattern = Regex::new(&pattern).map_err(|e| {
            ScanError::BadOption(
                "probe:password".to_string(),
                "pattern".to_string(),
                e.to_string(),
            )
        })?;
        Ok(Password { pattern })
    }

    /// `host:port:database:user:password`, one connection per line.
    fn probe_pgpass(&self, item: &Item, rec: &mut Recorder) -> Result<(), ScanError> {
        let reader = item.open()?;
        for (lineno, line) in reader.split(b'\n').enumerate() {
            let line = String::from_utf8_lossy(&line?).into_owned();
            let part: Vec<&str> = line.split(':').collect();
            if part.len() != 5 || part[4].trim_end().is_empty() {
                continue;
            }
            let password = part[4].trim_end().to_string();
            let mut fields = Fields::new();
            fields.insert("raw".to_string(), line.clone());
            fields.insert("type".to_string(), "pgpass".to_string());
            fields.insert("line".to_string(), (lineno + 1).to_string());
            fields.insert("text".to_string(), line.trim_end().to_string());
            fields.insert(
                "text_masked".to_string(),
                format!("{}:{}", part[..4].join(":"), MASK),
            );
            fields.insert("password".to_string(), password);
            fields.insert("password_masked".to_string(), MASK.to_string());
            rec.record(item, fields)?;
        }
        Ok(())
    }

    fn probe_heuristic(&self, item: &Item, rec: &mut Recorder) -> Result<(), ScanError> {
        let reader = item.open()?;
        for (lineno, line) in reader.split(b'\n').enumerate() {
            let line = String::from_utf8_lossy(&line?).into_owned();
            for caps in self.pattern.captures_iter(&line) {
                let password = match caps.name("password") {
                    Some(m) if !m.as_str().is_empty() => m.as_str().to_string(),
                    _ => continue,
                };
                let text = line.trim_end().to_string();
                let mut fields = Fields::new();
                fields.insert("raw".to_string(), line.clone());
                fields.insert("type".to_string(), "password".to_string());
                fields.insert("line".to_string(), (lineno + 1).to_string());
                fields.insert("text_masked".to_string(), text.replace(&password, MASK));
                fields.insert("text".to_string(), text);
                fields.insert("password".to_string(), password);
                fields.insert("password_masked".to_string(), MASK.to_string());
                rec.record(item, fields)?;
            }
        }
        Ok(())
    }
}

impl Probe for Password {
    fn probe(&mut self, item: &Item, rec: &mut Recorder) -> Result<(), ScanError> {
        let basename = item
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if basename.contains("pgpass") {
            self.probe_pgpass(item, rec)?;
        }
        // scan for passwords heuristically in any case
        self.probe_heuristic(item, rec)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{run_probe, text_item};
    use super::*;

    #[test]
    fn pgpass_lines_should_be_parsed() {
        let item = text_item(
            "/home/alice/.pgpass",
            "db.local:5432:app:alice:hunter2\nmalformed line\nh:p:d:u:\n",
        );
        let report = run_probe("password", &Config::default(), &item).unwrap();
        assert_eq!(1, report.seen.len());
        let fields = &report.seen[0].2;
        assert_eq!("pgpass", fields["type"]);
        assert_eq!("db.local:5432:app:alice:********", fields["text_masked"]);
        assert_eq!("hunter2", fields["password"]);
        assert_eq!("1", fields["line"]);
    }

    #[test]
    fn keyword_scan_should_mask_the_match() {
        let item = text_item("/etc/app.conf", "password = s3cret\nhost = localhost\n");
        let report = run_probe("password", &Config::default(), &item).unwrap();
        assert_eq!(1, report.seen.len());
        let fields = &report.seen[0].2;
        assert_eq!("password", fields["type"]);
        assert_eq!("password = ********", fields["text_masked"]);
        assert_eq!("1", fields["line"]);
    }

    #[test]
    fn passwd_and_password_variants_match() {
        let item = text_item("/etc/app.conf", "passwd: abc\npass=xyz\nbypass = no\n");
        let report = run_probe("password", &Config::default(), &item).unwrap();
        assert_eq!(2, report.seen.len());
        assert_eq!("abc", report.seen[0].2["password"]);
        assert_eq!("xyz", report.seen[1].2["password"]);
    }

    #[test]
    fn empty_password_should_not_fire() {
        let item = text_item("/etc/app.conf", "password = \n");
        let report = run_probe("password", &Config::default(), &item).unwrap();
        assert!(report.seen.is_empty());
    }

    #[test]
    fn custom_pattern_should_replace_default() {
        let config =
            Config::from_str("[probe:password]\npattern = (?P<password>TOKEN-\\d+)\n").unwrap();
        let item = text_item("/etc/app.conf", "auth with TOKEN-12345 now\n");
        let report = run_probe("password", &config, &item).unwrap();
        assert_eq!(1, report.seen.len());
        assert_eq!("TOKEN-12345", report.seen[0].2["password"]);
    }
}
