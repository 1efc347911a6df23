//! Flat-file report sink: one timestamped line per finding.

use super::{probe_format, render_template, require_output, Report};
use crate::config::Config;
use crate::errors::ScanError;
use crate::meta::Item;
use crate::probe::Fields;
use chrono::Local;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

pub struct FileReport {
    config: Config,
    path: PathBuf,
    handle: BufWriter<fs::File>,
}

impl FileReport {
    pub fn new(config: &Config, output: Option<&str>) -> Result<Self, ScanError> {
        let path = PathBuf::from(require_output("file", output)?);
        let handle = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| ScanError::Inaccessible {
                path: path.clone(),
                source,
            })?;
        Ok(FileReport {
            config: config.clone(),
            path,
            handle: BufWriter::new(handle),
        })
    }
}

impl Report for FileReport {
    fn report(&mut self, probe: &str, _item: &Item, fields: &Fields) -> Result<(), ScanError> {
        let line = render_template(&probe_format(&self.config, "file", probe), fields);
        writeln!(
            self.handle,
            "{} {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            line
        )
        .map_err(|e| ScanError::Report(format!("cannot write {}: {}", self.path.display(), e)))
    }

    fn render(&mut self) -> Result<(), ScanError> {
        self.handle
            .flush()
            .map_err(|e| ScanError::Report(format!("cannot flush {}: {}", self.path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::tests::text_item;

    #[test]
    fn missing_output_is_a_setup_error() {
        assert!(FileReport::new(&Config::default(), None).is_err());
    }

    #[test]
    fn findings_are_appended_as_lines() {
        let t = tempfile::tempdir().unwrap();
        let out = t.path().join("report.log");
        let config =
            Config::from_str("[report:file]\nformat_pan = {company} {card_number_masked}\n")
                .unwrap();
        let mut sink = FileReport::new(&config, Some(out.to_str().unwrap())).unwrap();
        let item = text_item("/tmp/cc", "x");
        let fields: Fields = vec![
            ("company".to_string(), "VISA".to_string()),
            ("card_number_masked".to_string(), "************1111".to_string()),
        ]
        .into_iter()
        .collect();
        sink.report("pan", &item, &fields).unwrap();
        sink.render().unwrap();
        let text = fs::read_to_string(&out).unwrap();
        assert!(text.trim_end().ends_with("VISA ************1111"), "{}", text);
        assert_eq!(1, text.lines().count());
    }
}
