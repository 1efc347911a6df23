//! Terminal report sink: findings grouped per probe, printed at the end of
//! the run.

use super::{probe_format, render_template, Findings, Report};
use crate::config::Config;
use crate::errors::ScanError;
use crate::meta::Item;
use crate::probe::Fields;
use colored::Colorize;
use std::io::{self, Write};

pub struct TtyReport {
    config: Config,
    findings: Findings,
}

impl TtyReport {
    pub fn new(config: &Config) -> Self {
        TtyReport {
            config: config.clone(),
            findings: Findings::new(),
        }
    }

    fn write_summary<W: Write>(&self, w: &mut W) -> io::Result<()> {
        if self.findings.total() == 0 {
            return writeln!(w, "{}", "No classified data found.".green());
        }
        for (probe, entries) in &self.findings.by_probe {
            writeln!(
                w,
                "{}",
                format!("== {} ({} finding(s)) ==", probe, entries.len())
                    .cyan()
                    .bold()
            )?;
            let format = probe_format(&self.config, "tty", probe);
            for fields in entries {
                writeln!(w, "{}", render_template(&format, fields))?;
            }
            writeln!(w)?;
        }
        writeln!(w, "{}", "== Affected files ==".cyan().bold())?;
        for (filename, count) in &self.findings.by_filename {
            writeln!(w, "{} ({})", filename.purple(), count)?;
        }
        writeln!(w, "{}", "== Affected owners ==".cyan().bold())?;
        for (owner, count) in &self.findings.by_username {
            writeln!(w, "{} ({})", owner, count)?;
        }
        Ok(())
    }
}

impl Report for TtyReport {
    fn report(&mut self, probe: &str, item: &Item, fields: &Fields) -> Result<(), ScanError> {
        self.findings.push(probe, item, fields);
        Ok(())
    }

    fn render(&mut self) -> Result<(), ScanError> {
        let stdout = io::stdout();
        let mut w = io::BufWriter::new(stdout.lock());
        self.write_summary(&mut w)
            .and_then(|_| w.flush())
            .map_err(|e| ScanError::Report(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::tests::text_item;

    #[test]
    fn summary_should_list_findings_per_probe() {
        colored::control::set_override(false);
        let mut sink = TtyReport::new(&Config::default());
        let item = text_item("/tmp/cards.txt", "x");
        let fields: Fields = vec![
            ("filename".to_string(), "/tmp/cards.txt".to_string()),
            ("line".to_string(), "1".to_string()),
            ("company".to_string(), "VISA".to_string()),
            ("card_number_masked".to_string(), "************1111".to_string()),
            ("username".to_string(), "alice".to_string()),
        ]
        .into_iter()
        .collect();
        sink.report("pan", &item, &fields).unwrap();
        let mut out = Vec::new();
        sink.write_summary(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("== pan (1 finding(s)) =="));
        assert!(text.contains("/tmp/cards.txt[1]: VISA ************1111"));
        assert!(text.contains("alice (1)"));
    }

    #[test]
    fn empty_run_should_say_so() {
        colored::control::set_override(false);
        let sink = TtyReport::new(&Config::default());
        let mut out = Vec::new();
        sink.write_summary(&mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("No classified data"));
    }
}
