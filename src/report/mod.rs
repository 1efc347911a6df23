//! Report sinks. Syslog and file sinks emit one line per finding; HTML,
//! mail and TTY accumulate findings and materialise a document at
//! `render()`.

pub mod file;
pub mod html;
pub mod mail;
pub mod syslogger;
pub mod tty;

use crate::config::Config;
use crate::errors::ScanError;
use crate::meta::Item;
use crate::probe::Fields;
use chrono::{DateTime, Local};
use std::collections::BTreeMap;

pub trait Report {
    fn report(&mut self, probe: &str, item: &Item, fields: &Fields) -> Result<(), ScanError>;
    fn render(&mut self) -> Result<(), ScanError>;
}

/// Instantiates a report sink by name.
pub fn create(
    name: &str,
    config: &Config,
    output: Option<&str>,
) -> Result<Box<dyn Report>, ScanError> {
    match name {
        "file" => Ok(Box::new(file::FileReport::new(config, output)?)),
        "syslog" => Ok(Box::new(syslogger::SyslogReport::new(config)?)),
        "html" => Ok(Box::new(html::HtmlReport::new(config, output)?)),
        "mail" => Ok(Box::new(mail::MailReport::new(config, output)?)),
        "tty" => Ok(Box::new(tty::TtyReport::new(config))),
        other => Err(ScanError::NotImplemented(format!("report sink {}", other))),
    }
}

/// The output target a sink cannot work without.
pub fn require_output(name: &str, output: Option<&str>) -> Result<String, ScanError> {
    match output {
        Some(target) if !target.is_empty() => Ok(target.to_string()),
        _ => Err(ScanError::Report(format!(
            "please supply an output target for the {} report with --output",
            name
        ))),
    }
}

/// `{name}`-style interpolation; a `:spec` suffix inside braces is
/// accepted and ignored, doubled braces escape.
pub fn render_template(template: &str, fields: &Fields) -> String {
    let mut out = String::with_capacity(template.len() + 32);
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let mut name = String::new();
                let mut closed = false;
                for n in chars.by_ref() {
                    if n == '}' {
                        closed = true;
                        break;
                    }
                    name.push(n);
                }
                if !closed {
                    out.push('{');
                    out.push_str(&name);
                    continue;
                }
                let key = name.split(':').next().unwrap_or("");
                if let Some(value) = fields.get(key) {
                    out.push_str(value);
                }
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                }
                out.push('}');
            }
            other => out.push(other),
        }
    }
    out
}

/// Per-finding line for a sink: `report:<sink>.format_<probe>`, then the
/// sink's generic `format`, then the probe's built-in default.
pub fn probe_format(config: &Config, sink: &str, probe: &str) -> String {
    let section = format!("report:{}", sink);
    config
        .get(&section, &format!("format_{}", probe))
        .or_else(|| config.get(&section, "format"))
        .unwrap_or_else(|| crate::probe::default_format(probe).to_string())
}

pub fn hostname() -> String {
    let mut buf = [0u8; 256];
    nix::unistd::gethostname(&mut buf)
        .map(|c| c.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_string())
}

/// In-memory accumulator shared by the document-producing sinks.
#[derive(Debug)]
pub struct Findings {
    pub started: DateTime<Local>,
    pub hostname: String,
    pub by_probe: BTreeMap<String, Vec<Fields>>,
    pub by_filename: BTreeMap<String, usize>,
    pub by_username: BTreeMap<String, usize>,
}

impl Default for Findings {
    fn default() -> Self {
        Findings {
            started: Local::now(),
            hostname: hostname(),
            by_probe: BTreeMap::new(),
            by_filename: BTreeMap::new(),
            by_username: BTreeMap::new(),
        }
    }
}

impl Findings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, probe: &str, item: &Item, fields: &Fields) {
        self.by_probe
            .entry(probe.to_string())
            .or_insert_with(Vec::new)
            .push(fields.clone());
        *self
            .by_filename
            .entry(item.path().display().to_string())
            .or_insert(0) += 1;
        let owner = fields
            .get("username")
            .or_else(|| fields.get("uid"))
            .cloned()
            .unwrap_or_default();
        *self.by_username.entry(owner).or_insert(0) += 1;
    }

    pub fn total(&self) -> usize {
        self.by_probe.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn template_should_substitute_named_fields() {
        let f = fields(&[("filename", "/tmp/x"), ("line", "3"), ("company", "VISA")]);
        assert_eq!(
            "/tmp/x[3]: VISA",
            render_template("{filename}[{line}]: {company}", &f)
        );
    }

    #[test]
    fn template_should_ignore_format_specs_and_unknowns() {
        let f = fields(&[("line", "7")]);
        assert_eq!("7 ", render_template("{line:d} {missing}", &f));
    }

    #[test]
    fn template_should_unescape_doubled_braces() {
        let f = fields(&[("x", "v")]);
        assert_eq!("{x} v", render_template("{{x}} {x}", &f));
    }

    #[test]
    fn probe_format_should_fall_back_to_probe_default() {
        let config = Config::from_str(
            "[report:file]\nformat_pan = PAN {card_number_masked}\n",
        )
        .unwrap();
        assert_eq!("PAN {card_number_masked}", probe_format(&config, "file", "pan"));
        assert_eq!(
            crate::probe::default_format("ssl"),
            probe_format(&config, "file", "ssl")
        );
    }

    #[test]
    fn unknown_sink_should_be_refused() {
        assert!(matches!(
            create("carrier-pigeon", &Config::default(), None),
            Err(ScanError::NotImplemented(_))
        ));
    }

    #[test]
    fn findings_should_group_by_probe_file_and_owner() {
        let mut findings = Findings::new();
        let item = crate::probe::tests::text_item("/tmp/a", "x");
        let f = fields(&[("username", "alice")]);
        findings.push("pan", &item, &f);
        findings.push("pan", &item, &f);
        findings.push("ssl", &item, &f);
        assert_eq!(3, findings.total());
        assert_eq!(2, findings.by_probe["pan"].len());
        assert_eq!(3, findings.by_filename["/tmp/a"]);
        assert_eq!(3, findings.by_username["alice"]);
    }
}
