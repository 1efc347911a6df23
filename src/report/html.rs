//! HTML report sink: accumulates findings, renders one document at the end
//! of the run.

use super::{probe_format, render_template, require_output, Findings, Report};
use crate::config::Config;
use crate::errors::ScanError;
use crate::meta::Item;
use crate::probe::Fields;
use chrono::Local;
use std::fs;
use std::io::{self, Write};

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

/// The report body: findings grouped by probe, then per-file and per-user
/// tallies.
pub fn render_body(findings: &Findings, config: &Config, sink: &str) -> String {
    let mut body = String::new();
    for (probe, entries) in &findings.by_probe {
        body.push_str(&format!(
            "<h2>{} ({} finding{})</h2>\n<ul>\n",
            escape(probe),
            entries.len(),
            if entries.len() == 1 { "" } else { "s" }
        ));
        let format = probe_format(config, sink, probe);
        for fields in entries {
            body.push_str(&format!(
                "<li>{}</li>\n",
                escape(&render_template(&format, fields))
            ));
        }
        body.push_str("</ul>\n");
    }
    body.push_str("<h2>Affected files</h2>\n<ul>\n");
    for (filename, count) in &findings.by_filename {
        body.push_str(&format!("<li>{} ({})</li>\n", escape(filename), count));
    }
    body.push_str("</ul>\n<h2>Affected owners</h2>\n<ul>\n");
    for (owner, count) in &findings.by_username {
        body.push_str(&format!("<li>{} ({})</li>\n", escape(owner), count));
    }
    body.push_str("</ul>\n");
    body
}

/// Full document. A configured template file wraps the body; the built-in
/// page is used otherwise.
pub fn render_document(
    findings: &Findings,
    config: &Config,
    sink: &str,
) -> Result<String, ScanError> {
    let body = render_body(findings, config, sink);
    let mut fields = Fields::new();
    fields.insert("body".to_string(), body);
    fields.insert("hostname".to_string(), findings.hostname.clone());
    fields.insert(
        "started".to_string(),
        findings.started.format("%Y-%m-%d %H:%M:%S").to_string(),
    );
    fields.insert(
        "finished".to_string(),
        Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    );
    fields.insert("total".to_string(), findings.total().to_string());
    let section = format!("report:{}", sink);
    let template = match config.get(&section, "template") {
        Some(path) => fs::read_to_string(&path).map_err(|source| ScanError::Inaccessible {
            path: path.into(),
            source,
        })?,
        None => "<!DOCTYPE html>\n<html>\n<head><title>Classified report for {hostname}</title></head>\n\
                 <body>\n<h1>Classified report for {hostname}</h1>\n\
                 <p>Scan started {started}, finished {finished}; {total} finding(s).</p>\n\
                 {body}</body>\n</html>\n"
            .to_string(),
    };
    Ok(render_template(&template, &fields))
}

pub struct HtmlReport {
    config: Config,
    output: String,
    findings: Findings,
}

impl HtmlReport {
    pub fn new(config: &Config, output: Option<&str>) -> Result<Self, ScanError> {
        Ok(HtmlReport {
            config: config.clone(),
            output: require_output("html", output)?,
            findings: Findings::new(),
        })
    }
}

impl Report for HtmlReport {
    fn report(&mut self, probe: &str, item: &Item, fields: &Fields) -> Result<(), ScanError> {
        self.findings.push(probe, item, fields);
        Ok(())
    }

    fn render(&mut self) -> Result<(), ScanError> {
        let document = render_document(&self.findings, &self.config, "html")?;
        if self.output == "-" {
            io::stdout()
                .write_all(document.as_bytes())
                .map_err(|e| ScanError::Report(e.to_string()))
        } else {
            fs::write(&self.output, document).map_err(|e| {
                ScanError::Report(format!("cannot write {}: {}", self.output, e))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::tests::text_item;

    fn sample_findings() -> Findings {
        let mut findings = Findings::new();
        let item = text_item("/tmp/cards.txt", "x");
        let fields: Fields = vec![
            ("company".to_string(), "VISA".to_string()),
            ("card_number_masked".to_string(), "************1111".to_string()),
            ("filename".to_string(), "/tmp/cards.txt".to_string()),
            ("line".to_string(), "1".to_string()),
            ("username".to_string(), "alice".to_string()),
        ]
        .into_iter()
        .collect();
        findings.push("pan", &item, &fields);
        findings
    }

    #[test]
    fn body_should_group_and_escape() {
        let body = render_body(&sample_findings(), &Config::default(), "html");
        assert!(body.contains("<h2>pan (1 finding)</h2>"));
        assert!(body.contains("VISA ************1111"));
        assert!(body.contains("/tmp/cards.txt (1)"));
        assert!(body.contains("alice (1)"));
    }

    #[test]
    fn escape_should_neutralise_markup() {
        assert_eq!("&lt;b&gt;&amp;&quot;", escape("<b>&\""));
    }

    #[test]
    fn rendered_document_should_be_written_to_file() {
        let t = tempfile::tempdir().unwrap();
        let out = t.path().join("report.html");
        let mut sink =
            HtmlReport::new(&Config::default(), Some(out.to_str().unwrap())).unwrap();
        let item = text_item("/tmp/cards.txt", "x");
        let fields: Fields = vec![("company".to_string(), "VISA".to_string())]
            .into_iter()
            .collect();
        sink.report("pan", &item, &fields).unwrap();
        sink.render().unwrap();
        let text = fs::read_to_string(&out).unwrap();
        assert!(text.starts_with("<!DOCTYPE html>"));
        assert!(text.contains("1 finding(s)"));
    }

    #[test]
    fn configured_template_should_wrap_the_body() {
        let t = tempfile::tempdir().unwrap();
        let tpl = t.path().join("tpl.html");
        fs::write(&tpl, "== {hostname} ==\n{body}").unwrap();
        let config = Config::from_str(&format!(
            "[report:html]\ntemplate = {}\n",
            tpl.display()
        ))
        .unwrap();
        let document = render_document(&sample_findings(), &config, "html").unwrap();
        assert!(document.starts_with("== "));
        assert!(document.contains("<h2>pan"));
    }
}
