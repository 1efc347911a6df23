//! Mail report sink: the HTML document as a MIME message over SMTP.
//!
//! Delivery failures are logged, never retried.

use super::html::render_document;
use super::{require_output, Findings, Report};
use crate::config::Config;
use crate::errors::ScanError;
use crate::meta::Item;
use crate::probe::Fields;
use lettre::message::header::ContentType;
use lettre::{Message, SmtpTransport, Transport};
use std::env;

const DEFAULT_SENDER: &str = "{user}@{hostname}";
const DEFAULT_SUBJECT: &str = "Classified report for {hostname}";

pub struct MailReport {
    config: Config,
    recipients: String,
    findings: Findings,
}

impl MailReport {
    pub fn new(config: &Config, output: Option<&str>) -> Result<Self, ScanError> {
        Ok(MailReport {
            config: config.clone(),
            recipients: require_output("mail", output)?,
            findings: Findings::new(),
        })
    }

    fn envelope_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(
            "user".to_string(),
            env::var("USER").unwrap_or_else(|_| "no-reply".to_string()),
        );
        fields.insert("hostname".to_string(), self.findings.hostname.clone());
        fields.insert("fqdn".to_string(), self.findings.hostname.clone());
        fields
    }

    fn compose(&self) -> Result<Message, ScanError> {
        let fields = self.envelope_fields();
        let sender = super::render_template(
            &self
                .config
                .getdefault("report:mail", "sender", DEFAULT_SENDER),
            &fields,
        );
        let subject = super::render_template(
            &self
                .config
                .getdefault("report:mail", "subject", DEFAULT_SUBJECT),
            &fields,
        );
        let mut builder = Message::builder()
            .from(sender.parse().map_err(|e| {
                ScanError::Report(format!("invalid sender {}: {}", sender, e))
            })?)
            .subject(subject)
            .header(ContentType::TEXT_HTML);
        for recipient in self.recipients.split(',') {
            let recipient = recipient.trim();
            builder = builder.to(recipient.parse().map_err(|e| {
                ScanError::Report(format!("invalid recipient {}: {}", recipient, e))
            })?);
        }
        let body = render_document(&self.findings, &self.config, "mail")?;
        builder
            .body(body)
            .map_err(|e| ScanError::Report(format!("cannot build message: {}", e)))
    }
}

impl Report for MailReport {
    fn report(&mut self, probe: &str, item: &Item, fields: &Fields) -> Result<(), ScanError> {
        self.findings.push(probe, item, fields);
        Ok(())
    }

    fn render(&mut self) -> Result<(), ScanError> {
        let message = self.compose()?;
        let server = self
            .config
            .getdefault("report:mail", "server", "localhost");
        let mailer = SmtpTransport::builder_dangerous(server.as_str()).build();
        match mailer.send(&message) {
            Ok(_) => info!(
                "mailed report with {} finding(s) to {}",
                self.findings.total(),
                self.recipients
            ),
            Err(e) => error!("cannot deliver report via {}: {}", server, e),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::tests::text_item;

    fn sink(recipients: &str) -> MailReport {
        let config = Config::from_str(
            "[report:mail]\nsender = scanner@example.org\nsubject = findings on {hostname}\n",
        )
        .unwrap();
        MailReport::new(&config, Some(recipients)).unwrap()
    }

    #[test]
    fn missing_recipients_is_a_setup_error() {
        assert!(MailReport::new(&Config::default(), None).is_err());
    }

    #[test]
    fn message_should_carry_findings_as_html() {
        let mut sink = sink("sec@example.org, ops@example.org");
        let item = text_item("/tmp/cards.txt", "x");
        let fields: Fields = vec![("company".to_string(), "VISA".to_string())]
            .into_iter()
            .collect();
        sink.report("pan", &item, &fields).unwrap();
        let message = sink.compose().unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: findings on"));
        assert!(raw.contains("sec@example.org"));
        assert!(raw.contains("ops@example.org"));
        assert!(raw.contains("text/html"));
    }

    #[test]
    fn bad_recipient_should_fail_composition() {
        let mut sink = sink("not an address");
        let item = text_item("/tmp/cards.txt", "x");
        sink.report("pan", &item, &Fields::new()).unwrap();
        assert!(sink.compose().is_err());
    }
}
