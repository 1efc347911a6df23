//! Syslog report sink.

use super::{probe_format, render_template, Report};
use crate::config::Config;
use crate::errors::ScanError;
use crate::meta::Item;
use crate::probe::Fields;
use syslog::{Facility, Formatter3164};

fn facility(name: &str) -> Facility {
    match name.to_lowercase().as_str() {
        "auth" => Facility::LOG_AUTH,
        "authpriv" => Facility::LOG_AUTHPRIV,
        "cron" => Facility::LOG_CRON,
        "daemon" => Facility::LOG_DAEMON,
        "kern" => Facility::LOG_KERN,
        "lpr" => Facility::LOG_LPR,
        "mail" => Facility::LOG_MAIL,
        "news" => Facility::LOG_NEWS,
        "syslog" => Facility::LOG_SYSLOG,
        "user" => Facility::LOG_USER,
        "uucp" => Facility::LOG_UUCP,
        "local0" => Facility::LOG_LOCAL0,
        "local1" => Facility::LOG_LOCAL1,
        "local2" => Facility::LOG_LOCAL2,
        "local3" => Facility::LOG_LOCAL3,
        "local4" => Facility::LOG_LOCAL4,
        "local5" => Facility::LOG_LOCAL5,
        "local6" => Facility::LOG_LOCAL6,
        "local7" => Facility::LOG_LOCAL7,
        other => {
            warn!("unknown syslog facility {}, using daemon", other);
            Facility::LOG_DAEMON
        }
    }
}

pub struct SyslogReport {
    config: Config,
    logger: syslog::Logger<syslog::LoggerBackend, Formatter3164>,
}

impl SyslogReport {
    pub fn new(config: &Config) -> Result<Self, ScanError> {
        let formatter = Formatter3164 {
            facility: facility(&config.getdefault(
                "report:syslog",
                "syslog_facility",
                "daemon",
            )),
            hostname: None,
            process: env!("CARGO_PKG_NAME").to_string(),
            pid: std::process::id(),
        };
        let logger = syslog::unix(formatter)
            .map_err(|e| ScanError::Report(format!("cannot open syslog: {}", e)))?;
        Ok(SyslogReport {
            config: config.clone(),
            logger,
        })
    }
}

impl Report for SyslogReport {
    fn report(&mut self, probe: &str, _item: &Item, fields: &Fields) -> Result<(), ScanError> {
        let message = render_template(&probe_format(&self.config, "syslog", probe), fields);
        self.logger
            .info(message)
            .map_err(|e| ScanError::Report(format!("syslog delivery failed: {}", e)))
    }

    fn render(&mut self) -> Result<(), ScanError> {
        Ok(())
    }
}
