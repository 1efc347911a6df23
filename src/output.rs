use atty::Stream;
use colored::{ColoredString, Colorize};
use log::Level;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Output {
    verbose: bool,
    debug: bool,
    color: Option<bool>,
}

impl Output {
    pub fn new(verbose: bool, debug: bool, color: &str) -> Self {
        Output {
            verbose,
            debug,
            color: match color {
                "always" => Some(true),
                "never" => Some(false),
                _ => None,
            },
        }
    }

    pub fn log_init(&self) {
        match self.color {
            Some(colorcontrol) => colored::control::set_override(colorcontrol),
            None => {
                if !(atty::is(Stream::Stdout) && atty::is(Stream::Stderr)) {
                    colored::control::set_override(false)
                }
            }
        }
        let level = match (self.verbose, self.debug) {
            (_, true) => log::LevelFilter::Debug,
            (true, _) => log::LevelFilter::Info,
            _ => log::LevelFilter::Warn,
        };
        env_logger::Builder::new()
            .format(|buf, r| match r.level() {
                Level::Error => writeln!(
                    buf,
                    "{} {}: {}",
                    env!("CARGO_PKG_NAME"),
                    r.level().to_string().red().bold(),
                    r.args()
                ),
                Level::Warn => writeln!(
                    buf,
                    "{} {}: {}",
                    env!("CARGO_PKG_NAME"),
                    r.level().to_string().yellow(),
                    r.args()
                ),
                Level::Info => writeln!(buf, "{}: {}", env!("CARGO_PKG_NAME"), r.args()),
                _ => writeln!(buf, "{}", r.args().to_string().blue()),
            })
            .filter(None, level)
            .init();
    }
}

pub fn p2s<P: AsRef<Path>>(path: P) -> ColoredString {
    path.as_ref().display().to_string().green()
}
