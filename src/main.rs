#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

mod checksum;
mod config;
mod errors;
mod incremental;
mod meta;
mod output;
mod platform;
mod probe;
mod report;
mod repository;
mod scanner;

use anyhow::{Context, Result};
use config::Config;
use errors::ScanError;
use output::{p2s, Output};
use scanner::Scanner;
use std::path::PathBuf;
use structopt::StructOpt;

static DEFAULT_CONFIG: &str = "/etc/classified/classified.conf";

#[derive(Debug, Clone, Default)]
pub struct App {
    opt: Opt,
    output: Output,
}

impl App {
    fn config(&self) -> Result<Config> {
        match &self.opt.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("cannot read configuration {}", p2s(path))),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG);
                if default.exists() {
                    Config::load(&default).with_context(|| {
                        format!("cannot read configuration {}", p2s(&default))
                    })
                } else {
                    debug!("no configuration file, using built-in defaults");
                    Ok(Config::default())
                }
            }
        }
    }

    /// Main entry point
    pub fn run(&self) -> Result<i32> {
        self.output.log_init();
        let config = self.config()?;
        let report = match report::create(
            &self.opt.report_format,
            &config,
            self.opt.output.as_deref(),
        ) {
            Ok(report) => report,
            Err(e @ ScanError::Report(_)) => {
                eprintln!("{}", e);
                return Ok(1);
            }
            Err(e) => return Err(e.into()),
        };
        let mut scanner = Scanner::new(&config, report, &self.opt.probes)
            .context("scanner setup failed")?;
        for path in &self.opt.paths {
            scanner
                .scan(path)
                .with_context(|| format!("scan of {} failed", p2s(path)))?;
        }
        scanner.finish().context("cannot finalise the report")?;
        Ok(0)
    }
}

impl From<Opt> for App {
    fn from(opt: Opt) -> Self {
        let output = Output::new(opt.verbose, opt.debug, &opt.color);
        App { opt, output }
    }
}

#[derive(StructOpt, Debug, Clone, Default)]
#[structopt(author = "© Classified contributors.")]
struct Opt {
    /// Reads configuration from FILE
    ///
    /// Without this option, /etc/classified/classified.conf is used if it
    /// exists; built-in defaults otherwise.
    #[structopt(short, long, value_name = "FILE", parse(from_os_str))]
    config: Option<PathBuf>,
    /// Runs only the given probes
    ///
    /// Accepts a comma-separated list of probe names, or "all". Defaults to
    /// the configured scanner.include_probe list.
    #[structopt(short, long, value_name = "PROBES", use_delimiter(true))]
    probes: Vec<String>,
    /// Selects the report sink
    #[structopt(
        long = "report-format",
        value_name = "FMT",
        default_value = "tty",
        possible_values(&["file", "syslog", "html", "mail", "tty"])
    )]
    report_format: String,
    /// Report target: output file, "-" for stdout, or mail recipients
    #[structopt(short, long, value_name = "TARGET")]
    output: Option<String>,
    /// Displays additional output like scan progress
    #[structopt(short, long)]
    verbose: bool,
    /// Shows every file opened and lots of other stuff (implies --verbose)
    #[structopt(short, long, display_order(100))]
    debug: bool,
    /// Funky colorful output
    ///
    /// If set to "auto", color is on if run in a terminal.
    #[structopt(short = "C", long, value_name = "WHEN", default_value = "auto",
                possible_values(&["always", "never", "auto"])
    )]
    color: String,
    /// Scans these paths
    #[structopt(value_name = "PATH", required = true, parse(from_os_str))]
    paths: Vec<PathBuf>,
}

fn main() {
    let app = App::from(Opt::from_args());
    match app.run() {
        Err(ref err) => {
            error!("{:#}", err);
            std::process::exit(2)
        }
        Ok(exitcode) => std::process::exit(exitcode),
    }
}

#[cfg(test)]
pub mod test {
    use super::*;

    fn app(opts: &[&str]) -> App {
        let mut argv = vec!["classified"];
        argv.extend_from_slice(opts);
        argv.push("dir");
        App::from(Opt::from_iter(&argv))
    }

    #[test]
    fn probes_should_be_collected_from_delimited_list() {
        let a = app(&["-p", "pan,ssl"]);
        assert_eq!(vec!["pan", "ssl"], a.opt.probes);
    }

    #[test]
    fn report_format_should_default_to_tty() {
        assert_eq!("tty", app(&[]).opt.report_format);
    }

    #[test]
    fn paths_should_be_positional() {
        let a = app(&["-v"]);
        assert_eq!(vec![PathBuf::from("dir")], a.opt.paths);
        assert!(a.opt.verbose);
    }
}
