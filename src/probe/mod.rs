//! Content probe framework: registry, ignore lists, hash-based suppression
//! and record emission.

pub mod pan;
pub mod password;
pub mod pcap;
pub mod ssl;

use crate::checksum::{self, Algorithm};
use crate::config::Config;
use crate::errors::ScanError;
use crate::incremental::DEFAULT_BLOCKSIZE;
use crate::meta::{relative_to, Item};
use crate::report::Report;
use crate::repository::RepositoryCache;
use globset::{Glob, GlobMatcher};
use std::collections::BTreeMap;
use std::path::Path;
use users::{Groups, Users};

/// Record fields forwarded to the report sink.
pub type Fields = BTreeMap<String, String>;

pub trait Probe {
    fn probe(&mut self, item: &Item, rec: &mut Recorder) -> Result<(), ScanError>;
}

pub fn all_names() -> &'static [&'static str] {
    &["pan", "password", "ssl", "pcap"]
}

/// Default report line for a probe's findings.
pub fn default_format(name: &str) -> &'static str {
    match name {
        "pan" => pan::FORMAT,
        "password" => password::FORMAT,
        "ssl" => ssl::FORMAT,
        "pcap" => pcap::FORMAT,
        _ => "{filename}: finding",
    }
}

/// MIME dispatch used when the configuration carries no `[probe]` section.
pub fn default_targets() -> Vec<(String, Vec<String>)> {
    vec![
        (
            "text/*".to_string(),
            vec!["pan".into(), "password".into(), "ssl".into()],
        ),
        ("application/octet-stream".to_string(), vec!["pcap".into()]),
        (
            "application/vnd.tcpdump.pcap".to_string(),
            vec!["pcap".into()],
        ),
    ]
}

/// Instantiates a probe with its per-probe settings loaded once.
pub fn create(name: &str, config: &Config) -> Result<ProbeEntry, ScanError> {
    let (probe, name, format): (Box<dyn Probe>, &'static str, &'static str) = match name {
        "pan" => (Box::new(pan::Pan::new(config)?), "pan", pan::FORMAT),
        "password" => (
            Box::new(password::Password::new(config)?),
            "password",
            password::FORMAT,
        ),
        "ssl" => (Box::new(ssl::Ssl::new()), "ssl", ssl::FORMAT),
        "pcap" => (Box::new(pcap::Pcap::new()), "pcap", pcap::FORMAT),
        other => {
            return Err(ScanError::NotImplemented(format!("probe {}", other)));
        }
    };
    Ok(ProbeEntry {
        spec: ProbeSpec::load(name, format, config)?,
        probe,
    })
}

/// A probe plus its per-probe settings, instantiated once per scan.
pub struct ProbeEntry {
    pub spec: ProbeSpec,
    pub probe: Box<dyn Probe>,
}

/// Which bytes feed the suppression digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanContext {
    File,
    Line,
    Format,
}

#[derive(Debug, Default)]
pub struct Ignores {
    name: Vec<GlobMatcher>,
    repo: Vec<(String, GlobMatcher)>,
    hash: Vec<String>,
}

fn compile(section: &str, pattern: &str) -> Result<GlobMatcher, ScanError> {
    Glob::new(pattern)
        .map(|g| g.compile_matcher())
        .map_err(|e| {
            ScanError::BadOption(section.to_string(), pattern.to_string(), e.to_string())
        })
}

impl Ignores {
    pub fn load(config: &Config, probe: &str) -> Result<Self, ScanError> {
        let section = format!("clean:{}", probe);
        let mut name = vec![];
        for pattern in config.getmulti(&section, "ignore_name") {
            name.push(compile(&section, &pattern)?);
        }
        let mut repo = vec![];
        for entry in config.getmulti(&section, "ignore_repo") {
            let mut split = entry.splitn(2, ':');
            match (split.next(), split.next()) {
                (Some(kind), Some(pattern)) => {
                    repo.push((kind.to_string(), compile(&section, pattern)?))
                }
                _ => {
                    return Err(ScanError::BadOption(
                        section,
                        "ignore_repo".to_string(),
                        entry,
                    ));
                }
            }
        }
        Ok(Ignores {
            name,
            repo,
            hash: config.getmulti(&section, "ignore_hash"),
        })
    }

    fn matches_name(&self, item: &Item) -> bool {
        self.name.iter().any(|g| g.is_match(item.path()))
    }

    fn matches_repo(&self, item: &Item, repos: &mut RepositoryCache) -> bool {
        if self.repo.is_empty() {
            return false;
        }
        let dir = match item.path().parent() {
            Some(dir) => dir,
            None => return false,
        };
        let detected = match repos.detect(dir).kind {
            Some(kind) => kind,
            None => return false,
        };
        self.repo.iter().any(|(kind, glob)| {
            (kind == "any" || kind == detected.name()) && glob.is_match(item.path())
        })
    }

    fn matches_hash(&self, digest: &str) -> bool {
        self.hash.iter().any(|h| h == digest)
    }
}

#[derive(Debug)]
pub struct ProbeSpec {
    pub name: &'static str,
    /// Default report line, overridable per sink via `format_<probe>`.
    pub format: &'static str,
    ignores: Ignores,
    algorithm: Algorithm,
    context: CleanContext,
    clean_format: Option<String>,
}

impl ProbeSpec {
    fn load(name: &'static str, format: &'static str, config: &Config) -> Result<Self, ScanError> {
        let section = format!("clean:{}", name);
        let algorithm = config
            .get(&section, "algorithm")
            .unwrap_or_else(|| config.getdefault("clean", "algorithm", "sha1"));
        let context = config
            .get(&section, "context")
            .unwrap_or_else(|| config.getdefault("clean", "context", "line"));
        let context = match context.as_str() {
            "file" => CleanContext::File,
            "line" => CleanContext::Line,
            "format" => CleanContext::Format,
            other => {
                return Err(ScanError::BadOption(
                    section,
                    "context".to_string(),
                    other.to_string(),
                ));
            }
        };
        Ok(ProbeSpec {
            name,
            format,
            ignores: Ignores::load(config, name)?,
            algorithm: algorithm.parse()?,
            context,
            clean_format: config.get(&section, "format"),
        })
    }

    /// Tests whether the probe may run against `item` at all.
    pub fn can_probe(&self, item: &Item, repos: &mut RepositoryCache) -> bool {
        if self.ignores.matches_name(item) {
            debug!("ignoring {} in {}: ignore_name", item, self.name);
            return false;
        }
        if self.ignores.matches_repo(item, repos) {
            debug!("ignoring {} in {}: ignore_repo", item, self.name);
            return false;
        }
        true
    }

    /// Suppression digest for a finding, per the configured context.
    /// `None` means the finding cannot be hashed (line context without a
    /// raw field) and is emitted unsuppressed.
    fn suppression_digest(&self, item: &Item, fields: &Fields) -> Result<Option<String>, ScanError> {
        match self.context {
            CleanContext::File => {
                let mut handle = item.open()?;
                Ok(Some(checksum::hexdigest_reader(
                    self.algorithm,
                    &mut handle,
                    DEFAULT_BLOCKSIZE,
                )?))
            }
            CleanContext::Line => Ok(fields
                .get("raw")
                .map(|raw| checksum::hexdigest(self.algorithm, raw.as_bytes()))),
            CleanContext::Format => {
                let template = self.clean_format.as_ref().ok_or_else(|| {
                    ScanError::MissingOption(format!("clean:{}", self.name), "format".to_string())
                })?;
                let rendered = crate::report::render_template(template, fields);
                Ok(Some(checksum::hexdigest(self.algorithm, rendered.as_bytes())))
            }
        }
    }
}

/// The single emission path for findings. Consults the hash-ignore list,
/// enriches the fields and forwards to the active report sink.
pub struct Recorder<'a> {
    pub(crate) spec: &'a ProbeSpec,
    pub(crate) report: &'a mut dyn Report,
    pub(crate) users: &'a users::cache::UsersCache,
    pub(crate) cwd: &'a Path,
    pub(crate) emitted: usize,
}

impl<'a> Recorder<'a> {
    pub fn new(
        spec: &'a ProbeSpec,
        report: &'a mut dyn Report,
        users: &'a users::cache::UsersCache,
        cwd: &'a Path,
    ) -> Self {
        Recorder {
            spec,
            report,
            users,
            cwd,
            emitted: 0,
        }
    }

    pub fn record(&mut self, item: &Item, mut fields: Fields) -> Result<(), ScanError> {
        let digest = self.spec.suppression_digest(item, &fields)?;
        if let Some(digest) = &digest {
            if self.spec.ignores.matches_hash(digest) {
                debug!("ignoring {} in {}: {}", item, self.spec.name, digest);
                return Ok(());
            }
            debug!("allowing {} in {}: {}", item, self.spec.name, digest);
        }
        fields.insert("hash".to_string(), digest.unwrap_or_default());
        fields.insert("filename".to_string(), item.path().display().to_string());
        fields.insert(
            "filename_relative".to_string(),
            relative_to(item.path(), self.cwd),
        );
        let stat = item.stat();
        fields.insert("uid".to_string(), stat.uid.to_string());
        fields.insert("gid".to_string(), stat.gid.to_string());
        let username = self
            .users
            .get_user_by_uid(stat.uid)
            .map(|u| u.name().to_string_lossy().into_owned())
            .unwrap_or_else(|| stat.uid.to_string());
        let group = self
            .users
            .get_group_by_gid(stat.gid)
            .map(|g| g.name().to_string_lossy().into_owned())
            .unwrap_or_else(|| stat.gid.to_string());
        fields.insert("username".to_string(), username);
        fields.insert("group".to_string(), group);
        self.emitted += 1;
        self.report.report(self.spec.name, item, &fields)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::meta::{ItemStat, SharedBytes};
    use std::path::PathBuf;

    /// Passive sink collecting formatted findings for assertions.
    #[derive(Debug, Default)]
    pub struct FakeReport {
        pub seen: Vec<(String, String, Fields)>,
    }

    impl Report for FakeReport {
        fn report(&mut self, probe: &str, item: &Item, fields: &Fields) -> Result<(), ScanError> {
            self.seen.push((
                probe.to_string(),
                item.path().display().to_string(),
                fields.clone(),
            ));
            Ok(())
        }

        fn render(&mut self) -> Result<(), ScanError> {
            Ok(())
        }
    }

    pub fn text_item(path: &str, text: &str) -> Item {
        Item::from_buffer(
            PathBuf::from(path),
            ItemStat {
                mode: 0o644,
                uid: 12345,
                gid: 12345,
                size: text.len() as u64,
                mtime: 0,
            },
            SharedBytes::new(text.as_bytes().to_vec()),
            1,
        )
    }

    pub fn run_probe(
        name: &str,
        config: &Config,
        item: &Item,
    ) -> Result<FakeReport, ScanError> {
        let mut entry = create(name, config)?;
        let mut report = FakeReport::default();
        let users = users::cache::UsersCache::new();
        let cwd = PathBuf::from("/");
        {
            let mut rec = Recorder::new(&entry.spec, &mut report, &users, &cwd);
            entry.probe.probe(item, &mut rec)?;
        }
        Ok(report)
    }

    #[test]
    fn ignore_name_should_veto_probe() {
        let config = Config::from_str(
            "[clean:pan]\nignore_name = /var/log/*\n",
        )
        .unwrap();
        let entry = create("pan", &config).unwrap();
        let mut repos = RepositoryCache::new();
        let hit = text_item("/var/log/messages", "x");
        let miss = text_item("/home/alice/notes", "x");
        assert!(!entry.spec.can_probe(&hit, &mut repos));
        assert!(entry.spec.can_probe(&miss, &mut repos));
    }

    #[test]
    fn hash_suppression_should_drop_known_findings() {
        // sha1 of the raw line "4111111111111111\n"
        let raw = "4111111111111111\n";
        let digest = checksum::hexdigest(Algorithm::Sha1, raw.as_bytes());
        let config = Config::from_str(&format!(
            "[clean:pan]\nignore_hash = {}\n",
            digest
        ))
        .unwrap();
        let item = text_item("/tmp/cards", raw);
        let report = run_probe("pan", &config, &item).unwrap();
        assert!(report.seen.is_empty());
    }

    #[test]
    fn record_should_enrich_fields() {
        let config = Config::default();
        let item = text_item("/tmp/cards", "4111111111111111\n");
        let report = run_probe("pan", &config, &item).unwrap();
        assert_eq!(1, report.seen.len());
        let fields = &report.seen[0].2;
        assert_eq!("/tmp/cards", fields["filename"]);
        assert_eq!("12345", fields["uid"]);
        assert!(!fields["hash"].is_empty());
    }

    #[test]
    fn unknown_probe_should_be_refused() {
        assert!(matches!(
            create("quantum", &Config::default()),
            Err(ScanError::NotImplemented(_))
        ));
    }
}
