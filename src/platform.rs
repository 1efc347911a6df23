//! Mounted-filesystem enumeration and path → filesystem resolution.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilesystemRecord {
    pub device: String,
    pub mount_point: PathBuf,
    pub kind: String,
    pub options: Vec<String>,
}

/// Lists mounted file systems.
pub fn list_filesystems() -> io::Result<Vec<FilesystemRecord>> {
    imp::list_filesystems()
}

/// Selects the record whose mount point is the longest prefix of `path`.
pub fn find_filesystem<'a>(
    records: &'a [FilesystemRecord],
    path: &Path,
) -> Option<&'a FilesystemRecord> {
    records
        .iter()
        .filter(|r| path.starts_with(&r.mount_point))
        .max_by_key(|r| r.mount_point.as_os_str().len())
}

/// Process-wide mount table with a 60 second refresh interval.
#[derive(Debug, Default)]
pub struct MountTable {
    records: Vec<FilesystemRecord>,
    refreshed: Option<Instant>,
}

impl MountTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn refresh(&mut self) {
        let stale = match self.refreshed {
            None => true,
            Some(at) => at.elapsed() > CACHE_TTL,
        };
        if stale {
            match list_filesystems() {
                Ok(records) => self.records = records,
                Err(e) => warn!("unable to list filesystems: {}", e),
            }
            self.refreshed = Some(Instant::now());
        }
    }

    pub fn lookup(&mut self, path: &Path) -> Option<FilesystemRecord> {
        self.refresh();
        find_filesystem(&self.records, path).cloned()
    }
}

#[cfg(target_os = "linux")]
mod imp {
    use super::*;
    use std::fs;

    pub fn list_filesystems() -> io::Result<Vec<FilesystemRecord>> {
        let text = fs::read_to_string("/proc/mounts")
            .or_else(|_| fs::read_to_string("/etc/mtab"))?;
        Ok(parse_mount_table(&text))
    }

    /// Undoes the octal escapes mount tables use for whitespace.
    fn unescape(field: &str) -> String {
        let mut out = String::with_capacity(field.len());
        let mut chars = field.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            let code: String = chars.clone().take(3).collect();
            match u8::from_str_radix(&code, 8) {
                Ok(b) if code.len() == 3 => {
                    out.push(b as char);
                    chars.nth(2);
                }
                _ => out.push(c),
            }
        }
        out
    }

    pub fn parse_mount_table(text: &str) -> Vec<FilesystemRecord> {
        text.lines()
            .filter_map(|line| {
                let part: Vec<&str> = line.split_whitespace().collect();
                if part.len() < 4 {
                    return None;
                }
                Some(FilesystemRecord {
                    device: unescape(part[0]),
                    mount_point: PathBuf::from(unescape(part[1])),
                    kind: part[2].to_string(),
                    options: part[3].split(',').map(str::to_string).collect(),
                })
            })
            .collect()
    }

}

#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd"
))]
mod imp {
    use super::*;
    use std::process::Command;

    pub fn list_filesystems() -> io::Result<Vec<FilesystemRecord>> {
        let out = Command::new("mount").output()?;
        Ok(parse_mount_output(&String::from_utf8_lossy(&out.stdout)))
    }

    // `device on /mount/point (type, opt1, opt2)`
    pub fn parse_mount_output(text: &str) -> Vec<FilesystemRecord> {
        text.lines()
            .filter_map(|line| {
                let device = line.split(" on ").next()?;
                let rest = line.split(" on ").nth(1)?;
                let mount = rest.split(" (").next()?;
                let opts = rest.split(" (").nth(1)?.trim_end_matches(')');
                let mut fields = opts.split(", ");
                let kind = fields.next()?.to_string();
                Some(FilesystemRecord {
                    device: device.to_string(),
                    mount_point: PathBuf::from(mount),
                    kind,
                    options: fields.map(str::to_string).collect(),
                })
            })
            .collect()
    }
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd"
)))]
mod imp {
    use super::*;

    pub fn list_filesystems() -> io::Result<Vec<FilesystemRecord>> {
        Ok(vec![])
    }
}
