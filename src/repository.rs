//! Source-control detection by vendor marker paths.
//!
//! A directory belongs to a repository when one of the markers below exists
//! beneath it. Detection walks upwards from the item's directory; the first
//! directory with a match wins, tested in table order. Results are memoised
//! per directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepoKind {
    Arch,
    Bzr,
    Cvs,
    Darcs,
    Git,
    Hg,
    Monotone,
    Rcs,
    Svn,
}

impl RepoKind {
    pub fn name(&self) -> &'static str {
        match self {
            RepoKind::Arch => "arch",
            RepoKind::Bzr => "bzr",
            RepoKind::Cvs => "cvs",
            RepoKind::Darcs => "darcs",
            RepoKind::Git => "git",
            RepoKind::Hg => "hg",
            RepoKind::Monotone => "monotone",
            RepoKind::Rcs => "rcs",
            RepoKind::Svn => "svn",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    /// Marker must be a regular file.
    File(&'static str),
    /// Marker must merely exist.
    Path(&'static str),
}

// Tie-break is table order; the first match wins.
const MARKERS: &[(RepoKind, Marker)] = &[
    (RepoKind::Arch, Marker::File("{arch}/.arch-project-tree")),
    (RepoKind::Bzr, Marker::Path(".bzr/repository")),
    (RepoKind::Cvs, Marker::Path("CVS")),
    (RepoKind::Cvs, Marker::Path("CVSROOT")),
    (RepoKind::Darcs, Marker::Path("_darcs/pristine.hashed")),
    (RepoKind::Git, Marker::Path(".git/objects")),
    (RepoKind::Git, Marker::Path("refs/heads")),
    (RepoKind::Hg, Marker::Path(".hg/store")),
    (RepoKind::Monotone, Marker::File("_MTN/format")),
    (RepoKind::Rcs, Marker::Path("RCS")),
    (RepoKind::Svn, Marker::File(".svn/format")),
    (RepoKind::Svn, Marker::Path("db/revs")),
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepositoryInfo {
    pub kind: Option<RepoKind>,
    pub root: Option<PathBuf>,
}

fn match_markers(dir: &Path) -> Option<RepoKind> {
    for (kind, marker) in MARKERS {
        let hit = match marker {
            Marker::File(rel) => dir.join(rel).is_file(),
            Marker::Path(rel) => dir.join(rel).exists(),
        };
        if hit {
            return Some(*kind);
        }
    }
    None
}

/// Per-directory memo keeping amortised detection cost near O(depth).
#[derive(Debug, Default)]
pub struct RepositoryCache {
    memo: HashMap<PathBuf, RepositoryInfo>,
}

impl RepositoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detect(&mut self, dir: &Path) -> RepositoryInfo {
        if let Some(info) = self.memo.get(dir) {
            return info.clone();
        }
        let mut visited = vec![];
        let mut cursor = Some(dir);
        let mut info = RepositoryInfo::default();
        while let Some(d) = cursor {
            if let Some(cached) = self.memo.get(d) {
                info = cached.clone();
                break;
            }
            visited.push(d.to_path_buf());
            if let Some(kind) = match_markers(d) {
                info = RepositoryInfo {
                    kind: Some(kind),
                    root: Some(d.to_path_buf()),
                };
                break;
            }
            cursor = d.parent();
        }
        for d in visited {
            self.memo.insert(d, info.clone());
        }
        info
    }
}
