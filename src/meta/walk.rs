//! Lazy depth-first directory walker with transparent archive descent.
//!
//! Directories are opened before their children; entries come in the order
//! the filesystem reports them. Per-directory I/O errors are logged and the
//! directory is skipped. Archive corruption downgrades the archive to a
//! plain file. The walker never fails the scan.

use super::archive::{self, Opened};
use super::Item;
use crate::output::p2s;
use bytesize::ByteSize;
use globset::GlobMatcher;
use std::fs;
use std::path::{Path, PathBuf};

pub struct WalkOptions {
    pub recurse: bool,
    /// -1 = unbounded.
    pub maxdepth: i64,
    pub deflate: bool,
    /// 0 = unlimited.
    pub deflate_limit: u64,
    /// Drop symlinked entries entirely, before resolution.
    pub exclude_link: bool,
    /// Directories never descended into.
    pub prune: Vec<GlobMatcher>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        WalkOptions {
            recurse: true,
            maxdepth: -1,
            deflate: true,
            deflate_limit: 0,
            exclude_link: false,
            prune: vec![],
        }
    }
}

/// Predicate dropping an item before it is yielded.
pub type Check = Box<dyn Fn(&Item) -> bool>;

enum Frame {
    Dir(fs::ReadDir, usize),
    Archive(archive::Members),
}

pub struct Walk {
    opts: WalkOptions,
    checks: Vec<Check>,
    stack: Vec<Frame>,
    /// Set when the walk root is a single file.
    pending: Option<PathBuf>,
}

impl Walk {
    pub fn new(root: &Path, opts: WalkOptions, checks: Vec<Check>) -> Self {
        let root = super::canonical(root);
        let mut walk = Walk {
            opts,
            checks,
            stack: vec![],
            pending: None,
        };
        if root.is_dir() {
            walk.push_dir(&root, 0);
        } else {
            walk.pending = Some(root);
        }
        walk
    }

    fn push_dir(&mut self, dir: &Path, depth: usize) {
        if self.opts.prune.iter().any(|g| g.is_match(dir)) {
            debug!("skipping {}: excluded directory", p2s(dir));
            return;
        }
        match fs::read_dir(dir) {
            Ok(rd) => self.stack.push(Frame::Dir(rd, depth)),
            Err(e) => error!("{} not accessible, skipping: {}", p2s(dir), e),
        }
    }

    fn depth_ok(&self, depth: i64) -> bool {
        self.opts.maxdepth < 0 || depth <= self.opts.maxdepth
    }

    fn dropped(&self, item: &Item) -> bool {
        self.checks.iter().any(|check| check(item))
    }

    /// Builds the item for a regular file and, when it is a supported
    /// archive within the size limit, switches to member iteration.
    fn take_file(&mut self, path: &Path, depth: usize) -> Option<Item> {
        let item = match Item::from_fs(path, depth) {
            Ok(item) => item,
            Err(e) => {
                warn!("{}", e);
                return None;
            }
        };
        let mime = match item.mimetype() {
            Some(m) => m,
            None => return self.yieldable(item),
        };
        if !(self.opts.deflate && archive::is_supported(mime)) {
            return self.yieldable(item);
        }
        if self.opts.deflate_limit > 0 && item.size() > self.opts.deflate_limit {
            warn!(
                "skipped archive {}: too big ({} > {})",
                item,
                ByteSize::b(item.size()),
                ByteSize::b(self.opts.deflate_limit)
            );
            return self.yieldable(item);
        }
        match archive::open(&item) {
            Ok(Opened::Compressed(inner)) => {
                debug!(
                    "opened compressed file {}: {}",
                    inner,
                    inner.mimetype().unwrap_or("?")
                );
                self.yieldable(inner)
            }
            Ok(Opened::Members(members)) => {
                debug!("opened archive {}: {}", item, mime);
                self.stack.push(Frame::Archive(members));
                None
            }
            Err(e) => {
                warn!("failed to inspect archive {}: {}", item, e);
                self.yieldable(item)
            }
        }
    }

    fn yieldable(&self, item: Item) -> Option<Item> {
        if self.dropped(&item) {
            debug!("dropped {} by walk check", item);
            None
        } else {
            Some(item)
        }
    }
}

impl Iterator for Walk {
    type Item = Item;

    fn next(&mut self) -> Option<Item> {
        if let Some(path) = self.pending.take() {
            if let Some(item) = self.take_file(&path, 0) {
                return Some(item);
            }
        }
        loop {
            let frame = match self.stack.pop() {
                None => return None,
                Some(frame) => frame,
            };
            match frame {
                Frame::Archive(mut members) => match members.next_member() {
                    None => (),
                    Some(member) => {
                        self.stack.push(Frame::Archive(members));
                        if !self.depth_ok(member.depth() as i64) {
                            debug!("skipping {}: too deep", member);
                            continue;
                        }
                        if let Some(item) = self.yieldable(member) {
                            return Some(item);
                        }
                    }
                },
                Frame::Dir(mut rd, depth) => {
                    let entry = match rd.next() {
                        None => continue,
                        Some(entry) => entry,
                    };
                    self.stack.push(Frame::Dir(rd, depth));
                    let entry = match entry {
                        Err(e) => {
                            warn!("while listing directory: {}", e);
                            continue;
                        }
                        Ok(entry) => entry,
                    };
                    let path = entry.path();
                    let is_link = path
                        .symlink_metadata()
                        .map(|m| m.file_type().is_symlink())
                        .unwrap_or(false);
                    if is_link && self.opts.exclude_link {
                        debug!("skipping {}: symlink", p2s(&path));
                        continue;
                    }
                    let resolved = super::canonical(&path);
                    if resolved.is_dir() {
                        if self.opts.recurse && self.depth_ok(depth as i64 + 2) {
                            self.push_dir(&resolved, depth + 1);
                        }
                    } else if resolved.is_file() {
                        if !self.depth_ok(depth as i64 + 1) {
                            continue;
                        }
                        if let Some(item) = self.take_file(&resolved, depth + 1) {
                            return Some(item);
                        }
                    } else {
                        debug!("skipping {}: not a regular file", p2s(&resolved));
                    }
                }
            }
        }
    }
}
